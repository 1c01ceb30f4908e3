//! Line-respecting fixed-size windows.

use super::Lines;

/// One window: `start..primary` is overlap shared with the previous window,
/// `primary..=end` is owned by this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Window {
    pub start: usize,
    pub primary: usize,
    pub end: usize,
}

/// Cover `lo..=hi` with windows of at most `target` chars each (a single line
/// longer than `target` forms its own window). Every window after the first
/// is extended backwards by whole lines while they fit in `overlap_budget`
/// chars, never reaching the previous window's first primary line.
pub(super) fn plan(
    lines: &Lines<'_>,
    lo: usize,
    hi: usize,
    target: usize,
    overlap_budget: usize,
) -> Vec<Window> {
    let mut windows = Vec::new();
    let mut next = lo;
    let mut prev_primary: Option<usize> = None;

    while next <= hi {
        let primary = next;
        let mut end = primary;
        let mut size = lines.len_of(primary);
        while end < hi && size + lines.len_of(end + 1) <= target {
            end += 1;
            size += lines.len_of(end);
        }

        let mut start = primary;
        if let Some(prev) = prev_primary {
            let mut budget = overlap_budget;
            while start > prev + 1 && lines.len_of(start - 1) <= budget {
                start -= 1;
                budget -= lines.len_of(start);
            }
        }

        windows.push(Window {
            start,
            primary,
            end,
        });
        prev_primary = Some(primary);
        next = end + 1;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_range_without_gaps() {
        let text = "aaaa\n".repeat(20);
        let lines = Lines::new(&text);
        let windows = plan(&lines, 0, 19, 20, 5);
        assert_eq!(windows[0].start, 0);
        assert_eq!(windows.last().unwrap().end, 19);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].primary);
        }
    }

    #[test]
    fn overlap_uses_whole_previous_lines() {
        let text = "aaaa\n".repeat(8);
        let lines = Lines::new(&text);
        let windows = plan(&lines, 0, 7, 20, 5);
        assert_eq!(
            windows,
            vec![
                Window { start: 0, primary: 0, end: 3 },
                Window { start: 3, primary: 4, end: 7 },
            ]
        );
    }

    #[test]
    fn zero_budget_means_no_overlap() {
        let text = "aaaa\n".repeat(8);
        let lines = Lines::new(&text);
        let windows = plan(&lines, 0, 7, 10, 0);
        assert!(windows.iter().all(|w| w.start == w.primary));
        assert_eq!(windows.len(), 4);
    }

    #[test]
    fn long_line_gets_its_own_window() {
        let text = format!("a\n{}\nb\n", "x".repeat(50));
        let lines = Lines::new(&text);
        let windows = plan(&lines, 0, 2, 10, 0);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].primary, 1);
        assert_eq!(windows[1].end, 1);
    }

    #[test]
    fn windows_respect_sub_range() {
        let text = "ab\n".repeat(10);
        let lines = Lines::new(&text);
        let windows = plan(&lines, 4, 6, 100, 50);
        assert_eq!(windows, vec![Window { start: 4, primary: 4, end: 6 }]);
    }
}
