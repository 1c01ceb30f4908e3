//! Boundary-aware segmentation of one file into line-addressed chunks.
//!
//! Function and class constructs become their own chunks; material between
//! them becomes `module` windows. Constructs over `max_size` are split along
//! nested constructs, then statement boundaries, then plain line windows. When
//! no construct boundaries can be detected the whole file is windowed with
//! overlap and tagged `fallback`.
//!
//! Whatever the path, the primary spans of the returned chunks are disjoint
//! and cover every line of the file.

mod heuristic;
mod syntax;
mod window;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkId, ChunkKind, SourceFile};
use crate::error::StructuralError;
use crate::languages::{Detection, Lang};

/// Segmenter configuration. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub target_size: usize,
    /// Files shorter than this with at most one construct become one chunk.
    pub min_size: usize,
    /// Constructs longer than this are split.
    pub max_size: usize,
    /// Fraction of `target_size` repeated between consecutive windows.
    pub overlap_fraction: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 2000,
            min_size: 500,
            max_size: 4000,
            overlap_fraction: 0.25,
        }
    }
}

impl ChunkingConfig {
    /// # Errors
    ///
    /// Returns a description of the first inconsistent bound.
    pub fn validate(&self) -> Result<(), String> {
        if self.target_size == 0 {
            return Err("chunking.target_size must be positive".into());
        }
        if self.min_size > self.target_size || self.target_size > self.max_size {
            return Err(format!(
                "chunking sizes must satisfy min_size <= target_size <= max_size (got {} / {} / {})",
                self.min_size, self.target_size, self.max_size
            ));
        }
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(format!(
                "chunking.overlap_fraction must be in [0, 1) (got {})",
                self.overlap_fraction
            ));
        }
        Ok(())
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn overlap_budget(&self) -> usize {
        (self.target_size as f64 * self.overlap_fraction).floor() as usize
    }
}

/// A detected function or class, in 0-based inclusive line indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Construct {
    pub start: usize,
    pub end: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub children: Vec<Construct>,
    /// Lines after which the construct may be cut when it has no children.
    pub breakpoints: Vec<usize>,
}

/// The file split into lines (terminators kept) with char-count prefix sums.
pub(crate) struct Lines<'a> {
    lines: Vec<&'a str>,
    prefix: Vec<usize>,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut prefix = Vec::with_capacity(lines.len() + 1);
        prefix.push(0);
        let mut total = 0;
        for line in &lines {
            total += line.chars().count();
            prefix.push(total);
        }
        Self { lines, prefix }
    }

    fn count(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn len_of(&self, line: usize) -> usize {
        self.prefix[line + 1] - self.prefix[line]
    }

    /// Chars in lines `a..=b`.
    fn size(&self, a: usize, b: usize) -> usize {
        self.prefix[b + 1] - self.prefix[a]
    }

    fn text(&self, a: usize, b: usize) -> String {
        self.lines[a..=b].concat()
    }

    fn is_blank(&self, a: usize, b: usize) -> bool {
        self.lines[a..=b].iter().all(|l| l.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Syntax,
    Heuristic,
    Window,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Heuristic => "heuristic",
            Self::Window => "window",
        }
    }
}

/// Where a region sits: at file level or inside an oversized construct.
#[derive(Clone, Copy)]
enum Region<'c> {
    TopLevel,
    Inside(&'c Construct),
}

/// A chunk before content and identity are attached.
struct Draft {
    start: usize,
    end: usize,
    overlap: usize,
    kind: ChunkKind,
    name: Option<String>,
    metadata: BTreeMap<String, String>,
}

struct Plan<'l, 'a> {
    lines: &'l Lines<'a>,
    config: &'l ChunkingConfig,
    drafts: Vec<Draft>,
}

impl Plan<'_, '_> {
    fn push(
        &mut self,
        (start, end, overlap): (usize, usize, usize),
        kind: ChunkKind,
        name: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) {
        self.drafts.push(Draft {
            start,
            end,
            overlap,
            kind,
            name: name.map(str::to_owned),
            metadata,
        });
    }

    fn emit_range(&mut self, lo: usize, hi: usize, constructs: &[Construct], region: Region<'_>) {
        let mut cursor = lo;
        for construct in constructs {
            if construct.start > cursor {
                self.gap(cursor, construct.start - 1, region);
            }
            self.construct(construct, region);
            cursor = construct.end + 1;
        }
        if cursor <= hi {
            self.gap(cursor, hi, region);
        }
    }

    fn gap(&mut self, lo: usize, hi: usize, region: Region<'_>) {
        match region {
            Region::TopLevel => {
                self.windows(lo, hi, ChunkKind::Module, None, true, &BTreeMap::new());
            }
            Region::Inside(parent) => {
                let meta = parent_meta(parent);
                self.windows(lo, hi, parent.kind, parent.name.as_deref(), false, &meta);
            }
        }
    }

    fn construct(&mut self, construct: &Construct, region: Region<'_>) {
        let mut meta = BTreeMap::new();
        if let Region::Inside(parent) = region
            && let Some(name) = &parent.name
        {
            meta.insert("parent".to_owned(), name.clone());
        }

        if self.lines.size(construct.start, construct.end) <= self.config.max_size {
            self.push(
                (construct.start, construct.end, 0),
                construct.kind,
                construct.name.as_deref(),
                meta,
            );
            return;
        }

        tracing::trace!(
            name = construct.name.as_deref().unwrap_or("<anonymous>"),
            start = construct.start + 1,
            end = construct.end + 1,
            "splitting oversized construct"
        );

        if !construct.children.is_empty() {
            self.emit_range(
                construct.start,
                construct.end,
                &construct.children,
                Region::Inside(construct),
            );
        } else if !construct.breakpoints.is_empty() {
            self.split_at_breakpoints(construct, &meta);
        } else {
            self.windows(
                construct.start,
                construct.end,
                construct.kind,
                construct.name.as_deref(),
                false,
                &meta,
            );
        }
    }

    /// Group statement-aligned pieces greedily up to `target_size`.
    fn split_at_breakpoints(&mut self, construct: &Construct, meta: &BTreeMap<String, String>) {
        let mut pieces = Vec::with_capacity(construct.breakpoints.len() + 1);
        let mut piece_start = construct.start;
        for &bp in &construct.breakpoints {
            pieces.push((piece_start, bp));
            piece_start = bp + 1;
        }
        pieces.push((piece_start, construct.end));

        let name = construct.name.as_deref();
        let mut group: Option<(usize, usize)> = None;
        let mut part = 0usize;

        for (lo, hi) in pieces {
            if self.lines.size(lo, hi) > self.config.max_size {
                if let Some((gs, ge)) = group.take() {
                    part += 1;
                    self.push((gs, ge, 0), construct.kind, name, with_part(meta, part));
                }
                part += 1;
                self.windows(lo, hi, construct.kind, name, false, &with_part(meta, part));
                continue;
            }
            group = match group {
                Some((gs, ge)) if self.lines.size(gs, hi) > self.config.target_size => {
                    part += 1;
                    self.push((gs, ge, 0), construct.kind, name, with_part(meta, part));
                    Some((lo, hi))
                }
                Some((gs, _)) => Some((gs, hi)),
                None => Some((lo, hi)),
            };
        }
        if let Some((gs, ge)) = group {
            part += 1;
            self.push((gs, ge, 0), construct.kind, name, with_part(meta, part));
        }
    }

    fn windows(
        &mut self,
        lo: usize,
        hi: usize,
        kind: ChunkKind,
        name: Option<&str>,
        overlap: bool,
        meta: &BTreeMap<String, String>,
    ) {
        let budget = if overlap {
            self.config.overlap_budget()
        } else {
            0
        };
        let planned = window::plan(self.lines, lo, hi, self.config.target_size, budget);
        let split = planned.len() > 1;
        for (idx, w) in planned.into_iter().enumerate() {
            let mut meta = meta.clone();
            if split && !meta.contains_key("part") {
                meta.insert("part".to_owned(), (idx + 1).to_string());
            }
            if w.primary == w.end && self.lines.len_of(w.end) > self.config.max_size {
                meta.insert("oversized_line".to_owned(), "true".to_owned());
            }
            self.push((w.start, w.end, w.primary - w.start), kind, name, meta);
        }
    }
}

fn parent_meta(parent: &Construct) -> BTreeMap<String, String> {
    parent
        .name
        .iter()
        .map(|name| ("parent".to_owned(), name.clone()))
        .collect()
}

fn with_part(meta: &BTreeMap<String, String>, part: usize) -> BTreeMap<String, String> {
    let mut meta = meta.clone();
    meta.insert("part".to_owned(), part.to_string());
    meta
}

/// Sort, clamp to `lo..=hi`, and make siblings line-disjoint: a construct
/// starting on a line already owned by its predecessor is absorbed into it,
/// or nested under it when fully contained.
fn normalize(mut constructs: Vec<Construct>, lo: usize, hi: usize) -> Vec<Construct> {
    constructs.retain(|c| c.start >= lo && c.start <= hi);
    for c in &mut constructs {
        c.end = c.end.clamp(c.start, hi);
    }
    constructs.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out: Vec<Construct> = Vec::with_capacity(constructs.len());
    for c in constructs {
        if let Some(prev) = out.last_mut()
            && c.start <= prev.end
        {
            if c.start > prev.start && c.end <= prev.end {
                prev.children.push(c);
            } else {
                prev.end = prev.end.max(c.end);
                prev.children.extend(c.children);
                prev.breakpoints.extend(c.breakpoints);
            }
            continue;
        }
        out.push(c);
    }

    for c in &mut out {
        let children = std::mem::take(&mut c.children);
        c.children = normalize(children, c.start, c.end);
        let (start, end) = (c.start, c.end);
        c.breakpoints.retain(|&bp| bp >= start && bp < end);
        c.breakpoints.sort_unstable();
        c.breakpoints.dedup();
    }
    out
}

fn detect(lang: Lang, text: &str) -> Result<(Method, Vec<Construct>), StructuralError> {
    match lang.detection() {
        Detection::Syntax => syntax::constructs(lang, text).map(|c| (Method::Syntax, c)),
        Detection::Heuristic => heuristic::constructs(text).map(|c| (Method::Heuristic, c)),
        Detection::Unsupported => Err(StructuralError::Unsupported(lang.id())),
    }
}

/// Splits files into chunks according to a [`ChunkingConfig`].
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: ChunkingConfig,
}

impl Segmenter {
    #[must_use]
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Cut `file` into chunks in file order.
    ///
    /// Never fails: boundary-detection problems are logged and degrade to
    /// fixed-size windows. An empty file yields no chunks.
    #[must_use]
    pub fn segment(&self, file: &SourceFile) -> Vec<Chunk> {
        if file.text.is_empty() {
            return Vec::new();
        }

        let lines = Lines::new(&file.text);
        let last = lines.count() - 1;
        let total = lines.size(0, last);
        let mut plan = Plan {
            lines: &lines,
            config: &self.config,
            drafts: Vec::new(),
        };

        let method = match detect(file.language, &file.text) {
            Ok((method, found)) => {
                let constructs = normalize(found, 0, last);
                if total < self.config.min_size && constructs.len() < 2 {
                    let (kind, name) = match constructs.first() {
                        Some(c)
                            if (c.start == 0 || lines.is_blank(0, c.start - 1))
                                && (c.end == last || lines.is_blank(c.end + 1, last)) =>
                        {
                            (c.kind, c.name.as_deref())
                        }
                        _ => (ChunkKind::Module, None),
                    };
                    plan.push((0, last, 0), kind, name, BTreeMap::new());
                } else {
                    plan.emit_range(0, last, &constructs, Region::TopLevel);
                }
                method
            }
            Err(err) => {
                if matches!(err, StructuralError::Unsupported(_)) {
                    tracing::debug!(file = %file.path, language = %file.language, "no boundary detector, windowing");
                } else {
                    tracing::warn!(file = %file.path, language = %file.language, error = %err, "boundary detection failed, falling back to windows");
                }
                let meta: BTreeMap<String, String> =
                    [("fallback_reason".to_owned(), err.reason().to_owned())].into();
                if total < self.config.min_size {
                    plan.push((0, last, 0), ChunkKind::Fallback, None, meta);
                } else {
                    plan.windows(0, last, ChunkKind::Fallback, None, true, &meta);
                }
                Method::Window
            }
        };

        let drafts = plan.drafts;
        debug_assert!(covers(&drafts, last), "primary spans must tile the file");

        drafts
            .into_iter()
            .enumerate()
            .map(|(ordinal, draft)| {
                let content = lines.text(draft.start, draft.end);
                let start_line = draft.start + 1;
                let end_line = draft.end + 1;
                let mut metadata = draft.metadata;
                metadata.insert("method".to_owned(), method.as_str().to_owned());
                Chunk {
                    id: ChunkId::derive(&file.path, start_line, end_line, ordinal),
                    file_path: file.path.clone(),
                    content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
                    content,
                    start_line,
                    end_line,
                    overlap_lines: draft.overlap,
                    language: file.language,
                    kind: draft.kind,
                    name: draft.name,
                    metadata,
                }
            })
            .collect()
    }
}

fn covers(drafts: &[Draft], last: usize) -> bool {
    let mut next = 0;
    for d in drafts {
        if d.start + d.overlap != next || d.end < d.start + d.overlap {
            return false;
        }
        next = d.end + 1;
    }
    next == last + 1
}
