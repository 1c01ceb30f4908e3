//! Answer confidence from retrieval similarity and citation coverage.

/// `s * (0.5 + 0.5 * c)` where `s` is the best retrieved similarity clamped
/// to `[0, 1]` and `c` is the share of distinct citations that were verified
/// (zero when the model cited nothing).
///
/// Non-decreasing in both inputs, so an answer with stripped citations never
/// scores above the same answer without them.
#[must_use]
pub fn confidence(top_similarity: f32, verified: usize, distinct: usize) -> f32 {
    let s = if top_similarity.is_finite() {
        top_similarity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    s * (0.5 + 0.5 * coverage(verified, distinct))
}

/// Share of distinct citations that were verified.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn coverage(verified: usize, distinct: usize) -> f32 {
    if distinct == 0 {
        return 0.0;
    }
    (verified.min(distinct) as f32) / (distinct as f32)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn fully_verified_answer_keeps_similarity() {
        assert!((confidence(0.8, 3, 3) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn uncited_answer_is_halved() {
        assert!((confidence(0.8, 0, 0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn violations_reduce_confidence() {
        let clean = confidence(0.9, 2, 2);
        let violated = confidence(0.9, 2, 4);
        assert!(violated < clean);
        assert!((violated - 0.675).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_similarity_is_clamped() {
        assert!((confidence(1.7, 1, 1) - 1.0).abs() < 1e-6);
        assert!(confidence(-0.3, 1, 1).abs() < 1e-6);
        assert!(confidence(f32::NAN, 1, 1).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn stays_in_unit_interval(s in -2.0f32..2.0, verified in 0usize..20, extra in 0usize..20) {
            let c = confidence(s, verified, verified + extra);
            prop_assert!((0.0..=1.0).contains(&c));
        }

        #[test]
        fn monotonic_in_similarity(a in 0.0f32..1.0, b in 0.0f32..1.0, verified in 0usize..10, extra in 0usize..10) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let distinct = verified + extra;
            prop_assert!(confidence(lo, verified, distinct) <= confidence(hi, verified, distinct));
        }

        #[test]
        fn monotonic_in_coverage(s in 0.0f32..1.0, verified in 0usize..10, extra in 1usize..10) {
            let distinct = verified + extra;
            prop_assert!(confidence(s, verified, distinct) <= confidence(s, verified + 1, distinct));
        }
    }
}
