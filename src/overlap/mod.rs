//! Overlap detection and merge policy
//!
//! Pure range logic over [`Highlight`] values; no view involvement. Two
//! ranges overlap when either's start falls within the other's closed
//! span, so ranges that merely touch at an endpoint count as overlapping.
//! That is a deliberate policy: adjacent highlights merge rather than
//! fragment.
//!
//! What to do about an overlap is the caller's decision, not the
//! resolver's: [`OverlapPolicy`] is threaded through by call sites.

use serde::{Deserialize, Serialize};

use crate::anchor::{CharacterRange, Highlight};
use crate::annotations::Annotation;

/// What a caller does when a candidate range overlaps an existing
/// annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Widen the existing annotation to the union span and absorb the
    /// candidate (and anything else the union reaches)
    Merge,
    /// Collapse the selection and discard the candidate
    Reject,
}

fn in_between(x: usize, low: usize, high: usize) -> bool {
    x >= low && x <= high
}

/// Closed-endpoint overlap test
pub fn ranges_overlap(a: &CharacterRange, b: &CharacterRange) -> bool {
    in_between(a.start, b.start, b.end) || in_between(b.start, a.start, a.end)
}

/// First existing annotation whose highlight overlaps the candidate, if
/// any. Overlap is a resolved value, never an error.
pub fn find_overlap<'a>(
    candidate: &Highlight,
    existing: &'a [Annotation],
) -> Option<&'a Annotation> {
    existing
        .iter()
        .find(|annotation| ranges_overlap(&candidate.character_range, &annotation.highlight.character_range))
}

/// Union merge: the widened span covering both ranges. `backward` is
/// inherited from `existing` by convention. Always constructs a new
/// highlight; neither input is mutated.
pub fn merge_highlights(candidate: &Highlight, existing: &Highlight) -> Highlight {
    Highlight::new(
        CharacterRange::new(
            candidate.start().min(existing.start()),
            candidate.end().max(existing.end()),
        ),
        existing.backward,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize) -> Highlight {
        Highlight::new(CharacterRange::new(start, end), false)
    }

    fn annotation(start: usize, end: usize) -> Annotation {
        Annotation::new(range(start, end))
    }

    #[test]
    fn test_disjoint_ranges_do_not_overlap() {
        assert!(!ranges_overlap(
            &CharacterRange::new(0, 5),
            &CharacterRange::new(6, 11)
        ));
    }

    #[test]
    fn test_contained_range_overlaps() {
        assert!(ranges_overlap(
            &CharacterRange::new(8, 15),
            &CharacterRange::new(6, 11)
        ));
        assert!(ranges_overlap(
            &CharacterRange::new(6, 11),
            &CharacterRange::new(8, 15)
        ));
    }

    #[test]
    fn test_touching_ranges_count_as_overlapping() {
        // Closed endpoints: [0,5) and [5,10) share only the boundary point
        assert!(ranges_overlap(
            &CharacterRange::new(0, 5),
            &CharacterRange::new(5, 10)
        ));
    }

    #[test]
    fn test_find_overlap_returns_first_match() {
        let existing = vec![annotation(0, 5), annotation(6, 11), annotation(8, 20)];
        let hit = find_overlap(&range(8, 15), &existing).unwrap();
        assert_eq!(hit.highlight.character_range, CharacterRange::new(6, 11));
    }

    #[test]
    fn test_find_overlap_none() {
        let existing = vec![annotation(0, 3)];
        assert!(find_overlap(&range(10, 12), &existing).is_none());
    }

    #[test]
    fn test_merge_is_union_span() {
        let merged = merge_highlights(&range(8, 15), &range(6, 11));
        assert_eq!(merged.character_range, CharacterRange::new(6, 15));
    }

    #[test]
    fn test_merge_inherits_backward_from_existing() {
        let candidate = Highlight::new(CharacterRange::new(0, 4), false);
        let existing = Highlight::new(CharacterRange::new(2, 9), true);
        assert!(merge_highlights(&candidate, &existing).backward);
    }
}
