//! Marker application and removal
//!
//! A marker is an inline `span` wrapping one contiguous run of selected
//! text, tagged with its annotation's identifier both as a class
//! (`highlight-<id>`) and as a `data-annotation-id` attribute, plus the
//! generic `highlight` class for styling. A range that spans inline
//! element boundaries produces several fragments; the shared identifier is
//! the only thing tying them together.
//!
//! Wrapping is non-destructive: the original text nodes become children of
//! the marker, and removal restores the surrounding structure, merging the
//! text nodes it had split apart. The engine never keeps fragment lists;
//! fragments are re-queried by identifier through the view's class index.

use thiserror::Error;

use crate::view::{DocumentView, NodeId, Position, Selection, TreeOrder};

/// Generic class carried by every marker, used for styling and for
/// coverage counting
pub const MARKER_CLASS: &str = "highlight";

/// Prefix of the per-identifier marker class
pub const MARKER_CLASS_PREFIX: &str = "highlight-";

/// Attribute carrying the annotation identifier on each fragment
pub const ID_ATTRIBUTE: &str = "data-annotation-id";

/// Coverage tiers are clamped here so overlap depth never produces
/// unbounded class names
pub const MAX_COVERAGE_TIER: usize = 4;

/// The per-identifier class for an annotation id
pub fn identifier_class(identifier: &str) -> String {
    format!("{MARKER_CLASS_PREFIX}{identifier}")
}

fn coverage_class(tier: usize) -> String {
    format!("highlight_count_{tier}")
}

/// Marker errors
#[derive(Debug, Error)]
pub enum MarkerError {
    /// The view has no live selection to mark
    #[error("No live selection to mark")]
    NoSelection,

    /// The live selection is collapsed
    #[error("Selection is collapsed")]
    CollapsedSelection,

    /// Marker application produced no fragments where the range was
    /// expected to cover rendered text. Only the bookmark boundary search
    /// treats this as recoverable.
    #[error("Marker application produced no fragments")]
    EmptyMarkerResult,
}

/// Wrap the live selection's text in marker elements tagged with
/// `identifier`, returning the fragments created in document order.
///
/// Each maximal run of selected text nodes under a single parent becomes
/// one fragment. Runs containing only whitespace are skipped, so a range
/// covering no renderable characters yields an empty result and leaves the
/// view untouched.
pub fn apply_marker(
    view: &mut DocumentView,
    identifier: &str,
) -> Result<Vec<NodeId>, MarkerError> {
    let selection = view.selection().ok_or(MarkerError::NoSelection)?;
    if selection.is_collapsed() {
        return Err(MarkerError::CollapsedSelection);
    }
    // A selection whose nodes were detached by earlier surgery is no
    // selection at all
    if !view.is_attached(selection.anchor.node) || !view.is_attached(selection.focus.node) {
        return Err(MarkerError::NoSelection);
    }

    let order = TreeOrder::new(view, view.root());
    let a = order.position_key(view, selection.anchor);
    let b = order.position_key(view, selection.focus);
    let (start_key, end_key) = if a <= b { (a, b) } else { (b, a) };
    if start_key == end_key {
        return Err(MarkerError::CollapsedSelection);
    }

    // Covered character slices per text node, in document order
    let mut covered: Vec<(NodeId, usize, usize)> = Vec::new();
    for node in view.descendants(view.root()) {
        if !view.is_text(node) {
            continue;
        }
        let node_order = order.index(node).expect("node is in traversal");
        if node_order < start_key.0 || node_order > end_key.0 {
            continue;
        }
        let len = view.text_len(node);
        let from = if node_order == start_key.0 { start_key.1 } else { 0 };
        let to = if node_order == end_key.0 { end_key.1 } else { len };
        if from >= to {
            continue;
        }
        let content = view.text(node).expect("text node");
        let all_whitespace = content
            .chars()
            .skip(from)
            .take(to - from)
            .all(char::is_whitespace);
        if all_whitespace {
            continue;
        }
        covered.push((node, from, to));
    }

    if covered.is_empty() {
        return Ok(Vec::new());
    }

    // Split boundary nodes so covered slices become whole nodes
    let mut targets = Vec::with_capacity(covered.len());
    for (node, from, to) in covered {
        let len = view.text_len(node);
        let mut target = node;
        if to < len {
            view.split_text(node, to);
        }
        if from > 0 {
            target = view.split_text(node, from);
        }
        targets.push(target);
    }

    // Wrap each maximal run of adjacent covered siblings in one marker
    let mut fragments = Vec::new();
    let mut i = 0;
    while i < targets.len() {
        let parent = view.parent(targets[i]).expect("attached target");
        let start_index = view.child_index(targets[i]).expect("child index");
        let mut end_index = start_index + 1;
        let mut j = i + 1;
        while j < targets.len()
            && view.parent(targets[j]) == Some(parent)
            && view.child_index(targets[j]) == Some(end_index)
        {
            end_index += 1;
            j += 1;
        }
        let wrapper = view.create_element("span");
        view.add_class(wrapper, MARKER_CLASS);
        view.add_class(wrapper, &identifier_class(identifier));
        view.set_attribute(wrapper, ID_ATTRIBUTE, identifier);
        view.wrap_children(parent, start_index, end_index, wrapper);
        fragments.push(wrapper);
        i = j;
    }

    apply_coverage_classes(view, &fragments);

    // Keep the live selection coherent over the rewrapped text
    let first_child = view.children(fragments[0])[0];
    let last = *fragments.last().expect("nonempty fragments");
    let last_child = *view.children(last).last().expect("wrapped child");
    view.set_selection(Selection::new(
        Position::new(first_child, 0),
        Position::new(last_child, view.text_len(last_child)),
    ));

    Ok(fragments)
}

/// Tag each fragment with its clamped coverage tier: itself plus every
/// ancestor marker covering it
fn apply_coverage_classes(view: &mut DocumentView, fragments: &[NodeId]) {
    for &fragment in fragments {
        let mut count = view
            .classes(fragment)
            .iter()
            .filter(|class| class.starts_with(MARKER_CLASS_PREFIX))
            .count();
        let mut ancestor = view.parent(fragment);
        while let Some(node) = ancestor {
            if view.has_class(node, MARKER_CLASS) {
                count += 1;
            }
            ancestor = view.parent(node);
        }
        view.add_class(fragment, &coverage_class(count.min(MAX_COVERAGE_TIER)));
    }
}

/// Remove exactly the markers tagged with `identifier`, restoring the
/// structure around them without disturbing other identifiers' markers.
pub fn remove_marker(view: &mut DocumentView, identifier: &str) {
    // Snapshot first: the class query is backed by a live index and
    // unwrapping mutates it
    let markers = view.elements_with_class(&identifier_class(identifier));
    for marker in markers {
        let parent = view.parent(marker).expect("attached marker");
        view.unwrap(marker);
        view.normalize(parent);
    }
}

/// All fragments currently tagged with `identifier`, in document order
pub fn fragments_for(view: &DocumentView, identifier: &str) -> Vec<NodeId> {
    let mut fragments = view.elements_with_class(&identifier_class(identifier));
    let order = TreeOrder::new(view, view.root());
    fragments.sort_by_key(|&node| order.index(node).unwrap_or(usize::MAX));
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{apply_range, CharacterRange, Highlight};
    use crate::view::parse_document;

    fn select(view: &mut DocumentView, start: usize, end: usize) {
        apply_range(view, &Highlight::new(CharacterRange::new(start, end), false)).unwrap();
    }

    fn fragment_text(view: &DocumentView, identifier: &str) -> String {
        fragments_for(view, identifier)
            .into_iter()
            .flat_map(|f| view.descendants(f))
            .filter_map(|n| view.text(n))
            .collect()
    }

    #[test]
    fn test_single_fragment() {
        let mut view = parse_document("<p>Hello world, this is a test.</p>").unwrap();
        select(&mut view, 6, 11);

        let fragments = apply_marker(&mut view, "ann-1").unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragment_text(&view, "ann-1"), "world");

        let fragment = fragments[0];
        assert!(view.has_class(fragment, MARKER_CLASS));
        assert!(view.has_class(fragment, "highlight-ann-1"));
        assert!(view.has_class(fragment, "highlight_count_1"));
        assert_eq!(view.attribute(fragment, ID_ATTRIBUTE), Some("ann-1"));
    }

    #[test]
    fn test_fragments_split_at_element_boundaries() {
        let mut view = parse_document("<p>This is <i>less important</i> than that</p>").unwrap();
        // "is <i>less</i>" spans the italic boundary
        select(&mut view, 5, 12);

        let fragments = apply_marker(&mut view, "ann-1").unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragment_text(&view, "ann-1"), "is less");
    }

    #[test]
    fn test_apply_then_remove_is_identity() {
        let markup = "<p>This is <i>less important</i> than that</p>";
        let mut view = parse_document(markup).unwrap();
        let before = view.to_markup(view.root());

        select(&mut view, 5, 12);
        apply_marker(&mut view, "ann-1").unwrap();
        assert_ne!(view.to_markup(view.root()), before);

        remove_marker(&mut view, "ann-1");
        assert_eq!(view.to_markup(view.root()), before);
    }

    #[test]
    fn test_whitespace_only_range_yields_no_fragments() {
        let mut view = parse_document("<p>one</p><p>two</p>").unwrap();
        // [3,4) is the block separator between the paragraphs
        select(&mut view, 3, 4);

        let fragments = apply_marker(&mut view, "ann-1").unwrap();
        assert!(fragments.is_empty());
        assert!(fragments_for(&view, "ann-1").is_empty());
    }

    #[test]
    fn test_nested_markers_get_coverage_tiers() {
        let mut view = parse_document("<p>Hello world, this is a test.</p>").unwrap();
        select(&mut view, 0, 11);
        apply_marker(&mut view, "outer").unwrap();

        select(&mut view, 6, 11);
        let inner = apply_marker(&mut view, "inner").unwrap();

        assert_eq!(inner.len(), 1);
        assert!(view.has_class(inner[0], "highlight_count_2"));
    }

    #[test]
    fn test_coverage_tier_is_clamped() {
        let mut view = parse_document("<p>abcdefgh</p>").unwrap();
        for (i, id) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            select(&mut view, i.min(2), 8);
            apply_marker(&mut view, id).unwrap();
        }

        let deepest = fragments_for(&view, "f");
        assert!(deepest
            .iter()
            .any(|&f| view.has_class(f, "highlight_count_4")));
        for &fragment in &deepest {
            assert!(!view
                .classes(fragment)
                .iter()
                .any(|c| c == "highlight_count_5"));
        }
    }

    #[test]
    fn test_remove_targets_one_identifier_only() {
        let mut view = parse_document("<p>Hello world, this is a test.</p>").unwrap();
        select(&mut view, 0, 5);
        apply_marker(&mut view, "first").unwrap();
        select(&mut view, 6, 11);
        apply_marker(&mut view, "second").unwrap();

        remove_marker(&mut view, "first");

        assert!(fragments_for(&view, "first").is_empty());
        assert_eq!(fragment_text(&view, "second"), "world");
    }

    #[test]
    fn test_removal_merges_split_text_nodes() {
        let mut view = parse_document("<p>Hello world</p>").unwrap();
        select(&mut view, 2, 7);
        apply_marker(&mut view, "ann-1").unwrap();
        remove_marker(&mut view, "ann-1");

        let paragraph = view.children(view.content_root())[0];
        assert_eq!(view.children(paragraph).len(), 1);
        assert_eq!(view.text(view.children(paragraph)[0]), Some("Hello world"));
    }

    #[test]
    fn test_normalized_text_is_invariant_under_markers() {
        let mut view = parse_document("<p>Hello <i>world</i>, this is a test.</p>").unwrap();
        let before = crate::view::TextMap::build(&view).text().to_string();

        select(&mut view, 3, 14);
        apply_marker(&mut view, "ann-1").unwrap();
        assert_eq!(crate::view::TextMap::build(&view).text(), before);

        remove_marker(&mut view, "ann-1");
        assert_eq!(crate::view::TextMap::build(&view).text(), before);
    }
}
