//! Selection capture and restore
//!
//! A [`Highlight`] is the durable, serializable representation of a
//! selection: a character interval over the content root's normalized text
//! plus the drag direction. Node structure is never stable across renders,
//! so highlights are the only form an annotation's position survives in.
//!
//! Capturing requires a live selection on the view; restoring sets one.
//! Collapse and scope checks belong to the caller (see
//! [`is_selection_in_content_root`]) so the codec stays total over valid
//! inputs.

mod wire;

pub use wire::{HighlightEnvelope, WireError, WireHighlight};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::view::{DocumentView, Selection, TextMap, TextMapError};

/// A character interval over normalized text, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRange {
    pub start: usize,
    pub end: usize,
}

impl CharacterRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "range start past end");
        Self { start, end }
    }

    /// Zero-length range at a caret position
    pub fn collapsed(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }
}

/// A stored selection: character range plus drag direction.
///
/// `backward` records that the selection was dragged right-to-left (anchor
/// at `end`, focus at `start`). It is preserved through round trips but
/// never affects range semantics. Highlights are immutable; widening
/// produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub character_range: CharacterRange,
    pub backward: bool,
}

impl Highlight {
    pub fn new(character_range: CharacterRange, backward: bool) -> Self {
        Self {
            character_range,
            backward,
        }
    }

    /// Zero-length highlight at a caret position
    pub fn collapsed(at: usize) -> Self {
        Self {
            character_range: CharacterRange::collapsed(at),
            backward: false,
        }
    }

    pub fn start(&self) -> usize {
        self.character_range.start
    }

    pub fn end(&self) -> usize {
        self.character_range.end
    }

    pub fn is_collapsed(&self) -> bool {
        self.character_range.is_collapsed()
    }
}

/// Range codec errors
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The view has no live selection
    #[error("No live selection to capture")]
    NoSelection,

    /// The selection is collapsed where a range was required
    #[error("Selection is collapsed")]
    CollapsedSelection,

    /// A selection endpoint lies outside the content root
    #[error("Selection endpoint outside the content root")]
    OutOfScope,

    /// Coordinate mapping failed
    #[error("Coordinate mapping failed: {0}")]
    Map(TextMapError),
}

impl From<TextMapError> for AnchorError {
    fn from(err: TextMapError) -> Self {
        match err {
            TextMapError::OutOfScope => AnchorError::OutOfScope,
            other => AnchorError::Map(other),
        }
    }
}

/// Capture the live selection as a highlight, collapsed selections
/// allowed. Used for caret positions (bookmark saves); annotation capture
/// goes through [`capture_range`].
pub fn capture_caret(view: &DocumentView) -> Result<Highlight, AnchorError> {
    let selection = view.selection().ok_or(AnchorError::NoSelection)?;
    let map = TextMap::build(view);
    let anchor = map.to_normalized_offset(view, selection.anchor)?;
    let focus = map.to_normalized_offset(view, selection.focus)?;
    let backward = focus < anchor;
    Ok(Highlight::new(
        CharacterRange::new(anchor.min(focus), anchor.max(focus)),
        backward,
    ))
}

/// Capture the live selection as a non-collapsed highlight
pub fn capture_range(view: &DocumentView) -> Result<Highlight, AnchorError> {
    let highlight = capture_caret(view)?;
    if highlight.is_collapsed() {
        return Err(AnchorError::CollapsedSelection);
    }
    Ok(highlight)
}

/// Restore a stored highlight as the view's live selection so a marker
/// operation can act on it. Idempotent; the transient selection is the
/// only effect.
pub fn apply_range(view: &mut DocumentView, highlight: &Highlight) -> Result<(), AnchorError> {
    let map = TextMap::build(view);
    let start = map.to_tree_position(highlight.start())?;
    let end = map.to_tree_position(highlight.end())?;
    let selection = if highlight.backward {
        Selection::new(end, start)
    } else {
        Selection::new(start, end)
    };
    view.set_selection(selection);
    Ok(())
}

/// Whether every endpoint of the live selection lies inside the content
/// root. Callers must guard with this before capturing; a selection that
/// strays outside is collapsed and ignored.
pub fn is_selection_in_content_root(view: &DocumentView) -> bool {
    match view.selection() {
        Some(selection) => {
            let root = view.content_root();
            view.contains(root, selection.anchor.node) && view.contains(root, selection.focus.node)
        }
        None => false,
    }
}
