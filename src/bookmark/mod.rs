//! The reading-position anchor
//!
//! Exactly one bookmark is rendered per document view. The stored
//! highlight is usually a collapsed caret (the reader clicked somewhere),
//! and markers need a non-collapsed range to produce anything visible, so
//! rendering first snaps the caret onto a word: advance to the next word
//! end, then expand over the word plus its trailing space/punctuation, so
//! the marker never sits mid-word even when the click landed inside one.
//! When no word lies at or after the caret the range is widened by a
//! single character instead (backwards at the end of the document).
//!
//! Whether a range actually renders anything is not knowable up front:
//! ranges over collapsed whitespace produce zero fragments. The render
//! loop therefore tries adjacent ranges, shifting left one character at a
//! time until something sticks. This is a bounded linear search, not a
//! retry with backoff; it terminates at the document start.

use thiserror::Error;

use crate::anchor::{apply_range, AnchorError, CharacterRange, Highlight};
use crate::marker::{apply_marker, remove_marker, MarkerError};
use crate::view::{DocumentView, NodeId, TextMap};

/// Identifier under which bookmark markers are tagged
pub const BOOKMARK_ID: &str = "bookmark";

/// Render lifecycle of the bookmark in one document view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookmarkState {
    /// Neither content nor a stored bookmark has arrived
    #[default]
    Uninitialized,
    /// A render is in flight
    Rendering,
    /// The bookmark is on screen (or was created fresh)
    Rendered,
}

/// Bookmark rendering errors. Both conditions are non-fatal: reading
/// works without a visible bookmark.
#[derive(Debug, Error)]
pub enum BookmarkError {
    /// The document renders no text at all
    #[error("Document renders no text; bookmark cannot be displayed")]
    EmptyDocument,

    /// The boundary search ran out of positions
    #[error("No renderable position found for the bookmark")]
    NotRenderable,

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Marker(#[from] MarkerError),
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Snap a caret onto the nearest word at or after it: the word's full
/// span plus trailing space/punctuation up to the next word or line break.
/// Returns `None` when no word lies at or after the caret.
pub fn snap_to_word(text: &str, caret: usize) -> Option<CharacterRange> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = caret.min(chars.len());

    // Advance to the end of the current word, or of the next one
    if i < chars.len() && is_word_char(chars[i]) {
        while i < chars.len() && is_word_char(chars[i]) {
            i += 1;
        }
    } else {
        while i < chars.len() && !is_word_char(chars[i]) {
            i += 1;
        }
        if i == chars.len() {
            return None;
        }
        while i < chars.len() && is_word_char(chars[i]) {
            i += 1;
        }
    }

    let mut start = i;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = i;
    while end < chars.len() && !is_word_char(chars[end]) && chars[end] != '\n' {
        end += 1;
    }
    Some(CharacterRange::new(start, end))
}

/// Widen a collapsed range by one character: forward, or backward when the
/// caret sits at the very end of the text
fn widen(range: CharacterRange, length: usize) -> CharacterRange {
    if range.end == length {
        CharacterRange::new(range.start.saturating_sub(1), range.end)
    } else {
        CharacterRange::new(range.start, range.end + 1)
    }
}

/// Render the stored bookmark position as a visible marker.
///
/// Any previously rendered bookmark markers are removed first, so at most
/// one bookmark is ever on screen. Returns the fragments created.
pub fn render_bookmark(
    view: &mut DocumentView,
    stored: &Highlight,
) -> Result<Vec<NodeId>, BookmarkError> {
    remove_marker(view, BOOKMARK_ID);

    let map = TextMap::build(view);
    if map.is_empty() {
        return Err(BookmarkError::EmptyDocument);
    }
    let length = map.len();

    let mut range = stored.character_range;
    if range.is_collapsed() {
        range = match snap_to_word(map.text(), range.start) {
            Some(snapped) => snapped,
            None => widen(range, length),
        };
    }
    drop(map);

    loop {
        apply_range(view, &Highlight::new(range, false))?;
        let fragments = apply_marker(view, BOOKMARK_ID)?;
        if !fragments.is_empty() {
            view.collapse_selection_to_end();
            return Ok(fragments);
        }
        if range.start == 0 {
            return Err(BookmarkError::NotRenderable);
        }
        range = CharacterRange::new(range.start - 1, range.end - 1);
    }
}
