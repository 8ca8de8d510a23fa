//! Crate-wide error type
//!
//! Component modules carry their own error enums; this aggregates them for
//! callers driving a whole session.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-wide error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation needed document content that has not arrived yet
    #[error("Document content is not loaded")]
    NotLoaded,

    #[error("Markup error: {0}")]
    Parse(#[from] crate::view::ParseError),

    #[error("Anchoring error: {0}")]
    Anchor(#[from] crate::anchor::AnchorError),

    #[error("Marker error: {0}")]
    Marker(#[from] crate::marker::MarkerError),

    #[error("Bookmark error: {0}")]
    Bookmark(#[from] crate::bookmark::BookmarkError),

    #[error("Store error: {0}")]
    Store(#[from] crate::annotations::StoreError),
}
