//! Marginalia
//!
//! A text anchoring and annotation engine for shared-document reading.
//! Readers highlight passages, attach comments through an external
//! collaborator, and resume reading from a saved bookmark; this crate owns
//! the hard part of that product: converting selections into
//! position-stable character ranges over a document's normalized text,
//! re-applying stored ranges onto a freshly parsed document, resolving
//! overlap between annotations, and keeping the marker fragments of one
//! annotation visually synchronized.
//!
//! The document is re-rendered from data on every load, so node structure
//! is never stable across sessions. Ranges over normalized text are the
//! durable truth; marker elements are ephemeral and re-queried by
//! identifier whenever needed.
//!
//! # Modules
//!
//! - `view`: the document view model (node tree, selection, coordinate map)
//! - `anchor`: selection capture/restore and the highlight wire format
//! - `marker`: marker element application and removal
//! - `overlap`: overlap detection and merge policy
//! - `bookmark`: the single reading-position anchor
//! - `hover`: hover synchronization across marker fragments
//! - `annotations`: annotation records and store collaborator traits
//! - `session`: per-document orchestration of all of the above

pub mod anchor;
pub mod annotations;
pub mod bookmark;
pub mod error;
pub mod hover;
pub mod marker;
pub mod overlap;
pub mod session;
pub mod view;

pub use anchor::{CharacterRange, Highlight};
pub use annotations::{Annotation, Bookmark};
pub use error::{EngineError, Result};
pub use session::{HighlightOutcome, ReaderSession};
pub use view::{DocumentView, NodeId, Position, Selection};
