//! Document view model
//!
//! Provides the in-memory stand-in for the rendered document:
//! - Node tree with classes, attributes, and a class index (`tree`)
//! - Markup ingestion and serialization (`parser`)
//! - Normalized text extraction and coordinate mapping (`text`)
//!
//! The view holds the two pieces of process-wide mutable state the engine
//! operates on: the content tree and the single current selection. All
//! mutation is expected to be serialized by the owning session.

mod parser;
mod text;
mod tree;

pub use parser::{parse_document, sanitize_markup, ParseError, CONTENT_ROOT_ID};
pub use text::{TextMap, TextMapError};
pub use tree::{DocumentView, Node, NodeId, NodeKind, Position, Selection};

pub(crate) use tree::TreeOrder;
