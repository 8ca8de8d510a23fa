//! Annotation records and store collaborators
//!
//! An annotation owns exactly one highlight, an identifier, and an opaque
//! payload (comment, author, visibility) the engine never interprets. The
//! bookmark is the single per-(reader, document) reading-position record.
//!
//! Persistence lives with external collaborators behind the store traits;
//! the engine notifies them fire-and-forget after local view mutations
//! complete.

mod store;
mod types;

pub use store::{
    AnnotationStore, BookmarkStore, MemoryAnnotationStore, MemoryBookmarkStore, StoreError,
};
pub use types::{Annotation, Bookmark};
