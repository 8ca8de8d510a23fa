//! Store collaborator traits
//!
//! The engine owns no persistence. After a local view mutation completes
//! it notifies these collaborators fire-and-forget; a store failure is
//! reported back but never rolls the local markers back. Implementations
//! are expected to do their own queueing/transport.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::types::{Annotation, Bookmark};

/// Store collaborator errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store rejected the operation: {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Consumes annotation lifecycle events for one document
pub trait AnnotationStore: Send + Sync {
    fn create(&self, annotation: &Annotation) -> Result<(), StoreError>;
    fn update(&self, annotation: &Annotation) -> Result<(), StoreError>;
    fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Persists the single per-(reader, document) bookmark
pub trait BookmarkStore: Send + Sync {
    fn create(&self, bookmark: &Bookmark) -> Result<(), StoreError>;
    fn update(&self, bookmark: &Bookmark) -> Result<(), StoreError>;
}

/// In-memory annotation store, for tests and embedding without a backend
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    records: Mutex<HashMap<Uuid, Annotation>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Annotation> {
        self.records.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn create(&self, annotation: &Annotation) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(annotation.id, annotation.clone());
        Ok(())
    }

    fn update(&self, annotation: &Annotation) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if !records.contains_key(&annotation.id) {
            return Err(StoreError::Rejected(format!(
                "unknown annotation {}",
                annotation.id
            )));
        }
        records.insert(annotation.id, annotation.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.records.lock().remove(&id);
        Ok(())
    }
}

/// In-memory bookmark store
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    record: Mutex<Option<Bookmark>>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Bookmark> {
        self.record.lock().clone()
    }
}

impl BookmarkStore for MemoryBookmarkStore {
    fn create(&self, bookmark: &Bookmark) -> Result<(), StoreError> {
        *self.record.lock() = Some(bookmark.clone());
        Ok(())
    }

    fn update(&self, bookmark: &Bookmark) -> Result<(), StoreError> {
        *self.record.lock() = Some(bookmark.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{CharacterRange, Highlight};

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryAnnotationStore::new();
        let annotation = Annotation::new(Highlight::new(CharacterRange::new(0, 5), false));

        store.create(&annotation).unwrap();
        assert_eq!(store.len(), 1);

        let widened =
            annotation.with_highlight(Highlight::new(CharacterRange::new(0, 9), false));
        store.update(&widened).unwrap();
        assert_eq!(
            store.get(annotation.id).unwrap().highlight.character_range,
            CharacterRange::new(0, 9)
        );

        store.delete(annotation.id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_unknown_record_rejected() {
        let store = MemoryAnnotationStore::new();
        let annotation = Annotation::new(Highlight::new(CharacterRange::new(0, 5), false));
        assert!(matches!(
            store.update(&annotation),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn test_bookmark_store_holds_single_record() {
        let store = MemoryBookmarkStore::new();
        let first = Bookmark::new("doc", Highlight::collapsed(0));
        let moved = first.with_highlight(Highlight::collapsed(12));

        store.create(&first).unwrap();
        store.update(&moved).unwrap();

        let held = store.get().unwrap();
        assert_eq!(held.id, first.id);
        assert_eq!(held.highlight.character_range, CharacterRange::collapsed(12));
    }
}
