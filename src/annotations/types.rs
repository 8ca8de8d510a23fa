//! Annotation and bookmark records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::anchor::Highlight;

/// A user-authored annotation anchored by one highlight.
///
/// The payload carries whatever the surrounding product attaches (comment
/// text, author, visibility); the engine treats it as opaque JSON. The
/// highlight is replaced wholesale when a merge widens it; records are
/// otherwise immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Unique identifier (UUID)
    pub id: Uuid,
    /// The anchored range over normalized text
    pub highlight: Highlight,
    /// Opaque product payload, not interpreted by the engine
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub payload: Value,
    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    /// Create an annotation with a fresh identifier and empty payload
    pub fn new(highlight: Highlight) -> Self {
        Self::with_id(Uuid::new_v4(), highlight)
    }

    /// Create an annotation under a caller-chosen identifier
    pub fn with_id(id: Uuid, highlight: Highlight) -> Self {
        let now = Utc::now();
        Self {
            id,
            highlight,
            payload: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a product payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// A copy of this record carrying a replacement highlight, stamped as
    /// modified now. Used when a merge widens the span.
    pub fn with_highlight(&self, highlight: Highlight) -> Self {
        Self {
            id: self.id,
            highlight,
            payload: self.payload.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// The identifier in the form markers are tagged with
    pub fn marker_id(&self) -> String {
        self.id.to_string()
    }
}

/// The single reading-position record for one reader in one document.
///
/// The stored highlight may be collapsed (a caret); rendering always
/// widens it to a visible, word-aligned marker. Created lazily on first
/// read, updated in place afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique identifier (UUID)
    pub id: Uuid,
    /// The document (section path) the bookmark lives in
    pub document: String,
    /// The saved reading position
    pub highlight: Highlight,
    /// Last modification timestamp
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(document: &str, highlight: Highlight) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: document.to_string(),
            highlight,
            updated_at: Utc::now(),
        }
    }

    /// A copy carrying a replacement position, stamped as modified now
    pub fn with_highlight(&self, highlight: Highlight) -> Self {
        Self {
            id: self.id,
            document: self.document.clone(),
            highlight,
            updated_at: Utc::now(),
        }
    }
}
