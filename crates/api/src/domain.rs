//! Records returned by [`DocumentService`](crate::DocumentService)
//!
//! Timestamps stay [`Timestamp`]s for comparison; `DocumentSummary` also
//! carries them as UTC date-times for presentation.

use chrono::{DateTime, Utc};
use docbase_core::Timestamp;
use docbase_engine::Representation;
use docbase_storage::{ContentKind, DocumentMetadata};
use serde::Serialize;

// =============================================================================
// Mutations
// =============================================================================

/// Result of creating a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Generated document id (its name in the documents collection)
    pub id: String,
    /// Last-modified time read back after the store
    pub last_modified: Timestamp,
}

/// Result of applying a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patched {
    /// Last-modified time after the patch
    pub last_modified: Timestamp,
    /// Number of nodes the directives affected
    pub applied: u64,
}

// =============================================================================
// Reads
// =============================================================================

/// A document rendered for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    /// Last-modified time of the rendered state
    pub last_modified: Timestamp,
    /// The rendered document
    pub representation: Representation,
}

/// One entry of a collection listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    /// Document id
    pub id: String,
    /// Store-wide numeric identifier
    pub number: u64,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Unix-style permission descriptor
    pub permissions: String,
    /// Media type the document was stored with
    pub media_type: String,
    /// Whether the content is kept as XML or as raw bytes
    pub kind: ContentKind,
    /// Content length in bytes
    pub length: u64,
}

impl From<&DocumentMetadata> for DocumentSummary {
    fn from(metadata: &DocumentMetadata) -> Self {
        DocumentSummary {
            id: metadata.name.to_string(),
            number: metadata.id,
            created: metadata.created.to_datetime(),
            last_modified: metadata.last_modified.to_datetime(),
            owner: metadata.owner.clone(),
            group: metadata.group.clone(),
            permissions: metadata.permissions.clone(),
            media_type: metadata.media_type.clone(),
            kind: metadata.kind,
            length: metadata.length,
        }
    }
}

/// All documents of the service's collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentListing {
    /// One summary per document, in store order
    pub documents: Vec<DocumentSummary>,
    /// Newest document timestamp, or the listing time when empty
    pub last_modified: Timestamp,
}

impl DocumentListing {
    pub(crate) fn new(documents: Vec<DocumentSummary>, newest: Option<Timestamp>) -> Self {
        DocumentListing {
            documents,
            last_modified: newest.unwrap_or_else(Timestamp::now),
        }
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True if the collection holds no documents
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
