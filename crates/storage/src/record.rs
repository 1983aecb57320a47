//! Collection and document records
//!
//! Records are the store's own representation of its resources. Callers get
//! cloned snapshots ([`DocumentRecord`] clones share structured trees through
//! an `Arc`) or the lighter [`DocumentMetadata`] view.

use crate::blob::{BlobId, BlobStore};
use crate::mime::ContentKind;
use crate::security::Permissions;
use docbase_core::{CollectionPath, DocumentName, Error, Result, Timestamp, XmlDocument};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

/// Content of a document
#[derive(Debug, Clone)]
pub enum DocumentContent {
    /// Parsed XML tree
    Structured(Arc<XmlDocument>),
    /// Bytes held in the blob store
    Binary {
        /// Blob holding the bytes
        blob_id: BlobId,
        /// Length in bytes
        length: u64,
    },
}

impl DocumentContent {
    /// Content kind tag
    pub fn kind(&self) -> ContentKind {
        match self {
            DocumentContent::Structured(_) => ContentKind::Structured,
            DocumentContent::Binary { .. } => ContentKind::Binary,
        }
    }

    /// Length in bytes of the content's canonical serialization
    pub fn length(&self) -> u64 {
        match self {
            DocumentContent::Structured(doc) => doc.to_xml_string().len() as u64,
            DocumentContent::Binary { length, .. } => *length,
        }
    }

    /// The XML tree, for structured content
    pub fn as_structured(&self) -> Option<&Arc<XmlDocument>> {
        match self {
            DocumentContent::Structured(doc) => Some(doc),
            DocumentContent::Binary { .. } => None,
        }
    }

    /// Blob identifier, for binary content
    pub fn blob_id(&self) -> Option<BlobId> {
        match self {
            DocumentContent::Binary { blob_id, .. } => Some(*blob_id),
            DocumentContent::Structured(_) => None,
        }
    }

    /// Canonical bytes of the content
    ///
    /// Structured content is serialized as markup; binary content is copied
    /// out of the blob store into a buffer sized to the known length.
    pub fn to_bytes(&self, blobs: &BlobStore) -> Result<Vec<u8>> {
        match self {
            DocumentContent::Structured(doc) => Ok(doc.to_xml_string().into_bytes()),
            DocumentContent::Binary { blob_id, length } => {
                let mut stream = blobs.open(*blob_id).ok_or_else(|| {
                    Error::storage(format!("{} is missing from the blob store", blob_id))
                })?;
                let mut out = Vec::with_capacity(*length as usize);
                stream
                    .read_to_end(&mut out)
                    .map_err(|e| Error::storage_caused_by(format!("reading {}", blob_id), e))?;
                Ok(out)
            }
        }
    }
}

/// A stored document
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Store-wide numeric identifier
    pub id: u64,
    /// Name within the owning collection
    pub name: DocumentName,
    /// Creation time
    pub created: Timestamp,
    /// Time of the last successful mutation
    pub last_modified: Timestamp,
    /// Owner, group and mode
    pub permissions: Permissions,
    /// Media type the content was stored with
    pub media_type: String,
    /// The content
    pub content: DocumentContent,
}

impl DocumentRecord {
    /// Metadata view of this record
    pub fn metadata(&self, collection: &CollectionPath) -> DocumentMetadata {
        DocumentMetadata {
            id: self.id,
            name: self.name.clone(),
            collection: collection.clone(),
            created: self.created,
            last_modified: self.last_modified,
            owner: self.permissions.owner().to_string(),
            group: self.permissions.group().to_string(),
            permissions: self.permissions.descriptor(),
            media_type: self.media_type.clone(),
            kind: self.content.kind(),
            length: self.content.length(),
        }
    }
}

/// Metadata of a document, detached from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Store-wide numeric identifier
    pub id: u64,
    /// Document name
    pub name: DocumentName,
    /// Owning collection
    pub collection: CollectionPath,
    /// Creation time
    pub created: Timestamp,
    /// Last modification time
    pub last_modified: Timestamp,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Unix-style permission descriptor
    pub permissions: String,
    /// Media type
    pub media_type: String,
    /// Structured or binary
    pub kind: ContentKind,
    /// Content length in bytes
    pub length: u64,
}

/// A stored collection
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    /// Absolute path
    pub path: CollectionPath,
    /// Creation time
    pub created: Timestamp,
    /// Owner, group and mode
    pub permissions: Permissions,
    /// Documents by name
    pub documents: BTreeMap<DocumentName, DocumentRecord>,
}

impl CollectionRecord {
    /// An empty collection
    pub fn new(path: CollectionPath, created: Timestamp, permissions: Permissions) -> Self {
        CollectionRecord {
            path,
            created,
            permissions,
            documents: BTreeMap::new(),
        }
    }

    /// Metadata view of this record
    pub fn metadata(&self) -> CollectionMetadata {
        CollectionMetadata {
            path: self.path.clone(),
            created: self.created,
            owner: self.permissions.owner().to_string(),
            group: self.permissions.group().to_string(),
            permissions: self.permissions.descriptor(),
            document_count: self.documents.len(),
        }
    }
}

/// Metadata of a collection, detached from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionMetadata {
    /// Absolute path
    pub path: CollectionPath,
    /// Creation time
    pub created: Timestamp,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Unix-style permission descriptor
    pub permissions: String,
    /// Number of documents directly inside
    pub document_count: usize,
}
