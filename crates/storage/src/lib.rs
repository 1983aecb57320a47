//! Storage layer for docbase
//!
//! This crate implements the embedded hierarchical store:
//! - HierarchicalStore: path-addressed collections and documents behind a RwLock
//! - LockTable: per-path read/write locks with writer preference and timeouts
//! - Journal: per-transaction undo log for abort and blob bookkeeping
//! - BlobStore: DashMap-backed binary object store readable as a stream
//! - MimeTable: media type → preferred extension and content kind
//! - Permissions: unix-style owner/group/mode checks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod journal;
pub mod lock_table;
pub mod mime;
pub mod record;
pub mod security;
pub mod store;

pub use blob::{BlobId, BlobStore, BlobStream};
pub use journal::{Journal, UndoEntry};
pub use lock_table::{LockGuard, LockHolders, LockTable, LockTarget};
pub use mime::{normalize_media_type, ContentKind, MimeEntry, MimeTable, DEFAULT_MIME_TABLE};
pub use record::{
    CollectionMetadata, CollectionRecord, DocumentContent, DocumentMetadata, DocumentRecord,
};
pub use security::{Access, Permissions};
pub use store::HierarchicalStore;
