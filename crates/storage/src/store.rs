//! HierarchicalStore: in-memory, path-addressed collection/document store
//!
//! # Design
//!
//! - `parking_lot::RwLock<BTreeMap<CollectionPath, CollectionRecord>>` holds
//!   the namespace; the map lock is held only for the duration of a single
//!   call, never across calls
//! - Isolation between operations comes from the [`LockTable`], which callers
//!   acquire before touching a collection or document
//! - Every mutation takes the caller's [`Journal`] and records how to undo it;
//!   [`HierarchicalStore::rollback`] replays the journal, [`HierarchicalStore::commit`]
//!   discards it and releases orphaned blobs
//! - A store-wide monotonic clock stamps mutations, so last-modified strictly
//!   increases even when the wall clock does not advance between two writes
//!
//! Permission checks use the resource's [`Permissions`]; the system principal
//! bypasses them.

use crate::blob::{BlobId, BlobStore};
use crate::journal::{Journal, UndoEntry};
use crate::lock_table::LockTable;
use crate::mime::{MimeTable, DEFAULT_MIME_TABLE};
use crate::record::{
    CollectionMetadata, CollectionRecord, DocumentContent, DocumentMetadata, DocumentRecord,
};
use crate::security::{Access, Permissions};
use docbase_core::{CollectionPath, DocumentName, Error, Principal, Result, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The embedded hierarchical store
#[derive(Debug)]
pub struct HierarchicalStore {
    collections: RwLock<BTreeMap<CollectionPath, CollectionRecord>>,
    blobs: BlobStore,
    locks: Arc<LockTable>,
    mime: MimeTable,
    clock: Mutex<Timestamp>,
    next_document_id: AtomicU64,
    closed: AtomicBool,
}

impl Default for HierarchicalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalStore {
    /// Create a store holding only the root collection, with the built-in media types
    pub fn new() -> Self {
        Self::with_mime_table(DEFAULT_MIME_TABLE.clone())
    }

    /// Create a store with a custom media-type table
    pub fn with_mime_table(mime: MimeTable) -> Self {
        let created = Timestamp::now();
        let root = CollectionRecord::new(
            CollectionPath::root(),
            created,
            Permissions::for_collection(Principal::System),
        );
        let mut collections = BTreeMap::new();
        collections.insert(CollectionPath::root(), root);

        Self {
            collections: RwLock::new(collections),
            blobs: BlobStore::new(),
            locks: Arc::new(LockTable::new()),
            mime,
            clock: Mutex::new(created),
            next_document_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close the store; every later operation fails with `StorageFailure`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(target: "docbase::db", "Store closed");
        }
    }

    /// True once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fail with `StorageFailure` if the store is closed
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::storage("store is closed"))
        } else {
            Ok(())
        }
    }

    /// Lock table shared by all transactions on this store
    pub fn locks(&self) -> &Arc<LockTable> {
        &self.locks
    }

    /// Media-type table
    pub fn mime_table(&self) -> &MimeTable {
        &self.mime
    }

    /// Blob store
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Next tick of the store clock, strictly greater than every earlier tick
    pub fn tick(&self) -> Timestamp {
        let mut last = self.clock.lock();
        let now = Timestamp::now().max(last.next());
        *last = now;
        now
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// True if the collection exists
    pub fn collection_exists(&self, path: &CollectionPath) -> bool {
        self.collections.read().contains_key(path)
    }

    /// Metadata of a collection
    pub fn collection_metadata(&self, path: &CollectionPath) -> Option<CollectionMetadata> {
        self.collections.read().get(path).map(CollectionRecord::metadata)
    }

    /// Fail with `PermissionDenied` unless `principal` may access the collection
    ///
    /// A missing collection is a `StorageFailure`.
    pub fn check_collection_access(
        &self,
        path: &CollectionPath,
        principal: Principal,
        access: Access,
    ) -> Result<()> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let record = collections
            .get(path)
            .ok_or_else(|| Error::storage(format!("collection {} does not exist", path)))?;
        record.permissions.check(principal, access, &path.to_string())
    }

    /// Create a collection and any missing ancestors
    ///
    /// Returns the collection's metadata and whether anything was created.
    /// Atomic with respect to concurrent creators: the namespace is updated
    /// under a single write lock.
    pub fn create_collection(
        &self,
        path: &CollectionPath,
        principal: Principal,
        journal: &mut Journal,
    ) -> Result<(CollectionMetadata, bool)> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let mut created_any = false;

        for ancestor in path.lineage() {
            if collections.contains_key(&ancestor) {
                continue;
            }
            let parent = ancestor
                .parent()
                .ok_or_else(|| Error::storage("root collection is missing"))?;
            let parent_record = collections
                .get(&parent)
                .ok_or_else(|| Error::storage(format!("collection {} does not exist", parent)))?;
            parent_record
                .permissions
                .check(principal, Access::Write, &parent.to_string())?;

            let record = CollectionRecord::new(
                ancestor.clone(),
                self.tick(),
                Permissions::for_collection(principal),
            );
            collections.insert(ancestor.clone(), record);
            journal.record(UndoEntry::CollectionCreated(ancestor.clone()));
            created_any = true;
            debug!(target: "docbase::db", collection = %ancestor, "Collection created");
        }

        let metadata = collections
            .get(path)
            .map(CollectionRecord::metadata)
            .ok_or_else(|| Error::storage(format!("collection {} was not created", path)))?;
        Ok((metadata, created_any))
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Names of the documents in a collection, in name order
    pub fn document_names(&self, path: &CollectionPath) -> Result<Vec<DocumentName>> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let record = collections
            .get(path)
            .ok_or_else(|| Error::storage(format!("collection {} does not exist", path)))?;
        Ok(record.documents.keys().cloned().collect())
    }

    /// True if the collection holds a document of this name
    pub fn document_exists(&self, path: &CollectionPath, name: &DocumentName) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(path)
            .map(|c| c.documents.contains_key(name))
            .unwrap_or(false))
    }

    /// Snapshot of a document record
    pub fn document(&self, path: &CollectionPath, name: &DocumentName) -> Result<Option<DocumentRecord>> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(path)
            .and_then(|c| c.documents.get(name))
            .cloned())
    }

    /// Metadata of a document
    pub fn document_metadata(
        &self,
        path: &CollectionPath,
        name: &DocumentName,
    ) -> Result<Option<DocumentMetadata>> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(path)
            .and_then(|c| c.documents.get(name))
            .map(|d| d.metadata(path)))
    }

    /// Write bytes into the blob store on behalf of a transaction
    pub fn put_blob(&self, bytes: &[u8], journal: &mut Journal) -> Result<BlobId> {
        self.ensure_open()?;
        let id = self.blobs.put(bytes);
        journal.blob_created(id);
        Ok(id)
    }

    /// Create a document, or overwrite it in place if the name exists
    ///
    /// Overwriting keeps the id, creation time and permissions and bumps
    /// last-modified. Creating requires write access to the collection;
    /// overwriting requires write access to the document.
    pub fn put_document(
        &self,
        path: &CollectionPath,
        name: &DocumentName,
        media_type: &str,
        content: DocumentContent,
        principal: Principal,
        journal: &mut Journal,
    ) -> Result<DocumentMetadata> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(path)
            .ok_or_else(|| Error::storage(format!("collection {} does not exist", path)))?;
        let now = self.tick();

        let record = match collection.documents.get_mut(name) {
            Some(existing) => {
                existing.permissions.check(
                    principal,
                    Access::Write,
                    &path.document_path(name),
                )?;
                let previous = existing.clone();
                existing.media_type = media_type.to_string();
                existing.content = content;
                existing.last_modified = now;
                if let Some(old_blob) = previous.content.blob_id() {
                    journal.blob_orphaned(old_blob);
                }
                journal.record(UndoEntry::DocumentReplaced {
                    collection: path.clone(),
                    previous,
                });
                existing.clone()
            }
            None => {
                collection
                    .permissions
                    .check(principal, Access::Write, &path.to_string())?;
                let record = DocumentRecord {
                    id: self.next_document_id.fetch_add(1, Ordering::Relaxed) + 1,
                    name: name.clone(),
                    created: now,
                    last_modified: now,
                    permissions: Permissions::for_document(principal),
                    media_type: media_type.to_string(),
                    content,
                };
                collection.documents.insert(name.clone(), record.clone());
                journal.record(UndoEntry::DocumentCreated {
                    collection: path.clone(),
                    name: name.clone(),
                });
                record
            }
        };

        debug!(
            target: "docbase::db",
            document = %path.document_path(name),
            id = record.id,
            "Document stored"
        );
        Ok(record.metadata(path))
    }

    /// Remove a document; returns false if it did not exist
    pub fn remove_document(
        &self,
        path: &CollectionPath,
        name: &DocumentName,
        principal: Principal,
        journal: &mut Journal,
    ) -> Result<bool> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(path)
            .ok_or_else(|| Error::storage(format!("collection {} does not exist", path)))?;
        collection
            .permissions
            .check(principal, Access::Write, &path.to_string())?;

        let Some(previous) = collection.documents.remove(name) else {
            return Ok(false);
        };
        if let Some(blob) = previous.content.blob_id() {
            journal.blob_orphaned(blob);
        }
        journal.record(UndoEntry::DocumentRemoved {
            collection: path.clone(),
            previous,
        });
        debug!(target: "docbase::db", document = %path.document_path(name), "Document removed");
        Ok(true)
    }

    // ========================================================================
    // Transaction outcome
    // ========================================================================

    /// Make a transaction's mutations permanent
    ///
    /// Releases blobs the committed state no longer references.
    pub fn commit(&self, journal: Journal) -> Result<()> {
        self.ensure_open()?;
        let (_, _, orphaned) = journal.into_parts();
        for blob in orphaned {
            self.blobs.remove(blob);
        }
        Ok(())
    }

    /// Undo a transaction's mutations, newest first
    ///
    /// Works on a closed store too, so an in-flight transaction can still be
    /// unwound while the database shuts down.
    pub fn rollback(&self, journal: Journal) {
        let (entries, created, _) = journal.into_parts();
        let mut collections = self.collections.write();
        for entry in entries {
            match entry {
                UndoEntry::CollectionCreated(path) => {
                    collections.remove(&path);
                }
                UndoEntry::DocumentCreated { collection, name } => {
                    if let Some(c) = collections.get_mut(&collection) {
                        c.documents.remove(&name);
                    }
                }
                UndoEntry::DocumentReplaced {
                    collection,
                    previous,
                }
                | UndoEntry::DocumentRemoved {
                    collection,
                    previous,
                } => match collections.get_mut(&collection) {
                    Some(c) => {
                        c.documents.insert(previous.name.clone(), previous);
                    }
                    None => warn!(
                        target: "docbase::db",
                        collection = %collection,
                        "Rollback target collection vanished"
                    ),
                },
            }
        }
        drop(collections);
        for blob in created {
            self.blobs.remove(blob);
        }
    }
}
