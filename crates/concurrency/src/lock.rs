//! Lock coordinator
//!
//! Scoped collection and document locks over the store's [`LockTable`].
//!
//! - `with_collection_lock(path, mode, body)` holds the collection lock for
//!   exactly the execution of `body`
//! - document locks can only be requested through a [`LockedCollection`],
//!   so the acquisition order is always collection-then-document
//! - release is tied to guard drop, so it happens exactly once on every exit
//!   path of `body`, including `?` returns and unwinding
//!
//! Acquisition that does not succeed within the configured timeout fails
//! with `LockFailure`.

use docbase_core::{CollectionPath, DocumentName, LockMode, Result};
use docbase_storage::{LockGuard, LockTable, LockTarget};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hands out scoped locks with a fixed acquisition timeout
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    table: Arc<LockTable>,
    timeout: Duration,
}

impl LockCoordinator {
    /// Coordinator over `table` waiting at most `timeout` per acquisition
    pub fn new(table: Arc<LockTable>, timeout: Duration) -> Self {
        Self { table, timeout }
    }

    /// Acquisition timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying lock table
    pub fn table(&self) -> &Arc<LockTable> {
        &self.table
    }

    fn acquire(&self, target: LockTarget, mode: LockMode) -> Result<LockGuard> {
        match self.table.acquire(target.clone(), mode, self.timeout) {
            Ok(guard) => {
                debug!(target: "docbase::lock", lock = %target, %mode, "Lock acquired");
                Ok(guard)
            }
            Err(e) => {
                warn!(target: "docbase::lock", lock = %target, %mode, error = %e, "Lock not granted");
                Err(e)
            }
        }
    }

    /// Run `body` while holding `path` in `mode`
    pub fn with_collection_lock<T, F>(&self, path: &CollectionPath, mode: LockMode, body: F) -> Result<T>
    where
        F: FnOnce(&LockedCollection<'_>) -> Result<T>,
    {
        let guard = self.acquire(LockTarget::Collection(path.clone()), mode)?;
        let locked = LockedCollection {
            coordinator: self,
            path: path.clone(),
            guard,
        };
        body(&locked)
    }

    /// Run `body` while holding document `name` of a locked collection in `mode`
    pub fn with_document_lock<T, F>(
        &self,
        collection: &LockedCollection<'_>,
        name: &DocumentName,
        mode: LockMode,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(&LockedDocument<'_>) -> Result<T>,
    {
        collection.with_document_lock(name, mode, body)
    }
}

/// A collection held under a lock for the duration of a closure
#[derive(Debug)]
pub struct LockedCollection<'a> {
    coordinator: &'a LockCoordinator,
    path: CollectionPath,
    guard: LockGuard,
}

impl<'a> LockedCollection<'a> {
    /// Path of the locked collection
    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Mode the collection is held in
    pub fn mode(&self) -> LockMode {
        self.guard.mode()
    }

    /// True if held for writing
    pub fn is_write(&self) -> bool {
        self.mode() == LockMode::Write
    }

    /// Run `body` while holding document `name` in `mode`
    pub fn with_document_lock<T, F>(&self, name: &DocumentName, mode: LockMode, body: F) -> Result<T>
    where
        F: FnOnce(&LockedDocument<'_>) -> Result<T>,
    {
        let target = LockTarget::Document {
            collection: self.path.clone(),
            name: name.clone(),
        };
        let guard = self.coordinator.acquire(target, mode)?;
        let locked = LockedDocument {
            collection: self,
            name: name.clone(),
            guard,
        };
        body(&locked)
    }
}

/// A document held under a lock for the duration of a closure
#[derive(Debug)]
pub struct LockedDocument<'a> {
    collection: &'a LockedCollection<'a>,
    name: DocumentName,
    guard: LockGuard,
}

impl<'a> LockedDocument<'a> {
    /// The locked collection this document lives in
    pub fn collection(&self) -> &LockedCollection<'a> {
        self.collection
    }

    /// Path of the owning collection
    pub fn collection_path(&self) -> &CollectionPath {
        self.collection.path()
    }

    /// Document name
    pub fn name(&self) -> &DocumentName {
        &self.name
    }

    /// Mode the document is held in
    pub fn mode(&self) -> LockMode {
        self.guard.mode()
    }

    /// True if held for writing
    pub fn is_write(&self) -> bool {
        self.mode() == LockMode::Write
    }

    /// Full path of the document, for messages
    pub fn display_path(&self) -> String {
        self.collection.path().document_path(&self.name)
    }
}
