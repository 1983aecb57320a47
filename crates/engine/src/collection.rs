//! Collection store
//!
//! Resolves or creates path-addressed collections and enumerates the
//! documents they hold.

use crate::database::Database;
use docbase_concurrency::{LockedCollection, Transaction};
use docbase_core::{CollectionPath, DocumentName, LockMode, Result};
use docbase_storage::{CollectionMetadata, DocumentMetadata, HierarchicalStore};
use std::sync::Arc;
use tracing::info;

/// Collection operations on a [`Database`]
#[derive(Debug, Clone, Copy)]
pub struct CollectionStore<'db> {
    db: &'db Database,
}

impl<'db> CollectionStore<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Return the collection at `path`, creating it and any missing ancestors
    ///
    /// Idempotent. Creation happens under the collection's write lock and is
    /// undone if the transaction aborts.
    pub fn get_or_create(&self, txn: &mut Transaction<'_>, path: &CollectionPath) -> Result<CollectionMetadata> {
        self.db
            .locks()
            .with_collection_lock(path, LockMode::Write, |_| {
                let (metadata, created) = txn.create_collection(path)?;
                if created {
                    info!(
                        target: "docbase::db",
                        collection = %metadata.path,
                        owner = %metadata.owner,
                        "Collection created"
                    );
                }
                Ok(metadata)
            })
    }

    /// Metadata of an existing collection
    pub fn get(&self, txn: &Transaction<'_>, path: &CollectionPath) -> Option<CollectionMetadata> {
        txn.store().collection_metadata(path)
    }

    /// Enumerate the documents of a locked collection
    ///
    /// The iterator borrows the collection lock, so it cannot outlive it.
    /// Metadata for each document is read when the iterator reaches it.
    pub fn list<'l>(&self, txn: &Transaction<'_>, collection: &'l LockedCollection<'_>) -> Result<DocumentIter<'l>> {
        let store = Arc::clone(txn.store());
        let names = store.document_names(collection.path())?;
        Ok(DocumentIter {
            store,
            path: collection.path(),
            names: names.into_iter(),
        })
    }
}

/// Lazy, single-pass enumeration of a collection's document metadata
#[derive(Debug)]
pub struct DocumentIter<'l> {
    store: Arc<HierarchicalStore>,
    path: &'l CollectionPath,
    names: std::vec::IntoIter<DocumentName>,
}

impl Iterator for DocumentIter<'_> {
    type Item = Result<DocumentMetadata>;

    fn next(&mut self) -> Option<Self::Item> {
        for name in self.names.by_ref() {
            match self.store.document_metadata(self.path, &name) {
                Ok(Some(metadata)) => return Some(Ok(metadata)),
                // removed after the names were read
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.names.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbase_core::{ErrorKind, Principal};

    #[test]
    fn test_get_or_create_is_idempotent() {
        let db = Database::initialize_default().unwrap();
        let path = CollectionPath::parse("/db/a/b").unwrap();

        let first = db
            .transaction(Principal::System, |txn| db.collections().get_or_create(txn, &path))
            .unwrap();
        let second = db
            .transaction(Principal::System, |txn| db.collections().get_or_create(txn, &path))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.owner, "SYSTEM");
        assert!(db.store().collection_exists(&CollectionPath::parse("/db/a").unwrap()));
    }

    #[test]
    fn test_get_or_create_undone_on_abort() {
        let db = Database::initialize_default().unwrap();
        let path = CollectionPath::parse("/db/gone").unwrap();
        let err = db
            .transaction(Principal::System, |txn| -> Result<()> {
                db.collections().get_or_create(txn, &path)?;
                Err(docbase_core::Error::validation("abort"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!db.store().collection_exists(&path));
    }

    #[test]
    fn test_anonymous_cannot_create_under_system_collection() {
        let db = Database::initialize_default().unwrap();
        let path = CollectionPath::parse("/db/private").unwrap();
        let err = db
            .transaction(Principal::Anonymous, |txn| db.collections().get_or_create(txn, &path))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_list_empty_collection() {
        let db = Database::initialize_default().unwrap();
        let path = CollectionPath::parse("/db/empty").unwrap();
        let count = db
            .transaction(Principal::System, |txn| {
                db.collections().get_or_create(txn, &path)?;
                db.read_collection(txn, &path, |txn, c| {
                    Ok(db.collections().list(txn, c)?.count())
                })
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
