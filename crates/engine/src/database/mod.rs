//! Database handle and lifecycle
//!
//! [`Database`] owns every piece of process-wide state: the hierarchical
//! store, the connection pool, the transaction manager and the lock
//! coordinator. It is created with [`Database::initialize`] and torn down with
//! [`Database::shutdown`]; nothing lives in a static, so tests build isolated
//! instances freely.
//!
//! ## Operation shape
//!
//! Every public operation follows the same nesting, each level released on
//! every exit path by its guard:
//!
//! ```text
//! db.transaction(principal, |txn| {                  // borrow + begin
//!     db.write_collection(txn, &path, |txn, coll| {  // collection lock
//!         db.documents().write_document(txn, coll, &name, |txn, doc| {
//!             ...                                    // document lock
//!         })
//!     })
//! })                                                 // commit or abort, return
//! ```

pub mod config;

pub use config::{
    ConfigError, DatabaseConfig, LockSection, PoolSection, CONFIG_FILE_NAME,
    DEFAULT_DOCUMENTS_COLLECTION,
};

use crate::collection::CollectionStore;
use crate::document::DocumentStore;
use crate::patch::PatchEngine;
use docbase_concurrency::{
    Connection, ConnectionPool, LockCoordinator, LockedCollection, Transaction, TransactionManager,
};
use docbase_core::{CollectionPath, Error, LockMode, Principal, Result};
use docbase_storage::{Access, HierarchicalStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Main database handle
///
/// Shared as `Arc<Database>` by every component that needs the store.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    store: Arc<HierarchicalStore>,
    pool: ConnectionPool,
    transactions: TransactionManager,
    locks: LockCoordinator,
    accepting: AtomicBool,
}

impl Database {
    /// Bring up a store, pool and lock coordinator from `config`
    ///
    /// Fails with `InitializationFailure` if the config does not validate or
    /// the pool cannot be started.
    pub fn initialize(config: DatabaseConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let store = Arc::new(HierarchicalStore::new());
        let pool = ConnectionPool::new(Arc::clone(&store), config.pool_config())
            .map_err(|e| Error::initialization_caused_by("connection pool did not start", e))?;
        let locks = LockCoordinator::new(Arc::clone(store.locks()), config.lock_timeout());

        info!(
            target: "docbase::db",
            documents_collection = %config.documents_collection,
            max_connections = config.pool.max_connections,
            lock_timeout_ms = config.locks.timeout_ms,
            "Database initialized"
        );

        Ok(Arc::new(Self {
            config,
            store,
            pool,
            transactions: TransactionManager::new(),
            locks,
            accepting: AtomicBool::new(true),
        }))
    }

    /// Initialize with default configuration
    pub fn initialize_default() -> Result<Arc<Self>> {
        Self::initialize(DatabaseConfig::default())
    }

    /// Active configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<HierarchicalStore> {
        &self.store
    }

    /// The connection pool
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The transaction manager
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// The lock coordinator
    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    /// Collection operations
    pub fn collections(&self) -> CollectionStore<'_> {
        CollectionStore::new(self)
    }

    /// Document operations
    pub fn documents(&self) -> DocumentStore<'_> {
        DocumentStore::new(self)
    }

    /// XUpdate patch application
    pub fn patches(&self) -> PatchEngine<'_> {
        PatchEngine::new(self)
    }

    /// True until [`shutdown`](Self::shutdown) is called
    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn check_accepting(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::resource_exhausted("database is shut down"))
        }
    }

    // ========================================================================
    // Scoped acquisition
    // ========================================================================

    /// Borrow a connection for `principal` for the duration of `body`
    pub fn with_connection<T, F>(&self, principal: Principal, body: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        self.check_accepting()?;
        let mut connection = self.pool.borrow(principal)?;
        body(&mut *connection)
    }

    /// Run `operation` in one transaction on a freshly borrowed connection
    ///
    /// Commits when the operation returns `Ok`, aborts and re-raises
    /// otherwise. The connection goes back to the pool either way.
    pub fn transaction<T, F>(&self, principal: Principal, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        self.with_connection(principal, |connection| {
            self.transactions.run(connection, operation)
        })
    }

    /// Hold `path` under a read lock while `body` runs
    ///
    /// Fails with `StorageFailure` if the collection does not exist and with
    /// `PermissionDenied` if the transaction's principal may not read it.
    pub fn read_collection<T, F>(&self, txn: &mut Transaction<'_>, path: &CollectionPath, body: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>, &LockedCollection<'_>) -> Result<T>,
    {
        self.locked_collection(txn, path, LockMode::Read, body)
    }

    /// Hold `path` under a write lock while `body` runs
    ///
    /// Fails with `StorageFailure` if the collection does not exist and with
    /// `PermissionDenied` if the transaction's principal may not write it.
    pub fn write_collection<T, F>(&self, txn: &mut Transaction<'_>, path: &CollectionPath, body: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>, &LockedCollection<'_>) -> Result<T>,
    {
        self.locked_collection(txn, path, LockMode::Write, body)
    }

    fn locked_collection<T, F>(
        &self,
        txn: &mut Transaction<'_>,
        path: &CollectionPath,
        mode: LockMode,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>, &LockedCollection<'_>) -> Result<T>,
    {
        self.locks.with_collection_lock(path, mode, |collection| {
            let access = match mode {
                LockMode::Read => Access::Read,
                LockMode::Write => Access::Write,
            };
            txn.store().check_collection_access(path, txn.principal(), access)?;
            body(txn, collection)
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop accepting work, let in-flight transactions finish, close the store
    ///
    /// Waits for open transactions at most one lock timeout; stragglers are
    /// aborted by the closed store. Idempotent.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }

        let deadline = Instant::now() + self.config.lock_timeout();
        while self.transactions.active_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let remaining = self.transactions.active_count();
        if remaining > 0 {
            warn!(
                target: "docbase::db",
                active = remaining,
                "Shutting down with transactions still open"
            );
        }

        self.pool.shutdown();
        self.store.close();
        let stats = self.transactions.stats();
        info!(
            target: "docbase::db",
            committed = stats.committed,
            aborted = stats.aborted,
            "Database shut down"
        );
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbase_core::ErrorKind;

    fn docs() -> CollectionPath {
        CollectionPath::parse("/db/docs").unwrap()
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let mut config = DatabaseConfig::default();
        config.pool.max_connections = 0;
        let err = Database::initialize(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InitializationFailure);
    }

    #[test]
    fn test_transaction_commits_and_returns_connection() {
        let db = Database::initialize_default().unwrap();
        db.transaction(Principal::System, |txn| txn.create_collection(&docs()).map(|_| ()))
            .unwrap();
        assert!(db.store().collection_exists(&docs()));
        assert_eq!(db.pool().stats().in_use, 0);
    }

    #[test]
    fn test_missing_collection_is_storage_failure() {
        let db = Database::initialize_default().unwrap();
        let err = db
            .transaction(Principal::System, |txn| {
                db.read_collection(txn, &docs(), |_, _| Ok(()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn test_anonymous_cannot_write_system_collection() {
        let db = Database::initialize_default().unwrap();
        db.transaction(Principal::System, |txn| txn.create_collection(&docs()).map(|_| ()))
            .unwrap();

        db.transaction(Principal::Anonymous, |txn| {
            db.read_collection(txn, &docs(), |_, c| {
                assert!(!c.is_write());
                Ok(())
            })
        })
        .unwrap();

        let err = db
            .transaction(Principal::Anonymous, |txn| {
                db.write_collection(txn, &docs(), |_, _| Ok(()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_collection_lock_released_after_transaction() {
        let db = Database::initialize_default().unwrap();
        db.transaction(Principal::System, |txn| {
            txn.create_collection(&docs())?;
            db.write_collection(txn, &docs(), |_, _| {
                assert_eq!(db.locks().table().active_targets(), 1);
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(db.locks().table().active_targets(), 0);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let db = Database::initialize_default().unwrap();
        db.shutdown();
        assert!(!db.is_open());
        assert!(db.store().is_closed());
        let err = db.transaction(Principal::System, |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        db.shutdown();
    }
}
