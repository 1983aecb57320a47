//! Transaction context
//!
//! A [`Transaction`] spans one logical operation on one connection. It borrows
//! the connection mutably for its whole lifetime, so a connection can never
//! have two open transactions.
//!
//! Mutations go through the transaction, which forwards them to the store
//! together with its undo [`Journal`]. Commit discards the journal; abort
//! replays it. A transaction dropped while still active (for example while
//! unwinding from a panic) rolls back.
//!
//! State transitions:
//! - `Active` → `Committed`
//! - `Active` → `Aborted`

use crate::pool::Connection;
use docbase_core::{CollectionPath, DocumentName, Error, Principal, Result};
use docbase_storage::{
    BlobId, CollectionMetadata, DocumentContent, DocumentMetadata, HierarchicalStore, Journal,
};
use std::sync::Arc;
use tracing::warn;

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// One open transaction
#[derive(Debug)]
pub struct Transaction<'c> {
    id: u64,
    connection: &'c mut Connection,
    journal: Journal,
    status: TransactionStatus,
}

impl<'c> Transaction<'c> {
    /// Open a transaction on `connection`
    ///
    /// Fails with `TransactionFailure` if the store is closed or the
    /// connection already has an open transaction.
    pub(crate) fn begin(id: u64, connection: &'c mut Connection) -> Result<Self> {
        if let Err(e) = connection.store().ensure_open() {
            return Err(Error::transaction_caused_by(id, "begin failed", e));
        }
        if connection.in_transaction() {
            return Err(Error::transaction(
                id,
                format!(
                    "begin failed: connection {} already has an open transaction",
                    connection.id()
                ),
            ));
        }
        connection.set_in_transaction(true);
        Ok(Transaction {
            id,
            connection,
            journal: Journal::new(),
            status: TransactionStatus::Active,
        })
    }

    /// Transaction identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Principal the transaction acts as
    pub fn principal(&self) -> Principal {
        self.connection.principal()
    }

    /// The store, for reads
    pub fn store(&self) -> &Arc<HierarchicalStore> {
        self.connection.store()
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// True while the transaction can still read and write
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Number of mutations that abort would undo
    pub fn pending_changes(&self) -> usize {
        self.journal.len()
    }

    fn ensure_active(&self) -> Result<()> {
        match &self.status {
            TransactionStatus::Active => Ok(()),
            other => Err(Error::transaction(
                self.id,
                format!("transaction is not active ({:?})", other),
            )),
        }
    }

    // ========================================================================
    // Journaled mutations
    // ========================================================================

    /// Create a collection and its missing ancestors
    pub fn create_collection(&mut self, path: &CollectionPath) -> Result<(CollectionMetadata, bool)> {
        self.ensure_active()?;
        let principal = self.principal();
        let store = Arc::clone(self.store());
        store.create_collection(path, principal, &mut self.journal)
    }

    /// Write bytes into the blob store
    pub fn put_blob(&mut self, bytes: &[u8]) -> Result<BlobId> {
        self.ensure_active()?;
        let store = Arc::clone(self.store());
        store.put_blob(bytes, &mut self.journal)
    }

    /// Create or overwrite a document
    pub fn put_document(
        &mut self,
        collection: &CollectionPath,
        name: &DocumentName,
        media_type: &str,
        content: DocumentContent,
    ) -> Result<DocumentMetadata> {
        self.ensure_active()?;
        let principal = self.principal();
        let store = Arc::clone(self.store());
        store.put_document(collection, name, media_type, content, principal, &mut self.journal)
    }

    /// Remove a document; false if it did not exist
    pub fn remove_document(&mut self, collection: &CollectionPath, name: &DocumentName) -> Result<bool> {
        self.ensure_active()?;
        let principal = self.principal();
        let store = Arc::clone(self.store());
        store.remove_document(collection, name, principal, &mut self.journal)
    }

    // ========================================================================
    // Outcome
    // ========================================================================

    /// Make every mutation permanent
    pub(crate) fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let journal = std::mem::take(&mut self.journal);
        if let Err(e) = self.store().ensure_open() {
            self.store().rollback(journal);
            self.status = TransactionStatus::Aborted {
                reason: "commit failed: store is closed".to_string(),
            };
            return Err(Error::transaction_caused_by(self.id, "commit failed", e));
        }
        self.store()
            .commit(journal)
            .map_err(|e| Error::transaction_caused_by(self.id, "commit failed", e))?;
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Undo every mutation
    ///
    /// Fails if the store has been closed underneath the transaction; the
    /// journal is discarded in that case.
    pub(crate) fn abort(&mut self, reason: &str) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let journal = std::mem::take(&mut self.journal);
        self.status = TransactionStatus::Aborted {
            reason: reason.to_string(),
        };
        let closed = self.store().is_closed();
        self.store().rollback(journal);
        if closed {
            return Err(Error::transaction(self.id, "store closed before abort"));
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!(
                target: "docbase::txn",
                txn_id = self.id,
                pending = self.journal.len(),
                "Transaction dropped while active, rolling back"
            );
            let journal = std::mem::take(&mut self.journal);
            self.connection.store().rollback(journal);
        }
        self.connection.set_in_transaction(false);
    }
}
