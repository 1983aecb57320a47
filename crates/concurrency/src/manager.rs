//! Transaction manager
//!
//! Runs one operation inside one transaction:
//!
//! ```text
//! 1. begin             - allocate a txn id, open the transaction on the connection
//! 2. operation(&mut txn)
//! 3. Ok  -> commit     - commit failure is a TransactionFailure
//!    Err -> abort      - the operation's error is re-raised unchanged;
//!                        if the abort itself fails, a TransactionFailure
//!                        carrying the operation's error as its source
//! ```
//!
//! There are no partial commits: either every store call inside the operation
//! takes effect or none does.
//!
//! # Memory Ordering
//!
//! The metric counters use Relaxed ordering; they are observational only and
//! do not synchronize any other memory operations.

use crate::pool::Connection;
use crate::transaction::Transaction;
use docbase_core::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Point-in-time transaction counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionStats {
    /// Transactions currently open
    pub active: u64,
    /// Transactions begun
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions aborted (including failed commits)
    pub aborted: u64,
}

/// Allocates transaction ids and drives begin/commit/abort
#[derive(Debug)]
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveGuard<'a>(&'a AtomicU64);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl TransactionManager {
    /// Create a manager; the first transaction gets id 1
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run `operation` in a transaction on `connection`
    ///
    /// Commits when the operation returns `Ok`, aborts and re-raises when it
    /// returns `Err`.
    pub fn run<T, F>(&self, connection: &mut Connection, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let txn_id = self.next_txn_id();
        let principal = connection.principal();
        let mut txn = Transaction::begin(txn_id, connection)?;

        self.total_started.fetch_add(1, Ordering::Relaxed);
        self.active_count.fetch_add(1, Ordering::Relaxed);
        let _active = ActiveGuard(&self.active_count);
        debug!(target: "docbase::txn", txn_id, principal = %principal, "Transaction started");

        match operation(&mut txn) {
            Ok(value) => {
                let changes = txn.pending_changes();
                match txn.commit() {
                    Ok(()) => {
                        self.total_committed.fetch_add(1, Ordering::Relaxed);
                        debug!(target: "docbase::txn", txn_id, changes, "Transaction committed");
                        Ok(value)
                    }
                    Err(e) => {
                        self.total_aborted.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "docbase::txn", txn_id, error = %e, "Transaction commit failed");
                        Err(e)
                    }
                }
            }
            Err(err) => {
                self.total_aborted.fetch_add(1, Ordering::Relaxed);
                match txn.abort(&err.to_string()) {
                    Ok(()) => {
                        warn!(target: "docbase::txn", txn_id, error = %err, "Transaction aborted");
                        Err(err)
                    }
                    Err(abort_err) => {
                        warn!(
                            target: "docbase::txn",
                            txn_id,
                            error = %err,
                            abort_error = %abort_err,
                            "Transaction abort failed"
                        );
                        Err(Error::transaction_caused_by(
                            txn_id,
                            format!("abort failed: {}", abort_err),
                            err,
                        ))
                    }
                }
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            active: self.active_count.load(Ordering::Relaxed),
            started: self.total_started.load(Ordering::Relaxed),
            committed: self.total_committed.load(Ordering::Relaxed),
            aborted: self.total_aborted.load(Ordering::Relaxed),
        }
    }

    /// Transactions currently open
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Relaxed)
    }
}
