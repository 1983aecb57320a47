//! Concurrency layer for docbase
//!
//! This crate implements the pieces every operation passes through:
//! - ConnectionPool: bounded pool of principal-bound store handles (RAII borrow)
//! - TransactionManager: begin / commit-on-Ok / abort-on-Err around one operation
//! - Transaction: journaled mutations on one connection
//! - LockCoordinator: scoped collection-then-document read/write locks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;
pub mod manager;
pub mod pool;
pub mod transaction;

pub use lock::{LockCoordinator, LockedCollection, LockedDocument};
pub use manager::{TransactionManager, TransactionStats};
pub use pool::{Connection, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use transaction::{Transaction, TransactionStatus};
