//! Connection pool
//!
//! Issues short-lived, principal-bound handles to the store. The pool keeps
//! between `min_connections` (created up front) and `max_connections`
//! handles; a borrower blocks while all of them are in use.
//!
//! A borrowed handle comes back as a [`PooledConnection`] guard that returns
//! the handle to the pool when dropped, whatever the outcome of the operation
//! that used it.
//!
//! Borrowing fails with `ResourceExhausted` when the pool is shut down, when
//! the store has been closed, or when no handle frees up within the configured
//! borrow timeout.

use docbase_core::{Error, Principal, Result};
use docbase_storage::HierarchicalStore;
use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool bounds and borrow timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Handles created when the pool starts
    pub min_connections: usize,
    /// Upper bound on handles in existence
    pub max_connections: usize,
    /// How long a borrower waits for a free handle
    pub borrow_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 20,
            borrow_timeout: Duration::from_secs(30),
        }
    }
}

/// An authenticated handle to the store
#[derive(Debug)]
pub struct Connection {
    id: u64,
    principal: Principal,
    store: Arc<HierarchicalStore>,
    in_transaction: bool,
}

impl Connection {
    /// Stable identifier of the handle
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Principal the handle currently acts as
    pub fn principal(&self) -> Principal {
        self.principal
    }

    /// The store this handle talks to
    pub fn store(&self) -> &Arc<HierarchicalStore> {
        &self.store
    }

    /// True while a transaction is open on this handle
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles waiting in the pool
    pub idle: usize,
    /// Handles currently borrowed
    pub in_use: usize,
    /// Handles in existence
    pub total: usize,
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<Connection>,
    total: usize,
    in_use: usize,
    closed: bool,
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    available: Condvar,
    config: PoolConfig,
    store: Arc<HierarchicalStore>,
    next_id: AtomicU64,
}

impl PoolShared {
    fn new_connection(&self, principal: Principal) -> Connection {
        Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            principal,
            store: Arc::clone(&self.store),
            in_transaction: false,
        }
    }
}

/// Bounded pool of store connections
#[derive(Debug)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool and pre-create `min_connections` handles
    pub fn new(store: Arc<HierarchicalStore>, config: PoolConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(Error::resource_exhausted(
                "connection pool must allow at least one connection",
            ));
        }
        if config.min_connections > config.max_connections {
            return Err(Error::resource_exhausted(format!(
                "min_connections ({}) exceeds max_connections ({})",
                config.min_connections, config.max_connections
            )));
        }
        store
            .ensure_open()
            .map_err(|e| Error::resource_exhausted(format!("cannot open connections: {}", e)))?;

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.max_connections),
                total: 0,
                in_use: 0,
                closed: false,
            }),
            available: Condvar::new(),
            config,
            store,
            next_id: AtomicU64::new(0),
        });

        {
            let mut state = shared.state.lock();
            for _ in 0..shared.config.min_connections {
                let conn = shared.new_connection(Principal::Anonymous);
                state.idle.push(conn);
                state.total += 1;
            }
        }

        info!(
            target: "docbase::pool",
            min = shared.config.min_connections,
            max = shared.config.max_connections,
            "Connection pool started"
        );
        Ok(Self { shared })
    }

    /// Borrow a handle authenticated as `principal`
    ///
    /// Blocks while every handle is in use and the pool is at its bound.
    pub fn borrow(&self, principal: Principal) -> Result<PooledConnection> {
        let shared = &self.shared;
        let timeout = shared.config.borrow_timeout;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();

        loop {
            if state.closed {
                return Err(Error::resource_exhausted("connection pool is shut down"));
            }
            if shared.store.is_closed() {
                return Err(Error::resource_exhausted("store is closed"));
            }

            let reused = state.idle.pop();
            let connection = match reused {
                Some(mut conn) => {
                    conn.principal = principal;
                    Some(conn)
                }
                None if state.total < shared.config.max_connections => {
                    state.total += 1;
                    Some(shared.new_connection(principal))
                }
                None => None,
            };

            if let Some(connection) = connection {
                state.in_use += 1;
                debug!(
                    target: "docbase::pool",
                    connection = connection.id,
                    principal = %principal,
                    "Connection borrowed"
                );
                return Ok(PooledConnection {
                    shared: Arc::clone(shared),
                    connection: Some(connection),
                });
            }

            if Instant::now() >= deadline {
                warn!(
                    target: "docbase::pool",
                    timeout_ms = timeout.as_millis() as u64,
                    in_use = state.in_use,
                    "Connection borrow timed out"
                );
                return Err(Error::resource_exhausted(format!(
                    "no connection available within {:?} ({} in use)",
                    timeout, state.in_use
                )));
            }
            shared.available.wait_until(&mut state, deadline);
        }
    }

    /// Stop issuing handles and drop the idle ones
    ///
    /// Borrowed handles are discarded when their guards drop.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle = state.idle.len();
        state.idle.clear();
        state.total -= idle;
        if state.in_use > 0 {
            warn!(
                target: "docbase::pool",
                in_use = state.in_use,
                "Connection pool shut down with connections still borrowed"
            );
        }
        self.shared.available.notify_all();
        info!(target: "docbase::pool", "Connection pool shut down");
    }

    /// True once [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Current occupancy
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            idle: state.idle.len(),
            in_use: state.in_use,
            total: state.total,
        }
    }

    /// Configured bounds
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

/// A borrowed connection; returned to the pool on drop
#[derive(Debug)]
pub struct PooledConnection {
    shared: Arc<PoolShared>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `drop` takes the connection out
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        connection.set_in_transaction(false);
        let id = connection.id;

        let mut state = self.shared.state.lock();
        state.in_use -= 1;
        if state.closed {
            state.total -= 1;
        } else {
            state.idle.push(connection);
        }
        drop(state);
        self.shared.available.notify_one();
        debug!(target: "docbase::pool", connection = id, "Connection returned");
    }
}
