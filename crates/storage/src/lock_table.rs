//! Per-path read/write lock table
//!
//! One table serves every collection and document lock of a store. Read locks
//! share; a write lock excludes every other holder. Writers that are waiting
//! block new readers, so a steady stream of readers cannot starve a writer.
//!
//! Acquisition blocks up to a caller-supplied timeout and fails with
//! `LockFailure` when it expires. Release happens when the returned
//! [`LockGuard`] is dropped.

use docbase_core::{CollectionPath, DocumentName, Error, LockMode, Result};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a lock protects
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// A collection path
    Collection(CollectionPath),
    /// A document inside a collection
    Document {
        /// Owning collection
        collection: CollectionPath,
        /// Document name
        name: DocumentName,
    },
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::Collection(path) => write!(f, "{}", path),
            LockTarget::Document { collection, name } => write!(f, "{}/{}", collection, name),
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

impl LockState {
    fn grantable(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => !self.writer && self.waiting_writers == 0,
            LockMode::Write => !self.writer && self.readers == 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.waiting_writers == 0
    }
}

/// Snapshot of one target's holders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockHolders {
    /// Number of read holders
    pub readers: usize,
    /// True if a writer holds the lock
    pub writer: bool,
    /// Writers blocked waiting for the lock
    pub waiting_writers: usize,
}

/// Lock table shared by all transactions of a store
#[derive(Debug, Default)]
pub struct LockTable {
    state: Mutex<FxHashMap<LockTarget, LockState>>,
    released: Condvar,
}

impl LockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `target` in `mode`, waiting at most `timeout`
    pub fn acquire(
        self: &Arc<Self>,
        target: LockTarget,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let deadline = Instant::now() + timeout;
        let mut table = self.state.lock();
        let mut waiting = false;

        loop {
            let entry = table.entry(target.clone()).or_default();
            if entry.grantable(mode) {
                match mode {
                    LockMode::Read => entry.readers += 1,
                    LockMode::Write => entry.writer = true,
                }
                if waiting {
                    entry.waiting_writers -= 1;
                }
                return Ok(LockGuard {
                    table: Arc::clone(self),
                    target,
                    mode,
                });
            }

            if Instant::now() >= deadline {
                if waiting {
                    entry.waiting_writers -= 1;
                }
                if entry.is_idle() {
                    table.remove(&target);
                }
                // A writer giving up may unblock readers queued behind it
                self.released.notify_all();
                return Err(Error::lock(
                    target.to_string(),
                    format!("{} lock not granted within {:?}", mode, timeout),
                ));
            }

            if mode == LockMode::Write && !waiting {
                entry.waiting_writers += 1;
                waiting = true;
            }
            self.released.wait_until(&mut table, deadline);
        }
    }

    /// Current holders of a target
    pub fn holders(&self, target: &LockTarget) -> LockHolders {
        self.state
            .lock()
            .get(target)
            .map(|s| LockHolders {
                readers: s.readers,
                writer: s.writer,
                waiting_writers: s.waiting_writers,
            })
            .unwrap_or_default()
    }

    /// Number of targets with at least one holder or waiter
    pub fn active_targets(&self) -> usize {
        self.state.lock().len()
    }

    fn release(&self, target: &LockTarget, mode: LockMode) {
        let mut table = self.state.lock();
        if let Some(entry) = table.get_mut(target) {
            match mode {
                LockMode::Read => entry.readers = entry.readers.saturating_sub(1),
                LockMode::Write => entry.writer = false,
            }
            if entry.is_idle() {
                table.remove(target);
            }
        }
        self.released.notify_all();
    }
}

/// A held lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<LockTable>,
    target: LockTarget,
    mode: LockMode,
}

impl LockGuard {
    /// What is locked
    pub fn target(&self) -> &LockTarget {
        &self.target
    }

    /// Mode the lock is held in
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.table.release(&self.target, self.mode);
    }
}
