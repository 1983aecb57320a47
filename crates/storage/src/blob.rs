//! Binary object store
//!
//! Binary document content lives here, addressed by an opaque [`BlobId`].
//! Blobs are immutable once written; replacing binary content writes a new
//! blob and the old one is released when the replacing transaction commits.

use dashmap::DashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identifier of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(u64);

impl BlobId {
    /// Raw identifier
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob-{}", self.0)
    }
}

/// Readable stream over a blob's bytes
///
/// Holds its own reference to the bytes, so the stream stays valid even if
/// the blob is released while it is being read.
pub struct BlobStream {
    inner: Cursor<Arc<[u8]>>,
}

impl BlobStream {
    /// Total length of the blob in bytes
    pub fn len(&self) -> u64 {
        self.inner.get_ref().len() as u64
    }

    /// True for an empty blob
    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }
}

impl Read for BlobStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Concurrent map of blobs
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: DashMap<BlobId, Arc<[u8]>>,
    next_id: AtomicU64,
}

impl BlobStore {
    /// Create an empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes and return their identifier
    pub fn put(&self, bytes: &[u8]) -> BlobId {
        let id = BlobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.blobs.insert(id, Arc::from(bytes));
        id
    }

    /// Open a blob for reading
    pub fn open(&self, id: BlobId) -> Option<BlobStream> {
        self.blobs.get(&id).map(|bytes| BlobStream {
            inner: Cursor::new(Arc::clone(bytes.value())),
        })
    }

    /// Length of a blob
    pub fn length(&self, id: BlobId) -> Option<u64> {
        self.blobs.get(&id).map(|bytes| bytes.len() as u64)
    }

    /// Release a blob; returns false if it did not exist
    pub fn remove(&self, id: BlobId) -> bool {
        self.blobs.remove(&id).is_some()
    }

    /// Number of live blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if no blob is stored
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
