//! Undo journal of a transaction
//!
//! Mutations are applied to the store in place while the writer holds the
//! relevant locks. Each mutation records how to undo it; abort replays the
//! entries newest-first, commit discards them.
//!
//! Blob lifetimes follow the outcome:
//! - blobs written by the transaction are released on abort
//! - blobs a committed transaction stopped referencing are released on commit

use crate::blob::BlobId;
use crate::record::DocumentRecord;
use docbase_core::{CollectionPath, DocumentName};

/// How to undo one mutation
#[derive(Debug, Clone)]
pub enum UndoEntry {
    /// A collection was created; undo removes it
    CollectionCreated(CollectionPath),
    /// A document was created; undo removes it
    DocumentCreated {
        /// Owning collection
        collection: CollectionPath,
        /// Name of the new document
        name: DocumentName,
    },
    /// A document was overwritten; undo restores the previous record
    DocumentReplaced {
        /// Owning collection
        collection: CollectionPath,
        /// Record before the overwrite
        previous: DocumentRecord,
    },
    /// A document was removed; undo restores it
    DocumentRemoved {
        /// Owning collection
        collection: CollectionPath,
        /// Record before removal
        previous: DocumentRecord,
    },
}

/// Undo log plus blob bookkeeping for one transaction
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<UndoEntry>,
    created_blobs: Vec<BlobId>,
    orphaned_blobs: Vec<BlobId>,
}

impl Journal {
    /// Empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an undo entry
    pub fn record(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
    }

    /// Record a blob written by this transaction
    pub fn blob_created(&mut self, id: BlobId) {
        self.created_blobs.push(id);
    }

    /// Record a blob no longer referenced once this transaction commits
    pub fn blob_orphaned(&mut self, id: BlobId) {
        self.orphaned_blobs.push(id);
    }

    /// Number of undo entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was mutated
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.created_blobs.is_empty()
    }

    /// Split into (entries newest-first, created blobs, orphaned blobs)
    pub(crate) fn into_parts(self) -> (impl Iterator<Item = UndoEntry>, Vec<BlobId>, Vec<BlobId>) {
        (
            self.entries.into_iter().rev(),
            self.created_blobs,
            self.orphaned_blobs,
        )
    }
}
