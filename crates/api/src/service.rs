//! Document service
//!
//! The resource boundary over one documents collection. Every operation
//! follows the same shape: one transaction on a pooled connection, the
//! collection lock, then the document lock when a single document is
//! addressed. Mutations run as the system principal; reads and listings run
//! as the anonymous principal.
//!
//! Absence is reported as `None` (or `false`), never as an error. An id that
//! is not a valid document name cannot name a stored document and is
//! reported the same way.

use crate::domain::{Created, DocumentListing, DocumentSummary, Patched, Retrieved};
use docbase_core::{CollectionPath, DocumentName, Error, Principal, Result, Timestamp};
use docbase_engine::{parse_directives, serialize, Database};
use std::sync::Arc;
use tracing::{debug, info};

/// Document operations exposed at the resource boundary
#[derive(Debug, Clone)]
pub struct DocumentService {
    db: Arc<Database>,
    collection: CollectionPath,
}

impl DocumentService {
    /// Start the service on `db`
    ///
    /// Ensures the configured documents collection exists. Fails with
    /// `InitializationFailure` if it cannot be created or resolves to a
    /// different path.
    pub fn start(db: Arc<Database>) -> Result<Self> {
        let configured = db.config().documents_collection_path()?;
        let metadata = db
            .transaction(Principal::System, |txn| {
                db.collections().get_or_create(txn, &configured)
            })
            .map_err(|e| {
                Error::initialization_caused_by(
                    format!("cannot create documents collection {}", configured),
                    e,
                )
            })?;
        if metadata.path != configured {
            return Err(Error::initialization(format!(
                "documents collection resolved to {} instead of {}",
                metadata.path, configured
            )));
        }

        info!(
            target: "docbase::api",
            collection = %configured,
            owner = %metadata.owner,
            "Document service started"
        );
        Ok(DocumentService {
            db,
            collection: configured,
        })
    }

    /// The database this service runs on
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Path of the documents collection
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Store a new document under a generated id
    pub fn create_document(&self, content: &[u8], media_type: &str) -> Result<Created> {
        let db = &self.db;
        let stored = db.transaction(Principal::System, |txn| {
            db.write_collection(txn, &self.collection, |txn, collection| {
                db.documents().store(txn, collection, None, media_type, content)
            })
        })?;

        info!(
            target: "docbase::api",
            id = %stored.name(),
            media_type,
            bytes = content.len(),
            "Document created"
        );
        Ok(Created {
            id: stored.name().to_string(),
            last_modified: stored.last_modified(),
        })
    }

    /// Summaries of every document in the collection
    pub fn list_documents(&self) -> Result<DocumentListing> {
        let db = &self.db;
        let documents = db.transaction(Principal::Anonymous, |txn| {
            db.read_collection(txn, &self.collection, |txn, collection| {
                db.collections()
                    .list(txn, collection)?
                    .map(|metadata| metadata.map(|m| (DocumentSummary::from(&m), m.last_modified)))
                    .collect::<Result<Vec<_>>>()
            })
        })?;

        let newest = documents.iter().map(|(_, modified)| *modified).max();
        let summaries: Vec<DocumentSummary> = documents.into_iter().map(|(summary, _)| summary).collect();
        debug!(target: "docbase::api", count = summaries.len(), "Documents listed");
        Ok(DocumentListing::new(summaries, newest))
    }

    /// Render a document in the first kind `acceptable` allows
    pub fn get_document(&self, id: &str, acceptable: &[String]) -> Result<Option<Retrieved>> {
        let Some(name) = document_name(id) else {
            return Ok(None);
        };
        let db = &self.db;
        let retrieved = db.transaction(Principal::Anonymous, |txn| {
            db.read_collection(txn, &self.collection, |txn, collection| {
                db.documents().read_document(txn, collection, &name, |txn, document| {
                    let Some(document) = document else {
                        return Ok(None);
                    };
                    let record = db.documents().load(txn, document)?;
                    let representation = serialize(&record, txn.store().blobs(), acceptable)?;
                    Ok(Some(Retrieved {
                        last_modified: record.last_modified,
                        representation,
                    }))
                })
            })
        })?;

        debug!(target: "docbase::api", id, found = retrieved.is_some(), "Document read");
        Ok(retrieved)
    }

    /// Overwrite an existing document, returning its new last-modified time
    pub fn replace_document(&self, id: &str, content: &[u8], media_type: &str) -> Result<Option<Timestamp>> {
        let Some(name) = document_name(id) else {
            return Ok(None);
        };
        let db = &self.db;
        let replaced = db.transaction(Principal::System, |txn| {
            db.read_collection(txn, &self.collection, |txn, collection| {
                db.documents().write_document(txn, collection, &name, |txn, document| {
                    let Some(document) = document else {
                        return Ok(None);
                    };
                    let stored = db.documents().replace(txn, document, media_type, content)?;
                    Ok(Some(stored.last_modified()))
                })
            })
        })?;

        if replaced.is_some() {
            info!(target: "docbase::api", id, media_type, bytes = content.len(), "Document replaced");
        }
        Ok(replaced)
    }

    /// Remove a document; false if there was nothing to remove
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let Some(name) = document_name(id) else {
            return Ok(false);
        };
        let db = &self.db;
        let deleted = db.transaction(Principal::System, |txn| {
            db.write_collection(txn, &self.collection, |txn, collection| {
                db.documents().write_document(txn, collection, &name, |txn, document| {
                    let Some(document) = document else {
                        return Ok(false);
                    };
                    db.documents().delete(txn, document)?;
                    Ok(true)
                })
            })
        })?;

        if deleted {
            info!(target: "docbase::api", id, "Document deleted");
        }
        Ok(deleted)
    }

    /// Apply an XUpdate patch to a document
    ///
    /// The patch is validated before anything is locked, so an invalid patch
    /// fails with `Validation` or `Malformed` whether or not the document
    /// exists.
    pub fn patch_document(&self, id: &str, patch_text: &str) -> Result<Option<Patched>> {
        let patch = parse_directives(patch_text)?;
        let Some(name) = document_name(id) else {
            return Ok(None);
        };
        let db = &self.db;
        let patched = db.transaction(Principal::System, |txn| {
            db.write_collection(txn, &self.collection, |txn, collection| {
                db.documents().write_document(txn, collection, &name, |txn, document| {
                    let Some(document) = document else {
                        return Ok(None);
                    };
                    let applied = db.patches().apply(txn, &patch, &[document])?;
                    let last_modified = db.documents().metadata(txn, document)?.last_modified;
                    Ok(Some(Patched {
                        last_modified,
                        applied,
                    }))
                })
            })
        })?;

        if let Some(patched) = &patched {
            info!(
                target: "docbase::api",
                id,
                directives = patch.len(),
                applied = patched.applied,
                "Document patched"
            );
        }
        Ok(patched)
    }
}

fn document_name(id: &str) -> Option<DocumentName> {
    match DocumentName::new(id) {
        Ok(name) => Some(name),
        Err(e) => {
            debug!(target: "docbase::api", id, error = %e, "Id is not a document name");
            None
        }
    }
}
