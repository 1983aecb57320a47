//! Document store
//!
//! Stores, reads and deletes documents inside a locked collection.
//!
//! Lock requirements:
//! - adding or removing a name needs the collection held for writing
//! - replacing content needs the document held for writing
//! - reading needs any lock on the document
//!
//! Structured media types (`application/xml`, `text/xml`, `*+xml`) are parsed
//! into an XML tree; anything else is kept as an opaque blob.

use crate::database::Database;
use docbase_concurrency::{LockedCollection, LockedDocument, Transaction};
use docbase_core::{
    CollectionPath, DocumentName, Error, LockMode, Result, Timestamp, XmlDocument,
};
use docbase_storage::{
    normalize_media_type, Access, ContentKind, DocumentContent, DocumentMetadata, DocumentRecord,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Outcome of a store operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    metadata: DocumentMetadata,
    created: bool,
}

impl DocumentRef {
    /// Document name
    pub fn name(&self) -> &DocumentName {
        &self.metadata.name
    }

    /// Owning collection
    pub fn collection(&self) -> &CollectionPath {
        &self.metadata.collection
    }

    /// Store-wide numeric identifier
    pub fn id(&self) -> u64 {
        self.metadata.id
    }

    /// Creation time
    pub fn created_at(&self) -> Timestamp {
        self.metadata.created
    }

    /// Last modification time
    pub fn last_modified(&self) -> Timestamp {
        self.metadata.last_modified
    }

    /// True if the operation created the document rather than overwriting it
    pub fn is_new(&self) -> bool {
        self.created
    }

    /// Full metadata read under the lock
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
}

/// Document operations on a [`Database`]
#[derive(Debug, Clone, Copy)]
pub struct DocumentStore<'db> {
    db: &'db Database,
}

impl<'db> DocumentStore<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// True if the collection holds a document named `name`
    pub fn exists(&self, txn: &Transaction<'_>, collection: &LockedCollection<'_>, name: &DocumentName) -> Result<bool> {
        txn.store().document_exists(collection.path(), name)
    }

    /// Store `content` under `name`, or under a generated name when `None`
    ///
    /// An existing document of that name is overwritten in place: it keeps
    /// its id and creation time and gets a new last-modified time. Generated
    /// names are a random UUID plus the media type's preferred extension.
    /// Takes the document write lock itself; creating a new name needs the
    /// collection held for writing.
    pub fn store(
        &self,
        txn: &mut Transaction<'_>,
        collection: &LockedCollection<'_>,
        name: Option<DocumentName>,
        media_type: &str,
        content: &[u8],
    ) -> Result<DocumentRef> {
        let media_type = normalize_media_type(media_type);
        let name = match name {
            Some(name) => name,
            None => self.generate_name(txn, &media_type)?,
        };

        collection.with_document_lock(&name, LockMode::Write, |doc| {
            let exists = txn.store().document_exists(doc.collection_path(), doc.name())?;
            if !exists && !collection.is_write() {
                return Err(Error::lock(
                    doc.display_path(),
                    "creating a document requires the collection write lock",
                ));
            }
            let content = decode_content(txn, &media_type, content)?;
            let metadata = txn.put_document(doc.collection_path(), doc.name(), &media_type, content)?;
            Ok(DocumentRef {
                metadata,
                created: !exists,
            })
        })
    }

    /// Replace the content of a write-locked document
    pub fn replace(
        &self,
        txn: &mut Transaction<'_>,
        document: &LockedDocument<'_>,
        media_type: &str,
        content: &[u8],
    ) -> Result<DocumentRef> {
        require_write(document)?;
        let media_type = normalize_media_type(media_type);
        let content = decode_content(txn, &media_type, content)?;
        let metadata = self.replace_content(txn, document, &media_type, content)?;
        Ok(DocumentRef {
            metadata,
            created: false,
        })
    }

    /// Swap in new content for a write-locked document
    pub(crate) fn replace_content(
        &self,
        txn: &mut Transaction<'_>,
        document: &LockedDocument<'_>,
        media_type: &str,
        content: DocumentContent,
    ) -> Result<DocumentMetadata> {
        require_write(document)?;
        if !txn.store().document_exists(document.collection_path(), document.name())? {
            return Err(Error::storage(format!(
                "document {} does not exist",
                document.display_path()
            )));
        }
        txn.put_document(document.collection_path(), document.name(), media_type, content)
    }

    /// Remove a write-locked document
    ///
    /// The caller checks existence first; a missing document is a
    /// `StorageFailure` here.
    pub fn delete(&self, txn: &mut Transaction<'_>, document: &LockedDocument<'_>) -> Result<()> {
        require_write(document)?;
        if !document.collection().is_write() {
            return Err(Error::lock(
                document.display_path(),
                "deleting a document requires the collection write lock",
            ));
        }
        if !txn.remove_document(document.collection_path(), document.name())? {
            return Err(Error::storage(format!(
                "document {} does not exist",
                document.display_path()
            )));
        }
        Ok(())
    }

    /// Hold `name` under a read lock while `projection` runs
    ///
    /// The projection sees `None` if the document does not exist. The lock is
    /// released when the projection returns.
    pub fn read_document<T, F>(
        &self,
        txn: &mut Transaction<'_>,
        collection: &LockedCollection<'_>,
        name: &DocumentName,
        projection: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>, Option<&LockedDocument<'_>>) -> Result<T>,
    {
        with_document(txn, collection, name, LockMode::Read, projection)
    }

    /// Hold `name` under a write lock while `projection` runs
    ///
    /// The projection sees `None` if the document does not exist. The lock is
    /// released when the projection returns.
    pub fn write_document<T, F>(
        &self,
        txn: &mut Transaction<'_>,
        collection: &LockedCollection<'_>,
        name: &DocumentName,
        projection: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>, Option<&LockedDocument<'_>>) -> Result<T>,
    {
        with_document(txn, collection, name, LockMode::Write, projection)
    }

    /// Fresh snapshot of a locked document
    pub fn load(&self, txn: &Transaction<'_>, document: &LockedDocument<'_>) -> Result<DocumentRecord> {
        let record = txn
            .store()
            .document(document.collection_path(), document.name())?
            .ok_or_else(|| {
                Error::storage(format!("document {} does not exist", document.display_path()))
            })?;
        record
            .permissions
            .check(txn.principal(), Access::Read, &document.display_path())?;
        Ok(record)
    }

    /// Fresh metadata of a locked document
    pub fn metadata(&self, txn: &Transaction<'_>, document: &LockedDocument<'_>) -> Result<DocumentMetadata> {
        self.load(txn, document)
            .map(|record| record.metadata(document.collection_path()))
    }

    /// Stored bytes of a locked document
    pub fn content(&self, txn: &Transaction<'_>, document: &LockedDocument<'_>) -> Result<Vec<u8>> {
        self.load(txn, document)?.content.to_bytes(txn.store().blobs())
    }

    fn generate_name(&self, txn: &Transaction<'_>, media_type: &str) -> Result<DocumentName> {
        let extension = txn.store().mime_table().preferred_extension(media_type);
        let name = DocumentName::new(format!("{}{}", Uuid::new_v4(), extension))?;
        debug!(target: "docbase::db", name = %name, media_type, "Generated document name");
        Ok(name)
    }

    /// The database this store works on
    pub fn database(&self) -> &'db Database {
        self.db
    }
}

fn with_document<T, F>(
    txn: &mut Transaction<'_>,
    collection: &LockedCollection<'_>,
    name: &DocumentName,
    mode: LockMode,
    projection: F,
) -> Result<T>
where
    F: FnOnce(&mut Transaction<'_>, Option<&LockedDocument<'_>>) -> Result<T>,
{
    collection.with_document_lock(name, mode, |doc| {
        let present = txn.store().document_exists(doc.collection_path(), doc.name())?;
        projection(txn, present.then_some(doc))
    })
}

fn require_write(document: &LockedDocument<'_>) -> Result<()> {
    if document.is_write() {
        Ok(())
    } else {
        Err(Error::lock(
            document.display_path(),
            "modifying a document requires the document write lock",
        ))
    }
}

/// Turn request bytes into stored content
fn decode_content(txn: &mut Transaction<'_>, media_type: &str, bytes: &[u8]) -> Result<DocumentContent> {
    match txn.store().mime_table().content_kind(media_type) {
        ContentKind::Structured => {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::Malformed {
                source: Box::new(e),
            })?;
            let document = XmlDocument::parse(text)?;
            Ok(DocumentContent::Structured(Arc::new(document)))
        }
        ContentKind::Binary => {
            let blob_id = txn.put_blob(bytes)?;
            Ok(DocumentContent::Binary {
                blob_id,
                length: bytes.len() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbase_core::{ErrorKind, Principal};

    fn setup() -> (Arc<Database>, CollectionPath) {
        let db = Database::initialize_default().unwrap();
        let path = CollectionPath::parse("/db/docs").unwrap();
        db.transaction(Principal::System, |txn| db.collections().get_or_create(txn, &path))
            .unwrap();
        (db, path)
    }

    fn store(db: &Database, path: &CollectionPath, name: Option<&str>, media: &str, bytes: &[u8]) -> Result<DocumentRef> {
        let name = name.map(|n| DocumentName::new(n).unwrap());
        db.transaction(Principal::System, |txn| {
            db.write_collection(txn, path, |txn, c| {
                db.documents().store(txn, c, name, media, bytes)
            })
        })
    }

    fn read_bytes(db: &Database, path: &CollectionPath, name: &DocumentName) -> Option<Vec<u8>> {
        db.transaction(Principal::Anonymous, |txn| {
            db.read_collection(txn, path, |txn, c| {
                db.documents().read_document(txn, c, name, |txn, doc| match doc {
                    Some(doc) => db.documents().content(txn, doc).map(Some),
                    None => Ok(None),
                })
            })
        })
        .unwrap()
    }

    #[test]
    fn test_generated_name_uses_preferred_extension() {
        let (db, path) = setup();
        let xml = store(&db, &path, None, "application/xml", b"<a/>").unwrap();
        assert!(xml.is_new());
        assert!(xml.name().as_str().ends_with(".xml"));
        assert_eq!(xml.name().as_str().len(), 36 + 4);

        let png = store(&db, &path, None, "image/png", &[0x89, 0x50]).unwrap();
        assert!(png.name().as_str().ends_with(".png"));

        let unknown = store(&db, &path, None, "application/x-unknown", b"?").unwrap();
        assert!(Uuid::parse_str(unknown.name().as_str()).is_ok());
    }

    #[test]
    fn test_structured_round_trip() {
        let (db, path) = setup();
        let stored = store(&db, &path, None, "text/xml; charset=utf-8", b"<a x=\"1\"><b/></a>").unwrap();
        assert_eq!(stored.metadata().media_type, "text/xml");
        assert_eq!(stored.metadata().kind, ContentKind::Structured);
        assert_eq!(
            read_bytes(&db, &path, stored.name()).unwrap(),
            b"<a x=\"1\"><b/></a>".to_vec()
        );
    }

    #[test]
    fn test_binary_round_trip() {
        let (db, path) = setup();
        let bytes: Vec<u8> = (0..=255u8).collect();
        let stored = store(&db, &path, Some("data.bin"), "application/octet-stream", &bytes).unwrap();
        assert_eq!(stored.metadata().kind, ContentKind::Binary);
        assert_eq!(stored.metadata().length, 256);
        assert_eq!(read_bytes(&db, &path, stored.name()).unwrap(), bytes);
    }

    #[test]
    fn test_overwrite_keeps_identity() {
        let (db, path) = setup();
        let first = store(&db, &path, Some("a.xml"), "application/xml", b"<a/>").unwrap();
        let second = store(&db, &path, Some("a.xml"), "application/xml", b"<b/>").unwrap();
        assert!(!second.is_new());
        assert_eq!(first.id(), second.id());
        assert_eq!(first.created_at(), second.created_at());
        assert!(second.last_modified() > first.last_modified());
        assert_eq!(read_bytes(&db, &path, second.name()).unwrap(), b"<b/>".to_vec());
    }

    #[test]
    fn test_overwrite_binary_frees_old_blob() {
        let (db, path) = setup();
        store(&db, &path, Some("a.bin"), "application/octet-stream", b"one").unwrap();
        store(&db, &path, Some("a.bin"), "application/octet-stream", b"two").unwrap();
        assert_eq!(db.store().blobs().len(), 1);
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        let (db, path) = setup();
        let err = store(&db, &path, Some("bad.xml"), "application/xml", b"<a>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        let err = store(&db, &path, Some("bad.xml"), "application/xml", &[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(read_bytes(&db, &path, &DocumentName::new("bad.xml").unwrap()).is_none());
    }

    #[test]
    fn test_create_needs_collection_write_lock() {
        let (db, path) = setup();
        let err = db
            .transaction(Principal::System, |txn| {
                db.read_collection(txn, &path, |txn, c| {
                    db.documents().store(txn, c, None, "application/xml", b"<a/>")
                })
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockFailure);
    }

    #[test]
    fn test_read_document_missing_yields_none() {
        let (db, path) = setup();
        let name = DocumentName::new("nothing.xml").unwrap();
        assert!(read_bytes(&db, &path, &name).is_none());
        assert_eq!(db.locks().table().active_targets(), 0);
    }

    #[test]
    fn test_replace_needs_write_lock() {
        let (db, path) = setup();
        let stored = store(&db, &path, Some("a.xml"), "application/xml", b"<a/>").unwrap();
        let err = db
            .transaction(Principal::System, |txn| {
                db.read_collection(txn, &path, |txn, c| {
                    db.documents().read_document(txn, c, stored.name(), |txn, doc| {
                        let doc = doc.ok_or_else(|| Error::storage("missing"))?;
                        db.documents().replace(txn, doc, "application/xml", b"<b/>")
                    })
                })
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockFailure);
    }

    #[test]
    fn test_delete_removes_document() {
        let (db, path) = setup();
        let stored = store(&db, &path, Some("a.bin"), "application/octet-stream", b"x").unwrap();
        db.transaction(Principal::System, |txn| {
            db.write_collection(txn, &path, |txn, c| {
                db.documents().write_document(txn, c, stored.name(), |txn, doc| {
                    let doc = doc.ok_or_else(|| Error::storage("missing"))?;
                    db.documents().delete(txn, doc)
                })
            })
        })
        .unwrap();
        assert!(read_bytes(&db, &path, stored.name()).is_none());
        assert!(db.store().blobs().is_empty());
    }

    #[test]
    fn test_list_reports_stored_documents() {
        let (db, path) = setup();
        store(&db, &path, Some("b.xml"), "application/xml", b"<b/>").unwrap();
        store(&db, &path, Some("a.xml"), "application/xml", b"<a/>").unwrap();
        let names: Vec<String> = db
            .transaction(Principal::Anonymous, |txn| {
                db.read_collection(txn, &path, |txn, c| {
                    db.collections()
                        .list(txn, c)?
                        .map(|m| m.map(|m| m.name.to_string()))
                        .collect()
                })
            })
            .unwrap();
        assert_eq!(names, vec!["a.xml", "b.xml"]);
    }
}
