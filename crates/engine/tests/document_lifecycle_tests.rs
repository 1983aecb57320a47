//! Document Lifecycle Integration Tests
//!
//! Drives the engine through its public operations:
//! - Configuration loaded from a file
//! - Store, read, replace, list and delete under the lock discipline
//! - Serialization of stored documents
//! - Patches applied inside a transaction
//! - Concurrent writers on one document

use docbase_core::{CollectionPath, DocumentName, Error, ErrorKind, Principal, Result, Timestamp};
use docbase_engine::{parse_directives, serialize, Database, DatabaseConfig, Representation, CONFIG_FILE_NAME};
use std::sync::{Arc, Once};
use std::thread;
use tempfile::TempDir;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn docs() -> CollectionPath {
    CollectionPath::parse("/db/docs").unwrap()
}

fn setup() -> Arc<Database> {
    init_tracing();
    let db = Database::initialize_default().unwrap();
    db.transaction(Principal::System, |txn| db.collections().get_or_create(txn, &docs()))
        .unwrap();
    db
}

fn store(db: &Database, name: Option<&str>, media_type: &str, body: &[u8]) -> Result<(DocumentName, Timestamp)> {
    let name = name.map(DocumentName::new).transpose()?;
    db.transaction(Principal::System, |txn| {
        db.write_collection(txn, &docs(), |txn, c| {
            let stored = db.documents().store(txn, c, name, media_type, body)?;
            Ok((stored.name().clone(), stored.last_modified()))
        })
    })
}

fn read(db: &Database, name: &DocumentName, acceptable: &[&str]) -> Result<Option<Representation>> {
    let acceptable: Vec<String> = acceptable.iter().map(|s| s.to_string()).collect();
    db.transaction(Principal::Anonymous, |txn| {
        db.read_collection(txn, &docs(), |txn, c| {
            db.documents().read_document(txn, c, name, |txn, doc| match doc {
                None => Ok(None),
                Some(doc) => {
                    let record = db.documents().load(txn, doc)?;
                    serialize(&record, txn.store().blobs(), &acceptable).map(Some)
                }
            })
        })
    })
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_database_from_config_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    DatabaseConfig::write_default_if_missing(&path).unwrap();

    let mut config = DatabaseConfig::from_file(&path).unwrap();
    config.documents_collection = "/db/custom".to_string();
    config.pool.max_connections = 2;
    config.write_to_file(&path).unwrap();

    let loaded = DatabaseConfig::load_or_default(dir.path()).unwrap();
    assert_eq!(loaded, config);

    let db = Database::initialize(loaded).unwrap();
    assert_eq!(db.config().documents_collection, "/db/custom");
    assert_eq!(db.pool().config().max_connections, 2);
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_xml_round_trip() {
    let db = setup();
    let (name, _) = store(&db, Some("a.xml"), "application/xml", b"<a><b>x</b></a>").unwrap();
    let rep = read(&db, &name, &["application/xml"]).unwrap().unwrap();
    assert_eq!(rep, Representation::Markup("<a><b>x</b></a>".to_string()));
}

#[test]
fn test_binary_round_trip() {
    let db = setup();
    let bytes: Vec<u8> = (0..=255).collect();
    let (name, _) = store(&db, None, "image/png", &bytes).unwrap();
    assert!(name.as_str().ends_with(".png"));

    let rep = read(&db, &name, &["text/plain"]).unwrap().unwrap();
    assert_eq!(rep.media_type(), "image/png");
    assert_eq!(rep.into_bytes(), bytes);
}

#[test]
fn test_generated_names_are_unique() {
    let db = setup();
    let (a, _) = store(&db, None, "application/xml", b"<a/>").unwrap();
    let (b, _) = store(&db, None, "application/xml", b"<a/>").unwrap();
    assert_ne!(a, b);
    assert!(a.as_str().ends_with(".xml"));
}

#[test]
fn test_malformed_xml_stores_nothing() {
    let db = setup();
    let err = store(&db, Some("bad.xml"), "text/xml", b"<a><b></a>").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
    let name = DocumentName::new("bad.xml").unwrap();
    assert!(read(&db, &name, &["*/*"]).unwrap().is_none());
}

// ============================================================================
// Replace
// ============================================================================

#[test]
fn test_replace_keeps_identity_and_bumps_last_modified() {
    let db = setup();
    let (name, first) = store(&db, Some("doc.xml"), "application/xml", b"<v>1</v>").unwrap();

    let replaced = db
        .transaction(Principal::System, |txn| {
            db.write_collection(txn, &docs(), |txn, c| {
                db.documents().write_document(txn, c, &name, |txn, doc| {
                    let doc = doc.ok_or_else(|| Error::storage("missing"))?;
                    db.documents().replace(txn, doc, "application/xml", b"<v>2</v>")
                })
            })
        })
        .unwrap();

    assert!(!replaced.is_new());
    assert!(replaced.last_modified() > first);
    assert!(replaced.created_at() <= first);
    let rep = read(&db, &name, &["application/xml"]).unwrap().unwrap();
    assert_eq!(rep, Representation::Markup("<v>2</v>".to_string()));
}

// ============================================================================
// Listing and deletion
// ============================================================================

#[test]
fn test_list_then_delete() {
    let db = setup();
    store(&db, Some("one.xml"), "application/xml", b"<one/>").unwrap();
    store(&db, Some("two.bin"), "application/octet-stream", b"22").unwrap();

    let mut names: Vec<String> = db
        .transaction(Principal::Anonymous, |txn| {
            db.read_collection(txn, &docs(), |txn, c| {
                db.collections()
                    .list(txn, c)?
                    .map(|m| m.map(|m| m.name.as_str().to_string()))
                    .collect::<Result<Vec<_>>>()
            })
        })
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["one.xml", "two.bin"]);

    let one = DocumentName::new("one.xml").unwrap();
    let removed = db
        .transaction(Principal::System, |txn| {
            db.write_collection(txn, &docs(), |txn, c| {
                db.documents().write_document(txn, c, &one, |txn, doc| match doc {
                    Some(doc) => db.documents().delete(txn, doc).map(|_| true),
                    None => Ok(false),
                })
            })
        })
        .unwrap();
    assert!(removed);
    assert!(read(&db, &one, &["*/*"]).unwrap().is_none());
}

#[test]
fn test_delete_under_read_collection_lock_fails() {
    let db = setup();
    let (name, _) = store(&db, Some("keep.xml"), "application/xml", b"<k/>").unwrap();
    let err = db
        .transaction(Principal::System, |txn| {
            db.read_collection(txn, &docs(), |txn, c| {
                db.documents().write_document(txn, c, &name, |txn, doc| {
                    db.documents().delete(txn, doc.unwrap())
                })
            })
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockFailure);
    assert!(read(&db, &name, &["*/*"]).unwrap().is_some());
}

// ============================================================================
// Patches
// ============================================================================

#[test]
fn test_patch_in_transaction() {
    let db = setup();
    let (name, _) = store(&db, Some("list.xml"), "application/xml", b"<list><item>a</item></list>").unwrap();
    let patch = parse_directives(
        r#"<xu:modifications version="1.0" xmlns:xu="http://www.xmldb.org/xupdate">
             <xu:append select="/list"><item>b</item></xu:append>
             <xu:update select="/list/item[1]">A</xu:update>
           </xu:modifications>"#,
    )
    .unwrap();

    let applied = db
        .transaction(Principal::System, |txn| {
            db.write_collection(txn, &docs(), |txn, c| {
                db.documents().write_document(txn, c, &name, |txn, doc| {
                    db.patches().apply(txn, &patch, &[doc.unwrap()])
                })
            })
        })
        .unwrap();
    assert_eq!(applied, 2);

    let rep = read(&db, &name, &["application/json"]).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&rep.into_bytes()).unwrap();
    assert_eq!(value, serde_json::json!({"list": {"item": ["A", "b"]}}));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_replacements_serialize() {
    let db = setup();
    let (name, _) = store(&db, Some("counter.xml"), "application/xml", b"<n>0</n>").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            let name = name.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    db.transaction(Principal::System, |txn| {
                        db.read_collection(txn, &docs(), |txn, c| {
                            db.documents().write_document(txn, c, &name, |txn, doc| {
                                let doc = doc.ok_or_else(|| Error::storage("missing"))?;
                                let bytes = db.documents().content(txn, doc)?;
                                let text = String::from_utf8(bytes).unwrap();
                                let n: u32 = text.trim_start_matches("<n>").trim_end_matches("</n>").parse().unwrap();
                                let next = format!("<n>{}</n>", n + 1);
                                db.documents().replace(txn, doc, "application/xml", next.as_bytes())
                            })
                        })
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rep = read(&db, &name, &["application/xml"]).unwrap().unwrap();
    assert_eq!(rep, Representation::Markup("<n>20</n>".to_string()));
}
