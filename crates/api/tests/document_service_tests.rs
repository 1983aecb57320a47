//! Document Service Integration Tests
//!
//! Exercises the resource boundary end to end:
//! - Create, read, replace, delete and patch lifecycle
//! - Start-up contract
//! - Not-found handling
//! - Atomic patches
//! - Error to status mapping of real failures

use docbase_api::{is_not_modified, status_for, DocumentService, ErrorBody, Status};
use docbase_core::{CollectionPath, ErrorKind, Timestamp};
use docbase_engine::{Database, DatabaseConfig, Representation};
use proptest::prelude::*;
use std::sync::Once;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

fn service() -> DocumentService {
    init_tracing();
    DocumentService::start(Database::initialize_default().unwrap()).unwrap()
}

fn xml() -> Vec<String> {
    vec!["application/xml".to_string()]
}

fn markup(service: &DocumentService, id: &str) -> Option<(String, Timestamp)> {
    service.get_document(id, &xml()).unwrap().map(|r| match r.representation {
        Representation::Markup(text) => (text, r.last_modified),
        other => panic!("expected markup, got {:?}", other),
    })
}

const XUPDATE: &str = "http://www.xmldb.org/xupdate";

fn modifications(body: &str) -> String {
    format!(r#"<xu:modifications version="1.0" xmlns:xu="{}">{}</xu:modifications>"#, XUPDATE, body)
}

// ============================================================================
// Scenario
// ============================================================================

#[test]
fn test_document_lifecycle_scenario() {
    let service = service();

    let created = service.create_document(b"<a/>", "application/xml").unwrap();
    assert!(created.id.ends_with(".xml"));
    let t0 = created.last_modified;

    assert_eq!(markup(&service, &created.id), Some(("<a/>".to_string(), t0)));

    let t1 = service
        .replace_document(&created.id, b"<b/>", "application/xml")
        .unwrap()
        .unwrap();
    assert!(t1 > t0);
    assert_eq!(markup(&service, &created.id), Some(("<b/>".to_string(), t1)));

    assert!(service.delete_document(&created.id).unwrap());
    assert!(!service.delete_document(&created.id).unwrap());
    assert!(markup(&service, &created.id).is_none());

    let patch = modifications(r#"<xu:remove select="/b"/>"#);
    assert_eq!(service.patch_document("never-created.xml", &patch).unwrap(), None);
}

#[test]
fn test_invalid_patch_fails_before_existence_check() {
    let service = service();
    let created = service.create_document(b"<a/>", "application/xml").unwrap();

    let foreign = r#"<modifications xmlns="http://example.com/other"/>"#;
    for id in [created.id.as_str(), "never-created.xml"] {
        let err = service.patch_document(id, foreign).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(status_for(err.kind()), Status::BadRequest);
    }

    let err = service.patch_document("never-created.xml", "<unclosed").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

// ============================================================================
// Start-up
// ============================================================================

#[test]
fn test_start_creates_configured_collection() {
    init_tracing();
    let mut config = DatabaseConfig::default();
    config.documents_collection = "/db/team/docs".to_string();
    let db = Database::initialize(config).unwrap();

    let service = DocumentService::start(db).unwrap();
    assert_eq!(service.collection(), &CollectionPath::parse("/db/team/docs").unwrap());
    assert!(service.database().store().collection_exists(service.collection()));

    // a second start finds the existing collection
    let again = DocumentService::start(service.database().clone()).unwrap();
    assert_eq!(again.collection(), service.collection());
}

#[test]
fn test_start_rejects_bad_collection_path() {
    init_tracing();
    let mut config = DatabaseConfig::default();
    config.documents_collection = "relative/path".to_string();
    let err = Database::initialize(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitializationFailure);
}

#[test]
fn test_start_after_shutdown_fails() {
    init_tracing();
    let db = Database::initialize_default().unwrap();
    db.shutdown();
    let err = DocumentService::start(db).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitializationFailure);
    assert_eq!(err.root_kind(), ErrorKind::ResourceExhausted);
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn test_listing() {
    let service = service();
    let empty = service.list_documents().unwrap();
    assert!(empty.is_empty());

    let a = service.create_document(b"<a/>", "application/xml").unwrap();
    let b = service.create_document(b"plain", "text/plain").unwrap();
    let listing = service.list_documents().unwrap();

    assert_eq!(listing.len(), 2);
    assert_eq!(listing.last_modified, a.last_modified.max(b.last_modified));
    let mut ids: Vec<&str> = listing.documents.iter().map(|d| d.id.as_str()).collect();
    ids.sort();
    let mut expected = vec![a.id.as_str(), b.id.as_str()];
    expected.sort();
    assert_eq!(ids, expected);

    let text = listing.documents.iter().find(|d| d.id == b.id).unwrap();
    assert_eq!(text.media_type, "text/plain");
    assert_eq!(text.length, 5);
    assert_eq!(text.owner, "SYSTEM");
}

#[test]
fn test_representation_negotiation() {
    let service = service();
    let created = service.create_document(br#"<a n="1"/>"#, "text/xml").unwrap();

    let json = service
        .get_document(&created.id, &["application/json".to_string()])
        .unwrap()
        .unwrap();
    assert_eq!(json.representation.media_type(), "application/json");

    let err = service
        .get_document(&created.id, &["text/plain".to_string()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedRepresentation);
    assert_eq!(ErrorBody::from_error(&err).code, 406);
}

#[test]
fn test_conditional_read() {
    let service = service();
    let created = service.create_document(b"<a/>", "application/xml").unwrap();
    let (_, modified) = markup(&service, &created.id).unwrap();

    assert!(!is_not_modified(Some(modified), modified));
    assert!(is_not_modified(Some(Timestamp::from_micros(modified.as_micros() + 1)), modified));
}

#[test]
fn test_unknown_and_invalid_ids_are_not_found() {
    let service = service();
    for id in ["missing.xml", "", "a/b", ".."] {
        assert!(service.get_document(id, &xml()).unwrap().is_none(), "{:?}", id);
        assert!(service.replace_document(id, b"<a/>", "application/xml").unwrap().is_none());
        assert!(!service.delete_document(id).unwrap());
    }
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_malformed_create_is_bad_request() {
    let service = service();
    let err = service.create_document(b"<a>", "application/xml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Malformed);
    assert_eq!(ErrorBody::from_error(&err).status(), Status::BadRequest);
    assert!(service.list_documents().unwrap().is_empty());
}

#[test]
fn test_patch_reports_applied_count() {
    let service = service();
    let created = service
        .create_document(b"<list><item>1</item><item>2</item></list>", "application/xml")
        .unwrap();

    let patched = service
        .patch_document(
            &created.id,
            &modifications(r#"<xu:append select="/list/item"><done/></xu:append>"#),
        )
        .unwrap()
        .unwrap();
    assert_eq!(patched.applied, 2);
    assert!(patched.last_modified > created.last_modified);
    assert_eq!(
        markup(&service, &created.id).unwrap(),
        (
            "<list><item>1<done/></item><item>2<done/></item></list>".to_string(),
            patched.last_modified
        )
    );
}

#[test]
fn test_failed_patch_is_invisible() {
    let service = service();
    let created = service.create_document(b"<a><b/></a>", "application/xml").unwrap();
    let before = markup(&service, &created.id).unwrap();

    let err = service
        .patch_document(
            &created.id,
            &modifications(r#"<xu:remove select="/a/b"/><xu:insert-after select="/a"><c/></xu:insert-after>"#),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModificationFailure);
    assert_eq!(markup(&service, &created.id).unwrap(), before);
}

#[test]
fn test_operations_fail_after_shutdown() {
    let service = service();
    let created = service.create_document(b"<a/>", "application/xml").unwrap();
    service.database().shutdown();

    let err = service.get_document(&created.id, &xml()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(ErrorBody::from_error(&err).code, 500);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_binary_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let service = service();
        let created = service.create_document(&bytes, "application/octet-stream").unwrap();
        let retrieved = service.get_document(&created.id, &[]).unwrap().unwrap();
        prop_assert!(retrieved.last_modified >= created.last_modified);
        prop_assert_eq!(retrieved.representation.into_bytes(), bytes);
    }

    #[test]
    fn prop_replace_is_monotonic(rounds in 1usize..6) {
        let service = service();
        let created = service.create_document(b"<v>0</v>", "application/xml").unwrap();
        let mut previous = created.last_modified;
        for round in 1..=rounds {
            let body = format!("<v>{}</v>", round);
            let modified = service
                .replace_document(&created.id, body.as_bytes(), "application/xml")
                .unwrap()
                .unwrap();
            prop_assert!(modified > previous);
            previous = modified;
        }
        let summary = service.list_documents().unwrap().documents.remove(0);
        prop_assert_eq!(summary.created, created.last_modified.to_datetime());
    }
}
