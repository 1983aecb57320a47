//! Document engine for docbase
//!
//! This crate orchestrates the lower layers into document operations:
//! - Database: lifecycle, configuration, scoped transactions and locks
//! - Collection store: path-addressed collections and their listings
//! - Document store: store, replace, read and delete under the lock discipline
//! - Serializer: markup, JSON or raw bytes for a stored document
//! - Patch engine: XUpdate directives applied atomically
//!
//! The engine is the only component that knows how locks, transactions and
//! storage fit together; the API layer above it only sees these operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod database;
pub mod document;
pub mod patch;
pub mod serializer;

pub use collection::{CollectionStore, DocumentIter};
pub use database::{ConfigError, Database, DatabaseConfig, CONFIG_FILE_NAME, DEFAULT_DOCUMENTS_COLLECTION};
pub use document::{DocumentRef, DocumentStore};
pub use patch::{parse_directives, PatchDocument, PatchEngine, XUPDATE_NS};
pub use serializer::{serialize, Representation};
