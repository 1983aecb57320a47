//! Docbase - transactional document repository
//!
//! Docbase stores XML and binary documents in path-addressed collections of
//! an embedded hierarchical store. Every operation runs in its own
//! transaction under a collection/document lock discipline, and XML documents
//! accept XUpdate patches that apply atomically.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbase::{Database, DocumentService};
//!
//! let service = DocumentService::start(Database::initialize_default()?)?;
//! let created = service.create_document(b"<list/>", "application/xml")?;
//! service.patch_document(&created.id, PATCH)?;
//! ```
//!
//! # Architecture
//!
//! The [`DocumentService`] is the resource boundary; it sits on the engine's
//! [`Database`] handle, which owns the store, connection pool, transaction
//! manager and lock coordinator.

pub use docbase_api::*;
pub use docbase_core::{Error, ErrorKind, Result, Timestamp};
pub use docbase_engine::{Database, DatabaseConfig, Representation};
