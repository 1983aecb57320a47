//! Resource boundary for docbase
//!
//! This crate is what a transport layer talks to:
//! - **DocumentService**: create, list, read, replace, delete and patch the
//!   documents of one collection
//! - **Response mapping**: error kind to status, error bodies that keep the
//!   originating message
//! - **Conditional reads**: the if-modified-since comparison
//!
//! Routing, header parsing and response marshalling stay with the caller.
//!
//! ## Quick Start
//!
//! ```ignore
//! use docbase_api::DocumentService;
//! use docbase_engine::Database;
//!
//! let service = DocumentService::start(Database::initialize_default()?)?;
//! let created = service.create_document(b"<note>hi</note>", "application/xml")?;
//! let doc = service.get_document(&created.id, &["application/xml".to_string()])?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conditional;
pub mod domain;
pub mod response;
pub mod service;

pub use conditional::{is_not_modified, is_not_modified_since};
pub use domain::{Created, DocumentListing, DocumentSummary, Patched, Retrieved};
pub use response::{status_for, ErrorBody, Status};
pub use service::DocumentService;
