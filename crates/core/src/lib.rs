//! Core types for docbase
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: error taxonomy with an explicit [`ErrorKind`] tag
//! - Timestamp: microsecond-precision instants for created/last-modified metadata
//! - CollectionPath, DocumentName: validated addressing of collections and documents
//! - Principal, LockMode: who acts and how a lock is held
//! - xml: the tree model for structured content (parser, writer, JSON rendering)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod timestamp;
pub mod types;
pub mod xml;

pub use error::{BoxedCause, Error, ErrorKind, Result};
pub use timestamp::Timestamp;
pub use types::{CollectionPath, DocumentName, LockMode, Principal, ROOT_COLLECTION};
pub use xml::{NodeId, NodeKind, XmlDocument, XmlError};
