//! Core addressing types
//!
//! - [`CollectionPath`]: hierarchical, absolute path of a collection (`/db/<name>`)
//! - [`DocumentName`]: name of a document, unique within its collection
//! - [`Principal`]: the identity a connection acts as
//! - [`LockMode`]: read or write

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the root collection every path starts with
pub const ROOT_COLLECTION: &str = "db";

/// Absolute path of a collection in the hierarchical store
///
/// Always starts with `/db`. Segments are non-empty and never `.` or `..`.
/// Trailing slashes are ignored when parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// The root collection, `/db`
    pub fn root() -> Self {
        CollectionPath {
            segments: vec![ROOT_COLLECTION.to_string()],
        }
    }

    /// Parse and validate a path
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_end_matches('/');
        let rest = trimmed.strip_prefix('/').ok_or_else(|| {
            Error::invalid_input(format!("collection path '{}' is not absolute", path))
        })?;

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            validate_segment(segment).map_err(|reason| {
                Error::invalid_input(format!("collection path '{}': {}", path, reason))
            })?;
            segments.push(segment.to_string());
        }

        if segments.first().map(String::as_str) != Some(ROOT_COLLECTION) {
            return Err(Error::invalid_input(format!(
                "collection path '{}' must start with /{}",
                path, ROOT_COLLECTION
            )));
        }
        Ok(CollectionPath { segments })
    }

    /// Path of a child collection
    pub fn child(&self, name: &str) -> Result<Self> {
        validate_segment(name).map_err(|reason| {
            Error::invalid_input(format!("collection name '{}': {}", name, reason))
        })?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(CollectionPath { segments })
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// This path and all its ancestors, root first
    pub fn lineage(&self) -> Vec<CollectionPath> {
        (1..=self.segments.len())
            .map(|n| CollectionPath {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or(ROOT_COLLECTION)
    }

    /// Number of segments (the root has depth 1)
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True if this is the root collection
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Path of a document inside this collection, for display
    pub fn document_path(&self, name: &DocumentName) -> String {
        format!("{}/{}", self, name)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for CollectionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CollectionPath::parse(s)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        CollectionPath::parse(&s)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.to_string()
    }
}

/// Name of a document within a collection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentName(String);

impl DocumentName {
    /// Validate and wrap a document name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_segment(&name).map_err(|reason| {
            Error::invalid_input(format!("document name '{}': {}", name, reason))
        })?;
        Ok(DocumentName(name))
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension including the leading dot, if any
    pub fn extension(&self) -> Option<&str> {
        self.0.rfind('.').filter(|&i| i > 0).map(|i| &self.0[i..])
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentName::new(s)
    }
}

impl TryFrom<String> for DocumentName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        DocumentName::new(s)
    }
}

impl From<DocumentName> for String {
    fn from(name: DocumentName) -> Self {
        name.0
    }
}

fn validate_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if segment == "." || segment == ".." {
        return Err("relative segments are not allowed");
    }
    if segment.contains('/') {
        return Err("'/' is not allowed");
    }
    if segment.chars().any(char::is_control) {
        return Err("control characters are not allowed");
    }
    Ok(())
}

/// Identity a connection acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// The distinguished system principal; bypasses permission checks
    System,
    /// No authenticated user
    Anonymous,
}

impl Principal {
    /// User name recorded as the owner of resources this principal creates
    pub fn user_name(&self) -> &'static str {
        match self {
            Principal::System => "SYSTEM",
            Principal::Anonymous => "guest",
        }
    }

    /// Primary group of the principal
    pub fn group_name(&self) -> &'static str {
        match self {
            Principal::System => "dba",
            Principal::Anonymous => "guest",
        }
    }

    /// True for the system principal
    pub fn is_system(&self) -> bool {
        matches!(self, Principal::System)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_name())
    }
}

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared: compatible with other readers
    Read,
    /// Exclusive: incompatible with every other holder
    Write,
}

impl LockMode {
    /// True if a holder in `self` mode may coexist with a holder in `other` mode
    pub fn is_compatible_with(&self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Read, LockMode::Read))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => f.write_str("read"),
            LockMode::Write => f.write_str("write"),
        }
    }
}
