//! Media-type table
//!
//! Maps a media type to its preferred file extension and to the kind of
//! content the store keeps for it. Lookup ignores case and parameters
//! (`text/xml; charset=utf-8` resolves like `text/xml`).

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// How the store keeps a document's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    /// Parsed into an XML tree
    Structured,
    /// Kept verbatim in the blob store
    Binary,
}

/// One media type known to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeEntry {
    /// Preferred extension including the leading dot
    pub extension: String,
    /// Content kind
    pub kind: ContentKind,
}

/// Media type → extension / content kind table
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    entries: FxHashMap<String, MimeEntry>,
}

/// Built-in table
pub static DEFAULT_MIME_TABLE: Lazy<MimeTable> = Lazy::new(MimeTable::builtin);

impl MimeTable {
    /// Empty table; unknown types are binary with no extension
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in media types
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (media_type, extension, kind) in [
            ("application/xml", ".xml", ContentKind::Structured),
            ("text/xml", ".xml", ContentKind::Structured),
            ("application/xhtml+xml", ".xhtml", ContentKind::Structured),
            ("image/svg+xml", ".svg", ContentKind::Structured),
            ("application/xslt+xml", ".xsl", ContentKind::Structured),
            ("application/json", ".json", ContentKind::Binary),
            ("text/plain", ".txt", ContentKind::Binary),
            ("text/html", ".html", ContentKind::Binary),
            ("text/css", ".css", ContentKind::Binary),
            ("application/octet-stream", ".bin", ContentKind::Binary),
            ("application/pdf", ".pdf", ContentKind::Binary),
            ("image/png", ".png", ContentKind::Binary),
            ("image/jpeg", ".jpg", ContentKind::Binary),
            ("image/gif", ".gif", ContentKind::Binary),
        ] {
            table.register(media_type, extension, kind);
        }
        table
    }

    /// Add or replace an entry
    pub fn register(&mut self, media_type: &str, extension: &str, kind: ContentKind) {
        self.entries.insert(
            normalize_media_type(media_type),
            MimeEntry {
                extension: extension.to_string(),
                kind,
            },
        );
    }

    /// Entry for a media type, if registered
    pub fn lookup(&self, media_type: &str) -> Option<&MimeEntry> {
        self.entries.get(&normalize_media_type(media_type))
    }

    /// Preferred extension (`""` for unknown non-XML types)
    pub fn preferred_extension(&self, media_type: &str) -> &str {
        match self.lookup(media_type) {
            Some(entry) => &entry.extension,
            None if is_xml_media_type(media_type) => ".xml",
            None => "",
        }
    }

    /// Content kind; unregistered `*+xml` types are structured, everything else binary
    pub fn content_kind(&self, media_type: &str) -> ContentKind {
        match self.lookup(media_type) {
            Some(entry) => entry.kind,
            None if is_xml_media_type(media_type) => ContentKind::Structured,
            None => ContentKind::Binary,
        }
    }
}

/// Lowercase a media type and strip its parameters
pub fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_xml_media_type(media_type: &str) -> bool {
    let normalized = normalize_media_type(media_type);
    normalized == "application/xml" || normalized == "text/xml" || normalized.ends_with("+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_types_are_structured() {
        let table = MimeTable::builtin();
        assert_eq!(table.content_kind("application/xml"), ContentKind::Structured);
        assert_eq!(table.content_kind("text/xml"), ContentKind::Structured);
        assert_eq!(table.content_kind("application/atom+xml"), ContentKind::Structured);
    }

    #[test]
    fn test_other_types_are_binary() {
        let table = MimeTable::builtin();
        assert_eq!(table.content_kind("application/json"), ContentKind::Binary);
        assert_eq!(table.content_kind("application/x-unknown"), ContentKind::Binary);
    }

    #[test]
    fn test_preferred_extension() {
        let table = MimeTable::builtin();
        assert_eq!(table.preferred_extension("application/xml"), ".xml");
        assert_eq!(table.preferred_extension("image/png"), ".png");
        assert_eq!(table.preferred_extension("application/atom+xml"), ".xml");
        assert_eq!(table.preferred_extension("application/x-unknown"), "");
    }

    #[test]
    fn test_parameters_and_case_are_ignored() {
        let table = MimeTable::builtin();
        assert_eq!(table.preferred_extension("Text/XML; charset=UTF-8"), ".xml");
        assert_eq!(normalize_media_type(" Application/JSON ;q=1"), "application/json");
    }

    #[test]
    fn test_register_overrides() {
        let mut table = MimeTable::new();
        table.register("application/json", ".js", ContentKind::Binary);
        assert_eq!(table.preferred_extension("application/json"), ".js");
    }

    #[test]
    fn test_default_table_is_builtin() {
        assert_eq!(DEFAULT_MIME_TABLE.preferred_extension("text/plain"), ".txt");
    }
}
