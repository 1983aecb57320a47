//! Serializer
//!
//! Renders a stored document into one representation chosen from the
//! caller's acceptable media types:
//!
//! | Content | Acceptable includes | Result |
//! |---|---|---|
//! | binary | anything | stored bytes, stored media type |
//! | structured | `application/xml`, `text/xml`, `application/*`, `*/*` | markup |
//! | structured | `application/json` | JSON rendering of the tree |
//! | structured | neither | `UnsupportedRepresentation` |
//!
//! Markup wins whenever it is acceptable at all. Output is always a complete
//! in-memory buffer.

use docbase_core::{Error, Result, XmlDocument};
use docbase_storage::{normalize_media_type, BlobStore, DocumentContent, DocumentRecord};

/// Media type of markup output
pub const MARKUP_MEDIA_TYPE: &str = "application/xml";

/// Media type of structured-data output
pub const DATA_MEDIA_TYPE: &str = "application/json";

const MARKUP_ACCEPTABLE: [&str; 4] = ["application/xml", "text/xml", "application/*", "*/*"];

/// A rendered document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// XML text
    Markup(String),
    /// JSON text
    Data(String),
    /// Raw stored bytes
    Binary {
        /// Media type the document was stored with
        media_type: String,
        /// The bytes
        bytes: Vec<u8>,
    },
}

impl Representation {
    /// Media type of this representation
    pub fn media_type(&self) -> &str {
        match self {
            Representation::Markup(_) => MARKUP_MEDIA_TYPE,
            Representation::Data(_) => DATA_MEDIA_TYPE,
            Representation::Binary { media_type, .. } => media_type,
        }
    }

    /// Length of the rendered buffer in bytes
    pub fn len(&self) -> usize {
        match self {
            Representation::Markup(text) | Representation::Data(text) => text.len(),
            Representation::Binary { bytes, .. } => bytes.len(),
        }
    }

    /// True if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rendered buffer
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Representation::Markup(text) | Representation::Data(text) => text.into_bytes(),
            Representation::Binary { bytes, .. } => bytes,
        }
    }
}

/// Render `record` for a caller accepting `acceptable`, in preference order
pub fn serialize(record: &DocumentRecord, blobs: &BlobStore, acceptable: &[String]) -> Result<Representation> {
    match &record.content {
        DocumentContent::Binary { .. } => Ok(Representation::Binary {
            media_type: record.media_type.clone(),
            bytes: record.content.to_bytes(blobs)?,
        }),
        DocumentContent::Structured(document) => serialize_structured(document, acceptable),
    }
}

fn serialize_structured(document: &XmlDocument, acceptable: &[String]) -> Result<Representation> {
    let normalized: Vec<String> = acceptable.iter().map(|m| normalize_media_type(m)).collect();
    let accepts = |candidates: &[&str]| normalized.iter().any(|m| candidates.contains(&m.as_str()));

    if accepts(&MARKUP_ACCEPTABLE) {
        return Ok(Representation::Markup(document.to_xml_string()));
    }
    if accepts(&[DATA_MEDIA_TYPE]) {
        let text = serde_json::to_string(&document.to_json_value())
            .map_err(|e| Error::storage_caused_by("rendering JSON", e))?;
        return Ok(Representation::Data(text));
    }
    Err(Error::UnsupportedRepresentation {
        acceptable: acceptable.to_vec(),
    })
}
