//! Patch engine
//!
//! Applies XUpdate modification documents to stored XML documents.
//!
//! A patch is parsed and validated up front into a [`PatchDocument`], which
//! holds no reference to the patch text. [`PatchEngine::apply`] then runs the
//! directives in order against a working copy of each target; the copy is
//! written back only when every directive succeeded and at least one node was
//! affected, so a failing patch leaves the target untouched.
//!
//! ```text
//! <xu:modifications version="1.0" xmlns:xu="http://www.xmldb.org/xupdate">
//!   <xu:append select="/list"><item>new</item></xu:append>
//!   <xu:remove select="/list/item[1]"/>
//! </xu:modifications>
//! ```

mod directive;
mod select;

pub use directive::{ChildPosition, Content, Directive, DirectiveKind};
pub use select::Selector;

use crate::database::Database;
use docbase_concurrency::{LockedDocument, Transaction};
use docbase_core::{Error, NodeKind, Result, XmlDocument};
use docbase_storage::DocumentContent;
use std::sync::Arc;
use tracing::{debug, info};

/// Namespace of XUpdate directives
pub const XUPDATE_NS: &str = "http://www.xmldb.org/xupdate";

/// A validated, ordered list of directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDocument {
    directives: Vec<Directive>,
}

impl PatchDocument {
    /// Number of directives
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    /// True if the modifications element was empty
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Directives in document order
    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.directives.iter()
    }

    /// Run every directive against `doc`, returning the total nodes affected
    ///
    /// Stops at the first failure; `doc` is then partially modified.
    pub fn apply_to(&self, doc: &mut XmlDocument) -> Result<u64> {
        let mut applied = 0;
        for directive in &self.directives {
            let count = directive.apply(doc)?;
            debug!(
                target: "docbase::patch",
                directive = directive.kind().element_name(),
                select = directive.select().expression(),
                count,
                "Directive applied"
            );
            applied += count;
        }
        Ok(applied)
    }
}

impl<'a> IntoIterator for &'a PatchDocument {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Parse and validate an XUpdate document
///
/// Fails with `Malformed` if the text is not well-formed XML and with
/// `Validation` if it is not an XUpdate modifications document.
pub fn parse_directives(text: &str) -> Result<PatchDocument> {
    let patch = XmlDocument::parse(text).map_err(|e| Error::Malformed {
        source: Box::new(e),
    })?;
    let root = patch
        .document_element()
        .ok_or_else(|| Error::validation("Content was not an XUpdate modifications element"))?;
    if patch.namespace_uri(root) != Some(XUPDATE_NS) {
        return Err(Error::validation("Content was not in the XUpdate namespace"));
    }
    if patch.local_name(root) != Some("modifications") {
        return Err(Error::validation("Content was not an XUpdate modifications element"));
    }

    let mut directives = Vec::new();
    for &child in patch.children(root) {
        match patch.kind(child) {
            NodeKind::Element { .. } => directives.push(Directive::from_element(&patch, child)?),
            NodeKind::Text(text) if !text.trim().is_empty() => {
                return Err(Error::validation(
                    "text is not allowed between XUpdate directives",
                ))
            }
            _ => {}
        }
    }
    Ok(PatchDocument { directives })
}

/// Applies patches to locked documents of a [`Database`]
#[derive(Debug, Clone, Copy)]
pub struct PatchEngine<'db> {
    db: &'db Database,
}

impl<'db> PatchEngine<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Apply `patch` to every target, returning the summed effect count
    ///
    /// Each target must be held for writing and hold structured content.
    /// Targets whose count is zero keep their last-modified time.
    pub fn apply(
        &self,
        txn: &mut Transaction<'_>,
        patch: &PatchDocument,
        targets: &[&LockedDocument<'_>],
    ) -> Result<u64> {
        let documents = self.db.documents();
        let mut total = 0;
        for &target in targets {
            let record = documents.load(txn, target)?;
            let DocumentContent::Structured(tree) = &record.content else {
                return Err(Error::modification(format!(
                    "document {} is not XML and cannot be patched",
                    target.display_path()
                )));
            };

            let mut working = XmlDocument::clone(tree);
            let applied = patch.apply_to(&mut working)?;
            if applied > 0 {
                documents.replace_content(
                    txn,
                    target,
                    &record.media_type,
                    DocumentContent::Structured(Arc::new(working)),
                )?;
            }
            info!(
                target: "docbase::patch",
                document = %target.display_path(),
                directives = patch.len(),
                applied,
                "Patch applied"
            );
            total += applied;
        }
        Ok(total)
    }
}
