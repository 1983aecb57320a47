//! XUpdate directives
//!
//! Parsing turns each child of `xupdate:modifications` into a [`Directive`]
//! that owns its selector and content, independent of the patch document it
//! came from. Applying a directive mutates a working copy of the target tree
//! and reports how many nodes it affected.

use super::select::Selector;
use super::XUPDATE_NS;
use docbase_core::{Error, NodeId, NodeKind, Result, XmlDocument};

/// What a directive does to each selected node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Insert content as preceding siblings
    InsertBefore,
    /// Insert content as following siblings
    InsertAfter,
    /// Add content as children (and attributes)
    Append {
        /// Where among the existing children; `None` appends at the end
        child: Option<ChildPosition>,
    },
    /// Replace the node's content or value
    Update,
    /// Remove the node
    Remove,
    /// Give the node a new name
    Rename,
}

impl DirectiveKind {
    /// The directive's element name in the XUpdate namespace
    pub fn element_name(&self) -> &'static str {
        match self {
            DirectiveKind::InsertBefore => "insert-before",
            DirectiveKind::InsertAfter => "insert-after",
            DirectiveKind::Append { .. } => "append",
            DirectiveKind::Update => "update",
            DirectiveKind::Remove => "remove",
            DirectiveKind::Rename => "rename",
        }
    }
}

/// Position given by an `append` directive's `child` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPosition {
    /// Become the n-th child (1-based)
    Index(usize),
    /// Become the last child
    Last,
}

/// A node to construct in the target document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// An element with its attributes and children
    Element {
        /// Qualified name
        name: String,
        /// Attributes in order
        attributes: Vec<(String, String)>,
        /// Child content
        children: Vec<Content>,
    },
    /// An attribute for the enclosing or selected element
    Attribute {
        /// Qualified name
        name: String,
        /// Value
        value: String,
    },
    /// Character data
    Text(String),
    /// A comment
    Comment(String),
    /// A processing instruction
    ProcessingInstruction {
        /// PI target
        target: String,
        /// PI data
        data: String,
    },
}

/// One parsed modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    kind: DirectiveKind,
    select: Selector,
    content: Vec<Content>,
}

impl Directive {
    /// Operation kind
    pub fn kind(&self) -> &DirectiveKind {
        &self.kind
    }

    /// Target selector
    pub fn select(&self) -> &Selector {
        &self.select
    }

    /// Constructed content, in order
    pub fn content(&self) -> &[Content] {
        &self.content
    }

    /// Parse a directive element of a patch document
    pub(crate) fn from_element(patch: &XmlDocument, element: NodeId) -> Result<Self> {
        let local = patch.local_name(element).unwrap_or_default();
        if patch.namespace_uri(element) != Some(XUPDATE_NS) {
            return Err(Error::validation(format!(
                "'{}' is not an XUpdate directive",
                patch.name(element).unwrap_or_default()
            )));
        }

        let kind = match local {
            "insert-before" => DirectiveKind::InsertBefore,
            "insert-after" => DirectiveKind::InsertAfter,
            "append" => DirectiveKind::Append {
                child: parse_child_position(patch.attribute(element, "child"))?,
            },
            "update" => DirectiveKind::Update,
            "remove" => DirectiveKind::Remove,
            "rename" => DirectiveKind::Rename,
            other => {
                return Err(Error::validation(format!(
                    "unsupported XUpdate directive '{}'",
                    other
                )))
            }
        };

        let select = patch
            .attribute(element, "select")
            .ok_or_else(|| Error::validation(format!("xupdate:{} requires a select attribute", local)))?;
        let select = Selector::parse(select)?;

        let content = parse_content(patch, element)?;
        if kind == DirectiveKind::Rename && rename_target(&content).is_none() {
            return Err(Error::validation("xupdate:rename requires the new name as its content"));
        }

        Ok(Directive {
            kind,
            select,
            content,
        })
    }

    /// Apply to `doc`, returning the number of nodes affected
    pub(crate) fn apply(&self, doc: &mut XmlDocument) -> Result<u64> {
        let targets = self.select.select(doc);
        let mut affected = 0;
        for target in targets {
            // an earlier removal in this directive may have detached it
            if !doc.is_attached(target) {
                continue;
            }
            match &self.kind {
                DirectiveKind::InsertBefore => self.insert_before(doc, target)?,
                DirectiveKind::InsertAfter => self.insert_after(doc, target)?,
                DirectiveKind::Append { child } => self.append(doc, target, *child)?,
                DirectiveKind::Update => self.update(doc, target)?,
                DirectiveKind::Remove => remove(doc, target)?,
                DirectiveKind::Rename => self.rename(doc, target)?,
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_before(&self, doc: &mut XmlDocument, target: NodeId) -> Result<()> {
        for content in &self.content {
            let node = build_child(doc, content)?;
            doc.insert_before(target, node)?;
        }
        Ok(())
    }

    fn insert_after(&self, doc: &mut XmlDocument, target: NodeId) -> Result<()> {
        let mut anchor = target;
        for content in &self.content {
            let node = build_child(doc, content)?;
            doc.insert_after(anchor, node)?;
            anchor = node;
        }
        Ok(())
    }

    fn append(&self, doc: &mut XmlDocument, target: NodeId, child: Option<ChildPosition>) -> Result<()> {
        if !matches!(doc.kind(target), NodeKind::Element { .. } | NodeKind::Document) {
            return Err(Error::modification(format!(
                "cannot append to a {} node",
                kind_name(doc.kind(target))
            )));
        }
        let mut index = match child {
            Some(ChildPosition::Index(n)) => n - 1,
            Some(ChildPosition::Last) | None => doc.children(target).len(),
        };
        for content in &self.content {
            match content {
                Content::Attribute { name, value } => doc.set_attribute(target, name, value)?,
                other => {
                    let node = build_child(doc, other)?;
                    doc.insert_child(target, index, node)?;
                    index += 1;
                }
            }
        }
        Ok(())
    }

    fn update(&self, doc: &mut XmlDocument, target: NodeId) -> Result<()> {
        match doc.kind(target) {
            NodeKind::Document => Err(Error::modification("cannot update the document node")),
            NodeKind::Element { .. } => {
                doc.clear_children(target);
                for content in &self.content {
                    match content {
                        Content::Attribute { name, value } => doc.set_attribute(target, name, value)?,
                        other => {
                            let node = build_child(doc, other)?;
                            doc.append_child(target, node)?;
                        }
                    }
                }
                Ok(())
            }
            _ => {
                let value = text_of(&self.content);
                doc.set_value(target, &value)?;
                Ok(())
            }
        }
    }

    fn rename(&self, doc: &mut XmlDocument, target: NodeId) -> Result<()> {
        let new_name = rename_target(&self.content)
            .ok_or_else(|| Error::modification("rename without a new name"))?;
        doc.rename(target, &new_name)?;
        Ok(())
    }
}

fn remove(doc: &mut XmlDocument, target: NodeId) -> Result<()> {
    if target == doc.root() {
        return Err(Error::modification("cannot remove the document node"));
    }
    if Some(target) == doc.document_element() {
        return Err(Error::modification("cannot remove the document element"));
    }
    doc.detach(target)?;
    Ok(())
}

fn kind_name(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Document => "document",
        NodeKind::Element { .. } => "element",
        NodeKind::Attribute { .. } => "attribute",
        NodeKind::Text(_) => "text",
        NodeKind::Comment(_) => "comment",
        NodeKind::ProcessingInstruction { .. } => "processing-instruction",
    }
}

fn text_of(content: &[Content]) -> String {
    content
        .iter()
        .map(|c| match c {
            Content::Text(text) => text.clone(),
            Content::Element { children, .. } => text_of(children),
            _ => String::new(),
        })
        .collect()
}

fn rename_target(content: &[Content]) -> Option<String> {
    let name = text_of(content).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Construct a non-attribute node, detached
fn build_child(doc: &mut XmlDocument, content: &Content) -> Result<NodeId> {
    match content {
        Content::Element {
            name,
            attributes,
            children,
        } => {
            let element = doc.create_element(name)?;
            for (attr, value) in attributes {
                doc.set_attribute(element, attr, value)?;
            }
            for child in children {
                match child {
                    Content::Attribute { name, value } => doc.set_attribute(element, name, value)?,
                    other => {
                        let node = build_child(doc, other)?;
                        doc.append_child(element, node)?;
                    }
                }
            }
            Ok(element)
        }
        Content::Attribute { name, .. } => Err(Error::modification(format!(
            "attribute '{}' can only be added to an element",
            name
        ))),
        Content::Text(text) => Ok(doc.create_text(text)),
        Content::Comment(text) => Ok(doc.create_comment(text)?),
        Content::ProcessingInstruction { target, data } => {
            Ok(doc.create_processing_instruction(target, data)?)
        }
    }
}

fn parse_child_position(value: Option<&str>) -> Result<Option<ChildPosition>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim();
    if value == "last()" {
        return Ok(Some(ChildPosition::Last));
    }
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(ChildPosition::Index(n))),
        _ => Err(Error::validation(format!(
            "append child position '{}' is not a positive integer or last()",
            value
        ))),
    }
}

fn is_xupdate(patch: &XmlDocument, node: NodeId) -> bool {
    patch.namespace_uri(node) == Some(XUPDATE_NS)
}

/// Content constructors below a directive or constructor element
fn parse_content(patch: &XmlDocument, parent: NodeId) -> Result<Vec<Content>> {
    let mut out = Vec::new();
    for &child in patch.children(parent) {
        match patch.kind(child) {
            NodeKind::Text(text) => {
                if !text.trim().is_empty() {
                    out.push(Content::Text(text.clone()));
                }
            }
            NodeKind::Comment(_) => {}
            NodeKind::ProcessingInstruction { target, data } => {
                out.push(Content::ProcessingInstruction {
                    target: target.clone(),
                    data: data.clone(),
                });
            }
            NodeKind::Element { name } if !is_xupdate(patch, child) => {
                out.push(Content::Element {
                    name: name.clone(),
                    attributes: literal_attributes(patch, child),
                    children: parse_content(patch, child)?,
                });
            }
            NodeKind::Element { .. } => out.push(parse_constructor(patch, child)?),
            NodeKind::Document | NodeKind::Attribute { .. } => {}
        }
    }
    Ok(out)
}

/// Attributes of a literal element, minus the XUpdate namespace declaration
fn literal_attributes(patch: &XmlDocument, element: NodeId) -> Vec<(String, String)> {
    patch
        .attributes(element)
        .iter()
        .filter_map(|&attr| match patch.kind(attr) {
            NodeKind::Attribute { name, value }
                if !(name.starts_with("xmlns") && value == XUPDATE_NS) =>
            {
                Some((name.clone(), value.clone()))
            }
            _ => None,
        })
        .collect()
}

fn required_name(patch: &XmlDocument, element: NodeId, what: &str) -> Result<String> {
    patch
        .attribute(element, "name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::validation(format!("xupdate:{} requires a name attribute", what)))
}

fn parse_constructor(patch: &XmlDocument, element: NodeId) -> Result<Content> {
    let local = patch.local_name(element).unwrap_or_default();
    match local {
        "element" => Ok(Content::Element {
            name: required_name(patch, element, local)?,
            attributes: Vec::new(),
            children: parse_content(patch, element)?,
        }),
        "attribute" => Ok(Content::Attribute {
            name: required_name(patch, element, local)?,
            value: patch.string_value(element),
        }),
        "text" => Ok(Content::Text(patch.string_value(element))),
        "comment" => Ok(Content::Comment(patch.string_value(element))),
        "processing-instruction" => Ok(Content::ProcessingInstruction {
            target: required_name(patch, element, local)?,
            data: patch.string_value(element).trim().to_string(),
        }),
        other => Err(Error::validation(format!(
            "unsupported XUpdate constructor '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbase_core::ErrorKind;

    fn directive(body: &str) -> Result<Directive> {
        let text = format!(
            r#"<xu:modifications xmlns:xu="{}">{}</xu:modifications>"#,
            XUPDATE_NS, body
        );
        let patch = XmlDocument::parse(&text).unwrap();
        let root = patch.document_element().unwrap();
        let first = patch
            .children(root)
            .iter()
            .copied()
            .find(|&c| patch.is_element(c))
            .unwrap();
        Directive::from_element(&patch, first)
    }

    fn apply(xml: &str, body: &str) -> (String, Result<u64>) {
        let mut doc = XmlDocument::parse(xml).unwrap();
        let result = directive(body).and_then(|d| d.apply(&mut doc));
        (doc.to_xml_string(), result)
    }

    #[test]
    fn test_append_literal_element() {
        let (xml, count) = apply("<a><b/></a>", r#"<xu:append select="/a"><c x="1">hi</c></xu:append>"#);
        assert_eq!(count.unwrap(), 1);
        assert_eq!(xml, r#"<a><b/><c x="1">hi</c></a>"#);
    }

    #[test]
    fn test_append_at_position() {
        let (xml, _) = apply(
            "<a><b/><d/></a>",
            r#"<xu:append select="/a" child="2"><xu:element name="c"/></xu:append>"#,
        );
        assert_eq!(xml, "<a><b/><c/><d/></a>");
    }

    #[test]
    fn test_append_attribute_constructor() {
        let (xml, _) = apply(
            "<a/>",
            r#"<xu:append select="/a"><xu:attribute name="k">v</xu:attribute></xu:append>"#,
        );
        assert_eq!(xml, r#"<a k="v"/>"#);
    }

    #[test]
    fn test_element_constructor_with_nested_content() {
        let (xml, _) = apply(
            "<a/>",
            r#"<xu:append select="/a"><xu:element name="item"><xu:attribute name="id">7</xu:attribute><xu:text>seven</xu:text><xu:comment>c</xu:comment></xu:element></xu:append>"#,
        );
        assert_eq!(xml, r#"<a><item id="7">seven<!--c--></item></a>"#);
    }

    #[test]
    fn test_insert_before_and_after_each_target() {
        let (xml, count) = apply(
            "<a><b/><b/></a>",
            r#"<xu:insert-after select="/a/b"><x/><y/></xu:insert-after>"#,
        );
        assert_eq!(count.unwrap(), 2);
        assert_eq!(xml, "<a><b/><x/><y/><b/><x/><y/></a>");

        let (xml, _) = apply("<a><b/></a>", r#"<xu:insert-before select="/a/b"><x/><y/></xu:insert-before>"#);
        assert_eq!(xml, "<a><x/><y/><b/></a>");
    }

    #[test]
    fn test_update_element_and_attribute() {
        let (xml, _) = apply("<a><b>old<c/></b></a>", r#"<xu:update select="/a/b">new</xu:update>"#);
        assert_eq!(xml, "<a><b>new</b></a>");
        let (xml, _) = apply(r#"<a k="1"/>"#, r#"<xu:update select="/a/@k">2</xu:update>"#);
        assert_eq!(xml, r#"<a k="2"/>"#);
    }

    #[test]
    fn test_remove_counts_each_node() {
        let (xml, count) = apply("<a><b/><c/><b/></a>", r#"<xu:remove select="//b"/>"#);
        assert_eq!(count.unwrap(), 2);
        assert_eq!(xml, "<a><c/></a>");
    }

    #[test]
    fn test_remove_attribute() {
        let (xml, _) = apply(r#"<a k="1" j="2"/>"#, r#"<xu:remove select="/a/@k"/>"#);
        assert_eq!(xml, r#"<a j="2"/>"#);
    }

    #[test]
    fn test_rename_element() {
        let (xml, count) = apply("<a><b>x</b></a>", r#"<xu:rename select="/a/b"> renamed </xu:rename>"#);
        assert_eq!(count.unwrap(), 1);
        assert_eq!(xml, "<a><renamed>x</renamed></a>");
    }

    #[test]
    fn test_no_match_is_zero() {
        let (xml, count) = apply("<a/>", r#"<xu:remove select="/a/missing"/>"#);
        assert_eq!(count.unwrap(), 0);
        assert_eq!(xml, "<a/>");
    }

    #[test]
    fn test_runtime_misuse_is_modification_failure() {
        let cases = [
            ("<a/>", r#"<xu:remove select="/a"/>"#),
            ("<a>t</a>", r#"<xu:append select="/a/text()"><b/></xu:append>"#),
            ("<a/>", r#"<xu:insert-before select="/a"><b/></xu:insert-before>"#),
            ("<a><b/></a>", r#"<xu:insert-after select="/a/b"><xu:attribute name="k">v</xu:attribute></xu:insert-after>"#),
            ("<a><b/></a>", r#"<xu:rename select="/a/b">not a name</xu:rename>"#),
            ("<a/>", r#"<xu:update select="/">x</xu:update>"#),
        ];
        for (xml, body) in cases {
            let err = apply(xml, body).1.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ModificationFailure, "{}", body);
        }
    }

    #[test]
    fn test_parse_errors_are_validation() {
        let cases = [
            r#"<xu:append><b/></xu:append>"#,
            r#"<xu:append select="/a[" />"#,
            r#"<xu:append select="/a" child="0"/>"#,
            r#"<xu:variable name="v" select="/a"/>"#,
            r#"<xu:rename select="/a"/>"#,
            r#"<xu:append select="/a"><xu:element/></xu:append>"#,
            r#"<xu:append select="/a"><xu:value-of select="/a"/></xu:append>"#,
            r#"<other select="/a"/>"#,
        ];
        for body in cases {
            let err = directive(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", body);
        }
    }

    #[test]
    fn test_parsed_directive_accessors() {
        let d = directive(r#"<xu:append select="/a" child="last()"><b/></xu:append>"#).unwrap();
        assert_eq!(
            d.kind(),
            &DirectiveKind::Append {
                child: Some(ChildPosition::Last)
            }
        );
        assert_eq!(d.kind().element_name(), "append");
        assert_eq!(d.select().expression(), "/a");
        assert_eq!(d.content().len(), 1);
    }
}
