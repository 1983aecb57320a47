//! XML tree model for structured document content
//!
//! Documents are held as an arena of nodes addressed by [`NodeId`]. Node 0 is
//! always the document node. Attributes are nodes too, owned by their element
//! through a separate list so that selectors can address them uniformly.
//!
//! Detached nodes stay in the arena until the document is dropped; everything
//! reachable from the document node is the document's content.
//!
//! ## Limits
//!
//! - Element nesting is limited to [`MAX_NESTING_DEPTH`]

mod json;
mod parser;
mod writer;

pub use json::TEXT_KEY;
pub use writer::{escape_attribute, escape_text};

use thiserror::Error;

/// Maximum element nesting depth accepted by the parser
pub const MAX_NESTING_DEPTH: usize = 512;

/// Namespace bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Errors raised while parsing or manipulating XML
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    /// Input ended inside a construct
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input is not well-formed
    #[error("syntax error at byte {position}: {reason}")]
    Syntax {
        /// Byte offset in the (line-ending normalized) input
        position: usize,
        /// What was wrong
        reason: String,
    },

    /// End tag does not match the open element
    #[error("mismatched end tag at byte {position}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        /// Byte offset of the end tag
        position: usize,
        /// Name of the open element
        expected: String,
        /// Name found in the end tag
        found: String,
    },

    /// Same attribute given twice on one element
    #[error("duplicate attribute '{name}' at byte {position}")]
    DuplicateAttribute {
        /// Attribute name
        name: String,
        /// Byte offset of the second occurrence
        position: usize,
    },

    /// A tree operation that would produce an invalid document
    #[error("{0}")]
    Structure(String),
}

/// Index of a node inside an [`XmlDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    pub fn index(&self) -> usize {
        self.0
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; root of every tree
    Document,
    /// An element with its qualified name
    Element {
        /// Qualified name (`prefix:local` or `local`)
        name: String,
    },
    /// An attribute
    Attribute {
        /// Qualified name
        name: String,
        /// Attribute value (entity-decoded)
        value: String,
    },
    /// Character data (CDATA sections included)
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

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// An XML document tree
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Create an empty document (a document node without children)
    pub fn new() -> Self {
        XmlDocument {
            nodes: vec![NodeData::new(NodeKind::Document)],
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single element child of the document node
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.is_element(id))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Kind of a node
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Parent of a node (the owner element for attributes)
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Child nodes in document order (attributes excluded)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Attribute nodes of an element
    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].attributes
    }

    /// True if the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    /// True if the node is an attribute
    pub fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Attribute { .. })
    }

    /// True if the node is a text node
    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    /// Qualified name of an element or attribute, target of a PI
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { name } | NodeKind::Attribute { name, .. } => Some(name),
            NodeKind::ProcessingInstruction { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Local part of the node's name
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(|n| split_qname(n).1)
    }

    /// Prefix of the node's name, if it has one
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        self.name(id).and_then(|n| split_qname(n).0)
    }

    /// Value of the named attribute of an element
    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        self.find_attribute(element, name)
            .and_then(|attr| match self.kind(attr) {
                NodeKind::Attribute { value, .. } => Some(value.as_str()),
                _ => None,
            })
    }

    fn find_attribute(&self, element: NodeId, name: &str) -> Option<NodeId> {
        self.attributes(element)
            .iter()
            .copied()
            .find(|&attr| self.name(attr) == Some(name))
    }

    /// XPath string-value of a node
    ///
    /// Concatenated descendant text for documents and elements, the value
    /// itself for attributes, text, comments and processing instructions.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Document | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(text) | NodeKind::Comment(text) => text.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { .. } => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Namespace URI of an element or attribute
    ///
    /// Unprefixed elements take the in-scope default namespace; unprefixed
    /// attributes are in no namespace.
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { name } => self.lookup_namespace(id, split_qname(name).0),
            NodeKind::Attribute { name, .. } => {
                let prefix = split_qname(name).0?;
                let owner = self.parent(id)?;
                self.lookup_namespace(owner, Some(prefix))
            }
            _ => None,
        }
    }

    /// Resolve a namespace prefix (or the default namespace) in scope at `element`
    pub fn lookup_namespace(&self, element: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        let declaration = match prefix {
            Some(p) => format!("xmlns:{}", p),
            None => "xmlns".to_string(),
        };
        let mut current = Some(element);
        while let Some(id) = current {
            if self.is_element(id) {
                if let Some(uri) = self.attribute(id, &declaration) {
                    return if uri.is_empty() { None } else { Some(uri) };
                }
            }
            current = self.parent(id);
        }
        None
    }

    /// True if the node is reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// All attached nodes in document order, attributes right after their element
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(self.root(), &mut out);
        out
    }

    fn walk(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        out.extend_from_slice(self.attributes(id));
        for &child in self.children(id) {
            self.walk(child, out);
        }
    }

    /// Descendants of a node in document order (attributes excluded)
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &child in self.children(id) {
            out.push(child);
            out.extend(self.descendants(child));
        }
        out
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    /// Create a detached element
    pub fn create_element(&mut self, name: &str) -> Result<NodeId, XmlError> {
        check_name(name)?;
        Ok(self.push(NodeKind::Element {
            name: name.to_string(),
        }))
    }

    /// Create a detached attribute
    pub fn create_attribute(&mut self, name: &str, value: &str) -> Result<NodeId, XmlError> {
        check_name(name)?;
        Ok(self.push(NodeKind::Attribute {
            name: name.to_string(),
            value: value.to_string(),
        }))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// Create a detached comment
    pub fn create_comment(&mut self, text: &str) -> Result<NodeId, XmlError> {
        if text.contains("--") {
            return Err(XmlError::Structure(
                "comment must not contain '--'".to_string(),
            ));
        }
        Ok(self.push(NodeKind::Comment(text.to_string())))
    }

    /// Create a detached processing instruction
    pub fn create_processing_instruction(
        &mut self,
        target: &str,
        data: &str,
    ) -> Result<NodeId, XmlError> {
        check_name(target)?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(XmlError::Structure(
                "processing instruction target 'xml' is reserved".to_string(),
            ));
        }
        Ok(self.push(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        }))
    }

    /// Deep-copy a node of another document into this one, detached
    ///
    /// Importing a document node imports its document element.
    pub fn import_node(&mut self, source: &XmlDocument, node: NodeId) -> Result<NodeId, XmlError> {
        let node = match source.kind(node) {
            NodeKind::Document => source.document_element().ok_or_else(|| {
                XmlError::Structure("cannot import an empty document".to_string())
            })?,
            _ => node,
        };
        let copy = self.push(source.kind(node).clone());
        for &attr in source.attributes(node) {
            let attr_copy = self.push(source.kind(attr).clone());
            self.nodes[attr_copy.0].parent = Some(copy);
            self.nodes[copy.0].attributes.push(attr_copy);
        }
        for &child in source.children(node) {
            let child_copy = self.import_node(source, child)?;
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        Ok(copy)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child)
    }

    /// Insert a detached node at `index` among the children of `parent`
    ///
    /// Indexes past the end append.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), XmlError> {
        self.check_insertable(parent, child)?;
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Insert a detached node immediately before `reference`
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) -> Result<(), XmlError> {
        let (parent, index) = self.sibling_position(reference)?;
        self.insert_child(parent, index, child)
    }

    /// Insert a detached node immediately after `reference`
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> Result<(), XmlError> {
        let (parent, index) = self.sibling_position(reference)?;
        self.insert_child(parent, index + 1, child)
    }

    fn sibling_position(&self, reference: NodeId) -> Result<(NodeId, usize), XmlError> {
        if self.is_attribute(reference) {
            return Err(XmlError::Structure(
                "attributes have no siblings".to_string(),
            ));
        }
        let parent = self.parent(reference).ok_or_else(|| {
            XmlError::Structure("node has no parent".to_string())
        })?;
        if parent == self.root() {
            return Err(XmlError::Structure(
                "cannot insert siblings of the document element".to_string(),
            ));
        }
        let index = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .ok_or_else(|| XmlError::Structure("node is not a child of its parent".to_string()))?;
        Ok((parent, index))
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        if self.parent(child).is_some() {
            return Err(XmlError::Structure("node is already attached".to_string()));
        }
        match self.kind(child) {
            NodeKind::Document => {
                return Err(XmlError::Structure(
                    "a document node cannot be a child".to_string(),
                ))
            }
            NodeKind::Attribute { .. } => {
                return Err(XmlError::Structure(
                    "attributes must be set on an element, not inserted as children".to_string(),
                ))
            }
            _ => {}
        }
        match self.kind(parent) {
            NodeKind::Element { .. } => Ok(()),
            NodeKind::Document => match self.kind(child) {
                NodeKind::Element { .. } if self.document_element().is_some() => Err(
                    XmlError::Structure("document already has a document element".to_string()),
                ),
                NodeKind::Text(_) => Err(XmlError::Structure(
                    "text is not allowed outside the document element".to_string(),
                )),
                _ => Ok(()),
            },
            _ => Err(XmlError::Structure(
                "only elements and documents can have children".to_string(),
            )),
        }
    }

    /// Attach a detached attribute to an element, replacing one of the same name
    pub fn set_attribute_node(&mut self, element: NodeId, attr: NodeId) -> Result<(), XmlError> {
        if !self.is_element(element) {
            return Err(XmlError::Structure(
                "attributes can only be set on elements".to_string(),
            ));
        }
        if !self.is_attribute(attr) || self.parent(attr).is_some() {
            return Err(XmlError::Structure(
                "expected a detached attribute".to_string(),
            ));
        }
        let name = self.name(attr).unwrap_or_default().to_string();
        if let Some(existing) = self.find_attribute(element, &name) {
            self.detach(existing)?;
        }
        self.nodes[element.0].attributes.push(attr);
        self.nodes[attr.0].parent = Some(element);
        Ok(())
    }

    /// Set (or replace) an attribute value on an element
    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), XmlError> {
        let attr = self.create_attribute(name, value)?;
        self.set_attribute_node(element, attr)
    }

    /// Detach a node from its parent (or owner element)
    pub fn detach(&mut self, id: NodeId) -> Result<(), XmlError> {
        if id == self.root() {
            return Err(XmlError::Structure(
                "the document node cannot be removed".to_string(),
            ));
        }
        let Some(parent) = self.parent(id) else {
            return Ok(());
        };
        let parent_data = &mut self.nodes[parent.0];
        parent_data.children.retain(|&c| c != id);
        parent_data.attributes.retain(|&a| a != id);
        self.nodes[id.0].parent = None;
        Ok(())
    }

    /// Remove every child of an element
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Rename an element, attribute or processing instruction
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<(), XmlError> {
        check_name(new_name)?;
        if self.is_attribute(id) {
            if let Some(owner) = self.parent(id) {
                if let Some(existing) = self.find_attribute(owner, new_name) {
                    if existing != id {
                        return Err(XmlError::Structure(format!(
                            "attribute '{}' already exists",
                            new_name
                        )));
                    }
                }
            }
        }
        match &mut self.nodes[id.0].kind {
            NodeKind::Element { name } | NodeKind::Attribute { name, .. } => {
                *name = new_name.to_string();
                Ok(())
            }
            NodeKind::ProcessingInstruction { target, .. } => {
                *target = new_name.to_string();
                Ok(())
            }
            _ => Err(XmlError::Structure("node cannot be renamed".to_string())),
        }
    }

    /// Replace the value of an attribute, text, comment or processing instruction
    pub fn set_value(&mut self, id: NodeId, new_value: &str) -> Result<(), XmlError> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Attribute { value, .. } => *value = new_value.to_string(),
            NodeKind::Text(text) => *text = new_value.to_string(),
            NodeKind::Comment(text) => {
                if new_value.contains("--") {
                    return Err(XmlError::Structure(
                        "comment must not contain '--'".to_string(),
                    ));
                }
                *text = new_value.to_string();
            }
            NodeKind::ProcessingInstruction { data, .. } => *data = new_value.to_string(),
            _ => {
                return Err(XmlError::Structure(
                    "node has no value of its own".to_string(),
                ))
            }
        }
        Ok(())
    }
}

/// Split a qualified name into prefix and local part
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// True if `name` is an acceptable XML name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':' || (!c.is_ascii() && !c.is_whitespace())
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_ascii_digit() || c == '-' || c == '.'
}

fn check_name(name: &str) -> Result<(), XmlError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(XmlError::Structure(format!("'{}' is not a valid XML name", name)))
    }
}
