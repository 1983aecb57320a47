//! Selector language for XUpdate `select` attributes
//!
//! A small location-path subset:
//!
//! ```text
//! path       := '/' | ('/' | '//')? step (('/' | '//') step)*
//! step       := '.' | '..' | '@' nametest | nametest | kindtest, predicate*
//! nametest   := '*' | QName
//! kindtest   := 'text()' | 'node()' | 'comment()'
//! predicate  := '[' ( integer | 'last()' | '@' name ('=' literal)?
//!                   | name ('=' literal)? | '.' '=' literal ) ']'
//! ```
//!
//! Relative paths are evaluated from the document node, so `a/b` and `/a/b`
//! select the same nodes. Unprefixed name tests match on local name; prefixed
//! tests match the qualified name exactly. Results come back in document
//! order without duplicates.

use docbase_core::xml::{is_valid_name, split_qname};
use docbase_core::{Error, NodeId, NodeKind, Result, XmlDocument};
use std::fmt;
use std::str::FromStr;

/// A parsed `select` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    expression: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Attribute,
    SelfNode,
    Parent,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Wildcard,
    Text,
    Comment,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    AttributeEquals(String, String),
    HasChild(String),
    ChildEquals(String, String),
    ValueEquals(String),
}

impl Selector {
    /// Parse an expression; syntax errors are `Validation` failures
    pub fn parse(expression: &str) -> Result<Self> {
        let steps = SelectorParser::new(expression).parse_path().map_err(|reason| {
            Error::validation(format!("invalid select expression '{}': {}", expression, reason))
        })?;
        Ok(Selector {
            expression: expression.to_string(),
            steps,
        })
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Nodes of `doc` selected by this expression, in document order
    pub fn select(&self, doc: &XmlDocument) -> Vec<NodeId> {
        let rank = document_rank(doc);
        let mut context = vec![doc.root()];
        for step in &self.steps {
            let mut next = Vec::new();
            for &node in &context {
                let mut candidates: Vec<NodeId> = step
                    .axis
                    .nodes(doc, node)
                    .into_iter()
                    .filter(|&n| step.test.matches(doc, n, step.axis))
                    .collect();
                for predicate in &step.predicates {
                    let len = candidates.len();
                    candidates = candidates
                        .into_iter()
                        .enumerate()
                        .filter(|&(i, n)| predicate.matches(doc, n, i + 1, len))
                        .map(|(_, n)| n)
                        .collect();
                }
                next.extend(candidates);
            }
            next.sort_by_key(|n| rank.get(n.index()).copied().unwrap_or(usize::MAX));
            next.dedup();
            context = next;
        }
        context
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn document_rank(doc: &XmlDocument) -> Vec<usize> {
    let order = doc.document_order();
    let len = order.iter().map(|id| id.index() + 1).max().unwrap_or(0);
    let mut rank = vec![usize::MAX; len];
    for (position, id) in order.iter().enumerate() {
        rank[id.index()] = position;
    }
    rank
}

fn is_namespace_declaration(doc: &XmlDocument, attr: NodeId) -> bool {
    doc.name(attr)
        .map(|n| n == "xmlns" || n.starts_with("xmlns:"))
        .unwrap_or(false)
}

fn name_matches(doc: &XmlDocument, node: NodeId, test: &str) -> bool {
    let Some(name) = doc.name(node) else {
        return false;
    };
    if test.contains(':') {
        name == test
    } else {
        split_qname(name).1 == test
    }
}

impl Axis {
    fn nodes(self, doc: &XmlDocument, node: NodeId) -> Vec<NodeId> {
        match self {
            Axis::Child => doc.children(node).to_vec(),
            Axis::Attribute => doc
                .attributes(node)
                .iter()
                .copied()
                .filter(|&a| !is_namespace_declaration(doc, a))
                .collect(),
            Axis::SelfNode => vec![node],
            Axis::Parent => doc.parent(node).into_iter().collect(),
            Axis::DescendantOrSelf => {
                let mut out = vec![node];
                out.extend(doc.descendants(node));
                out
            }
        }
    }
}

impl NodeTest {
    fn matches(&self, doc: &XmlDocument, node: NodeId, axis: Axis) -> bool {
        let principal = if axis == Axis::Attribute {
            doc.is_attribute(node)
        } else {
            doc.is_element(node)
        };
        match self {
            NodeTest::Name(name) => principal && name_matches(doc, node, name),
            NodeTest::Wildcard => principal,
            NodeTest::Text => doc.is_text(node),
            NodeTest::Comment => matches!(doc.kind(node), NodeKind::Comment(_)),
            NodeTest::AnyNode => true,
        }
    }
}

impl Predicate {
    fn matches(&self, doc: &XmlDocument, node: NodeId, position: usize, len: usize) -> bool {
        match self {
            Predicate::Position(n) => position == *n,
            Predicate::Last => position == len,
            Predicate::HasAttribute(name) => doc
                .attributes(node)
                .iter()
                .any(|&a| !is_namespace_declaration(doc, a) && name_matches(doc, a, name)),
            Predicate::AttributeEquals(name, value) => doc.attributes(node).iter().any(|&a| {
                !is_namespace_declaration(doc, a)
                    && name_matches(doc, a, name)
                    && doc.string_value(a) == *value
            }),
            Predicate::HasChild(name) => doc
                .children(node)
                .iter()
                .any(|&c| doc.is_element(c) && name_matches(doc, c, name)),
            Predicate::ChildEquals(name, value) => doc.children(node).iter().any(|&c| {
                doc.is_element(c) && name_matches(doc, c, name) && doc.string_value(c) == *value
            }),
            Predicate::ValueEquals(value) => doc.string_value(node) == *value,
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl<'a> SelectorParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> ParseResult<()> {
        self.skip_ws();
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {}", token, self.pos))
        }
    }

    fn parse_path(&mut self) -> ParseResult<Vec<Step>> {
        let mut steps = Vec::new();
        self.skip_ws();
        if self.at_end() {
            return Err("empty expression".to_string());
        }

        if self.eat("//") {
            steps.push(Step::descendant_or_self());
        } else if self.eat("/") {
            self.skip_ws();
            if self.at_end() {
                return Ok(steps);
            }
        }
        steps.push(self.parse_step()?);

        loop {
            self.skip_ws();
            if self.at_end() {
                return Ok(steps);
            }
            if self.eat("//") {
                steps.push(Step::descendant_or_self());
            } else if !self.eat("/") {
                return Err(format!("unexpected '{}' at offset {}", self.rest(), self.pos));
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> ParseResult<Step> {
        self.skip_ws();
        let (axis, test) = if self.eat("..") {
            (Axis::Parent, NodeTest::AnyNode)
        } else if self.eat(".") {
            (Axis::SelfNode, NodeTest::AnyNode)
        } else if self.eat("@") {
            (Axis::Attribute, self.parse_name_test()?)
        } else if self.eat("*") {
            (Axis::Child, NodeTest::Wildcard)
        } else {
            let name = self.parse_name()?;
            self.skip_ws();
            if self.eat("(") {
                self.expect(")")?;
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::AnyNode,
                    "comment" => NodeTest::Comment,
                    other => return Err(format!("unsupported node test '{}()'", other)),
                };
                (Axis::Child, test)
            } else {
                (Axis::Child, NodeTest::Name(name))
            }
        };

        let mut predicates = Vec::new();
        loop {
            self.skip_ws();
            if !self.eat("[") {
                break;
            }
            predicates.push(self.parse_predicate()?);
            self.expect("]")?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_name_test(&mut self) -> ParseResult<NodeTest> {
        if self.eat("*") {
            Ok(NodeTest::Wildcard)
        } else {
            Ok(NodeTest::Name(self.parse_name()?))
        }
    }

    fn parse_name(&mut self) -> ParseResult<String> {
        let start = self.pos;
        let len: usize = self
            .rest()
            .chars()
            .take_while(|&c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') || !c.is_ascii())
            .map(char::len_utf8)
            .sum();
        let name = &self.input[start..start + len];
        if !is_valid_name(name) || name.starts_with(':') || name.ends_with(':') {
            return Err(format!("expected a name at offset {}", start));
        }
        self.pos += len;
        Ok(name.to_string())
    }

    fn parse_predicate(&mut self) -> ParseResult<Predicate> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                let len = self.rest().chars().take_while(char::is_ascii_digit).count();
                self.pos += len;
                let n: usize = self.input[start..self.pos]
                    .parse()
                    .map_err(|_| format!("position out of range at offset {}", start))?;
                if n == 0 {
                    return Err("positions start at 1".to_string());
                }
                Ok(Predicate::Position(n))
            }
            Some('@') => {
                self.pos += 1;
                let name = self.parse_name()?;
                match self.parse_comparison()? {
                    Some(value) => Ok(Predicate::AttributeEquals(name, value)),
                    None => Ok(Predicate::HasAttribute(name)),
                }
            }
            Some('.') => {
                self.pos += 1;
                self.parse_comparison()?
                    .map(Predicate::ValueEquals)
                    .ok_or_else(|| format!("expected '=' at offset {}", self.pos))
            }
            _ => {
                let name = self.parse_name()?;
                self.skip_ws();
                if name == "last" && self.eat("(") {
                    self.expect(")")?;
                    return Ok(Predicate::Last);
                }
                match self.parse_comparison()? {
                    Some(value) => Ok(Predicate::ChildEquals(name, value)),
                    None => Ok(Predicate::HasChild(name)),
                }
            }
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<Option<String>> {
        self.skip_ws();
        if !self.eat("=") {
            return Ok(None);
        }
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(format!("expected a quoted literal at offset {}", self.pos)),
        };
        self.pos += 1;
        let end = self
            .rest()
            .find(quote)
            .ok_or_else(|| "unterminated literal".to_string())?;
        let value = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(Some(value))
    }
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}
