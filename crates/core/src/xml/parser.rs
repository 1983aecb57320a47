//! Well-formedness parser for [`XmlDocument`]
//!
//! Accepts XML 1.0 documents: an optional declaration, comments, processing
//! instructions, a skipped DOCTYPE, exactly one document element, CDATA
//! sections, the predefined entities and character references. Line endings
//! are normalized to `\n` before parsing.

use super::{
    is_name_char, is_name_start_char, NodeData, NodeId, NodeKind, XmlDocument, XmlError,
    MAX_NESTING_DEPTH,
};
use std::borrow::Cow;

impl XmlDocument {
    /// Parse a complete XML document
    pub fn parse(input: &str) -> Result<XmlDocument, XmlError> {
        let normalized = normalize_line_endings(input);
        Parser::new(&normalized).parse_document()
    }
}

fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains('\r') {
        Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    doc: XmlDocument,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let pos = if input.starts_with('\u{feff}') { 3 } else { 0 };
        Parser {
            input,
            pos,
            doc: XmlDocument::new(),
        }
    }

    fn parse_document(mut self) -> Result<XmlDocument, XmlError> {
        self.parse_misc(true)?;
        if self.at_end() {
            return Err(self.syntax("document has no document element"));
        }
        if !self.starts_with("<") {
            return Err(self.syntax("text is not allowed before the document element"));
        }
        let root = self.doc.root();
        self.parse_element(root, 1)?;
        self.parse_misc(false)?;
        if !self.at_end() {
            return Err(self.syntax("content is not allowed after the document element"));
        }
        Ok(self.doc)
    }

    /// Comments, processing instructions and whitespace outside the document element
    ///
    /// In the prolog an XML declaration may appear at the current offset and a
    /// DOCTYPE may follow it; after the document element neither is allowed.
    fn parse_misc(&mut self, in_prolog: bool) -> Result<(), XmlError> {
        let root = self.doc.root();
        let declaration_at = if in_prolog { Some(self.pos) } else { None };
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                let at = self.pos;
                let (target, data) = self.parse_pi()?;
                if target.eq_ignore_ascii_case("xml") {
                    if declaration_at != Some(at) {
                        return Err(XmlError::Syntax {
                            position: at,
                            reason: "XML declaration is only allowed at the start".to_string(),
                        });
                    }
                } else {
                    self.attach(root, NodeKind::ProcessingInstruction { target, data });
                }
            } else if self.starts_with("<!--") {
                let text = self.parse_comment()?;
                self.attach(root, NodeKind::Comment(text));
            } else if self.starts_with("<!DOCTYPE") {
                if !in_prolog {
                    return Err(self.syntax("DOCTYPE is only allowed in the prolog"));
                }
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_element(&mut self, parent: NodeId, depth: usize) -> Result<(), XmlError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.syntax("element nesting is too deep"));
        }
        self.expect("<")?;
        let name = self.parse_name()?;
        let element = self.attach(parent, NodeKind::Element { name: name.clone() });

        loop {
            let had_whitespace = self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(());
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            if self.at_end() {
                return Err(XmlError::UnexpectedEof);
            }
            if !had_whitespace {
                return Err(self.syntax("expected whitespace before attribute"));
            }
            let attr_pos = self.pos;
            let attr_name = self.parse_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.parse_attribute_value()?;
            if self.doc.attribute(element, &attr_name).is_some() {
                return Err(XmlError::DuplicateAttribute {
                    name: attr_name,
                    position: attr_pos,
                });
            }
            let attr = self.doc.push(NodeKind::Attribute {
                name: attr_name,
                value,
            });
            self.doc.nodes[attr.index()].parent = Some(element);
            self.doc.nodes[element.index()].attributes.push(attr);
        }

        loop {
            if self.at_end() {
                return Err(XmlError::UnexpectedEof);
            }
            if self.starts_with("</") {
                let end_pos = self.pos;
                self.pos += 2;
                let end_name = self.parse_name()?;
                self.skip_whitespace();
                self.expect(">")?;
                if end_name != name {
                    return Err(XmlError::MismatchedTag {
                        position: end_pos,
                        expected: name,
                        found: end_name,
                    });
                }
                return Ok(());
            } else if self.starts_with("<!--") {
                let text = self.parse_comment()?;
                self.attach(element, NodeKind::Comment(text));
            } else if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let end = self.find("]]>")?;
                let text = self.input[self.pos..end].to_string();
                self.pos = end + 3;
                self.append_text(element, text);
            } else if self.starts_with("<?") {
                let at = self.pos;
                let (target, data) = self.parse_pi()?;
                if target.eq_ignore_ascii_case("xml") {
                    return Err(XmlError::Syntax {
                        position: at,
                        reason: "XML declaration is only allowed at the start".to_string(),
                    });
                }
                self.attach(element, NodeKind::ProcessingInstruction { target, data });
            } else if self.starts_with("<") {
                self.parse_element(element, depth + 1)?;
            } else {
                let start = self.pos;
                let end = self.input[start..]
                    .find('<')
                    .map(|i| start + i)
                    .unwrap_or(self.input.len());
                let text = decode_entities(&self.input[start..end], start)?;
                self.pos = end;
                self.append_text(element, text);
            }
        }
    }

    fn parse_attribute_value(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            Some(_) => return Err(self.syntax("attribute value must be quoted")),
            None => return Err(XmlError::UnexpectedEof),
        };
        self.pos += 1;
        let start = self.pos;
        let end = self.input[start..]
            .find(quote)
            .map(|i| start + i)
            .ok_or(XmlError::UnexpectedEof)?;
        let raw = &self.input[start..end];
        if let Some(i) = raw.find('<') {
            return Err(XmlError::Syntax {
                position: start + i,
                reason: "'<' is not allowed in attribute values".to_string(),
            });
        }
        let normalized = raw.replace(['\t', '\n'], " ");
        let value = decode_entities(&normalized, start)?;
        self.pos = end + 1;
        Ok(value)
    }

    fn parse_comment(&mut self) -> Result<String, XmlError> {
        self.pos += "<!--".len();
        let end = self.find("-->")?;
        let text = self.input[self.pos..end].to_string();
        self.pos = end + 3;
        Ok(text)
    }

    fn parse_pi(&mut self) -> Result<(String, String), XmlError> {
        self.pos += 2;
        let target = self.parse_name()?;
        self.skip_whitespace();
        let end = self.find("?>")?;
        let data = self.input[self.pos..end].trim_end().to_string();
        self.pos = end + 2;
        Ok((target, data))
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for (offset, c) in self.input[self.pos..].char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '[') => depth += 1,
                (None, ']') => depth = depth.saturating_sub(1),
                (None, '>') if depth == 0 => {
                    self.pos += offset + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(XmlError::UnexpectedEof)
    }

    fn parse_name(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        let mut chars = self.input[start..].char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            Some(_) => return Err(self.syntax("expected a name")),
            None => return Err(XmlError::UnexpectedEof),
        }
        let end = chars
            .find(|&(_, c)| !is_name_char(c))
            .map(|(i, _)| start + i)
            .unwrap_or(self.input.len());
        self.pos = end;
        Ok(self.input[start..end].to_string())
    }

    fn attach(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.doc.push(kind);
        self.doc.nodes[id.index()].parent = Some(parent);
        self.doc.nodes[parent.index()].children.push(id);
        id
    }

    /// Append text, merging with a preceding text node (CDATA next to character data)
    fn append_text(&mut self, parent: NodeId, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.doc.nodes[parent.index()].children.last() {
            if let NodeData {
                kind: NodeKind::Text(existing),
                ..
            } = &mut self.doc.nodes[last.index()]
            {
                existing.push_str(&text);
                return;
            }
        }
        self.attach(parent, NodeKind::Text(text));
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start_matches([' ', '\t', '\n', '\r']);
        self.pos += rest.len() - trimmed.len();
        self.pos > start
    }

    fn find(&self, needle: &str) -> Result<usize, XmlError> {
        self.input[self.pos..]
            .find(needle)
            .map(|i| self.pos + i)
            .ok_or(XmlError::UnexpectedEof)
    }

    fn expect(&mut self, token: &str) -> Result<(), XmlError> {
        if self.starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else if self.at_end() {
            Err(XmlError::UnexpectedEof)
        } else {
            Err(self.syntax(&format!("expected '{}'", token)))
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn starts_with(&self, token: &str) -> bool {
        self.input[self.pos..].starts_with(token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn syntax(&self, reason: &str) -> XmlError {
        XmlError::Syntax {
            position: self.pos,
            reason: reason.to_string(),
        }
    }
}

/// Resolve predefined entities and character references
fn decode_entities(raw: &str, base: usize) -> Result<String, XmlError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut offset = base;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after.find(';').ok_or_else(|| XmlError::Syntax {
            position: offset + amp,
            reason: "unterminated entity reference".to_string(),
        })?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_reference(entity).ok_or_else(|| XmlError::Syntax {
                position: offset + amp,
                reason: format!("unknown entity '&{};'", entity),
            })?,
        };
        out.push(decoded);
        let consumed = amp + 1 + semi + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_char_reference(entity: &str) -> Option<char> {
    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code).filter(|&c| c != '\0')
}
