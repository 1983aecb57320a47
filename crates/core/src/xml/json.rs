//! JSON rendering of XML trees
//!
//! - The document element becomes a single-key object
//! - Attributes become properties of their element's object
//! - Repeated child elements of one name become an array
//! - Elements holding only text become strings; empty elements become `null`
//! - Non-whitespace text mixed with child elements is collected under `#text`

use super::{NodeId, NodeKind, XmlDocument};
use serde_json::{Map, Value};

/// Property holding text mixed with child elements
pub const TEXT_KEY: &str = "#text";

impl XmlDocument {
    /// Render the document as a JSON value (`null` for an empty document)
    pub fn to_json_value(&self) -> Value {
        let Some(element) = self.document_element() else {
            return Value::Null;
        };
        let mut object = Map::new();
        object.insert(self.element_name(element), self.element_to_json(element));
        Value::Object(object)
    }

    fn element_name(&self, element: NodeId) -> String {
        self.name(element).unwrap_or_default().to_string()
    }

    fn element_to_json(&self, element: NodeId) -> Value {
        let has_child_elements = self.children(element).iter().any(|&c| self.is_element(c));
        if self.attributes(element).is_empty() && !has_child_elements {
            let text = self.direct_text(element);
            return if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            };
        }

        let mut object = Map::new();
        for &attr in self.attributes(element) {
            if let NodeKind::Attribute { name, value } = self.kind(attr) {
                object.insert(name.clone(), Value::String(value.clone()));
            }
        }
        for &child in self.children(element) {
            if self.is_element(child) {
                insert_or_push(&mut object, self.element_name(child), self.element_to_json(child));
            }
        }
        let text = self.direct_text(element);
        if !text.trim().is_empty() {
            let text = if has_child_elements {
                text.trim().to_string()
            } else {
                text
            };
            insert_or_push(&mut object, TEXT_KEY.to_string(), Value::String(text));
        }
        Value::Object(object)
    }

    fn direct_text(&self, element: NodeId) -> String {
        self.children(element)
            .iter()
            .filter_map(|&c| match self.kind(c) {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn insert_or_push(object: &mut Map<String, Value>, key: String, value: Value) {
    match object.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            object.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(xml: &str) -> Value {
        XmlDocument::parse(xml).unwrap().to_json_value()
    }

    #[test]
    fn test_empty_element_is_null() {
        assert_eq!(render("<a/>"), json!({ "a": null }));
    }

    #[test]
    fn test_text_only_element_is_string() {
        assert_eq!(render("<a>hello</a>"), json!({ "a": "hello" }));
    }

    #[test]
    fn test_attributes_become_properties() {
        assert_eq!(
            render(r#"<a id="1"><b>x</b></a>"#),
            json!({ "a": { "id": "1", "b": "x" } })
        );
    }

    #[test]
    fn test_attribute_with_text() {
        assert_eq!(
            render(r#"<a id="1">x</a>"#),
            json!({ "a": { "id": "1", "#text": "x" } })
        );
    }

    #[test]
    fn test_repeated_children_become_array() {
        assert_eq!(
            render("<list><item>1</item><item>2</item><item/></list>"),
            json!({ "list": { "item": ["1", "2", null] } })
        );
    }

    #[test]
    fn test_mixed_text_is_collected() {
        assert_eq!(
            render("<p> lead <b>bold</b> tail </p>"),
            json!({ "p": { "b": "bold", "#text": "lead  tail" } })
        );
    }

    #[test]
    fn test_whitespace_between_children_is_ignored() {
        assert_eq!(
            render("<a>\n  <b/>\n</a>"),
            json!({ "a": { "b": null } })
        );
    }

    #[test]
    fn test_empty_document_is_null() {
        assert_eq!(XmlDocument::new().to_json_value(), Value::Null);
    }
}
