//! DOM Node - Compact representation
//!
//! Nodes link to each other through `NodeId` indices instead of pointers,
//! so the whole tree lives in one arena and nodes never own each other.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::NodeId;

/// DOM Node - Core structure
#[derive(Debug)]
pub struct Node {
    /// Parent node (NONE if detached or root)
    pub parent: NodeId,
    /// First child
    pub first_child: NodeId,
    /// Last child (for O(1) append)
    pub last_child: NodeId,
    /// Previous sibling
    pub prev_sibling: NodeId,
    /// Next sibling
    pub next_sibling: NodeId,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    fn with_data(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            data,
        }
    }

    /// Create a new element node
    pub fn element(tag: &str, namespace: Option<&str>) -> Self {
        Self::with_data(NodeData::Element(ElementData::new(tag, namespace)))
    }

    /// Create a new text node
    pub fn text(content: &str) -> Self {
        Self::with_data(NodeData::Text(content.to_string()))
    }

    /// Create a new comment node
    pub fn comment(content: &str) -> Self {
        Self::with_data(NodeData::Comment(content.to_string()))
    }

    /// Create a document node
    pub fn document() -> Self {
        Self::with_data(NodeData::Document)
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Check if this is text
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Check if this is the document node
    #[inline]
    pub fn is_document(&self) -> bool {
        matches!(self.data, NodeData::Document)
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get mutable element data
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    /// Document root
    Document,
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
}

/// Element-specific data
#[derive(Debug)]
pub struct ElementData {
    /// Lowercased tag name
    pub tag: String,
    /// Namespace URI (None for HTML)
    pub namespace: Option<String>,
    /// Attributes in insertion order
    pub attrs: Vec<Attribute>,
    /// Class list in insertion order
    pub classes: Vec<String>,
    /// Inline style properties
    pub style: BTreeMap<String, String>,
    /// Element properties (non-attribute state such as `value`)
    pub properties: BTreeMap<String, Value>,
}

impl ElementData {
    pub fn new(tag: &str, namespace: Option<&str>) -> Self {
        // SVG and MathML tags are case sensitive
        let tag = if namespace.is_some() { tag.to_string() } else { tag.to_ascii_lowercase() };
        Self {
            tag,
            namespace: namespace.map(str::to_string),
            attrs: Vec::new(),
            classes: Vec::new(),
            style: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Get a namespaced attribute value
    pub fn get_attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, returning the previous value
    pub fn set_attr(&mut self, namespace: Option<&str>, name: &str, value: &str) -> Option<String> {
        for attr in self.attrs.iter_mut() {
            if attr.name == name && attr.namespace.as_deref() == namespace {
                return Some(std::mem::replace(&mut attr.value, value.to_string()));
            }
        }
        self.attrs.push(Attribute {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            value: value.to_string(),
        });
        None
    }

    /// Remove an attribute, returning its value
    pub fn remove_attr(&mut self, namespace: Option<&str>, name: &str) -> Option<String> {
        let idx = self.attrs.iter()
            .position(|a| a.name == name && a.namespace.as_deref() == namespace)?;
        Some(self.attrs.remove(idx).value)
    }

    /// Serialized `class` attribute value
    pub fn class_name(&self) -> String {
        self.classes.join(" ")
    }
}

/// Attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_set_replace_remove() {
        let mut elem = ElementData::new("DIV", None);
        assert_eq!(elem.tag, "div");

        assert_eq!(elem.set_attr(None, "id", "a"), None);
        assert_eq!(elem.set_attr(None, "id", "b"), Some("a".to_string()));
        assert_eq!(elem.get_attr("id"), Some("b"));
        assert_eq!(elem.remove_attr(None, "id"), Some("b".to_string()));
        assert!(elem.attrs.is_empty());
    }

    #[test]
    fn test_namespaced_attrs_are_distinct() {
        let mut elem = ElementData::new("use", Some("http://www.w3.org/2000/svg"));
        elem.set_attr(Some("http://www.w3.org/1999/xlink"), "href", "#a");
        elem.set_attr(None, "href", "#b");

        assert_eq!(elem.get_attr("href"), Some("#b"));
        assert_eq!(elem.get_attr_ns("http://www.w3.org/1999/xlink", "href"), Some("#a"));
    }
}
