//! Virtual Node
//!
//! Lightweight description of one element or text unit. A `VNode` is
//! built fresh for every render; the patcher fills in the live DOM node
//! and the delegating listener slot.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use kiln_dom::{DomEvent, ListenerId, NodeId};
use serde_json::Value;

/// Event handler attached through node data
pub type Handler = Rc<dyn Fn(&mut DomEvent)>;

/// Node tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Tagless node; only valid as the render root (the host itself)
    Fragment,
    /// Text node
    Text,
    /// Regular element
    Element(String),
    /// Slot sentinel: relocates captured host content, never materialized
    Slot,
}

impl Tag {
    pub fn element(name: &str) -> Self {
        Tag::Element(name.to_string())
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Tag::Element(_))
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::Element(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::Element(name)
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    /// `true` renders an empty attribute, `false` removes it
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Str(n.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Str(n.to_string())
    }
}

pub type AttrMap = BTreeMap<String, AttrValue>;
pub type ClassMap = BTreeMap<String, bool>;
pub type StyleMap = BTreeMap<String, String>;
pub type PropMap = BTreeMap<String, Value>;
pub type ListenerMap = BTreeMap<String, Handler>;

/// One DOM listener per event name, delegating to whatever handler the
/// latest render attached. Survives updates as long as the element does.
#[derive(Default)]
pub struct ListenerSlot {
    pub(crate) handlers: RefCell<ListenerMap>,
    pub(crate) registered: RefCell<BTreeMap<String, ListenerId>>,
}

impl ListenerSlot {
    /// Listener ids currently registered on the DOM node
    pub fn registered(&self) -> Vec<ListenerId> {
        self.registered.borrow().values().copied().collect()
    }
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("events", &self.registered.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Virtual node
#[derive(Clone)]
pub struct VNode {
    pub tag: Tag,
    pub text: Option<String>,
    /// `None` = no children at all, `Some(vec![])` = explicitly empty
    pub children: Option<Vec<VNode>>,
    pub attrs: Option<AttrMap>,
    pub classes: Option<ClassMap>,
    pub style: Option<StyleMap>,
    pub props: Option<PropMap>,
    pub listeners: Option<ListenerMap>,
    pub key: Option<String>,
    pub namespace: Option<String>,
    /// Data maps are not diffed on update
    pub skip_data: bool,
    /// Children are not diffed on update
    pub skip_children: bool,
    pub(crate) elm: Option<NodeId>,
    pub(crate) listener_slot: Option<Rc<ListenerSlot>>,
    pub(crate) relocated: Vec<NodeId>,
}

impl VNode {
    pub(crate) fn bare(tag: Tag) -> Self {
        Self {
            tag,
            text: None,
            children: None,
            attrs: None,
            classes: None,
            style: None,
            props: None,
            listeners: None,
            key: None,
            namespace: None,
            skip_data: true,
            skip_children: true,
            elm: None,
            listener_slot: None,
            relocated: Vec::new(),
        }
    }

    /// Text node
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            ..Self::bare(Tag::Text)
        }
    }

    /// Synthetic node standing for an existing live element, used as the
    /// "old" side of a host's first patch
    pub fn from_element(elm: NodeId) -> Self {
        Self {
            elm: Some(elm),
            ..Self::bare(Tag::Fragment)
        }
    }

    /// Live DOM node, once patched
    pub fn elm(&self) -> Option<NodeId> {
        self.elm
    }

    /// Content nodes this slot sentinel relocated, once patched
    pub fn relocated(&self) -> &[NodeId] {
        &self.relocated
    }

    /// Delegating listener slot, once patched with listeners
    pub fn listener_slot(&self) -> Option<&Rc<ListenerSlot>> {
        self.listener_slot.as_ref()
    }

    /// The `name` attribute of a slot sentinel
    pub fn slot_name(&self) -> Option<&str> {
        match self.attrs.as_ref()?.get("name")? {
            AttrValue::Str(name) => Some(name.as_str()),
            AttrValue::Bool(_) => None,
        }
    }

    pub fn children(&self) -> &[VNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Identity test used by the keyed diff
    pub fn is_same(&self, other: &VNode) -> bool {
        self.tag == other.tag
            && self.key == other.key
            && self.namespace == other.namespace
            && (self.tag != Tag::Slot || self.slot_name() == other.slot_name())
    }

    /// Live DOM nodes this vnode stands for, in order
    pub(crate) fn dom_nodes(&self) -> Vec<NodeId> {
        match self.elm {
            Some(elm) => vec![elm],
            None => self.relocated.clone(),
        }
    }

    pub(crate) fn first_dom_node(&self) -> Option<NodeId> {
        self.elm.or_else(|| self.relocated.first().copied())
    }

    pub(crate) fn last_dom_node(&self) -> Option<NodeId> {
        self.elm.or_else(|| self.relocated.last().copied())
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("tag", &self.tag);
        if let Some(text) = &self.text {
            s.field("text", text);
        }
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if let Some(attrs) = &self.attrs {
            s.field("attrs", attrs);
        }
        if let Some(listeners) = &self.listeners {
            s.field("listeners", &listeners.keys().collect::<Vec<_>>());
        }
        if let Some(children) = &self.children {
            s.field("children", children);
        }
        s.field("elm", &self.elm).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_node_requires_tag_and_key() {
        let mut a = VNode::bare(Tag::element("li"));
        let mut b = VNode::bare(Tag::element("li"));
        assert!(a.is_same(&b));

        a.key = Some("1".into());
        assert!(!a.is_same(&b));
        b.key = Some("1".into());
        assert!(a.is_same(&b));

        let mut c = VNode::bare(Tag::element("div"));
        c.key = Some("1".into());
        assert!(!a.is_same(&c));
    }

    #[test]
    fn test_namespace_is_part_of_identity() {
        let a = VNode::bare(Tag::element("a"));
        let mut b = VNode::bare(Tag::element("a"));
        b.namespace = Some(kiln_dom::SVG_NS.to_string());
        assert!(!a.is_same(&b));
    }

    #[test]
    fn test_slot_identity_uses_name() {
        let mut a = VNode::bare(Tag::Slot);
        let b = VNode::bare(Tag::Slot);
        assert!(a.is_same(&b));
        a.attrs = Some([("name".to_string(), AttrValue::from("header"))].into_iter().collect());
        assert!(!a.is_same(&b));
    }
}
