//! Node Builder
//!
//! `h(tag, data, children)` builds a `VNode`. Children are flattened depth
//! first, booleans and `None` are dropped, and adjacent strings/numbers are
//! merged into a single text node.

use std::rc::Rc;

use kiln_dom::DomEvent;
use serde_json::Value;

use crate::vnode::{AttrMap, AttrValue, ClassMap, Handler, ListenerMap, PropMap, StyleMap, Tag, VNode};

/// Skip hint: diff data only
pub const SKIP_CHILDREN: u8 = 0;
/// Skip hint: diff children only
pub const SKIP_DATA: u8 = 1;
/// Skip hint: diff neither
pub const SKIP_ALL: u8 = 2;

/// Node data object
#[derive(Clone, Default)]
pub struct VData {
    attrs: Option<AttrMap>,
    classes: Option<ClassMap>,
    style: Option<StyleMap>,
    props: Option<PropMap>,
    listeners: Option<ListenerMap>,
    key: Option<String>,
    namespace: Option<String>,
    skip: Option<u8>,
}

impl VData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.get_or_insert_with(AttrMap::new).insert(name.to_string(), value.into());
        self
    }

    /// String form: split on whitespace, every token enabled
    pub fn class(mut self, classes: &str) -> Self {
        let map = self.classes.get_or_insert_with(ClassMap::new);
        for token in classes.split_whitespace() {
            map.insert(token.to_string(), true);
        }
        self
    }

    /// Object form: used as-is
    pub fn class_map<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let map = self.classes.get_or_insert_with(ClassMap::new);
        for (name, enabled) in classes {
            map.insert(name.into(), enabled);
        }
        self
    }

    pub fn style(mut self, name: &str, value: &str) -> Self {
        self.style.get_or_insert_with(StyleMap::new).insert(name.to_string(), value.to_string());
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props.get_or_insert_with(PropMap::new).insert(name.to_string(), value.into());
        self
    }

    pub fn on(mut self, event: &str, handler: impl Fn(&mut DomEvent) + 'static) -> Self {
        let handler: Handler = Rc::new(handler);
        self.listeners.get_or_insert_with(ListenerMap::new).insert(event.to_string(), handler);
        self
    }

    pub fn on_handler(mut self, event: &str, handler: Handler) -> Self {
        self.listeners.get_or_insert_with(ListenerMap::new).insert(event.to_string(), handler);
        self
    }

    pub fn key(mut self, key: impl ToString) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// 0 = check data only, 1 = check children only, 2 = check neither
    pub fn skip(mut self, hint: u8) -> Self {
        self.skip = Some(hint);
        self
    }
}

/// A child argument of `h`
#[derive(Clone)]
pub enum Child {
    Node(VNode),
    Text(String),
    Number(f64),
    /// Booleans and nulls render nothing
    Skip,
    List(Vec<Child>),
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(s: &str) -> Self {
        Child::Text(s.to_string())
    }
}

impl From<String> for Child {
    fn from(s: String) -> Self {
        Child::Text(s)
    }
}

impl From<&String> for Child {
    fn from(s: &String) -> Self {
        Child::Text(s.clone())
    }
}

impl From<bool> for Child {
    fn from(_: bool) -> Self {
        Child::Skip
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Child::Skip
    }
}

macro_rules! number_child {
    ($($t:ty),*) => {
        $(impl From<$t> for Child {
            fn from(n: $t) -> Self {
                Child::Number(n as f64)
            }
        })*
    };
}

number_child!(i32, i64, u32, u64, usize, f32, f64);

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Child::Skip, Into::into)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(items: Vec<T>) -> Self {
        Child::List(items.into_iter().map(Into::into).collect())
    }
}

/// Build a node
pub fn h(tag: impl Into<Tag>, data: Option<VData>, children: Vec<Child>) -> VNode {
    let mut node = VNode::bare(tag.into());

    let had_children = !children.is_empty();
    let mut out = Vec::new();
    let mut last_was_simple = false;
    flatten(children, &mut out, &mut last_was_simple);

    node.children = if had_children { Some(out) } else { None };
    node.skip_children = !had_children;
    node.skip_data = data.is_none();

    if let Some(data) = data {
        node.attrs = data.attrs;
        node.classes = data.classes;
        node.style = data.style;
        node.props = data.props;
        node.listeners = data.listeners;
        node.key = data.key;
        node.namespace = data.namespace;
        match data.skip {
            Some(SKIP_CHILDREN) => node.skip_children = true,
            Some(SKIP_DATA) => node.skip_data = true,
            Some(SKIP_ALL) => {
                node.skip_data = true;
                node.skip_children = true;
            }
            _ => {}
        }
    }
    node
}

/// Text node
pub fn text(content: impl Into<String>) -> VNode {
    VNode::text(content)
}

/// Slot sentinel, default (`None`) or named
pub fn slot(name: Option<&str>) -> VNode {
    let data = name.map(|n| VData::new().attr("name", n));
    h(Tag::Slot, data, Vec::new())
}

fn flatten(children: Vec<Child>, out: &mut Vec<VNode>, last_was_simple: &mut bool) {
    for child in children {
        match child {
            Child::Skip => {}
            Child::List(items) => flatten(items, out, last_was_simple),
            Child::Text(s) => push_simple(out, last_was_simple, s),
            Child::Number(n) => push_simple(out, last_was_simple, n.to_string()),
            Child::Node(node) if node.tag == Tag::Fragment && node.elm.is_none() => {
                let nested = node.children.unwrap_or_default().into_iter().map(Child::Node).collect();
                flatten(nested, out, last_was_simple);
            }
            Child::Node(node) => {
                out.push(node);
                *last_was_simple = false;
            }
        }
    }
}

fn push_simple(out: &mut Vec<VNode>, last_was_simple: &mut bool, s: String) {
    if *last_was_simple {
        if let Some(prev) = out.last_mut().and_then(|n| n.text.as_mut()) {
            prev.push_str(&s);
            return;
        }
    }
    out.push(VNode::text(s));
    *last_was_simple = true;
}
