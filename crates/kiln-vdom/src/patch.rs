//! Diff/Patch Engine
//!
//! Reconciles an old vnode tree against a new one and applies the minimal
//! set of DOM operations. Children lists use the four-pointer keyed diff
//! (start/start, end/end, start/end, end/start, then a key lookup).
//! Slot sentinels relocate already-existing captured host content instead
//! of creating nodes.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::rc::Rc;

use kiln_dom::{Document, DomEvent, Listener, ListenerOptions, NodeId, SVG_NS, XLINK_NS, XML_NS};

use crate::vnode::{AttrValue, ListenerSlot, Tag, VNode};

/// Attribute set on the root element when server rendering
pub const SSR_VNODE_ID: &str = "ssrv";
/// Positional marker set on every created element when server rendering
pub const SSR_CHILD_ID: &str = "ssrc";

/// Callbacks the patcher issues around slot content relocation
pub trait PatchHooks {
    /// `nodes` are about to be moved to a new position
    fn relocation_started(&mut self, _doc: &Document, _nodes: &[NodeId]) {}
    /// `nodes` have been moved
    fn relocation_finished(&mut self, _doc: &Document, _nodes: &[NodeId]) {}
}

/// Hooks that do nothing
#[derive(Debug, Default)]
pub struct NoHooks;

impl PatchHooks for NoHooks {}

/// Host content captured before the first render, by slot name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotContent {
    pub default: Vec<NodeId>,
    pub named: BTreeMap<String, Vec<NodeId>>,
}

impl SlotContent {
    /// Capture the current children of `host`. Elements with a `slot`
    /// attribute go to that named slot, everything else to the default slot.
    pub fn capture(doc: &Document, host: NodeId) -> Self {
        let mut content = Self::default();
        for child in doc.child_nodes(host) {
            content.add(doc, child);
        }
        content
    }

    pub fn add(&mut self, doc: &Document, node: NodeId) {
        match doc.get_attribute(node, "slot") {
            Some(name) => self.named.entry(name.to_string()).or_default().push(node),
            None => self.default.push(node),
        }
    }

    pub fn remove(&mut self, node: NodeId) {
        self.default.retain(|n| *n != node);
        for nodes in self.named.values_mut() {
            nodes.retain(|n| *n != node);
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.default.contains(&node) || self.named.values().any(|n| n.contains(&node))
    }

    pub fn nodes(&self, name: Option<&str>) -> &[NodeId] {
        match name {
            None => &self.default,
            Some(name) => self.named.get(name).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.values().all(Vec::is_empty)
    }

    /// Every captured node, default slot first
    pub fn all(&self) -> Vec<NodeId> {
        self.default.iter().chain(self.named.values().flatten()).copied().collect()
    }
}

/// Patch `old` into `new` and return `new` bound to the live DOM.
///
/// `old` must be bound (`VNode::from_element` on the first call, the
/// previous result afterwards).
pub fn patch(
    doc: &mut Document,
    hooks: &mut dyn PatchHooks,
    old: VNode,
    new: VNode,
    is_update: bool,
    slot_content: Option<&SlotContent>,
    ssr_id: Option<u32>,
) -> VNode {
    let mut patcher = Patcher::new(doc, hooks).with_ssr_id(ssr_id);
    if let Some(content) = slot_content {
        patcher = patcher.with_slot_content(content);
    }
    patcher.patch(old, new, is_update)
}

/// Detach every listener installed for `vnode` and its descendants
pub fn destroy(doc: &mut Document, vnode: &VNode) {
    if let Some(slot) = &vnode.listener_slot {
        let registered = std::mem::take(&mut *slot.registered.borrow_mut());
        for id in registered.into_values() {
            doc.remove_event_listener(id);
        }
        slot.handlers.borrow_mut().clear();
    }
    for child in vnode.children() {
        destroy(doc, child);
    }
}

/// Stateful patcher for one patch call
pub struct Patcher<'a> {
    doc: &'a mut Document,
    hooks: &'a mut dyn PatchHooks,
    slot_content: Option<&'a SlotContent>,
    ssr_id: Option<u32>,
    svg_mode: bool,
}

impl<'a> Patcher<'a> {
    pub fn new(doc: &'a mut Document, hooks: &'a mut dyn PatchHooks) -> Self {
        Self {
            doc,
            hooks,
            slot_content: None,
            ssr_id: None,
            svg_mode: false,
        }
    }

    pub fn with_slot_content(mut self, content: &'a SlotContent) -> Self {
        self.slot_content = Some(content);
        self
    }

    pub fn with_ssr_id(mut self, ssr_id: Option<u32>) -> Self {
        self.ssr_id = ssr_id;
        self
    }

    pub fn patch(mut self, old: VNode, mut new: VNode, is_update: bool) -> VNode {
        let Some(elm) = old.elm else {
            tracing::warn!("patch called with an unbound root vnode");
            return new;
        };
        if is_update {
            self.ssr_id = None;
        } else if let Some(id) = self.ssr_id {
            self.doc.set_attribute(elm, SSR_VNODE_ID, &id.to_string());
        }
        self.svg_mode = self.doc.namespace(elm) == Some(SVG_NS);
        self.patch_vnode(old, &mut new);
        new
    }

    fn patch_vnode(&mut self, mut old: VNode, new: &mut VNode) {
        if new.tag == Tag::Slot {
            new.relocated = std::mem::take(&mut old.relocated);
            return;
        }
        let Some(elm) = old.elm else {
            return;
        };
        new.elm = Some(elm);

        if new.tag == Tag::Text {
            if old.text != new.text {
                self.doc.set_text_content(elm, new.text.as_deref().unwrap_or(""));
            }
            return;
        }

        let svg_before = self.svg_mode;
        let tag_name = match &new.tag {
            Tag::Element(name) => Some(name.clone()),
            _ => None,
        };
        if tag_name.as_deref() == Some("svg") {
            self.svg_mode = true;
        }

        new.listener_slot = old.listener_slot.take();
        if !(old.skip_data && new.skip_data) {
            self.update_data(elm, &old, new);
        }

        if old.skip_children && new.skip_children {
            new.children = old.children.take();
        } else {
            if tag_name.as_deref() == Some("foreignObject") {
                self.svg_mode = false;
            }
            match (old.children.take(), new.children.as_mut()) {
                (Some(old_ch), Some(new_ch)) => self.update_children(elm, old_ch, new_ch),
                (None, Some(new_ch)) => {
                    let len = new_ch.len();
                    self.add_vnodes(elm, None, new_ch, 0..len);
                }
                (Some(old_ch), None) => self.remove_vnodes(old_ch),
                (None, None) => {}
            }
        }
        self.svg_mode = svg_before;
    }

    fn update_children(&mut self, parent: NodeId, old_ch: Vec<VNode>, new_ch: &mut [VNode]) {
        let mut old: Vec<Option<VNode>> = old_ch.into_iter().map(Some).collect();
        // end indices are exclusive
        let mut old_start = 0;
        let mut old_end = old.len();
        let mut new_start = 0;
        let mut new_end = new_ch.len();
        let mut key_map: Option<HashMap<String, usize>> = None;

        while old_start < old_end && new_start < new_end {
            let Some(old_start_node) = old[old_start].as_ref() else {
                old_start += 1;
                continue;
            };
            let Some(old_end_node) = old[old_end - 1].as_ref() else {
                old_end -= 1;
                continue;
            };

            if old_start_node.is_same(&new_ch[new_start]) {
                if let Some(prev) = old[old_start].take() {
                    self.patch_vnode(prev, &mut new_ch[new_start]);
                }
                if new_ch[new_start].tag == Tag::Slot {
                    let anchor = Self::before_old(&old[old_start..old_end], &new_ch[new_end..]);
                    self.sync_slot(parent, &mut new_ch[new_start], anchor);
                }
                old_start += 1;
                new_start += 1;
            } else if old_end_node.is_same(&new_ch[new_end - 1]) {
                if let Some(prev) = old[old_end - 1].take() {
                    self.patch_vnode(prev, &mut new_ch[new_end - 1]);
                }
                if new_ch[new_end - 1].tag == Tag::Slot {
                    let anchor = first_dom_node(&new_ch[new_end..]);
                    self.sync_slot(parent, &mut new_ch[new_end - 1], anchor);
                }
                old_end -= 1;
                new_end -= 1;
            } else if old_start_node.is_same(&new_ch[new_end - 1]) {
                // moved right
                let anchor = self.after_old(old_end_node, &new_ch[new_end..]);
                if let Some(prev) = old[old_start].take() {
                    self.patch_vnode(prev, &mut new_ch[new_end - 1]);
                }
                self.move_before(parent, &new_ch[new_end - 1], anchor);
                self.sync_slot(parent, &mut new_ch[new_end - 1], anchor);
                old_start += 1;
                new_end -= 1;
            } else if old_end_node.is_same(&new_ch[new_start]) {
                // moved left
                let anchor = Self::before_old(&old[old_start..old_end], &new_ch[new_end..]);
                if let Some(prev) = old[old_end - 1].take() {
                    self.patch_vnode(prev, &mut new_ch[new_start]);
                }
                self.move_before(parent, &new_ch[new_start], anchor);
                self.sync_slot(parent, &mut new_ch[new_start], anchor);
                old_end -= 1;
                new_start += 1;
            } else {
                let map = key_map.get_or_insert_with(|| {
                    let mut map = HashMap::new();
                    for (idx, node) in old.iter().enumerate().take(old_end).skip(old_start) {
                        if let Some(key) = node.as_ref().and_then(|n| n.key.clone()) {
                            map.insert(key, idx);
                        }
                    }
                    map
                });
                let anchor = Self::before_old(&old[old_start..old_end], &new_ch[new_end..]);
                let reusable = new_ch[new_start]
                    .key
                    .as_ref()
                    .and_then(|key| map.get(key).copied())
                    .filter(|idx| old[*idx].as_ref().is_some_and(|o| o.is_same(&new_ch[new_start])));

                match reusable.and_then(|idx| old[idx].take()) {
                    Some(prev) => {
                        self.patch_vnode(prev, &mut new_ch[new_start]);
                        self.move_before(parent, &new_ch[new_start], anchor);
                        self.sync_slot(parent, &mut new_ch[new_start], anchor);
                    }
                    None => self.create_elm(&mut new_ch[new_start], parent, anchor, new_start),
                }
                new_start += 1;
            }
        }

        if old_start >= old_end {
            let before = first_dom_node(&new_ch[new_end..]);
            self.add_vnodes(parent, before, new_ch, new_start..new_end);
        } else {
            let leftovers: Vec<VNode> = old[old_start..old_end].iter_mut().filter_map(Option::take).collect();
            self.remove_vnodes(leftovers);
        }
    }

    /// DOM position right after an old node that is still in place
    fn after_old(&self, node: &VNode, placed_tail: &[VNode]) -> Option<NodeId> {
        match node.last_dom_node() {
            Some(last) => self.doc.next_sibling(last),
            None => first_dom_node(placed_tail),
        }
    }

    /// DOM position of the first remaining old node
    fn before_old(remaining: &[Option<VNode>], placed_tail: &[VNode]) -> Option<NodeId> {
        remaining
            .iter()
            .flatten()
            .find_map(VNode::first_dom_node)
            .or_else(|| first_dom_node(placed_tail))
    }

    fn move_before(&mut self, parent: NodeId, vnode: &VNode, anchor: Option<NodeId>) {
        let nodes = vnode.dom_nodes();
        if nodes.is_empty() {
            return;
        }
        let relocating = vnode.tag == Tag::Slot;
        if relocating {
            self.hooks.relocation_started(&*self.doc, &nodes);
        }
        for node in &nodes {
            if Some(*node) != anchor {
                self.doc.insert_before(parent, *node, anchor);
            }
        }
        if relocating {
            self.hooks.relocation_finished(&*self.doc, &nodes);
        }
    }

    /// Bring a patched slot in line with content captured since its last
    /// render. Nodes that left the content are detached.
    fn sync_slot(&mut self, parent: NodeId, vnode: &mut VNode, anchor: Option<NodeId>) {
        if vnode.tag != Tag::Slot {
            return;
        }
        let Some(content) = self.slot_content else {
            return;
        };
        let wanted = content.nodes(vnode.slot_name()).to_vec();
        if wanted == vnode.relocated {
            return;
        }
        for node in &vnode.relocated {
            if !wanted.contains(node) {
                self.doc.remove(*node);
            }
        }
        if !wanted.is_empty() {
            self.hooks.relocation_started(&*self.doc, &wanted);
            for node in &wanted {
                self.doc.insert_before(parent, *node, anchor);
            }
            self.hooks.relocation_finished(&*self.doc, &wanted);
        }
        vnode.relocated = wanted;
    }

    fn add_vnodes(&mut self, parent: NodeId, before: Option<NodeId>, vnodes: &mut [VNode], range: Range<usize>) {
        for idx in range {
            self.create_elm(&mut vnodes[idx], parent, before, idx);
        }
    }

    fn remove_vnodes(&mut self, vnodes: Vec<VNode>) {
        for vnode in vnodes {
            if vnode.tag == Tag::Slot {
                // content stays captured, it only leaves the DOM
                for node in &vnode.relocated {
                    self.doc.remove(*node);
                }
                continue;
            }
            destroy(self.doc, &vnode);
            if let Some(elm) = vnode.elm {
                self.doc.remove(elm);
            }
        }
    }

    fn create_elm(&mut self, vnode: &mut VNode, parent: NodeId, before: Option<NodeId>, index: usize) {
        match vnode.tag.clone() {
            Tag::Slot => self.relocate_slot_content(vnode, parent, before),
            Tag::Text => {
                let node = self.doc.create_text(vnode.text.as_deref().unwrap_or(""));
                vnode.elm = Some(node);
                self.doc.insert_before(parent, node, before);
            }
            Tag::Fragment => {
                tracing::warn!("nested fragment vnode ignored; build children through h()");
            }
            Tag::Element(tag) => {
                let svg_before = self.svg_mode;
                if tag == "svg" {
                    self.svg_mode = true;
                }
                let namespace = vnode
                    .namespace
                    .clone()
                    .or_else(|| self.svg_mode.then(|| SVG_NS.to_string()));
                let elm = match &namespace {
                    Some(ns) => self.doc.create_element_ns(ns, &tag),
                    None => self.doc.create_element(&tag),
                };
                vnode.elm = Some(elm);

                if let Some(id) = self.ssr_id {
                    self.doc.set_attribute(elm, SSR_CHILD_ID, &format!("{id}.{index}"));
                }

                let empty = VNode::bare(Tag::Fragment);
                self.update_data(elm, &empty, vnode);

                if tag == "foreignObject" {
                    self.svg_mode = false;
                }
                if let Some(children) = vnode.children.as_mut() {
                    for (idx, child) in children.iter_mut().enumerate() {
                        self.create_elm(child, elm, None, idx);
                    }
                }
                self.svg_mode = svg_before;

                self.doc.insert_before(parent, elm, before);
            }
        }
    }

    fn relocate_slot_content(&mut self, vnode: &mut VNode, parent: NodeId, before: Option<NodeId>) {
        let nodes: Vec<NodeId> = self
            .slot_content
            .map(|content| content.nodes(vnode.slot_name()).to_vec())
            .unwrap_or_default();
        if nodes.is_empty() {
            vnode.relocated.clear();
            return;
        }

        self.hooks.relocation_started(&*self.doc, &nodes);
        for node in &nodes {
            self.doc.insert_before(parent, *node, before);
        }
        self.hooks.relocation_finished(&*self.doc, &nodes);
        tracing::trace!(count = nodes.len(), "relocated slot content");
        vnode.relocated = nodes;
    }

    fn update_data(&mut self, elm: NodeId, old: &VNode, new: &mut VNode) {
        let (removed, changed) = diff_maps(old.attrs.as_ref(), new.attrs.as_ref());
        for name in removed {
            self.remove_attr(elm, name);
        }
        for (name, value) in changed {
            self.set_attr(elm, name, value);
        }

        let empty = BTreeMap::new();
        let old_classes = old.classes.as_ref().unwrap_or(&empty);
        let new_classes = new.classes.as_ref().unwrap_or(&empty);
        for (name, on) in old_classes {
            if *on && !new_classes.get(name).copied().unwrap_or(false) {
                self.doc.remove_class(elm, name);
            }
        }
        for (name, on) in new_classes {
            if *on && !old_classes.get(name).copied().unwrap_or(false) {
                self.doc.add_class(elm, name);
            }
        }

        let (removed, changed) = diff_maps(old.style.as_ref(), new.style.as_ref());
        for name in removed {
            self.doc.remove_style_property(elm, name);
        }
        for (name, value) in changed {
            self.doc.set_style_property(elm, name, value);
        }

        let (removed, changed) = diff_maps(old.props.as_ref(), new.props.as_ref());
        for name in removed {
            self.doc.remove_property(elm, name);
        }
        for (name, value) in changed {
            self.doc.set_property(elm, name, value.clone());
        }

        self.update_listeners(elm, new);
    }

    fn set_attr(&mut self, elm: NodeId, name: &str, value: &AttrValue) {
        let value = match value {
            AttrValue::Str(s) => s.as_str(),
            AttrValue::Bool(true) => "",
            AttrValue::Bool(false) => {
                self.remove_attr(elm, name);
                return;
            }
        };
        match split_namespace(name) {
            Some((ns, local)) => self.doc.set_attribute_ns(elm, ns, local, value),
            None => self.doc.set_attribute(elm, name, value),
        }
    }

    fn remove_attr(&mut self, elm: NodeId, name: &str) {
        match split_namespace(name) {
            Some((ns, local)) => self.doc.remove_attribute_ns(elm, ns, local),
            None => self.doc.remove_attribute(elm, name),
        }
    }

    fn update_listeners(&mut self, elm: NodeId, new: &mut VNode) {
        let wanted: Vec<String> = new
            .listeners
            .as_ref()
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default();

        if wanted.is_empty() {
            if let Some(slot) = new.listener_slot.take() {
                let registered = std::mem::take(&mut *slot.registered.borrow_mut());
                for id in registered.into_values() {
                    self.doc.remove_event_listener(id);
                }
            }
            return;
        }

        let slot = Rc::clone(new.listener_slot.get_or_insert_with(|| Rc::new(ListenerSlot::default())));

        let stale: Vec<String> = slot
            .registered
            .borrow()
            .keys()
            .filter(|name| !wanted.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            let id = slot.registered.borrow_mut().remove(&name);
            if let Some(id) = id {
                self.doc.remove_event_listener(id);
            }
        }

        for name in &wanted {
            if slot.registered.borrow().contains_key(name) {
                continue;
            }
            let weak = Rc::downgrade(&slot);
            let listener: Listener = Rc::new(move |event: &mut DomEvent| {
                let Some(slot) = weak.upgrade() else {
                    return;
                };
                let handler = slot.handlers.borrow().get(&event.event_type).cloned();
                if let Some(handler) = handler {
                    handler(event);
                }
            });
            let id = self.doc.add_event_listener(elm, name, listener, ListenerOptions::default());
            slot.registered.borrow_mut().insert(name.clone(), id);
        }

        *slot.handlers.borrow_mut() = new.listeners.clone().unwrap_or_default();
    }
}

fn first_dom_node(nodes: &[VNode]) -> Option<NodeId> {
    nodes.iter().find_map(VNode::first_dom_node)
}

fn split_namespace(name: &str) -> Option<(&'static str, &str)> {
    if let Some(local) = name.strip_prefix("xlink:") {
        Some((XLINK_NS, local))
    } else if let Some(local) = name.strip_prefix("xml:") {
        Some((XML_NS, local))
    } else {
        None
    }
}

/// Keys present in `old` but not `new`, and entries of `new` that are new or changed
fn diff_maps<'m, V: PartialEq>(
    old: Option<&'m BTreeMap<String, V>>,
    new: Option<&'m BTreeMap<String, V>>,
) -> (Vec<&'m str>, Vec<(&'m str, &'m V)>) {
    let mut removed = Vec::new();
    let mut changed = Vec::new();
    if let Some(old) = old {
        for key in old.keys() {
            if !new.is_some_and(|n| n.contains_key(key)) {
                removed.push(key.as_str());
            }
        }
    }
    if let Some(new) = new {
        for (key, value) in new {
            if old.and_then(|o| o.get(key)) != Some(value) {
                changed.push((key.as_str(), value));
            }
        }
    }
    (removed, changed)
}
