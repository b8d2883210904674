//! Document - High-level document API
//!
//! Wraps the arena tree with everything a component runtime needs from a
//! DOM: structural mutation, attributes, classes, styles, properties,
//! listeners, custom element reactions and child-list observers.
//!
//! Invalid node ids and illegal insertions are logged and ignored rather
//! than reported, matching how script-facing DOM calls fail soft.

use serde_json::Value;

use crate::custom_elements::{CustomElementRegistry, Reaction};
use crate::events::{EventPhase, EventTarget, Listener, ListenerEntry, ListenerId, ListenerOptions};
use crate::observer::{MutationObserver, MutationRecord, ObserverId};
use crate::{DomTree, Node, NodeData, NodeId};

/// HTML Document
#[derive(Debug)]
pub struct Document {
    tree: DomTree,
    html_element: NodeId,
    head_element: NodeId,
    body_element: NodeId,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u32,
    custom_elements: CustomElementRegistry,
    reactions: Vec<Reaction>,
    observers: Vec<MutationObserver>,
    next_observer_id: u32,
    mutation_count: u64,
}

impl Document {
    /// Create a new document with `<html>`, `<head>` and `<body>`
    pub fn new() -> Self {
        let mut doc = Self::empty();

        let html = doc.tree.alloc(Node::element("html", None));
        let head = doc.tree.alloc(Node::element("head", None));
        let body = doc.tree.alloc(Node::element("body", None));
        doc.tree.link(NodeId::ROOT, html, NodeId::NONE);
        doc.tree.link(html, head, NodeId::NONE);
        doc.tree.link(html, body, NodeId::NONE);

        doc.html_element = html;
        doc.head_element = head;
        doc.body_element = body;
        doc
    }

    /// Create an empty document (no structure)
    pub fn empty() -> Self {
        Self {
            tree: DomTree::new(),
            html_element: NodeId::NONE,
            head_element: NodeId::NONE,
            body_element: NodeId::NONE,
            listeners: Vec::new(),
            next_listener_id: 0,
            custom_elements: CustomElementRegistry::new(),
            reactions: Vec::new(),
            observers: Vec::new(),
            next_observer_id: 0,
            mutation_count: 0,
        }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get <html> element
    pub fn document_element(&self) -> NodeId {
        self.html_element
    }

    /// Get <head> element
    pub fn head(&self) -> NodeId {
        self.head_element
    }

    /// Get <body> element
    pub fn body(&self) -> NodeId {
        self.body_element
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Number of mutating operations performed so far
    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.mutation_count += 1;
        self.tree.alloc(Node::element(tag, None))
    }

    pub fn create_element_ns(&mut self, namespace: &str, tag: &str) -> NodeId {
        self.mutation_count += 1;
        self.tree.alloc(Node::element(tag, Some(namespace)))
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.mutation_count += 1;
        self.tree.alloc(Node::text(content))
    }

    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.mutation_count += 1;
        self.tree.alloc(Node::comment(content))
    }

    // ------------------------------------------------------------------
    // Tree queries
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.first_child(id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.next_sibling(id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.prev_sibling(id)
    }

    /// Snapshot of the direct children
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id).collect()
    }

    /// All descendants in tree order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = self.tree.subtree(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tree.get(id).is_some_and(Node::is_element)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.tree.get(id).is_some_and(Node::is_text)
    }

    /// Tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.tree.get(id)?.as_element().map(|e| e.tag.as_str())
    }

    /// Namespace URI of an element
    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        self.tree.get(id)?.as_element()?.namespace.as_deref()
    }

    /// Whether the node is attached to the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        if self.tree.get(id).is_none() {
            return false;
        }
        let mut current = id;
        loop {
            match self.tree.parent(current) {
                Some(parent) => current = parent,
                None => return current == NodeId::ROOT,
            }
        }
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference` (append when `None`).
    /// A child that is already attached somewhere is moved.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let parent_ok = self.tree.get(parent).is_some_and(|n| n.is_element() || n.is_document());
        if !parent_ok || self.tree.get(child).is_none() || child == NodeId::ROOT {
            tracing::warn!(?parent, ?child, "insert_before ignored: invalid node");
            return;
        }
        if self.tree.is_inclusive_ancestor(child, parent) {
            tracing::warn!(?parent, ?child, "insert_before ignored: hierarchy request");
            return;
        }
        if reference == Some(child) {
            return;
        }

        if self.tree.parent(child).is_some() {
            self.detach_internal(child);
        }

        let reference = match reference {
            Some(r) if self.tree.parent(r) == Some(parent) => r,
            Some(r) => {
                tracing::warn!(?parent, reference = ?r, "reference is not a child, appending");
                NodeId::NONE
            }
            None => NodeId::NONE,
        };

        self.tree.link(parent, child, reference);
        self.mutation_count += 1;
        self.record_child_list(MutationRecord::added(parent, child));

        if self.is_connected(child) {
            self.queue_subtree_reactions(child, true);
        }
    }

    /// Remove `child` from its parent
    pub fn remove(&mut self, child: NodeId) {
        if self.tree.parent(child).is_none() {
            return;
        }
        self.detach_internal(child);
    }

    fn detach_internal(&mut self, child: NodeId) {
        let was_connected = self.is_connected(child);
        let Some(parent) = self.tree.detach(child) else {
            return;
        };
        self.mutation_count += 1;
        self.record_child_list(MutationRecord::removed(parent, child));
        if was_connected {
            self.queue_subtree_reactions(child, false);
        }
    }

    fn queue_subtree_reactions(&mut self, root: NodeId, connected: bool) {
        for id in self.tree.subtree(root) {
            let defined = self
                .tag_name(id)
                .is_some_and(|tag| self.custom_elements.is_defined(tag));
            if defined {
                self.reactions.push(if connected {
                    Reaction::Connected(id)
                } else {
                    Reaction::Disconnected(id)
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Concatenated text of the node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.tree.subtree(id) {
            match self.tree.get(node).map(|n| &n.data) {
                Some(NodeData::Text(t)) => out.push_str(t),
                Some(NodeData::Comment(c)) if node == id => out.push_str(c),
                _ => {}
            }
        }
        out
    }

    /// Replace text of a text/comment node, or all children of an element
    pub fn set_text_content(&mut self, id: NodeId, content: &str) {
        let is_element = match self.tree.get_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Text(t)) | Some(NodeData::Comment(t)) => {
                *t = content.to_string();
                false
            }
            Some(NodeData::Element(_)) => true,
            _ => return,
        };
        if is_element {
            for child in self.child_nodes(id) {
                self.detach_internal(child);
            }
            if !content.is_empty() {
                let text = self.tree.alloc(Node::text(content));
                self.tree.link(id, text, NodeId::NONE);
                self.record_child_list(MutationRecord::added(id, text));
            }
        }
        self.mutation_count += 1;
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.tree.get(id)?.as_element()?.get_attr(name)
    }

    pub fn get_attribute_ns(&self, id: NodeId, namespace: &str, name: &str) -> Option<&str> {
        self.tree.get(id)?.as_element()?.get_attr_ns(namespace, name)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    /// `(name, value)` pairs of non-namespaced attributes, in order
    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        self.tree
            .get(id)
            .and_then(Node::as_element)
            .map(|e| {
                e.attrs.iter()
                    .filter(|a| a.namespace.is_none())
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        let old = elem.set_attr(None, &name, value);
        if name == "class" {
            elem.classes = value.split_whitespace().map(str::to_string).collect();
        }
        self.mutation_count += 1;
        self.queue_attribute_reaction(id, &name, old, Some(value.to_string()));
    }

    pub fn set_attribute_ns(&mut self, id: NodeId, namespace: &str, name: &str, value: &str) {
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        elem.set_attr(Some(namespace), name, value);
        self.mutation_count += 1;
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        let old = elem.remove_attr(None, &name);
        if old.is_none() {
            return;
        }
        if name == "class" {
            elem.classes.clear();
        }
        self.mutation_count += 1;
        self.queue_attribute_reaction(id, &name, old, None);
    }

    pub fn remove_attribute_ns(&mut self, id: NodeId, namespace: &str, name: &str) {
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        if elem.remove_attr(Some(namespace), name).is_some() {
            self.mutation_count += 1;
        }
    }

    fn queue_attribute_reaction(&mut self, id: NodeId, name: &str, old: Option<String>, new: Option<String>) {
        let observed = self
            .tag_name(id)
            .is_some_and(|tag| self.custom_elements.observes(tag, name));
        if observed {
            self.reactions.push(Reaction::AttributeChanged {
                element: id,
                name: name.to_string(),
                old_value: old,
                new_value: new,
            });
        }
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    pub fn class_list(&self, id: NodeId) -> Vec<String> {
        self.tree
            .get(id)
            .and_then(Node::as_element)
            .map(|e| e.classes.clone())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.tree
            .get(id)
            .and_then(Node::as_element)
            .is_some_and(|e| e.classes.iter().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        if elem.classes.iter().any(|c| c == class) {
            return;
        }
        elem.classes.push(class.to_string());
        let value = elem.class_name();
        elem.set_attr(None, "class", &value);
        self.mutation_count += 1;
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) else {
            return;
        };
        let before = elem.classes.len();
        elem.classes.retain(|c| c != class);
        if elem.classes.len() == before {
            return;
        }
        if elem.classes.is_empty() {
            elem.remove_attr(None, "class");
        } else {
            let value = elem.class_name();
            elem.set_attr(None, "class", &value);
        }
        self.mutation_count += 1;
    }

    // ------------------------------------------------------------------
    // Inline style
    // ------------------------------------------------------------------

    pub fn style_property(&self, id: NodeId, name: &str) -> Option<&str> {
        self.tree.get(id)?.as_element()?.style.get(name).map(String::as_str)
    }

    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) {
            elem.style.insert(name.to_string(), value.to_string());
            self.mutation_count += 1;
        }
    }

    pub fn remove_style_property(&mut self, id: NodeId, name: &str) {
        if let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) {
            if elem.style.remove(name).is_some() {
                self.mutation_count += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Element properties
    // ------------------------------------------------------------------

    pub fn get_property(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.tree.get(id)?.as_element()?.properties.get(name)
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) {
        if let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) {
            elem.properties.insert(name.to_string(), value);
            self.mutation_count += 1;
        }
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) {
        if let Some(elem) = self.tree.get_mut(id).and_then(Node::as_element_mut) {
            if elem.properties.remove(name).is_some() {
                self.mutation_count += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Event listeners
    // ------------------------------------------------------------------

    pub fn add_event_listener(
        &mut self,
        target: impl Into<EventTarget>,
        event_type: &str,
        callback: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push(ListenerEntry {
            id,
            target: target.into(),
            event_type: event_type.to_string(),
            callback,
            options,
        });
        self.mutation_count += 1;
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        let removed = self.listeners.len() != before;
        if removed {
            self.mutation_count += 1;
        }
        removed
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    /// Number of listeners registered on a target
    pub fn listener_count(&self, target: impl Into<EventTarget>) -> usize {
        let target = target.into();
        self.listeners.iter().filter(|l| l.target == target).count()
    }

    pub(crate) fn listeners_for(&self, target: EventTarget, event_type: &str, phase: EventPhase) -> Vec<ListenerEntry> {
        self.listeners
            .iter()
            .filter(|l| l.target == target && l.event_type == event_type)
            .filter(|l| match phase {
                EventPhase::Capturing => l.options.capture,
                EventPhase::AtTarget => true,
                EventPhase::Bubbling => !l.options.capture,
            })
            .cloned()
            .collect()
    }

    /// Target followed by its ancestors, then the window when connected
    pub fn event_path(&self, target: EventTarget) -> Vec<EventTarget> {
        let EventTarget::Node(node) = target else {
            return vec![EventTarget::Window];
        };
        let mut path = vec![target];
        let mut current = node;
        while let Some(parent) = self.tree.parent(current) {
            path.push(EventTarget::Node(parent));
            current = parent;
        }
        if current == NodeId::ROOT {
            path.push(EventTarget::Window);
        }
        path
    }

    // ------------------------------------------------------------------
    // Custom elements
    // ------------------------------------------------------------------

    pub fn custom_elements(&self) -> &CustomElementRegistry {
        &self.custom_elements
    }

    pub fn custom_elements_mut(&mut self) -> &mut CustomElementRegistry {
        &mut self.custom_elements
    }

    /// Drain queued lifecycle reactions
    pub fn take_reactions(&mut self) -> Vec<Reaction> {
        std::mem::take(&mut self.reactions)
    }

    pub fn has_reactions(&self) -> bool {
        !self.reactions.is_empty()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn create_observer(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push(MutationObserver::new(id));
        id
    }

    /// Convenience: create an observer already watching `target`
    pub fn observe_child_list(&mut self, target: NodeId) -> ObserverId {
        let id = self.create_observer();
        self.observe(id, target);
        id
    }

    pub fn observe(&mut self, id: ObserverId, target: NodeId) {
        if let Some(observer) = self.observers.iter_mut().find(|o| o.id() == id) {
            observer.observe(target);
        }
    }

    /// Stop observing; pending records are kept until taken
    pub fn disconnect_observer(&mut self, id: ObserverId) {
        if let Some(observer) = self.observers.iter_mut().find(|o| o.id() == id) {
            observer.disconnect();
        }
    }

    pub fn remove_observer(&mut self, id: ObserverId) {
        self.observers.retain(|o| o.id() != id);
    }

    pub fn take_records(&mut self, id: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .iter_mut()
            .find(|o| o.id() == id)
            .map(MutationObserver::take_records)
            .unwrap_or_default()
    }

    pub fn has_pending_records(&self) -> bool {
        self.observers.iter().any(MutationObserver::has_records)
    }

    fn record_child_list(&mut self, record: MutationRecord) {
        for observer in self.observers.iter_mut() {
            if observer.is_observing(record.target) {
                observer.push_record(record.clone());
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
