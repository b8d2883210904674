//! Host Wiring
//!
//! Connects hosts to the document: declarative listeners, observed
//! attribute changes and tracking of light DOM content for slots.

use std::rc::Rc;

use kiln_dom::{DomEvent, EventTarget, Listener, ListenerId, ListenerOptions, NodeId, ObserverId};
use kiln_vdom::{SlotContent, VNode};

use crate::error::{ErrorKind, RuntimeError};
use crate::host::HostListener;
use crate::metadata::{ComponentMeta, ListenerMeta};
use crate::platform::Platform;
use crate::reactive::parse_prop_value;

/// Where a declarative listener attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTarget {
    Host,
    Parent,
    Body,
    Document,
    Window,
}

/// Parsed `[target:]event[.key]` listener name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub target: ListenTarget,
    pub event: String,
    /// Only events with this key code reach the handler
    pub key_code: Option<u32>,
}

impl ListenerSpec {
    pub fn parse(name: &str) -> Self {
        let (target, rest) = match name.split_once(':') {
            Some((prefix, rest)) => {
                let target = match prefix {
                    "parent" => ListenTarget::Parent,
                    "body" => ListenTarget::Body,
                    "document" => ListenTarget::Document,
                    "window" => ListenTarget::Window,
                    other => {
                        tracing::warn!(target = other, "unknown listener target, using the host");
                        ListenTarget::Host
                    }
                };
                (target, rest)
            }
            None => (ListenTarget::Host, name),
        };
        let (event, key_code) = match rest.split_once('.') {
            Some((event, key)) => {
                let code = key_code(key);
                if code.is_none() {
                    tracing::warn!(key, event, "unknown key name, listener fires for every key");
                }
                (event, code)
            }
            None => (rest, None),
        };
        Self { target, event: event.to_string(), key_code }
    }
}

/// Key code for a named key, `None` when unknown
pub fn key_code(key: &str) -> Option<u32> {
    Some(match key.to_ascii_lowercase().as_str() {
        "enter" => 13,
        "escape" => 27,
        "space" => 32,
        "tab" => 9,
        "left" => 37,
        "up" => 38,
        "right" => 39,
        "down" => 40,
        _ => return None,
    })
}

impl Platform {
    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub(crate) fn attach_host_listeners(&self, elm: NodeId, meta: &ComponentMeta) {
        let listeners: Vec<HostListener> = meta
            .listeners
            .iter()
            .map(|listener| HostListener {
                event_name: listener.event_name.clone(),
                id: if listener.disabled { None } else { self.add_host_listener(elm, listener) },
            })
            .collect();
        if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
            host.listeners = listeners;
        }
    }

    fn add_host_listener(&self, elm: NodeId, listener: &ListenerMeta) -> Option<ListenerId> {
        let spec = ListenerSpec::parse(&listener.event_name);
        let mut doc = self.doc.borrow_mut();
        let target: EventTarget = match spec.target {
            ListenTarget::Host => elm.into(),
            ListenTarget::Parent => match doc.parent(elm) {
                Some(parent) => parent.into(),
                None => {
                    tracing::warn!(event = %listener.event_name, "host has no parent to listen on");
                    return None;
                }
            },
            ListenTarget::Body => doc.body().into(),
            ListenTarget::Document => doc.root().into(),
            ListenTarget::Window => EventTarget::Window,
        };

        let this = self.weak();
        let method = listener.method.clone();
        let wanted_key = spec.key_code;
        let callback: Listener = Rc::new(move |event: &mut DomEvent| {
            if wanted_key.is_some() && event.key_code != wanted_key {
                return;
            }
            if let Some(platform) = this.upgrade() {
                platform.on_host_event(elm, &method, event);
            }
        });
        let options = ListenerOptions { capture: listener.capture, passive: listener.passive };
        Some(doc.add_event_listener(target, &spec.event, callback, options))
    }

    fn on_host_event(&self, elm: NodeId, method: &str, event: &mut DomEvent) {
        let has_instance = self.hosts.borrow().get(&elm).map(|h| h.instance.is_some());
        match has_instance {
            None => {}
            Some(false) => {
                // replayed once the instance exists
                if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                    host.queued_events.push((method.to_string(), event.clone()));
                }
            }
            Some(true) => {
                if let Err(err) = self.invoke_listener(elm, method, event) {
                    let tag = self.host_meta(elm).map(|m| m.tag.clone());
                    self.report(ErrorKind::Listener, Some(elm), tag.as_deref(), &err);
                }
                self.queue_update(elm);
                if self.config.is_interaction(&event.event_type) {
                    self.flush_now();
                }
            }
        }
    }

    pub(crate) fn invoke_listener(&self, elm: NodeId, method: &str, event: &mut DomEvent) -> anyhow::Result<()> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let instance = self.instance(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let cx = self.cx(elm, &meta.tag);
        let mut component = instance.try_borrow_mut().map_err(|_| RuntimeError::Busy)?;
        component.handle_event(method, event, &cx)
    }

    /// Attach or detach a declared listener at runtime
    pub fn enable_listener(&self, elm: NodeId, event_name: &str, enabled: bool) -> Result<(), RuntimeError> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let listener = meta
            .listeners
            .iter()
            .find(|l| l.event_name == event_name)
            .ok_or_else(|| RuntimeError::UnknownMember { tag: meta.tag.clone(), member: event_name.to_string() })?;

        let current = self
            .hosts
            .borrow()
            .get(&elm)
            .and_then(|h| h.listeners.iter().find(|l| l.event_name == event_name).map(|l| l.id));
        let id = match (enabled, current.flatten()) {
            (true, None) => self.add_host_listener(elm, listener),
            (false, Some(id)) => {
                self.doc.borrow_mut().remove_event_listener(id);
                None
            }
            (_, existing) => existing,
        };

        let mut hosts = self.hosts.borrow_mut();
        if let Some(host) = hosts.get_mut(&elm) {
            match host.listeners.iter_mut().find(|l| l.event_name == event_name) {
                Some(entry) => entry.id = id,
                None => host.listeners.push(HostListener { event_name: event_name.to_string(), id }),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub(crate) fn attribute_changed(&self, elm: NodeId, name: &str, old_value: Option<&str>, new_value: Option<&str>) {
        if old_value == new_value {
            return;
        }
        let member = self
            .host_meta(elm)
            .and_then(|meta| meta.member_for_attribute(name).cloned());
        let Some(member) = member else {
            return;
        };
        let value = parse_prop_value(member.prop_type, new_value);
        self.set_value(elm, &member.name, value);
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    pub(crate) fn capture_slot_content(&self, elm: NodeId) {
        let needs_capture = self.hosts.borrow().get(&elm).is_some_and(|h| h.slot_content.is_none());
        if !needs_capture {
            return;
        }
        let (content, observer) = {
            let mut doc = self.doc.borrow_mut();
            let content = SlotContent::capture(&doc, elm);
            (content, doc.observe_child_list(elm))
        };
        if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
            host.slot_content = Some(content);
            host.observer = Some(observer);
        }
    }

    /// Light DOM children added to or removed from a host after its first
    /// render update its slot content
    pub(crate) fn process_slot_records(&self) {
        let observed: Vec<(NodeId, ObserverId)> = self
            .hosts
            .borrow()
            .iter()
            .filter_map(|(elm, host)| host.observer.map(|observer| (*elm, observer)))
            .collect();

        for (elm, observer) in observed {
            let records = self.doc.borrow_mut().take_records(observer);
            if records.is_empty() {
                continue;
            }
            let changed = {
                let doc = self.doc.borrow();
                let mut hosts = self.hosts.borrow_mut();
                let Some(host) = hosts.get_mut(&elm) else {
                    continue;
                };
                let rendered: Vec<NodeId> = host
                    .vnode
                    .as_ref()
                    .map(|v| v.children().iter().filter_map(VNode::elm).collect())
                    .unwrap_or_default();
                let Some(content) = host.slot_content.as_mut() else {
                    continue;
                };
                let mut changed = false;
                for record in records {
                    for node in record.added_nodes {
                        if doc.parent(node) == Some(elm) && !content.contains(node) && !rendered.contains(&node) {
                            content.add(&doc, node);
                            changed = true;
                        }
                    }
                    for node in record.removed_nodes {
                        if content.contains(node) && doc.parent(node).is_none() {
                            content.remove(node);
                            changed = true;
                        }
                    }
                }
                changed
            };
            if changed {
                tracing::trace!(?elm, "slot content changed");
                self.queue_update(elm);
            }
        }
    }
}
