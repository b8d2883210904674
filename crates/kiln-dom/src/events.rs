//! DOM Events
//!
//! Event objects, listener registration records and the three-phase
//! dispatch algorithm (capture, target, bubble).

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::{Document, NodeId};

/// Something listeners can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// A node in the document (the document node included)
    Node(NodeId),
    /// The global window object
    Window,
}

impl From<NodeId> for EventTarget {
    fn from(id: NodeId) -> Self {
        EventTarget::Node(id)
    }
}

/// Event listener callback
pub type Listener = Rc<dyn Fn(&mut DomEvent)>;

/// Listener registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u32);

/// addEventListener options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
}

/// Registered listener
#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub id: ListenerId,
    pub target: EventTarget,
    pub event_type: String,
    pub callback: Listener,
    pub options: ListenerOptions,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("event_type", &self.event_type)
            .field("options", &self.options)
            .finish()
    }
}

/// Dispatch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Capturing,
    AtTarget,
    Bubbling,
}

/// DOM event
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub event_type: String,
    pub target: Option<EventTarget>,
    pub current_target: Option<EventTarget>,
    /// CustomEvent detail
    pub detail: Value,
    /// Legacy keyCode for keyboard events
    pub key_code: Option<u32>,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
    pub timestamp: f64,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
    in_passive_listener: bool,
}

impl DomEvent {
    /// Create a plain event that bubbles and is cancelable
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            target: None,
            current_target: None,
            detail: Value::Null,
            key_code: None,
            bubbles: true,
            cancelable: true,
            composed: false,
            timestamp: 0.0,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            in_passive_listener: false,
        }
    }

    /// Create a CustomEvent carrying `detail`
    pub fn custom(event_type: &str, detail: Value) -> Self {
        Self { detail, ..Self::new(event_type) }
    }

    /// Create a keyboard event with a key code
    pub fn keyboard(event_type: &str, key_code: u32) -> Self {
        Self { key_code: Some(key_code), ..Self::new(event_type) }
    }

    pub fn with_bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    pub fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    pub fn with_composed(mut self, composed: bool) -> Self {
        self.composed = composed;
        self
    }

    /// Prevent default action
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    /// Stop propagation
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Stop propagation, including remaining listeners on the current target
    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    /// Check if default was prevented
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// The target as a node id, if it is a node
    pub fn target_node(&self) -> Option<NodeId> {
        match self.target {
            Some(EventTarget::Node(id)) => Some(id),
            _ => None,
        }
    }
}

/// Run the dispatch algorithm. No borrow of the document is held while a
/// listener runs, so listeners may mutate the DOM.
pub fn dispatch(doc: &RefCell<Document>, target: EventTarget, event: &mut DomEvent) -> bool {
    let path = doc.borrow().event_path(target);
    event.target = Some(target);
    tracing::trace!(event = %event.event_type, ?target, "dispatch");

    for current in path.iter().skip(1).rev() {
        invoke(doc, *current, event, EventPhase::Capturing);
        if event.propagation_stopped {
            return !event.default_prevented;
        }
    }

    invoke(doc, target, event, EventPhase::AtTarget);

    if event.bubbles {
        for current in path.iter().skip(1) {
            if event.propagation_stopped {
                break;
            }
            invoke(doc, *current, event, EventPhase::Bubbling);
        }
    }

    event.current_target = None;
    !event.default_prevented
}

fn invoke(doc: &RefCell<Document>, current: EventTarget, event: &mut DomEvent, phase: EventPhase) {
    let entries = doc.borrow().listeners_for(current, &event.event_type, phase);
    for entry in entries {
        // a listener may have been removed by an earlier one
        if !doc.borrow().has_listener(entry.id) {
            continue;
        }
        event.current_target = Some(current);
        event.in_passive_listener = entry.options.passive;
        (entry.callback)(event);
        event.in_passive_listener = false;
        if event.immediate_propagation_stopped {
            break;
        }
    }
}
