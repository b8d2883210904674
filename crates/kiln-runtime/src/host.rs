//! Host Elements
//!
//! Runtime state of each element that hosts a component lives in a side
//! table keyed by `NodeId` rather than on the DOM node itself.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use kiln_dom::{DomEvent, ListenerId, NodeId, ObserverId};
use kiln_vdom::{SlotContent, VNode};
use serde_json::Value;

use crate::component::Component;
use crate::error::RuntimeError;
use crate::metadata::ComponentMeta;
use crate::platform::Platform;
use crate::reactive::ValueStore;

/// Callback run once a host has fully loaded
pub type ReadyCallback = Box<dyn FnOnce(NodeId)>;

pub(crate) type Instance = Rc<RefCell<Box<dyn Component>>>;

/// A declarative listener attached for a host
pub(crate) struct HostListener {
    pub event_name: String,
    pub id: Option<ListenerId>,
}

/// Per-element runtime record
pub(crate) struct HostRef {
    pub meta: Rc<ComponentMeta>,
    /// Bumped on every new record; stale tasks compare against it
    pub generation: u64,
    pub connected: bool,
    pub has_rendered: bool,
    pub has_loaded: bool,
    /// An update is scheduled and not yet started
    pub queued: bool,
    pub rendering: bool,
    /// A will-load / will-update future is pending
    pub suspended: bool,
    pub update_after_suspend: bool,
    /// Being relocated into a slot; disconnect reactions are ignored
    pub moving: bool,
    /// Nearest host ancestor that waits for this host to load
    pub ancestor: Option<NodeId>,
    /// Descendant hosts that have not loaded yet
    pub active_loading: Vec<NodeId>,
    pub slot_content: Option<SlotContent>,
    pub observer: Option<ObserverId>,
    /// Listener events that arrived before the instance existed
    pub queued_events: Vec<(String, DomEvent)>,
    pub on_ready: Vec<ReadyCallback>,
    /// Child hosts waiting for this host's first render
    pub on_render: Vec<NodeId>,
    pub values: ValueStore,
    pub instance: Option<Instance>,
    pub vnode: Option<VNode>,
    pub listeners: Vec<HostListener>,
}

impl HostRef {
    pub fn new(meta: Rc<ComponentMeta>, generation: u64) -> Self {
        Self {
            meta,
            generation,
            connected: false,
            has_rendered: false,
            has_loaded: false,
            queued: false,
            rendering: false,
            suspended: false,
            update_after_suspend: false,
            moving: false,
            ancestor: None,
            active_loading: Vec::new(),
            slot_content: None,
            observer: None,
            queued_events: Vec::new(),
            on_ready: Vec::new(),
            on_render: Vec::new(),
            values: ValueStore::default(),
            instance: None,
            vnode: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> HostState {
        HostState {
            tag: self.meta.tag.clone(),
            connected: self.connected,
            has_instance: self.instance.is_some(),
            has_rendered: self.has_rendered,
            has_loaded: self.has_loaded,
            queued: self.queued,
            suspended: self.suspended,
            moving: self.moving,
            ancestor: self.ancestor,
            active_loading: self.active_loading.clone(),
        }
    }
}

/// Snapshot of a host's lifecycle flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostState {
    pub tag: String,
    pub connected: bool,
    pub has_instance: bool,
    pub has_rendered: bool,
    pub has_loaded: bool,
    pub queued: bool,
    pub suspended: bool,
    pub moving: bool,
    pub ancestor: Option<NodeId>,
    pub active_loading: Vec<NodeId>,
}

/// Custom element callbacks of a host
///
/// The platform invokes these itself when it processes document
/// reactions. Embedders that track element lifetimes on their own can
/// drive a host directly through this trait.
pub trait LifecycleHost {
    fn connected_callback(&self);
    fn disconnected_callback(&self);
    fn attribute_changed_callback(&self, name: &str, old_value: Option<&str>, new_value: Option<&str>);
    fn component_on_ready(&self, callback: ReadyCallback) -> Result<(), RuntimeError>;
}

/// Handle to one host element
#[derive(Clone)]
pub struct HostElement {
    platform: Rc<Platform>,
    elm: NodeId,
}

impl HostElement {
    pub fn new(platform: &Rc<Platform>, elm: NodeId) -> Self {
        Self { platform: Rc::clone(platform), elm }
    }

    pub fn elm(&self) -> NodeId {
        self.elm
    }

    pub fn prop(&self, member: &str) -> Result<Value, RuntimeError> {
        self.platform.get_prop(self.elm, member)
    }

    pub fn set_prop(&self, member: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        self.platform.set_prop(self.elm, member, value)
    }

    /// Call a public method once the host has loaded
    pub fn call_method(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: impl FnOnce(anyhow::Result<Value>) + 'static,
    ) -> Result<(), RuntimeError> {
        self.platform.call_method(self.elm, method, args, callback)
    }

    /// Resolves when the host has loaded
    pub fn ready(&self) -> impl Future<Output = Result<NodeId, RuntimeError>> + use<> {
        self.platform.ready(self.elm)
    }

    pub fn state(&self) -> Option<HostState> {
        self.platform.host_state(self.elm)
    }
}

impl LifecycleHost for HostElement {
    fn connected_callback(&self) {
        self.platform.connected(self.elm);
    }

    fn disconnected_callback(&self) {
        self.platform.disconnected(self.elm);
    }

    fn attribute_changed_callback(&self, name: &str, old_value: Option<&str>, new_value: Option<&str>) {
        self.platform.attribute_changed(self.elm, name, old_value, new_value);
    }

    fn component_on_ready(&self, callback: ReadyCallback) -> Result<(), RuntimeError> {
        self.platform.component_on_ready(self.elm, callback)
    }
}
