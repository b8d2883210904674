//! Component Contract
//!
//! User components implement `Component`. Every hook has a default so a
//! component only overrides what it needs; `render` is the one required
//! method. Hooks receive a `Cx` handle for reading and writing reactive
//! members, emitting events and touching the document.

use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};

use kiln_dom::{Document, DomEvent, NodeId};
use kiln_vdom::{Child, VData};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RuntimeError;
use crate::platform::Platform;
use crate::reactive::WatchPhase;

/// Boxed non-`Send` future
pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Result of a will-load / will-update hook
pub enum Hook {
    /// Continue to render right away
    Ready,
    /// Render once the future resolves
    Pending(LocalFuture<anyhow::Result<()>>),
}

impl Hook {
    /// Suspend the lifecycle until `future` completes
    pub fn wait(future: impl Future<Output = anyhow::Result<()>> + 'static) -> Self {
        Hook::Pending(Box::pin(future))
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Ready => f.write_str("Ready"),
            Hook::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A user component
pub trait Component {
    /// Children of the host element
    fn render(&mut self, cx: &Cx) -> anyhow::Result<Vec<Child>>;

    /// Attributes, classes and listeners applied to the host element itself
    fn host_data(&self, _cx: &Cx) -> Option<VData> {
        None
    }

    fn will_load(&mut self, _cx: &Cx) -> anyhow::Result<Hook> {
        Ok(Hook::Ready)
    }

    fn did_load(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        Ok(())
    }

    fn will_update(&mut self, _cx: &Cx) -> anyhow::Result<Hook> {
        Ok(Hook::Ready)
    }

    fn did_update(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        Ok(())
    }

    fn did_unload(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        Ok(())
    }

    /// Declarative listener dispatch by method name
    fn handle_event(&mut self, method: &str, _event: &mut DomEvent, _cx: &Cx) -> anyhow::Result<()> {
        anyhow::bail!("no listener method '{method}'")
    }

    /// Public method dispatch by name
    fn call(&mut self, method: &str, _args: &[Value], _cx: &Cx) -> anyhow::Result<Value> {
        anyhow::bail!("no public method '{method}'")
    }
}

/// Handle given to component code
///
/// Holds only a weak reference to the platform: every operation is a no-op
/// (or `RuntimeError::Dropped`) once the platform is gone.
#[derive(Clone)]
pub struct Cx {
    platform: Weak<Platform>,
    elm: NodeId,
    tag: Rc<str>,
}

impl Cx {
    pub(crate) fn new(platform: Weak<Platform>, elm: NodeId, tag: &str) -> Self {
        Self { platform, elm, tag: Rc::from(tag) }
    }

    /// The host element
    pub fn elm(&self) -> NodeId {
        self.elm
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Current value of a member, `Null` when unset
    pub fn get(&self, member: &str) -> Value {
        self.platform
            .upgrade()
            .and_then(|p| p.value(self.elm, member))
            .unwrap_or(Value::Null)
    }

    /// Typed read of a member
    pub fn get_as<T: DeserializeOwned>(&self, member: &str) -> Option<T> {
        serde_json::from_value(self.get(member)).ok()
    }

    /// Write a mutable prop or a state member
    pub fn set(&self, member: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        let platform = self.platform.upgrade().ok_or(RuntimeError::Dropped)?;
        platform.set_from_instance(self.elm, member, value.into())
    }

    /// Emit a custom event from the host. Returns false if a listener
    /// cancelled it.
    pub fn emit(&self, event: &str, detail: impl Into<Value>) -> bool {
        match self.platform.upgrade() {
            Some(platform) => platform.emit(self.elm, event, detail.into()),
            None => false,
        }
    }

    /// Register a watcher called with `(new, old)`
    pub fn watch(&self, member: &str, phase: WatchPhase, watcher: impl Fn(&Value, &Value) + 'static) {
        if let Some(platform) = self.platform.upgrade() {
            platform.watch(self.elm, member, phase, Rc::new(watcher));
        }
    }

    /// Value registered under `key` in the platform context
    pub fn context(&self, key: &str) -> Value {
        self.platform
            .upgrade()
            .and_then(|p| p.context_value(key))
            .unwrap_or(Value::Null)
    }

    /// Schedule a render without changing any member
    pub fn force_update(&self) {
        if let Some(platform) = self.platform.upgrade() {
            platform.queue_update(self.elm);
        }
    }

    /// Read the document
    pub fn dom<R>(&self, f: impl FnOnce(&Document) -> R) -> Option<R> {
        let platform = self.platform.upgrade()?;
        let doc = platform.doc.try_borrow().ok()?;
        Some(f(&doc))
    }

    /// Mutate the document. Custom element reactions raised by `f` are
    /// processed before this returns.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut Document) -> R) -> Option<R> {
        let platform = self.platform.upgrade()?;
        Some(platform.with_dom(f))
    }
}

impl std::fmt::Debug for Cx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cx").field("elm", &self.elm).field("tag", &self.tag).finish()
    }
}
