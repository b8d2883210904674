//! Platform
//!
//! One runtime instance bound to one document: host side table,
//! registry, scheduler, executor and diagnostics. Nothing is
//! process-global, so platforms for different documents coexist.
//!
//! All state sits behind separate `RefCell`s and no borrow is held while
//! component code runs, so hooks may call back into the platform.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use kiln_dom::{Document, DomEvent, EventTarget, NodeId};
use serde_json::Value;
use smol::LocalExecutor;

use crate::component::{Cx, LocalFuture};
use crate::config::RuntimeConfig;
use crate::error::{Diagnostic, Diagnostics, ErrorKind, RuntimeError};
use crate::host::{HostRef, HostState, Instance};
use crate::metadata::ComponentMeta;
use crate::registry::{ComponentModule, EventMeta, Registry};
use crate::scheduler::{self, Priority, Task, TaskQueue};

/// Component runtime
pub struct Platform {
    pub(crate) config: RuntimeConfig,
    pub(crate) doc: RefCell<Document>,
    pub(crate) hosts: RefCell<HashMap<NodeId, HostRef>>,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) queue: RefCell<TaskQueue>,
    pub(crate) executor: LocalExecutor<'static>,
    diagnostics: RefCell<Diagnostics>,
    context: RefCell<HashMap<String, Value>>,
    next_generation: Cell<u64>,
    next_ssr_id: Cell<u32>,
    this: Weak<Platform>,
}

impl Platform {
    /// Create a platform over a fresh `html/head/body` document
    pub fn new(config: RuntimeConfig) -> Rc<Self> {
        Self::with_document(config, Document::new())
    }

    pub fn with_document(config: RuntimeConfig, doc: Document) -> Rc<Self> {
        tracing::info!("kiln runtime {} initialized", crate::VERSION);
        Rc::new_cyclic(|this| Self {
            diagnostics: RefCell::new(Diagnostics::new(config.max_diagnostics)),
            config,
            doc: RefCell::new(doc),
            hosts: RefCell::new(HashMap::new()),
            registry: RefCell::new(Registry::default()),
            queue: RefCell::new(TaskQueue::new()),
            executor: LocalExecutor::new(),
            context: RefCell::new(HashMap::new()),
            next_generation: Cell::new(1),
            next_ssr_id: Cell::new(0),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Read access to the document
    ///
    /// Panics if called while the platform is mutating the document, which
    /// only happens inside `with_dom` closures.
    pub fn document(&self) -> Ref<'_, Document> {
        self.doc.borrow()
    }

    /// Mutate the document, then process the custom element reactions and
    /// slot mutations it caused
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let result = f(&mut self.doc.borrow_mut());
        self.process_reactions();
        result
    }

    /// Dispatch an event. Returns false if a listener cancelled it.
    pub fn dispatch_event(&self, target: impl Into<EventTarget>, event: &mut DomEvent) -> bool {
        let result = kiln_dom::dispatch(&self.doc, target.into(), event);
        self.process_reactions();
        result
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register the loader of a module id
    pub fn define_module<F, Fut>(&self, module_id: &str, loader: F)
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<ComponentModule>> + 'static,
    {
        let loader = Rc::new(move || -> LocalFuture<anyhow::Result<ComponentModule>> { Box::pin(loader()) });
        self.registry.borrow_mut().loaders.insert(module_id.to_string(), loader);
    }

    /// Register a component from its compact metadata tuple and upgrade
    /// matching elements already in the document
    pub fn register_component(&self, metadata: &Value) -> Result<Rc<ComponentMeta>, RuntimeError> {
        let meta = Rc::new(ComponentMeta::decode(metadata)?);
        self.doc
            .borrow_mut()
            .custom_elements_mut()
            .define(&meta.tag, &meta.observed_attributes())?;
        self.registry.borrow_mut().metas.insert(meta.tag.clone(), Rc::clone(&meta));
        tracing::debug!(tag = %meta.tag, module = %meta.module_id, "component registered");

        let existing: Vec<NodeId> = {
            let doc = self.doc.borrow();
            doc.descendants(doc.root())
                .into_iter()
                .filter(|id| doc.tag_name(*id) == Some(meta.tag.as_str()))
                .collect()
        };
        for elm in existing {
            self.connected(elm);
        }
        self.process_reactions();
        Ok(meta)
    }

    /// Register style text under a style id
    pub fn define_style(&self, style_id: &str, css: &str) {
        self.registry.borrow_mut().styles.insert(style_id.to_string(), css.to_string());
    }

    /// Value injected into context members
    pub fn set_context(&self, key: &str, value: impl Into<Value>) {
        self.context.borrow_mut().insert(key.to_string(), value.into());
    }

    pub(crate) fn context_value(&self, key: &str) -> Option<Value> {
        self.context.borrow().get(key).cloned()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run scheduled ticks and resolved futures until nothing is ready
    pub fn run_until_idle(&self) {
        while self.executor.try_tick() {}
    }

    /// Drive `future` to completion on this platform's executor
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.executor.run(future))
    }

    /// Flush the update queue synchronously
    pub fn flush_now(&self) {
        if scheduler::flush(&self.queue) {
            self.request_tick();
        }
    }

    pub fn pending_tasks(&self) -> usize {
        let queue = self.queue.borrow();
        [Priority::High, Priority::Normal, Priority::Low]
            .into_iter()
            .map(|p| queue.len(p))
            .sum()
    }

    pub(crate) fn add_task(&self, priority: Priority, task: Task) {
        let needs_tick = self.queue.borrow_mut().push(task, priority);
        if needs_tick {
            self.request_tick();
        }
    }

    fn request_tick(&self) {
        let this = self.this.clone();
        self.executor
            .spawn(async move {
                if let Some(platform) = this.upgrade() {
                    platform.flush_now();
                }
            })
            .detach();
    }

    /// Run `future` on the executor, then `then` with the platform if it
    /// is still alive
    pub(crate) fn spawn_local<T: 'static>(
        &self,
        future: impl Future<Output = T> + 'static,
        then: impl FnOnce(&Platform, T) + 'static,
    ) {
        let this = self.this.clone();
        self.executor
            .spawn(async move {
                let output = future.await;
                if let Some(platform) = this.upgrade() {
                    then(&platform, output);
                }
            })
            .detach();
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().snapshot()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow_mut().take()
    }

    pub(crate) fn report(&self, kind: ErrorKind, elm: Option<NodeId>, tag: Option<&str>, error: &anyhow::Error) {
        self.diagnostics.borrow_mut().push(Diagnostic::new(kind, tag, elm, error));
    }

    // ------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------

    pub fn host_state(&self, elm: NodeId) -> Option<HostState> {
        self.hosts.borrow().get(&elm).map(HostRef::state)
    }

    pub fn is_host(&self, elm: NodeId) -> bool {
        self.hosts.borrow().contains_key(&elm)
    }

    pub(crate) fn host_meta(&self, elm: NodeId) -> Option<Rc<ComponentMeta>> {
        self.hosts.borrow().get(&elm).map(|h| Rc::clone(&h.meta))
    }

    pub(crate) fn instance(&self, elm: NodeId) -> Option<Instance> {
        self.hosts.borrow().get(&elm)?.instance.clone()
    }

    /// Host record of `elm`, created for a registered tag when missing
    pub(crate) fn ensure_host(&self, elm: NodeId) -> Result<Rc<ComponentMeta>, RuntimeError> {
        if let Some(meta) = self.host_meta(elm) {
            return Ok(meta);
        }
        let tag = self
            .doc
            .borrow()
            .tag_name(elm)
            .map(str::to_string)
            .ok_or(RuntimeError::NotAHost(elm))?;
        let meta = self.registry.borrow().meta(&tag).ok_or(RuntimeError::UnknownTag(tag))?;
        let record = HostRef::new(Rc::clone(&meta), self.next_generation());
        self.hosts.borrow_mut().insert(elm, record);
        Ok(meta)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        let generation = self.next_generation.get();
        self.next_generation.set(generation + 1);
        generation
    }

    pub(crate) fn next_ssr_id(&self) -> u32 {
        let id = self.next_ssr_id.get();
        self.next_ssr_id.set(id + 1);
        id
    }

    pub(crate) fn cx(&self, elm: NodeId, tag: &str) -> Cx {
        Cx::new(self.this.clone(), elm, tag)
    }

    pub(crate) fn weak(&self) -> Weak<Platform> {
        self.this.clone()
    }

    // ------------------------------------------------------------------
    // Public host API
    // ------------------------------------------------------------------

    /// Run `callback` once `elm` has loaded, right away if it already has.
    /// Elements of a registered tag are accepted before they connect.
    pub fn component_on_ready(
        &self,
        elm: NodeId,
        callback: impl FnOnce(NodeId) + 'static,
    ) -> Result<(), RuntimeError> {
        self.ensure_host(elm)?;
        let mut hosts = self.hosts.borrow_mut();
        let host = hosts.get_mut(&elm).ok_or(RuntimeError::NotAHost(elm))?;
        if host.has_loaded {
            drop(hosts);
            callback(elm);
        } else {
            host.on_ready.push(Box::new(callback));
        }
        Ok(())
    }

    /// Resolves when `elm` has loaded, or fails if it is disconnected first
    pub fn ready(&self, elm: NodeId) -> impl Future<Output = Result<NodeId, RuntimeError>> + use<> {
        let (tx, rx) = smol::channel::bounded(1);
        let registered = self.component_on_ready(elm, move |elm| {
            let _ = tx.try_send(elm);
        });
        async move {
            registered?;
            rx.recv().await.map_err(|_| RuntimeError::Disconnected(elm))
        }
    }

    /// Call a public method. The call waits for the host to load; the
    /// outcome is handed to `callback`.
    pub fn call_method(
        &self,
        elm: NodeId,
        method: &str,
        args: Vec<Value>,
        callback: impl FnOnce(anyhow::Result<Value>) + 'static,
    ) -> Result<(), RuntimeError> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        if !meta.member(method).is_some_and(|m| m.kind == crate::metadata::MemberKind::Method) {
            return Err(RuntimeError::UnknownMember { tag: meta.tag.clone(), member: method.to_string() });
        }
        let this = self.weak();
        let method = method.to_string();
        self.component_on_ready(elm, move |elm| {
            let result = match this.upgrade() {
                Some(platform) => platform.invoke_method(elm, &method, &args),
                None => Err(RuntimeError::Dropped.into()),
            };
            callback(result);
        })
    }

    fn invoke_method(&self, elm: NodeId, method: &str, args: &[Value]) -> anyhow::Result<Value> {
        let meta = self.host_meta(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let instance = self.instance(elm).ok_or(RuntimeError::NotAHost(elm))?;
        let cx = self.cx(elm, &meta.tag);
        let mut component = instance.try_borrow_mut().map_err(|_| RuntimeError::Busy)?;
        component.call(method, args, &cx)
    }

    /// Emit a custom event from a host using its declared event options
    pub(crate) fn emit(&self, elm: NodeId, name: &str, detail: Value) -> bool {
        let declared = self.event_meta(elm, name);
        let options = declared.unwrap_or_else(|| EventMeta::new(name));
        let mut event = DomEvent::custom(name, detail)
            .with_bubbles(options.bubbles)
            .with_cancelable(options.cancelable)
            .with_composed(options.composed);
        tracing::trace!(?elm, event = name, "emitting event");
        self.dispatch_event(elm, &mut event)
    }

    fn event_meta(&self, elm: NodeId, name: &str) -> Option<EventMeta> {
        let meta = self.host_meta(elm)?;
        let definition = self.registry.borrow().definition(&meta)?;
        definition.events().iter().find(|e| e.name == name).cloned()
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("config", &self.config)
            .field("hosts", &self.hosts.borrow().len())
            .field("queue", &*self.queue.borrow())
            .finish()
    }
}
