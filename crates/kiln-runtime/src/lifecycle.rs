//! Lifecycle Controller
//!
//! Drives each host through connect, bundle load, instance creation,
//! will-load, render, did-load and unload.
//!
//! Ordering rules:
//! - a child host never creates its instance before its nearest host
//!   ancestor has rendered once
//! - a host is "loaded" only after its own first render and after every
//!   descendant host registered with it has loaded
//! - updates are coalesced per host and run through the scheduler

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;
use kiln_dom::{Document, NodeId, Reaction};
use kiln_vdom::{h, PatchHooks, SlotContent, Tag, VNode};

use crate::component::Hook;
use crate::error::{ErrorKind, RuntimeError};
use crate::host::{HostRef, Instance};
use crate::metadata::{ComponentMeta, SlotMode};
use crate::platform::Platform;
use crate::registry::{ComponentModule, ModuleLoader, ModuleState};
use crate::scheduler::Priority;

/// Marks hosts inside relocated slot content as moving, so the detach and
/// reattach of the relocation does not unload them
struct RelocationHooks<'p> {
    hosts: &'p RefCell<HashMap<NodeId, HostRef>>,
    moved: Vec<NodeId>,
}

impl PatchHooks for RelocationHooks<'_> {
    fn relocation_started(&mut self, doc: &Document, nodes: &[NodeId]) {
        let mut hosts = self.hosts.borrow_mut();
        for node in nodes {
            for id in doc.tree().subtree(*node) {
                if let Some(host) = hosts.get_mut(&id) {
                    host.moving = true;
                    self.moved.push(id);
                }
            }
        }
    }
}

enum BundleStep {
    Ready,
    Waiting,
    Start(ModuleLoader),
    Missing,
}

impl Platform {
    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    /// Drain custom element reactions and slot mutation records
    pub(crate) fn process_reactions(&self) {
        loop {
            let reactions = self.doc.borrow_mut().take_reactions();
            if reactions.is_empty() {
                break;
            }
            for reaction in reactions {
                match reaction {
                    Reaction::Connected(elm) => self.connected(elm),
                    Reaction::Disconnected(elm) => self.disconnected(elm),
                    Reaction::AttributeChanged { element, name, old_value, new_value } => {
                        self.attribute_changed(element, &name, old_value.as_deref(), new_value.as_deref())
                    }
                }
            }
        }
        self.process_slot_records();
    }

    // ------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------

    pub(crate) fn connected(&self, elm: NodeId) {
        let tag = self.doc.borrow().tag_name(elm).map(str::to_string);
        let Some(tag) = tag else {
            return;
        };
        let meta = self.registry.borrow().meta(&tag);
        let Some(meta) = meta else {
            tracing::warn!(tag, "connected element has no registered component");
            return;
        };

        let generation = {
            let mut hosts = self.hosts.borrow_mut();
            let host = hosts
                .entry(elm)
                .or_insert_with(|| HostRef::new(Rc::clone(&meta), self.next_generation()));
            if host.connected {
                return;
            }
            host.connected = true;
            host.generation
        };
        tracing::debug!(tag, ?elm, "host connected");

        if meta.slot != SlotMode::None {
            self.capture_slot_content(elm);
        }
        self.attach_host_listeners(elm, &meta);
        self.register_with_ancestor(elm);

        let this = self.weak();
        self.add_task(
            Priority::High,
            Box::new(move || {
                if let Some(platform) = this.upgrade() {
                    platform.load_bundle(elm, generation);
                }
            }),
        );
    }

    /// Link `elm` to the nearest host ancestor that has not loaded yet
    fn register_with_ancestor(&self, elm: NodeId) {
        let mut current = self.doc.borrow().parent(elm);
        while let Some(node) = current {
            let loaded = self.hosts.borrow().get(&node).map(|h| h.has_loaded);
            match loaded {
                Some(true) => return,
                Some(false) => {
                    let mut hosts = self.hosts.borrow_mut();
                    if let Some(ancestor) = hosts.get_mut(&node) {
                        if !ancestor.active_loading.contains(&elm) {
                            ancestor.active_loading.push(elm);
                        }
                    }
                    if let Some(host) = hosts.get_mut(&elm) {
                        host.ancestor = Some(node);
                    }
                    return;
                }
                None => current = self.doc.borrow().parent(node),
            }
        }
    }

    /// Meta of a host still on generation `generation`
    pub(crate) fn live_meta(&self, elm: NodeId, generation: u64) -> Option<Rc<ComponentMeta>> {
        self.hosts
            .borrow()
            .get(&elm)
            .filter(|h| h.generation == generation)
            .map(|h| Rc::clone(&h.meta))
    }

    // ------------------------------------------------------------------
    // Bundle loading
    // ------------------------------------------------------------------

    pub(crate) fn load_bundle(&self, elm: NodeId, generation: u64) {
        let Some(meta) = self.live_meta(elm, generation) else {
            return;
        };
        let module_id = meta.module_id.clone();

        let step = {
            let mut guard = self.registry.borrow_mut();
            let registry = &mut *guard;
            match registry.modules.get_mut(&module_id) {
                Some(ModuleState::Loaded(_)) => BundleStep::Ready,
                Some(ModuleState::Loading(waiting)) => {
                    waiting.push((elm, generation));
                    BundleStep::Waiting
                }
                None => match registry.loaders.get(&module_id).cloned() {
                    Some(loader) => {
                        registry.modules.insert(module_id.clone(), ModuleState::Loading(vec![(elm, generation)]));
                        BundleStep::Start(loader)
                    }
                    None => BundleStep::Missing,
                },
            }
        };

        match step {
            BundleStep::Ready => self.queue_update(elm),
            BundleStep::Waiting => {}
            BundleStep::Start(loader) => self.start_module_load(&module_id, &loader),
            BundleStep::Missing => {
                let err = anyhow!(RuntimeError::UnknownModule(module_id));
                self.report(ErrorKind::LoadBundle, Some(elm), Some(&meta.tag), &err);
                self.propagate_loaded(elm);
            }
        }
    }

    fn start_module_load(&self, module_id: &str, loader: &ModuleLoader) {
        tracing::debug!(module = module_id, "loading component module");
        let future = loader();
        let module_id = module_id.to_string();
        self.spawn_local(future, move |platform, result| platform.module_loaded(&module_id, result));
    }

    fn module_loaded(&self, module_id: &str, result: anyhow::Result<ComponentModule>) {
        let waiting = match self.registry.borrow_mut().modules.remove(module_id) {
            Some(ModuleState::Loading(waiting)) => waiting,
            _ => Vec::new(),
        };
        match result {
            Ok(module) => {
                tracing::debug!(module = module_id, waiting = waiting.len(), "component module loaded");
                self.registry
                    .borrow_mut()
                    .modules
                    .insert(module_id.to_string(), ModuleState::Loaded(module));
                for (elm, generation) in waiting {
                    if self.live_meta(elm, generation).is_some() {
                        self.queue_update(elm);
                    }
                }
            }
            Err(err) => {
                // the state is dropped so a later connect retries the load
                for (elm, generation) in waiting {
                    if let Some(meta) = self.live_meta(elm, generation) {
                        self.report(ErrorKind::LoadBundle, Some(elm), Some(&meta.tag), &err);
                        self.propagate_loaded(elm);
                    }
                }
            }
        }
    }

    /// Start loading the module of `tag` without waiting for it
    pub(crate) fn preload_tag(&self, tag: &str) {
        let loader = {
            let mut guard = self.registry.borrow_mut();
            let registry = &mut *guard;
            let Some(meta) = registry.metas.get(tag) else {
                return;
            };
            let module_id = meta.module_id.clone();
            if registry.modules.contains_key(&module_id) {
                return;
            }
            let Some(loader) = registry.loaders.get(&module_id).cloned() else {
                return;
            };
            registry.modules.insert(module_id.clone(), ModuleState::Loading(Vec::new()));
            (module_id, loader)
        };
        self.start_module_load(&loader.0, &loader.1);
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Schedule an update of `elm`. Repeated calls before it runs coalesce.
    pub(crate) fn queue_update(&self, elm: NodeId) {
        let (priority, generation) = {
            let mut hosts = self.hosts.borrow_mut();
            let Some(host) = hosts.get_mut(&elm) else {
                return;
            };
            if host.queued {
                return;
            }
            host.queued = true;
            (host.meta.priority, host.generation)
        };
        let this = self.weak();
        self.add_task(
            priority,
            Box::new(move || {
                if let Some(platform) = this.upgrade() {
                    platform.update(elm, generation);
                }
            }),
        );
    }

    pub(crate) fn update(&self, elm: NodeId, generation: u64) {
        let state = self
            .hosts
            .borrow()
            .get(&elm)
            .filter(|h| h.generation == generation)
            .map(|h| (Rc::clone(&h.meta), h.instance.clone(), h.ancestor, h.suspended));
        let Some((meta, instance, ancestor, suspended)) = state else {
            return;
        };

        if suspended {
            if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                host.update_after_suspend = true;
                host.queued = false;
            }
            return;
        }

        let is_initial = instance.is_none();
        let instance = match instance {
            Some(instance) => instance,
            None => {
                if let Some(ancestor) = ancestor {
                    let ancestor_rendered = self.hosts.borrow().get(&ancestor).map(|h| h.has_rendered);
                    if ancestor_rendered == Some(false) {
                        // wait for the ancestor's first render
                        let mut hosts = self.hosts.borrow_mut();
                        if let Some(host) = hosts.get_mut(&elm) {
                            host.queued = false;
                        }
                        if let Some(parent) = hosts.get_mut(&ancestor) {
                            parent.on_render.push(elm);
                        }
                        tracing::trace!(?elm, ?ancestor, "deferring instance until ancestor renders");
                        return;
                    }
                }
                match self.init_instance(elm, &meta) {
                    Ok(instance) => instance,
                    Err(err) => {
                        self.report(ErrorKind::InitInstance, Some(elm), Some(&meta.tag), &err);
                        if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                            host.queued = false;
                        }
                        self.propagate_loaded(elm);
                        return;
                    }
                }
            }
        };

        let cx = self.cx(elm, &meta.tag);
        let hook = match instance.try_borrow_mut() {
            Ok(mut component) => {
                if is_initial {
                    component.will_load(&cx)
                } else {
                    component.will_update(&cx)
                }
            }
            Err(_) => {
                // the instance is running user code further up the stack
                if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                    host.queued = false;
                }
                self.queue_update(elm);
                return;
            }
        };

        let kind = if is_initial { ErrorKind::WillLoad } else { ErrorKind::WillUpdate };
        match hook {
            Ok(Hook::Ready) => self.render_pass(elm, generation, is_initial),
            Ok(Hook::Pending(future)) => {
                if let Some(host) = self.hosts.borrow_mut().get_mut(&elm) {
                    host.suspended = true;
                    host.queued = false;
                }
                tracing::trace!(?elm, "lifecycle suspended");
                self.spawn_local(future, move |platform, result| {
                    platform.resume(elm, generation, is_initial, result);
                });
            }
            Err(err) => {
                self.report(kind, Some(elm), Some(&meta.tag), &err);
                self.render_pass(elm, generation, is_initial);
            }
        }
    }

    fn resume(&self, elm: NodeId, generation: u64, is_initial: bool, result: anyhow::Result<()>) {
        let replay = {
            let mut hosts = self.hosts.borrow_mut();
            let Some(host) = hosts.get_mut(&elm).filter(|h| h.generation == generation) else {
                return;
            };
            host.suspended = false;
            std::mem::take(&mut host.update_after_suspend)
        };
        if let Err(err) = result {
            let kind = if is_initial { ErrorKind::WillLoad } else { ErrorKind::WillUpdate };
            let tag = self.host_meta(elm).map(|m| m.tag.clone());
            self.report(kind, Some(elm), tag.as_deref(), &err);
        }
        self.render_pass(elm, generation, is_initial);
        if replay {
            self.queue_update(elm);
        }
    }

    fn init_instance(&self, elm: NodeId, meta: &ComponentMeta) -> anyhow::Result<Instance> {
        let definition = self
            .registry
            .borrow()
            .definition(meta)
            .ok_or_else(|| anyhow!("module '{}' does not define <{}>", meta.module_id, meta.tag))?;
        let component = definition.instantiate()?;
        self.init_members(elm, meta);

        let instance: Instance = Rc::new(RefCell::new(component));
        let queued_events = {
            let mut hosts = self.hosts.borrow_mut();
            let host = hosts.get_mut(&elm).ok_or(RuntimeError::NotAHost(elm))?;
            host.instance = Some(Rc::clone(&instance));
            std::mem::take(&mut host.queued_events)
        };
        tracing::debug!(tag = %meta.tag, ?elm, "instance created");

        for (method, mut event) in queued_events {
            if let Err(err) = self.invoke_listener(elm, &method, &mut event) {
                self.report(ErrorKind::QueueEvents, Some(elm), Some(&meta.tag), &err);
            }
        }
        Ok(instance)
    }

    // ------------------------------------------------------------------
    // Render
    // ------------------------------------------------------------------

    fn render_pass(&self, elm: NodeId, generation: u64, is_initial: bool) {
        let prepared = {
            let mut hosts = self.hosts.borrow_mut();
            let Some(host) = hosts.get_mut(&elm).filter(|h| h.generation == generation) else {
                return;
            };
            let Some(instance) = host.instance.clone() else {
                return;
            };
            host.queued = false;
            host.rendering = true;
            (instance, Rc::clone(&host.meta), host.observer, host.vnode.take(), host.slot_content.clone())
        };
        let (instance, meta, observer, old_vnode, slot_content) = prepared;

        if let Some(observer) = observer {
            self.doc.borrow_mut().disconnect_observer(observer);
        }
        if is_initial {
            self.attach_styles(&meta);
        }

        let cx = self.cx(elm, &meta.tag);
        let rendered = match instance.try_borrow_mut() {
            Ok(mut component) => component.render(&cx).map(|children| (component.host_data(&cx), children)),
            Err(_) => Err(anyhow!(RuntimeError::Busy)),
        };

        let mut vnode = old_vnode;
        let mut moved = Vec::new();
        match rendered {
            Ok((host_data, children)) => {
                let root = h(Tag::Fragment, host_data, children);
                let old = vnode.take().unwrap_or_else(|| VNode::from_element(elm));
                let ssr_id = (is_initial && self.config.server_render).then(|| self.next_ssr_id());
                let mut hooks = RelocationHooks { hosts: &self.hosts, moved: Vec::new() };
                let patched = {
                    let mut doc = self.doc.borrow_mut();
                    kiln_vdom::patch(&mut doc, &mut hooks, old, root, !is_initial, slot_content.as_ref(), ssr_id)
                };
                vnode = Some(patched);
                moved = hooks.moved;
            }
            Err(err) => self.report(ErrorKind::Render, Some(elm), Some(&meta.tag), &err),
        }

        let on_render = {
            let mut hosts = self.hosts.borrow_mut();
            match hosts.get_mut(&elm) {
                Some(host) => {
                    host.vnode = vnode;
                    host.rendering = false;
                    host.has_rendered = true;
                    std::mem::take(&mut host.on_render)
                }
                None => Vec::new(),
            }
        };

        self.reflect_attributes(elm, &meta);
        if let Some(observer) = observer {
            self.doc.borrow_mut().observe(observer, elm);
        }
        self.process_reactions();
        {
            let mut hosts = self.hosts.borrow_mut();
            for id in moved {
                if let Some(host) = hosts.get_mut(&id) {
                    host.moving = false;
                }
            }
        }
        tracing::trace!(tag = %meta.tag, ?elm, is_initial, "rendered");

        for child in on_render {
            self.queue_update(child);
        }

        if is_initial {
            self.check_loaded(elm);
        } else {
            let result = match instance.try_borrow_mut() {
                Ok(mut component) => component.did_update(&cx),
                Err(_) => Err(anyhow!(RuntimeError::Busy)),
            };
            if let Err(err) = result {
                self.report(ErrorKind::DidUpdate, Some(elm), Some(&meta.tag), &err);
            }
        }
    }

    /// Attach the component stylesheet once per document
    fn attach_styles(&self, meta: &ComponentMeta) {
        let Some(style_id) = meta.style_for_mode(self.config.style_mode.as_deref()) else {
            return;
        };
        let css = {
            let mut registry = self.registry.borrow_mut();
            if registry.attached_styles.contains(style_id) {
                return;
            }
            let Some(css) = registry.styles.get(style_id).cloned() else {
                tracing::warn!(tag = %meta.tag, style_id, "style id has no registered text");
                return;
            };
            registry.attached_styles.insert(style_id.to_string());
            css
        };

        let mut doc = self.doc.borrow_mut();
        let head = doc.head();
        let style = doc.create_element("style");
        doc.set_attribute(style, "data-styles", style_id);
        let text = doc.create_text(&css);
        doc.append_child(style, text);
        doc.append_child(head, style);
    }

    // ------------------------------------------------------------------
    // Load propagation
    // ------------------------------------------------------------------

    /// Mark `elm` loaded once it has rendered and no descendant is pending
    pub(crate) fn check_loaded(&self, elm: NodeId) {
        let ready = {
            let mut hosts = self.hosts.borrow_mut();
            let Some(host) = hosts.get_mut(&elm) else {
                return;
            };
            if host.has_loaded || !host.has_rendered || !host.active_loading.is_empty() {
                return;
            }
            let Some(instance) = host.instance.clone() else {
                return;
            };
            host.has_loaded = true;
            (instance, Rc::clone(&host.meta))
        };
        let (instance, meta) = ready;
        tracing::debug!(tag = %meta.tag, ?elm, "host loaded");

        let cx = self.cx(elm, &meta.tag);
        let result = match instance.try_borrow_mut() {
            Ok(mut component) => component.did_load(&cx),
            Err(_) => Err(anyhow!(RuntimeError::Busy)),
        };
        if let Err(err) = result {
            self.report(ErrorKind::DidLoad, Some(elm), Some(&meta.tag), &err);
        }

        let callbacks = self
            .hosts
            .borrow_mut()
            .get_mut(&elm)
            .map(|h| std::mem::take(&mut h.on_ready))
            .unwrap_or_default();
        for callback in callbacks {
            callback(elm);
        }

        self.doc.borrow_mut().add_class(elm, &self.config.hydrated_class);
        self.propagate_loaded(elm);
    }

    /// Remove `elm` from its ancestor's pending set; the ancestor may now
    /// finish loading
    pub(crate) fn propagate_loaded(&self, elm: NodeId) {
        let ancestor = self.hosts.borrow_mut().get_mut(&elm).and_then(|h| h.ancestor.take());
        let Some(ancestor) = ancestor else {
            return;
        };
        let ancestor_ready = {
            let mut hosts = self.hosts.borrow_mut();
            match hosts.get_mut(&ancestor) {
                Some(parent) => {
                    parent.active_loading.retain(|id| *id != elm);
                    parent.active_loading.is_empty()
                }
                None => false,
            }
        };
        if ancestor_ready {
            self.check_loaded(ancestor);
        }
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    pub(crate) fn disconnected(&self, elm: NodeId) {
        let skip = match self.hosts.borrow().get(&elm) {
            None => true,
            Some(host) => host.moving || !host.connected,
        };
        if skip || self.doc.borrow().is_connected(elm) {
            return;
        }

        self.propagate_loaded(elm);

        let unload = self.hosts.borrow().get(&elm).map(|h| (h.instance.clone(), Rc::clone(&h.meta)));
        if let Some((Some(instance), meta)) = unload {
            let cx = self.cx(elm, &meta.tag);
            let result = match instance.try_borrow_mut() {
                Ok(mut component) => component.did_unload(&cx),
                Err(_) => Err(anyhow!(RuntimeError::Busy)),
            };
            if let Err(err) = result {
                self.report(ErrorKind::DidUnload, Some(elm), Some(&meta.tag), &err);
            }
        }

        let removed = self.hosts.borrow_mut().remove(&elm);
        let Some(host) = removed else {
            return;
        };
        {
            let mut doc = self.doc.borrow_mut();
            for listener in &host.listeners {
                if let Some(id) = listener.id {
                    doc.remove_event_listener(id);
                }
            }
            if let Some(observer) = host.observer {
                doc.remove_observer(observer);
            }
            if let Some(vnode) = &host.vnode {
                kiln_vdom::destroy(&mut doc, vnode);
                restore_light_dom(&mut doc, elm, vnode, host.slot_content.as_ref());
            }
        }
        for other in self.hosts.borrow_mut().values_mut() {
            if other.ancestor == Some(elm) {
                other.ancestor = None;
            }
        }
        tracing::debug!(tag = %host.meta.tag, ?elm, "host disconnected");
    }
}

/// Put a detached host back in its pre-render shape: rendered children
/// are removed and captured slot content becomes its children again, so a
/// reconnect renders from scratch
fn restore_light_dom(doc: &mut Document, elm: NodeId, vnode: &VNode, slot_content: Option<&SlotContent>) {
    for child in vnode.children().iter().filter_map(VNode::elm) {
        if doc.parent(child) == Some(elm) {
            doc.remove(child);
        }
    }
    if let Some(content) = slot_content {
        for node in content.all() {
            if doc.parent(node) != Some(elm) {
                doc.append_child(elm, node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use serde_json::json;

    #[test]
    fn test_moving_host_ignores_disconnect() {
        let platform = Platform::new(RuntimeConfig::default());
        platform.register_component(&json!(["x-moved", "m"])).unwrap();
        let elm = platform.with_dom(|doc| {
            let elm = doc.create_element("x-moved");
            let body = doc.body();
            doc.append_child(body, elm);
            elm
        });
        assert!(platform.host_state(elm).unwrap().connected);

        platform.hosts.borrow_mut().get_mut(&elm).unwrap().moving = true;
        platform.with_dom(|doc| doc.remove(elm));
        assert!(platform.is_host(elm));

        platform.hosts.borrow_mut().get_mut(&elm).unwrap().moving = false;
        platform.disconnected(elm);
        assert!(!platform.is_host(elm));
    }

    #[test]
    fn test_stale_generation_task_is_dropped() {
        let platform = Platform::new(RuntimeConfig::default());
        platform.register_component(&json!(["x-stale", "m"])).unwrap();
        let elm = platform.with_dom(|doc| {
            let elm = doc.create_element("x-stale");
            let body = doc.body();
            doc.append_child(body, elm);
            elm
        });
        let generation = platform.hosts.borrow().get(&elm).unwrap().generation;
        platform.update(elm, generation + 100);
        assert!(!platform.host_state(elm).unwrap().has_instance);
        assert!(platform.take_diagnostics().is_empty());
    }
}
