//! Shared helpers for runtime integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use kiln_runtime::dom::{DomEvent, NodeId};
use kiln_runtime::vdom::Child;
use kiln_runtime::{Component, ComponentDefinition, ComponentModule, Cx, Hook, Platform, RuntimeConfig};
use tracing_subscriber::EnvFilter;

pub type Log = Rc<RefCell<Vec<String>>>;
pub type View = Rc<dyn Fn(&Cx) -> anyhow::Result<Vec<Child>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn platform() -> Rc<Platform> {
    platform_with(RuntimeConfig::default())
}

pub fn platform_with(config: RuntimeConfig) -> Rc<Platform> {
    init_tracing();
    Platform::new(config)
}

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Index of `entry` in the log, panicking when it is missing
pub fn position(log: &Log, entry: &str) -> usize {
    log.borrow()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("'{entry}' not in {:?}", log.borrow()))
}

pub fn count(log: &Log, entry: &str) -> usize {
    log.borrow().iter().filter(|e| *e == entry).count()
}

/// Append a new `tag` element under `parent` (the body by default)
pub fn mount(platform: &Platform, parent: Option<NodeId>, tag: &str) -> NodeId {
    platform.with_dom(|doc| {
        let elm = doc.create_element(tag);
        let parent = parent.unwrap_or_else(|| doc.body());
        doc.append_child(parent, elm);
        elm
    })
}

/// Module resolved on the first executor poll
pub fn sync_module(platform: &Platform, module_id: &str, module: ComponentModule) {
    platform.define_module(module_id, move || {
        let module = module.clone();
        async move { Ok(module) }
    });
}

/// Module that resolves once the returned sender fires
pub fn gated_module(platform: &Platform, module_id: &str, module: ComponentModule) -> smol::channel::Sender<()> {
    let (tx, rx) = smol::channel::bounded::<()>(1);
    platform.define_module(module_id, move || {
        let module = module.clone();
        let rx = rx.clone();
        async move {
            let _ = rx.recv().await;
            Ok(module)
        }
    });
    tx
}

/// Component recording each hook as `name:hook`
pub struct Probe {
    name: String,
    log: Log,
    view: View,
}

impl Probe {
    fn record(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{}:{hook}", self.name));
    }
}

impl Component for Probe {
    fn render(&mut self, cx: &Cx) -> anyhow::Result<Vec<Child>> {
        self.record("render");
        (self.view)(cx)
    }

    fn will_load(&mut self, _cx: &Cx) -> anyhow::Result<Hook> {
        self.record("will_load");
        Ok(Hook::Ready)
    }

    fn did_load(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        self.record("did_load");
        Ok(())
    }

    fn will_update(&mut self, _cx: &Cx) -> anyhow::Result<Hook> {
        self.record("will_update");
        Ok(Hook::Ready)
    }

    fn did_update(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        self.record("did_update");
        Ok(())
    }

    fn did_unload(&mut self, _cx: &Cx) -> anyhow::Result<()> {
        self.record("did_unload");
        Ok(())
    }

    fn handle_event(&mut self, method: &str, event: &mut DomEvent, _cx: &Cx) -> anyhow::Result<()> {
        self.record(&format!("{method}:{}", event.event_type));
        Ok(())
    }
}

pub fn probe(
    name: &str,
    log: &Log,
    view: impl Fn(&Cx) -> anyhow::Result<Vec<Child>> + 'static,
) -> ComponentDefinition {
    let name = name.to_string();
    let log = Rc::clone(log);
    let view: View = Rc::new(view);
    ComponentDefinition::new(move || Probe { name: name.clone(), log: Rc::clone(&log), view: Rc::clone(&view) })
}
