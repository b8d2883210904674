//! Component Registry
//!
//! Decoded metadata per tag, module loaders per module id, loaded modules
//! and style text. A module is loaded once and shared by every tag it
//! defines; hosts that connect while a load is in flight wait on it.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use kiln_dom::NodeId;
use serde::Serialize;

use crate::component::{Component, LocalFuture};
use crate::metadata::ComponentMeta;

/// Creates a fresh component instance
pub type Factory = Rc<dyn Fn() -> anyhow::Result<Box<dyn Component>>>;

/// Asynchronously resolves a module
pub type ModuleLoader = Rc<dyn Fn() -> LocalFuture<anyhow::Result<ComponentModule>>>;

/// Declared custom event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMeta {
    pub name: String,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

impl EventMeta {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), bubbles: true, cancelable: true, composed: true }
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
}

/// Constructor and event declarations of one component
#[derive(Clone)]
pub struct ComponentDefinition {
    factory: Factory,
    events: Vec<EventMeta>,
}

impl ComponentDefinition {
    pub fn new<C: Component + 'static>(factory: impl Fn() -> C + 'static) -> Self {
        Self {
            factory: Rc::new(move || Ok(Box::new(factory()) as Box<dyn Component>)),
            events: Vec::new(),
        }
    }

    /// Definition whose constructor can fail
    pub fn fallible(factory: impl Fn() -> anyhow::Result<Box<dyn Component>> + 'static) -> Self {
        Self { factory: Rc::new(factory), events: Vec::new() }
    }

    pub fn event(mut self, event: EventMeta) -> Self {
        self.events.push(event);
        self
    }

    pub fn events(&self) -> &[EventMeta] {
        &self.events
    }

    pub(crate) fn instantiate(&self) -> anyhow::Result<Box<dyn Component>> {
        (self.factory)()
    }
}

/// A loaded module: definitions keyed by tag
#[derive(Clone, Default)]
pub struct ComponentModule {
    definitions: HashMap<String, ComponentDefinition>,
}

impl ComponentModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, tag: &str, definition: ComponentDefinition) -> Self {
        self.definitions.insert(tag.to_ascii_lowercase(), definition);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(tag)
    }
}

/// Load state of one module
pub(crate) enum ModuleState {
    /// In flight, with the hosts (and their generation) waiting on it
    Loading(Vec<(NodeId, u64)>),
    Loaded(ComponentModule),
}

#[derive(Default)]
pub(crate) struct Registry {
    pub metas: HashMap<String, Rc<ComponentMeta>>,
    pub loaders: HashMap<String, ModuleLoader>,
    pub modules: HashMap<String, ModuleState>,
    /// Style text by style id
    pub styles: HashMap<String, String>,
    /// Style ids already attached to the document
    pub attached_styles: HashSet<String>,
}

impl Registry {
    pub fn meta(&self, tag: &str) -> Option<Rc<ComponentMeta>> {
        self.metas.get(tag).cloned()
    }

    pub fn definition(&self, meta: &ComponentMeta) -> Option<ComponentDefinition> {
        match self.modules.get(&meta.module_id)? {
            ModuleState::Loaded(module) => module.get(&meta.tag).cloned(),
            ModuleState::Loading(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Cx;
    use kiln_vdom::Child;

    struct Empty;

    impl Component for Empty {
        fn render(&mut self, _cx: &Cx) -> anyhow::Result<Vec<Child>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_module_definitions_by_lowercase_tag() {
        let module = ComponentModule::new()
            .define("X-Empty", ComponentDefinition::new(|| Empty).event(EventMeta::new("changed").with_bubbles(false)));
        let definition = module.get("x-empty").unwrap();
        assert_eq!(definition.events().len(), 1);
        assert!(!definition.events()[0].bubbles);
        assert!(definition.events()[0].composed);
        assert!(definition.instantiate().is_ok());
    }

    #[test]
    fn test_fallible_factory() {
        let definition = ComponentDefinition::fallible(|| anyhow::bail!("constructor failed"));
        assert!(definition.instantiate().is_err());
    }
}
