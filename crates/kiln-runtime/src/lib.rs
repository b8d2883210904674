//! kiln Runtime
//!
//! Web component lifecycle runtime over `kiln-dom` and `kiln-vdom`.
//!
//! # Features
//! - Compact metadata registration with lazily loaded component modules
//! - Reactive props and state with coalesced, prioritized updates
//! - Parent-before-child rendering and child-before-parent load completion
//! - Slot relocation of light DOM content
//! - Failures in component code recorded as diagnostics, never propagated
//!
//! # Example
//! ```rust,ignore
//! use kiln_runtime::{Platform, RuntimeConfig, ComponentModule, ComponentDefinition};
//!
//! let platform = Platform::new(RuntimeConfig::default());
//! platform.define_module("greeting", || async {
//!     Ok(ComponentModule::new().define("x-greeting", ComponentDefinition::new(|| Greeting)))
//! });
//! platform.register_component(&serde_json::json!(["x-greeting", "greeting", null, [["name", 1, 2]]]))?;
//! platform.run_until_idle();
//! ```

mod config;
mod error;
pub mod metadata;
pub mod scheduler;
mod component;
mod registry;
mod reactive;
mod host;
mod platform;
mod lifecycle;
mod wiring;

pub use config::RuntimeConfig;
pub use error::{Diagnostic, ErrorKind, RuntimeError};
pub use metadata::{ComponentMeta, ListenerMeta, MemberKind, MemberMeta, MetadataError, PropType, SlotMode};
pub use scheduler::{Priority, TaskQueue};
pub use component::{Component, Cx, Hook, LocalFuture};
pub use registry::{ComponentDefinition, ComponentModule, EventMeta, Factory, ModuleLoader};
pub use reactive::{parse_prop_value, WatchPhase, Watcher};
pub use host::{HostElement, HostState, LifecycleHost, ReadyCallback};
pub use platform::Platform;
pub use wiring::{key_code, ListenTarget, ListenerSpec};

pub use kiln_dom as dom;
pub use kiln_vdom as vdom;

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
