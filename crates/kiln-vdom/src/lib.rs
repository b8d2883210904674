//! kiln VDOM - Virtual Nodes and Patching
//!
//! Components describe their output as a tree of `VNode`s built with `h`.
//! The patcher diffs that tree against the previous render and applies the
//! minimal set of mutations to a `kiln_dom::Document`.

mod vnode;
mod builder;
mod patch;

pub use vnode::{AttrMap, AttrValue, ClassMap, Handler, ListenerMap, ListenerSlot, PropMap, StyleMap, Tag, VNode};
pub use builder::{h, slot, text, Child, VData, SKIP_ALL, SKIP_CHILDREN, SKIP_DATA};
pub use patch::{destroy, patch, NoHooks, PatchHooks, Patcher, SlotContent, SSR_CHILD_ID, SSR_VNODE_ID};
