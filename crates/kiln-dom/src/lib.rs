//! kiln DOM - Document Object Model
//!
//! Arena-backed DOM used as the mutation target of the kiln component
//! runtime. Besides the usual tree, attribute and listener operations it
//! queues custom element reactions and child-list mutation records so the
//! runtime can drive component lifecycles from DOM changes.

mod node;
mod tree;
mod document;
pub mod custom_elements;
pub mod events;
pub mod observer;

pub use node::{Attribute, ElementData, Node, NodeData};
pub use tree::{Children, DomTree};
pub use document::Document;
pub use custom_elements::{CustomElementDefinition, CustomElementRegistry, Reaction};
pub use events::{
    dispatch, DomEvent, EventPhase, EventTarget, Listener, ListenerId, ListenerOptions,
};
pub use observer::{MutationRecord, MutationType, ObserverId};

/// SVG namespace URI
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
/// XLink namespace URI
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
/// XML namespace URI
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Root (document) node ID
    pub const ROOT: NodeId = NodeId(0);
    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Raw arena index
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// DOM errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("'{0}' is not a valid custom element name")]
    InvalidCustomElementName(String),

    #[error("custom element '{0}' is already defined")]
    AlreadyDefined(String),
}
