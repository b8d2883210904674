//! Errors and Diagnostics
//!
//! `RuntimeError` is returned by embedder-facing calls. Failures inside
//! user component code never propagate: they are recorded as
//! `Diagnostic`s and processing of other hosts continues.

use std::collections::VecDeque;

use kiln_dom::{DomError, NodeId};
use serde::Serialize;

use crate::metadata::MetadataError;

/// Runtime error
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no component registered for <{0}>")]
    UnknownTag(String),

    #[error("no module loader registered for '{0}'")]
    UnknownModule(String),

    #[error("node {0:?} is not a component host")]
    NotAHost(NodeId),

    #[error("<{tag}> has no member '{member}'")]
    UnknownMember { tag: String, member: String },

    #[error("'{member}' of <{tag}> is a read-only prop on the instance")]
    ReadOnlyMember { tag: String, member: String },

    #[error("host {0:?} was disconnected before it loaded")]
    Disconnected(NodeId),

    #[error("component instance is busy")]
    Busy,

    #[error("runtime has been dropped")]
    Dropped,

    #[error("invalid component metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),
}

/// Diagnostic kinds, one per call site that runs user code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    LoadBundle,
    QueueEvents,
    WillLoad,
    DidLoad,
    WillUpdate,
    DidUpdate,
    InitInstance,
    Render,
    Listener,
    DidUnload,
}

impl ErrorKind {
    /// Human-readable header
    pub fn header(self) -> &'static str {
        match self {
            ErrorKind::LoadBundle => "Error loading component bundle",
            ErrorKind::QueueEvents => "Error replaying queued events",
            ErrorKind::WillLoad => "Error in componentWillLoad",
            ErrorKind::DidLoad => "Error in componentDidLoad",
            ErrorKind::WillUpdate => "Error in componentWillUpdate",
            ErrorKind::DidUpdate => "Error in componentDidUpdate",
            ErrorKind::InitInstance => "Error initializing component instance",
            ErrorKind::Render => "Error rendering component",
            ErrorKind::Listener => "Error in event listener",
            ErrorKind::DidUnload => "Error in componentDidUnload",
        }
    }
}

/// Recorded failure of user component code
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub header: String,
    pub tag: Option<String>,
    /// Arena index of the host element
    pub element: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, tag: Option<&str>, element: Option<NodeId>, error: &anyhow::Error) -> Self {
        Self {
            kind,
            header: kind.header().to_string(),
            tag: tag.map(str::to_string),
            element: element.map(NodeId::index),
            message: format!("{error:#}"),
        }
    }
}

/// Bounded diagnostics log
#[derive(Debug)]
pub(crate) struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    cap: usize,
}

impl Diagnostics {
    pub fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), cap: cap.max(1) }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::error!(
            kind = ?diagnostic.kind,
            tag = diagnostic.tag.as_deref().unwrap_or(""),
            "{}: {}",
            diagnostic.header,
            diagnostic.message
        );
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.iter().cloned().collect()
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}
