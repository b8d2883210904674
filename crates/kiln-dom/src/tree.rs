//! DOM Tree (arena-based allocation)
//!
//! Raw structural operations only. `Document` layers reactions, observers
//! and the mutation counter on top.

use crate::{Node, NodeId};

/// Arena-based DOM tree
#[derive(Debug, Default)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    /// Create a new tree holding only the document node
    pub fn new() -> Self {
        Self { nodes: vec![Node::document()] }
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Allocate a detached node
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if !id.is_valid() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if !id.is_valid() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Number of nodes ever allocated (detached nodes included)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parent of a node, if attached
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(|p| p.is_valid())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.first_child).filter(|c| c.is_valid())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.next_sibling).filter(|c| c.is_valid())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.prev_sibling).filter(|c| c.is_valid())
    }

    /// Iterate over direct children
    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE),
        }
    }

    /// Pre-order list of `id` and all of its descendants
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.get(current).is_none() {
                continue;
            }
            out.push(current);
            let mut kids: Vec<NodeId> = self.children(current).collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Unlink a node from its parent. Returns the old parent.
    pub fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let (parent, prev, next) = {
            let node = self.get(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if !parent.is_valid() {
            return None;
        }

        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }
        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
        Some(parent)
    }

    /// Link a detached node under `parent`, before `reference` (append when NONE)
    pub fn link(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        let prev = if reference.is_valid() {
            self.get(reference).map(|r| r.prev_sibling).unwrap_or(NodeId::NONE)
        } else {
            self.get(parent).map(|p| p.last_child).unwrap_or(NodeId::NONE)
        };

        if let Some(node) = self.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = reference;
        }
        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = child;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = child;
        }
        if let Some(r) = self.get_mut(reference) {
            r.prev_sibling = child;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = child;
        }
    }
}

/// Iterator over the children of a node
pub struct Children<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next;
        let node = self.tree.get(current)?;
        self.next = node.next_sibling;
        Some(current)
    }
}
