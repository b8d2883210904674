//! Child-list Mutation Observers
//!
//! Records children added to or removed from observed nodes.

use crate::NodeId;

/// Observer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u32);

/// Mutation observer
#[derive(Debug)]
pub struct MutationObserver {
    id: ObserverId,
    observed: Vec<NodeId>,
    records: Vec<MutationRecord>,
}

/// Mutation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    ChildList,
}

impl MutationRecord {
    pub fn added(target: NodeId, node: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: vec![node],
            removed_nodes: Vec::new(),
        }
    }

    pub fn removed(target: NodeId, node: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: Vec::new(),
            removed_nodes: vec![node],
        }
    }
}

impl MutationObserver {
    pub fn new(id: ObserverId) -> Self {
        Self {
            id,
            observed: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn observe(&mut self, target: NodeId) {
        if !self.observed.contains(&target) {
            self.observed.push(target);
        }
    }

    pub fn is_observing(&self, target: NodeId) -> bool {
        self.observed.contains(&target)
    }

    pub fn disconnect(&mut self) {
        self.observed.clear();
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn push_record(&mut self, record: MutationRecord) {
        self.records.push(record);
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_observer() {
        let mut observer = MutationObserver::new(ObserverId(0));
        observer.observe(NodeId(1));
        observer.observe(NodeId(1));
        assert_eq!(observer.observed.len(), 1);

        observer.push_record(MutationRecord::added(NodeId(1), NodeId(2)));
        assert!(observer.has_records());
        assert_eq!(observer.take_records().len(), 1);
        assert!(!observer.has_records());

        observer.disconnect();
        assert!(!observer.is_observing(NodeId(1)));
    }
}
