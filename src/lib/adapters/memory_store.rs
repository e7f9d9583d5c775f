use alloy::primitives::B256;
use std::collections::HashMap;

use crate::ports::node_store::{NodeKey, NodeStore};

/// In-memory implementation of `NodeStore`.
///
/// Trees are rebuilt from the stores on demand, so nodes never need to outlive the
/// process.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    nodes: HashMap<NodeKey, B256>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeStore for MemoryNodeStore {
    fn get(&self, key: &NodeKey) -> Option<B256> {
        self.nodes.get(key).copied()
    }

    fn set(&mut self, key: NodeKey, value: B256) {
        self.nodes.insert(key, value);
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
