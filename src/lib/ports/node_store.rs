use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// Address of a node inside a sparse Merkle tree. Level 0 holds the leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub level: usize,
    pub index: U256,
}

impl NodeKey {
    pub fn new(level: usize, index: U256) -> Self {
        Self { level, index }
    }
}

/// Port for the node storage behind a sparse Merkle tree.
///
/// Only non-default nodes are written; a missing key means the node still holds the
/// default value for its level.
///
/// Implementations:
/// - `MemoryNodeStore` (in-process `HashMap`)
pub trait NodeStore: Send + Sync {
    /// Read a node, `None` when it was never written.
    fn get(&self, key: &NodeKey) -> Option<B256>;

    /// Write a node, replacing any previous value.
    fn set(&mut self, key: NodeKey, value: B256);

    /// Number of written nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
