use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use super::{check_depth, TreeError};
use crate::adapters::memory_store::MemoryNodeStore;
use crate::crypto::poseidon::hash_left_right;
use crate::ports::node_store::{NodeKey, NodeStore};

/// Root of an empty sparse tree of `depth` whose every leaf is `default_leaf`.
pub fn empty_root(depth: usize, default_leaf: B256) -> B256 {
    (0..depth).fold(default_leaf, |node, _| hash_left_right(node, node))
}

fn default_nodes(depth: usize, default_leaf: B256) -> Vec<B256> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(default_leaf);
    for level in 0..depth {
        zeros.push(hash_left_right(zeros[level], zeros[level]));
    }
    zeros
}

/// Inclusion (or non-membership, when `leaf` is the default) proof for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseMerkleProof {
    pub index: U256,
    pub leaf: B256,
    pub root: B256,
    /// Sibling per level, leaf level first.
    pub siblings: Vec<B256>,
    /// 0 when the path node is a left child, 1 when it is a right child.
    pub path_indices: Vec<u8>,
}

impl SparseMerkleProof {
    pub fn verify(&self) -> bool {
        let mut node = self.leaf;
        for (sibling, &bit) in self.siblings.iter().zip(&self.path_indices) {
            node = if bit == 0 {
                hash_left_right(node, *sibling)
            } else {
                hash_left_right(*sibling, node)
            };
        }
        node == self.root
    }
}

/// Binary sparse Merkle tree over the index space `[0, 2^depth)`.
///
/// Every leaf starts as `default_leaf`; only updated paths are written to the node store.
#[derive(Debug, Clone)]
pub struct SparseMerkleTree<S: NodeStore = MemoryNodeStore> {
    depth: usize,
    zeros: Vec<B256>,
    store: S,
}

impl SparseMerkleTree<MemoryNodeStore> {
    /// Tree backed by a fresh in-memory node store.
    pub fn new(depth: usize, default_leaf: B256) -> Result<Self, TreeError> {
        Self::with_store(depth, default_leaf, MemoryNodeStore::new())
    }
}

impl<S: NodeStore> SparseMerkleTree<S> {
    pub fn with_store(depth: usize, default_leaf: B256, store: S) -> Result<Self, TreeError> {
        check_depth(depth)?;
        Ok(Self {
            depth,
            zeros: default_nodes(depth, default_leaf),
            store,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn default_leaf(&self) -> B256 {
        self.zeros[0]
    }

    fn check_index(&self, index: U256) -> Result<(), TreeError> {
        if index >= U256::from(1u8) << self.depth {
            return Err(TreeError::IndexOutOfRange {
                index,
                depth: self.depth,
            });
        }
        Ok(())
    }

    fn node(&self, level: usize, index: U256) -> B256 {
        self.store
            .get(&NodeKey::new(level, index))
            .unwrap_or(self.zeros[level])
    }

    /// Set the leaf at `index` and rehash its path to the root.
    pub fn update(&mut self, index: U256, leaf: B256) -> Result<(), TreeError> {
        self.check_index(index)?;

        self.store.set(NodeKey::new(0, index), leaf);
        let mut current = index;
        let mut node = leaf;
        for level in 0..self.depth {
            let sibling = self.node(level, current ^ U256::from(1u8));
            node = if current.bit(0) {
                hash_left_right(sibling, node)
            } else {
                hash_left_right(node, sibling)
            };
            current >>= 1;
            self.store.set(NodeKey::new(level + 1, current), node);
        }
        Ok(())
    }

    pub fn root(&self) -> B256 {
        self.node(self.depth, U256::ZERO)
    }

    pub fn leaf(&self, index: U256) -> Result<B256, TreeError> {
        self.check_index(index)?;
        Ok(self.node(0, index))
    }

    /// Proof for the leaf at `index`, default or not.
    pub fn prove(&self, index: U256) -> Result<SparseMerkleProof, TreeError> {
        self.check_index(index)?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut current = index;
        for level in 0..self.depth {
            siblings.push(self.node(level, current ^ U256::from(1u8)));
            path_indices.push(u8::from(current.bit(0)));
            current >>= 1;
        }

        Ok(SparseMerkleProof {
            index,
            leaf: self.node(0, index),
            root: self.root(),
            siblings,
            path_indices,
        })
    }
}
