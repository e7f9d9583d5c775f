//! Merkle structures rebuilt from store contents.
//!
//! - [`incremental::IncrementalTree`]: fixed-depth, fixed-arity append-only tree used for the
//!   global state tree.
//! - [`sparse::SparseMerkleTree`]: binary tree over a `2^depth` index space, used for the
//!   epoch tree, the nullifier tree and the per-user state tree. Nodes live in a
//!   [`crate::ports::node_store::NodeStore`].

pub mod incremental;
pub mod sparse;

use alloy::primitives::U256;

/// Largest depth accepted for any tree (indices must stay inside the BN254 field).
pub const MAX_TREE_DEPTH: usize = 252;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("invalid tree depth {depth} (must be 1..={max})")]
    InvalidDepth { depth: usize, max: usize },

    #[error("invalid tree arity {0} (must be 2..=5)")]
    InvalidArity(usize),

    #[error("tree is full ({capacity} leaves)")]
    TreeFull { capacity: u128 },

    #[error("index {index} out of range for a tree of depth {depth}")]
    IndexOutOfRange { index: U256, depth: usize },
}

pub(crate) fn check_depth(depth: usize) -> Result<(), TreeError> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(TreeError::InvalidDepth {
            depth,
            max: MAX_TREE_DEPTH,
        });
    }
    Ok(())
}
