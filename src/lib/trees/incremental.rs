use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use super::{check_depth, TreeError};
use crate::crypto::poseidon::{hash_left_right, poseidon};

/// Membership proof for a leaf of an [`IncrementalTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalMerkleProof {
    pub leaf: B256,
    pub leaf_index: usize,
    pub root: B256,
    /// For each level (leaf level first), the `arity - 1` siblings in child order.
    pub siblings: Vec<Vec<B256>>,
    /// For each level, the position of the current node among its siblings.
    pub path_indices: Vec<usize>,
}

impl IncrementalMerkleProof {
    /// Recompute the root from the leaf and path.
    pub fn verify(&self) -> bool {
        let mut node = self.leaf;
        for (siblings, &position) in self.siblings.iter().zip(&self.path_indices) {
            if position > siblings.len() {
                return false;
            }
            let mut children = siblings.clone();
            children.insert(position, node);
            node = hash_children(&children);
        }
        node == self.root
    }

    /// Flattened sibling list, the shape binary circuits expect.
    pub fn path_elements(&self) -> Vec<B256> {
        self.siblings.iter().flatten().copied().collect()
    }
}

/// Append-only Merkle tree of fixed depth and arity with a configurable empty leaf.
///
/// Leaf index equals insertion order. Only filled nodes are kept; missing nodes at level
/// `l` implicitly hold `zeros[l]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalTree {
    depth: usize,
    arity: usize,
    zeros: Vec<B256>,
    /// `levels[0]` are the leaves, `levels[depth]` holds at most the root.
    levels: Vec<Vec<B256>>,
}

fn hash_children(children: &[B256]) -> B256 {
    match children {
        [left, right] => hash_left_right(*left, *right),
        _ => poseidon(children),
    }
}

impl IncrementalTree {
    /// Create an empty tree.
    pub fn new(depth: usize, zero_leaf: B256, arity: usize) -> Result<Self, TreeError> {
        check_depth(depth)?;
        if !(2..=5).contains(&arity) {
            return Err(TreeError::InvalidArity(arity));
        }

        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_leaf);
        for level in 0..depth {
            zeros.push(hash_children(&vec![zeros[level]; arity]));
        }

        Ok(Self {
            depth,
            arity,
            zeros,
            levels: vec![Vec::new(); depth + 1],
        })
    }

    /// Maximum number of leaves, saturating at `u128::MAX`.
    pub fn capacity(&self) -> u128 {
        (self.arity as u128)
            .checked_pow(self.depth as u32)
            .unwrap_or(u128::MAX)
    }

    /// Append a leaf and return its index.
    pub fn insert(&mut self, leaf: B256) -> Result<usize, TreeError> {
        let index = self.levels[0].len();
        if index as u128 >= self.capacity() {
            return Err(TreeError::TreeFull {
                capacity: self.capacity(),
            });
        }
        self.levels[0].push(leaf);

        let mut current = index;
        for level in 0..self.depth {
            let parent = current / self.arity;
            let start = parent * self.arity;
            let children: Vec<B256> = (start..start + self.arity)
                .map(|i| self.node(level, i))
                .collect();
            let hash = hash_children(&children);

            let next = &mut self.levels[level + 1];
            if parent < next.len() {
                next[parent] = hash;
            } else {
                next.push(hash);
            }
            current = parent;
        }

        Ok(index)
    }

    fn node(&self, level: usize, index: usize) -> B256 {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    pub fn root(&self) -> B256 {
        self.node(self.depth, 0)
    }

    /// Root of the tree with no leaves.
    pub fn empty_root(&self) -> B256 {
        self.zeros[self.depth]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn leaves(&self) -> &[B256] {
        &self.levels[0]
    }

    /// Index of the first leaf equal to `leaf`.
    pub fn index_of(&self, leaf: &B256) -> Option<usize> {
        self.levels[0].iter().position(|l| l == leaf)
    }

    /// Generate a membership proof for the leaf at `index`.
    pub fn prove(&self, index: usize) -> Option<IncrementalMerkleProof> {
        let leaf = *self.levels[0].get(index)?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut current = index;
        for level in 0..self.depth {
            let position = current % self.arity;
            let start = current - position;
            let level_siblings = (start..start + self.arity)
                .filter(|&i| i != current)
                .map(|i| self.node(level, i))
                .collect();
            siblings.push(level_siblings);
            path_indices.push(position);
            current /= self.arity;
        }

        Some(IncrementalMerkleProof {
            leaf,
            leaf_index: index,
            root: self.root(),
            siblings,
            path_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poseidon::field;

    #[test]
    fn test_empty_tree_root_is_zero_chain() {
        let tree = IncrementalTree::new(3, field(7), 2).unwrap();
        let z1 = hash_left_right(field(7), field(7));
        let z2 = hash_left_right(z1, z1);
        let z3 = hash_left_right(z2, z2);
        assert_eq!(tree.root(), z3);
        assert_eq!(tree.root(), tree.empty_root());
    }

    #[test]
    fn test_root_changes_on_insert() {
        let mut tree = IncrementalTree::new(4, B256::ZERO, 2).unwrap();
        let empty = tree.root();
        tree.insert(field(1)).unwrap();
        let root1 = tree.root();
        tree.insert(field(2)).unwrap();
        let root2 = tree.root();

        assert_ne!(empty, root1);
        assert_ne!(root1, root2);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_single_leaf_root_matches_manual_hash() {
        let mut tree = IncrementalTree::new(2, B256::ZERO, 2).unwrap();
        tree.insert(field(5)).unwrap();

        let level1 = hash_left_right(field(5), B256::ZERO);
        let empty1 = hash_left_right(B256::ZERO, B256::ZERO);
        assert_eq!(tree.root(), hash_left_right(level1, empty1));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        let mut tree = IncrementalTree::new(4, B256::ZERO, 2).unwrap();
        for i in 1..=5u64 {
            tree.insert(field(i)).unwrap();
        }
        for i in 0..5 {
            let proof = tree.prove(i).unwrap();
            assert_eq!(proof.leaf_index, i);
            assert_eq!(proof.path_elements().len(), 4);
            assert!(proof.verify(), "proof for leaf {i} should verify");
        }
        assert!(tree.prove(5).is_none());
    }

    #[test]
    fn test_quinary_tree_proofs_verify() {
        let mut tree = IncrementalTree::new(3, B256::ZERO, 5).unwrap();
        for i in 1..=7u64 {
            tree.insert(field(i)).unwrap();
        }
        let proof = tree.prove(6).unwrap();
        assert_eq!(proof.siblings[0].len(), 4);
        assert_eq!(proof.path_indices[0], 1);
        assert!(proof.verify());
    }

    #[test]
    fn test_tampered_proof_fails() {
        let mut tree = IncrementalTree::new(3, B256::ZERO, 2).unwrap();
        tree.insert(field(1)).unwrap();
        tree.insert(field(2)).unwrap();

        let mut proof = tree.prove(1).unwrap();
        proof.leaf = field(3);
        assert!(!proof.verify());
    }

    #[test]
    fn test_tree_full() {
        let mut tree = IncrementalTree::new(1, B256::ZERO, 2).unwrap();
        tree.insert(field(1)).unwrap();
        tree.insert(field(2)).unwrap();
        assert_eq!(
            tree.insert(field(3)),
            Err(TreeError::TreeFull { capacity: 2 })
        );
    }

    #[test]
    fn test_index_of_returns_first_match() {
        let mut tree = IncrementalTree::new(3, B256::ZERO, 2).unwrap();
        tree.insert(field(9)).unwrap();
        tree.insert(field(8)).unwrap();
        tree.insert(field(9)).unwrap();
        assert_eq!(tree.index_of(&field(9)), Some(0));
        assert_eq!(tree.index_of(&field(8)), Some(1));
        assert_eq!(tree.index_of(&field(7)), None);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            IncrementalTree::new(0, B256::ZERO, 2),
            Err(TreeError::InvalidDepth { .. })
        ));
        assert_eq!(
            IncrementalTree::new(4, B256::ZERO, 1),
            Err(TreeError::InvalidArity(1))
        );
    }
}
