use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One leaf of an epoch's global state tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstLeaf {
    pub epoch: u64,
    pub transaction_hash: B256,
    pub hashed_leaf: B256,
}

/// Result of appending a GST leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GstAppend {
    Inserted(usize),
    /// The same leaf from the same transaction is already stored at this index.
    AlreadyPresent(usize),
}

/// Per-epoch ordered GST leaves. Leaf index is the insertion position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstLeafStore {
    epochs: BTreeMap<u64, Vec<GstLeaf>>,
}

impl GstLeafStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an (empty) leaf list exists for `epoch`.
    pub fn open_epoch(&mut self, epoch: u64) {
        self.epochs.entry(epoch).or_default();
    }

    pub fn find(&self, leaf: &GstLeaf) -> Option<usize> {
        self.leaves(leaf.epoch).iter().position(|stored| stored == leaf)
    }

    pub fn append(&mut self, leaf: GstLeaf) -> GstAppend {
        if let Some(index) = self.find(&leaf) {
            return GstAppend::AlreadyPresent(index);
        }
        let list = self.epochs.entry(leaf.epoch).or_default();
        list.push(leaf);
        GstAppend::Inserted(list.len() - 1)
    }

    pub fn leaves(&self, epoch: u64) -> &[GstLeaf] {
        self.epochs.get(&epoch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Index the next leaf of `epoch` will take.
    pub fn next_index(&self, epoch: u64) -> usize {
        self.leaves(epoch).len()
    }

    /// Index of the first leaf of `epoch` whose hash equals `hashed_leaf`.
    pub fn index_of(&self, epoch: u64, hashed_leaf: &B256) -> Option<usize> {
        self.leaves(epoch)
            .iter()
            .position(|leaf| &leaf.hashed_leaf == hashed_leaf)
    }

    pub fn is_open(&self, epoch: u64) -> bool {
        self.epochs.contains_key(&epoch)
    }

    pub fn epochs(&self) -> impl Iterator<Item = u64> + '_ {
        self.epochs.keys().copied()
    }
}
