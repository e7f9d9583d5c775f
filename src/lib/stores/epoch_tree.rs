use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::StoreError;

/// Sealed hash chain of one epoch key, written at epoch end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTreeLeaf {
    pub epoch: u64,
    pub epoch_key: B256,
    pub hashchain_result: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealOutcome {
    Sealed(usize),
    AlreadySealed,
}

/// Epoch tree leaves, written once per epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTreeLeafStore {
    sealed: BTreeMap<u64, Vec<EpochTreeLeaf>>,
}

impl EpochTreeLeafStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(true)` when the epoch is already sealed with exactly these leaves.
    pub fn check_seal(&self, epoch: u64, leaves: &[EpochTreeLeaf]) -> Result<bool, StoreError> {
        match self.sealed.get(&epoch) {
            None => Ok(false),
            Some(existing) if existing.as_slice() == leaves => Ok(true),
            Some(_) => Err(StoreError::EpochSealConflict { epoch }),
        }
    }

    pub fn seal(
        &mut self,
        epoch: u64,
        leaves: Vec<EpochTreeLeaf>,
    ) -> Result<SealOutcome, StoreError> {
        if self.check_seal(epoch, &leaves)? {
            return Ok(SealOutcome::AlreadySealed);
        }
        let count = leaves.len();
        self.sealed.insert(epoch, leaves);
        Ok(SealOutcome::Sealed(count))
    }

    pub fn is_sealed(&self, epoch: u64) -> bool {
        self.sealed.contains_key(&epoch)
    }

    pub fn leaves(&self, epoch: u64) -> &[EpochTreeLeaf] {
        self.sealed.get(&epoch).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hashchain_of(&self, epoch: u64, epoch_key: &B256) -> Option<B256> {
        self.leaves(epoch)
            .iter()
            .find(|leaf| &leaf.epoch_key == epoch_key)
            .map(|leaf| leaf.hashchain_result)
    }
}
