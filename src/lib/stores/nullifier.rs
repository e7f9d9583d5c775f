use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::StoreError;
use crate::crypto::poseidon::{is_field_element, reduce_to_bits};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierRecord {
    pub epoch: u64,
    /// Value reduced into the nullifier tree's index space.
    pub value: B256,
    pub transaction_hash: B256,
}

/// Global set of consumed nullifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierStore {
    records: BTreeMap<B256, NullifierRecord>,
}

impl NullifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a batch of raw nullifiers from one transaction and return the reduced
    /// values that still need recording.
    ///
    /// Zero entries are padding and are skipped. A value already recorded by the same
    /// transaction is skipped; by another transaction (or twice in the batch) it is a
    /// double spend.
    pub fn check_batch(
        &self,
        values: &[B256],
        transaction_hash: B256,
        depth: usize,
    ) -> Result<Vec<B256>, StoreError> {
        let mut pending = Vec::with_capacity(values.len());
        let mut seen = BTreeSet::new();
        for &raw in values {
            if raw.is_zero() {
                continue;
            }
            if !is_field_element(raw) {
                return Err(StoreError::OutOfRangeNullifier { value: raw });
            }
            let value = reduce_to_bits(raw, depth);
            if !seen.insert(value) {
                return Err(StoreError::DuplicateNullifier {
                    value,
                    first_tx: transaction_hash,
                });
            }
            match self.records.get(&value) {
                Some(record) if record.transaction_hash == transaction_hash => {}
                Some(record) => {
                    return Err(StoreError::DuplicateNullifier {
                        value,
                        first_tx: record.transaction_hash,
                    })
                }
                None => pending.push(value),
            }
        }
        Ok(pending)
    }

    /// Record pre-validated values from [`Self::check_batch`].
    pub fn record(&mut self, epoch: u64, values: Vec<B256>, transaction_hash: B256) {
        for value in values {
            self.records.insert(
                value,
                NullifierRecord {
                    epoch,
                    value,
                    transaction_hash,
                },
            );
        }
    }

    /// Validate then record; returns how many values were new.
    pub fn insert_batch(
        &mut self,
        epoch: u64,
        values: &[B256],
        transaction_hash: B256,
        depth: usize,
    ) -> Result<usize, StoreError> {
        let pending = self.check_batch(values, transaction_hash, depth)?;
        let count = pending.len();
        self.record(epoch, pending, transaction_hash);
        Ok(count)
    }

    /// Lookup by reduced value.
    pub fn get(&self, value: &B256) -> Option<&NullifierRecord> {
        self.records.get(value)
    }

    pub fn contains(&self, value: &B256) -> bool {
        self.records.contains_key(value)
    }

    pub fn values(&self) -> impl Iterator<Item = &B256> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
