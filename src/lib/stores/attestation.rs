use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::attestation::{extend_hash_chain, seal_hash_chain, Attestation};

/// An attestation with the epoch key it targets and the log it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub epoch: u64,
    pub epoch_key: B256,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub attestation: Attestation,
}

/// Attestations per epoch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredAttestations")]
pub struct AttestationStore {
    epochs: BTreeMap<u64, Vec<AttestationRecord>>,
    /// `(epoch, transaction_hash, log_index)` of every record; rebuilt on load.
    #[serde(skip)]
    seen: BTreeSet<(u64, B256, u64)>,
}

#[derive(Deserialize)]
struct StoredAttestations {
    epochs: BTreeMap<u64, Vec<AttestationRecord>>,
}

impl From<StoredAttestations> for AttestationStore {
    fn from(stored: StoredAttestations) -> Self {
        let seen = stored
            .epochs
            .values()
            .flatten()
            .map(|r| (r.epoch, r.transaction_hash, r.log_index))
            .collect();
        Self {
            epochs: stored.epochs,
            seen,
        }
    }
}

impl AttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the log `(transaction_hash, log_index)` was already recorded for `epoch`.
    pub fn contains(&self, epoch: u64, transaction_hash: &B256, log_index: u64) -> bool {
        self.seen.contains(&(epoch, *transaction_hash, log_index))
    }

    /// Append a record. Returns `false` when the same log was already recorded.
    pub fn insert(&mut self, record: AttestationRecord) -> bool {
        if !self
            .seen
            .insert((record.epoch, record.transaction_hash, record.log_index))
        {
            return false;
        }
        self.epochs.entry(record.epoch).or_default().push(record);
        true
    }

    pub fn records(&self, epoch: u64) -> &[AttestationRecord] {
        self.epochs.get(&epoch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attestations addressed to `epoch_key` during `epoch`, in submission order.
    pub fn to_epoch_key(&self, epoch: u64, epoch_key: B256) -> Vec<Attestation> {
        self.records(epoch)
            .iter()
            .filter(|r| r.epoch_key == epoch_key)
            .map(|r| r.attestation)
            .collect()
    }

    /// Sealed hash chain of every epoch key attested during `epoch`.
    pub fn hash_chains(&self, epoch: u64) -> BTreeMap<B256, B256> {
        let mut chains: BTreeMap<B256, B256> = BTreeMap::new();
        for record in self.records(epoch) {
            let chain = chains.entry(record.epoch_key).or_insert(B256::ZERO);
            *chain = extend_hash_chain(*chain, &record.attestation);
        }
        chains
            .into_iter()
            .map(|(key, chain)| (key, seal_hash_chain(chain)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attestation::sealed_hash_chain;

    fn record(epoch_key: u8, log_index: u64, attestation: Attestation) -> AttestationRecord {
        AttestationRecord {
            epoch: 1,
            epoch_key: B256::repeat_byte(epoch_key),
            transaction_hash: B256::repeat_byte(0x70),
            log_index,
            attestation,
        }
    }

    #[test]
    fn test_insert_dedups_by_log() {
        let mut store = AttestationStore::new();
        assert!(store.insert(record(1, 0, Attestation::new(7, 5, 0))));
        assert!(!store.insert(record(1, 0, Attestation::new(7, 5, 0))));
        assert!(store.insert(record(1, 1, Attestation::new(7, 5, 0))));
        assert_eq!(store.records(1).len(), 2);
    }

    #[test]
    fn test_dedup_survives_reload() {
        let mut store = AttestationStore::new();
        for log_index in 0..64 {
            assert!(store.insert(record(1, log_index, Attestation::new(7, 1, 0))));
        }

        let json = serde_json::to_string(&store).unwrap();
        let mut loaded: AttestationStore = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, store);
        assert!(loaded.contains(1, &B256::repeat_byte(0x70), 63));
        assert!(!loaded.contains(2, &B256::repeat_byte(0x70), 63));
        assert!(!loaded.insert(record(1, 10, Attestation::new(7, 1, 0))));
        assert!(loaded.insert(record(1, 64, Attestation::new(7, 1, 0))));
        assert_eq!(loaded.records(1).len(), 65);
    }

    #[test]
    fn test_filter_by_epoch_key() {
        let mut store = AttestationStore::new();
        store.insert(record(1, 0, Attestation::new(7, 5, 0)));
        store.insert(record(2, 1, Attestation::new(8, 1, 0)));
        store.insert(record(1, 2, Attestation::new(9, 0, 2)));

        let to_key = store.to_epoch_key(1, B256::repeat_byte(1));
        assert_eq!(to_key.len(), 2);
        assert_eq!(to_key[0].attester_id, 7);
        assert_eq!(to_key[1].attester_id, 9);
        assert!(store.to_epoch_key(2, B256::repeat_byte(1)).is_empty());
    }

    #[test]
    fn test_hash_chains_match_sealed_chain() {
        let a = Attestation::new(7, 5, 0);
        let b = Attestation::new(9, 0, 2);
        let mut store = AttestationStore::new();
        store.insert(record(1, 0, a));
        store.insert(record(1, 1, b));

        let chains = store.hash_chains(1);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[&B256::repeat_byte(1)], sealed_hash_chain([&a, &b]));
    }
}
