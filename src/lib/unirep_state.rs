use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::poseidon::{reduce_to_bits, smt_one_leaf, smt_zero_leaf, to_u256};
use crate::domain::attestation::Attestation;
use crate::domain::events::{
    AttestationSubmitted, EpochEnded, EventKind, EventMeta, ReputationNullifiersSpent,
    UnirepEvent, UserSignedUp, UserStateTransitioned,
};
use crate::domain::settings::Settings;
use crate::stores::attestation::{AttestationRecord, AttestationStore};
use crate::stores::epoch_tree::{EpochTreeLeaf, EpochTreeLeafStore};
use crate::stores::gst::{GstAppend, GstLeaf, GstLeafStore};
use crate::stores::nullifier::{NullifierRecord, NullifierStore};
use crate::stores::settings::SettingsStore;
use crate::stores::sign_up::{SignUpStore, UserSignUp};
use crate::stores::StoreError;
use crate::trees::incremental::IncrementalTree;
use crate::trees::sparse::SparseMerkleTree;
use crate::trees::TreeError;

/// Epoch numbering starts here.
pub const GENESIS_EPOCH: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("{event} for epoch {got}, current epoch is {expected}")]
    EpochMismatch {
        expected: u64,
        got: u64,
        event: EventKind,
    },

    #[error("epoch {epoch} has not started (current epoch {current})")]
    UnknownEpoch { epoch: u64, current: u64 },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Replayed protocol state: the current epoch, the settings snapshot and every store.
///
/// Handlers run all of their checks before the first write, so a failing event leaves
/// the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnirepState {
    settings: SettingsStore,
    current_epoch: u64,
    gst: GstLeafStore,
    epoch_trees: EpochTreeLeafStore,
    nullifiers: NullifierStore,
    attestations: AttestationStore,
    sign_ups: SignUpStore,
}

impl UnirepState {
    pub fn new(settings: Settings) -> Result<Self, StateError> {
        settings.validate().map_err(StateError::InvalidSettings)?;
        let mut gst = GstLeafStore::new();
        gst.open_epoch(GENESIS_EPOCH);
        Ok(Self {
            settings: SettingsStore::new(settings),
            current_epoch: GENESIS_EPOCH,
            gst,
            epoch_trees: EpochTreeLeafStore::new(),
            nullifiers: NullifierStore::new(),
            attestations: AttestationStore::new(),
            sign_ups: SignUpStore::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        self.settings.get()
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    fn check_started(&self, epoch: u64) -> Result<(), StateError> {
        if epoch > self.current_epoch {
            return Err(StateError::UnknownEpoch {
                epoch,
                current: self.current_epoch,
            });
        }
        Ok(())
    }

    fn check_gst_room(&self, leaf: &GstLeaf) -> Result<(), StateError> {
        let settings = self.settings();
        let capacity = (settings.global_state_tree_arity as u128)
            .checked_pow(settings.global_state_tree_depth as u32)
            .unwrap_or(u128::MAX);
        if self.gst.find(leaf).is_none() && self.gst.next_index(leaf.epoch) as u128 >= capacity {
            return Err(TreeError::TreeFull { capacity }.into());
        }
        Ok(())
    }

    fn check_epoch_key(&self, epoch_key: B256) -> Result<(), StateError> {
        let depth = self.settings().epoch_tree_depth;
        if reduce_to_bits(epoch_key, depth) != epoch_key {
            return Err(TreeError::IndexOutOfRange {
                index: to_u256(epoch_key),
                depth,
            }
            .into());
        }
        Ok(())
    }

    fn check_attester_id(&self, attester_id: u64) -> Result<(), StateError> {
        let depth = self.settings().user_state_tree_depth;
        if depth < 64 && attester_id >> depth != 0 {
            return Err(TreeError::IndexOutOfRange {
                index: U256::from(attester_id),
                depth,
            }
            .into());
        }
        Ok(())
    }

    fn append_gst_leaf(&mut self, leaf: GstLeaf) {
        let epoch = leaf.epoch;
        match self.gst.append(leaf) {
            GstAppend::Inserted(index) => {
                tracing::debug!(epoch, index, "gst: leaf appended");
            }
            GstAppend::AlreadyPresent(index) => {
                tracing::warn!(epoch, index, "gst: leaf already present, skipping");
            }
        }
    }

    // ── Event handlers ──

    pub fn on_user_sign_up(
        &mut self,
        meta: &EventMeta,
        event: &UserSignedUp,
    ) -> Result<(), StateError> {
        self.check_started(event.epoch)?;

        let sign_up = UserSignUp {
            transaction_hash: meta.transaction_hash,
            identity_commitment: event.identity_commitment,
            hashed_leaf: event.hashed_leaf,
            epoch: event.epoch,
        };
        let leaf = GstLeaf {
            epoch: event.epoch,
            transaction_hash: meta.transaction_hash,
            hashed_leaf: event.hashed_leaf,
        };
        let already_signed_up = self.sign_ups.check(&sign_up)?;
        self.check_gst_room(&leaf)?;

        if already_signed_up {
            tracing::warn!(
                commitment = %event.identity_commitment,
                "sign-up already recorded, skipping"
            );
        } else {
            self.sign_ups.insert(sign_up)?;
        }
        self.append_gst_leaf(leaf);
        Ok(())
    }

    pub fn on_attestation_submitted(
        &mut self,
        meta: &EventMeta,
        event: &AttestationSubmitted,
    ) -> Result<(), StateError> {
        if self
            .attestations
            .contains(event.epoch, &meta.transaction_hash, meta.log_index)
        {
            tracing::warn!(
                epoch = event.epoch,
                log_index = meta.log_index,
                "attestation already recorded, skipping"
            );
            return Ok(());
        }
        if event.epoch != self.current_epoch {
            return Err(StateError::EpochMismatch {
                expected: self.current_epoch,
                got: event.epoch,
                event: EventKind::AttestationSubmitted,
            });
        }
        self.check_epoch_key(event.epoch_key)?;
        self.check_attester_id(event.attestation.attester_id)?;

        self.attestations.insert(AttestationRecord {
            epoch: event.epoch,
            epoch_key: event.epoch_key,
            transaction_hash: meta.transaction_hash,
            log_index: meta.log_index,
            attestation: event.attestation,
        });
        Ok(())
    }

    pub fn on_epoch_ended(
        &mut self,
        meta: &EventMeta,
        event: &EpochEnded,
    ) -> Result<(), StateError> {
        let leaves: Vec<EpochTreeLeaf> = event
            .epoch_key_hashchains
            .iter()
            .filter(|(_, chain)| !is_trivial_chain(chain))
            .map(|&(epoch_key, hashchain_result)| EpochTreeLeaf {
                epoch: event.epoch,
                epoch_key,
                hashchain_result,
            })
            .collect();

        if event.epoch < self.current_epoch && self.epoch_trees.check_seal(event.epoch, &leaves)? {
            tracing::warn!(epoch = event.epoch, "epoch already sealed, skipping");
            return Ok(());
        }
        if event.epoch != self.current_epoch {
            return Err(StateError::EpochMismatch {
                expected: self.current_epoch,
                got: event.epoch,
                event: EventKind::EpochEnded,
            });
        }
        for leaf in &leaves {
            self.check_epoch_key(leaf.epoch_key)?;
        }
        self.epoch_trees.check_seal(event.epoch, &leaves)?;

        let local: BTreeMap<B256, B256> = self.attestations.hash_chains(event.epoch);
        let onchain: BTreeMap<B256, B256> = leaves
            .iter()
            .map(|leaf| (leaf.epoch_key, leaf.hashchain_result))
            .collect();
        if local != onchain {
            tracing::warn!(
                epoch = event.epoch,
                local = local.len(),
                onchain = onchain.len(),
                "epoch end hash chains differ from replayed attestations"
            );
        }

        let count = leaves.len();
        self.epoch_trees.seal(event.epoch, leaves)?;
        self.current_epoch = event.epoch + 1;
        self.gst.open_epoch(self.current_epoch);
        tracing::info!(
            epoch = event.epoch,
            epoch_keys = count,
            block = meta.block_number,
            "epoch ended"
        );
        Ok(())
    }

    pub fn on_user_state_transition(
        &mut self,
        meta: &EventMeta,
        event: &UserStateTransitioned,
    ) -> Result<(), StateError> {
        self.check_started(event.to_epoch)?;
        if event.from_epoch > event.to_epoch {
            return Err(StateError::EpochMismatch {
                expected: event.to_epoch,
                got: event.from_epoch,
                event: EventKind::UserStateTransitioned,
            });
        }

        let raw: Vec<B256> = event
            .epk_nullifiers
            .iter()
            .chain(&event.attestation_nullifiers)
            .copied()
            .collect();
        let pending = self.nullifiers.check_batch(
            &raw,
            meta.transaction_hash,
            self.settings().nullifier_tree_depth,
        )?;
        let leaf = GstLeaf {
            epoch: event.to_epoch,
            transaction_hash: meta.transaction_hash,
            hashed_leaf: event.new_gst_leaf,
        };
        self.check_gst_room(&leaf)?;

        self.nullifiers
            .record(event.from_epoch, pending, meta.transaction_hash);
        self.append_gst_leaf(leaf);
        Ok(())
    }

    pub fn on_reputation_nullifiers_spent(
        &mut self,
        meta: &EventMeta,
        event: &ReputationNullifiersSpent,
    ) -> Result<(), StateError> {
        self.check_started(event.epoch)?;
        let inserted = self.nullifiers.insert_batch(
            event.epoch,
            &event.nullifiers,
            meta.transaction_hash,
            self.settings().nullifier_tree_depth,
        )?;
        tracing::debug!(epoch = event.epoch, inserted, "reputation nullifiers spent");
        Ok(())
    }

    /// Dispatch one decoded event to its handler.
    pub fn apply(&mut self, meta: &EventMeta, event: &UnirepEvent) -> Result<(), StateError> {
        tracing::debug!(
            kind = %event.kind(),
            block = meta.block_number,
            log_index = meta.log_index,
            "applying event"
        );
        match event {
            UnirepEvent::UserSignedUp(e) => self.on_user_sign_up(meta, e),
            UnirepEvent::UserStateTransitioned(e) => self.on_user_state_transition(meta, e),
            UnirepEvent::AttestationSubmitted(e) => self.on_attestation_submitted(meta, e),
            UnirepEvent::EpochEnded(e) => self.on_epoch_ended(meta, e),
            UnirepEvent::ReputationNullifiersSpent(e) => {
                self.on_reputation_nullifiers_spent(meta, e)
            }
        }
    }

    // ── Tree builders ──

    /// Global state tree of `epoch`, leaves in store order.
    pub fn gen_gs_tree(&self, epoch: u64) -> Result<IncrementalTree, StateError> {
        self.check_started(epoch)?;
        let settings = self.settings();
        let mut tree = IncrementalTree::new(
            settings.global_state_tree_depth,
            settings.default_gst_leaf(),
            settings.global_state_tree_arity,
        )?;
        for leaf in self.gst.leaves(epoch) {
            tree.insert(leaf.hashed_leaf)?;
        }
        Ok(tree)
    }

    /// Epoch tree of a sealed epoch. Unsealed epochs yield the empty tree.
    pub fn gen_epoch_tree(&self, epoch: u64) -> Result<SparseMerkleTree, StateError> {
        self.check_started(epoch)?;
        let mut tree = SparseMerkleTree::new(self.settings().epoch_tree_depth, smt_one_leaf())?;
        for leaf in self.epoch_trees.leaves(epoch) {
            tree.update(to_u256(leaf.epoch_key), leaf.hashchain_result)?;
        }
        Ok(tree)
    }

    /// Nullifier tree: every spent nullifier (and index 0) set to the one sentinel.
    pub fn gen_nullifier_tree(&self) -> Result<SparseMerkleTree, StateError> {
        let mut tree =
            SparseMerkleTree::new(self.settings().nullifier_tree_depth, smt_zero_leaf())?;
        tree.update(to_u256(B256::ZERO), smt_one_leaf())?;
        for value in self.nullifiers.values() {
            tree.update(to_u256(*value), smt_one_leaf())?;
        }
        Ok(tree)
    }

    // ── Queries ──

    pub fn gst_leaf_index(&self, epoch: u64, hashed_leaf: &B256) -> Option<usize> {
        self.gst.index_of(epoch, hashed_leaf)
    }

    pub fn gst_leaves(&self, epoch: u64) -> &[GstLeaf] {
        self.gst.leaves(epoch)
    }

    /// Whether a raw nullifier (reduced into the tree's index space) was already spent.
    pub fn nullifier_exists(&self, nullifier: &B256) -> bool {
        let value = reduce_to_bits(*nullifier, self.settings().nullifier_tree_depth);
        self.nullifiers.contains(&value)
    }

    pub fn nullifier_record(&self, nullifier: &B256) -> Option<&NullifierRecord> {
        let value = reduce_to_bits(*nullifier, self.settings().nullifier_tree_depth);
        self.nullifiers.get(&value)
    }

    pub fn nullifier_count(&self) -> usize {
        self.nullifiers.len()
    }

    pub fn attestations_to(&self, epoch: u64, epoch_key: B256) -> Vec<Attestation> {
        self.attestations.to_epoch_key(epoch, epoch_key)
    }

    /// Sealed hash chain per attested epoch key. For a sealed epoch these are the stored
    /// epoch tree leaves; for the open epoch they are computed from the attestations so far.
    pub fn epoch_key_hash_chains(&self, epoch: u64) -> Vec<(B256, B256)> {
        if self.epoch_trees.is_sealed(epoch) {
            return self
                .epoch_trees
                .leaves(epoch)
                .iter()
                .map(|leaf| (leaf.epoch_key, leaf.hashchain_result))
                .collect();
        }
        self.attestations.hash_chains(epoch).into_iter().collect()
    }

    pub fn sign_up(&self, identity_commitment: &B256) -> Option<&UserSignUp> {
        self.sign_ups.get(identity_commitment)
    }

    pub fn sign_up_count(&self) -> usize {
        self.sign_ups.len()
    }
}

/// Zero or the sealed empty chain: the epoch key received nothing.
fn is_trivial_chain(chain: &B256) -> bool {
    chain.is_zero() || *chain == smt_one_leaf()
}
