//! Circuit input assembly.
//!
//! The structures here are handed to an external prover as JSON. Their field layout is
//! shared with the circuits and changes only together with them.

use std::collections::BTreeSet;

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use crate::crypto::poseidon::{reduce_to_bits, to_u256};
use crate::domain::events::UserStateTransitioned;
use crate::trees::incremental::IncrementalMerkleProof;
use crate::trees::sparse::SparseMerkleProof;
use crate::user_state::{TransitionState, UserState, UserStateError, AGGREGATE_ATTESTER_ID};

/// Padding for unused reputation nonce slots.
pub const UNUSED_NONCE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochKeyProofInputs {
    pub epoch: u64,
    pub epoch_key_nonce: u64,
    pub epoch_key: B256,
    pub identity_nullifier: B256,
    pub identity_trapdoor: B256,
    pub user_state_root: B256,
    pub pos_rep: u64,
    pub neg_rep: u64,
    pub gst_proof: IncrementalMerkleProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationProofInputs {
    pub epoch: u64,
    pub epoch_key_nonce: u64,
    pub epoch_key: B256,
    pub identity_nullifier: B256,
    pub identity_trapdoor: B256,
    pub user_state_root: B256,
    pub pos_rep: u64,
    pub neg_rep: u64,
    pub gst_proof: IncrementalMerkleProof,
    pub attester_id: u64,
    /// `max_reputation_budget` slots, unused ones set to [`UNUSED_NONCE`].
    pub rep_nonces: Vec<i64>,
    /// 1 for every active slot of `rep_nonces`.
    pub selectors: Vec<u8>,
    /// Nullifier per active slot, zero padded.
    pub rep_nullifiers: Vec<B256>,
    pub nullifier_tree_root: B256,
    /// Non-membership path per active nullifier, when requested.
    pub nullifier_paths: Option<Vec<SparseMerkleProof>>,
}

/// Epoch tree data for one of the user's epoch keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochKeyTransition {
    pub epoch: u64,
    pub nonce: u64,
    pub epoch_key: B256,
    pub epoch_key_nullifier: B256,
    pub epoch_tree_proof: SparseMerkleProof,
    pub attestation_nullifiers: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStateTransitionInputs {
    pub from_epoch: u64,
    pub to_epoch: u64,
    pub identity_nullifier: B256,
    pub identity_trapdoor: B256,
    pub from_gst_proof: IncrementalMerkleProof,
    pub epoch_keys: Vec<EpochKeyTransition>,
    pub new_user_state_root: B256,
    pub new_pos_rep: u64,
    pub new_neg_rep: u64,
    pub new_gst_leaf: B256,
}

impl UserStateTransitionInputs {
    pub fn epk_nullifiers(&self) -> Vec<B256> {
        self.epoch_keys
            .iter()
            .map(|k| k.epoch_key_nullifier)
            .collect()
    }

    pub fn attestation_nullifiers(&self) -> Vec<B256> {
        self.epoch_keys
            .iter()
            .flat_map(|k| k.attestation_nullifiers.iter().copied())
            .collect()
    }

    /// Public outputs of the transition, in the shape the contract emits them.
    pub fn to_event(&self) -> UserStateTransitioned {
        UserStateTransitioned {
            from_epoch: self.from_epoch,
            to_epoch: self.to_epoch,
            new_gst_leaf: self.new_gst_leaf,
            epk_nullifiers: self.epk_nullifiers(),
            attestation_nullifiers: self.attestation_nullifiers(),
        }
    }
}

/// Builds circuit inputs from a user's derived state.
pub struct ProofInputBuilder<'u, 'a> {
    user: &'u UserState<'a>,
}

impl<'u, 'a> ProofInputBuilder<'u, 'a> {
    pub fn new(user: &'u UserState<'a>) -> Self {
        Self { user }
    }

    fn check_nonce(&self, nonce: u64) -> Result<(), UserStateError> {
        let max = self.user.unirep().settings().num_epoch_key_nonce_per_epoch;
        if nonce >= max {
            return Err(UserStateError::InvalidNonce { nonce, max });
        }
        Ok(())
    }

    fn gst_proof(&self, state: &TransitionState) -> Result<IncrementalMerkleProof, UserStateError> {
        let epoch = state.to_epoch;
        let index = state
            .gst_leaf_index
            .ok_or(UserStateError::LeafNotFound { epoch })?;
        self.user
            .unirep()
            .gen_gs_tree(epoch)?
            .prove(index)
            .ok_or(UserStateError::LeafNotFound { epoch })
    }

    pub fn epoch_key_inputs(
        &self,
        epoch_key_nonce: u64,
    ) -> Result<EpochKeyProofInputs, UserStateError> {
        self.check_nonce(epoch_key_nonce)?;
        let state = self.user.latest_state()?;
        let identity = self.user.identity();
        let epoch = state.to_epoch;

        Ok(EpochKeyProofInputs {
            epoch,
            epoch_key_nonce,
            epoch_key: identity.epoch_key(
                epoch,
                epoch_key_nonce,
                self.user.unirep().settings().epoch_tree_depth,
            ),
            identity_nullifier: identity.nullifier,
            identity_trapdoor: identity.trapdoor,
            user_state_root: state.user_state_tree.root(),
            pos_rep: state.pos_rep,
            neg_rep: state.neg_rep,
            gst_proof: self.gst_proof(&state)?,
        })
    }

    /// Inputs for spending `amount` units of aggregate reputation in the current epoch.
    pub fn reputation_inputs(
        &self,
        epoch_key_nonce: u64,
        amount: usize,
        with_nullifier_paths: bool,
    ) -> Result<ReputationProofInputs, UserStateError> {
        self.check_nonce(epoch_key_nonce)?;
        let unirep = self.user.unirep();
        let settings = unirep.settings();
        let state = self.user.latest_state()?;
        let identity = self.user.identity();
        let epoch = state.to_epoch;

        let nonces = self.user.find_spendable_nonces(epoch, amount)?;
        let budget = settings.max_reputation_budget;

        let mut rep_nonces = vec![UNUSED_NONCE; budget];
        let mut selectors = vec![0u8; budget];
        let mut rep_nullifiers = vec![B256::ZERO; budget];
        for (slot, &nonce) in nonces.iter().enumerate() {
            rep_nonces[slot] = nonce as i64;
            selectors[slot] = 1;
            rep_nullifiers[slot] =
                identity.reputation_nullifier(epoch, nonce, AGGREGATE_ATTESTER_ID);
        }

        let nullifier_tree = unirep.gen_nullifier_tree()?;
        let nullifier_paths = if with_nullifier_paths {
            let paths = rep_nullifiers[..nonces.len()]
                .iter()
                .map(|n| {
                    let index = to_u256(reduce_to_bits(*n, settings.nullifier_tree_depth));
                    nullifier_tree.prove(index)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(paths)
        } else {
            None
        };

        Ok(ReputationProofInputs {
            epoch,
            epoch_key_nonce,
            epoch_key: identity.epoch_key(epoch, epoch_key_nonce, settings.epoch_tree_depth),
            identity_nullifier: identity.nullifier,
            identity_trapdoor: identity.trapdoor,
            user_state_root: state.user_state_tree.root(),
            pos_rep: state.pos_rep,
            neg_rep: state.neg_rep,
            gst_proof: self.gst_proof(&state)?,
            attester_id: AGGREGATE_ATTESTER_ID,
            rep_nonces,
            selectors,
            rep_nullifiers,
            nullifier_tree_root: nullifier_tree.root(),
            nullifier_paths,
        })
    }

    /// Inputs for moving the user from the last epoch holding their leaf to the current one.
    pub fn transition_inputs(&self) -> Result<UserStateTransitionInputs, UserStateError> {
        let unirep = self.user.unirep();
        let settings = unirep.settings();
        let identity = self.user.identity();
        let states = self.user.derive_states()?;
        let current_epoch = unirep.current_epoch();

        let latest = states
            .get(&current_epoch)
            .ok_or(UserStateError::LeafNotFound {
                epoch: current_epoch,
            })?;
        if latest.gst_leaf_index.is_some() {
            return Err(UserStateError::AlreadyTransitioned {
                epoch: current_epoch,
            });
        }
        let from = states
            .values()
            .rev()
            .find(|s| s.gst_leaf_index.is_some())
            .ok_or(UserStateError::LeafNotFound {
                epoch: self.user.sign_up()?.epoch,
            })?;

        let mut epoch_keys = Vec::new();
        for epoch in from.to_epoch..current_epoch {
            let epoch_tree = unirep.gen_epoch_tree(epoch)?;
            for nonce in 0..settings.num_epoch_key_nonce_per_epoch {
                let epoch_key = identity.epoch_key(epoch, nonce, settings.epoch_tree_depth);
                let attesters: BTreeSet<u64> = unirep
                    .attestations_to(epoch, epoch_key)
                    .iter()
                    .map(|a| a.attester_id)
                    .collect();
                epoch_keys.push(EpochKeyTransition {
                    epoch,
                    nonce,
                    epoch_key,
                    epoch_key_nullifier: identity.epoch_key_nullifier(epoch, nonce),
                    epoch_tree_proof: epoch_tree.prove(to_u256(epoch_key))?,
                    attestation_nullifiers: attesters
                        .into_iter()
                        .map(|attester| identity.attestation_nullifier(attester, epoch, epoch_key))
                        .collect(),
                });
            }
        }

        Ok(UserStateTransitionInputs {
            from_epoch: from.to_epoch,
            to_epoch: current_epoch,
            identity_nullifier: identity.nullifier,
            identity_trapdoor: identity.trapdoor,
            from_gst_proof: self.gst_proof(from)?,
            epoch_keys,
            new_user_state_root: latest.user_state_tree.root(),
            new_pos_rep: latest.pos_rep,
            new_neg_rep: latest.neg_rep,
            new_gst_leaf: latest.gst_leaf,
        })
    }
}
