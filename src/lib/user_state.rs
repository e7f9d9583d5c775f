use std::collections::BTreeMap;

use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::crypto::poseidon::{field, hash5};
use crate::domain::attestation::Attestation;
use crate::domain::identity::{gst_leaf, Identity};
use crate::domain::settings::Settings;
use crate::stores::sign_up::UserSignUp;
use crate::trees::sparse::{SparseMerkleProof, SparseMerkleTree};
use crate::trees::TreeError;
use crate::unirep_state::{StateError, UnirepState};

/// Attester slot used for the aggregate reputation balance.
pub const AGGREGATE_ATTESTER_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserStateError {
    #[error("identity commitment {0} has not signed up")]
    NotSignedUp(B256),

    #[error("not enough reputation to spend: requested {requested}, available {available}")]
    InsufficientReputation { requested: usize, available: usize },

    #[error("spend of {requested} exceeds the reputation budget of {max}")]
    ExceedsBudget { requested: usize, max: usize },

    #[error("epoch {epoch} is outside {sign_up_epoch}..={current_epoch}")]
    EpochNotReached {
        epoch: u64,
        sign_up_epoch: u64,
        current_epoch: u64,
    },

    #[error("user state leaf not found in the global state tree of epoch {epoch}")]
    LeafNotFound { epoch: u64 },

    #[error("epoch key nonce {nonce} out of range (max {max})")]
    InvalidNonce { nonce: u64, max: u64 },

    #[error("user already transitioned to epoch {epoch}")]
    AlreadyTransitioned { epoch: u64 },

    #[error("reputation from attester {attester_id} overflows u64")]
    ReputationOverflow { attester_id: u64 },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Reputation one attester gave a user, summed over all epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reputation {
    pub pos_rep: u64,
    pub neg_rep: u64,
    pub graffiti: B256,
}

impl Reputation {
    /// User-state leaf: `H(pos_rep, neg_rep, graffiti, 0, 0)`.
    pub fn hash(&self) -> B256 {
        hash5([
            field(self.pos_rep),
            field(self.neg_rep),
            self.graffiti,
            B256::ZERO,
            B256::ZERO,
        ])
    }

    fn seed(attestation: &Attestation) -> Self {
        Self {
            pos_rep: attestation.pos_rep,
            neg_rep: attestation.neg_rep,
            graffiti: attestation.graffiti,
        }
    }

    fn absorb(&self, attestation: &Attestation) -> Option<Self> {
        Some(Self {
            pos_rep: self.pos_rep.checked_add(attestation.pos_rep)?,
            neg_rep: self.neg_rep.checked_add(attestation.neg_rep)?,
            graffiti: if attestation.overwrite_graffiti {
                attestation.graffiti
            } else {
                self.graffiti
            },
        })
    }
}

/// Per-user tree mapping attester id to that attester's [`Reputation`].
#[derive(Debug, Clone)]
pub struct UserStateTree {
    tree: SparseMerkleTree,
    records: BTreeMap<u64, Reputation>,
}

impl UserStateTree {
    pub fn new(settings: &Settings) -> Result<Self, TreeError> {
        Ok(Self {
            tree: SparseMerkleTree::new(
                settings.user_state_tree_depth,
                settings.empty_user_state_leaf(),
            )?,
            records: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> B256 {
        self.tree.root()
    }

    pub fn reputation(&self, attester_id: u64) -> Option<&Reputation> {
        self.records.get(&attester_id)
    }

    pub fn records(&self) -> &BTreeMap<u64, Reputation> {
        &self.records
    }

    /// Fold attestations into a new tree; `self` is left untouched.
    pub fn apply(&self, attestations: &[Attestation]) -> Result<Self, UserStateError> {
        let mut next = self.clone();
        for attestation in attestations {
            let attester_id = attestation.attester_id;
            let reputation = match next.records.get(&attester_id) {
                Some(rep) => rep
                    .absorb(attestation)
                    .ok_or(UserStateError::ReputationOverflow { attester_id })?,
                None => Reputation::seed(attestation),
            };
            next.tree.update(U256::from(attester_id), reputation.hash())?;
            next.records.insert(attester_id, reputation);
        }
        Ok(next)
    }

    pub fn prove(&self, attester_id: u64) -> Result<SparseMerkleProof, TreeError> {
        self.tree.prove(U256::from(attester_id))
    }
}

/// A user's state on entering `to_epoch`, after folding what they received in
/// `from_epoch`. The sign-up snapshot has `from_epoch == to_epoch`.
#[derive(Debug, Clone)]
pub struct TransitionState {
    pub from_epoch: u64,
    pub to_epoch: u64,
    pub user_state_tree: UserStateTree,
    /// Attestations received during `from_epoch`.
    pub attestations: Vec<Attestation>,
    pub pos_rep: u64,
    pub neg_rep: u64,
    pub gst_leaf: B256,
    /// Position of `gst_leaf` in the GST of `to_epoch`, if it was inserted there.
    pub gst_leaf_index: Option<usize>,
}

impl TransitionState {
    pub fn spendable(&self) -> u64 {
        self.pos_rep.saturating_sub(self.neg_rep)
    }
}

/// Read-only derivation of one user's history from a replayed [`UnirepState`].
pub struct UserState<'a> {
    unirep: &'a UnirepState,
    identity: Identity,
}

impl<'a> UserState<'a> {
    pub fn new(unirep: &'a UnirepState, identity: Identity) -> Self {
        Self { unirep, identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn unirep(&self) -> &'a UnirepState {
        self.unirep
    }

    pub fn sign_up(&self) -> Result<&'a UserSignUp, UserStateError> {
        let commitment = self.identity.commitment();
        self.unirep
            .sign_up(&commitment)
            .ok_or(UserStateError::NotSignedUp(commitment))
    }

    pub fn epoch_keys(&self, epoch: u64) -> Vec<B256> {
        let settings = self.unirep.settings();
        (0..settings.num_epoch_key_nonce_per_epoch)
            .map(|nonce| {
                self.identity
                    .epoch_key(epoch, nonce, settings.epoch_tree_depth)
            })
            .collect()
    }

    /// Attestations to this user's epoch keys in `epoch`, nonce by nonce.
    pub fn received_attestations(&self, epoch: u64) -> Vec<Attestation> {
        self.epoch_keys(epoch)
            .into_iter()
            .flat_map(|key| self.unirep.attestations_to(epoch, key))
            .collect()
    }

    fn resolve(&self, mut state: TransitionState) -> TransitionState {
        state.gst_leaf_index = self.unirep.gst_leaf_index(state.to_epoch, &state.gst_leaf);
        state
    }

    fn step(&self, state: &TransitionState, epoch: u64) -> Result<TransitionState, UserStateError> {
        let attestations = self.received_attestations(epoch);
        let user_state_tree = state.user_state_tree.apply(&attestations)?;

        let overflow = UserStateError::ReputationOverflow {
            attester_id: AGGREGATE_ATTESTER_ID,
        };
        let pos_rep = attestations
            .iter()
            .map(|a| a.pos_rep)
            .chain([self.unirep.settings().epoch_airdrop])
            .try_fold(state.pos_rep, u64::checked_add)
            .ok_or_else(|| overflow.clone())?;
        let neg_rep = attestations
            .iter()
            .map(|a| a.neg_rep)
            .try_fold(state.neg_rep, u64::checked_add)
            .ok_or(overflow)?;

        Ok(TransitionState {
            from_epoch: epoch,
            to_epoch: epoch + 1,
            gst_leaf: gst_leaf(
                self.identity.commitment(),
                user_state_tree.root(),
                pos_rep,
                neg_rep,
            ),
            user_state_tree,
            attestations,
            pos_rep,
            neg_rep,
            gst_leaf_index: None,
        })
    }

    /// Snapshot per epoch from sign-up through the current epoch.
    pub fn derive_states(&self) -> Result<BTreeMap<u64, TransitionState>, UserStateError> {
        let sign_up = self.sign_up()?;
        let settings = self.unirep.settings();
        let current_epoch = self.unirep.current_epoch();

        let initial = TransitionState {
            from_epoch: sign_up.epoch,
            to_epoch: sign_up.epoch,
            user_state_tree: UserStateTree::new(settings)?,
            attestations: Vec::new(),
            pos_rep: settings.sign_up_airdrop,
            neg_rep: 0,
            gst_leaf: sign_up.hashed_leaf,
            gst_leaf_index: None,
        };

        let (mut states, last) = (sign_up.epoch..current_epoch).try_fold(
            (BTreeMap::new(), initial),
            |(mut states, state), epoch| {
                let state = self.resolve(state);
                let next = self.step(&state, epoch)?;
                states.insert(epoch, state);
                Ok::<_, UserStateError>((states, next))
            },
        )?;
        states.insert(current_epoch, self.resolve(last));
        Ok(states)
    }

    pub fn state_at(&self, epoch: u64) -> Result<TransitionState, UserStateError> {
        let sign_up_epoch = self.sign_up()?.epoch;
        let current_epoch = self.unirep.current_epoch();
        self.derive_states()?
            .remove(&epoch)
            .ok_or(UserStateError::EpochNotReached {
                epoch,
                sign_up_epoch,
                current_epoch,
            })
    }

    pub fn latest_state(&self) -> Result<TransitionState, UserStateError> {
        self.state_at(self.unirep.current_epoch())
    }

    fn unconsumed_nonces(
        &self,
        epoch: u64,
        attester_id: u64,
        balance: u64,
        amount: usize,
    ) -> Result<Vec<u64>, UserStateError> {
        let max = self.unirep.settings().max_reputation_budget;
        if amount > max {
            return Err(UserStateError::ExceedsBudget {
                requested: amount,
                max,
            });
        }

        let nonces: Vec<u64> = (0..balance)
            .filter(|&nonce| {
                let nullifier = self.identity.reputation_nullifier(epoch, nonce, attester_id);
                !self.unirep.nullifier_exists(&nullifier)
            })
            .take(amount)
            .collect();
        if nonces.len() < amount {
            return Err(UserStateError::InsufficientReputation {
                requested: amount,
                available: nonces.len(),
            });
        }
        Ok(nonces)
    }

    /// First-fit list of `amount` unconsumed nonces below the spendable balance of `epoch`.
    pub fn find_spendable_nonces(
        &self,
        epoch: u64,
        amount: usize,
    ) -> Result<Vec<u64>, UserStateError> {
        let state = self.state_at(epoch)?;
        self.unconsumed_nonces(epoch, AGGREGATE_ATTESTER_ID, state.spendable(), amount)
    }

    /// First nonce of [`Self::find_spendable_nonces`]; 0 when `amount` is 0.
    pub fn find_spendable_nonce(&self, epoch: u64, amount: usize) -> Result<u64, UserStateError> {
        let nonces = self.find_spendable_nonces(epoch, amount)?;
        Ok(nonces.first().copied().unwrap_or(0))
    }

    /// Same search against the reputation one attester gave this user.
    pub fn find_spendable_nonces_for_attester(
        &self,
        epoch: u64,
        attester_id: u64,
        amount: usize,
    ) -> Result<Vec<u64>, UserStateError> {
        let state = self.state_at(epoch)?;
        let balance = state
            .user_state_tree
            .reputation(attester_id)
            .map_or(0, |rep| rep.pos_rep.saturating_sub(rep.neg_rep));
        self.unconsumed_nonces(epoch, attester_id, balance, amount)
    }
}
