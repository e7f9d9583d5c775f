use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use super::identity::gst_leaf;
use crate::crypto::poseidon::hash5;
use crate::trees::sparse::empty_root;
use crate::trees::MAX_TREE_DEPTH;

/// Protocol parameters. Written once per state; every default leaf derives from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub global_state_tree_depth: usize,
    pub global_state_tree_arity: usize,
    pub user_state_tree_depth: usize,
    pub epoch_tree_depth: usize,
    pub nullifier_tree_depth: usize,
    pub num_epoch_key_nonce_per_epoch: u64,
    pub max_reputation_budget: usize,
    /// Seconds.
    pub epoch_length: u64,
    pub attesting_fee: U256,
    /// Positive reputation granted at sign-up.
    pub sign_up_airdrop: u64,
    /// Positive reputation granted for every epoch a user walks through.
    pub epoch_airdrop: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global_state_tree_depth: 16,
            global_state_tree_arity: 2,
            user_state_tree_depth: 16,
            epoch_tree_depth: 32,
            nullifier_tree_depth: 128,
            num_epoch_key_nonce_per_epoch: 3,
            max_reputation_budget: 10,
            epoch_length: 30,
            attesting_fee: U256::ZERO,
            sign_up_airdrop: 0,
            epoch_airdrop: 0,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        let depths = [
            ("global_state_tree_depth", self.global_state_tree_depth),
            ("user_state_tree_depth", self.user_state_tree_depth),
            ("epoch_tree_depth", self.epoch_tree_depth),
            ("nullifier_tree_depth", self.nullifier_tree_depth),
        ];
        for (name, depth) in depths {
            if depth == 0 || depth > MAX_TREE_DEPTH {
                return Err(format!("{name} must be in 1..={MAX_TREE_DEPTH}, got {depth}"));
            }
        }
        if !(2..=5).contains(&self.global_state_tree_arity) {
            return Err(format!(
                "global_state_tree_arity must be in 2..=5, got {}",
                self.global_state_tree_arity
            ));
        }
        if self.num_epoch_key_nonce_per_epoch == 0 {
            return Err("num_epoch_key_nonce_per_epoch must be at least 1".into());
        }
        if self.max_reputation_budget == 0 {
            return Err("max_reputation_budget must be at least 1".into());
        }
        Ok(())
    }

    /// Empty user-state leaf: `H(0, 0, 0, 0, 0)`.
    pub fn empty_user_state_leaf(&self) -> B256 {
        hash5([B256::ZERO; 5])
    }

    pub fn empty_user_state_root(&self) -> B256 {
        empty_root(self.user_state_tree_depth, self.empty_user_state_leaf())
    }

    /// Leaf that fills unused slots of the global state tree.
    pub fn default_gst_leaf(&self) -> B256 {
        gst_leaf(B256::ZERO, self.empty_user_state_root(), 0, 0)
    }

    /// GST leaf a fresh sign-up inserts for `identity_commitment`.
    pub fn sign_up_leaf(&self, identity_commitment: B256) -> B256 {
        gst_leaf(
            identity_commitment,
            self.empty_user_state_root(),
            self.sign_up_airdrop,
            0,
        )
    }
}
