use alloy::primitives::B256;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::crypto::poseidon::{
    field, hash5, hash_left_right, reduce_to_bits, ATTESTATION_NULLIFIER_DOMAIN,
    EPOCH_KEY_NULLIFIER_DOMAIN, REPUTATION_NULLIFIER_DOMAIN,
};

/// A user's secret identity.
///
/// `commitment = H(nullifier, trapdoor)` is the public handle recorded at sign-up; every
/// epoch key and nullifier is derived from the secret `nullifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub nullifier: B256,
    pub trapdoor: B256,
}

impl Identity {
    pub fn new(nullifier: B256, trapdoor: B256) -> Self {
        Self {
            nullifier,
            trapdoor,
        }
    }

    /// Random identity with both secrets inside the BN254 field.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut nullifier = [0u8; 32];
        let mut trapdoor = [0u8; 32];
        rng.fill(&mut nullifier[1..]);
        rng.fill(&mut trapdoor[1..]);
        Self::new(B256::from(nullifier), B256::from(trapdoor))
    }

    pub fn commitment(&self) -> B256 {
        hash_left_right(self.nullifier, self.trapdoor)
    }

    /// Epoch key for `(epoch, nonce)`, reduced into an epoch tree of `epoch_tree_depth`.
    pub fn epoch_key(&self, epoch: u64, nonce: u64, epoch_tree_depth: usize) -> B256 {
        let key = hash5([
            self.nullifier,
            field(epoch),
            field(nonce),
            B256::ZERO,
            B256::ZERO,
        ]);
        reduce_to_bits(key, epoch_tree_depth)
    }

    /// Nullifier revealed when the epoch key `(epoch, nonce)` is transitioned away from.
    pub fn epoch_key_nullifier(&self, epoch: u64, nonce: u64) -> B256 {
        hash5([
            field(EPOCH_KEY_NULLIFIER_DOMAIN),
            self.nullifier,
            field(epoch),
            field(nonce),
            B256::ZERO,
        ])
    }

    /// Nullifier for one unit of reputation from `attester_id` (0 = aggregate balance).
    pub fn reputation_nullifier(&self, epoch: u64, nonce: u64, attester_id: u64) -> B256 {
        hash5([
            field(REPUTATION_NULLIFIER_DOMAIN),
            self.nullifier,
            field(epoch),
            field(nonce),
            field(attester_id),
        ])
    }

    /// Nullifier for the attestations an attester made to one epoch key.
    pub fn attestation_nullifier(&self, attester_id: u64, epoch: u64, epoch_key: B256) -> B256 {
        hash5([
            field(ATTESTATION_NULLIFIER_DOMAIN),
            self.nullifier,
            field(attester_id),
            field(epoch),
            epoch_key,
        ])
    }
}

/// Global state tree leaf: `H(commitment, user_state_root, pos_rep, neg_rep, 0)`.
pub fn gst_leaf(commitment: B256, user_state_root: B256, pos_rep: u64, neg_rep: u64) -> B256 {
    hash5([
        commitment,
        user_state_root,
        field(pos_rep),
        field(neg_rep),
        B256::ZERO,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new(field(1111), field(2222))
    }

    #[test]
    fn test_random_identity_within_field() {
        let id = Identity::random();
        assert_eq!(id.nullifier[0], 0);
        assert_eq!(id.trapdoor[0], 0);
        assert_ne!(id.nullifier, id.trapdoor);
    }

    #[test]
    fn test_commitment_binds_both_secrets() {
        let id = alice();
        let other = Identity::new(id.nullifier, field(3333));
        assert_ne!(id.commitment(), other.commitment());
    }

    #[test]
    fn test_epoch_keys_rotate_with_epoch_and_nonce() {
        let id = alice();
        let k00 = id.epoch_key(1, 0, 32);
        assert_ne!(k00, id.epoch_key(1, 1, 32));
        assert_ne!(k00, id.epoch_key(2, 0, 32));
        assert_eq!(k00, id.epoch_key(1, 0, 32));
    }

    #[test]
    fn test_epoch_key_fits_tree_depth() {
        let key = alice().epoch_key(3, 2, 8);
        assert!(key[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_nullifier_domains_are_separated() {
        let id = alice();
        let epk = id.epoch_key_nullifier(1, 0);
        let rep = id.reputation_nullifier(1, 0, 0);
        let att = id.attestation_nullifier(0, 1, B256::ZERO);
        assert_ne!(epk, rep);
        assert_ne!(rep, att);
        assert_ne!(epk, att);
    }

    #[test]
    fn test_reputation_nullifier_depends_on_attester() {
        let id = alice();
        assert_ne!(
            id.reputation_nullifier(1, 0, 0),
            id.reputation_nullifier(1, 0, 7)
        );
    }
}
