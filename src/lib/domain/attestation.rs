use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use crate::crypto::poseidon::{field, hash5, hash_left_right};

/// A reputation claim from an attester about one epoch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub attester_id: u64,
    pub pos_rep: u64,
    pub neg_rep: u64,
    pub graffiti: B256,
    pub overwrite_graffiti: bool,
}

impl Attestation {
    pub fn new(attester_id: u64, pos_rep: u64, neg_rep: u64) -> Self {
        Self {
            attester_id,
            pos_rep,
            neg_rep,
            graffiti: B256::ZERO,
            overwrite_graffiti: false,
        }
    }

    pub fn with_graffiti(mut self, graffiti: B256) -> Self {
        self.graffiti = graffiti;
        self.overwrite_graffiti = true;
        self
    }

    /// `H(attester_id, pos_rep, neg_rep, graffiti, overwrite_graffiti)`
    pub fn hash(&self) -> B256 {
        hash5([
            field(self.attester_id),
            field(self.pos_rep),
            field(self.neg_rep),
            self.graffiti,
            field(u64::from(self.overwrite_graffiti)),
        ])
    }
}

/// Append one attestation to an epoch key's running hash chain.
pub fn extend_hash_chain(chain: B256, attestation: &Attestation) -> B256 {
    hash_left_right(attestation.hash(), chain)
}

/// Seal a hash chain at epoch end: `H(1, chain)`.
pub fn seal_hash_chain(chain: B256) -> B256 {
    hash_left_right(field(1), chain)
}

/// Sealed hash chain over attestations in submission order. Starts from zero.
pub fn sealed_hash_chain<'a>(attestations: impl IntoIterator<Item = &'a Attestation>) -> B256 {
    let chain = attestations
        .into_iter()
        .fold(B256::ZERO, |chain, att| extend_hash_chain(chain, att));
    seal_hash_chain(chain)
}
