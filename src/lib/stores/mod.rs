//! Leaf-only stores replayed from events. Trees are rebuilt from them on demand.
//!
//! Every store is append-only and serde-serialisable; re-inserting an entry with identical
//! provenance is reported rather than duplicated so a restarted replay is a no-op.

pub mod attestation;
pub mod epoch_tree;
pub mod gst;
pub mod nullifier;
pub mod settings;
pub mod sign_up;

use alloy::primitives::B256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("nullifier {value} already spent by transaction {first_tx}")]
    DuplicateNullifier { value: B256, first_tx: B256 },

    #[error("nullifier {value} is not a field element")]
    OutOfRangeNullifier { value: B256 },

    #[error("identity commitment {commitment} already signed up in transaction {first_tx}")]
    DuplicateSignUp { commitment: B256, first_tx: B256 },

    #[error("epoch {epoch} already sealed with different epoch tree leaves")]
    EpochSealConflict { epoch: u64 },
}
