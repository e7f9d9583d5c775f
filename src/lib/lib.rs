//! Unirep state indexer
//!
//! Replays the Unirep contract's event log into a queryable protocol state:
//! global state trees, epoch trees, the nullifier set and per-user reputation.
//! Proof input preparation for the protocol circuits sits on top of that state.

pub mod adapters;
pub mod crypto;
pub mod domain;
pub mod indexer;
pub mod ports;
pub mod proof_inputs;
pub mod sequencer;
pub mod stores;
pub mod trees;
pub mod unirep_state;
pub mod user_state;
