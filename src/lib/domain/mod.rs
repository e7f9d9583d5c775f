pub mod attestation;
pub mod events;
pub mod identity;
pub mod settings;
