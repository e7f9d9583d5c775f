use std::fmt;

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use super::attestation::Attestation;

/// Event type carried by a `Sequencer` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    UserSignedUp = 0,
    UserStateTransitioned = 1,
    AttestationSubmitted = 2,
    EpochEnded = 3,
    ReputationNullifiersSpent = 4,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::UserSignedUp,
        EventKind::UserStateTransitioned,
        EventKind::AttestationSubmitted,
        EventKind::EpochEnded,
        EventKind::ReputationNullifiersSpent,
    ];
}

impl TryFrom<u8> for EventKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| *kind as u8 == value)
            .ok_or(value)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::UserSignedUp => "UserSignedUp",
            EventKind::UserStateTransitioned => "UserStateTransitioned",
            EventKind::AttestationSubmitted => "AttestationSubmitted",
            EventKind::EpochEnded => "EpochEnded",
            EventKind::ReputationNullifiersSpent => "ReputationNullifiersSpent",
        };
        f.write_str(name)
    }
}

/// Where a log came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl EventMeta {
    /// Total chain order of logs.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignedUp {
    pub epoch: u64,
    pub identity_commitment: B256,
    pub hashed_leaf: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSubmitted {
    pub epoch: u64,
    pub epoch_key: B256,
    pub attestation: Attestation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochEnded {
    pub epoch: u64,
    /// `(epoch_key, sealed hash chain)` pairs as committed on-chain.
    pub epoch_key_hashchains: Vec<(B256, B256)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStateTransitioned {
    pub from_epoch: u64,
    pub to_epoch: u64,
    pub new_gst_leaf: B256,
    pub epk_nullifiers: Vec<B256>,
    pub attestation_nullifiers: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationNullifiersSpent {
    pub epoch: u64,
    pub nullifiers: Vec<B256>,
}

/// Every event the state replays. Decoded once at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnirepEvent {
    UserSignedUp(UserSignedUp),
    UserStateTransitioned(UserStateTransitioned),
    AttestationSubmitted(AttestationSubmitted),
    EpochEnded(EpochEnded),
    ReputationNullifiersSpent(ReputationNullifiersSpent),
}

impl UnirepEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UnirepEvent::UserSignedUp(_) => EventKind::UserSignedUp,
            UnirepEvent::UserStateTransitioned(_) => EventKind::UserStateTransitioned,
            UnirepEvent::AttestationSubmitted(_) => EventKind::AttestationSubmitted,
            UnirepEvent::EpochEnded(_) => EventKind::EpochEnded,
            UnirepEvent::ReputationNullifiersSpent(_) => EventKind::ReputationNullifiersSpent,
        }
    }
}

impl From<UserSignedUp> for UnirepEvent {
    fn from(event: UserSignedUp) -> Self {
        UnirepEvent::UserSignedUp(event)
    }
}

impl From<UserStateTransitioned> for UnirepEvent {
    fn from(event: UserStateTransitioned) -> Self {
        UnirepEvent::UserStateTransitioned(event)
    }
}

impl From<AttestationSubmitted> for UnirepEvent {
    fn from(event: AttestationSubmitted) -> Self {
        UnirepEvent::AttestationSubmitted(event)
    }
}

impl From<EpochEnded> for UnirepEvent {
    fn from(event: EpochEnded) -> Self {
        UnirepEvent::EpochEnded(event)
    }
}

impl From<ReputationNullifiersSpent> for UnirepEvent {
    fn from(event: ReputationNullifiersSpent) -> Self {
        UnirepEvent::ReputationNullifiersSpent(event)
    }
}

/// A decoded event together with its log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub meta: EventMeta,
    pub event: UnirepEvent,
}

impl LoggedEvent {
    pub fn new(meta: EventMeta, event: impl Into<UnirepEvent>) -> Self {
        Self {
            meta,
            event: event.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// A `Sequencer(epoch, userEvent)` log. The raw type byte is kept so unknown values
/// surface at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerMarker {
    pub meta: EventMeta,
    pub event_type: u8,
}
