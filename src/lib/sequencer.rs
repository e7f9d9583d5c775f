use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::domain::events::{EventKind, LoggedEvent, SequencerMarker};
use crate::unirep_state::{StateError, UnirepState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("marker #{position} at block {block_number} expects {kind} but its queue is empty")]
    SequenceMismatch {
        kind: EventKind,
        position: usize,
        block_number: u64,
    },

    #[error("unknown event type {value} in marker at block {block_number}")]
    UnknownEventType { value: u8, block_number: u64 },

    #[error("{count} {kind} event(s) left without a marker")]
    UnconsumedEvents { kind: EventKind, count: usize },

    #[error("{kind} at block {block_number} log {log_index} is older than events already queued")]
    OutOfOrderEvent {
        kind: EventKind,
        block_number: u64,
        log_index: u64,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Per-type FIFO queues of decoded events, each in chain order.
#[derive(Debug, Clone, Default)]
pub struct EventQueues {
    queues: BTreeMap<EventKind, VecDeque<LoggedEvent>>,
}

impl EventQueues {
    pub fn push(&mut self, event: LoggedEvent) {
        self.queues.entry(event.kind()).or_default().push_back(event);
    }

    pub fn pop(&mut self, kind: EventKind) -> Option<LoggedEvent> {
        self.queues.get_mut(&kind)?.pop_front()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.queues.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    fn first_non_empty(&self) -> Option<(EventKind, usize)> {
        self.queues
            .iter()
            .find(|(_, queue)| !queue.is_empty())
            .map(|(kind, queue)| (*kind, queue.len()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub applied: usize,
    pub by_kind: BTreeMap<EventKind, usize>,
    pub last_block: Option<u64>,
}

/// Interleaves per-type event queues according to the `Sequencer` marker stream.
///
/// A replay batch runs against working copies and is committed only when every marker
/// in it dispatched successfully and no queued event was left over.
#[derive(Debug, Clone, Default)]
pub struct EventSequencer {
    queues: EventQueues,
    last_seen: BTreeMap<EventKind, (u64, u64)>,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queues(&self) -> &EventQueues {
        &self.queues
    }

    /// Queue decoded events. The batch is sorted by `(block_number, log_index)`; an
    /// event not strictly after the last one queued for its type rejects the whole batch.
    pub fn ingest(&mut self, mut events: Vec<LoggedEvent>) -> Result<usize, SequencerError> {
        events.sort_by_key(|e| e.meta.position());

        let mut last_seen = self.last_seen.clone();
        for event in &events {
            let kind = event.kind();
            let position = event.meta.position();
            if last_seen.get(&kind).is_some_and(|last| position <= *last) {
                return Err(SequencerError::OutOfOrderEvent {
                    kind,
                    block_number: event.meta.block_number,
                    log_index: event.meta.log_index,
                });
            }
            last_seen.insert(kind, position);
        }

        let count = events.len();
        for event in events {
            self.queues.push(event);
        }
        self.last_seen = last_seen;
        Ok(count)
    }

    /// Dispatch one event per marker, in marker order, against `state`.
    pub fn replay(
        &mut self,
        state: &mut UnirepState,
        markers: &[SequencerMarker],
    ) -> Result<ReplaySummary, SequencerError> {
        let mut working = state.clone();
        let mut queues = self.queues.clone();
        let mut summary = ReplaySummary::default();

        for (position, marker) in markers.iter().enumerate() {
            let block_number = marker.meta.block_number;
            let kind = EventKind::try_from(marker.event_type).map_err(|value| {
                SequencerError::UnknownEventType {
                    value,
                    block_number,
                }
            })?;
            let event = queues.pop(kind).ok_or(SequencerError::SequenceMismatch {
                kind,
                position,
                block_number,
            })?;

            working.apply(&event.meta, &event.event)?;
            summary.applied += 1;
            *summary.by_kind.entry(kind).or_default() += 1;
            summary.last_block = Some(event.meta.block_number);
        }

        if let Some((kind, count)) = queues.first_non_empty() {
            return Err(SequencerError::UnconsumedEvents { kind, count });
        }

        *state = working;
        self.queues = queues;
        Ok(summary)
    }

    /// Ingest `events` and replay `markers` as one atomic batch.
    pub fn replay_batch(
        &mut self,
        state: &mut UnirepState,
        markers: &[SequencerMarker],
        events: Vec<LoggedEvent>,
    ) -> Result<ReplaySummary, SequencerError> {
        let mut working = self.clone();
        working.ingest(events)?;
        let summary = working.replay(state, markers)?;
        *self = working;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poseidon::field;
    use crate::domain::attestation::Attestation;
    use crate::domain::events::{
        AttestationSubmitted, EpochEnded, EventMeta, UnirepEvent, UserSignedUp,
    };
    use crate::domain::settings::Settings;
    use alloy::primitives::B256;

    fn meta(block: u64, log: u64) -> EventMeta {
        EventMeta {
            block_number: block,
            log_index: log,
            transaction_hash: B256::with_last_byte(block as u8),
        }
    }

    fn marker(block: u64, log: u64, kind: EventKind) -> SequencerMarker {
        SequencerMarker {
            meta: meta(block, log),
            event_type: kind as u8,
        }
    }

    fn sign_up_event(block: u64) -> LoggedEvent {
        LoggedEvent::new(
            meta(block, 0),
            UserSignedUp {
                epoch: 1,
                identity_commitment: field(block),
                hashed_leaf: field(1000 + block),
            },
        )
    }

    fn attestation_event(block: u64) -> LoggedEvent {
        LoggedEvent::new(
            meta(block, 0),
            AttestationSubmitted {
                epoch: 1,
                epoch_key: field(5),
                attestation: Attestation::new(7, 5, 0),
            },
        )
    }

    fn epoch_end_event(block: u64) -> LoggedEvent {
        LoggedEvent::new(
            meta(block, 0),
            EpochEnded {
                epoch: 1,
                epoch_key_hashchains: vec![],
            },
        )
    }

    fn state() -> UnirepState {
        UnirepState::new(Settings {
            global_state_tree_depth: 4,
            epoch_tree_depth: 8,
            nullifier_tree_depth: 16,
            ..Settings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_replay_follows_marker_order() {
        let mut state = state();
        let mut sequencer = EventSequencer::new();
        let events = vec![epoch_end_event(3), sign_up_event(1), attestation_event(2)];
        let markers = [
            marker(1, 1, EventKind::UserSignedUp),
            marker(2, 1, EventKind::AttestationSubmitted),
            marker(3, 1, EventKind::EpochEnded),
        ];

        let summary = sequencer.replay_batch(&mut state, &markers, events).unwrap();
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.last_block, Some(3));
        assert_eq!(state.current_epoch(), 2);
        assert_eq!(sequencer.queues().total(), 0);
    }

    #[test]
    fn test_missing_event_is_sequence_mismatch_without_side_effects() {
        let mut state = state();
        let before = state.clone();
        let mut sequencer = EventSequencer::new();
        let events = vec![sign_up_event(1), epoch_end_event(3)];
        let markers = [
            marker(1, 1, EventKind::UserSignedUp),
            marker(2, 1, EventKind::AttestationSubmitted),
            marker(3, 1, EventKind::EpochEnded),
        ];

        let err = sequencer
            .replay_batch(&mut state, &markers, events)
            .unwrap_err();
        assert_eq!(
            err,
            SequencerError::SequenceMismatch {
                kind: EventKind::AttestationSubmitted,
                position: 1,
                block_number: 2,
            }
        );
        assert_eq!(state, before);
        assert_eq!(state.current_epoch(), 1);
        assert_eq!(sequencer.queues().total(), 0);
    }

    #[test]
    fn test_unknown_marker_type() {
        let mut state = state();
        let mut sequencer = EventSequencer::new();
        let markers = [SequencerMarker {
            meta: meta(1, 0),
            event_type: 42,
        }];
        assert_eq!(
            sequencer.replay(&mut state, &markers),
            Err(SequencerError::UnknownEventType {
                value: 42,
                block_number: 1
            })
        );
    }

    #[test]
    fn test_leftover_events_rejected() {
        let mut state = state();
        let mut sequencer = EventSequencer::new();
        let events = vec![sign_up_event(1), sign_up_event(2)];
        let markers = [marker(1, 1, EventKind::UserSignedUp)];

        let err = sequencer
            .replay_batch(&mut state, &markers, events)
            .unwrap_err();
        assert_eq!(
            err,
            SequencerError::UnconsumedEvents {
                kind: EventKind::UserSignedUp,
                count: 1
            }
        );
        assert_eq!(state.sign_up_count(), 0);
    }

    #[test]
    fn test_state_error_aborts_batch() {
        let mut state = state();
        let mut sequencer = EventSequencer::new();
        let bad_epoch = LoggedEvent::new(
            meta(2, 0),
            EpochEnded {
                epoch: 5,
                epoch_key_hashchains: vec![],
            },
        );
        let markers = [
            marker(1, 1, EventKind::UserSignedUp),
            marker(2, 1, EventKind::EpochEnded),
        ];
        let err = sequencer
            .replay_batch(&mut state, &markers, vec![sign_up_event(1), bad_epoch])
            .unwrap_err();
        assert!(matches!(err, SequencerError::State(StateError::EpochMismatch { .. })));
        assert_eq!(state.sign_up_count(), 0);
    }

    #[test]
    fn test_out_of_order_ingest_rejected() {
        let mut sequencer = EventSequencer::new();
        sequencer.ingest(vec![sign_up_event(5)]).unwrap();
        let err = sequencer.ingest(vec![sign_up_event(3)]).unwrap_err();
        assert_eq!(
            err,
            SequencerError::OutOfOrderEvent {
                kind: EventKind::UserSignedUp,
                block_number: 3,
                log_index: 0,
            }
        );
        assert_eq!(sequencer.queues().len(EventKind::UserSignedUp), 1);
    }

    #[test]
    fn test_ingest_sorts_batch() {
        let mut sequencer = EventSequencer::new();
        sequencer
            .ingest(vec![sign_up_event(4), sign_up_event(2)])
            .unwrap();
        let first = sequencer.queues.pop(EventKind::UserSignedUp).unwrap();
        assert_eq!(first.meta.block_number, 2);
        assert!(matches!(first.event, UnirepEvent::UserSignedUp(_)));
    }

    #[test]
    fn test_batches_can_span_calls() {
        let mut state = state();
        let mut sequencer = EventSequencer::new();
        sequencer
            .replay_batch(
                &mut state,
                &[marker(1, 1, EventKind::UserSignedUp)],
                vec![sign_up_event(1)],
            )
            .unwrap();
        sequencer
            .replay_batch(
                &mut state,
                &[marker(2, 1, EventKind::UserSignedUp)],
                vec![sign_up_event(2)],
            )
            .unwrap();
        assert_eq!(state.gst_leaves(1).len(), 2);
    }
}
