//! End-to-end replay scenarios over the mock chain.

use alloy::primitives::B256;

use unirep_state::adapters::mock_chain::MockEventSource;
use unirep_state::crypto::poseidon::{field, smt_one_leaf};
use unirep_state::domain::attestation::Attestation;
use unirep_state::domain::events::{
    AttestationSubmitted, EpochEnded, EventKind, EventMeta, LoggedEvent,
    ReputationNullifiersSpent, SequencerMarker, UserSignedUp,
};
use unirep_state::domain::identity::Identity;
use unirep_state::domain::settings::Settings;
use unirep_state::indexer::{Indexer, IndexerError, IndexerOptions};
use unirep_state::ports::events::EventSource;
use unirep_state::proof_inputs::ProofInputBuilder;
use unirep_state::sequencer::{EventSequencer, SequencerError};
use unirep_state::stores::StoreError;
use unirep_state::trees::incremental::IncrementalTree;
use unirep_state::trees::sparse::empty_root;
use unirep_state::unirep_state::{StateError, UnirepState};
use unirep_state::user_state::{Reputation, UserState, UserStateError};

fn settings() -> Settings {
    Settings {
        global_state_tree_depth: 4,
        user_state_tree_depth: 4,
        epoch_tree_depth: 16,
        nullifier_tree_depth: 32,
        max_reputation_budget: 4,
        sign_up_airdrop: 30,
        ..Settings::default()
    }
}

fn alice() -> Identity {
    Identity::new(field(0xA11CE), field(0x1))
}

fn bob() -> Identity {
    Identity::new(field(0xB0B), field(0x2))
}

fn meta(block: u64, log_index: u64) -> EventMeta {
    EventMeta {
        block_number: block,
        log_index,
        transaction_hash: B256::with_last_byte(block as u8),
    }
}

fn sign_up(settings: &Settings, id: &Identity, epoch: u64) -> UserSignedUp {
    UserSignedUp {
        epoch,
        identity_commitment: id.commitment(),
        hashed_leaf: settings.sign_up_leaf(id.commitment()),
    }
}

/// Replay the chain's whole log into a fresh state.
async fn replay(chain: &MockEventSource, settings: &Settings) -> UnirepState {
    let head = chain.head_block().await.unwrap();
    let batch = chain.fetch(1, head).await.unwrap();
    let mut state = UnirepState::new(settings.clone()).unwrap();
    EventSequencer::new()
        .replay_batch(&mut state, &batch.markers, batch.events)
        .unwrap();
    state
}

/// Two sign-ups, one attestation each, epoch end, alice's transition and a spend of 2.
async fn build_log(chain: &MockEventSource, settings: &Settings) {
    let (alice, bob) = (alice(), bob());
    chain.emit(sign_up(settings, &alice, 1)).await;
    chain.emit(sign_up(settings, &bob, 1)).await;

    chain
        .emit_block(vec![
            AttestationSubmitted {
                epoch: 1,
                epoch_key: alice.epoch_key(1, 0, settings.epoch_tree_depth),
                attestation: Attestation::new(7, 5, 0),
            }
            .into(),
            AttestationSubmitted {
                epoch: 1,
                epoch_key: bob.epoch_key(1, 1, settings.epoch_tree_depth),
                attestation: Attestation::new(3, 1, 2),
            }
            .into(),
        ])
        .await;

    let state = replay(chain, settings).await;
    chain
        .emit(EpochEnded {
            epoch: 1,
            epoch_key_hashchains: state.epoch_key_hash_chains(1),
        })
        .await;

    let state = replay(chain, settings).await;
    let user = UserState::new(&state, alice);
    let transition = ProofInputBuilder::new(&user).transition_inputs().unwrap();
    chain.emit(transition.to_event()).await;

    let state = replay(chain, settings).await;
    let user = UserState::new(&state, alice);
    let rep = ProofInputBuilder::new(&user)
        .reputation_inputs(0, 2, false)
        .unwrap();
    chain
        .emit(ReputationNullifiersSpent {
            epoch: 2,
            nullifiers: rep.rep_nullifiers[..2].to_vec(),
        })
        .await;
}

fn roots(state: &UnirepState) -> Vec<B256> {
    let mut roots = Vec::new();
    for epoch in 1..=state.current_epoch() {
        roots.push(state.gen_gs_tree(epoch).unwrap().root());
        roots.push(state.gen_epoch_tree(epoch).unwrap().root());
    }
    roots.push(state.gen_nullifier_tree().unwrap().root());
    roots
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let settings = settings();
    let chain = MockEventSource::new();
    build_log(&chain, &settings).await;

    let first = replay(&chain, &settings).await;
    let second = replay(&chain, &settings).await;
    assert_eq!(roots(&first), roots(&second));
    assert_eq!(first, second);
}

#[test]
fn test_duplicate_nullifier_from_other_transaction() {
    let mut state = UnirepState::new(settings()).unwrap();
    let spent = ReputationNullifiersSpent {
        epoch: 1,
        nullifiers: vec![field(11), field(12)],
    };
    state.on_reputation_nullifiers_spent(&meta(1, 0), &spent).unwrap();
    // Same transaction again is a no-op.
    state.on_reputation_nullifiers_spent(&meta(1, 0), &spent).unwrap();
    assert_eq!(state.nullifier_count(), 2);

    let err = state
        .on_reputation_nullifiers_spent(
            &meta(2, 0),
            &ReputationNullifiersSpent {
                epoch: 1,
                nullifiers: vec![field(12)],
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        StateError::Store(StoreError::DuplicateNullifier {
            value: field(12),
            first_tx: meta(1, 0).transaction_hash,
        })
    );
}

#[test]
fn test_epoch_monotonicity() {
    let settings = settings();
    let mut state = UnirepState::new(settings.clone()).unwrap();
    let end = |epoch| EpochEnded {
        epoch,
        epoch_key_hashchains: vec![],
    };

    assert!(matches!(
        state.on_epoch_ended(&meta(1, 0), &end(2)),
        Err(StateError::EpochMismatch {
            expected: 1,
            got: 2,
            ..
        })
    ));
    state.on_epoch_ended(&meta(2, 0), &end(1)).unwrap();
    assert_eq!(state.current_epoch(), 2);

    let empty = IncrementalTree::new(
        settings.global_state_tree_depth,
        settings.default_gst_leaf(),
        settings.global_state_tree_arity,
    )
    .unwrap();
    assert_eq!(state.gen_gs_tree(2).unwrap().root(), empty.root());
    assert!(matches!(
        state.on_epoch_ended(&meta(3, 0), &end(3)),
        Err(StateError::EpochMismatch { expected: 2, .. })
    ));
}

#[tokio::test]
async fn test_leaf_indices_are_stable() {
    let settings = settings();
    let chain = MockEventSource::new();
    chain.emit(sign_up(&settings, &alice(), 1)).await;
    chain.emit(sign_up(&settings, &bob(), 1)).await;
    let early = replay(&chain, &settings).await;

    chain.emit(sign_up(&settings, &Identity::new(field(3), field(4)), 1)).await;
    let late = replay(&chain, &settings).await;

    let bob_leaf = settings.sign_up_leaf(bob().commitment());
    assert_eq!(early.gst_leaf_index(1, &bob_leaf), Some(1));
    assert_eq!(late.gst_leaf_index(1, &bob_leaf), Some(1));
    assert_eq!(late.gst_leaves(1)[..2], early.gst_leaves(1)[..]);

    let tree = late.gen_gs_tree(1).unwrap();
    let proof = tree.prove(1).unwrap();
    assert_eq!(proof.leaf, bob_leaf);
    assert_eq!(proof.root, tree.root());
    assert!(proof.verify());
}

#[tokio::test]
async fn test_attestations_fold_with_graffiti_overwrite() {
    let settings = settings();
    let chain = MockEventSource::new();
    let id = alice();
    let graffiti = field(0x6AFF);
    let epoch_key = id.epoch_key(1, 0, settings.epoch_tree_depth);

    chain.emit(sign_up(&settings, &id, 1)).await;
    chain
        .emit(AttestationSubmitted {
            epoch: 1,
            epoch_key,
            attestation: Attestation::new(5, 2, 0),
        })
        .await;
    chain
        .emit(AttestationSubmitted {
            epoch: 1,
            epoch_key,
            attestation: Attestation::new(5, 1, 3).with_graffiti(graffiti),
        })
        .await;
    let state = replay(&chain, &settings).await;
    chain
        .emit(EpochEnded {
            epoch: 1,
            epoch_key_hashchains: state.epoch_key_hash_chains(1),
        })
        .await;
    let state = replay(&chain, &settings).await;

    let user_state = UserState::new(&state, id).state_at(2).unwrap();
    assert_eq!(
        user_state.user_state_tree.reputation(5),
        Some(&Reputation {
            pos_rep: 3,
            neg_rep: 3,
            graffiti,
        })
    );
    assert_eq!(user_state.pos_rep, 30 + 3);
    assert_eq!(user_state.neg_rep, 3);
}

#[test]
fn test_nonce_search_skips_consumed() {
    let settings = Settings {
        sign_up_airdrop: 5,
        ..settings()
    };
    let id = alice();
    let mut state = UnirepState::new(settings.clone()).unwrap();
    state
        .on_user_sign_up(&meta(1, 0), &sign_up(&settings, &id, 1))
        .unwrap();
    state
        .on_reputation_nullifiers_spent(
            &meta(2, 0),
            &ReputationNullifiersSpent {
                epoch: 1,
                nullifiers: [0, 1, 3]
                    .iter()
                    .map(|&nonce| id.reputation_nullifier(1, nonce, 0))
                    .collect(),
            },
        )
        .unwrap();

    let user = UserState::new(&state, id);
    assert_eq!(user.find_spendable_nonces(1, 2).unwrap(), vec![2, 4]);
    assert_eq!(user.find_spendable_nonce(1, 2).unwrap(), 2);
    assert_eq!(
        user.find_spendable_nonces(1, 3).unwrap_err(),
        UserStateError::InsufficientReputation {
            requested: 3,
            available: 2,
        }
    );
}

#[tokio::test]
async fn test_end_to_end_reputation() {
    let settings = settings();
    let chain = MockEventSource::new();
    build_log(&chain, &settings).await;
    let state = replay(&chain, &settings).await;

    let user = UserState::new(&state, alice());
    let states = user.derive_states().unwrap();
    assert_eq!(states[&2].pos_rep, 35);
    assert_eq!(states[&2].neg_rep, 0);
    assert_eq!(states[&2].gst_leaf_index, Some(0));
    assert_ne!(
        state.gen_epoch_tree(1).unwrap().root(),
        empty_root(settings.epoch_tree_depth, smt_one_leaf())
    );

    // The two spent nonces are gone; the next search starts at 2.
    assert_eq!(user.find_spendable_nonce(2, 1).unwrap(), 2);
    assert!(matches!(
        ProofInputBuilder::new(&user).transition_inputs(),
        Err(UserStateError::AlreadyTransitioned { epoch: 2 })
    ));
}

#[test]
fn test_sequence_mismatch_has_no_side_effects() {
    let settings = settings();
    let mut state = UnirepState::new(settings.clone()).unwrap();
    let before = state.clone();

    let events = vec![
        LoggedEvent::new(meta(1, 0), sign_up(&settings, &alice(), 1)),
        LoggedEvent::new(
            meta(3, 0),
            EpochEnded {
                epoch: 1,
                epoch_key_hashchains: vec![],
            },
        ),
    ];
    let markers: Vec<SequencerMarker> = [
        (meta(1, 1), EventKind::UserSignedUp),
        (meta(2, 1), EventKind::AttestationSubmitted),
        (meta(3, 1), EventKind::EpochEnded),
    ]
    .into_iter()
    .map(|(meta, kind)| SequencerMarker {
        meta,
        event_type: kind as u8,
    })
    .collect();

    let err = EventSequencer::new()
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
}

#[tokio::test]
async fn test_reapplying_a_batch_after_restart_is_noop() {
    let settings = settings();
    let chain = MockEventSource::new();
    build_log(&chain, &settings).await;
    let mut state = replay(&chain, &settings).await;
    let before = state.clone();

    let head = chain.head_block().await.unwrap();
    let batch = chain.fetch(1, head).await.unwrap();
    let summary = EventSequencer::new()
        .replay_batch(&mut state, &batch.markers, batch.events)
        .unwrap();

    assert_eq!(summary.applied, batch.markers.len());
    assert_eq!(state, before);
    assert_eq!(roots(&state), roots(&before));
}

#[tokio::test]
async fn test_indexer_matches_direct_replay() {
    let settings = settings();
    let chain = MockEventSource::new();
    build_log(&chain, &settings).await;
    let direct = replay(&chain, &settings).await;

    let options = IndexerOptions {
        batch_size: 2,
        ..IndexerOptions::default()
    };
    let indexer = Indexer::new(chain, settings, 1, options).unwrap();
    let head = indexer.catch_up().await.unwrap();

    let snapshot = indexer.snapshot().await;
    assert_eq!(snapshot.as_of_block, head);
    assert_eq!(roots(&snapshot.state), roots(&direct));
    assert_eq!(snapshot.state, direct);

    // An unknown marker stops replay without touching the committed snapshot.
    indexer.source().emit_marker(9).await;
    assert!(matches!(
        indexer.catch_up().await,
        Err(IndexerError::Replay {
            source: SequencerError::UnknownEventType { value: 9, .. },
            ..
        })
    ));
    assert_eq!(indexer.snapshot().await, snapshot);
}
