//! Unirep Replay Demo
//!
//! Drives a user through sign-up, attestation, epoch end, state transition and a
//! reputation spend on an in-process mock chain, replaying everything through the
//! indexer. No contracts and no proof generation.
//!
//! Run with: `cargo run --bin demo`

use alloy::primitives::B256;

use unirep_state::adapters::mock_chain::MockEventSource;
use unirep_state::domain::attestation::Attestation;
use unirep_state::domain::events::{
    AttestationSubmitted, EpochEnded, ReputationNullifiersSpent, UserSignedUp,
};
use unirep_state::domain::identity::Identity;
use unirep_state::domain::settings::Settings;
use unirep_state::indexer::{Indexer, IndexerOptions};
use unirep_state::proof_inputs::ProofInputBuilder;
use unirep_state::user_state::UserState;

const ATTESTER_ID: u64 = 7;

fn short(value: &B256) -> String {
    format!("0x{}...", &hex::encode(value.0)[..16])
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Unirep Event Replay ===");
    println!("=== Protocol Demo (mock chain, no proofs) ===\n");

    let settings = Settings {
        global_state_tree_depth: 8,
        user_state_tree_depth: 8,
        sign_up_airdrop: 30,
        ..Settings::default()
    };
    let indexer = Indexer::new(
        MockEventSource::new(),
        settings.clone(),
        1,
        IndexerOptions::default(),
    )
    .expect("valid settings");
    let chain = indexer.source();

    // ── Sign-up ──
    println!("[Epoch 1] Signing up...");
    let alice = Identity::random();
    let commitment = alice.commitment();
    chain
        .emit(UserSignedUp {
            epoch: 1,
            identity_commitment: commitment,
            hashed_leaf: settings.sign_up_leaf(commitment),
        })
        .await;
    indexer.catch_up().await.unwrap();
    println!("  commitment: {}", short(&commitment));
    println!("  airdrop:    {} rep", settings.sign_up_airdrop);

    // ── Attestation ──
    println!("\n[Epoch 1] Attester {ATTESTER_ID} attests to epoch key #0...");
    let epoch_key = alice.epoch_key(1, 0, settings.epoch_tree_depth);
    chain
        .emit(AttestationSubmitted {
            epoch: 1,
            epoch_key,
            attestation: Attestation::new(ATTESTER_ID, 5, 0),
        })
        .await;
    indexer.catch_up().await.unwrap();
    println!("  epoch key:  {}", short(&epoch_key));

    // ── Epoch end ──
    println!("\n[Epoch 1] Ending epoch...");
    let hash_chains = indexer.snapshot().await.state.epoch_key_hash_chains(1);
    chain
        .emit(EpochEnded {
            epoch: 1,
            epoch_key_hashchains: hash_chains,
        })
        .await;
    indexer.catch_up().await.unwrap();
    let snapshot = indexer.snapshot().await;
    println!(
        "  epoch tree root (e1): {}",
        short(&snapshot.state.gen_epoch_tree(1).unwrap().root())
    );
    println!("  current epoch: {}", snapshot.state.current_epoch());

    // ── User state transition ──
    println!("\n[Epoch 2] Transitioning user state...");
    let transition = {
        let user = UserState::new(&snapshot.state, alice);
        ProofInputBuilder::new(&user)
            .transition_inputs()
            .expect("transition inputs")
    };
    println!(
        "  {} -> {}: {} epoch-key nullifiers, {} attestation nullifiers",
        transition.from_epoch,
        transition.to_epoch,
        transition.epk_nullifiers().len(),
        transition.attestation_nullifiers().len()
    );
    chain.emit(transition.to_event()).await;
    indexer.catch_up().await.unwrap();

    let snapshot = indexer.snapshot().await;
    let state = UserState::new(&snapshot.state, alice)
        .latest_state()
        .unwrap();
    println!(
        "  reputation: +{} / -{} (leaf #{})",
        state.pos_rep,
        state.neg_rep,
        state.gst_leaf_index.expect("leaf inserted")
    );
    println!(
        "  GST root (e2): {}",
        short(&snapshot.state.gen_gs_tree(2).unwrap().root())
    );

    // ── Reputation spend ──
    println!("\n[Epoch 2] Spending 3 reputation...");
    let rep = {
        let user = UserState::new(&snapshot.state, alice);
        ProofInputBuilder::new(&user)
            .reputation_inputs(0, 3, true)
            .expect("reputation inputs")
    };
    println!("  nonces: {:?}", &rep.rep_nonces[..3]);
    let nullifiers = rep.rep_nullifiers[..3].to_vec();
    chain
        .emit(ReputationNullifiersSpent {
            epoch: 2,
            nullifiers: nullifiers.clone(),
        })
        .await;
    indexer.catch_up().await.unwrap();

    let snapshot = indexer.snapshot().await;
    assert!(nullifiers.iter().all(|n| snapshot.state.nullifier_exists(n)));
    let next = UserState::new(&snapshot.state, alice)
        .find_spendable_nonces(2, 1)
        .unwrap();
    println!("  ✓ nullifiers recorded, next free nonce: {}", next[0]);
    println!(
        "  nullifier root: {}",
        short(&snapshot.state.gen_nullifier_tree().unwrap().root())
    );

    // ── Double spend ──
    println!("\n[Epoch 2] Replaying the same nullifiers in a new transaction...");
    chain
        .emit(ReputationNullifiersSpent {
            epoch: 2,
            nullifiers,
        })
        .await;
    match indexer.catch_up().await {
        Ok(_) => panic!("double spend must not replay"),
        Err(e) => println!("  ✓ rejected: {e}"),
    }
    assert_eq!(indexer.snapshot().await, snapshot);
    println!("  ✓ state still as of block {}", snapshot.as_of_block);

    println!("\n=== Demo completed successfully ===");
}
