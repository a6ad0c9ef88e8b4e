//! End-to-end swap test: two full stacks (engine + coordinator + shared
//! in-memory contract + shared in-process bus) negotiate over hand-shuttled
//! frames and settle through the complete two-chain HTLC sequence.
//!
//! This is the canonical happy path: Alice (maker) sells 10_000 UTXO units
//! at 110_000_000 contract units each to Bob (taker), bound to one secret.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crosslock_bus::{ChainEvent, ChainEventKind, InProcessBus, SettlementSink};
use crosslock_core::order::{AssetTag, OrderType, ProposalStatus, SettlementState};
use crosslock_core::types::{PeerTag, ProposalId};
use crosslock_coordinator::{Coordinator, CoordinatorConfig};
use crosslock_crypto::hash::{hash256, sha256};
use crosslock_crypto::Keypair;
use crosslock_engine::{Engine, EngineHandle, EngineInput};
use crosslock_htlc::{ContractHtlc, MemoryContractHtlc};
use crosslock_identity::IdentityStore;
use crosslock_p2p::{NetworkCommand, NetworkEvent, PeerId};

const SECRET: &[u8] = b"atomic_swap_secret_42";

// ── Stack harness ────────────────────────────────────────────────────────────

struct Stack {
    handle: EngineHandle,
    coordinator: Coordinator,
    input: mpsc::Sender<EngineInput>,
    net_rx: mpsc::Receiver<NetworkCommand>,
    peer_id: PeerId,
}

fn base58_address(version: u8, pkh: [u8; 20]) -> String {
    let mut payload = vec![version];
    payload.extend_from_slice(&pkh);
    let checksum = hash256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

fn spawn_stack(
    tag: &str,
    contract: Arc<MemoryContractHtlc>,
    bus: Arc<InProcessBus>,
    contract_address: &str,
    utxo_pkh: [u8; 20],
) -> Stack {
    let dir = std::env::temp_dir().join(format!(
        "crosslock_e2e_{}_{}",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    let identities = Arc::new(IdentityStore::open(dir).unwrap());
    let peer_id = PeerId::random();
    let (net_tx, net_rx) = mpsc::channel(64);
    let (input_tx, input_rx) = mpsc::channel(256);

    let coordinator = Coordinator::new(
        CoordinatorConfig {
            own_utxo_address: Some(base58_address(0xc4, utxo_pkh)),
            own_contract_address: contract_address.to_string(),
            ..CoordinatorConfig::default()
        },
        input_tx.clone(),
        contract as Arc<dyn ContractHtlc>,
        None,
    );

    let (engine, handle) = Engine::with_channel(
        Keypair::generate(),
        PeerTag(peer_id.to_string()),
        identities,
        net_tx,
        bus as Arc<dyn SettlementSink>,
        Arc::new(coordinator.clone()),
        input_tx.clone(),
        input_rx,
    );
    tokio::spawn(engine.run());

    Stack { handle, coordinator, input: input_tx, net_rx, peer_id }
}

async fn next_frame(stack: &mut Stack) -> Vec<u8> {
    let cmd = tokio::time::timeout(Duration::from_secs(5), stack.net_rx.recv())
        .await
        .expect("timed out waiting for outbound frame")
        .expect("network channel closed");
    match cmd {
        NetworkCommand::Broadcast(bytes) => bytes,
        NetworkCommand::Send { bytes, .. } => bytes,
        other => panic!("unexpected network command: {other:?}"),
    }
}

async fn deliver(stack: &Stack, from: PeerId, bytes: Vec<u8>) {
    stack
        .input
        .send(EngineInput::Net(NetworkEvent::Message { peer: from, bytes }))
        .await
        .unwrap();
}

async fn chain(stack: &Stack, proposal_id: &ProposalId, chain: &str, kind: ChainEventKind) {
    stack
        .input
        .send(EngineInput::Chain(ChainEvent {
            proposal_id: proposal_id.clone(),
            chain: chain.into(),
            kind,
            tx_ref: None,
            timestamp: chrono::Utc::now().timestamp(),
        }))
        .await
        .unwrap();
}

/// Poll an engine until the proposal reaches the wanted settlement state.
async fn wait_for_state(handle: &EngineHandle, pid: &ProposalId, want: SettlementState) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let proposal = handle.status(pid.clone()).await.unwrap();
        if proposal.settlement == Some(want) {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {want}, still at {:?}",
            proposal.settlement
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ── The scenario ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_nodes_settle_a_swap_end_to_end() {
    let contract = Arc::new(MemoryContractHtlc::new());
    let bus = Arc::new(InProcessBus::new());
    let mut bus_rx = bus.subscribe();

    let mut alice = spawn_stack("alice", contract.clone(), bus.clone(), "aliceSol", [7; 20]);
    let mut bob = spawn_stack("bob", contract.clone(), bus.clone(), "bobSol", [9; 20]);

    // ── 1. Alice announces: 10_000 units, price band 100M..120M ─────────────
    let order_id = alice
        .handle
        .create_order(
            OrderType::Sell,
            10_000,
            AssetTag::from("SOL"),
            100_000_000,
            120_000_000,
            None,
        )
        .await
        .unwrap();
    let announcement = next_frame(&mut alice).await;
    deliver(&bob, alice.peer_id, announcement).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ── 2. Bob requests details, sealed reply comes back ─────────────────────
    bob.handle.request_order_details(order_id.clone()).await.unwrap();
    let request = next_frame(&mut bob).await;
    deliver(&alice, bob.peer_id, request).await;
    let sealed_details = next_frame(&mut alice).await;
    deliver(&bob, alice.peer_id, sealed_details).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let details = bob
        .handle
        .get_order_details(order_id.clone())
        .await
        .unwrap()
        .expect("bob unsealed the details");
    assert_eq!(details.amount, 10_000);

    // ── 3. Bob proposes 110M × 10_000, sealed to Alice ───────────────────────
    let pid = bob
        .handle
        .propose(order_id.clone(), 110_000_000, 10_000)
        .await
        .unwrap();
    let proposal = next_frame(&mut bob).await;
    deliver(&alice, bob.peer_id, proposal).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ── 4. Alice accepts with the shared secret ──────────────────────────────
    alice
        .handle
        .accept_proposal(pid.clone(), SECRET.to_vec())
        .await
        .unwrap();
    let acceptance = next_frame(&mut alice).await;
    deliver(&bob, alice.peer_id, acceptance).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let on_bob = bob.handle.status(pid.clone()).await.unwrap();
    assert_eq!(on_bob.status, ProposalStatus::Accepted);
    assert_eq!(
        on_bob.hash_lock.map(|h| h.h160),
        Some(crosslock_crypto::hash160(SECRET))
    );

    // ── 5. Alice locks the UTXO leg ──────────────────────────────────────────
    let artifact = alice
        .coordinator
        .lock_maker_side(&pid, &base58_address(0xc4, [9; 20]))
        .await
        .unwrap();
    wait_for_state(&alice.handle, &pid, SettlementState::MakerLocked).await;

    // The chain watcher reports the lock to Bob.
    chain(
        &bob,
        &pid,
        "utxo",
        ChainEventKind::Locked {
            redeem_script_hex: Some(artifact.redeem_script.clone()),
            vout: Some(0),
        },
    )
    .await;
    wait_for_state(&bob.handle, &pid, SettlementState::MakerLocked).await;

    // ── 6. Bob locks the contract leg for Alice ──────────────────────────────
    bob.coordinator.lock_taker_side(&pid, "aliceSol").await.unwrap();
    wait_for_state(&bob.handle, &pid, SettlementState::BothLocked).await;
    chain(&alice, &pid, "sol", ChainEventKind::Locked { redeem_script_hex: None, vout: None })
        .await;
    wait_for_state(&alice.handle, &pid, SettlementState::BothLocked).await;

    // ── 7. Alice claims the contract leg, revealing the secret ───────────────
    alice.coordinator.claim_maker_side(&pid).await.unwrap();
    wait_for_state(&alice.handle, &pid, SettlementState::MakerClaimed).await;

    let record = contract.get(sha256(SECRET)).await.unwrap().unwrap();
    assert!(record.claimed);
    assert_eq!(record.amount, 10_000u128 * 110_000_000u128);
    assert_eq!(record.preimage, Some(hex::encode(SECRET)));

    // ── 8. Bob observes the preimage and claims the UTXO leg ─────────────────
    chain(
        &bob,
        &pid,
        "sol",
        ChainEventKind::Claimed { preimage_hex: hex::encode(SECRET) },
    )
    .await;
    wait_for_state(&bob.handle, &pid, SettlementState::MakerClaimed).await;

    let observed = bob.coordinator.observed_secret(&pid).await.unwrap();
    assert_eq!(observed, SECRET);
    bob.coordinator.claim_taker_side(&pid, &observed).await.unwrap();
    wait_for_state(&bob.handle, &pid, SettlementState::Complete).await;

    chain(
        &alice,
        &pid,
        "utxo",
        ChainEventKind::Claimed { preimage_hex: hex::encode(SECRET) },
    )
    .await;
    wait_for_state(&alice.handle, &pid, SettlementState::Complete).await;

    // ── 9. The bus saw the request and the full status ladder ────────────────
    let mut subjects = Vec::new();
    while let Ok(msg) = bus_rx.try_recv() {
        subjects.push(msg.subject);
    }
    assert!(subjects.iter().any(|s| s.starts_with("settlement.request.")));
    assert!(subjects.iter().filter(|s| s.starts_with("settlement.status.")).count() >= 4);
}
