//! Negotiation-flow tests driving real `Engine` tasks over hand-shuttled
//! network frames: announce → request → propose (sealed) → accept (sealed)
//! → settle, plus the tamper/drop and degradation paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crosslock_bus::{ChainEvent, SettlementRequest, SettlementSink, SettlementUpdate};
use crosslock_core::envelope::{Envelope, Payload, SignedEnvelope};
use crosslock_core::order::{AssetTag, OrderAnnouncement, OrderType, ProposalStatus, SettlementState};
use crosslock_core::types::{OrderId, PeerTag};
use crosslock_core::CrosslockError;
use crosslock_crypto::{hash160, sha256, Keypair};
use crosslock_engine::{Engine, EngineHandle, EngineInput, NullCoordinator};
use crosslock_identity::IdentityStore;
use crosslock_p2p::{NetworkCommand, NetworkEvent, PeerId};

// ── Harness ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    requests: Mutex<Vec<SettlementRequest>>,
    updates: Mutex<Vec<SettlementUpdate>>,
}

#[async_trait]
impl SettlementSink for RecordingSink {
    async fn publish_request(&self, request: &SettlementRequest) -> Result<(), CrosslockError> {
        self.requests.lock().await.push(request.clone());
        Ok(())
    }

    async fn publish_status(&self, update: &SettlementUpdate) -> Result<(), CrosslockError> {
        self.updates.lock().await.push(update.clone());
        Ok(())
    }
}

struct DownSink;

#[async_trait]
impl SettlementSink for DownSink {
    async fn publish_request(&self, _: &SettlementRequest) -> Result<(), CrosslockError> {
        Err(CrosslockError::BusUnavailable)
    }

    async fn publish_status(&self, _: &SettlementUpdate) -> Result<(), CrosslockError> {
        Err(CrosslockError::BusUnavailable)
    }
}

struct Node {
    handle: EngineHandle,
    input: mpsc::Sender<EngineInput>,
    net_rx: mpsc::Receiver<NetworkCommand>,
    peer_id: PeerId,
}

fn spawn_node(tag: &str, sink: Arc<dyn SettlementSink>) -> Node {
    let dir = std::env::temp_dir().join(format!(
        "crosslock_engine_{}_{}_{}",
        tag,
        std::process::id(),
        rand_suffix()
    ));
    let identities = Arc::new(IdentityStore::open(dir).unwrap());
    let keypair = Keypair::generate();
    let peer_id = PeerId::random();
    let (net_tx, net_rx) = mpsc::channel(64);
    let (engine, handle) = Engine::new(
        keypair,
        PeerTag(peer_id.to_string()),
        identities,
        net_tx,
        sink,
        Arc::new(NullCoordinator),
    );
    let input = handle.input_sender();
    tokio::spawn(engine.run());
    Node { handle, input, net_rx, peer_id }
}

fn rand_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
}

/// Pull the next outbound frame from a node, panicking after a timeout.
async fn next_frame(node: &mut Node) -> NetworkCommand {
    tokio::time::timeout(Duration::from_secs(5), node.net_rx.recv())
        .await
        .expect("timed out waiting for outbound frame")
        .expect("network channel closed")
}

fn frame_bytes(cmd: &NetworkCommand) -> Vec<u8> {
    match cmd {
        NetworkCommand::Broadcast(bytes) => bytes.clone(),
        NetworkCommand::Send { bytes, .. } => bytes.clone(),
        other => panic!("unexpected network command: {other:?}"),
    }
}

/// Deliver raw frame bytes to a node as if `from` had sent them.
async fn deliver(node: &Node, from: PeerId, bytes: Vec<u8>) {
    node.input
        .send(EngineInput::Net(NetworkEvent::Message { peer: from, bytes }))
        .await
        .unwrap();
}

/// Run maker and taker through announce → propose → accept and return both
/// nodes plus the ids involved.
async fn negotiate_to_acceptance(
    sink: Arc<RecordingSink>,
    secret: &[u8],
) -> (Node, Node, OrderId, crosslock_core::types::ProposalId) {
    let mut maker = spawn_node("maker", sink.clone());
    let mut taker = spawn_node("taker", sink);

    let order_id = maker
        .handle
        .create_order(OrderType::Sell, 10_000, AssetTag::from("SOL"), 100_000_000, 120_000_000, None)
        .await
        .unwrap();

    // Announcement reaches the taker over gossip.
    let announcement = frame_bytes(&next_frame(&mut maker).await);
    deliver(&taker, maker.peer_id, announcement).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(taker.handle.list_orders().await.unwrap().len(), 1);

    // Taker proposes; the maker key is cached so the proposal goes sealed.
    let proposal_id = taker
        .handle
        .propose(order_id.clone(), 110_000_000, 10_000)
        .await
        .unwrap();
    let proposal_frame = next_frame(&mut taker).await;
    assert!(matches!(proposal_frame, NetworkCommand::Send { .. }));
    deliver(&maker, taker.peer_id, frame_bytes(&proposal_frame)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        maker.handle.list_proposals(order_id.clone()).await.unwrap().len(),
        1
    );

    // Maker accepts; acceptance travels sealed to the taker.
    maker
        .handle
        .accept_proposal(proposal_id.clone(), secret.to_vec())
        .await
        .unwrap();
    let acceptance_frame = next_frame(&mut maker).await;
    assert!(matches!(acceptance_frame, NetworkCommand::Send { .. }));
    deliver(&taker, maker.peer_id, frame_bytes(&acceptance_frame)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    (maker, taker, order_id, proposal_id)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_binds_the_same_hash_on_both_sides() {
    let sink = Arc::new(RecordingSink::default());
    let secret = b"atomic_swap_secret_42";
    let (maker, taker, _order, proposal_id) =
        negotiate_to_acceptance(sink.clone(), secret).await;

    let on_maker = maker.handle.status(proposal_id.clone()).await.unwrap();
    let on_taker = taker.handle.status(proposal_id).await.unwrap();

    assert_eq!(on_maker.status, ProposalStatus::Accepted);
    assert_eq!(on_taker.status, ProposalStatus::Accepted);
    assert_eq!(on_maker.settlement, Some(SettlementState::Ready));
    assert_eq!(on_taker.settlement, Some(SettlementState::Ready));

    let lock = on_taker.hash_lock.expect("hash bound on taker side");
    assert_eq!(lock.h160, hash160(secret));
    assert_eq!(lock.h256, sha256(secret));
    assert_eq!(on_maker.hash_lock, Some(lock));

    // Acceptance published one settlement request.
    let requests = sink.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, 10_000);
    assert_eq!(requests[0].price, 110_000_000);
}

#[tokio::test]
async fn order_details_flow_is_sealed_end_to_end() {
    let sink = Arc::new(RecordingSink::default());
    let mut maker = spawn_node("maker-details", sink.clone());
    let mut taker = spawn_node("taker-details", sink);

    let order_id = maker
        .handle
        .create_order(OrderType::Sell, 10_000, AssetTag::from("SOL"), 100_000_000, 120_000_000, None)
        .await
        .unwrap();
    let announcement = frame_bytes(&next_frame(&mut maker).await);
    deliver(&taker, maker.peer_id, announcement).await;

    // Taker broadcasts a signed details request.
    taker.handle.request_order_details(order_id.clone()).await.unwrap();
    let request = next_frame(&mut taker).await;
    assert!(matches!(request, NetworkCommand::Broadcast(_)));
    deliver(&maker, taker.peer_id, frame_bytes(&request)).await;

    // Maker replies with sealed details on a directed stream.
    let reply = next_frame(&mut maker).await;
    let NetworkCommand::Send { peer, bytes } = &reply else {
        panic!("expected directed reply, got {reply:?}");
    };
    assert_eq!(*peer, taker.peer_id);
    let envelope = Envelope::from_bytes(bytes).unwrap();
    assert_eq!(envelope.kind(), "encrypted_order_details");

    deliver(&taker, maker.peer_id, bytes.clone()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let details = taker
        .handle
        .get_order_details(order_id)
        .await
        .unwrap()
        .expect("details cached after unsealing");
    assert_eq!(details.amount, 10_000);
    assert_eq!(details.min_price, 100_000_000);
    assert_eq!(details.max_price, 120_000_000);
}

#[tokio::test]
async fn tampered_gossip_mutates_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let mut maker = spawn_node("maker-tamper", sink.clone());
    let taker = spawn_node("taker-tamper", sink);

    maker
        .handle
        .create_order(OrderType::Sell, 10_000, AssetTag::from("SOL"), 1, 2, None)
        .await
        .unwrap();
    let bytes = frame_bytes(&next_frame(&mut maker).await);

    // Replay with the payload altered but the signature untouched.
    let Envelope::Signed(mut envelope) = Envelope::from_bytes(&bytes).unwrap() else {
        panic!("announcement must be signed");
    };
    let mut altered: OrderAnnouncement =
        serde_json::from_slice(&envelope.payload).unwrap();
    altered.expires_at += 999;
    envelope.payload = serde_json::to_vec(&altered).unwrap();
    let tampered = Envelope::Signed(envelope).to_bytes().unwrap();

    deliver(&taker, maker.peer_id, tampered).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(taker.handle.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn announcement_from_wrong_peer_is_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let mut maker = spawn_node("maker-spoof", sink.clone());
    let taker = spawn_node("taker-spoof", sink);

    maker
        .handle
        .create_order(OrderType::Buy, 5, AssetTag::from("USDC"), 1, 1, None)
        .await
        .unwrap();
    let bytes = frame_bytes(&next_frame(&mut maker).await);

    // Same valid envelope, delivered as if a different peer relayed-forged it.
    deliver(&taker, PeerId::random(), bytes).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(taker.handle.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn peer_key_drift_still_processes_verifying_messages() {
    let sink = Arc::new(RecordingSink::default());
    let taker = spawn_node("taker-drift", sink);
    let peer = PeerId::random();
    let peer_tag = PeerTag(peer.to_string());

    // Two announcements from the same peer id under different identity keys.
    for (n, order) in ["ord-a", "ord-b"].iter().enumerate() {
        let identity = Keypair::generate();
        let announcement = OrderAnnouncement::new(
            OrderId(format!("{order}-{n}")),
            OrderType::Sell,
            AssetTag::from("STRK"),
            peer_tag.clone(),
            100,
            200,
        )
        .unwrap();
        let payload = Payload::OrderAnnouncement(announcement);
        let body = payload.encode_body().unwrap();
        let signature = identity.sign(&SignedEnvelope::signing_bytes(payload.kind(), &body));
        let envelope = Envelope::Signed(SignedEnvelope {
            kind: payload.kind().to_string(),
            payload: body,
            signature,
            signer_public_key: identity.public_key_bytes().to_vec(),
            timestamp: 100,
        });
        deliver(&taker, peer, envelope.to_bytes().unwrap()).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Both verified against their own in-band keys, so both are cached.
    assert_eq!(taker.handle.list_orders().await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_acceptance_is_idempotent() {
    let sink = Arc::new(RecordingSink::default());
    let secret = b"atomic_swap_secret_42";
    let (mut maker, taker, _order, proposal_id) =
        negotiate_to_acceptance(sink.clone(), secret).await;

    // Maker re-accepts (idempotent server side), producing a duplicate frame.
    maker
        .handle
        .accept_proposal(proposal_id.clone(), secret.to_vec())
        .await
        .unwrap();
    let duplicate = frame_bytes(&next_frame(&mut maker).await);
    deliver(&taker, maker.peer_id, duplicate).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let p = taker.handle.status(proposal_id).await.unwrap();
    assert_eq!(p.status, ProposalStatus::Accepted);
    assert_eq!(p.hash_lock.map(|h| h.h160), Some(hash160(secret)));
}

#[tokio::test]
async fn rejection_is_terminal_on_the_proposer() {
    let sink = Arc::new(RecordingSink::default());
    let mut maker = spawn_node("maker-reject", sink.clone());
    let mut taker = spawn_node("taker-reject", sink);

    let order_id = maker
        .handle
        .create_order(OrderType::Sell, 100, AssetTag::from("SOL"), 5, 10, None)
        .await
        .unwrap();
    deliver(&taker, maker.peer_id, frame_bytes(&next_frame(&mut maker).await)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let proposal_id = taker.handle.propose(order_id, 7, 100).await.unwrap();
    deliver(&maker, taker.peer_id, frame_bytes(&next_frame(&mut taker).await)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    maker.handle.reject_proposal(proposal_id.clone()).await.unwrap();
    deliver(&taker, maker.peer_id, frame_bytes(&next_frame(&mut maker).await)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let p = taker.handle.status(proposal_id.clone()).await.unwrap();
    assert_eq!(p.status, ProposalStatus::Rejected);
    assert!(p.settlement.is_none());

    // Terminal: acceptance after rejection fails on the maker.
    let err = maker
        .handle
        .accept_proposal(proposal_id, b"late".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, CrosslockError::ProposalRejected));
}

#[tokio::test]
async fn acceptance_survives_bus_outage() {
    let mut maker = spawn_node("maker-busdown", Arc::new(DownSink));
    let mut taker = spawn_node("taker-busdown", Arc::new(DownSink));

    let order_id = maker
        .handle
        .create_order(OrderType::Sell, 100, AssetTag::from("SOL"), 5, 10, None)
        .await
        .unwrap();
    deliver(&taker, maker.peer_id, frame_bytes(&next_frame(&mut maker).await)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let proposal_id = taker.handle.propose(order_id, 7, 100).await.unwrap();
    deliver(&maker, taker.peer_id, frame_bytes(&next_frame(&mut taker).await)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Bus down, acceptance still stands and the sealed notice still goes out.
    maker
        .handle
        .accept_proposal(proposal_id.clone(), b"secret".to_vec())
        .await
        .unwrap();
    let frame = next_frame(&mut maker).await;
    assert!(matches!(frame, NetworkCommand::Send { .. }));

    let p = maker.handle.status(proposal_id).await.unwrap();
    assert_eq!(p.status, ProposalStatus::Accepted);
}
