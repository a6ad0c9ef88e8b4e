use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crosslock_core::constants::{BUS_BUFFER_DEPTH, BUS_RECONNECT_SECS};
use crosslock_core::CrosslockError;

use crate::events::{request_subject, status_subject, SettlementRequest, SettlementUpdate};

/// One framed bus message: a subject plus its JSON payload. The TCP wire
/// form is one JSON document per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub subject: String,
    pub payload: serde_json::Value,
}

/// What the engine and coordinator publish through. Implementations are
/// best-effort: a failed publish must never wedge an acceptance.
#[async_trait]
pub trait SettlementSink: Send + Sync {
    async fn publish_request(&self, request: &SettlementRequest) -> Result<(), CrosslockError>;
    async fn publish_status(&self, update: &SettlementUpdate) -> Result<(), CrosslockError>;
}

// ── In-process bus ───────────────────────────────────────────────────────────

/// Broadcast-channel bus for single-process devnet runs and tests. Multiple
/// subscribers each see every message published after they subscribed.
pub struct InProcessBus {
    sender: broadcast::Sender<BusMessage>,
}

impl InProcessBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_BUFFER_DEPTH);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, subject: String, payload: serde_json::Value) -> usize {
        match self.sender.send(BusMessage { subject, payload }) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("bus message dropped (no subscribers)");
                0
            }
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementSink for InProcessBus {
    async fn publish_request(&self, request: &SettlementRequest) -> Result<(), CrosslockError> {
        let payload = serde_json::to_value(request)?;
        self.publish(request_subject(&request.proposal_id), payload);
        Ok(())
    }

    async fn publish_status(&self, update: &SettlementUpdate) -> Result<(), CrosslockError> {
        let payload = serde_json::to_value(update)?;
        self.publish(status_subject(&update.proposal_id), payload);
        Ok(())
    }
}

// ── Disabled sink ────────────────────────────────────────────────────────────

/// Sink used when no bus URL is configured. Every publish reports
/// `BusUnavailable` so callers can flip into bus-disabled operation; none of
/// them treat it as fatal.
pub struct DisabledSink;

#[async_trait]
impl SettlementSink for DisabledSink {
    async fn publish_request(&self, _request: &SettlementRequest) -> Result<(), CrosslockError> {
        Err(CrosslockError::BusUnavailable)
    }

    async fn publish_status(&self, _update: &SettlementUpdate) -> Result<(), CrosslockError> {
        Err(CrosslockError::BusUnavailable)
    }
}

// ── TCP client ───────────────────────────────────────────────────────────────

/// Client for an external line-delimited-JSON bus.
///
/// A background task owns the socket: it dials with unbounded retries and
/// constant backoff, replays the subscription list on every (re)connect,
/// drains the bounded outbound buffer, and forwards matching inbound
/// messages to the handle returned from `connect`.
pub struct TcpBusClient {
    outbound: mpsc::Sender<BusMessage>,
}

impl TcpBusClient {
    /// Start the connection task. `subjects` are prefix subscriptions the
    /// server honors (e.g. `settlement.chain.`). Returns the publish handle
    /// and the inbound message stream.
    pub fn connect(url: &str, subjects: Vec<String>) -> (Self, mpsc::Receiver<BusMessage>) {
        let (outbound, outbound_rx) = mpsc::channel::<BusMessage>(BUS_BUFFER_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel::<BusMessage>(BUS_BUFFER_DEPTH);

        let addr = url.trim_start_matches("tcp://").to_string();
        tokio::spawn(run_connection(addr, subjects, outbound_rx, inbound_tx));

        (Self { outbound }, inbound_rx)
    }

    fn enqueue(&self, msg: BusMessage) -> Result<(), CrosslockError> {
        // try_send keeps publishers non-blocking; a full buffer means the
        // bus has been gone long enough that best-effort drops are fine.
        self.outbound.try_send(msg).map_err(|_| {
            warn!("bus publish buffer full; dropping message");
            CrosslockError::BusUnavailable
        })
    }
}

#[async_trait]
impl SettlementSink for TcpBusClient {
    async fn publish_request(&self, request: &SettlementRequest) -> Result<(), CrosslockError> {
        self.enqueue(BusMessage {
            subject: request_subject(&request.proposal_id),
            payload: serde_json::to_value(request)?,
        })
    }

    async fn publish_status(&self, update: &SettlementUpdate) -> Result<(), CrosslockError> {
        self.enqueue(BusMessage {
            subject: status_subject(&update.proposal_id),
            payload: serde_json::to_value(update)?,
        })
    }
}

async fn run_connection(
    addr: String,
    subjects: Vec<String>,
    mut outbound_rx: mpsc::Receiver<BusMessage>,
    inbound_tx: mpsc::Sender<BusMessage>,
) {
    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, addr = %addr, "bus dial failed; retrying");
                tokio::time::sleep(Duration::from_secs(BUS_RECONNECT_SECS)).await;
                continue;
            }
        };
        info!(addr = %addr, "settlement bus connected");

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // Replay subscriptions on every connect.
        let mut sub_failed = false;
        for subject in &subjects {
            let sub = serde_json::json!({ "op": "sub", "subject": subject });
            let mut line = sub.to_string();
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                sub_failed = true;
                break;
            }
        }
        if sub_failed {
            tokio::time::sleep(Duration::from_secs(BUS_RECONNECT_SECS)).await;
            continue;
        }

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { return }; // all handles dropped
                    let mut line = match serde_json::to_string(&msg) {
                        Ok(l) => l,
                        Err(e) => {
                            warn!(error = %e, "unserializable bus message dropped");
                            continue;
                        }
                    };
                    line.push('\n');
                    if let Err(e) = write_half.write_all(line.as_bytes()).await {
                        warn!(error = %e, "bus write failed; reconnecting");
                        break;
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            match serde_json::from_str::<BusMessage>(&text) {
                                Ok(msg) => { let _ = inbound_tx.send(msg).await; }
                                Err(e) => debug!(error = %e, "undecodable bus line"),
                            }
                        }
                        Ok(None) | Err(_) => {
                            warn!("bus connection closed; reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(BUS_RECONNECT_SECS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SwapSide;
    use crosslock_core::order::SettlementState;
    use crosslock_core::types::{OrderId, PeerTag, ProposalId};

    fn sample_request() -> SettlementRequest {
        SettlementRequest {
            proposal_id: ProposalId("ord-1/p-00000001".into()),
            order_id: OrderId("ord-1".into()),
            maker_id: PeerTag("maker".into()),
            taker_id: PeerTag("taker".into()),
            amount: 10_000,
            price: 110_000_000,
            asset: "SOL".into(),
            settlement_chain: "sol".into(),
            timestamp: 1_700_000_000,
            published_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_process_bus_delivers_to_subscribers() {
        let bus = InProcessBus::new();
        let mut rx = bus.subscribe();
        bus.publish_request(&sample_request()).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(msg.subject.starts_with("settlement.request."));
        assert_eq!(msg.payload["amount"], 10_000);
    }

    #[tokio::test]
    async fn in_process_bus_tolerates_no_subscribers() {
        let bus = InProcessBus::new();
        assert!(bus.publish_request(&sample_request()).await.is_ok());
    }

    #[tokio::test]
    async fn disabled_sink_reports_unavailable() {
        let sink = DisabledSink;
        assert!(matches!(
            sink.publish_request(&sample_request()).await,
            Err(CrosslockError::BusUnavailable)
        ));
    }

    #[tokio::test]
    async fn tcp_client_round_trips_through_a_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            // First line is the subscription.
            let sub = lines.next_line().await.unwrap().unwrap();
            assert!(sub.contains("settlement.chain."));
            // Second line is the published request; echo a chain event back.
            let published = lines.next_line().await.unwrap().unwrap();
            assert!(published.contains("settlement.request."));
            let echo = serde_json::json!({
                "subject": "settlement.chain.utxo.ord-1/p-00000001",
                "payload": { "ok": true },
            });
            let mut line = echo.to_string();
            line.push('\n');
            write.write_all(line.as_bytes()).await.unwrap();
        });

        let (client, mut inbound) =
            TcpBusClient::connect(&addr, vec!["settlement.chain.".into()]);

        // Publish may race the connect; the buffer absorbs it either way.
        client.publish_request(&sample_request()).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .expect("timed out waiting for chain event")
            .unwrap();
        assert_eq!(msg.subject, "settlement.chain.utxo.ord-1/p-00000001");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn status_update_carries_state_and_actor() {
        let bus = InProcessBus::new();
        let mut rx = bus.subscribe();
        bus.publish_status(&SettlementUpdate {
            proposal_id: ProposalId("ord-1/p-00000001".into()),
            state: SettlementState::BothLocked,
            actor: SwapSide::Taker,
            timestamp: 0,
            published_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.payload["state"], "both_locked");
        assert_eq!(msg.payload["actor"], "taker");
    }
}
