use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crosslock_bus::{ChainEvent, SettlementRequest, SettlementSink, SettlementUpdate, SwapSide};
use crosslock_core::constants::ORDER_TTL_SECS;
use crosslock_core::envelope::{
    Envelope, OrderRequest, Payload, SealedAcceptance, SealedOrderDetails, SealedProposal,
    SignedEnvelope,
};
use crosslock_core::order::{
    AcceptanceNotice, AssetTag, OrderAnnouncement, OrderDetails, OrderType, Proposal,
    ProposalTerms, RejectionNotice, SealedBlob, SettlementState,
};
use crosslock_core::types::{Amount, HashLock, OrderId, PeerTag, Price, ProposalId, Username};
use crosslock_core::CrosslockError;
use crosslock_crypto::{ecies_decrypt, ecies_encrypt, hash160, sha256, verify, Keypair};
use crosslock_identity::IdentityStore;
use crosslock_p2p::{NetworkCommand, NetworkEvent, PeerId};

use crate::peer_keys::PeerKeyCache;
use crate::state::NegotiationState;

// ── Coordinator interface ────────────────────────────────────────────────────

/// How the engine starts and feeds a swap, without holding a back-reference
/// into the coordinator. The coordinator talks back only by sending
/// `EngineInput::Settlement` onto the engine queue.
#[async_trait]
pub trait CoordinatorHandle: Send + Sync {
    /// Begin driving the two-chain HTLC sequence for an accepted proposal.
    /// `secret` is present on the accepting side, which generated it.
    /// `order_expires_at` lets the coordinator refuse proposals whose order
    /// already lapsed.
    async fn start(
        &self,
        proposal: Proposal,
        order_expires_at: Option<i64>,
        secret: Option<Vec<u8>>,
    ) -> Result<(), CrosslockError>;

    /// Ingest a confirmed on-chain event for a running swap.
    async fn chain_event(&self, event: ChainEvent) -> Result<(), CrosslockError>;
}

/// Coordinator that does nothing. Stands in when settlement is driven
/// manually (tests, negotiation-only nodes).
pub struct NullCoordinator;

#[async_trait]
impl CoordinatorHandle for NullCoordinator {
    async fn start(
        &self,
        _: Proposal,
        _: Option<i64>,
        _: Option<Vec<u8>>,
    ) -> Result<(), CrosslockError> {
        Ok(())
    }

    async fn chain_event(&self, _: ChainEvent) -> Result<(), CrosslockError> {
        Ok(())
    }
}

// ── Inputs ───────────────────────────────────────────────────────────────────

/// Everything that can arrive at the engine task. Processing order is
/// arrival order; there is no other synchronization.
pub enum EngineInput {
    Net(NetworkEvent),
    Cmd(EngineCommand),
    /// Settlement-machine advance reported by the coordinator.
    Settlement {
        proposal_id: ProposalId,
        state: SettlementState,
        actor: SwapSide,
    },
    /// Chain event ingested from the settlement bus.
    Chain(ChainEvent),
}

/// Front-end commands, each carrying its reply channel.
pub enum EngineCommand {
    CreateOrder {
        order_type: OrderType,
        amount: Amount,
        asset: AssetTag,
        min_price: Price,
        max_price: Price,
        taker: Option<Username>,
        reply: oneshot::Sender<Result<OrderId, CrosslockError>>,
    },
    ListOrders {
        reply: oneshot::Sender<Vec<OrderAnnouncement>>,
    },
    RequestOrderDetails {
        order_id: OrderId,
        reply: oneshot::Sender<Result<(), CrosslockError>>,
    },
    GetOrderDetails {
        order_id: OrderId,
        reply: oneshot::Sender<Option<OrderDetails>>,
    },
    Propose {
        order_id: OrderId,
        price: Price,
        amount: Amount,
        reply: oneshot::Sender<Result<ProposalId, CrosslockError>>,
    },
    AcceptProposal {
        proposal_id: ProposalId,
        secret: Vec<u8>,
        reply: oneshot::Sender<Result<(), CrosslockError>>,
    },
    RejectProposal {
        proposal_id: ProposalId,
        reply: oneshot::Sender<Result<(), CrosslockError>>,
    },
    ListProposals {
        order_id: OrderId,
        reply: oneshot::Sender<Vec<Proposal>>,
    },
    Status {
        proposal_id: ProposalId,
        reply: oneshot::Sender<Result<Proposal, CrosslockError>>,
    },
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable front-end to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    input_tx: mpsc::Sender<EngineInput>,
}

impl EngineHandle {
    /// Raw input sender, used to wire network, bus and coordinator feeds.
    pub fn input_sender(&self) -> mpsc::Sender<EngineInput> {
        self.input_tx.clone()
    }

    async fn command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, CrosslockError> {
        let (tx, rx) = oneshot::channel();
        self.input_tx
            .send(EngineInput::Cmd(build(tx)))
            .await
            .map_err(|_| CrosslockError::NetworkClosed)?;
        rx.await.map_err(|_| CrosslockError::NetworkClosed)
    }

    pub async fn create_order(
        &self,
        order_type: OrderType,
        amount: Amount,
        asset: AssetTag,
        min_price: Price,
        max_price: Price,
        taker: Option<Username>,
    ) -> Result<OrderId, CrosslockError> {
        self.command(|reply| EngineCommand::CreateOrder {
            order_type,
            amount,
            asset,
            min_price,
            max_price,
            taker,
            reply,
        })
        .await?
    }

    pub async fn list_orders(&self) -> Result<Vec<OrderAnnouncement>, CrosslockError> {
        self.command(|reply| EngineCommand::ListOrders { reply }).await
    }

    pub async fn request_order_details(&self, order_id: OrderId) -> Result<(), CrosslockError> {
        self.command(|reply| EngineCommand::RequestOrderDetails { order_id, reply })
            .await?
    }

    pub async fn get_order_details(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderDetails>, CrosslockError> {
        self.command(|reply| EngineCommand::GetOrderDetails { order_id, reply })
            .await
    }

    pub async fn propose(
        &self,
        order_id: OrderId,
        price: Price,
        amount: Amount,
    ) -> Result<ProposalId, CrosslockError> {
        self.command(|reply| EngineCommand::Propose { order_id, price, amount, reply })
            .await?
    }

    pub async fn accept_proposal(
        &self,
        proposal_id: ProposalId,
        secret: Vec<u8>,
    ) -> Result<(), CrosslockError> {
        self.command(|reply| EngineCommand::AcceptProposal { proposal_id, secret, reply })
            .await?
    }

    pub async fn reject_proposal(&self, proposal_id: ProposalId) -> Result<(), CrosslockError> {
        self.command(|reply| EngineCommand::RejectProposal { proposal_id, reply })
            .await?
    }

    pub async fn list_proposals(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Proposal>, CrosslockError> {
        self.command(|reply| EngineCommand::ListProposals { order_id, reply })
            .await
    }

    pub async fn status(&self, proposal_id: ProposalId) -> Result<Proposal, CrosslockError> {
        self.command(|reply| EngineCommand::Status { proposal_id, reply })
            .await?
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// The single writer of all negotiation state.
pub struct Engine {
    keypair: Keypair,
    local_peer: PeerTag,
    identities: Arc<IdentityStore>,
    input_rx: mpsc::Receiver<EngineInput>,
    net_cmd_tx: mpsc::Sender<NetworkCommand>,
    sink: Arc<dyn SettlementSink>,
    coordinator: Arc<dyn CoordinatorHandle>,
    state: NegotiationState,
    peer_keys: PeerKeyCache,
    /// Set once a sink publish fails; the coordinator then relies on
    /// adapter polling instead of bus echoes.
    bus_disabled: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keypair: Keypair,
        local_peer: PeerTag,
        identities: Arc<IdentityStore>,
        net_cmd_tx: mpsc::Sender<NetworkCommand>,
        sink: Arc<dyn SettlementSink>,
        coordinator: Arc<dyn CoordinatorHandle>,
    ) -> (Self, EngineHandle) {
        let (input_tx, input_rx) = mpsc::channel(512);
        Self::with_channel(
            keypair, local_peer, identities, net_cmd_tx, sink, coordinator, input_tx, input_rx,
        )
    }

    /// Construct around an externally created input channel, for callers
    /// that must hand the sender to collaborators (the coordinator, bus
    /// pumps) before the engine exists.
    #[allow(clippy::too_many_arguments)]
    pub fn with_channel(
        keypair: Keypair,
        local_peer: PeerTag,
        identities: Arc<IdentityStore>,
        net_cmd_tx: mpsc::Sender<NetworkCommand>,
        sink: Arc<dyn SettlementSink>,
        coordinator: Arc<dyn CoordinatorHandle>,
        input_tx: mpsc::Sender<EngineInput>,
        input_rx: mpsc::Receiver<EngineInput>,
    ) -> (Self, EngineHandle) {
        let engine = Self {
            keypair,
            local_peer,
            identities,
            input_rx,
            net_cmd_tx,
            sink,
            coordinator,
            state: NegotiationState::new(),
            peer_keys: PeerKeyCache::new(),
            bus_disabled: false,
        };
        (engine, EngineHandle { input_tx })
    }

    /// Drive the engine until every input sender is dropped (the global
    /// shutdown path closes the channel and lets the loop drain).
    pub async fn run(mut self) {
        while let Some(input) = self.input_rx.recv().await {
            match input {
                EngineInput::Net(event) => self.handle_network_event(event).await,
                EngineInput::Cmd(cmd) => self.handle_command(cmd).await,
                EngineInput::Settlement { proposal_id, state, actor } => {
                    self.handle_settlement_advance(proposal_id, state, actor).await;
                }
                EngineInput::Chain(event) => {
                    if let Err(e) = self.coordinator.chain_event(event).await {
                        warn!(error = %e, "coordinator rejected chain event");
                    }
                }
            }
        }
        info!("engine input closed; draining done");
    }

    // ── Network ingress ──────────────────────────────────────────────────────

    async fn handle_network_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Message { peer, bytes } => {
                self.handle_message(peer, &bytes).await;
            }
            NetworkEvent::PeerConnected(peer) => debug!(peer = %peer, "peer connected"),
            NetworkEvent::PeerDisconnected(peer) => debug!(peer = %peer, "peer disconnected"),
            NetworkEvent::Listening(addr) => debug!(addr = %addr, "listening"),
        }
    }

    async fn handle_message(&mut self, peer: PeerId, bytes: &[u8]) {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(env) => env,
            Err(e) => {
                debug!(peer = %peer, error = %e, "undecodable envelope dropped");
                return;
            }
        };
        let peer_tag = PeerTag(peer.to_string());

        let (payload, signer) = match envelope {
            Envelope::Signed(env) => {
                if let Err(e) = verify(&env.signer_public_key, &env.message_bytes(), &env.signature)
                {
                    warn!(peer = %peer_tag.short(), kind = %env.kind, error = %e,
                          "signature verification failed; message dropped");
                    return;
                }
                // Pin (or compare against) the first key seen for this peer.
                // Drift logs a warning inside the cache; the message is still
                // processed because it verified against its in-band key.
                self.peer_keys.observe(&peer_tag, &env.signer_public_key);
                match Payload::decode(&env.kind, &env.payload) {
                    Ok(p) => (p, Some(env.signer_public_key)),
                    Err(e) => {
                        warn!(kind = %env.kind, error = %e, "malformed payload dropped");
                        return;
                    }
                }
            }
            Envelope::Plain(env) => {
                debug!(peer = %peer_tag.short(), kind = %env.kind,
                       "plain envelope accepted (unauthenticated fallback)");
                match Payload::decode(&env.kind, &env.payload) {
                    Ok(p) => (p, None),
                    Err(e) => {
                        warn!(kind = %env.kind, error = %e, "malformed payload dropped");
                        return;
                    }
                }
            }
        };

        self.dispatch(payload, peer_tag, signer).await;
    }

    async fn dispatch(&mut self, payload: Payload, peer: PeerTag, signer: Option<Vec<u8>>) {
        match payload {
            Payload::OrderAnnouncement(announcement) => {
                self.on_announcement(announcement, peer);
            }
            Payload::OrderRequest(request) => {
                self.on_order_request(request, peer, signer).await;
            }
            Payload::OrderDetails(details) => {
                self.cache_details(details, &peer);
            }
            Payload::EncryptedOrderDetails(sealed) => {
                match self.open_sealed(&sealed.sealed) {
                    Ok(details) => self.cache_details(details, &peer),
                    Err(e) => warn!(order = %sealed.order_id, error = %e,
                                    "undecryptable order details dropped"),
                }
            }
            Payload::Proposal(terms) => {
                self.store_incoming_proposal(terms, peer);
            }
            Payload::EncryptedProposal(sealed) => match self.open_sealed(&sealed.sealed) {
                Ok(terms) => self.store_incoming_proposal(terms, peer),
                Err(e) => warn!(order = %sealed.order_id, error = %e,
                                "undecryptable proposal dropped"),
            },
            Payload::EncryptedAcceptance(sealed) => match self.open_sealed(&sealed.sealed) {
                Ok(notice) => self.on_acceptance(notice).await,
                Err(e) => warn!(proposal = %sealed.proposal_id, error = %e,
                                "undecryptable acceptance dropped"),
            },
            Payload::Rejection(notice) => self.on_rejection(notice),
        }
    }

    fn on_announcement(&mut self, announcement: OrderAnnouncement, peer: PeerTag) {
        if announcement.maker_peer != peer {
            warn!(order = %announcement.order_id, claimed = %announcement.maker_peer.short(),
                  actual = %peer.short(), "announcement maker does not match signer peer; dropped");
            return;
        }
        // A targeted announcement may carry details sealed to this node.
        if let Some(blob) = &announcement.sealed_details {
            if let Ok(details) = self.open_sealed::<OrderDetails>(blob) {
                debug!(order = %announcement.order_id, "targeted order details unsealed");
                self.state.peer_details.insert(details.order_id.clone(), details);
            }
        }
        debug!(order = %announcement.order_id, "announcement cached");
        self.state
            .orders
            .insert(announcement.order_id.clone(), announcement);
    }

    async fn on_order_request(
        &mut self,
        request: OrderRequest,
        peer: PeerTag,
        signer: Option<Vec<u8>>,
    ) {
        let Some(details) = self.state.own_details.get(&request.order_id).cloned() else {
            // Broadcast request for someone else's order.
            return;
        };

        // Prefer the key that just arrived in-band, else the cached one.
        let requester_key = signer.or_else(|| self.peer_keys.lookup(&peer).map(|k| k.to_vec()));
        let Some(requester_key) = requester_key else {
            warn!(order = %request.order_id, peer = %peer.short(),
                  "no public key for requester; details reply skipped");
            return;
        };

        let body = match serde_json::to_vec(&details) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "order details serialization failed");
                return;
            }
        };

        let payload = match ecies_encrypt(&requester_key, &body) {
            Ok(sealed) => Payload::EncryptedOrderDetails(SealedOrderDetails {
                order_id: request.order_id.clone(),
                sealed: SealedBlob(sealed),
            }),
            Err(e) => {
                // Degraded: reply signed but unencrypted. Loud on purpose.
                warn!(order = %request.order_id, error = %e,
                      "sealing order details failed; falling back to signed-plain reply");
                Payload::OrderDetails(details)
            }
        };

        if let Err(e) = self.send_signed(payload, Some(&peer)).await {
            warn!(order = %request.order_id, error = %e, "details reply send failed");
        }
    }

    fn cache_details(&mut self, details: OrderDetails, peer: &PeerTag) {
        if let Err(e) = details.validate() {
            warn!(order = %details.order_id, error = %e, "invalid order details dropped");
            return;
        }
        debug!(order = %details.order_id, peer = %peer.short(), "order details cached");
        self.state
            .peer_details
            .insert(details.order_id.clone(), details);
    }

    fn store_incoming_proposal(&mut self, terms: ProposalTerms, peer: PeerTag) {
        if self.state.proposals.contains_key(&terms.proposal_id) {
            debug!(proposal = %terms.proposal_id, "duplicate proposal ignored");
            return;
        }
        match Proposal::new(
            terms.proposal_id.clone(),
            terms.order_id,
            peer,
            terms.price,
            terms.amount,
            terms.timestamp,
        ) {
            Ok(proposal) => {
                info!(proposal = %proposal.proposal_id, price = proposal.price,
                      amount = proposal.amount, "proposal received");
                self.state
                    .proposals
                    .insert(proposal.proposal_id.clone(), proposal);
            }
            Err(e) => warn!(error = %e, "invalid proposal dropped"),
        }
    }

    async fn on_acceptance(&mut self, notice: AcceptanceNotice) {
        let Some(proposal) = self.state.proposals.get_mut(&notice.proposal_id) else {
            warn!(proposal = %notice.proposal_id, "acceptance for unknown proposal dropped");
            return;
        };
        match proposal.accept(notice.hash_lock) {
            Ok(()) => {
                info!(proposal = %notice.proposal_id, hash = %notice.hash_lock.h160_hex(),
                      "proposal accepted by maker");
                let snapshot = proposal.clone();
                let expires_at = self
                    .state
                    .orders
                    .get(&snapshot.order_id)
                    .map(|a| a.expires_at);
                self.publish_status(&notice.proposal_id, SettlementState::Ready, SwapSide::Taker)
                    .await;
                if let Err(e) = self.coordinator.start(snapshot, expires_at, None).await {
                    warn!(proposal = %notice.proposal_id, error = %e,
                          "coordinator refused taker-side swap");
                }
            }
            Err(e) => warn!(proposal = %notice.proposal_id, error = %e,
                            "acceptance rejected"),
        }
    }

    fn on_rejection(&mut self, notice: RejectionNotice) {
        let Some(proposal) = self.state.proposals.get_mut(&notice.proposal_id) else {
            debug!(proposal = %notice.proposal_id, "rejection for unknown proposal ignored");
            return;
        };
        match proposal.reject() {
            Ok(()) => info!(proposal = %notice.proposal_id, "proposal rejected by maker"),
            Err(e) => warn!(proposal = %notice.proposal_id, error = %e,
                            "rejection arrived for settled proposal"),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::CreateOrder {
                order_type,
                amount,
                asset,
                min_price,
                max_price,
                taker,
                reply,
            } => {
                let result = self
                    .create_order(order_type, amount, asset, min_price, max_price, taker)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::ListOrders { reply } => {
                let _ = reply.send(self.state.list_orders());
            }
            EngineCommand::RequestOrderDetails { order_id, reply } => {
                let request = OrderRequest {
                    order_id,
                    timestamp: chrono::Utc::now().timestamp(),
                };
                let result = self.send_signed(Payload::OrderRequest(request), None).await;
                let _ = reply.send(result);
            }
            EngineCommand::GetOrderDetails { order_id, reply } => {
                let _ = reply.send(self.state.details(&order_id).cloned());
            }
            EngineCommand::Propose { order_id, price, amount, reply } => {
                let result = self.propose(order_id, price, amount).await;
                let _ = reply.send(result);
            }
            EngineCommand::AcceptProposal { proposal_id, secret, reply } => {
                let result = self.accept_proposal(proposal_id, secret).await;
                let _ = reply.send(result);
            }
            EngineCommand::RejectProposal { proposal_id, reply } => {
                let result = self.reject_proposal(proposal_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::ListProposals { order_id, reply } => {
                let _ = reply.send(self.state.list_proposals(&order_id));
            }
            EngineCommand::Status { proposal_id, reply } => {
                let result = self
                    .state
                    .proposals
                    .get(&proposal_id)
                    .cloned()
                    .ok_or_else(|| CrosslockError::UnknownProposal(proposal_id.to_string()));
                let _ = reply.send(result);
            }
        }
    }

    async fn create_order(
        &mut self,
        order_type: OrderType,
        amount: Amount,
        asset: AssetTag,
        min_price: Price,
        max_price: Price,
        taker: Option<Username>,
    ) -> Result<OrderId, CrosslockError> {
        let order_id = OrderId::generate();
        let details = OrderDetails {
            order_id: order_id.clone(),
            order_type,
            amount,
            min_price,
            max_price,
            asset: asset.clone(),
        };
        details.validate()?;

        let now = chrono::Utc::now().timestamp();
        let mut announcement = OrderAnnouncement::new(
            order_id.clone(),
            order_type,
            asset,
            self.local_peer.clone(),
            now,
            now + ORDER_TTL_SECS,
        )?;

        // A targeted order carries the full terms sealed to the taker.
        if let Some(taker) = taker {
            let taker_key = self
                .identities
                .lookup_public_key(&taker)
                .map_err(|_| CrosslockError::UnknownUsername(taker.to_string()))?;
            let body = serde_json::to_vec(&details)?;
            match ecies_encrypt(&taker_key, &body) {
                Ok(sealed) => announcement.sealed_details = Some(SealedBlob(sealed)),
                Err(e) => warn!(order = %order_id, error = %e,
                                "sealing targeted details failed; announcing open order"),
            }
        }

        self.state.own_details.insert(order_id.clone(), details);
        self.state
            .orders
            .insert(order_id.clone(), announcement.clone());

        self.send_signed(Payload::OrderAnnouncement(announcement), None)
            .await?;
        info!(order = %order_id, "order announced");
        Ok(order_id)
    }

    async fn propose(
        &mut self,
        order_id: OrderId,
        price: Price,
        amount: Amount,
    ) -> Result<ProposalId, CrosslockError> {
        let announcement = self
            .state
            .orders
            .get(&order_id)
            .ok_or_else(|| CrosslockError::UnknownOrder(order_id.to_string()))?;
        let maker_peer = announcement.maker_peer.clone();

        let proposal_id = ProposalId::derive(&order_id);
        let now = chrono::Utc::now().timestamp();
        let proposal = Proposal::new(
            proposal_id.clone(),
            order_id.clone(),
            self.local_peer.clone(),
            price,
            amount,
            now,
        )?;
        let terms = ProposalTerms {
            proposal_id: proposal_id.clone(),
            order_id: order_id.clone(),
            price,
            amount,
            timestamp: now,
        };
        self.state
            .proposals
            .insert(proposal_id.clone(), proposal);

        let sealed = self
            .peer_keys
            .lookup(&maker_peer)
            .and_then(|key| {
                let body = serde_json::to_vec(&terms).ok()?;
                ecies_encrypt(key, &body).ok()
            });

        match sealed {
            Some(sealed) => {
                let payload = Payload::EncryptedProposal(SealedProposal {
                    order_id,
                    sealed: SealedBlob(sealed),
                });
                self.send_signed(payload, Some(&maker_peer)).await?;
            }
            None => {
                // Security degradation, by explicit policy: without a cached
                // maker key the proposal goes out signed but unsealed.
                warn!(order = %order_id, maker = %maker_peer.short(),
                      "no cached key for maker; broadcasting signed plain proposal");
                self.send_signed(Payload::Proposal(terms), None).await?;
            }
        }
        info!(proposal = %proposal_id, "proposal sent");
        Ok(proposal_id)
    }

    async fn accept_proposal(
        &mut self,
        proposal_id: ProposalId,
        secret: Vec<u8>,
    ) -> Result<(), CrosslockError> {
        let now = chrono::Utc::now().timestamp();
        let proposal = self
            .state
            .proposals
            .get(&proposal_id)
            .ok_or_else(|| CrosslockError::UnknownProposal(proposal_id.to_string()))?;

        let order_expires_at = self
            .state
            .orders
            .get(&proposal.order_id)
            .map(|a| a.expires_at);
        if let Some(expiry) = order_expires_at {
            if now > expiry {
                return Err(CrosslockError::OrderExpired);
            }
        }

        let hash_lock = HashLock {
            h160: hash160(&secret),
            h256: sha256(&secret),
        };
        let proposer = proposal.proposer_peer.clone();
        let notice = AcceptanceNotice {
            proposal_id: proposal_id.clone(),
            order_id: proposal.order_id.clone(),
            price: proposal.price,
            amount: proposal.amount,
            status: crosslock_core::order::ProposalStatus::Accepted,
            timestamp: now,
            hash_lock,
        };

        // Seal before mutating so a missing key cannot strand the proposal
        // in Accepted with the proposer never told.
        let proposer_key = self
            .peer_keys
            .lookup(&proposer)
            .ok_or_else(|| CrosslockError::NoPeerKey(proposer.to_string()))?;
        let sealed = ecies_encrypt(proposer_key, &serde_json::to_vec(&notice)?)
            .map_err(|_| CrosslockError::MalformedKey)?;

        let proposal = self
            .state
            .proposals
            .get_mut(&proposal_id)
            .expect("proposal present; checked above");
        proposal.accept(hash_lock)?;
        let snapshot = proposal.clone();

        self.send_signed(
            Payload::EncryptedAcceptance(SealedAcceptance {
                proposal_id: proposal_id.clone(),
                sealed: SealedBlob(sealed),
            }),
            Some(&proposer),
        )
        .await?;

        // Bus publication is best-effort; acceptance stands regardless.
        let request = SettlementRequest {
            proposal_id: proposal_id.clone(),
            order_id: snapshot.order_id.clone(),
            maker_id: self.local_peer.clone(),
            taker_id: proposer,
            amount: snapshot.amount,
            price: snapshot.price,
            asset: self
                .state
                .details(&snapshot.order_id)
                .map(|d| d.asset.clone())
                .unwrap_or_else(|| AssetTag::from("UNKNOWN")),
            settlement_chain: self
                .state
                .details(&snapshot.order_id)
                .map(|d| d.asset.as_str().to_lowercase())
                .unwrap_or_else(|| "unknown".into()),
            timestamp: now,
            published_at: chrono::Utc::now(),
        };
        if let Err(e) = self.sink.publish_request(&request).await {
            warn!(proposal = %proposal_id, error = %e,
                  "settlement bus unavailable; continuing bus-disabled");
            self.bus_disabled = true;
        }
        self.publish_status(&proposal_id, SettlementState::Ready, SwapSide::Maker)
            .await;

        if let Err(e) = self
            .coordinator
            .start(snapshot, order_expires_at, Some(secret))
            .await
        {
            warn!(proposal = %proposal_id, error = %e, "coordinator refused maker-side swap");
        }
        info!(proposal = %proposal_id, "proposal accepted");
        Ok(())
    }

    async fn reject_proposal(&mut self, proposal_id: ProposalId) -> Result<(), CrosslockError> {
        let proposal = self
            .state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| CrosslockError::UnknownProposal(proposal_id.to_string()))?;
        proposal.reject()?;
        let notice = RejectionNotice {
            proposal_id: proposal_id.clone(),
            order_id: proposal.order_id.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        let proposer = proposal.proposer_peer.clone();
        self.send_signed(Payload::Rejection(notice), Some(&proposer))
            .await?;
        info!(proposal = %proposal_id, "proposal rejected");
        Ok(())
    }

    // ── Settlement plumbing ──────────────────────────────────────────────────

    async fn handle_settlement_advance(
        &mut self,
        proposal_id: ProposalId,
        state: SettlementState,
        actor: SwapSide,
    ) {
        let Some(proposal) = self.state.proposals.get_mut(&proposal_id) else {
            warn!(proposal = %proposal_id, "settlement advance for unknown proposal");
            return;
        };
        match proposal.advance_settlement(state) {
            Ok(()) => {
                info!(proposal = %proposal_id, state = %state, "settlement advanced");
                self.publish_status(&proposal_id, state, actor).await;
            }
            Err(e) => warn!(proposal = %proposal_id, error = %e,
                            "illegal settlement advance refused"),
        }
    }

    async fn publish_status(
        &mut self,
        proposal_id: &ProposalId,
        state: SettlementState,
        actor: SwapSide,
    ) {
        let update = SettlementUpdate {
            proposal_id: proposal_id.clone(),
            state,
            actor,
            timestamp: chrono::Utc::now().timestamp(),
            published_at: chrono::Utc::now(),
        };
        if let Err(e) = self.sink.publish_status(&update).await {
            if !self.bus_disabled {
                warn!(error = %e, "status publish failed; bus-disabled mode");
                self.bus_disabled = true;
            }
        }
    }

    // ── Wire helpers ─────────────────────────────────────────────────────────

    fn open_sealed<T: serde::de::DeserializeOwned>(
        &self,
        blob: &SealedBlob,
    ) -> Result<T, CrosslockError> {
        let plain = ecies_decrypt(self.keypair.signing_key(), &blob.0)
            .map_err(|_| CrosslockError::DecryptFailed)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    async fn send_signed(
        &self,
        payload: Payload,
        target: Option<&PeerTag>,
    ) -> Result<(), CrosslockError> {
        let body = payload.encode_body()?;
        let kind = payload.kind();
        let signature = self
            .keypair
            .sign(&SignedEnvelope::signing_bytes(kind, &body));
        let envelope = Envelope::Signed(SignedEnvelope {
            kind: kind.to_string(),
            payload: body,
            signature,
            signer_public_key: self.keypair.public_key_bytes().to_vec(),
            timestamp: chrono::Utc::now().timestamp(),
        });
        let bytes = envelope.to_bytes()?;

        let command = match target {
            Some(peer_tag) => {
                let peer = PeerId::from_str(peer_tag.as_str()).map_err(|_| {
                    CrosslockError::Serialization(format!("bad peer id: {peer_tag}"))
                })?;
                NetworkCommand::Send { peer, bytes }
            }
            None => NetworkCommand::Broadcast(bytes),
        };
        self.net_cmd_tx
            .send(command)
            .await
            .map_err(|_| CrosslockError::NetworkClosed)
    }
}
