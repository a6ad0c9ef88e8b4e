use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crosslock_bus::{ChainEvent, ChainEventKind, SwapSide};
use crosslock_core::constants::{
    CONTRACT_TIMELOCK_SECS, TIMELOCK_MARGIN_SECS, UTXO_DUST_LIMIT, UTXO_FIXED_FEE,
    UTXO_TIMELOCK_SECS,
};
use crosslock_core::order::{Proposal, SettlementState};
use crosslock_core::types::{HashLock, ProposalId, Timestamp};
use crosslock_core::CrosslockError;
use crosslock_crypto::hash::hash256;
use crosslock_engine::{CoordinatorHandle, EngineInput};
use crosslock_htlc::{
    build_claim_tx, build_lock_tx, build_refund_tx, decode_wif, htlc_redeem_script,
    p2pkh_script_pubkey, p2sh_address, p2sh_script_pubkey, ContractError, ContractHtlc,
    UtxoRpc, Utxo,
};

use crate::secret::verify_binding;
use crate::swap::{validate_timelocks, Deadline, SwapRole, UtxoArtifact};

/// Interval at which swap watchers re-check their deadlines.
const WATCH_POLL: Duration = Duration::from_millis(500);

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Chain tag used for UTXO-side bus subjects.
    pub utxo_chain: String,
    /// Chain tag used for contract-side bus subjects.
    pub contract_chain: String,
    /// P2SH address version byte for the UTXO chain.
    pub utxo_address_version: u8,
    pub utxo_fee: u64,
    pub dust_limit: u64,
    pub utxo_timelock_secs: i64,
    pub contract_timelock_secs: i64,
    pub margin_secs: i64,
    /// This node's UTXO-chain address (maker funding/refund, taker claim).
    pub own_utxo_address: Option<String>,
    /// This node's contract-chain address.
    pub own_contract_address: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            utxo_chain: "utxo".into(),
            contract_chain: "sol".into(),
            utxo_address_version: 0xc4,
            utxo_fee: UTXO_FIXED_FEE,
            dust_limit: UTXO_DUST_LIMIT,
            utxo_timelock_secs: UTXO_TIMELOCK_SECS,
            contract_timelock_secs: CONTRACT_TIMELOCK_SECS,
            margin_secs: TIMELOCK_MARGIN_SECS,
            own_utxo_address: None,
            own_contract_address: String::new(),
        }
    }
}

// ── Status projection ────────────────────────────────────────────────────────

/// Read-only view of one swap, combining proposal state with the artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct SwapStatus {
    pub proposal_id: ProposalId,
    pub role: SwapRole,
    pub settlement: Option<SettlementState>,
    pub hash160_hex: String,
    pub sha256_hex: String,
    pub utxo_deadline: Timestamp,
    pub contract_deadline: Timestamp,
    pub utxo: Option<UtxoArtifact>,
}

// ── Internals ────────────────────────────────────────────────────────────────

struct SwapEntry {
    proposal: Proposal,
    role: SwapRole,
    hash_lock: HashLock,
    /// Our own preimage (maker side only).
    secret: Option<Zeroizing<Vec<u8>>>,
    /// Preimage observed on the contract chain (taker side).
    observed_secret: Option<Vec<u8>>,
    utxo: Option<UtxoArtifact>,
    utxo_deadline: Deadline,
    contract_deadline: Deadline,
}

impl SwapEntry {
    fn settlement(&self) -> SettlementState {
        self.proposal.settlement.unwrap_or(SettlementState::Ready)
    }
}

struct Inner {
    config: CoordinatorConfig,
    engine_input: mpsc::Sender<EngineInput>,
    contract: Arc<dyn ContractHtlc>,
    utxo_rpc: Option<Arc<UtxoRpc>>,
    swaps: Mutex<HashMap<ProposalId, SwapEntry>>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

/// The swap coordinator. Cheap to clone; all state lives behind one inner
/// Arc so per-swap watcher tasks can outlive the handle that spawned them.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        engine_input: mpsc::Sender<EngineInput>,
        contract: Arc<dyn ContractHtlc>,
        utxo_rpc: Option<Arc<UtxoRpc>>,
    ) -> Self {
        Self::with_clock(
            config,
            engine_input,
            contract,
            utxo_rpc,
            Arc::new(|| chrono::Utc::now().timestamp()),
        )
    }

    pub fn with_clock(
        config: CoordinatorConfig,
        engine_input: mpsc::Sender<EngineInput>,
        contract: Arc<dyn ContractHtlc>,
        utxo_rpc: Option<Arc<UtxoRpc>>,
        clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                engine_input,
                contract,
                utxo_rpc,
                swaps: Mutex::new(HashMap::new()),
                clock,
            }),
        }
    }

    fn now(&self) -> Timestamp {
        (self.inner.clock)()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Register an accepted proposal and spawn its deadline watcher.
    pub async fn begin(
        &self,
        proposal: Proposal,
        order_expires_at: Option<Timestamp>,
        secret: Option<Vec<u8>>,
    ) -> Result<(), CrosslockError> {
        let now = self.now();
        if let Some(expiry) = order_expires_at {
            if now > expiry {
                return Err(CrosslockError::OrderExpired);
            }
        }
        let hash_lock = proposal.hash_lock.ok_or(CrosslockError::ProposalNotAccepted)?;
        if let Some(secret) = &secret {
            verify_binding(secret, &hash_lock)?;
        }

        let utxo_deadline = Deadline::from_unix(now + self.inner.config.utxo_timelock_secs);
        let contract_deadline =
            Deadline::from_unix(now + self.inner.config.contract_timelock_secs);
        validate_timelocks(contract_deadline, utxo_deadline, self.inner.config.margin_secs)?;

        let role = if secret.is_some() { SwapRole::Maker } else { SwapRole::Taker };
        let proposal_id = proposal.proposal_id.clone();
        let entry = SwapEntry {
            proposal,
            role,
            hash_lock,
            secret: secret.map(Zeroizing::new),
            observed_secret: None,
            utxo: None,
            utxo_deadline,
            contract_deadline,
        };
        self.inner.swaps.lock().await.insert(proposal_id.clone(), entry);
        info!(proposal = %proposal_id, ?role, "swap registered");

        tokio::spawn(watch_deadlines(self.clone(), proposal_id));
        Ok(())
    }

    /// Maker: lock the UTXO leg. Returns the artifact (P2SH address and,
    /// when a node RPC is wired, the broadcast lock txid).
    pub async fn lock_maker_side(
        &self,
        proposal_id: &ProposalId,
        taker_utxo_address: &str,
    ) -> Result<UtxoArtifact, CrosslockError> {
        let (hash_lock, amount, deadline) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Maker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if entry.settlement() != SettlementState::Ready {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::MakerLocked.as_str(),
                });
            }
            (entry.hash_lock, entry.proposal.amount, entry.utxo_deadline)
        };

        let own_address = self
            .inner
            .config
            .own_utxo_address
            .clone()
            .ok_or(CrosslockError::MissingField("own_utxo_address"))?;
        let taker_pkh = address_pkh(taker_utxo_address)?;
        let maker_pkh = address_pkh(&own_address)?;

        let redeem = htlc_redeem_script(&hash_lock.h160, &taker_pkh, &maker_pkh, deadline.secs());
        let address = p2sh_address(&redeem, self.inner.config.utxo_address_version);

        let mut artifact = UtxoArtifact {
            redeem_script: hex::encode(&redeem),
            p2sh_address: address,
            deadline,
            lock_txid: None,
            claim_txid: None,
            refund_txid: None,
        };

        if let Some(rpc) = &self.inner.utxo_rpc {
            let unspent = rpc
                .list_unspent(1, Some(vec![own_address.clone()]))
                .await
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            let utxos: Vec<Utxo> = unspent
                .iter()
                .map(|u| {
                    Ok(Utxo {
                        txid: u.txid.clone(),
                        vout: u.vout,
                        value: u.value_units(),
                        script_pubkey: hex::decode(&u.script_pub_key)
                            .map_err(|_| CrosslockError::ChainRpc("bad scriptPubKey".into()))?,
                    })
                })
                .collect::<Result<_, CrosslockError>>()?;
            let change_script = p2pkh_script_pubkey(&maker_pkh);
            let lock_tx = build_lock_tx(
                &utxos,
                p2sh_script_pubkey(&redeem),
                amount,
                self.inner.config.utxo_fee,
                self.inner.config.dust_limit,
                change_script,
            )
            .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;

            let signed = rpc
                .sign_raw_transaction(&lock_tx.to_hex(), serde_json::Value::Array(vec![]))
                .await
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            let txid = rpc
                .send_raw_transaction(&signed)
                .await
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            info!(proposal = %proposal_id, txid = %txid, "utxo htlc locked");
            artifact.lock_txid = Some(txid);
        } else {
            debug!(proposal = %proposal_id, "no utxo rpc wired; artifact recorded unlocked");
        }

        {
            let mut swaps = self.inner.swaps.lock().await;
            if let Some(entry) = swaps.get_mut(proposal_id) {
                entry.utxo = Some(artifact.clone());
            }
        }
        self.advance(proposal_id, SettlementState::MakerLocked, SwapSide::Maker)
            .await?;
        Ok(artifact)
    }

    /// Taker: lock the contract leg for the maker to claim.
    pub async fn lock_taker_side(
        &self,
        proposal_id: &ProposalId,
        recipient_contract_address: &str,
    ) -> Result<(), CrosslockError> {
        let (hash_lock, total, deadline) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Taker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if entry.settlement() != SettlementState::MakerLocked {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::BothLocked.as_str(),
                });
            }
            (entry.hash_lock, entry.proposal.total_contract_units(), entry.contract_deadline)
        };

        self.inner
            .contract
            .lock(
                hash_lock.h256,
                &self.inner.config.own_contract_address,
                recipient_contract_address,
                deadline.secs(),
                total,
            )
            .await
            .map_err(|e| map_contract_err(e, deadline.secs()))?;
        info!(proposal = %proposal_id, total, "contract htlc locked");

        self.advance(proposal_id, SettlementState::BothLocked, SwapSide::Taker)
            .await
    }

    /// Maker: claim the contract leg, revealing the preimage on-chain.
    pub async fn claim_maker_side(&self, proposal_id: &ProposalId) -> Result<(), CrosslockError> {
        let (hash_lock, secret, deadline) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Maker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if entry.settlement() != SettlementState::BothLocked {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::MakerClaimed.as_str(),
                });
            }
            let secret = entry
                .secret
                .as_ref()
                .ok_or(CrosslockError::HashBindingMismatch)?
                .to_vec();
            (entry.hash_lock, secret, entry.contract_deadline)
        };
        verify_binding(&secret, &hash_lock)?;

        self.inner
            .contract
            .claim(hash_lock.h256, &secret)
            .await
            .map_err(|e| map_contract_err(e, deadline.secs()))?;
        info!(proposal = %proposal_id, "contract htlc claimed; preimage revealed");

        self.advance(proposal_id, SettlementState::MakerClaimed, SwapSide::Maker)
            .await
    }

    /// Taker: spend the UTXO leg with the preimage observed on the contract
    /// chain. The claim transaction is assembled and signed locally; no
    /// wallet can produce this scriptSig.
    pub async fn claim_taker_side(
        &self,
        proposal_id: &ProposalId,
        observed_secret: &[u8],
    ) -> Result<(), CrosslockError> {
        let (hash_lock, amount, artifact) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Taker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if entry.settlement() != SettlementState::MakerClaimed {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::Complete.as_str(),
                });
            }
            (entry.hash_lock, entry.proposal.amount, entry.utxo.clone())
        };
        verify_binding(observed_secret, &hash_lock)?;

        if let (Some(rpc), Some(artifact)) = (&self.inner.utxo_rpc, artifact) {
            let lock_txid = artifact
                .lock_txid
                .ok_or(CrosslockError::MissingField("lock_txid"))?;
            let own_address = self
                .inner
                .config
                .own_utxo_address
                .clone()
                .ok_or(CrosslockError::MissingField("own_utxo_address"))?;
            let wif = rpc
                .dump_priv_key(&own_address)
                .await
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            let key = decode_wif(&wif).map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            let redeem = hex::decode(&artifact.redeem_script)
                .map_err(|_| CrosslockError::ChainRpc("bad redeem script".into()))?;
            let dest = p2pkh_script_pubkey(&address_pkh(&own_address)?);

            let claim_tx = build_claim_tx(
                &lock_txid,
                0,
                amount,
                self.inner.config.utxo_fee,
                &redeem,
                observed_secret,
                &key,
                dest,
            )
            .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            let txid = rpc
                .send_raw_transaction(&claim_tx.to_hex())
                .await
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
            info!(proposal = %proposal_id, txid = %txid, "utxo htlc claimed");

            let mut swaps = self.inner.swaps.lock().await;
            if let Some(entry) = swaps.get_mut(proposal_id) {
                if let Some(utxo) = &mut entry.utxo {
                    utxo.claim_txid = Some(txid);
                }
            }
        }

        self.advance(proposal_id, SettlementState::Complete, SwapSide::Taker)
            .await
    }

    /// Maker: reclaim the UTXO leg once the timelock has passed.
    pub async fn refund_maker_side(&self, proposal_id: &ProposalId) -> Result<(), CrosslockError> {
        let (artifact, deadline) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Maker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if !entry.settlement().can_advance_to(SettlementState::RefundedMaker) {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::RefundedMaker.as_str(),
                });
            }
            (entry.utxo.clone(), entry.utxo_deadline)
        };
        if !deadline.reached(self.now()) {
            return Err(CrosslockError::TimelockNotReached { deadline: deadline.secs() });
        }

        if let (Some(rpc), Some(artifact)) = (&self.inner.utxo_rpc, artifact) {
            if let Some(lock_txid) = artifact.lock_txid {
                let own_address = self
                    .inner
                    .config
                    .own_utxo_address
                    .clone()
                    .ok_or(CrosslockError::MissingField("own_utxo_address"))?;
                let wif = rpc
                    .dump_priv_key(&own_address)
                    .await
                    .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
                let key =
                    decode_wif(&wif).map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
                let redeem = hex::decode(&artifact.redeem_script)
                    .map_err(|_| CrosslockError::ChainRpc("bad redeem script".into()))?;
                let dest = p2pkh_script_pubkey(&address_pkh(&own_address)?);

                let amount = {
                    let swaps = self.inner.swaps.lock().await;
                    self.entry(&swaps, proposal_id)?.proposal.amount
                };
                let refund_tx = build_refund_tx(
                    &lock_txid,
                    0,
                    amount,
                    self.inner.config.utxo_fee,
                    &redeem,
                    deadline.secs() as u32,
                    &key,
                    dest,
                )
                .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
                let txid = rpc
                    .send_raw_transaction(&refund_tx.to_hex())
                    .await
                    .map_err(|e| CrosslockError::ChainRpc(e.to_string()))?;
                info!(proposal = %proposal_id, txid = %txid, "utxo htlc refunded");

                let mut swaps = self.inner.swaps.lock().await;
                if let Some(entry) = swaps.get_mut(proposal_id) {
                    if let Some(utxo) = &mut entry.utxo {
                        utxo.refund_txid = Some(txid);
                    }
                }
            }
        }

        self.advance(proposal_id, SettlementState::RefundedMaker, SwapSide::Maker)
            .await
    }

    /// Taker: reclaim the contract leg once its timeout has passed.
    pub async fn refund_taker_side(&self, proposal_id: &ProposalId) -> Result<(), CrosslockError> {
        let (hash_lock, deadline) = {
            let swaps = self.inner.swaps.lock().await;
            let entry = self.entry(&swaps, proposal_id)?;
            if entry.role != SwapRole::Taker {
                return Err(CrosslockError::ProposalNotAccepted);
            }
            if !entry.settlement().can_advance_to(SettlementState::RefundedTaker) {
                return Err(CrosslockError::InvalidSettlementTransition {
                    from: entry.settlement().as_str(),
                    to: SettlementState::RefundedTaker.as_str(),
                });
            }
            (entry.hash_lock, entry.contract_deadline)
        };
        if !deadline.reached(self.now()) {
            return Err(CrosslockError::TimelockNotReached { deadline: deadline.secs() });
        }

        self.inner
            .contract
            .refund(hash_lock.h256, &self.inner.config.own_contract_address)
            .await
            .map_err(|e| map_contract_err(e, deadline.secs()))?;
        info!(proposal = %proposal_id, "contract htlc refunded");

        self.advance(proposal_id, SettlementState::RefundedTaker, SwapSide::Taker)
            .await
    }

    /// Preimage observed on the contract chain, if any (taker side).
    pub async fn observed_secret(&self, proposal_id: &ProposalId) -> Option<Vec<u8>> {
        self.inner
            .swaps
            .lock()
            .await
            .get(proposal_id)
            .and_then(|e| e.observed_secret.clone())
    }

    pub async fn status(&self, proposal_id: &ProposalId) -> Option<SwapStatus> {
        let swaps = self.inner.swaps.lock().await;
        swaps.get(proposal_id).map(|entry| SwapStatus {
            proposal_id: proposal_id.clone(),
            role: entry.role,
            settlement: entry.proposal.settlement,
            hash160_hex: entry.hash_lock.h160_hex(),
            sha256_hex: entry.hash_lock.h256_hex(),
            utxo_deadline: entry.utxo_deadline.secs(),
            contract_deadline: entry.contract_deadline.secs(),
            utxo: entry.utxo.clone(),
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn entry<'a>(
        &self,
        swaps: &'a HashMap<ProposalId, SwapEntry>,
        proposal_id: &ProposalId,
    ) -> Result<&'a SwapEntry, CrosslockError> {
        swaps
            .get(proposal_id)
            .ok_or_else(|| CrosslockError::UnknownProposal(proposal_id.to_string()))
    }

    /// Apply a transition to the local mirror, then report it onto the
    /// engine input queue. Re-applying the current state is a no-op.
    async fn advance(
        &self,
        proposal_id: &ProposalId,
        state: SettlementState,
        actor: SwapSide,
    ) -> Result<(), CrosslockError> {
        {
            let mut swaps = self.inner.swaps.lock().await;
            let entry = swaps
                .get_mut(proposal_id)
                .ok_or_else(|| CrosslockError::UnknownProposal(proposal_id.to_string()))?;
            entry.proposal.advance_settlement(state)?;
        }
        self.inner
            .engine_input
            .send(EngineInput::Settlement {
                proposal_id: proposal_id.clone(),
                state,
                actor,
            })
            .await
            .map_err(|_| CrosslockError::NetworkClosed)
    }

    async fn handle_chain_event(&self, event: ChainEvent) -> Result<(), CrosslockError> {
        let on_utxo = event.chain == self.inner.config.utxo_chain;
        match event.kind {
            ChainEventKind::Locked { redeem_script_hex, vout } if on_utxo => {
                // The taker learns the lock artifact from the watcher here.
                let mut swaps = self.inner.swaps.lock().await;
                if let Some(entry) = swaps.get_mut(&event.proposal_id) {
                    if entry.utxo.is_none() {
                        if let Some(redeem) = redeem_script_hex {
                            entry.utxo = Some(UtxoArtifact {
                                redeem_script: redeem,
                                p2sh_address: String::new(),
                                deadline: entry.utxo_deadline,
                                lock_txid: event.tx_ref.clone(),
                                claim_txid: None,
                                refund_txid: None,
                            });
                            debug!(proposal = %event.proposal_id, vout = ?vout,
                                   "utxo artifact learned from chain event");
                        }
                    }
                }
                drop(swaps);
                self.advance(&event.proposal_id, SettlementState::MakerLocked, SwapSide::Maker)
                    .await
            }
            ChainEventKind::Locked { .. } => {
                self.advance(&event.proposal_id, SettlementState::BothLocked, SwapSide::Taker)
                    .await
            }
            ChainEventKind::Claimed { preimage_hex } if !on_utxo => {
                let preimage = hex::decode(&preimage_hex)
                    .map_err(|_| CrosslockError::BadPreimage)?;
                {
                    let swaps = self.inner.swaps.lock().await;
                    let entry = self.entry(&swaps, &event.proposal_id)?;
                    verify_binding(&preimage, &entry.hash_lock)?;
                }
                {
                    let mut swaps = self.inner.swaps.lock().await;
                    if let Some(entry) = swaps.get_mut(&event.proposal_id) {
                        entry.observed_secret = Some(preimage);
                    }
                }
                info!(proposal = %event.proposal_id, "preimage observed on contract chain");
                self.advance(&event.proposal_id, SettlementState::MakerClaimed, SwapSide::Maker)
                    .await
            }
            ChainEventKind::Claimed { .. } => {
                self.advance(&event.proposal_id, SettlementState::Complete, SwapSide::Taker)
                    .await
            }
            ChainEventKind::Refunded if on_utxo => {
                self.advance(&event.proposal_id, SettlementState::RefundedMaker, SwapSide::Maker)
                    .await
            }
            ChainEventKind::Refunded => {
                self.advance(&event.proposal_id, SettlementState::RefundedTaker, SwapSide::Taker)
                    .await
            }
        }
    }
}

#[async_trait]
impl CoordinatorHandle for Coordinator {
    async fn start(
        &self,
        proposal: Proposal,
        order_expires_at: Option<i64>,
        secret: Option<Vec<u8>>,
    ) -> Result<(), CrosslockError> {
        self.begin(proposal, order_expires_at, secret).await
    }

    async fn chain_event(&self, event: ChainEvent) -> Result<(), CrosslockError> {
        self.handle_chain_event(event).await
    }
}

// ── Deadline watcher ─────────────────────────────────────────────────────────

/// Watches one swap's own-side deadline and fires the refund branch without
/// external input once it passes. The coordinator never abandons a live
/// HTLC: failures here retry until the swap reaches a terminal state.
async fn watch_deadlines(coordinator: Coordinator, proposal_id: ProposalId) {
    loop {
        tokio::time::sleep(WATCH_POLL).await;

        let (role, deadline, state) = {
            let swaps = coordinator.inner.swaps.lock().await;
            let Some(entry) = swaps.get(&proposal_id) else { return };
            let deadline = match entry.role {
                SwapRole::Maker => entry.utxo_deadline,
                SwapRole::Taker => entry.contract_deadline,
            };
            (entry.role, deadline, entry.settlement())
        };

        if state.is_terminal() {
            return;
        }
        if !deadline.reached(coordinator.now()) {
            continue;
        }

        let refundable = match role {
            SwapRole::Maker => state.can_advance_to(SettlementState::RefundedMaker),
            SwapRole::Taker => state.can_advance_to(SettlementState::RefundedTaker),
        };
        if !refundable {
            // Nothing of ours is locked (or the swap already completed in
            // our favor); the watcher's job is done.
            return;
        }

        warn!(proposal = %proposal_id, ?role, "timelock expired; firing refund");
        let result = match role {
            SwapRole::Maker => coordinator.refund_maker_side(&proposal_id).await,
            SwapRole::Taker => coordinator.refund_taker_side(&proposal_id).await,
        };
        match result {
            Ok(()) => return,
            Err(e) => {
                warn!(proposal = %proposal_id, error = %e, "refund attempt failed; will retry");
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Base58Check address → 20-byte pubkey/script hash.
fn address_pkh(address: &str) -> Result<[u8; 20], CrosslockError> {
    let raw = bs58::decode(address)
        .into_vec()
        .map_err(|_| CrosslockError::ChainRpc(format!("bad address: {address}")))?;
    if raw.len() != 25 {
        return Err(CrosslockError::ChainRpc(format!("bad address length: {address}")));
    }
    let (payload, checksum) = raw.split_at(21);
    if hash256(payload)[..4] != *checksum {
        return Err(CrosslockError::ChainRpc(format!("bad address checksum: {address}")));
    }
    let mut pkh = [0u8; 20];
    pkh.copy_from_slice(&payload[1..]);
    Ok(pkh)
}

fn map_contract_err(e: ContractError, deadline: Timestamp) -> CrosslockError {
    match e {
        ContractError::DuplicateHash => CrosslockError::DuplicateHash,
        ContractError::PastTimeout => CrosslockError::PastTimeout,
        ContractError::ZeroAmount => CrosslockError::ZeroAmount,
        ContractError::BadPreimage => CrosslockError::BadPreimage,
        ContractError::AlreadyFinalized => CrosslockError::AlreadyFinalized,
        ContractError::NotSender => CrosslockError::NotSender,
        ContractError::TimelockNotReached => {
            CrosslockError::TimelockNotReached { deadline }
        }
        ContractError::UnknownHash | ContractError::Rpc(_) => {
            CrosslockError::ChainRpc(e.to_string())
        }
    }
}
