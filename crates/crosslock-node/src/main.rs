//! crosslock-node — the Crosslock peer binary.
//!
//! Startup sequence:
//!   1. Open the identity store; register or log in the node's user
//!   2. Start the libp2p network (GossipSub + directed streams + mDNS)
//!   3. Connect the settlement bus (or run bus-disabled)
//!   4. Wire the swap coordinator to its chain adapters
//!   5. Run the engine: the single writer of all negotiation state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crosslock_bus::{DisabledSink, SettlementSink, TcpBusClient};
use crosslock_core::order::{AssetTag, OrderType};
use crosslock_core::types::{PeerTag, Username};
use crosslock_coordinator::{Coordinator, CoordinatorConfig};
use crosslock_engine::{Engine, EngineInput};
use crosslock_htlc::{ContractHtlc, MemoryContractHtlc, RpcContractHtlc, UtxoRpc};
use crosslock_identity::{IdentityStore, SessionManager, WalletStore};
use crosslock_p2p::{NetworkCommand, P2pConfig, P2pNetwork};

/// Environment variable selecting the settlement bus. Unset or empty runs
/// the node bus-disabled.
const BUS_URL_ENV: &str = "CROSSLOCK_BUS_URL";

#[derive(Parser, Debug)]
#[command(
    name = "crosslock-node",
    version,
    about = "Crosslock peer — P2P OTC negotiation and two-chain HTLC settlement"
)]
struct Args {
    /// Directory holding sealed identity files.
    #[arg(long, default_value = "~/.crosslock/identities")]
    identity_dir: PathBuf,

    /// Wallet-mapping JSON file.
    #[arg(long, default_value = "~/.crosslock/wallets.json")]
    wallet_file: PathBuf,

    /// Username to log in as on this node.
    #[arg(long)]
    username: String,

    /// Password unsealing the identity.
    #[arg(long)]
    password: String,

    /// Register the identity first if it does not exist yet.
    #[arg(long)]
    register: bool,

    /// P2P listen address.
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/9411")]
    p2p_listen: String,

    /// Bootstrap peer multiaddresses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Accept connections without dialing discovered peers.
    #[arg(long)]
    bootstrap_only: bool,

    /// UTXO-chain node JSON-RPC endpoint.
    #[arg(long)]
    utxo_rpc: Option<String>,

    #[arg(long)]
    utxo_rpc_user: Option<String>,

    #[arg(long)]
    utxo_rpc_pass: Option<String>,

    /// This node's UTXO-chain address (funding, refunds, claims).
    #[arg(long)]
    utxo_address: Option<String>,

    /// Contract-chain HTLC gateway JSON-RPC endpoint. Without one the node
    /// runs the in-memory reference contract (devnet mode).
    #[arg(long)]
    contract_rpc: Option<String>,

    /// This node's contract-chain address.
    #[arg(long, default_value = "")]
    contract_address: String,

    /// Settlement-asset tag used for bus subjects (e.g. SOL, STRK, USDC).
    #[arg(long, default_value = "SOL")]
    settlement_asset: String,

    /// Announce one order at startup: "amount:min_price:max_price".
    /// Stands in for the out-of-scope API surface in demos.
    #[arg(long)]
    announce: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crosslock=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Crosslock node starting");

    // ── Identity and session ──────────────────────────────────────────────────
    let identity_dir = expand_tilde(&args.identity_dir);
    let identities =
        Arc::new(IdentityStore::open(&identity_dir).context("opening identity store")?);
    let username = Username::from(args.username.as_str());

    if args.register && !identities.exists(&username) {
        identities
            .register(&username, &args.password)
            .context("registering identity")?;
        info!(user = %username, "identity registered");
    }

    let sessions = Arc::new(SessionManager::with_default_ttl());
    let session_id = sessions
        .login(&identities, &username, &args.password)
        .context("logging in")?;
    let keypair = sessions.keypair(&session_id).context("fetching session key")?;
    let _sweeper = Arc::clone(&sessions).spawn_sweeper();
    info!(user = %username, "logged in");

    // ── Wallet mapping ────────────────────────────────────────────────────────
    let wallets = WalletStore::open(expand_tilde(&args.wallet_file));
    if let Some(addr) = &args.utxo_address {
        wallets.set_address(&username, "utxo", addr).await?;
    }
    if !args.contract_address.is_empty() {
        wallets
            .set_address(&username, &args.settlement_asset.to_lowercase(), &args.contract_address)
            .await?;
    }

    // ── P2P network ───────────────────────────────────────────────────────────
    let p2p_config = P2pConfig {
        listen_addr: args.p2p_listen.clone(),
        bootstrap_peers: args.bootstrap.clone(),
        bootstrap_only: args.bootstrap_only,
        ..P2pConfig::default()
    };
    let (network, mut p2p_handle) =
        P2pNetwork::new(&p2p_config).map_err(|e| anyhow::anyhow!("building P2P network: {e}"))?;
    let local_peer = PeerTag(p2p_handle.local_peer_id.to_string());
    info!(peer_id = %local_peer, "P2P identity");
    let net_cmd_tx = p2p_handle.command_tx.clone();
    tokio::spawn(network.run());

    // ── Engine input channel (shared with coordinator and bus pumps) ─────────
    let (input_tx, input_rx) = mpsc::channel::<EngineInput>(512);

    // ── Settlement bus ────────────────────────────────────────────────────────
    let bus_url = std::env::var(BUS_URL_ENV).unwrap_or_default();
    let sink: Arc<dyn SettlementSink> = if bus_url.is_empty() {
        warn!("no {BUS_URL_ENV} set; running bus-disabled");
        Arc::new(DisabledSink)
    } else {
        let (client, mut inbound) =
            TcpBusClient::connect(&bus_url, vec!["settlement.chain.".into()]);
        // Chain events from the bus land on the engine input queue.
        let chain_input = input_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound.recv().await {
                match serde_json::from_value(msg.payload) {
                    Ok(event) => {
                        let _ = chain_input.send(EngineInput::Chain(event)).await;
                    }
                    Err(e) => warn!(subject = %msg.subject, error = %e,
                                    "undecodable chain event"),
                }
            }
        });
        info!(url = %bus_url, "settlement bus client started");
        Arc::new(client)
    };

    // ── Chain adapters ────────────────────────────────────────────────────────
    let contract: Arc<dyn ContractHtlc> = match &args.contract_rpc {
        Some(url) => {
            info!(url = %url, "using contract-chain RPC adapter");
            Arc::new(RpcContractHtlc::new(url))
        }
        None => {
            warn!("no --contract-rpc; using in-memory reference HTLC (devnet)");
            Arc::new(MemoryContractHtlc::new())
        }
    };
    let utxo_rpc = args.utxo_rpc.as_ref().map(|url| {
        info!(url = %url, "using UTXO-chain RPC");
        Arc::new(UtxoRpc::new(url, args.utxo_rpc_user.clone(), args.utxo_rpc_pass.clone()))
    });

    // ── Coordinator ───────────────────────────────────────────────────────────
    let coordinator_config = CoordinatorConfig {
        contract_chain: args.settlement_asset.to_lowercase(),
        own_utxo_address: args.utxo_address.clone(),
        own_contract_address: args.contract_address.clone(),
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::new(
        coordinator_config,
        input_tx.clone(),
        contract,
        utxo_rpc,
    );

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::with_channel(
        keypair,
        local_peer,
        Arc::clone(&identities),
        net_cmd_tx.clone(),
        sink,
        Arc::new(coordinator),
        input_tx.clone(),
        input_rx,
    );

    // Pipe network events into the engine queue.
    let net_input = input_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = p2p_handle.event_rx.recv().await {
            if net_input.send(EngineInput::Net(event)).await.is_err() {
                break;
            }
        }
    });

    let engine_task = tokio::spawn(engine.run());

    // ── Optional startup announcement ─────────────────────────────────────────
    if let Some(spec) = &args.announce {
        match parse_announce(spec) {
            Ok((amount, min_price, max_price)) => {
                let order_id = handle
                    .create_order(
                        OrderType::Sell,
                        amount,
                        AssetTag::from(args.settlement_asset.as_str()),
                        min_price,
                        max_price,
                        None,
                    )
                    .await
                    .context("announcing startup order")?;
                info!(order = %order_id, "startup order announced");
            }
            Err(e) => warn!(spec = %spec, error = %e, "bad --announce value ignored"),
        }
    }

    info!("node ready");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");
    let _ = net_cmd_tx.send(NetworkCommand::Shutdown).await;
    drop(handle);
    drop(input_tx);
    let _ = engine_task.await;
    Ok(())
}

/// Parse "amount:min_price:max_price" for the startup announcement.
fn parse_announce(spec: &str) -> anyhow::Result<(u64, u64, u64)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        anyhow::bail!("expected amount:min_price:max_price");
    }
    Ok((
        parts[0].parse().context("amount")?,
        parts[1].parse().context("min_price")?,
        parts[2].parse().context("max_price")?,
    ))
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
