use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, mdns, noise, ping, request_response,
    request_response::ProtocolSupport,
    swarm::behaviour::toggle::Toggle,
    swarm::{DialError, SwarmEvent},
    Multiaddr, PeerId, Swarm,
};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crosslock_core::constants::{DIAL_BACKOFF_SECS, DIAL_RETRY_MAX};

use crate::codec::{FrameCodec, DIRECT_PROTOCOL};
use crate::config::P2pConfig;

/// Combined libp2p network behaviour for Crosslock.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `NetBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct NetBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub direct: request_response::Behaviour<FrameCodec>,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

/// Commands the engine (or front-end) issues to the network task.
#[derive(Debug)]
pub enum NetworkCommand {
    Dial(Multiaddr),
    /// Sealed or signed bytes for one peer over a directed stream.
    Send { peer: PeerId, bytes: Vec<u8> },
    /// Signed bytes for the gossip topic.
    Broadcast(Vec<u8>),
    Shutdown,
}

/// Events the network task forwards to the engine.
#[derive(Debug)]
pub enum NetworkEvent {
    Listening(Multiaddr),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// A payload arrived, over gossip or a directed stream.
    Message { peer: PeerId, bytes: Vec<u8> },
}

/// Application-facing handle returned from `P2pNetwork::new()`.
pub struct P2pHandle {
    /// Send commands here; the network task performs the blocking I/O.
    pub command_tx: mpsc::Sender<NetworkCommand>,
    /// Receive peer events and inbound messages here.
    pub event_rx: mpsc::Receiver<NetworkEvent>,
    /// Local libp2p peer identity.
    pub local_peer_id: PeerId,
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct P2pNetwork {
    swarm: Swarm<NetBehaviour>,
    topic: gossipsub::IdentTopic,
    command_rx: mpsc::Receiver<NetworkCommand>,
    command_tx: mpsc::Sender<NetworkCommand>,
    event_tx: mpsc::Sender<NetworkEvent>,
    bootstrap_only: bool,
    /// Dial attempts per address, for the bounded linear-backoff retry.
    dial_attempts: HashMap<Multiaddr, u32>,
}

impl P2pNetwork {
    /// Build the network and return `(P2pNetwork, P2pHandle)`.
    pub fn new(
        config: &P2pConfig,
    ) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let topic = gossipsub::IdentTopic::new(&config.order_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default(),
                noise::Config::new,
                libp2p::yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let direct = request_response::Behaviour::with_codec(
                    FrameCodec,
                    std::iter::once((DIRECT_PROTOCOL, ProtocolSupport::Full)),
                    request_response::Config::default(),
                );

                let mdns = if config.enable_mdns {
                    Toggle::from(Some(mdns::tokio::Behaviour::new(
                        mdns::Config::default(),
                        key.public().to_peer_id(),
                    )?))
                } else {
                    Toggle::from(None)
                };

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                Ok(NetBehaviour { gossipsub, direct, mdns, identify, ping })
            })?
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        let local_peer_id = *swarm.local_peer_id();
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);

        // Seed the dial queue with the static bootstrap list.
        for addr_str in &config.bootstrap_peers {
            match addr_str.parse::<Multiaddr>() {
                Ok(addr) => {
                    let _ = command_tx.try_send(NetworkCommand::Dial(addr));
                }
                Err(e) => warn!(addr = %addr_str, error = %e, "bad bootstrap multiaddr"),
            }
        }

        let network = P2pNetwork {
            swarm,
            topic,
            command_rx,
            command_tx: command_tx.clone(),
            event_tx,
            bootstrap_only: config.bootstrap_only,
            dial_attempts: HashMap::new(),
        };
        let handle = P2pHandle { command_tx, event_rx, local_peer_id };

        Ok((network, handle))
    }

    /// Drive the P2P event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    if !self.handle_command(cmd) {
                        info!("network shutting down");
                        return;
                    }
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
            }
        }
    }

    /// Returns false when the loop should stop.
    fn handle_command(&mut self, cmd: NetworkCommand) -> bool {
        match cmd {
            NetworkCommand::Dial(addr) => {
                let attempts = self.dial_attempts.entry(addr.clone()).or_insert(0);
                *attempts += 1;
                debug!(addr = %addr, attempt = *attempts, "dialing");
                if let Err(e) = self.swarm.dial(addr.clone()) {
                    warn!(addr = %addr, error = %e, "dial rejected");
                }
            }
            NetworkCommand::Send { peer, bytes } => {
                self.swarm.behaviour_mut().direct.send_request(&peer, bytes);
            }
            NetworkCommand::Broadcast(bytes) => {
                if let Err(e) = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), bytes)
                {
                    warn!(error = %e, "gossipsub publish failed");
                }
            }
            NetworkCommand::Shutdown => return false,
        }
        true
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<NetBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "P2P listening on");
                let _ = self.event_tx.send(NetworkEvent::Listening(address)).await;
            }

            SwarmEvent::Behaviour(NetBehaviourEvent::Gossipsub(
                gossipsub::Event::Message { propagation_source, message, .. },
            )) => {
                let _ = self
                    .event_tx
                    .send(NetworkEvent::Message {
                        peer: message.source.unwrap_or(propagation_source),
                        bytes: message.data,
                    })
                    .await;
            }

            SwarmEvent::Behaviour(NetBehaviourEvent::Direct(
                request_response::Event::Message { peer, message },
            )) => match message {
                request_response::Message::Request { request, channel, .. } => {
                    // Ack immediately; replies travel as separate requests.
                    let _ = self
                        .swarm
                        .behaviour_mut()
                        .direct
                        .send_response(channel, Vec::new());
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::Message { peer, bytes: request })
                        .await;
                }
                request_response::Message::Response { .. } => {}
            },

            SwarmEvent::Behaviour(NetBehaviourEvent::Direct(
                request_response::Event::OutboundFailure { peer, error, .. },
            )) => {
                warn!(peer = %peer, error = %error, "directed send failed");
            }

            SwarmEvent::Behaviour(NetBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer, addr) in peers {
                    debug!(peer = %peer, addr = %addr, "mDNS discovered");
                    self.swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer);
                    self.swarm.add_peer_address(peer, addr.clone());
                    if !self.bootstrap_only {
                        let _ = self.command_tx.try_send(NetworkCommand::Dial(addr));
                    }
                }
            }

            SwarmEvent::Behaviour(NetBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer, _) in peers {
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .remove_explicit_peer(&peer);
                }
            }

            SwarmEvent::Behaviour(NetBehaviourEvent::Identify(
                identify::Event::Received { peer_id, info, .. },
            )) => {
                for addr in info.listen_addrs {
                    self.swarm.add_peer_address(peer_id, addr);
                }
            }

            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!(peer = %peer_id, "connection established");
                // A successful dial clears the retry counter for its address.
                self.dial_attempts.remove(endpoint.get_remote_address());
                let _ = self
                    .event_tx
                    .send(NetworkEvent::PeerConnected(peer_id))
                    .await;
            }

            SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                if num_established == 0 {
                    debug!(peer = %peer_id, "connection closed");
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::PeerDisconnected(peer_id))
                        .await;
                }
            }

            SwarmEvent::OutgoingConnectionError { error, .. } => {
                self.schedule_dial_retries(&error);
            }

            _ => {}
        }
    }

    /// Re-queue failed dials with linear backoff until the retry budget is
    /// spent. Only transport-level failures carry the addresses back.
    fn schedule_dial_retries(&mut self, error: &DialError) {
        let DialError::Transport(failed) = error else {
            debug!(error = %error, "dial failed (no retry)");
            return;
        };
        for (addr, _) in failed {
            let attempts = self.dial_attempts.get(addr).copied().unwrap_or(0);
            if attempts >= DIAL_RETRY_MAX {
                warn!(addr = %addr, attempts, "giving up on peer");
                self.dial_attempts.remove(addr);
                continue;
            }
            let delay = Duration::from_secs(DIAL_BACKOFF_SECS * attempts as u64);
            let tx = self.command_tx.clone();
            let addr = addr.clone();
            debug!(addr = %addr, attempt = attempts, ?delay, "scheduling redial");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(NetworkCommand::Dial(addr)).await;
            });
        }
    }
}
