use crosslock_core::constants::GOSSIP_TOPIC;

/// Configuration for the Crosslock P2P network.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/9411").
    pub listen_addr: String,
    /// Static bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers.
    pub protocol_version: String,
    /// GossipSub topic for order announcements and requests.
    pub order_topic: String,
    /// Accept inbound connections but never dial discovered peers. Useful
    /// for deterministic demos where topology is fixed by the bootstrap
    /// list.
    pub bootstrap_only: bool,
    /// Run mDNS discovery. Off when topology comes entirely from the
    /// bootstrap list (or the host has no multicast).
    pub enable_mdns: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/9411".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/crosslock/1.0.0".into(),
            order_topic: GOSSIP_TOPIC.into(),
            bootstrap_only: false,
            enable_mdns: true,
        }
    }
}
