//! crosslock-p2p
//!
//! libp2p networking layer for Crosslock nodes.
//!
//! GossipSub broadcasts signed order announcements and requests to every
//! peer. A request-response protocol with 4-byte big-endian length framing
//! carries sealed unicast traffic (order details, proposals, acceptances).
//! mDNS discovers local peers; static bootstrap multiaddrs cover the rest.
//! Identify and Ping maintain connection metadata and liveness.

pub mod codec;
pub mod config;
pub mod network;

pub use config::P2pConfig;
pub use network::{NetworkCommand, NetworkEvent, P2pHandle, P2pNetwork};

// Re-exported so consumers address peers without a direct libp2p dependency.
pub use libp2p::{Multiaddr, PeerId};
