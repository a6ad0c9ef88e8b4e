use std::collections::HashMap;
use tracing::warn;

use crosslock_core::types::PeerTag;

/// What `observe` saw relative to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyObservation {
    FirstSeen,
    Match,
    /// The peer presented a key different from the first one recorded. The
    /// message is still verified against its own in-band key; the anomaly is
    /// surfaced for operators, never silently overwritten.
    Drift,
}

/// First-observed signer public key per peer id.
#[derive(Default)]
pub struct PeerKeyCache {
    keys: HashMap<PeerTag, Vec<u8>>,
}

impl PeerKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the in-band key carried by a verified message.
    pub fn observe(&mut self, peer: &PeerTag, key: &[u8]) -> KeyObservation {
        match self.keys.get(peer) {
            None => {
                self.keys.insert(peer.clone(), key.to_vec());
                KeyObservation::FirstSeen
            }
            Some(cached) if cached == key => KeyObservation::Match,
            Some(cached) => {
                warn!(
                    peer = %peer.short(),
                    cached = %hex::encode(&cached[..8.min(cached.len())]),
                    presented = %hex::encode(&key[..8.min(key.len())]),
                    "peer public key drift"
                );
                KeyObservation::Drift
            }
        }
    }

    pub fn lookup(&self, peer: &PeerTag) -> Option<&[u8]> {
        self.keys.get(peer).map(|k| k.as_slice())
    }
}
