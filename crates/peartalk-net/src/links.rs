//! Connection and link tracking.
//!
//! A connection is a libp2p transport connection to a peer. A link is a
//! (peer, topic) pair on which the remote has greeted us with its identity;
//! only links carry message frames. Links die with their last connection.

use std::collections::{HashMap, HashSet};

use libp2p::{Multiaddr, PeerId};
use tracing::debug;

use peartalk_shared::{now_millis, Topic};

/// A transport connection to a remote peer.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub address: Multiaddr,
    pub relayed: bool,
    /// Unix epoch millis.
    pub connected_at: i64,
}

/// An established link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub peer_id: PeerId,
    pub topic: Topic,
    /// Identity the remote announced in its greeting.
    pub identity: String,
    /// Unix epoch millis.
    pub linked_at: i64,
}

/// What a greeting changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloOutcome {
    /// A new link.
    Linked,
    /// The link already existed with this identity.
    AlreadyLinked,
    /// The link existed under another identity, which it replaces.
    Rebound { previous: String },
}

#[derive(Debug, Default)]
pub struct LinkTracker {
    connections: HashMap<PeerId, ConnectionInfo>,
    links: HashMap<(PeerId, Topic), LinkInfo>,
    greeted: HashSet<(PeerId, Topic)>,
}

impl LinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&mut self, peer_id: PeerId, address: Multiaddr, relayed: bool) {
        debug!(peer = %peer_id, addr = %address, relayed, "Tracking new peer connection");
        self.connections.insert(
            peer_id,
            ConnectionInfo {
                address,
                relayed,
                connected_at: now_millis(),
            },
        );
    }

    /// The last connection to `peer_id` closed. Returns the links that died
    /// with it.
    pub fn on_disconnected(&mut self, peer_id: &PeerId) -> Vec<LinkInfo> {
        if self.connections.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "Removed peer from tracker");
        }
        self.greeted.retain(|(peer, _)| peer != peer_id);

        let keys: Vec<(PeerId, Topic)> = self
            .links
            .keys()
            .filter(|(peer, _)| peer == peer_id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.links.remove(&key))
            .collect()
    }

    /// Record a greeting from `peer_id` on `topic`.
    pub fn on_hello(&mut self, peer_id: PeerId, topic: Topic, identity: &str) -> HelloOutcome {
        let link = LinkInfo {
            peer_id,
            topic,
            identity: identity.to_string(),
            linked_at: now_millis(),
        };
        match self.links.insert((peer_id, topic), link) {
            None => HelloOutcome::Linked,
            Some(old) if old.identity == identity => {
                // Keep the original link time.
                self.links.insert((peer_id, topic), old);
                HelloOutcome::AlreadyLinked
            }
            Some(old) => HelloOutcome::Rebound {
                previous: old.identity,
            },
        }
    }

    /// Mark that we greeted `peer_id` on `topic`. Returns false if we
    /// already had.
    pub fn mark_greeted(&mut self, peer_id: PeerId, topic: Topic) -> bool {
        self.greeted.insert((peer_id, topic))
    }

    pub fn forget_greeting(&mut self, peer_id: &PeerId, topic: &Topic) {
        self.greeted.remove(&(*peer_id, *topic));
    }

    pub fn identity(&self, peer_id: &PeerId, topic: &Topic) -> Option<&str> {
        self.links
            .get(&(*peer_id, *topic))
            .map(|link| link.identity.as_str())
    }

    /// Drop one link and the record of having greeted it.
    pub fn remove(&mut self, peer_id: &PeerId, topic: &Topic) -> Option<LinkInfo> {
        self.greeted.remove(&(*peer_id, *topic));
        self.links.remove(&(*peer_id, *topic))
    }

    /// Drop every link on `topic`.
    pub fn remove_topic(&mut self, topic: &Topic) -> Vec<LinkInfo> {
        self.greeted.retain(|(_, t)| t != topic);
        let keys: Vec<(PeerId, Topic)> = self
            .links
            .keys()
            .filter(|(_, t)| t == topic)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.links.remove(&key))
            .collect()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.keys().copied().collect()
    }

    pub fn connection(&self, peer_id: &PeerId) -> Option<&ConnectionInfo> {
        self.connections.get(peer_id)
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connections.contains_key(peer_id)
    }

    pub fn links(&self) -> Vec<LinkInfo> {
        self.links.values().cloned().collect()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}
