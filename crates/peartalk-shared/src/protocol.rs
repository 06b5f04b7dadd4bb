use serde::{Deserialize, Serialize};

/// Link-level envelope published on a topic's gossip channel.
///
/// Peers greet each other with `Hello` when they meet on a topic so that each
/// side learns which identity sits behind the remote libp2p peer. Message
/// frames travel opaque inside `Frame`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkEnvelope {
    /// Identity announcement. The nonce keeps repeated greetings distinct
    /// for gossip deduplication.
    Hello { identity: String, nonce: u64 },

    /// One message frame (JSON bytes).
    Frame(Vec<u8>),

    /// The sender is leaving the link on this topic.
    Goodbye,
}

impl LinkEnvelope {
    pub fn hello(identity: impl Into<String>) -> Self {
        LinkEnvelope::Hello {
            identity: identity.into(),
            nonce: rand::random(),
        }
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
