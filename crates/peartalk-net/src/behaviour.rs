//! The libp2p protocols a PearTalk node runs.
//!
//! Link envelopes travel on one gossip channel per joined topic. Topic
//! membership is advertised as Kademlia provider records so that members
//! can dial each other; identify keeps Kademlia's address book fed, and the
//! relay client with DCUtR gets peers behind NAT connected.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::gossipsub::{self, MessageAuthenticity, MessageId, ValidationMode};
use libp2p::identity::Keypair;
use libp2p::kad::{self, store::MemoryStore};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{dcutr, identify, relay};

use peartalk_shared::constants::{GOSSIPSUB_HEARTBEAT_SECS, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

const IDENTIFY_INTERVAL: Duration = Duration::from_secs(60);

/// Events surface as the derived `PeartalkBehaviourEvent`, one variant per
/// field.
#[derive(NetworkBehaviour)]
pub struct PeartalkBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub relay_client: relay::client::Behaviour,
    pub dcutr: dcutr::Behaviour,
}

impl PeartalkBehaviour {
    pub fn new(key: &Keypair, relay_client: relay::client::Behaviour) -> Result<Self, BoxError> {
        let local_peer_id = key.public().to_peer_id();

        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
            .validation_mode(ValidationMode::Strict)
            .max_transmit_size(MAX_MESSAGE_SIZE)
            .message_id_fn(message_id)
            .build()
            .map_err(|e| -> BoxError { format!("gossipsub config: {e}").into() })?;
        let gossipsub =
            gossipsub::Behaviour::new(MessageAuthenticity::Signed(key.clone()), gossipsub_config)
                .map_err(|e| -> BoxError { format!("gossipsub init: {e}").into() })?;

        // Every node serves provider records; there are no dedicated DHT nodes.
        let mut kademlia = kad::Behaviour::new(local_peer_id, MemoryStore::new(local_peer_id));
        kademlia.set_mode(Some(kad::Mode::Server));

        let identify = identify::Behaviour::new(
            identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                .with_push_listen_addr_updates(true)
                .with_interval(IDENTIFY_INTERVAL),
        );

        Ok(Self {
            gossipsub,
            kademlia,
            identify,
            relay_client,
            dcutr: dcutr::Behaviour::new(local_peer_id),
        })
    }
}

/// Gossip message id over author, sequence number and payload. A hello
/// repeated by the same peer is a new message, not a duplicate.
fn message_id(message: &gossipsub::Message) -> MessageId {
    let mut hasher = DefaultHasher::new();
    message.data.hash(&mut hasher);
    message.source.hash(&mut hasher);
    message.sequence_number.hash(&mut hasher);
    MessageId::from(hasher.finish().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::PeerId;

    fn gossip(source: PeerId, seq: u64, data: &[u8]) -> gossipsub::Message {
        gossipsub::Message {
            source: Some(source),
            data: data.to_vec(),
            sequence_number: Some(seq),
            topic: gossipsub::IdentTopic::new("peartalk/test").hash(),
        }
    }

    #[test]
    fn test_repeated_payload_gets_new_id() {
        let peer = PeerId::random();
        let first = message_id(&gossip(peer, 1, b"hello"));

        assert_eq!(first, message_id(&gossip(peer, 1, b"hello")));
        assert_ne!(first, message_id(&gossip(peer, 2, b"hello")));
        assert_ne!(first, message_id(&gossip(PeerId::random(), 1, b"hello")));
    }

    #[test]
    fn test_behaviour_builds() {
        let key = Keypair::generate_ed25519();
        let (_transport, relay_client) = relay::client::new(key.public().to_peer_id());
        assert!(PeartalkBehaviour::new(&key, relay_client).is_ok());
    }
}
