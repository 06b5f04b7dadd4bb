// P2P networking layer built on libp2p with QUIC transport.
//
// Topics are rendezvous points: joining one subscribes to its gossip channel
// and announces us as a provider on the DHT. Peers meeting on a topic greet
// each other with their identity and from then on form a link that carries
// message frames.

pub mod behaviour;
pub mod discovery;
pub mod links;
pub mod swarm;
pub mod transport;

pub use behaviour::{PeartalkBehaviour, PeartalkBehaviourEvent};
pub use discovery::{load_bootstrap_peers, parse_multiaddrs, provider_key, topic_of};
pub use links::{ConnectionInfo, HelloOutcome, LinkInfo, LinkTracker};
pub use swarm::{spawn_swarm, PublishRejection, SwarmCommand, SwarmConfig, SwarmNotification};
pub use transport::build_swarm;
