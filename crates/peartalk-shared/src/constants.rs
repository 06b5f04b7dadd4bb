/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/peartalk/1.0.0";

/// Application name
pub const APP_NAME: &str = "PearTalk";

/// Maximum gossip message size in bytes (4 MiB, voice notes travel inline)
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Room left in a gossip message for the link envelope and the signed gossip
/// fields around a frame
pub const FRAME_ENVELOPE_OVERHEAD: usize = 1024;

/// Largest encoded message frame that still fits one gossip message
pub const MAX_FRAME_SIZE: usize = MAX_MESSAGE_SIZE - FRAME_ENVELOPE_OVERHEAD;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Number of messages returned by a history query when the caller gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Prefix of the gossip topic name derived from a discovery topic
pub const TOPIC_NAME_PREFIX: &str = "peartalk/";

/// Byte placed between the two identities of a conversation topic
pub const TOPIC_SEPARATOR: u8 = 0x1f;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_USER_TOPIC: &str = "peartalk-user-topic-v1";
pub const KDF_CONTEXT_CHAT_TOPIC: &str = "peartalk-chat-topic-v1";
pub const KDF_CONTEXT_PEER_ROUTE: &str = "peartalk-peer-route-v1";
pub const KDF_CONTEXT_STORE_DIR: &str = "peartalk-store-dir-v1";
