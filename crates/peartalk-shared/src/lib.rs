//! Types shared by every PearTalk crate: identities, discovery topics, the
//! message model and the link envelope exchanged between swarm peers.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod topic;
pub mod types;

pub use error::{IdentityError, ProtocolError};
pub use message::{Message, MessageBody, MessageKind, OutgoingMessage};
pub use protocol::LinkEnvelope;
pub use topic::{derive_chat_topic, derive_presence_topic};
pub use types::{RoutingKey, Topic, UserId};

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
