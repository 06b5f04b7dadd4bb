//! # peartalk-core
//!
//! The messaging core of one local identity: it joins discovery topics,
//! keeps the live peer sessions, buffers messages for unreachable peers,
//! dispatches inbound frames by message kind and persists every message
//! through [`peartalk_store::Database`].
//!
//! All state is owned by a single [`ChatCore`] and mutated through `&mut self`
//! from one control flow; the network layer reaches it only through the
//! [`PeerStream`] and [`Rendezvous`] seams.

pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod manager;
pub mod pending;
pub mod registry;
pub mod resolve;
pub mod stream;

pub use chat::ChatCore;
pub use config::CoreConfig;
pub use error::{ConnectionFault, CoreError};
pub use events::{CoreEvent, CoreNotification, EventSink};
pub use manager::{CoreRegistry, RendezvousFactory};
pub use pending::{PendingPolicy, PendingQueue};
pub use registry::{ConnectionRegistry, SendOutcome};
pub use resolve::{HashResolver, PeerResolver};
pub use stream::{FrameRejection, PeerStream, Rendezvous};

#[cfg(test)]
mod testing;
