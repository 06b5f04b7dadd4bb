//! Glue between the swarm task and the chat core.
//!
//! The core sees the network only through [`Rendezvous`] and [`PeerStream`].
//! Both are implemented here on top of the swarm command channel, and swarm
//! notifications are turned into the core's link-layer calls. A full command
//! channel is back-pressure: the stream reports busy and the core resumes
//! the flush on its next pass.

use std::collections::HashMap;

use libp2p::PeerId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use peartalk_core::{ChatCore, ConnectionFault, FrameRejection, PeerStream, Rendezvous};
use peartalk_net::{PublishRejection, SwarmCommand, SwarmNotification};
use peartalk_shared::Topic;

fn fault<T>(err: TrySendError<T>) -> ConnectionFault {
    match err {
        TrySendError::Full(_) => ConnectionFault::Busy,
        TrySendError::Closed(_) => ConnectionFault::Closed,
    }
}

/// Topic membership through the swarm.
pub struct SwarmRendezvous {
    cmd_tx: mpsc::Sender<SwarmCommand>,
}

impl SwarmRendezvous {
    pub fn new(cmd_tx: mpsc::Sender<SwarmCommand>) -> Self {
        Self { cmd_tx }
    }
}

impl Rendezvous for SwarmRendezvous {
    fn join(&mut self, topic: &Topic) -> Result<(), ConnectionFault> {
        self.cmd_tx
            .try_send(SwarmCommand::JoinTopic(*topic))
            .map_err(fault)
    }

    fn leave(&mut self, topic: &Topic) {
        if let Err(e) = self.cmd_tx.try_send(SwarmCommand::LeaveTopic(*topic)) {
            warn!(topic = %topic.short(), error = %fault(e), "Failed to leave topic");
        }
    }
}

/// One link, as a stream of frames published on its topic.
pub struct SwarmStream {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    peer_id: PeerId,
    topic: Topic,
}

impl SwarmStream {
    pub fn new(cmd_tx: mpsc::Sender<SwarmCommand>, peer_id: PeerId, topic: Topic) -> Self {
        Self {
            cmd_tx,
            peer_id,
            topic,
        }
    }
}

impl PeerStream for SwarmStream {
    fn write(&mut self, frame: &[u8]) -> Result<(), ConnectionFault> {
        self.cmd_tx
            .try_send(SwarmCommand::SendFrame {
                topic: self.topic,
                data: frame.to_vec(),
            })
            .map_err(fault)
    }

    fn close(&mut self) {
        let close = SwarmCommand::CloseLink {
            peer_id: self.peer_id,
            topic: self.topic,
        };
        if self.cmd_tx.try_send(close).is_err() {
            debug!(peer = %self.peer_id, "Swarm gone, link already closed");
        }
    }
}

fn rejection(reason: &PublishRejection) -> FrameRejection {
    match reason {
        PublishRejection::NoPeers => FrameRejection::NoRoute,
        PublishRejection::TooLarge => FrameRejection::Oversized,
        PublishRejection::Failed(_) => FrameRejection::LinkFailed,
    }
}

/// Effect of a closed link on the identity behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkChange {
    /// Another link of the identity is still the one in use.
    Unaffected,
    /// The link in use closed; this one takes over.
    Replaced(PeerId, Topic),
    /// The identity has no link left.
    Gone,
}

/// Live links per remote identity. The most recent link is the one the
/// core writes to.
#[derive(Debug, Default)]
pub struct LinkBook {
    links: HashMap<String, Vec<(PeerId, Topic)>>,
}

impl LinkBook {
    pub fn add(&mut self, identity: &str, peer_id: PeerId, topic: Topic) {
        let links = self.links.entry(identity.to_string()).or_default();
        links.retain(|link| *link != (peer_id, topic));
        links.push((peer_id, topic));
    }

    pub fn remove(&mut self, identity: &str, peer_id: PeerId, topic: Topic) -> LinkChange {
        let Some(links) = self.links.get_mut(identity) else {
            return LinkChange::Gone;
        };
        let was_active = links.last() == Some(&(peer_id, topic));
        links.retain(|link| *link != (peer_id, topic));

        match links.last() {
            None => {
                self.links.remove(identity);
                LinkChange::Gone
            }
            Some(&(peer, topic)) if was_active => LinkChange::Replaced(peer, topic),
            Some(_) => LinkChange::Unaffected,
        }
    }

    pub fn len(&self, identity: &str) -> usize {
        self.links.get(identity).map(Vec::len).unwrap_or(0)
    }
}

/// Feed one swarm notification into `core`.
pub fn handle_notification(
    core: &mut ChatCore,
    book: &mut LinkBook,
    cmd_tx: &mpsc::Sender<SwarmCommand>,
    notification: SwarmNotification,
) {
    match notification {
        SwarmNotification::LinkEstablished {
            peer_id,
            topic,
            identity,
        } => {
            book.add(&identity, peer_id, topic);
            info!(
                peer = %peer_id,
                identity = %identity,
                links = book.len(&identity),
                "Link up (bridge)"
            );
            let stream = SwarmStream::new(cmd_tx.clone(), peer_id, topic);
            core.on_peer_linked(&identity, Box::new(stream));
        }

        SwarmNotification::FrameReceived { identity, data, .. } => {
            core.on_frame(&identity, &data);
        }

        SwarmNotification::FrameRejected {
            topic,
            data,
            reason,
        } => {
            debug!(topic = %topic.short(), reason = ?reason, "Frame handed back by swarm");
            core.on_frame_rejected(&data, rejection(&reason));
        }

        SwarmNotification::LinkClosed {
            peer_id,
            topic,
            identity,
        } => match book.remove(&identity, peer_id, topic) {
            LinkChange::Unaffected => {
                debug!(peer = %peer_id, identity = %identity, "Spare link closed");
            }
            LinkChange::Replaced(peer, topic) => {
                info!(identity = %identity, peer = %peer, "Switching to remaining link");
                let stream = SwarmStream::new(cmd_tx.clone(), peer, topic);
                core.on_peer_linked(&identity, Box::new(stream));
            }
            LinkChange::Gone => {
                info!(peer = %peer_id, identity = %identity, "Link down (bridge)");
                core.on_link_closed(&identity);
            }
        },

        SwarmNotification::PeerConnected { peer_id, address } => {
            debug!(peer = %peer_id, addr = %address, "Peer connected (bridge)");
        }

        SwarmNotification::PeerDisconnected { peer_id } => {
            debug!(peer = %peer_id, "Peer disconnected (bridge)");
        }

        SwarmNotification::RelayReservation {
            relay_peer,
            relay_addr,
        } => {
            info!(relay = %relay_peer, addr = %relay_addr, "Relay reservation received");
        }
    }
}
