use tokio::sync::mpsc;
use tracing::debug;

use peartalk_shared::{Message, RoutingKey, UserId};

/// Something a collaborator may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    PeerConnected(RoutingKey),
    PeerDisconnected(RoutingKey),
    /// A message was received from a peer, or a locally sent message was
    /// written to a live session.
    Message(Message),
}

/// A [`CoreEvent`] tagged with the local identity whose core raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreNotification {
    pub local: UserId,
    pub event: CoreEvent,
}

/// Sending half of the channel events are delivered on, in order.
pub type EventSink = mpsc::UnboundedSender<CoreNotification>;

pub(crate) fn emit(events: &EventSink, local: &UserId, event: CoreEvent) {
    let notification = CoreNotification {
        local: local.clone(),
        event,
    };
    if events.send(notification).is_err() {
        debug!(local = %local, "event receiver dropped, notification discarded");
    }
}
