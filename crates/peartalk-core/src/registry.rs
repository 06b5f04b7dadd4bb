//! Live peer sessions and outbound routing.
//!
//! Maintains the sessions of currently reachable peers keyed by routing key,
//! and the [`PendingQueue`] for those that are not. This is the only shared
//! mutable state of a core; it is owned by one [`crate::ChatCore`] and
//! touched from a single control flow, so it carries no locks.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use peartalk_shared::{now_millis, RoutingKey};

use crate::error::ConnectionFault;
use crate::pending::{DrainReport, Outbound, PendingPolicy, PendingQueue};
use crate::stream::PeerStream;

/// A live session with one peer.
pub struct PeerSession {
    stream: Box<dyn PeerStream>,
    /// Unix epoch millis of the last inbound traffic or registration.
    pub last_seen: i64,
}

/// How an outbound message left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the peer's live session.
    Delivered,
    /// No live session, or the session is busy or still flushing a backlog;
    /// the message waits in the pending queue.
    Queued,
    /// The session failed while writing. It has been removed and the message
    /// queued.
    QueuedAfterFault(ConnectionFault),
}

pub struct ConnectionRegistry {
    sessions: HashMap<RoutingKey, PeerSession>,
    pending: PendingQueue,
}

impl ConnectionRegistry {
    pub fn new(policy: PendingPolicy) -> Self {
        Self {
            sessions: HashMap::new(),
            pending: PendingQueue::new(policy),
        }
    }

    /// Register a session for `peer` and immediately flush its pending queue.
    ///
    /// A session already registered for `peer` is replaced. If the flush
    /// fails the new session is dropped again and the unsent tail stays
    /// queued; the returned report carries the fault. A busy stream keeps
    /// the session and the tail goes out on a later [`Self::flush`].
    pub fn handle_incoming(&mut self, peer: RoutingKey, stream: Box<dyn PeerStream>) -> DrainReport {
        let session = PeerSession {
            stream,
            last_seen: now_millis(),
        };
        if self.sessions.insert(peer, session).is_some() {
            debug!(peer = %peer.short(), "replaced existing session");
        }
        info!(peer = %peer.short(), queued = self.pending.len(&peer), "peer session registered");

        self.drain_into_session(peer)
    }

    fn drain_into_session(&mut self, peer: RoutingKey) -> DrainReport {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return DrainReport::default();
        };
        let report = self.pending.drain(&peer, session.stream.as_mut());

        if !report.delivered.is_empty() {
            info!(
                peer = %peer.short(),
                delivered = report.delivered.len(),
                remaining = report.remaining,
                "flushed pending messages"
            );
        }
        if report.stalled {
            debug!(peer = %peer.short(), remaining = report.remaining, "session busy, flush paused");
        }
        if let Some(fault) = &report.fault {
            warn!(peer = %peer.short(), error = %fault, "session failed during flush");
            self.sessions.remove(&peer);
        }

        report
    }

    /// Resume flushing for every live session that still has a backlog.
    /// Sessions that fail are dropped, as in [`Self::handle_incoming`].
    pub fn flush(&mut self) -> Vec<(RoutingKey, DrainReport)> {
        let backlogged: Vec<RoutingKey> = self
            .sessions
            .keys()
            .filter(|peer| self.pending.len(peer) > 0)
            .copied()
            .collect();

        backlogged
            .into_iter()
            .map(|peer| (peer, self.drain_into_session(peer)))
            .collect()
    }

    /// Send now if `peer` has a live, idle session, otherwise queue. A
    /// session with a backlog queues the message behind it so that frames
    /// keep their order.
    pub fn send(&mut self, peer: RoutingKey, outbound: Outbound) -> SendOutcome {
        let backlog = self.pending.len(&peer);
        let Some(session) = self.sessions.get_mut(&peer) else {
            self.enqueue(peer, outbound);
            return SendOutcome::Queued;
        };
        if backlog > 0 {
            debug!(peer = %peer.short(), backlog, "session still flushing, message queued");
            self.enqueue(peer, outbound);
            return SendOutcome::Queued;
        }

        match session.stream.write(&outbound.frame) {
            Ok(()) => {
                debug!(peer = %peer.short(), "message written to session");
                SendOutcome::Delivered
            }
            Err(fault) if fault.is_transient() => {
                debug!(peer = %peer.short(), "session busy, message queued");
                self.enqueue(peer, outbound);
                SendOutcome::Queued
            }
            Err(fault) => {
                warn!(peer = %peer.short(), error = %fault, "session write failed, falling back to queue");
                self.sessions.remove(&peer);
                self.enqueue(peer, outbound);
                SendOutcome::QueuedAfterFault(fault)
            }
        }
    }

    fn enqueue(&mut self, peer: RoutingKey, outbound: Outbound) {
        if let Some(evicted) = self.pending.enqueue(peer, outbound) {
            debug!(peer = %peer.short(), timestamp = evicted.timestamp, "dropped undeliverable message");
        }
    }

    /// Hand a frame the transport could not deliver back to `peer`'s queue.
    /// It goes out first on the next flush. With `drop_session` the session
    /// is forgotten as after a write fault; returns whether one was.
    pub fn requeue(&mut self, peer: RoutingKey, outbound: Outbound, drop_session: bool) -> bool {
        self.pending.requeue(peer, outbound);
        drop_session && self.sessions.remove(&peer).is_some()
    }

    /// Refresh the last-seen time of `peer`.
    pub fn touch(&mut self, peer: &RoutingKey) {
        if let Some(session) = self.sessions.get_mut(peer) {
            session.last_seen = now_millis();
        }
    }

    /// Forget `peer`'s session after its stream closed or errored. Returns
    /// whether a session was registered.
    pub fn on_stream_closed(&mut self, peer: &RoutingKey) -> bool {
        let removed = self.sessions.remove(peer).is_some();
        if removed {
            info!(peer = %peer.short(), "peer session closed");
        }
        removed
    }

    /// Close every session and forget them. Returns the closed peers.
    pub fn close_all(&mut self) -> Vec<RoutingKey> {
        let mut closed = Vec::with_capacity(self.sessions.len());
        for (peer, mut session) in self.sessions.drain() {
            session.stream.close();
            closed.push(peer);
        }
        if !closed.is_empty() {
            info!(count = closed.len(), "closed all peer sessions");
        }
        closed
    }

    /// Discard every pending message.
    pub fn clear_pending(&mut self) -> usize {
        self.pending.clear_all()
    }

    pub fn is_connected(&self, peer: &RoutingKey) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn last_seen(&self, peer: &RoutingKey) -> Option<i64> {
        self.sessions.get(peer).map(|s| s.last_seen)
    }

    pub fn connected_peers(&self) -> Vec<RoutingKey> {
        self.sessions.keys().copied().collect()
    }

    pub fn pending_len(&self, peer: &RoutingKey) -> usize {
        self.pending.len(peer)
    }

    pub fn pending_total(&self) -> usize {
        self.pending.total()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(PendingPolicy::default())
    }
}
