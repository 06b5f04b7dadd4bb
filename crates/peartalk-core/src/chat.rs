//! The per-identity messaging facade.
//!
//! A [`ChatCore`] owns everything one local identity needs: its store, its
//! peer sessions and pending queue, and its topic memberships. Collaborators
//! call the request side (`connect`, `join_chat`, `send_message`, ...); the
//! network layer feeds link events through `on_peer_linked`, `on_frame`,
//! `on_frame_rejected` and `on_link_closed`, and calls `flush_pending`
//! periodically to resume flushes paused by a busy stream. Everything
//! observable is reported on the [`EventSink`].

use std::collections::HashMap;

use tracing::{debug, info, warn};

use peartalk_shared::constants::MAX_FRAME_SIZE;
use peartalk_shared::{
    derive_chat_topic, derive_presence_topic, Message, OutgoingMessage, ProtocolError, RoutingKey,
    Topic, UserId,
};
use peartalk_store::Database;

use crate::config::CoreConfig;
use crate::dispatch::{handle_frame, persist, prepare_outgoing, HandlerContext};
use crate::error::CoreError;
use crate::events::{emit, CoreEvent, EventSink};
use crate::pending::{DrainReport, Outbound};
use crate::registry::{ConnectionRegistry, SendOutcome};
use crate::resolve::{HashResolver, PeerResolver};
use crate::stream::{FrameRejection, PeerStream, Rendezvous};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TopicSlot {
    Presence,
    Chat(UserId),
}

pub struct ChatCore {
    identity: UserId,
    store: Database,
    connections: ConnectionRegistry,
    rendezvous: Box<dyn Rendezvous>,
    resolver: Box<dyn PeerResolver>,
    topics: HashMap<TopicSlot, Topic>,
    events: EventSink,
    history_limit: usize,
}

impl ChatCore {
    /// Open the store for `identity` below `config.storage_root`. The core
    /// starts without any topic membership; call [`ChatCore::connect`].
    pub fn open(
        identity: UserId,
        config: &CoreConfig,
        rendezvous: Box<dyn Rendezvous>,
        events: EventSink,
    ) -> Result<Self, CoreError> {
        let store = Database::open_for(&config.storage_root, &identity)?;
        info!(identity = %identity, "chat core opened");

        Ok(Self {
            identity,
            store,
            connections: ConnectionRegistry::new(config.pending),
            rendezvous,
            resolver: Box::new(HashResolver),
            topics: HashMap::new(),
            events,
            history_limit: config.history_limit,
        })
    }

    /// Replace the identity-to-routing-key mapping. Must be called before any
    /// peer is linked or any message queued.
    pub fn with_resolver(mut self, resolver: Box<dyn PeerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Join the presence topic of the local identity. Idempotent.
    pub fn connect(&mut self) -> Result<Topic, CoreError> {
        if let Some(topic) = self.topics.get(&TopicSlot::Presence) {
            return Ok(*topic);
        }

        let topic = derive_presence_topic(self.identity.as_str())?;
        self.rendezvous.join(&topic)?;
        self.topics.insert(TopicSlot::Presence, topic);
        info!(identity = %self.identity, topic = %topic.short(), "joined presence topic");
        Ok(topic)
    }

    /// Join the conversation topic shared with `peer`.
    pub fn join_chat(&mut self, peer: &str) -> Result<Topic, CoreError> {
        let peer_id = UserId::parse(peer)?;
        let slot = TopicSlot::Chat(peer_id);
        if let Some(topic) = self.topics.get(&slot) {
            return Ok(*topic);
        }

        let topic = derive_chat_topic(self.identity.as_str(), peer)?;
        self.rendezvous.join(&topic)?;
        info!(identity = %self.identity, peer = %peer, topic = %topic.short(), "joined chat topic");
        self.topics.insert(slot, topic);
        Ok(topic)
    }

    /// Leave the conversation topic shared with `peer`. Returns whether it
    /// had been joined. Live sessions are kept.
    pub fn leave_chat(&mut self, peer: &str) -> Result<bool, CoreError> {
        let peer_id = UserId::parse(peer)?;
        match self.topics.remove(&TopicSlot::Chat(peer_id)) {
            Some(topic) => {
                self.rendezvous.leave(&topic);
                info!(identity = %self.identity, peer = %peer, "left chat topic");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Send a message to its recipient, or queue it if the recipient has no
    /// live session. The message is persisted either way and returned fully
    /// populated. A queued message is not an error, and neither is a store
    /// fault. A message whose frame exceeds [`MAX_FRAME_SIZE`] is rejected.
    pub fn send_message(&mut self, outgoing: OutgoingMessage) -> Result<Message, CoreError> {
        let message = prepare_outgoing(outgoing, &self.identity)?;
        let outbound = Outbound::encode(message.clone())?;
        if outbound.frame.len() > MAX_FRAME_SIZE {
            return Err(CoreError::InvalidMessage(format!(
                "frame of {} bytes exceeds the {MAX_FRAME_SIZE} byte limit",
                outbound.frame.len()
            )));
        }
        let peer = self.resolver.resolve(&message.recipient);

        persist(&self.store, &message);

        match self.connections.send(peer, outbound) {
            SendOutcome::Delivered => {
                self.emit(CoreEvent::Message(message.clone()));
            }
            SendOutcome::Queued => {
                debug!(recipient = %message.recipient, "recipient offline, message queued");
            }
            SendOutcome::QueuedAfterFault(_) => {
                self.emit(CoreEvent::PeerDisconnected(peer));
            }
        }

        Ok(message)
    }

    /// The last `limit` messages between the local identity and `peer`,
    /// oldest first. `None` uses the configured history limit.
    pub fn get_messages(&self, peer: &str, limit: Option<usize>) -> Result<Vec<Message>, CoreError> {
        let peer_id = UserId::parse(peer)?;
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.store.query(&self.identity, &peer_id, limit)?)
    }

    /// Leave every topic, close every session and drop everything queued.
    /// The store is kept. Idempotent.
    pub fn disconnect(&mut self) {
        for (_, topic) in self.topics.drain() {
            self.rendezvous.leave(&topic);
        }

        for peer in self.connections.close_all() {
            emit(&self.events, &self.identity, CoreEvent::PeerDisconnected(peer));
        }

        let dropped = self.connections.clear_pending();
        if dropped > 0 {
            warn!(identity = %self.identity, dropped, "discarded pending messages on disconnect");
        }
        info!(identity = %self.identity, "chat core disconnected");
    }

    /// The network layer established a link to the peer presenting
    /// `identity`. Its pending messages are flushed right away.
    pub fn on_peer_linked(&mut self, identity: &str, mut stream: Box<dyn PeerStream>) {
        let peer_id = match UserId::parse(identity) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "rejecting link with unusable identity");
                stream.close();
                return;
            }
        };
        let peer = self.resolver.resolve(&peer_id);
        self.emit(CoreEvent::PeerConnected(peer));

        let report = self.connections.handle_incoming(peer, stream);
        self.report_flush(peer, report);
    }

    /// Resume the flushes a busy stream paused. Cheap when nothing is
    /// waiting on a live session.
    pub fn flush_pending(&mut self) {
        let flushed = self.connections.flush();
        if flushed.is_empty() {
            return;
        }
        for (peer, report) in flushed {
            self.report_flush(peer, report);
        }
        debug!(remaining = self.connections.pending_total(), "pending flush pass done");
    }

    fn report_flush(&self, peer: RoutingKey, report: DrainReport) {
        for message in report.delivered {
            self.emit(CoreEvent::Message(message));
        }
        if report.fault.is_some() {
            self.emit(CoreEvent::PeerDisconnected(peer));
        }
    }

    /// The network layer could not deliver `frame` after its stream had
    /// accepted it. The message goes back to the head of its recipient's
    /// queue unless it can never be sent.
    pub fn on_frame_rejected(&mut self, frame: &[u8], rejection: FrameRejection) {
        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "rejected frame is not a message, dropping it");
                return;
            }
        };
        let peer = self.resolver.resolve(&message.recipient);

        match rejection {
            FrameRejection::Oversized => {
                warn!(
                    recipient = %message.recipient,
                    len = frame.len(),
                    "frame too large for the link, message dropped"
                );
            }
            FrameRejection::NoRoute | FrameRejection::LinkFailed => {
                let drop_session = rejection == FrameRejection::LinkFailed;
                warn!(recipient = %message.recipient, ?rejection, "frame bounced, message requeued");
                let outbound = Outbound {
                    message,
                    frame: frame.to_vec(),
                };
                if self.connections.requeue(peer, outbound, drop_session) {
                    self.emit(CoreEvent::PeerDisconnected(peer));
                }
            }
        }
    }

    /// One frame arrived on the link of the peer presenting `identity`.
    /// Undecodable frames and frames naming another sender are logged and
    /// dropped.
    pub fn on_frame(&mut self, identity: &str, raw: &[u8]) {
        let peer_id = match UserId::parse(identity) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "dropping frame from unusable identity");
                return;
            }
        };
        let peer = self.resolver.resolve(&peer_id);
        self.connections.touch(&peer);

        let ctx = HandlerContext {
            store: &self.store,
            events: &self.events,
            local: &self.identity,
        };
        match handle_frame(raw, &peer_id, &ctx) {
            Ok(_) => {}
            Err(e @ ProtocolError::SenderMismatch { .. }) => {
                warn!(peer = %peer_id, error = %e, "dropping frame with foreign sender");
            }
            Err(e) => warn!(peer = %peer_id, error = %e, "dropping inbound frame"),
        }
    }

    /// The link of the peer presenting `identity` closed or failed.
    pub fn on_link_closed(&mut self, identity: &str) {
        let Ok(peer_id) = UserId::parse(identity) else {
            return;
        };
        let peer = self.resolver.resolve(&peer_id);
        if self.connections.on_stream_closed(&peer) {
            self.emit(CoreEvent::PeerDisconnected(peer));
        }
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Whether the presence topic is joined.
    pub fn is_connected(&self) -> bool {
        self.topics.contains_key(&TopicSlot::Presence)
    }

    pub fn routing_key(&self, peer: &UserId) -> RoutingKey {
        self.resolver.resolve(peer)
    }

    pub fn is_peer_connected(&self, peer: &UserId) -> bool {
        self.connections.is_connected(&self.resolver.resolve(peer))
    }

    pub fn connected_peers(&self) -> Vec<RoutingKey> {
        self.connections.connected_peers()
    }

    pub fn pending_for(&self, peer: &UserId) -> usize {
        self.connections.pending_len(&self.resolver.resolve(peer))
    }

    pub fn joined_topics(&self) -> Vec<Topic> {
        self.topics.values().copied().collect()
    }

    pub fn store(&self) -> &Database {
        &self.store
    }

    fn emit(&self, event: CoreEvent) {
        emit(&self.events, &self.identity, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CoreNotification;
    use crate::testing::{text, user, StreamRecorder, TopicRecorder};
    use peartalk_shared::MessageBody;
    use tokio::sync::mpsc;

    struct Harness {
        core: ChatCore,
        topics: TopicRecorder,
        rx: mpsc::UnboundedReceiver<CoreNotification>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(name: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = CoreConfig::with_storage_root(dir.path());
            let topics = TopicRecorder::default();
            let (events, rx) = mpsc::unbounded_channel();
            let core = ChatCore::open(user(name), &config, topics.rendezvous(), events).unwrap();
            Self {
                core,
                topics,
                rx,
                _dir: dir,
            }
        }

        fn events(&mut self) -> Vec<CoreEvent> {
            let mut out = Vec::new();
            while let Ok(note) = self.rx.try_recv() {
                out.push(note.event);
            }
            out
        }

        fn key(&self, name: &str) -> RoutingKey {
            self.core.routing_key(&user(name))
        }
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut h = Harness::new("alice");
        let first = h.core.connect().unwrap();
        let second = h.core.connect().unwrap();

        assert_eq!(first, second);
        assert_eq!(first, derive_presence_topic("alice").unwrap());
        assert_eq!(h.topics.joined(), vec![first]);
        assert!(h.core.is_connected());
    }

    #[test]
    fn test_join_and_leave_chat() {
        let mut h = Harness::new("alice");
        let topic = h.core.join_chat("bob").unwrap();
        assert_eq!(topic, derive_chat_topic("bob", "alice").unwrap());
        assert_eq!(h.core.join_chat("bob").unwrap(), topic);
        assert_eq!(h.topics.joined().len(), 1);

        assert!(h.core.leave_chat("bob").unwrap());
        assert!(!h.core.leave_chat("bob").unwrap());
        assert_eq!(h.topics.left(), vec![topic]);

        assert!(matches!(h.core.join_chat(""), Err(CoreError::InvalidIdentity(_))));
    }

    #[test]
    fn test_send_offline_persists_and_queues() {
        let mut h = Harness::new("alice");
        let sent = h
            .core
            .send_message(OutgoingMessage::text("bob", "hi").with_timestamp(100))
            .unwrap();

        assert_eq!(sent.sender, user("alice"));
        assert_eq!(h.core.pending_for(&user("bob")), 1);
        assert_eq!(h.core.get_messages("bob", None).unwrap(), vec![sent]);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_link_flushes_queue_in_order() {
        let mut h = Harness::new("alice");
        for i in 0..3 {
            h.core
                .send_message(OutgoingMessage::text("bob", i.to_string()).with_timestamp(i))
                .unwrap();
        }

        let recorder = StreamRecorder::new();
        h.core.on_peer_linked("bob", recorder.stream());

        assert_eq!(recorder.contents(), vec!["0", "1", "2"]);
        assert_eq!(h.core.pending_for(&user("bob")), 0);

        let events = h.events();
        assert_eq!(events[0], CoreEvent::PeerConnected(h.key("bob")));
        let delivered: Vec<&str> = events[1..]
            .iter()
            .map(|e| match e {
                CoreEvent::Message(m) => m.body.content(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(delivered, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_send_while_linked_emits_message() {
        let mut h = Harness::new("alice");
        let recorder = StreamRecorder::new();
        h.core.on_peer_linked("bob", recorder.stream());
        h.events();

        let sent = h.core.send_message(OutgoingMessage::text("bob", "live")).unwrap();
        assert_eq!(recorder.messages(), vec![sent.clone()]);
        assert_eq!(h.events(), vec![CoreEvent::Message(sent)]);
    }

    #[test]
    fn test_busy_stream_flushes_on_later_pass() {
        let mut h = Harness::new("alice");
        for i in 0..4 {
            h.core
                .send_message(OutgoingMessage::text("bob", i.to_string()).with_timestamp(i))
                .unwrap();
        }

        let recorder = StreamRecorder::busy_after(1);
        h.core.on_peer_linked("bob", recorder.stream());
        assert!(h.core.is_peer_connected(&user("bob")));
        assert_eq!(h.core.pending_for(&user("bob")), 3);

        // Nothing moves while the stream stays busy.
        h.core.flush_pending();
        assert_eq!(h.core.pending_for(&user("bob")), 3);

        recorder.accept(None);
        h.core.send_message(OutgoingMessage::text("bob", "4").with_timestamp(4)).unwrap();
        h.core.flush_pending();
        assert_eq!(h.core.pending_for(&user("bob")), 0);
        assert_eq!(recorder.contents(), vec!["0", "1", "2", "3", "4"]);

        let events = h.events();
        assert_eq!(events[0], CoreEvent::PeerConnected(h.key("bob")));
        assert_eq!(events.len(), 6);
        assert!(!events.contains(&CoreEvent::PeerDisconnected(h.key("bob"))));
    }

    #[test]
    fn test_bounced_frame_requeued_ahead_of_backlog() {
        let mut h = Harness::new("alice");
        let recorder = StreamRecorder::new();
        h.core.on_peer_linked("bob", recorder.stream());
        let first = h.core.send_message(OutgoingMessage::text("bob", "first")).unwrap();
        h.events();

        h.core.on_frame_rejected(&first.to_frame().unwrap(), FrameRejection::NoRoute);
        assert!(h.core.is_peer_connected(&user("bob")));
        assert_eq!(h.core.pending_for(&user("bob")), 1);

        // Later sends wait behind the bounced frame.
        h.core.send_message(OutgoingMessage::text("bob", "second")).unwrap();
        assert_eq!(h.core.pending_for(&user("bob")), 2);

        h.core.flush_pending();
        assert_eq!(recorder.contents(), vec!["first", "first", "second"]);
        assert_eq!(h.core.pending_for(&user("bob")), 0);
    }

    #[test]
    fn test_frame_rejected_by_failed_link_drops_session() {
        let mut h = Harness::new("alice");
        h.core.on_peer_linked("bob", StreamRecorder::new().stream());
        let sent = h.core.send_message(OutgoingMessage::text("bob", "bounce")).unwrap();
        h.events();

        h.core.on_frame_rejected(&sent.to_frame().unwrap(), FrameRejection::LinkFailed);
        assert!(!h.core.is_peer_connected(&user("bob")));
        assert_eq!(h.core.pending_for(&user("bob")), 1);
        assert_eq!(h.events(), vec![CoreEvent::PeerDisconnected(h.key("bob"))]);

        let relink = StreamRecorder::new();
        h.core.on_peer_linked("bob", relink.stream());
        assert_eq!(relink.messages(), vec![sent]);
    }

    #[test]
    fn test_oversized_rejection_not_requeued() {
        let mut h = Harness::new("alice");
        let sent = h.core.send_message(OutgoingMessage::text("bob", "huge")).unwrap();
        h.core.on_peer_linked("bob", StreamRecorder::new().stream());
        h.events();

        h.core.on_frame_rejected(&sent.to_frame().unwrap(), FrameRejection::Oversized);
        h.core.on_frame_rejected(b"not a frame", FrameRejection::NoRoute);
        assert_eq!(h.core.pending_for(&user("bob")), 0);
        assert!(h.core.is_peer_connected(&user("bob")));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_oversized_message_rejected_before_store() {
        let mut h = Harness::new("alice");
        let audio = "A".repeat(MAX_FRAME_SIZE);
        let out = OutgoingMessage::new("bob", MessageBody::voice(audio, None));

        assert!(matches!(h.core.send_message(out), Err(CoreError::InvalidMessage(_))));
        assert_eq!(h.core.pending_for(&user("bob")), 0);
        assert_eq!(h.core.store().count().unwrap(), 0);
    }

    #[test]
    fn test_store_fault_does_not_abort_send() {
        let mut h = Harness::new("alice");
        let recorder = StreamRecorder::new();
        h.core.on_peer_linked("bob", recorder.stream());
        h.events();
        h.core.store().conn().execute_batch("DROP TABLE messages").unwrap();

        let live = h.core.send_message(OutgoingMessage::text("bob", "live")).unwrap();
        assert_eq!(recorder.messages(), vec![live.clone()]);
        assert_eq!(h.events(), vec![CoreEvent::Message(live)]);

        h.core.send_message(OutgoingMessage::text("carol", "later")).unwrap();
        assert_eq!(h.core.pending_for(&user("carol")), 1);
    }

    #[test]
    fn test_write_fault_queues_and_reports_disconnect() {
        let mut h = Harness::new("alice");
        h.core.on_peer_linked("bob", StreamRecorder::failing_after(0).stream());
        h.events();

        let sent = h.core.send_message(OutgoingMessage::text("bob", "retry me")).unwrap();
        assert_eq!(h.events(), vec![CoreEvent::PeerDisconnected(h.key("bob"))]);
        assert!(!h.core.is_peer_connected(&user("bob")));
        assert_eq!(h.core.pending_for(&user("bob")), 1);
        assert_eq!(h.core.get_messages("bob", None).unwrap(), vec![sent]);
    }

    #[test]
    fn test_inbound_frame_emitted_and_persisted() {
        let mut h = Harness::new("bob");
        let msg = text("alice", "bob", 5, "hello bob");

        h.core.on_frame("alice", &msg.to_frame().unwrap());
        assert_eq!(h.events(), vec![CoreEvent::Message(msg.clone())]);
        assert_eq!(h.core.get_messages("alice", Some(10)).unwrap(), vec![msg]);
    }

    #[test]
    fn test_inbound_voice_keeps_transcription() {
        let mut h = Harness::new("bob");
        let msg = Message {
            body: MessageBody::voice("T2dnUw==", Some("see you".into())),
            ..text("alice", "bob", 6, "")
        };

        h.core.on_frame("alice", &msg.to_frame().unwrap());
        assert_eq!(h.core.get_messages("alice", None).unwrap(), vec![msg]);
    }

    #[test]
    fn test_frame_with_foreign_sender_dropped() {
        let mut h = Harness::new("bob");
        let forged = text("carol", "bob", 7, "I am carol, honest");

        h.core.on_frame("alice", &forged.to_frame().unwrap());
        assert!(h.events().is_empty());
        assert_eq!(h.core.store().count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_frame_type_not_persisted() {
        let mut h = Harness::new("bob");
        let raw = br#"{"type":"poll","sender":"alice","recipient":"bob","timestamp":1}"#;

        h.core.on_frame("alice", raw);
        assert!(h.events().is_empty());
        assert_eq!(h.core.store().count().unwrap(), 0);
    }

    #[test]
    fn test_link_closed_falls_back_to_queue() {
        let mut h = Harness::new("alice");
        h.core.on_peer_linked("bob", StreamRecorder::new().stream());
        h.events();

        h.core.on_link_closed("bob");
        h.core.on_link_closed("bob");
        assert_eq!(h.events(), vec![CoreEvent::PeerDisconnected(h.key("bob"))]);

        h.core.send_message(OutgoingMessage::text("bob", "later")).unwrap();
        assert_eq!(h.core.pending_for(&user("bob")), 1);
    }

    #[test]
    fn test_bad_link_identity_closes_stream() {
        let mut h = Harness::new("alice");
        let recorder = StreamRecorder::new();

        h.core.on_peer_linked("\u{7}", recorder.stream());
        assert!(recorder.is_closed());
        assert!(h.core.connected_peers().is_empty());
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_disconnect_clears_state_keeps_store() {
        let mut h = Harness::new("alice");
        h.core.connect().unwrap();
        h.core.join_chat("bob").unwrap();
        let recorder = StreamRecorder::new();
        h.core.on_peer_linked("bob", recorder.stream());
        h.core.send_message(OutgoingMessage::text("carol", "queued")).unwrap();
        h.events();

        h.core.disconnect();
        assert!(recorder.is_closed());
        assert_eq!(h.topics.left().len(), 2);
        assert!(!h.core.is_connected());
        assert!(h.core.joined_topics().is_empty());
        assert_eq!(h.core.pending_for(&user("carol")), 0);
        assert_eq!(h.events(), vec![CoreEvent::PeerDisconnected(h.key("bob"))]);
        assert_eq!(h.core.get_messages("carol", None).unwrap().len(), 1);

        h.core.disconnect();
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_invalid_outgoing_rejected() {
        let mut h = Harness::new("alice");
        let mut out = OutgoingMessage::text("bob", "x");
        out.recipient = None;

        assert!(matches!(h.core.send_message(out), Err(CoreError::InvalidMessage(_))));
        assert_eq!(h.core.store().count().unwrap(), 0);
        assert!(matches!(h.core.get_messages(" ", None), Err(CoreError::InvalidIdentity(_))));
    }

    #[test]
    fn test_history_limit_applies() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::with_storage_root(dir.path());
        config.history_limit = 2;
        let (events, _rx) = mpsc::unbounded_channel();
        let mut core =
            ChatCore::open(user("alice"), &config, TopicRecorder::default().rendezvous(), events)
                .unwrap();

        for i in 0..5 {
            core.send_message(OutgoingMessage::text("bob", i.to_string()).with_timestamp(i))
                .unwrap();
        }
        let recent: Vec<String> = core
            .get_messages("bob", None)
            .unwrap()
            .into_iter()
            .map(|m| m.body.content().to_string())
            .collect();
        assert_eq!(recent, vec!["3", "4"]);
        assert_eq!(core.get_messages("bob", Some(50)).unwrap().len(), 5);
    }
}
