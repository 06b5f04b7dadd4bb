//! The swarm task.
//!
//! One tokio task owns the libp2p swarm. Callers join and leave topics and
//! publish frames through [`SwarmCommand`]s; links coming up or down and
//! frames arriving on them come back as [`SwarmNotification`]s.
//!
//! A link forms when a peer subscribed to one of our topics sends a
//! `Hello` carrying its identity. We greet every peer we see on a joined
//! topic once, so both sides end up linked whoever arrived first.

use std::collections::HashSet;
use std::path::PathBuf;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad,
    multiaddr::Protocol,
    relay,
    swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use peartalk_shared::constants::DEFAULT_QUIC_PORT;
use peartalk_shared::{LinkEnvelope, Topic};

use crate::behaviour::{PeartalkBehaviour, PeartalkBehaviourEvent};
use crate::discovery::{load_bootstrap_peers, provider_key, topic_of};
use crate::links::{HelloOutcome, LinkInfo, LinkTracker};
use crate::transport::build_swarm;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial a remote peer at the given multiaddr.
    Dial(Multiaddr),
    /// Subscribe to a topic and announce ourselves as its provider.
    JoinTopic(Topic),
    /// Say goodbye on a topic and stop serving it.
    LeaveTopic(Topic),
    /// Publish one message frame on a topic's link.
    SendFrame { topic: Topic, data: Vec<u8> },
    /// Forget the link to `peer_id` on `topic` without telling the remote.
    CloseLink { peer_id: PeerId, topic: Topic },
    /// Request a snapshot of currently connected peers.
    GetPeers(tokio::sync::oneshot::Sender<Vec<PeerId>>),
    /// Request a snapshot of established links.
    GetLinks(tokio::sync::oneshot::Sender<Vec<LinkInfo>>),
    /// Say goodbye on every topic and shut down the swarm.
    Shutdown,
}

/// Notifications sent *from* the swarm task to the application.
#[derive(Debug, Clone)]
pub enum SwarmNotification {
    /// A new peer connected.
    PeerConnected {
        peer_id: PeerId,
        address: Multiaddr,
    },
    /// A peer disconnected.
    PeerDisconnected {
        peer_id: PeerId,
    },
    /// A remote peer greeted us on a joined topic.
    LinkEstablished {
        peer_id: PeerId,
        topic: Topic,
        identity: String,
    },
    /// A message frame arrived on an established link.
    FrameReceived {
        peer_id: PeerId,
        topic: Topic,
        identity: String,
        data: Vec<u8>,
    },
    /// A link ended: goodbye, unsubscribe, disconnect or local leave.
    LinkClosed {
        peer_id: PeerId,
        topic: Topic,
        identity: String,
    },
    /// A relay reservation was accepted.
    RelayReservation {
        relay_peer: PeerId,
        relay_addr: Multiaddr,
    },
    /// A frame from [`SwarmCommand::SendFrame`] could not be published.
    FrameRejected {
        topic: Topic,
        data: Vec<u8>,
        reason: PublishRejection,
    },
}

/// Why a publish did not go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishRejection {
    /// No peer on the topic to send to yet.
    NoPeers,
    /// The envelope exceeds the gossip message size limit.
    TooLarge,
    /// Encoding, signing or any other publish failure.
    Failed(String),
}

impl From<gossipsub::PublishError> for PublishRejection {
    fn from(err: gossipsub::PublishError) -> Self {
        match err {
            gossipsub::PublishError::InsufficientPeers => PublishRejection::NoPeers,
            gossipsub::PublishError::MessageTooLarge => PublishRejection::TooLarge,
            other => PublishRejection::Failed(other.to_string()),
        }
    }
}

impl From<LinkInfo> for SwarmNotification {
    fn from(link: LinkInfo) -> Self {
        SwarmNotification::LinkClosed {
            peer_id: link.peer_id,
            topic: link.topic,
            identity: link.identity,
        }
    }
}

/// Configuration for spawning the swarm.
pub struct SwarmConfig {
    /// Identity announced in every greeting.
    pub local_identity: String,
    /// Path to the bootstrap peers configuration file.
    pub bootstrap_peers_path: Option<PathBuf>,
    /// Port to listen on (defaults to `DEFAULT_QUIC_PORT`).
    pub listen_port: u16,
    /// Additional multiaddrs to dial on startup.
    pub extra_dials: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            local_identity: String::new(),
            bootstrap_peers_path: None,
            listen_port: DEFAULT_QUIC_PORT,
            extra_dials: Vec::new(),
        }
    }
}

/// State owned by the event loop besides the swarm itself.
struct LoopState {
    local_identity: String,
    joined: HashSet<Topic>,
    links: LinkTracker,
}

/// Spawn the libp2p swarm in a background tokio task.
///
/// Returns `(command_tx, notification_rx, local_peer_id)`.
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
) -> anyhow::Result<(
    mpsc::Sender<SwarmCommand>,
    mpsc::Receiver<SwarmNotification>,
    PeerId,
)> {
    if config.local_identity.is_empty() {
        anyhow::bail!("swarm needs a local identity to greet peers with");
    }

    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    // Listen on QUIC (IPv4 and IPv6)
    let listen_addr_v4: Multiaddr =
        format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    let listen_addr_v6: Multiaddr = format!("/ip6/::/udp/{}/quic-v1", config.listen_port).parse()?;

    swarm.listen_on(listen_addr_v4)?;
    swarm.listen_on(listen_addr_v6)?;

    info!(peer_id = %local_peer_id, port = config.listen_port, "Swarm listening");

    if let Some(path) = &config.bootstrap_peers_path {
        let bootstrap_addrs = load_bootstrap_peers(path);
        let dialed = bootstrap_addrs
            .iter()
            .filter(|addr| dial_known(&mut swarm, addr))
            .count();
        if dialed > 0 {
            if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
                warn!(error = %e, "Kademlia bootstrap failed to start");
            }
        }
    }

    for addr in &config.extra_dials {
        dial_known(&mut swarm, addr);
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwarmCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SwarmNotification>(256);

    tokio::spawn(async move {
        let mut state = LoopState {
            local_identity: config.local_identity,
            joined: HashSet::new(),
            links: LinkTracker::new(),
        };

        loop {
            let mut notes: Vec<SwarmNotification> = Vec::new();

            tokio::select! {
                // --- Incoming commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial(addr)) => {
                            if let Err(e) = swarm.dial(addr.clone()) {
                                error!(addr = %addr, error = %e, "Dial failed");
                            }
                        }
                        Some(SwarmCommand::JoinTopic(topic)) => {
                            join_topic(&mut swarm, &mut state, topic);
                        }
                        Some(SwarmCommand::LeaveTopic(topic)) => {
                            notes = leave_topic(&mut swarm, &mut state, topic);
                        }
                        Some(SwarmCommand::SendFrame { topic, data }) => {
                            let envelope = LinkEnvelope::Frame(data);
                            if let Err(reason) = publish(&mut swarm, &topic, &envelope) {
                                warn!(topic = %topic.short(), reason = ?reason, "Frame not published");
                                if let LinkEnvelope::Frame(data) = envelope {
                                    notes.push(SwarmNotification::FrameRejected { topic, data, reason });
                                }
                            }
                        }
                        Some(SwarmCommand::CloseLink { peer_id, topic }) => {
                            if state.links.remove(&peer_id, &topic).is_some() {
                                debug!(peer = %peer_id, topic = %topic.short(), "Link closed locally");
                            }
                        }
                        Some(SwarmCommand::GetPeers(reply)) => {
                            let _ = reply.send(state.links.connected_peers());
                        }
                        Some(SwarmCommand::GetLinks(reply)) => {
                            let _ = reply.send(state.links.links());
                        }
                        Some(SwarmCommand::Shutdown) => {
                            info!("Swarm shutdown requested");
                            let joined: Vec<Topic> = state.joined.iter().copied().collect();
                            for topic in joined {
                                leave_topic(&mut swarm, &mut state, topic);
                            }
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                // --- Swarm events ---
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. },
                        )) => {
                            notes = on_gossip_message(&mut swarm, &mut state, message);
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Gossipsub(
                            gossipsub::Event::Subscribed { peer_id, topic },
                        )) => {
                            if let Some(topic) = Topic::from_topic_name(topic.as_str()) {
                                if state.joined.contains(&topic) {
                                    debug!(peer = %peer_id, topic = %topic.short(), "Peer joined our topic");
                                    greet(&mut swarm, &mut state, peer_id, topic);
                                }
                            }
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Gossipsub(
                            gossipsub::Event::Unsubscribed { peer_id, topic },
                        )) => {
                            if let Some(topic) = Topic::from_topic_name(topic.as_str()) {
                                if let Some(link) = state.links.remove(&peer_id, &topic) {
                                    notes.push(link.into());
                                }
                            }
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Kademlia(
                            kad::Event::OutboundQueryProgressed {
                                result: kad::QueryResult::GetProviders(Ok(
                                    kad::GetProvidersOk::FoundProviders { key, providers },
                                )),
                                ..
                            },
                        )) => {
                            let topic = topic_of(&key);
                            for provider in providers {
                                if provider == local_peer_id || swarm.is_connected(&provider) {
                                    continue;
                                }
                                debug!(
                                    peer = %provider,
                                    topic = ?topic.map(|t| t.short()),
                                    "Dialing topic provider"
                                );
                                if let Err(e) = swarm.dial(provider) {
                                    debug!(peer = %provider, error = %e, "Provider dial failed");
                                }
                            }
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Kademlia(
                            kad::Event::OutboundQueryProgressed { result, .. },
                        )) => {
                            debug!(result = ?result, "Kademlia query progressed");
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Identify(
                            identify::Event::Received { peer_id, info, .. },
                        )) => {
                            debug!(
                                peer = %peer_id,
                                protocol = ?info.protocol_version,
                                "Identify: received info from peer"
                            );
                            for addr in &info.listen_addrs {
                                swarm
                                    .behaviour_mut()
                                    .kademlia
                                    .add_address(&peer_id, addr.clone());
                            }
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::RelayClient(
                            relay::client::Event::ReservationReqAccepted {
                                relay_peer_id,
                                ..
                            },
                        )) => {
                            info!(relay = %relay_peer_id, "Relay reservation accepted");
                            let relay_addr = swarm
                                .external_addresses()
                                .next()
                                .cloned()
                                .unwrap_or_else(Multiaddr::empty);
                            notes.push(SwarmNotification::RelayReservation {
                                relay_peer: relay_peer_id,
                                relay_addr,
                            });
                        }

                        SwarmEvent::Behaviour(PeartalkBehaviourEvent::Dcutr(event)) => {
                            debug!(event = ?event, "DCUtR event");
                        }

                        SwarmEvent::ConnectionEstablished {
                            peer_id, endpoint, ..
                        } => {
                            let addr = endpoint.get_remote_address().clone();
                            let is_relayed = addr.iter().any(|p| matches!(p, Protocol::P2pCircuit));
                            state.links.on_connected(peer_id, addr.clone(), is_relayed);

                            info!(
                                peer = %peer_id,
                                addr = %addr,
                                relayed = is_relayed,
                                "Peer connected"
                            );
                            notes.push(SwarmNotification::PeerConnected {
                                peer_id,
                                address: addr,
                            });
                        }

                        SwarmEvent::ConnectionClosed {
                            peer_id,
                            num_established,
                            ..
                        } => {
                            if num_established == 0 {
                                for link in state.links.on_disconnected(&peer_id) {
                                    notes.push(link.into());
                                }
                                info!(peer = %peer_id, "Peer disconnected");
                                notes.push(SwarmNotification::PeerDisconnected { peer_id });
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "Listening on new address");
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            warn!(
                                peer = ?peer_id,
                                error = %error,
                                "Outgoing connection error"
                            );
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            warn!(error = %error, "Incoming connection error");
                        }

                        _ => {}
                    }
                }
            }

            for note in notes {
                if notif_tx.send(note).await.is_err() {
                    debug!("Notification receiver dropped");
                }
            }
        }

        info!("Swarm event loop terminated");
    });

    Ok((cmd_tx, notif_rx, local_peer_id))
}

fn gossip_topic(topic: &Topic) -> gossipsub::IdentTopic {
    gossipsub::IdentTopic::new(topic.to_topic_name())
}

/// Publish an envelope on `topic`.
fn publish(
    swarm: &mut Swarm<PeartalkBehaviour>,
    topic: &Topic,
    envelope: &LinkEnvelope,
) -> Result<(), PublishRejection> {
    let bytes = envelope.to_bytes().map_err(|e| {
        error!(error = %e, "Failed to encode link envelope");
        PublishRejection::Failed(e.to_string())
    })?;
    swarm
        .behaviour_mut()
        .gossipsub
        .publish(gossip_topic(topic), bytes)
        .map(|_| ())
        .map_err(|e| {
            debug!(topic = %topic.short(), error = %e, "Publish failed");
            PublishRejection::from(e)
        })
}

/// Greet `peer_id` on `topic` unless we already have.
fn greet(swarm: &mut Swarm<PeartalkBehaviour>, state: &mut LoopState, peer_id: PeerId, topic: Topic) {
    if !state.links.mark_greeted(peer_id, topic) {
        return;
    }
    let hello = LinkEnvelope::hello(state.local_identity.as_str());
    if publish(swarm, &topic, &hello).is_err() {
        // Retry on the next Subscribed or Hello from this peer.
        state.links.forget_greeting(&peer_id, &topic);
    }
}

fn join_topic(swarm: &mut Swarm<PeartalkBehaviour>, state: &mut LoopState, topic: Topic) {
    if !state.joined.insert(topic) {
        return;
    }

    if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(&gossip_topic(&topic)) {
        error!(topic = %topic.short(), error = %e, "Subscribe failed");
        state.joined.remove(&topic);
        return;
    }

    let key = provider_key(&topic);
    if let Err(e) = swarm.behaviour_mut().kademlia.start_providing(key.clone()) {
        warn!(topic = %topic.short(), error = %e, "Failed to announce topic");
    }
    swarm.behaviour_mut().kademlia.get_providers(key);

    // Peers already subscribed before we joined never send a Subscribed event.
    let hash = gossip_topic(&topic).hash();
    let present: Vec<PeerId> = swarm
        .behaviour()
        .gossipsub
        .all_peers()
        .filter(|(_, topics)| topics.iter().any(|t| **t == hash))
        .map(|(peer, _)| *peer)
        .collect();
    for peer_id in present {
        greet(swarm, state, peer_id, topic);
    }

    info!(topic = %topic.short(), "Joined topic");
}

fn leave_topic(
    swarm: &mut Swarm<PeartalkBehaviour>,
    state: &mut LoopState,
    topic: Topic,
) -> Vec<SwarmNotification> {
    if !state.joined.remove(&topic) {
        return Vec::new();
    }

    if let Err(reason) = publish(swarm, &topic, &LinkEnvelope::Goodbye) {
        debug!(topic = %topic.short(), reason = ?reason, "Goodbye not published");
    }
    let _ = swarm.behaviour_mut().gossipsub.unsubscribe(&gossip_topic(&topic));
    swarm.behaviour_mut().kademlia.stop_providing(&provider_key(&topic));

    info!(topic = %topic.short(), "Left topic");
    state
        .links
        .remove_topic(&topic)
        .into_iter()
        .map(SwarmNotification::from)
        .collect()
}

fn on_gossip_message(
    swarm: &mut Swarm<PeartalkBehaviour>,
    state: &mut LoopState,
    message: gossipsub::Message,
) -> Vec<SwarmNotification> {
    let Some(topic) = Topic::from_topic_name(message.topic.as_str()) else {
        return Vec::new();
    };
    let Some(peer_id) = message.source else {
        debug!(topic = %topic.short(), "Dropping unsigned gossip message");
        return Vec::new();
    };
    let envelope = match LinkEnvelope::from_bytes(&message.data) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(peer = %peer_id, error = %e, "Dropping undecodable link envelope");
            return Vec::new();
        }
    };

    match envelope {
        LinkEnvelope::Hello { identity, .. } => {
            if !state.joined.contains(&topic) {
                return Vec::new();
            }
            let mut notes = Vec::new();
            match state.links.on_hello(peer_id, topic, &identity) {
                HelloOutcome::AlreadyLinked => {}
                HelloOutcome::Linked => {
                    info!(peer = %peer_id, identity = %identity, topic = %topic.short(), "Link established");
                    notes.push(SwarmNotification::LinkEstablished {
                        peer_id,
                        topic,
                        identity: identity.clone(),
                    });
                }
                HelloOutcome::Rebound { previous } => {
                    warn!(peer = %peer_id, previous = %previous, identity = %identity, "Peer changed identity");
                    notes.push(SwarmNotification::LinkClosed {
                        peer_id,
                        topic,
                        identity: previous,
                    });
                    notes.push(SwarmNotification::LinkEstablished {
                        peer_id,
                        topic,
                        identity: identity.clone(),
                    });
                }
            }
            greet(swarm, state, peer_id, topic);
            notes
        }

        LinkEnvelope::Frame(data) => match state.links.identity(&peer_id, &topic) {
            Some(identity) => {
                debug!(peer = %peer_id, len = data.len(), "Frame received");
                vec![SwarmNotification::FrameReceived {
                    peer_id,
                    topic,
                    identity: identity.to_string(),
                    data,
                }]
            }
            None => {
                debug!(peer = %peer_id, topic = %topic.short(), "Frame from unlinked peer dropped");
                Vec::new()
            }
        },

        LinkEnvelope::Goodbye => state
            .links
            .remove(&peer_id, &topic)
            .map(|link| vec![link.into()])
            .unwrap_or_default(),
    }
}

/// Dial `addr`, first telling Kademlia about it when it names its peer.
fn dial_known(swarm: &mut Swarm<PeartalkBehaviour>, addr: &Multiaddr) -> bool {
    if let Some(peer_id) = extract_peer_id(addr) {
        swarm
            .behaviour_mut()
            .kademlia
            .add_address(&peer_id, addr.clone());
    }
    match swarm.dial(addr.clone()) {
        Ok(()) => {
            debug!(addr = %addr, "Dialing known peer");
            true
        }
        Err(e) => {
            warn!(addr = %addr, error = %e, "Failed to dial known peer");
            false
        }
    }
}

/// Extract a `PeerId` from a multiaddr, if one is present.
fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}
