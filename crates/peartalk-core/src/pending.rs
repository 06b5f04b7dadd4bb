//! Per-peer buffer of messages waiting for a live connection.
//!
//! An entry leaves the queue only once its frame has been written to a
//! stream. A flush that fails or stalls half-way keeps the unsent tail, in
//! order, for the next flush.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use peartalk_shared::{Message, RoutingKey};

use crate::error::ConnectionFault;
use crate::stream::PeerStream;

/// Limits applied to queued messages. The default keeps everything forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingPolicy {
    /// Maximum queued messages per peer; the oldest is evicted beyond it.
    pub max_per_peer: Option<usize>,
    /// Queued messages older than this are discarded instead of delivered.
    pub max_age: Option<Duration>,
}

/// A message together with its encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub message: Message,
    pub frame: Vec<u8>,
}

impl Outbound {
    pub fn encode(message: Message) -> Result<Self, serde_json::Error> {
        let frame = message.to_frame()?;
        Ok(Self { message, frame })
    }
}

#[derive(Debug)]
struct QueuedEntry {
    outbound: Outbound,
    queued_at: Instant,
}

/// Result of flushing one peer's queue into a stream.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Messages written, in delivery order.
    pub delivered: Vec<Message>,
    /// Messages still queued for the peer.
    pub remaining: usize,
    /// Messages discarded because they outlived [`PendingPolicy::max_age`].
    pub expired: usize,
    /// The stream was busy; the tail waits for the next flush on the same
    /// stream.
    pub stalled: bool,
    /// The write failure that stopped the flush, if any.
    pub fault: Option<ConnectionFault>,
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    queues: HashMap<RoutingKey, VecDeque<QueuedEntry>>,
    /// Entries put back at the head of a queue since its last drain.
    requeued: HashMap<RoutingKey, usize>,
    policy: PendingPolicy,
}

impl PendingQueue {
    pub fn new(policy: PendingPolicy) -> Self {
        Self {
            queues: HashMap::new(),
            requeued: HashMap::new(),
            policy,
        }
    }

    /// Append a message to `peer`'s queue. Returns the message evicted to
    /// respect [`PendingPolicy::max_per_peer`], if any.
    pub fn enqueue(&mut self, peer: RoutingKey, outbound: Outbound) -> Option<Message> {
        if self.policy.max_per_peer == Some(0) {
            warn!(peer = %peer.short(), "pending queue disabled, message not queued");
            return Some(outbound.message);
        }

        let queue = self.queues.entry(peer).or_default();

        let mut evicted = None;
        if let Some(cap) = self.policy.max_per_peer {
            if queue.len() >= cap {
                evicted = queue.pop_front().map(|entry| entry.outbound.message);
                warn!(peer = %peer.short(), cap, "pending queue full, oldest message evicted");
            }
        }

        queue.push_back(QueuedEntry {
            outbound,
            queued_at: Instant::now(),
        });
        debug!(peer = %peer.short(), queued = queue.len(), "message queued");

        evicted
    }

    /// Put a message back at the head of `peer`'s queue, ahead of everything
    /// queued after it. Messages requeued between two drains keep the order
    /// they were requeued in. The per-peer cap is not applied.
    pub fn requeue(&mut self, peer: RoutingKey, outbound: Outbound) {
        let queue = self.queues.entry(peer).or_default();
        let head = self.requeued.entry(peer).or_default();
        queue.insert(
            (*head).min(queue.len()),
            QueuedEntry {
                outbound,
                queued_at: Instant::now(),
            },
        );
        *head += 1;
        debug!(peer = %peer.short(), queued = queue.len(), "message requeued");
    }

    /// Write `peer`'s queued frames to `stream` in order.
    pub fn drain(&mut self, peer: &RoutingKey, stream: &mut dyn PeerStream) -> DrainReport {
        let mut report = DrainReport::default();
        self.requeued.remove(peer);
        let Some(queue) = self.queues.get_mut(peer) else {
            return report;
        };

        if let Some(max_age) = self.policy.max_age {
            let before = queue.len();
            queue.retain(|entry| entry.queued_at.elapsed() < max_age);
            report.expired = before - queue.len();
            if report.expired > 0 {
                warn!(peer = %peer.short(), expired = report.expired, "discarded expired pending messages");
            }
        }

        while let Some(entry) = queue.front() {
            match stream.write(&entry.outbound.frame) {
                Ok(()) => {
                    if let Some(sent) = queue.pop_front() {
                        report.delivered.push(sent.outbound.message);
                    }
                }
                Err(fault) if fault.is_transient() => {
                    report.stalled = true;
                    break;
                }
                Err(fault) => {
                    report.fault = Some(fault);
                    break;
                }
            }
        }

        report.remaining = queue.len();
        if queue.is_empty() {
            self.queues.remove(peer);
        }

        report
    }

    /// Drop `peer`'s queue. Returns how many messages were discarded.
    pub fn clear(&mut self, peer: &RoutingKey) -> usize {
        self.requeued.remove(peer);
        self.queues.remove(peer).map(|q| q.len()).unwrap_or(0)
    }

    /// Drop every queue. Returns how many messages were discarded.
    pub fn clear_all(&mut self) -> usize {
        let total = self.total();
        self.queues.clear();
        self.requeued.clear();
        total
    }

    pub fn len(&self, peer: &RoutingKey) -> usize {
        self.queues.get(peer).map(VecDeque::len).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
