//! Seams between the core and the network layer.

use peartalk_shared::Topic;

use crate::error::ConnectionFault;

/// One established, encrypted byte stream to a remote peer.
pub trait PeerStream: Send {
    /// Write one whole frame.
    fn write(&mut self, frame: &[u8]) -> Result<(), ConnectionFault>;

    /// End the stream. Called at most once, after which the stream is dropped.
    fn close(&mut self);
}

/// Topic membership on the rendezvous layer. Peers met on a joined topic
/// come back to the core as [`PeerStream`]s.
pub trait Rendezvous: Send {
    fn join(&mut self, topic: &Topic) -> Result<(), ConnectionFault>;

    fn leave(&mut self, topic: &Topic);
}

/// Why the network layer handed back a frame it had accepted from a
/// [`PeerStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    /// Nobody is listening on the link yet. The link stays usable.
    NoRoute,
    /// The link cannot carry frames any more.
    LinkFailed,
    /// The frame can never be sent.
    Oversized,
}
