use thiserror::Error;

use peartalk_store::StoreError;

/// Errors returned to callers of the core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No local identity was supplied.
    #[error("Missing identity")]
    MissingIdentity,

    /// An identity could not be used to derive a topic or routing key.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// An outgoing message was rejected before sending.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The rendezvous layer could not be reached.
    #[error("Connection fault: {0}")]
    Connection(#[from] ConnectionFault),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<peartalk_shared::IdentityError> for CoreError {
    fn from(err: peartalk_shared::IdentityError) -> Self {
        match err {
            peartalk_shared::IdentityError::InvalidIdentity(reason) => {
                CoreError::InvalidIdentity(reason)
            }
        }
    }
}

/// A peer stream or the rendezvous layer failed. Never fatal: the affected
/// peer is deregistered and its traffic falls back to the pending queue.
/// [`ConnectionFault::Busy`] is the exception, it keeps the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFault {
    #[error("stream closed")]
    Closed,

    #[error("stream write failed: {0}")]
    Write(String),

    /// The stream cannot take another frame right now. The frame was not
    /// written and can be retried on the same stream later.
    #[error("stream busy")]
    Busy,
}

impl ConnectionFault {
    /// Whether the stream is still usable after this fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectionFault::Busy)
    }
}
