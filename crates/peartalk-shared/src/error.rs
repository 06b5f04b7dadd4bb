use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}

/// Reasons an inbound frame could not be turned into a [`crate::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// The frame names a sender other than the identity of the link it
    /// arrived on.
    #[error("Sender {sender} does not match link identity {link}")]
    SenderMismatch { link: String, sender: String },
}
