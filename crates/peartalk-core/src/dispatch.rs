//! Frame dispatch and outbound validation.
//!
//! Inbound frames are decoded into a [`Message`] and routed by
//! [`MessageKind`] to one handler per kind. Every handler ends with the same
//! two side effects: notify the collaborator and persist. A new kind is a new
//! `MessageKind` variant plus a handler in [`handler_for`]; the match there is
//! exhaustive so a kind cannot be left unrouted.

use tracing::{debug, warn};

use peartalk_shared::{
    now_millis, Message, MessageBody, MessageKind, OutgoingMessage, ProtocolError, UserId,
};
use peartalk_store::Database;

use crate::error::CoreError;
use crate::events::{emit, CoreEvent, EventSink};

/// What a handler may touch.
pub struct HandlerContext<'a> {
    pub store: &'a Database,
    pub events: &'a EventSink,
    pub local: &'a UserId,
}

impl HandlerContext<'_> {
    pub fn emit(&self, message: &Message) {
        emit(self.events, self.local, CoreEvent::Message(message.clone()));
    }

    pub fn persist(&self, message: &Message) {
        persist(self.store, message);
    }
}

pub type Handler = fn(&Message, &HandlerContext<'_>);

pub fn handler_for(kind: MessageKind) -> Handler {
    match kind {
        MessageKind::Text => handle_text,
        MessageKind::Voice => handle_voice,
    }
}

fn handle_text(message: &Message, ctx: &HandlerContext<'_>) {
    debug!(sender = %message.sender, len = message.body.content().len(), "text message");
    ctx.emit(message);
    ctx.persist(message);
}

fn handle_voice(message: &Message, ctx: &HandlerContext<'_>) {
    if let MessageBody::Voice { transcription, .. } = &message.body {
        debug!(
            sender = %message.sender,
            transcribed = transcription.is_some(),
            "voice message"
        );
    }
    ctx.emit(message);
    ctx.persist(message);
}

/// Decode one inbound frame received on the link of `link` and run its
/// handler.
///
/// Undecodable frames, unknown kinds and frames claiming a sender other than
/// `link` are returned as errors for the caller to log; nothing is emitted
/// or stored for them.
pub fn handle_frame(
    raw: &[u8],
    link: &UserId,
    ctx: &HandlerContext<'_>,
) -> Result<Message, ProtocolError> {
    let message = Message::from_frame(raw)?;
    if message.sender != *link {
        return Err(ProtocolError::SenderMismatch {
            link: link.to_string(),
            sender: message.sender.to_string(),
        });
    }
    debug!(
        from = %link,
        kind = message.kind().tag(),
        timestamp = message.timestamp,
        "dispatching frame"
    );

    handler_for(message.kind())(&message, ctx);
    Ok(message)
}

/// Validate an outgoing message and fill in what the caller left out.
pub fn prepare_outgoing(outgoing: OutgoingMessage, local: &UserId) -> Result<Message, CoreError> {
    let recipient = match outgoing.recipient.as_deref() {
        None => return Err(CoreError::InvalidMessage("recipient is required".into())),
        Some(raw) => UserId::parse(raw)
            .map_err(|e| CoreError::InvalidMessage(format!("recipient: {e}")))?,
    };

    Ok(Message {
        body: outgoing.body,
        sender: outgoing.sender.unwrap_or_else(|| local.clone()),
        recipient,
        timestamp: outgoing.timestamp.unwrap_or_else(now_millis),
    })
}

/// Append `message` to the store. Store faults are logged, never raised.
pub(crate) fn persist(store: &Database, message: &Message) {
    match store.put(message) {
        Ok(outcome) if outcome.index_faults > 0 => {
            warn!(
                key = %outcome.key,
                index_faults = outcome.index_faults,
                "message stored with incomplete indexes"
            );
        }
        Ok(outcome) => debug!(key = %outcome.key, "message persisted"),
        Err(e) => warn!(
            sender = %message.sender,
            recipient = %message.recipient,
            error = %e,
            "store fault, message not persisted"
        ),
    }
}
