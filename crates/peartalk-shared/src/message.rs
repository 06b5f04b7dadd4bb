//! Chat message model and its JSON frame encoding.
//!
//! A frame is a self-describing JSON object: `type`, `sender`, `recipient`,
//! `timestamp`, plus the fields of the message kind. Unknown fields are
//! ignored on decode, absent optional fields are omitted on encode, so a
//! message read back from the store is identical to the one that was sent.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::UserId;

/// Kinds of message the dispatcher knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Voice,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Text, MessageKind::Voice];

    /// Value of the `type` field on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// Kind-specific part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
        /// Untranslated text, filled in by a translating collaborator.
        #[serde(
            rename = "originalContent",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        original_content: Option<String>,
    },
    Voice {
        /// Encoded audio (base64 as produced by the recording collaborator).
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcription: Option<String>,
        #[serde(
            rename = "originalTranscription",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        original_transcription: Option<String>,
    },
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        MessageBody::Text {
            content: content.into(),
            original_content: None,
        }
    }

    pub fn voice(content: impl Into<String>, transcription: Option<String>) -> Self {
        MessageBody::Voice {
            content: content.into(),
            transcription,
            original_transcription: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Voice { .. } => MessageKind::Voice,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            MessageBody::Text { content, .. } | MessageBody::Voice { content, .. } => content,
        }
    }
}

/// A fully populated message, as transmitted and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub body: MessageBody,
    pub sender: UserId,
    pub recipient: UserId,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Encode as a wire frame.
    pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a wire frame, telling apart unparsable input from a frame whose
    /// `type` is simply not one we route.
    pub fn from_frame(raw: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

        let tag = match value.get("type") {
            Some(serde_json::Value::String(tag)) => tag.clone(),
            Some(_) => {
                return Err(ProtocolError::MalformedMessage(
                    "`type` is not a string".into(),
                ))
            }
            None => return Err(ProtocolError::MalformedMessage("missing `type`".into())),
        };

        if MessageKind::from_tag(&tag).is_none() {
            return Err(ProtocolError::UnknownMessageType(tag));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}

/// A message as handed to the core by a collaborator. Sender and timestamp
/// may be left out and are defaulted from context; the recipient is required
/// but checked by the core so the error can be reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub sender: Option<UserId>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl OutgoingMessage {
    pub fn new(recipient: impl Into<String>, body: MessageBody) -> Self {
        Self {
            body,
            recipient: Some(recipient.into()),
            sender: None,
            timestamp: None,
        }
    }

    pub fn text(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(recipient, MessageBody::text(content))
    }

    pub fn with_sender(mut self, sender: UserId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            body: MessageBody::voice("UklGRg==", Some("hello".into())),
            sender: UserId::parse("alice").unwrap(),
            recipient: UserId::parse("bob").unwrap(),
            timestamp: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = sample().to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "voice");
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["recipient"], "bob");
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["transcription"], "hello");
        assert!(value.get("originalTranscription").is_none());
    }

    #[test]
    fn test_frame_roundtrip_is_exact() {
        let msg = sample();
        let restored = Message::from_frame(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = br#"{"type":"text","content":"hi","sender":"alice","recipient":"bob","timestamp":5,"mood":"happy"}"#;
        let msg = Message::from_frame(raw).unwrap();
        assert_eq!(msg.body, MessageBody::text("hi"));
        assert_eq!(msg.timestamp, 5);
    }

    #[test]
    fn test_unknown_type() {
        let raw = br#"{"type":"sticker","content":"x","sender":"a","recipient":"b","timestamp":1}"#;
        assert_eq!(
            Message::from_frame(raw),
            Err(ProtocolError::UnknownMessageType("sticker".into()))
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            Message::from_frame(b"not json"),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::from_frame(br#"{"content":"hi"}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::from_frame(br#"{"type":"text","content":"hi","sender":"","recipient":"b","timestamp":1}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::from_frame(br#"{"type":"text","content":"hi","recipient":"b","timestamp":1}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_outgoing_defaults_absent() {
        let out: OutgoingMessage =
            serde_json::from_str(r#"{"type":"text","content":"hi","recipient":"bob"}"#).unwrap();
        assert_eq!(out.recipient.as_deref(), Some("bob"));
        assert!(out.sender.is_none());
        assert!(out.timestamp.is_none());
    }

    #[test]
    fn test_kind_tags() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MessageKind::from_tag("video"), None);
    }
}
