//! The signaling envelope.
//!
//! Every frame on the wire is a single JSON object of the form
//! `{"type": ..., "from": ..., "data": ...}`. The `data` field is left
//! untyped here and decoded into a concrete payload at the dispatch point
//! with [`Envelope::client_event`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{decode_data, ProtocolError};
use crate::payload::{ChatMessage, ClientEvent, InfoUser, JoinNotice, RoomInfo, Signal};

/// Envelope type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A member joined the room (server to client).
    Join,
    /// A member left the room (server to client).
    Leave,
    /// Roster snapshot sent to a joining member (server to client).
    Info,
    /// Chat message, broadcast to every member.
    ChatMessage,
    /// SDP offer, relayed to a single member.
    Offer,
    /// SDP answer, relayed to a single member.
    Answer,
    /// ICE candidate, relayed to a single member.
    IceCandidate,
    /// Any type this server does not understand.
    #[default]
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// The wire name of this event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Join => "join",
            EventType::Leave => "leave",
            EventType::Info => "info",
            EventType::ChatMessage => "chat-message",
            EventType::Offer => "offer",
            EventType::Answer => "answer",
            EventType::IceCandidate => "ice-candidate",
            EventType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type.
    #[serde(rename = "type", default)]
    pub kind: EventType,
    /// Session id of the sender. Always rewritten server-side on inbound frames.
    #[serde(default)]
    pub from: String,
    /// Type-dependent payload, absent for `leave`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Create an envelope without payload.
    #[must_use]
    pub fn new(kind: EventType, from: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            data: None,
        }
    }

    /// Create an envelope carrying a serialized payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn with_payload<T: Serialize>(
        kind: EventType,
        from: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            from: from.into(),
            data: Some(serde_json::to_value(payload)?),
        })
    }

    /// Roster snapshot for a member that just joined.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn info(from: impl Into<String>, users: Vec<InfoUser>) -> Result<Self, ProtocolError> {
        Self::with_payload(EventType::Info, from, &RoomInfo { users })
    }

    /// Announcement of a new member.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn join(
        from: impl Into<String>,
        name: impl Into<String>,
        avatar: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let notice = JoinNotice {
            name: name.into(),
            avatar: avatar.into(),
        };
        Self::with_payload(EventType::Join, from, &notice)
    }

    /// Announcement of a departed member.
    #[must_use]
    pub fn leave(from: impl Into<String>) -> Self {
        Self::new(EventType::Leave, from)
    }

    /// A decoded chat message, re-encoded as an object for broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn chat(from: impl Into<String>, message: &ChatMessage) -> Result<Self, ProtocolError> {
        Self::with_payload(EventType::ChatMessage, from, message)
    }

    /// Decode the payload of a client-originated envelope.
    ///
    /// Returns `Ok(None)` for server-only and unknown event types, which are
    /// not acted upon when they arrive from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is missing or malformed.
    pub fn client_event(&self) -> Result<Option<ClientEvent>, ProtocolError> {
        let event = match self.kind {
            EventType::ChatMessage => ClientEvent::Chat(self.payload::<ChatMessage>()?),
            EventType::Offer => ClientEvent::Offer(self.payload::<Signal>()?),
            EventType::Answer => ClientEvent::Answer(self.payload::<Signal>()?),
            EventType::IceCandidate => ClientEvent::IceCandidate(self.payload::<Signal>()?),
            EventType::Join | EventType::Leave | EventType::Info | EventType::Unknown => {
                return Ok(None)
            }
        };
        Ok(Some(event))
    }

    fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self
            .data
            .as_ref()
            .ok_or(ProtocolError::MissingData(self.kind))?;
        decode_data(data)
    }
}
