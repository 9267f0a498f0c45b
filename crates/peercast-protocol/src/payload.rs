//! Payload variants carried in the envelope `data` field.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize, Serializer};

/// `join` payload: the new member's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNotice {
    pub name: String,
    pub avatar: String,
}

/// One entry of the `info` roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfoUser {
    /// Session id of the member.
    pub inner_id: String,
    pub name: String,
    pub avatar: String,
}

/// `info` payload: every other member present at join time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub users: Vec<InfoUser>,
}

/// `chat-message` payload.
///
/// Missing fields decode to their zero values, as clients may omit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: String,
    /// Client-supplied send time (RFC 3339), relayed with its original offset.
    #[serde(default = "zero_time", serialize_with = "serialize_ts")]
    pub ts: DateTime<FixedOffset>,
}

/// `0001-01-01T00:00:00Z`, the timestamp of a message sent without one.
fn zero_time() -> DateTime<FixedOffset> {
    DateTime::from_timestamp(-62_135_596_800, 0)
        .unwrap_or_default()
        .fixed_offset()
}

fn serialize_ts<S: Serializer>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// `offer` / `answer` / `ice-candidate` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Target session id.
    #[serde(default)]
    pub to: String,
    /// Opaque content, typically serialized SDP or an ICE candidate.
    #[serde(default)]
    pub content: String,
}

/// A decoded client event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Chat(ChatMessage),
    Offer(Signal),
    Answer(Signal),
    IceCandidate(Signal),
}

impl ClientEvent {
    /// The relay target, for point-to-point events.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            ClientEvent::Chat(_) => None,
            ClientEvent::Offer(s) | ClientEvent::Answer(s) | ClientEvent::IceCandidate(s) => {
                Some(&s.to)
            }
        }
    }
}
