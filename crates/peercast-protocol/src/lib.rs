//! # peercast-protocol
//!
//! Wire protocol definitions for the Peercast signaling relay.
//!
//! Every frame is one JSON envelope:
//!
//! ```text
//! { "type": <event type>, "from": <session id>, "data": <payload, optional> }
//! ```
//!
//! ## Event Types
//!
//! - `join` / `leave` / `info` - Room presence, emitted by the server
//! - `chat-message` - Broadcast to every member, sender included
//! - `offer` / `answer` / `ice-candidate` - WebRTC signaling, relayed to one member
//!
//! ## Example
//!
//! ```rust
//! use peercast_protocol::{codec, ClientEvent, Envelope};
//!
//! let frame = br#"{"type":"chat-message","data":"{\"content\":\"hi\",\"ts\":\"2024-05-01T10:00:00Z\"}"}"#;
//! let envelope = codec::decode(frame).unwrap();
//!
//! match envelope.client_event().unwrap() {
//!     Some(ClientEvent::Chat(msg)) => assert_eq!(msg.content, "hi"),
//!     _ => unreachable!(),
//! }
//!
//! let leave = codec::encode(&Envelope::leave("session-1")).unwrap();
//! assert_eq!(&leave[..], br#"{"type":"leave","from":"session-1"}"#);
//! ```

pub mod codec;
pub mod envelope;
pub mod payload;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use envelope::{Envelope, EventType};
pub use payload::{ChatMessage, ClientEvent, InfoUser, JoinNotice, RoomInfo, Signal};
