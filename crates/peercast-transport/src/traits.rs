//! Transport abstraction traits for Peercast.
//!
//! A connection is a bidirectional, message-framed stream. The relay core
//! splits it once: the read half is owned by a single reader task, while
//! the write half is shared between the room actor (fan-out) and the
//! session's keepalive loop (pings).

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Kind of a transport frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

/// A single transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Text, payload)
    }

    /// Create an empty ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(FrameKind::Ping, Bytes::new())
    }

    /// Whether this frame carries application data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self.kind, FrameKind::Text | FrameKind::Binary)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame kind the transport cannot carry.
    #[error("Unsupported frame kind: {0:?}")]
    Unsupported(FrameKind),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The receiving half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame.
    ///
    /// Returns `None` if the connection was closed cleanly.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// The sending half of a connection.
///
/// Implementations serialize concurrent callers internally.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Send one frame.
    async fn send(&self, kind: FrameKind, payload: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// An established connection, before it is split.
pub trait Connection: Send {
    /// Split into an exclusively-owned reader and a shareable writer.
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Arc<dyn FrameWriter>);

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}
