//! # peercast-transport
//!
//! Transport abstraction layer for the Peercast signaling relay.
//!
//! The relay only needs a bidirectional, message-framed connection that
//! can receive frames, send text and ping frames, and be closed. This
//! crate defines that interface and provides implementations:
//!
//! - **WebSocket** - tokio-tungstenite, for plain TCP listeners and clients
//! - **Axum** - sockets upgraded by an axum handler
//! - **Memory** - an in-process pair for tests
//!
//! ```rust,ignore
//! use peercast_transport::{Connection, FrameKind};
//!
//! async fn echo(conn: Box<dyn Connection>) {
//!     let (mut reader, writer) = conn.split();
//!     while let Ok(Some(frame)) = reader.recv().await {
//!         if frame.is_data() {
//!             let _ = writer.send(FrameKind::Text, frame.payload).await;
//!         }
//!     }
//! }
//! ```

pub mod axum_ws;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use axum_ws::AxumConnection;
pub use traits::{Connection, Frame, FrameKind, FrameReader, FrameWriter, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
