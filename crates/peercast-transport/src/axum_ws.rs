//! Adapter for WebSockets upgraded by axum.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::traits::{Connection, Frame, FrameKind, FrameReader, FrameWriter, TransportError};

/// A WebSocket accepted through `axum::extract::ws::WebSocketUpgrade`.
pub struct AxumConnection {
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
}

impl AxumConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            remote_addr: None,
        }
    }

    /// Attach the peer address reported by the HTTP layer.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl Connection for AxumConnection {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Arc<dyn FrameWriter>) {
        let (sink, stream) = self.socket.split();
        (
            Box::new(AxumReader { stream }),
            Arc::new(AxumWriter {
                sink: Mutex::new(sink),
                is_open: AtomicBool::new(true),
            }),
        )
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|a| a.to_string())
    }
}

struct AxumReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for AxumReader {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        let frame = match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Frame::new(FrameKind::Text, text),
            Some(Ok(Message::Binary(data))) => Frame::new(FrameKind::Binary, data),
            Some(Ok(Message::Ping(data))) => Frame::new(FrameKind::Ping, data),
            Some(Ok(Message::Pong(data))) => Frame::new(FrameKind::Pong, data),
            Some(Ok(Message::Close(_))) => {
                debug!("Received close frame");
                return Ok(None);
            }
            Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            None => return Ok(None),
        };
        Ok(Some(frame))
    }
}

struct AxumWriter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    is_open: AtomicBool,
}

#[async_trait]
impl FrameWriter for AxumWriter {
    async fn send(&self, kind: FrameKind, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let message = match kind {
            FrameKind::Text => Message::Text(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?,
            ),
            FrameKind::Binary => Message::Binary(payload.to_vec()),
            FrameKind::Ping => Message::Ping(payload.to_vec()),
            FrameKind::Pong => Message::Pong(payload.to_vec()),
            FrameKind::Close => return self.close().await,
        };

        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}
