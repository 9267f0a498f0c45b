//! WebSocket transport implementation.
//!
//! This module provides a WebSocket-based connection using tokio-tungstenite.
//! It works over any byte stream, so the same type serves accepted server
//! sockets and outbound client connections.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    accept_async, connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::{Connection, Frame, FrameKind, FrameReader, FrameWriter, TransportError};

/// A WebSocket connection over an arbitrary stream.
pub struct WebSocketConnection<S> {
    stream: WebSocketStream<S>,
    remote_addr: Option<SocketAddr>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established WebSocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            stream,
            remote_addr,
        }
    }
}

/// Perform the server-side handshake on an accepted TCP stream.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn accept(stream: TcpStream) -> Result<WebSocketConnection<TcpStream>, TransportError> {
    let addr = stream.peer_addr().ok();

    let ws_stream = accept_async(stream).await.map_err(|e| {
        error!("WebSocket handshake failed: {}", e);
        TransportError::Other(format!("WebSocket handshake failed: {}", e))
    })?;

    debug!(remote = ?addr, "WebSocket handshake completed");
    Ok(WebSocketConnection::new(ws_stream, addr))
}

/// Open a client connection to `url`.
///
/// # Errors
///
/// Returns an error if the connection or handshake fails.
pub async fn connect(
    url: &str,
) -> Result<WebSocketConnection<MaybeTlsStream<TcpStream>>, TransportError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Other(format!("WebSocket connect failed: {}", e)))?;

    Ok(WebSocketConnection::new(ws_stream, None))
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Arc<dyn FrameWriter>) {
        let (sink, stream) = self.stream.split();
        let reader = WebSocketReader { stream };
        let writer = WebSocketWriter {
            sink: Mutex::new(sink),
            is_open: AtomicBool::new(true),
        };
        (Box::new(reader), Arc::new(writer))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|a| a.to_string())
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameReader for WebSocketReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => Frame::new(FrameKind::Text, text),
                Some(Ok(Message::Binary(data))) => Frame::new(FrameKind::Binary, data),
                Some(Ok(Message::Ping(data))) => Frame::new(FrameKind::Ping, data),
                Some(Ok(Message::Pong(data))) => Frame::new(FrameKind::Pong, data),
                Some(Ok(Message::Frame(_))) => continue, // Raw frame, ignore
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Ok(None)
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            };
            return Ok(Some(frame));
        }
    }
}

/// Write half of a [`WebSocketConnection`].
pub struct WebSocketWriter<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    is_open: AtomicBool,
}

#[async_trait]
impl<S> FrameWriter for WebSocketWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
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

        let mut sink = self.sink.lock().await;
        sink.send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }

        let mut sink = self.sink.lock().await;
        sink.close().await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            other => {
                warn!("Failed to close WebSocket: {}", other);
                TransportError::Other(format!("Failed to close: {}", other))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_loopback_text_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let conn = accept(stream).await.unwrap();
            assert!(conn.remote_addr().is_some());

            let (mut reader, writer) = Box::new(conn).split();
            let frame = reader.recv().await.unwrap().unwrap();
            assert_eq!(frame, Frame::text("hello"));

            writer
                .send(FrameKind::Text, Bytes::from_static(b"world"))
                .await
                .unwrap();
            writer.close().await.unwrap();
            assert!(matches!(
                writer.send(FrameKind::Text, Bytes::new()).await,
                Err(TransportError::ConnectionClosed)
            ));
        });

        let client = connect(&format!("ws://{}", addr)).await.unwrap();
        let (mut reader, writer) = Box::new(client).split();
        writer
            .send(FrameKind::Text, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let reply = reader.recv().await.unwrap().unwrap();
        assert_eq!(reply, Frame::text("world"));
        assert!(reader.recv().await.unwrap().is_none());

        server.await.unwrap();
    }
}
