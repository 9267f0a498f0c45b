//! In-process transport.
//!
//! [`pair`] returns a [`MemoryConnection`] to hand to the relay and a
//! [`MemoryPeer`] that plays the remote client: it injects inbound frames
//! and read failures, forces write failures, and observes everything the
//! relay sends.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::traits::{Connection, Frame, FrameKind, FrameReader, FrameWriter, TransportError};

#[derive(Debug, Default)]
struct Flags {
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

/// Create a connected connection/peer pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);
    let flags = Arc::new(Flags::default());

    let conn = MemoryConnection {
        inbound: inbound_rx,
        outbound: outbound_tx,
        closed_tx,
        closed_rx,
        flags: Arc::clone(&flags),
    };
    let peer = MemoryPeer {
        inbound: inbound_tx,
        outbound: outbound_rx,
        flags,
    };
    (conn, peer)
}

/// The relay side of an in-process connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    flags: Arc<Flags>,
}

impl Connection for MemoryConnection {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Arc<dyn FrameWriter>) {
        let reader = MemoryReader {
            inbound: self.inbound,
            closed: self.closed_rx,
        };
        let writer = MemoryWriter {
            outbound: self.outbound,
            closed: self.closed_tx,
            flags: self.flags,
        };
        (Box::new(reader), Arc::new(writer))
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        tokio::select! {
            item = self.inbound.recv() => match item {
                Some(Ok(frame)) => Ok(Some(frame)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            },
            // A locally closed connection stops yielding frames.
            _ = self.closed.wait_for(|closed| *closed) => Err(TransportError::ConnectionClosed),
        }
    }
}

struct MemoryWriter {
    outbound: mpsc::UnboundedSender<Frame>,
    closed: watch::Sender<bool>,
    flags: Arc<Flags>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&self, kind: FrameKind, payload: Bytes) -> Result<(), TransportError> {
        if self.flags.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.flags.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("broken pipe".to_string()));
        }
        if kind == FrameKind::Close {
            return self.close().await;
        }

        self.outbound
            .send(Frame::new(kind, payload))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.flags.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.closed.send_replace(true);
        let _ = self.outbound.send(Frame::new(FrameKind::Close, Bytes::new()));
        Ok(())
    }
}

/// The remote-client side of an in-process connection.
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    flags: Arc<Flags>,
}

impl MemoryPeer {
    /// Deliver a text frame to the relay.
    pub fn send_text(&self, text: impl Into<String>) {
        self.send_frame(Frame::new(FrameKind::Text, text.into()));
    }

    /// Deliver an arbitrary frame to the relay.
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// Make the relay's next read fail.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        let _ = self
            .inbound
            .send(Err(TransportError::ReceiveFailed(reason.into())));
    }

    /// Make every subsequent write from the relay fail.
    pub fn fail_writes(&self) {
        self.flags.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Whether the relay has closed this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.flags.closed.load(Ordering::SeqCst)
    }

    /// Wait for the next frame sent by the relay.
    ///
    /// Returns `None` once the relay has dropped its write half.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Take the next frame sent by the relay, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }
}
