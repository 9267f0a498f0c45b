//! Sessions and the per-connection listen loop.
//!
//! A session is one live connection inside one room. It pairs the
//! participant's persistent account with a fresh, per-connection session id;
//! only the session id ever appears on the wire.

use bytes::Bytes;
use peercast_protocol::{codec, Envelope, InfoUser};
use peercast_transport::{FrameKind, FrameReader, FrameWriter, TransportError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::room::RoomHandle;

/// Interval between keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Ephemeral, globally unique identifier of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A verified account record handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Persistent account id; the same account may hold several sessions.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Avatar reference, usually a URL.
    pub avatar: String,
}

impl Account {
    /// Create an account record.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar: avatar.into(),
        }
    }
}

/// A participant's connection within a room.
pub struct Session {
    id: SessionId,
    account: Account,
    writer: Arc<dyn FrameWriter>,
}

impl Session {
    /// Create a session with a freshly generated id.
    #[must_use]
    pub fn new(account: Account, writer: Arc<dyn FrameWriter>) -> Self {
        Self {
            id: SessionId::generate(),
            account,
            writer,
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The account behind this session.
    #[must_use]
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Roster entry describing this session.
    #[must_use]
    pub fn info_user(&self) -> InfoUser {
        InfoUser {
            inner_id: self.id.to_string(),
            name: self.account.name.clone(),
            avatar: self.account.avatar.clone(),
        }
    }

    /// Send an envelope as one text frame.
    ///
    /// Failures are logged and otherwise ignored; a broken connection is
    /// detected by its own listen loop.
    pub async fn send(&self, envelope: &Envelope) {
        let data = match codec::encode(envelope) {
            Ok(data) => data,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Failed to encode envelope");
                return;
            }
        };

        if let Err(e) = self.writer.send(FrameKind::Text, data).await {
            warn!(
                session = %self.id,
                account = self.account.id,
                kind = %envelope.kind,
                error = %e,
                "Failed to send envelope"
            );
        }
    }

    /// Close the underlying transport.
    pub async fn close(&self) {
        if let Err(e) = self.writer.close().await {
            debug!(session = %self.id, error = %e, "Error while closing connection");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Bridges one connection to its room's mailbox and keeps it alive.
pub(crate) struct SessionLoop {
    room: RoomHandle,
    session_id: SessionId,
    account_id: i64,
    writer: Arc<dyn FrameWriter>,
    ping_interval: Duration,
}

impl SessionLoop {
    pub(crate) fn new(
        room: RoomHandle,
        session_id: SessionId,
        account_id: i64,
        writer: Arc<dyn FrameWriter>,
        ping_interval: Duration,
    ) -> Self {
        Self {
            room,
            session_id,
            account_id,
            writer,
            ping_interval,
        }
    }

    /// Run until the connection fails, then enqueue this session's leave.
    pub(crate) async fn run(self, reader: Box<dyn FrameReader>) {
        let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(1);
        let (error_tx, mut error_rx) = oneshot::channel::<Option<TransportError>>();
        let reader_task = tokio::spawn(read_frames(reader, frame_tx, error_tx));

        let mut ticker = time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Frames queued before a read failure are handled first.
                biased;

                _ = ticker.tick() => {
                    if let Err(e) = self.writer.send(FrameKind::Ping, Bytes::new()).await {
                        warn!(
                            room = %self.room.id(),
                            session = %self.session_id,
                            account = self.account_id,
                            error = %e,
                            "Ping failed"
                        );
                        break;
                    }
                    trace!(session = %self.session_id, "Ping sent");
                }

                Some(data) = frame_rx.recv() => {
                    let mut envelope = match codec::decode(&data) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(
                                room = %self.room.id(),
                                session = %self.session_id,
                                account = self.account_id,
                                error = %e,
                                "Failed to parse message"
                            );
                            continue;
                        }
                    };

                    // Never trust the client-supplied sender.
                    envelope.from = self.session_id.to_string();

                    if let Err(e) = self.room.deliver(envelope).await {
                        debug!(session = %self.session_id, error = %e, "Room stopped");
                        break;
                    }
                }

                result = &mut error_rx => {
                    match result {
                        Ok(Some(e)) => warn!(
                            room = %self.room.id(),
                            session = %self.session_id,
                            account = self.account_id,
                            error = %e,
                            "Read failed"
                        ),
                        Ok(None) => debug!(session = %self.session_id, "Connection closed by peer"),
                        Err(_) => debug!(session = %self.session_id, "Reader stopped"),
                    }
                    break;
                }
            }
        }

        reader_task.abort();

        if let Err(e) = self.room.leave(self.session_id.clone()).await {
            debug!(session = %self.session_id, error = %e, "Leave not delivered");
        }
    }
}

/// Forward data frames until the transport fails or closes.
async fn read_frames(
    mut reader: Box<dyn FrameReader>,
    frames: mpsc::Sender<Bytes>,
    error: oneshot::Sender<Option<TransportError>>,
) {
    let outcome = loop {
        match reader.recv().await {
            Ok(Some(frame)) if frame.is_data() => {
                if frames.send(frame.payload).await.is_err() {
                    return; // Listen loop is gone
                }
            }
            Ok(Some(_)) => {} // Control frames are handled by the transport
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };
    let _ = error.send(outcome);
}
