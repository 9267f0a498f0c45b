//! The room actor.
//!
//! Each room is a single task that owns the room's membership. Every
//! mutation and every fan-out goes through its mailbox and is processed one
//! event at a time, in the order the events were enqueued.

use peercast_protocol::{ClientEvent, Envelope, InfoUser};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::session::{Session, SessionId};

/// Room errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The room's actor has stopped.
    #[error("Room {0} is closed")]
    Closed(String),
}

/// Events consumed by the room actor.
#[derive(Debug)]
pub(crate) enum RoomEvent {
    /// Register a session and announce it.
    Join(Session),
    /// Close and remove a session and announce its departure.
    Leave(SessionId),
    /// Client envelope, `from` already set to the sending session.
    Message(Envelope),
    /// Report the current number of members.
    MemberCount(oneshot::Sender<usize>),
}

/// Handle to a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: Arc<str>,
    sender: mpsc::Sender<RoomEvent>,
    cancel_token: CancellationToken,
    occupancy: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// Start a room actor and return its handle.
    pub(crate) fn spawn(
        id: &str,
        mailbox_capacity: usize,
        cancel_token: CancellationToken,
    ) -> Self {
        let (sender, mailbox) = mpsc::channel(mailbox_capacity.max(1));
        let id: Arc<str> = Arc::from(id);
        let occupancy = Arc::new(AtomicUsize::new(0));

        let actor = RoomActor {
            id: Arc::clone(&id),
            members: HashMap::new(),
            mailbox,
            cancel_token: cancel_token.clone(),
            occupancy: Arc::clone(&occupancy),
        };
        tokio::spawn(actor.run());

        Self {
            id,
            sender,
            cancel_token,
            occupancy,
        }
    }

    /// The room id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue a join for `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the room has stopped.
    pub async fn join(&self, session: Session) -> Result<(), RoomError> {
        self.send(RoomEvent::Join(session)).await
    }

    /// Enqueue a leave for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the room has stopped.
    pub async fn leave(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.send(RoomEvent::Leave(session_id)).await
    }

    /// Enqueue a client envelope for dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the room has stopped.
    pub async fn deliver(&self, envelope: Envelope) -> Result<(), RoomError> {
        self.send(RoomEvent::Message(envelope)).await
    }

    /// Ask the actor how many members it currently has.
    ///
    /// The answer reflects every event enqueued before this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the room has stopped.
    pub async fn member_count(&self) -> Result<usize, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomEvent::MemberCount(tx)).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Signal the actor to exit after its current event.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the actor has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Connections that were handed this room and have not yet left.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::SeqCst)
    }

    pub(crate) fn reserve(&self) {
        self.occupancy.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo a reservation whose join was never delivered.
    pub(crate) fn release(&self) {
        let _ = self
            .occupancy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn same_room(&self, other: &RoomHandle) -> bool {
        Arc::ptr_eq(&self.occupancy, &other.occupancy)
    }

    async fn send(&self, event: RoomEvent) -> Result<(), RoomError> {
        self.sender.send(event).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> RoomError {
        RoomError::Closed(self.id.to_string())
    }
}

struct RoomActor {
    id: Arc<str>,
    members: HashMap<SessionId, Session>,
    mailbox: mpsc::Receiver<RoomEvent>,
    cancel_token: CancellationToken,
    occupancy: Arc<AtomicUsize>,
}

impl RoomActor {
    async fn run(mut self) {
        debug!(room = %self.id, "Room started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break,

                event = self.mailbox.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        self.shutdown().await;
    }

    async fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join(session) => self.handle_join(session).await,
            RoomEvent::Leave(session_id) => self.handle_leave(&session_id).await,
            RoomEvent::Message(envelope) => self.handle_message(envelope).await,
            RoomEvent::MemberCount(respond_to) => {
                let _ = respond_to.send(self.members.len());
            }
        }
    }

    async fn handle_join(&mut self, session: Session) {
        let session_id = session.id().clone();
        let others: Vec<InfoUser> = self.members.values().map(Session::info_user).collect();
        let name = session.account().name.clone();
        let avatar = session.account().avatar.clone();

        info!(
            room = %self.id,
            session = %session_id,
            account = session.account().id,
            members = self.members.len() + 1,
            "Session joined"
        );

        match Envelope::info(session_id.as_str(), others) {
            Ok(info) => session.send(&info).await,
            Err(e) => warn!(room = %self.id, error = %e, "Failed to build info message"),
        }
        self.members.insert(session_id.clone(), session);

        match Envelope::join(session_id.as_str(), name, avatar) {
            Ok(join) => {
                for (id, member) in &self.members {
                    if *id != session_id {
                        member.send(&join).await;
                    }
                }
            }
            Err(e) => warn!(room = %self.id, error = %e, "Failed to build join message"),
        }
    }

    async fn handle_leave(&mut self, session_id: &SessionId) {
        let Some(session) = self.members.remove(session_id) else {
            trace!(room = %self.id, session = %session_id, "Leave for unknown session");
            return;
        };

        session.close().await;
        self.occupancy.fetch_sub(1, Ordering::SeqCst);

        info!(
            room = %self.id,
            session = %session_id,
            account = session.account().id,
            members = self.members.len(),
            "Session left"
        );

        self.broadcast(&Envelope::leave(session_id.as_str())).await;
    }

    async fn handle_message(&mut self, envelope: Envelope) {
        let event = match envelope.client_event() {
            Ok(Some(event)) => event,
            Ok(None) => {
                trace!(room = %self.id, kind = %envelope.kind, "Ignoring envelope");
                return;
            }
            Err(e) => {
                warn!(
                    room = %self.id,
                    session = %envelope.from,
                    kind = %envelope.kind,
                    error = %e,
                    "Failed to decode payload"
                );
                return;
            }
        };

        let Some(to) = event.target() else {
            if let ClientEvent::Chat(message) = &event {
                match Envelope::chat(envelope.from.as_str(), message) {
                    Ok(chat) => self.broadcast(&chat).await,
                    Err(e) => warn!(room = %self.id, error = %e, "Failed to build chat message"),
                }
            }
            return;
        };

        match self.members.get(to) {
            Some(target) => target.send(&envelope).await,
            None => debug!(
                room = %self.id,
                session = %envelope.from,
                target = %to,
                kind = %envelope.kind,
                "Signal target not in room"
            ),
        }
    }

    async fn broadcast(&self, envelope: &Envelope) {
        for member in self.members.values() {
            member.send(envelope).await;
        }
    }

    async fn shutdown(&mut self) {
        self.mailbox.close();

        // Members still registered would otherwise keep their sockets open.
        for (_, session) in self.members.drain() {
            session.close().await;
        }
        while let Ok(event) = self.mailbox.try_recv() {
            if let RoomEvent::Join(session) = event {
                session.close().await;
            }
        }

        debug!(room = %self.id, "Room stopped");
    }
}
