//! The room registry.
//!
//! The hub maps room ids to running room actors, creates rooms lazily on
//! first join and periodically removes rooms nobody is in.

use dashmap::DashMap;
use peercast_transport::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::room::RoomHandle;
use crate::session::{Account, Session, SessionLoop, PING_INTERVAL};

/// Interval between empty-room sweeps.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Room mailbox capacity. A full mailbox makes senders wait.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Keepalive ping period per session.
    pub ping_interval: Duration,
    /// Period of the empty-room sweep.
    pub cleanup_interval: Duration,
    /// Capacity of each room's mailbox.
    pub mailbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            cleanup_interval: CLEANUP_INTERVAL,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Registry of live rooms.
pub struct Hub {
    rooms: DashMap<String, RoomHandle>,
    config: HubConfig,
    shutdown: CancellationToken,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        info!(?config, "Creating hub");
        Self {
            rooms: DashMap::new(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Serve one authenticated connection in `room_id`.
    ///
    /// Creates the room if needed, registers a new session and runs its
    /// listen loop. Returns once the session has left the room.
    pub async fn handle(&self, account: Account, room_id: &str, connection: Box<dyn Connection>) {
        let remote = connection.remote_addr();
        let (reader, writer) = connection.split();

        let session = Session::new(account, Arc::clone(&writer));
        let session_id = session.id().clone();
        let account_id = session.account().id;

        debug!(
            room = %room_id,
            session = %session_id,
            account = account_id,
            remote = ?remote,
            "Connection accepted"
        );

        let Some(room) = self.reserve_room(room_id) else {
            debug!(session = %session_id, "Hub is shutting down");
            session.close().await;
            return;
        };
        if let Err(e) = room.join(session).await {
            room.release();
            warn!(room = %room_id, session = %session_id, error = %e, "Join rejected");
            if let Err(e) = writer.close().await {
                debug!(session = %session_id, error = %e, "Error while closing connection");
            }
            return;
        }

        SessionLoop::new(
            room,
            session_id.clone(),
            account_id,
            writer,
            self.config.ping_interval,
        )
        .run(reader)
        .await;

        debug!(room = %room_id, session = %session_id, "Connection finished");
    }

    /// Look up or create the room and count one more occupant.
    ///
    /// The reservation happens under the registry entry lock, so a sweep can
    /// never remove the room between lookup and join. Returns `None` once the
    /// hub is shutting down; the check holds the same lock `shutdown` needs to
    /// clear the entry, so no room can be registered after it.
    fn reserve_room(&self, room_id: &str) -> Option<RoomHandle> {
        let entry = self.rooms.entry(room_id.to_string());
        if self.shutdown.is_cancelled() {
            return None;
        }

        let room = entry.or_insert_with(|| {
            info!(room = %room_id, "Creating room");
            RoomHandle::spawn(
                room_id,
                self.config.mailbox_capacity,
                self.shutdown.child_token(),
            )
        });
        room.reserve();
        Some(room.value().clone())
    }

    /// Remove and stop every room without occupants.
    ///
    /// Returns the number of rooms removed.
    pub fn sweep(&self) -> usize {
        let idle: Vec<RoomHandle> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().occupancy() == 0)
            .map(|entry| entry.value().clone())
            .collect();

        let mut removed = 0;
        for candidate in idle {
            // Re-checked under the write lock; a join may have raced us.
            let gone = self.rooms.remove_if(candidate.id(), |_, current| {
                current.same_room(&candidate) && current.occupancy() == 0
            });

            if let Some((room_id, room)) = gone {
                room.stop();
                removed += 1;
                info!(room = %room_id, "Removed empty room");
            }
        }
        removed
    }

    /// Start the periodic empty-room sweep.
    ///
    /// The task ends on [`Hub::shutdown`] or when the hub is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::downgrade(self);
        let period = self.config.cleanup_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(hub) = hub.upgrade() else { break };
                        let removed = hub.sweep();
                        if removed > 0 {
                            debug!(removed, rooms = hub.room_count(), "Room cleanup pass");
                        } else {
                            trace!(rooms = hub.room_count(), "Room cleanup pass");
                        }
                    }
                }
            }

            debug!("Room cleanup stopped");
        })
    }

    /// Number of rooms in the registry.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether `room_id` is registered.
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Handle to a registered room.
    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Stop the cleanup task and every room.
    pub fn shutdown(&self) {
        info!(rooms = self.rooms.len(), "Shutting down hub");
        self.shutdown.cancel();
        self.rooms.clear();
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.mailbox_capacity, 1);
    }

    #[tokio::test]
    async fn test_reserve_creates_once() {
        let hub = Hub::default();
        let first = hub.reserve_room("r1").unwrap();
        let second = hub.reserve_room("r1").unwrap();

        assert!(first.same_room(&second));
        assert_eq!(first.occupancy(), 2);
        assert_eq!(hub.room_count(), 1);
        assert!(hub.room_exists("r1"));
        assert!(!hub.room_exists("r2"));
    }

    #[tokio::test]
    async fn test_sweep_skips_occupied_rooms() {
        let hub = Hub::default();
        let busy = hub.reserve_room("busy").unwrap();
        let idle = hub.reserve_room("idle").unwrap();
        idle.release();

        assert_eq!(hub.sweep(), 1);
        assert!(hub.room_exists("busy"));
        assert!(!hub.room_exists("idle"));
        assert!(idle.is_stopped());
        assert!(!busy.is_stopped());

        busy.release();
        assert_eq!(hub.sweep(), 1);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_rejoined_room() {
        let hub = Hub::default();
        let room = hub.reserve_room("r1").unwrap();
        room.release();

        // A new connection arrives before the sweep runs.
        let again = hub.reserve_room("r1").unwrap();
        assert!(again.same_room(&room));

        assert_eq!(hub.sweep(), 0);
        assert!(hub.room_exists("r1"));
    }

    #[tokio::test]
    async fn test_release_never_underflows() {
        let hub = Hub::default();
        let room = hub.reserve_room("r1").unwrap();
        room.release();
        room.release();
        assert_eq!(room.occupancy(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_rooms() {
        let hub = Hub::default();
        let room = hub.reserve_room("r1").unwrap();

        hub.shutdown();
        assert!(room.is_stopped());
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_no_room_is_registered_after_shutdown() {
        let hub = Hub::default();
        let existing = hub.reserve_room("r1").unwrap();

        hub.shutdown();
        assert!(hub.reserve_room("r1").is_none());
        assert!(hub.reserve_room("r2").is_none());
        assert_eq!(hub.room_count(), 0);
        assert_eq!(existing.occupancy(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_periodically() {
        let hub = Arc::new(Hub::new(HubConfig {
            cleanup_interval: Duration::from_secs(10),
            ..HubConfig::default()
        }));
        let cleanup = hub.spawn_cleanup();

        hub.reserve_room("r1").unwrap().release();
        assert!(hub.room_exists("r1"));

        time::sleep(Duration::from_secs(11)).await;
        assert!(!hub.room_exists("r1"));

        hub.shutdown();
        cleanup.await.unwrap();
    }
}
