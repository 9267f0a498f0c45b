#![allow(dead_code)]

use peercast_core::{Account, Hub};
use peercast_transport::memory::{self, MemoryPeer};
use peercast_transport::FrameKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A fake browser attached to the hub through an in-memory connection.
pub struct Client {
    pub peer: MemoryPeer,
    pub task: JoinHandle<()>,
}

impl Client {
    pub fn connect(hub: &Arc<Hub>, room_id: &str, account: Account) -> Self {
        let (conn, peer) = memory::pair();
        let hub = Arc::clone(hub);
        let room_id = room_id.to_string();
        let task = tokio::spawn(async move {
            hub.handle(account, &room_id, Box::new(conn)).await;
        });
        Self { peer, task }
    }

    /// Connect and wait for the roster; returns the client and its session id.
    pub async fn join(hub: &Arc<Hub>, room_id: &str, account: Account) -> (Self, String, Value) {
        let mut client = Self::connect(hub, room_id, account);
        let info = client.next_json().await;
        assert_eq!(info["type"], "info");
        let id = info["from"].as_str().unwrap().to_string();
        (client, id, info)
    }

    pub fn send(&self, value: Value) {
        self.peer.send_text(value.to_string());
    }

    /// Next text frame as JSON, skipping pings.
    pub async fn next_json(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.peer.recv().await {
                    Some(frame) if frame.kind == FrameKind::Text => return frame,
                    Some(_) => continue,
                    None => panic!("relay dropped the connection"),
                }
            }
        })
        .await
        .expect("timed out waiting for a frame");
        serde_json::from_slice(&frame.payload).unwrap()
    }

    /// Whether a text frame is already queued.
    pub fn has_pending_text(&mut self) -> bool {
        while let Some(frame) = self.peer.try_recv() {
            if frame.kind == FrameKind::Text {
                return true;
            }
        }
        false
    }
}

pub fn alice() -> Account {
    Account::new(1, "Alice", "https://img/alice.png")
}

pub fn bob() -> Account {
    Account::new(2, "Bob", "https://img/bob.png")
}

pub fn carol() -> Account {
    Account::new(3, "Carol", "https://img/carol.png")
}

/// Wait until the room has processed everything enqueued so far and holds
/// `expected` members.
pub async fn wait_members(hub: &Hub, room_id: &str, expected: usize) {
    let room = hub.room(room_id).expect("room not registered");
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if room.member_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("member count never reached");
}
