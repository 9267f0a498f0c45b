//! Keepalive, cleanup and shutdown behaviour.

mod common;

use common::{alice, bob, wait_members, Client};
use peercast_core::{Hub, HubConfig};
use peercast_transport::FrameKind;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ROOM: &str = "r1";

fn hub_with_ping(ping_interval: Duration) -> Arc<Hub> {
    Arc::new(Hub::new(HubConfig {
        ping_interval,
        ..HubConfig::default()
    }))
}

#[tokio::test(start_paused = true)]
async fn test_ping_is_sent_every_interval() {
    let hub = hub_with_ping(Duration::from_secs(1));
    let (mut a, _, _) = Client::join(&hub, ROOM, alice()).await;

    for _ in 0..3 {
        let frame = a.peer.recv().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Ping);
    }
    assert!(!a.peer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_ping_failure_leaves_room() {
    let hub = hub_with_ping(Duration::from_secs(1));
    let (mut a, _, _) = Client::join(&hub, ROOM, alice()).await;
    let (b, b_id, _) = Client::join(&hub, ROOM, bob()).await;
    let _join = a.next_json().await;

    b.peer.fail_writes();

    assert_eq!(a.next_json().await, json!({"type": "leave", "from": b_id}));
    assert!(b.peer.is_closed());
    wait_members(&hub, ROOM, 1).await;
}

#[tokio::test]
async fn test_sweep_removes_room_after_last_leave() {
    let hub = Arc::new(Hub::default());
    let (a, _, _) = Client::join(&hub, ROOM, alice()).await;
    let room = hub.room(ROOM).unwrap();
    assert_eq!(room.occupancy(), 1);
    assert_eq!(hub.sweep(), 0);

    let Client { peer, task } = a;
    drop(peer);
    task.await.unwrap();
    wait_members(&hub, ROOM, 0).await;
    assert_eq!(room.occupancy(), 0);

    assert_eq!(hub.sweep(), 1);
    assert!(!hub.room_exists(ROOM));
    assert!(room.is_stopped());

    // The next participant gets a fresh room.
    let (_b, _, info) = Client::join(&hub, ROOM, bob()).await;
    assert_eq!(info["data"]["users"], json!([]));
    assert!(!hub.room(ROOM).unwrap().is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_keeps_occupied_rooms() {
    let hub = Arc::new(Hub::new(HubConfig {
        cleanup_interval: Duration::from_secs(60),
        ..HubConfig::default()
    }));
    let cleanup = hub.spawn_cleanup();

    let (_a, _, _) = Client::join(&hub, "busy", alice()).await;
    let (b, _, _) = Client::join(&hub, "idle", bob()).await;
    let Client { peer, task } = b;
    drop(peer);
    task.await.unwrap();
    wait_members(&hub, "idle", 0).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(hub.room_exists("busy"));
    assert!(!hub.room_exists("idle"));

    hub.shutdown();
    cleanup.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_members() {
    let hub = Arc::new(Hub::default());
    let (a, _, _) = Client::join(&hub, ROOM, alice()).await;

    hub.shutdown();

    tokio::time::timeout(Duration::from_secs(5), a.task)
        .await
        .expect("session did not finish")
        .unwrap();
    assert!(a.peer.is_closed());
    assert_eq!(hub.room_count(), 0);
}

#[tokio::test]
async fn test_connect_after_shutdown_is_refused() {
    let hub = Arc::new(Hub::default());
    hub.shutdown();

    let client = Client::connect(&hub, ROOM, alice());
    client.task.await.unwrap();
    assert!(client.peer.is_closed());
    assert!(!hub.room_exists(ROOM));
}

#[tokio::test]
async fn test_room_lifetime_end_to_end() {
    let hub = Arc::new(Hub::default());

    let (mut a, a_id, a_info) = Client::join(&hub, ROOM, alice()).await;
    assert_eq!(a_info["data"]["users"], json!([]));

    let (mut b, b_id, b_info) = Client::join(&hub, ROOM, bob()).await;
    assert_eq!(b_info["data"]["users"][0]["inner_id"], a_id.as_str());
    let join = a.next_json().await;
    assert_eq!(join["from"], b_id.as_str());
    assert_eq!(join["data"]["name"], "Bob");

    b.send(json!({
        "type": "chat-message",
        "data": "{\"content\":\"hi\",\"ts\":\"2024-05-01T10:00:00Z\"}"
    }));
    for client in [&mut a, &mut b] {
        let chat = client.next_json().await;
        assert_eq!(chat["from"], b_id.as_str());
        assert_eq!(chat["data"]["content"], "hi");
    }

    a.peer.fail_reads("socket error");
    assert_eq!(b.next_json().await, json!({"type": "leave", "from": a_id}));

    let Client { peer, task } = b;
    drop(peer);
    task.await.unwrap();
    a.task.await.unwrap();
    wait_members(&hub, ROOM, 0).await;

    assert_eq!(hub.sweep(), 1);
    assert!(!hub.room_exists(ROOM));
}
