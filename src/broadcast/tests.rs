use super::*;
use crate::asset::{AssetStatus, AssetType, Position};
use crate::replication::{Backbone, MemoryBackbone, Subjects};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::timeout;

fn update(id: &str, asset_type: AssetType, status: AssetStatus) -> AssetUpdate {
    AssetUpdate {
        id: id.to_string(),
        callsign: "ALPHA-1".to_string(),
        asset_type,
        status,
        position: Position::new(35.8, 47.5),
        speed: 42.0,
        heading: 90.0,
        timestamp: Utc::now(),
    }
}

fn local(instance: &str) -> Broadcaster {
    Broadcaster::new(instance, Arc::new(InterestIndex::new()), 32)
}

fn drain(rx: &mut mpsc::Receiver<Payload>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        out.push(serde_json::from_str(&payload).unwrap());
    }
    out
}

fn subscriber(
    broadcaster: &Broadcaster,
    topics: &[Topic],
) -> (ConnectionId, mpsc::Receiver<Payload>) {
    let id = ConnectionId::new();
    let rx = broadcaster.register(id);
    for topic in topics {
        broadcaster.index().join(id, topic.clone());
    }
    (id, rx)
}

// ── Local fan-out ────────────────────────────────────────────────────────────

#[test]
fn test_overlapping_topics_deliver_once() {
    let broadcaster = local("a");
    let (_, mut rx) = subscriber(
        &broadcaster,
        &[
            Topic::All,
            Topic::Asset("asset-1".to_string()),
            Topic::Type(AssetType::Drone),
            Topic::Status(AssetStatus::Active),
        ],
    );

    let delivered =
        broadcaster.broadcast_update(&update("asset-1", AssetType::Drone, AssetStatus::Active));

    assert_eq!(delivered, 1);
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["event"], "asset:update");
    assert_eq!(messages[0]["id"], "asset-1");
    assert_eq!(messages[0]["type"], "DRONE");
}

#[test]
fn test_non_members_receive_nothing() {
    let broadcaster = local("a");
    let (_, mut trucks) = subscriber(&broadcaster, &[Topic::Type(AssetType::Truck)]);
    let (_, mut other_asset) = subscriber(&broadcaster, &[Topic::Asset("asset-9".to_string())]);
    let (_, mut nothing) = subscriber(&broadcaster, &[]);

    broadcaster.broadcast_update(&update("asset-1", AssetType::Drone, AssetStatus::Idle));

    assert!(drain(&mut trucks).is_empty());
    assert!(drain(&mut other_asset).is_empty());
    assert!(drain(&mut nothing).is_empty());
}

#[test]
fn test_status_change_targets_all_and_asset_only() {
    let broadcaster = local("a");
    let (_, mut fleet) = subscriber(&broadcaster, &[Topic::All]);
    let (_, mut single) = subscriber(&broadcaster, &[Topic::Asset("asset-3".to_string())]);
    let (_, mut by_status) = subscriber(&broadcaster, &[Topic::Status(AssetStatus::Idle)]);

    let change = StatusChange {
        id: "asset-3".to_string(),
        previous_status: AssetStatus::Active,
        new_status: AssetStatus::Idle,
        timestamp: Utc::now(),
    };
    assert_eq!(broadcaster.broadcast_status_change(&change), 2);

    let fleet = drain(&mut fleet);
    assert_eq!(fleet.len(), 1);
    assert_eq!(fleet[0]["event"], "asset:status-change");
    assert_eq!(fleet[0]["previousStatus"], "ACTIVE");
    assert_eq!(fleet[0]["newStatus"], "IDLE");
    assert_eq!(drain(&mut single).len(), 1);
    assert!(drain(&mut by_status).is_empty());
}

#[test]
fn test_bulk_goes_to_all_only() {
    let broadcaster = local("a");
    let (_, mut fleet) = subscriber(&broadcaster, &[Topic::All]);
    let (_, mut drones) = subscriber(&broadcaster, &[Topic::Type(AssetType::Drone)]);

    let delivered = broadcaster.broadcast_bulk(vec![
        update("asset-1", AssetType::Drone, AssetStatus::Active),
        update("asset-2", AssetType::Truck, AssetStatus::Active),
    ]);

    assert_eq!(delivered, 1);
    let fleet = drain(&mut fleet);
    assert_eq!(fleet[0]["event"], "assets:bulk-update");
    assert_eq!(fleet[0]["updates"].as_array().unwrap().len(), 2);
    assert!(drain(&mut drones).is_empty());
}

#[test]
fn test_unregistered_connection_is_skipped() {
    let broadcaster = local("a");
    let (gone, rx) = subscriber(&broadcaster, &[Topic::All]);
    let (_, mut stays) = subscriber(&broadcaster, &[Topic::All]);

    broadcaster.unregister(gone);
    drop(rx);

    let delivered =
        broadcaster.broadcast_update(&update("asset-1", AssetType::Supply, AssetStatus::Alert));

    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut stays).len(), 1);
    assert_eq!(broadcaster.connection_count(), 1);
    assert!(!broadcaster.index().is_member(gone, &Topic::All));
}

#[test]
fn test_closed_receiver_does_not_block_others() {
    let broadcaster = local("a");
    // Receiver dropped without unregistering
    let (_, rx) = subscriber(&broadcaster, &[Topic::All]);
    drop(rx);
    let (_, mut stays) = subscriber(&broadcaster, &[Topic::All]);

    let delivered =
        broadcaster.broadcast_update(&update("asset-1", AssetType::Supply, AssetStatus::Active));

    assert_eq!(delivered, 1);
    assert_eq!(drain(&mut stays).len(), 1);
}

#[test]
fn test_full_queue_drops_instead_of_blocking() {
    let broadcaster = Broadcaster::new("a", Arc::new(InterestIndex::new()), 2);
    let (_, mut slow) = subscriber(&broadcaster, &[Topic::All]);

    let sent: usize = (0..5)
        .map(|i| {
            broadcaster.broadcast_update(&update(
                &format!("asset-{i}"),
                AssetType::Truck,
                AssetStatus::Active,
            ))
        })
        .sum();

    assert_eq!(sent, 2);
    let received = drain(&mut slow);
    assert_eq!(received.len(), 2);
    assert_eq!(received[0]["id"], "asset-0");
    assert_eq!(received[1]["id"], "asset-1");
}

#[test]
fn test_send_to_unknown_connection() {
    let broadcaster = local("a");
    assert!(!broadcaster.send_to(ConnectionId::new(), &ServerMessage::error("nope")));
}

// ── Replication ──────────────────────────────────────────────────────────────

fn replicated(instance: &str, backbone: Arc<dyn Backbone>) -> Arc<Broadcaster> {
    let (publisher, _) = ReplicationPublisher::spawn(backbone, Subjects::new("test"), 64);
    Arc::new(local(instance).with_replication(publisher))
}

fn instruction_message(origin: &str, topics: Vec<Topic>, payload: &str) -> BackboneMessage {
    let instruction = BroadcastInstruction {
        origin: origin.to_string(),
        topics,
        payload: payload.to_string(),
    };
    BackboneMessage {
        subject: Subjects::new("test").broadcast(),
        payload: serde_json::to_vec(&instruction).unwrap(),
    }
}

#[tokio::test]
async fn test_replicated_instruction_delivered_locally() {
    let broadcaster = replicated("b", Arc::new(MemoryBackbone::default()));
    let (_, mut rx) = subscriber(
        &broadcaster,
        &[Topic::All, Topic::Asset("asset-1".to_string())],
    );

    broadcaster.handle_replicated(&instruction_message(
        "a",
        vec![Topic::All, Topic::Asset("asset-1".to_string())],
        r#"{"event":"asset:update","id":"asset-1"}"#,
    ));

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], "asset-1");
}

#[tokio::test]
async fn test_own_origin_is_ignored() {
    let broadcaster = replicated("a", Arc::new(MemoryBackbone::default()));
    let (_, mut rx) = subscriber(&broadcaster, &[Topic::All]);

    broadcaster.handle_replicated(&instruction_message(
        "a",
        vec![Topic::All],
        r#"{"event":"asset:update"}"#,
    ));

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_malformed_backbone_message_is_skipped() {
    let broadcaster = replicated("a", Arc::new(MemoryBackbone::default()));
    let (_, mut rx) = subscriber(&broadcaster, &[Topic::All]);

    broadcaster.handle_replicated(&BackboneMessage {
        subject: Subjects::new("test").broadcast(),
        payload: b"{truncated".to_vec(),
    });

    assert!(drain(&mut rx).is_empty());
    assert_eq!(broadcaster.connection_count(), 1);
}

#[tokio::test]
async fn test_presence_beat_counts_remote_observers() {
    let broadcaster = replicated("a", Arc::new(MemoryBackbone::default()));
    let subjects = Subjects::new("test");
    let beat = |origin: &str, connections: usize| BackboneMessage {
        subject: subjects.presence(origin),
        payload: serde_json::to_vec(&PresenceBeat {
            origin: origin.to_string(),
            connections,
        })
        .unwrap(),
    };

    assert_eq!(broadcaster.observer_count(), 0);

    broadcaster.handle_replicated(&beat("b", 3));
    // Own beats never count twice
    broadcaster.handle_replicated(&beat("a", 50));

    assert_eq!(broadcaster.connection_count(), 0);
    assert_eq!(broadcaster.observer_count(), 3);
}

#[tokio::test]
async fn test_two_instances_share_broadcasts() {
    let backbone = Arc::new(MemoryBackbone::default());
    let subjects = Subjects::new("test");

    let a = replicated("a", backbone.clone());
    let b = replicated("b", backbone.clone());

    for instance in [&a, &b] {
        let stream = backbone.subscribe(subjects.all()).await.unwrap();
        tokio::spawn(Arc::clone(instance).run_replication_listener(stream));
    }

    let (_, mut on_a) = subscriber(&a, &[Topic::All]);
    let (_, mut on_b) = subscriber(
        &b,
        &[Topic::Type(AssetType::Drone), Topic::Asset("asset-5".to_string())],
    );
    let (_, mut trucks_on_b) = subscriber(&b, &[Topic::Type(AssetType::Truck)]);

    a.broadcast_update(&update("asset-5", AssetType::Drone, AssetStatus::Active));

    let local_copy = timeout(Duration::from_secs(1), on_a.recv())
        .await
        .unwrap()
        .unwrap();
    let remote_copy = timeout(Duration::from_secs(1), on_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local_copy, remote_copy);

    // Give any duplicate a chance to arrive
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut on_a).is_empty());
    assert!(drain(&mut on_b).is_empty());
    assert!(drain(&mut trucks_on_b).is_empty());
}

#[tokio::test]
async fn test_presence_crosses_instances_with_dotted_ids() {
    let backbone = Arc::new(MemoryBackbone::default());
    let subjects = Subjects::new("test");

    let a = replicated("node1.cluster.local", backbone.clone());
    let b = replicated("node2.cluster.local", backbone.clone());

    for instance in [&a, &b] {
        let stream = backbone.subscribe(subjects.all()).await.unwrap();
        tokio::spawn(Arc::clone(instance).run_replication_listener(stream));
        tokio::spawn(Arc::clone(instance).run_presence_heartbeat(Duration::from_millis(20)));
    }

    let (_, _on_b) = subscriber(&b, &[Topic::All]);

    let seen = timeout(Duration::from_secs(1), async {
        while a.observer_count() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(seen.is_ok(), "A never saw B's observer");
    assert_eq!(a.connection_count(), 0);
    assert_eq!(b.observer_count(), 1);
}

#[tokio::test]
async fn test_heartbeat_publishes_without_listener() {
    let backbone = Arc::new(MemoryBackbone::default());
    let subjects = Subjects::new("test");
    let mut beats = backbone.subscribe(subjects.presence("a")).await.unwrap();

    // No replication listener: this instance can only talk, not hear
    let a = replicated("a", backbone.clone());
    let (_, _rx) = subscriber(&a, &[Topic::All]);
    tokio::spawn(Arc::clone(&a).run_presence_heartbeat(Duration::from_millis(20)));

    let msg = timeout(Duration::from_secs(1), beats.next())
        .await
        .expect("heartbeat should be published")
        .expect("backbone stream open");
    let beat: PresenceBeat = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(beat.origin, "a");
    assert_eq!(beat.connections, 1);
}

struct FailingBackbone;

impl Backbone for FailingBackbone {
    fn publish(&self, _subject: String, _payload: Vec<u8>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Err(anyhow::anyhow!("backbone unavailable")) })
    }

    fn subscribe(
        &self,
        _pattern: String,
    ) -> BoxFuture<'_, anyhow::Result<BoxStream<'static, BackboneMessage>>> {
        Box::pin(async { Err(anyhow::anyhow!("backbone unavailable")) })
    }
}

#[tokio::test]
async fn test_failing_backbone_keeps_local_delivery() {
    let broadcaster = replicated("a", Arc::new(FailingBackbone));
    let (_, mut rx) = subscriber(&broadcaster, &[Topic::All]);

    for i in 0..3 {
        broadcaster.broadcast_update(&update(
            &format!("asset-{i}"),
            AssetType::Helicopter,
            AssetStatus::Active,
        ));
        tokio::task::yield_now().await;
    }

    assert_eq!(drain(&mut rx).len(), 3);
}
