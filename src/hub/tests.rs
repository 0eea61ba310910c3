use super::{Hub, HubHandle, LineageUpdate};
use crate::config::HubSettings;
use crate::utils::HubError;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TryRecvError;

fn settings(queue_capacity: usize) -> HubSettings {
    HubSettings {
        queue_capacity,
        ..HubSettings::default()
    }
}

fn spawn_hub(queue_capacity: usize) -> HubHandle {
    let (handle, _task) = Hub::spawn(&settings(queue_capacity));
    handle
}

#[tokio::test]
async fn test_register_then_publish_reaches_member() {
    let hub = spawn_hub(8);
    let mut queue = hub.register("client-a".to_string()).await.unwrap();

    hub.publish("hello").await.unwrap();

    assert_eq!(queue.recv().await.unwrap(), Bytes::from_static(b"hello"));
    assert_eq!(hub.members().await.unwrap(), vec!["client-a".to_string()]);
}

#[tokio::test]
async fn test_waiting_registration_is_applied_before_waiting_publish() {
    let (hub_loop, hub) = Hub::new(&settings(8));

    // both requests sit in their intakes before the loop starts
    hub.publish("early").await.unwrap();
    let mut queue = hub.register("late".to_string()).await.unwrap();
    tokio::spawn(hub_loop.run());

    assert_eq!(queue.recv().await.unwrap(), Bytes::from_static(b"early"));
    assert_eq!(hub.members().await.unwrap(), vec!["late".to_string()]);
}

#[tokio::test]
async fn test_broadcast_reaches_every_member_once() {
    let hub = spawn_hub(256);
    let mut a = hub.register("a".to_string()).await.unwrap();
    let mut b = hub.register("b".to_string()).await.unwrap();
    let mut c = hub.register("c".to_string()).await.unwrap();

    hub.publish_update(&LineageUpdate::node_added("t1"))
        .await
        .unwrap();
    // the query is answered after the publish has been dispatched
    assert_eq!(hub.members().await.unwrap().len(), 3);

    let expected = Bytes::from_static(br#"{"type":"node_added","id":"t1"}"#);
    for queue in [&mut a, &mut b, &mut c] {
        assert_eq!(queue.try_recv().unwrap(), expected);
        assert_eq!(queue.try_recv().unwrap_err(), TryRecvError::Empty);
    }
}

#[tokio::test]
async fn test_saturated_member_is_evicted_while_others_receive_everything() {
    let hub = spawn_hub(256);
    let mut a = hub.register("a".to_string()).await.unwrap();
    let mut b = hub.register("b".to_string()).await.unwrap();
    let mut c = hub.register("c".to_string()).await.unwrap();

    hub.publish_update(&LineageUpdate::node_added("t1"))
        .await
        .unwrap();
    let first = a.recv().await.unwrap();
    assert_eq!(c.recv().await.unwrap(), first);

    // b is never drained from here on
    for i in 0..300 {
        let payload = format!("msg-{i}");
        hub.publish(payload.clone()).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), Bytes::from(payload.clone()));
        assert_eq!(c.recv().await.unwrap(), Bytes::from(payload));
    }

    let members = hub.members().await.unwrap();
    assert_eq!(members, vec!["a".to_string(), "c".to_string()]);

    // b kept exactly what fit in its queue, then saw the queue close
    let mut kept = Vec::new();
    while let Some(payload) = b.recv().await {
        kept.push(payload);
    }
    assert_eq!(kept.len(), 256);
    assert_eq!(kept[0], first);
    assert_eq!(kept[1], Bytes::from_static(b"msg-0"));
    assert_eq!(kept[255], Bytes::from_static(b"msg-254"));
}

#[tokio::test]
async fn test_eviction_happens_on_the_overflowing_publish() {
    let hub = spawn_hub(4);
    let mut slow = hub.register("slow".to_string()).await.unwrap();

    for i in 0..4 {
        hub.publish(format!("{i}")).await.unwrap();
    }
    assert_eq!(hub.members().await.unwrap(), vec!["slow".to_string()]);

    hub.publish("overflow").await.unwrap();
    assert!(hub.members().await.unwrap().is_empty());

    hub.publish("after").await.unwrap();
    let mut received = Vec::new();
    while let Some(payload) = slow.recv().await {
        received.push(payload);
    }
    assert_eq!(
        received,
        vec![
            Bytes::from_static(b"0"),
            Bytes::from_static(b"1"),
            Bytes::from_static(b"2"),
            Bytes::from_static(b"3"),
        ]
    );
}

#[tokio::test]
async fn test_unregister_twice_is_harmless() {
    let hub = spawn_hub(8);
    let mut x = hub.register("x".to_string()).await.unwrap();
    let mut y = hub.register("y".to_string()).await.unwrap();

    hub.unregister(&"x".to_string());
    hub.unregister(&"x".to_string());
    hub.unregister(&"never-registered".to_string());

    assert_eq!(hub.members().await.unwrap(), vec!["y".to_string()]);
    assert!(x.recv().await.is_none());

    hub.publish("still flowing").await.unwrap();
    assert_eq!(y.recv().await.unwrap(), Bytes::from_static(b"still flowing"));
}

#[tokio::test]
async fn test_unregister_after_eviction_is_harmless() {
    let hub = spawn_hub(1);
    let _evicted = hub.register("evicted".to_string()).await.unwrap();
    let mut healthy = hub.register("healthy".to_string()).await.unwrap();

    hub.publish("one").await.unwrap();
    assert_eq!(healthy.recv().await.unwrap(), Bytes::from_static(b"one"));
    hub.publish("two").await.unwrap();
    assert_eq!(healthy.recv().await.unwrap(), Bytes::from_static(b"two"));
    assert_eq!(hub.members().await.unwrap(), vec!["healthy".to_string()]);

    hub.unregister(&"evicted".to_string());
    assert_eq!(hub.members().await.unwrap(), vec!["healthy".to_string()]);
}

#[tokio::test]
async fn test_publish_after_immediate_unregister_reaches_nobody() {
    let hub = spawn_hub(8);
    let mut queue = hub.register("short-lived".to_string()).await.unwrap();
    hub.unregister(&"short-lived".to_string());

    hub.publish("nobody listens").await.unwrap();

    assert!(hub.members().await.unwrap().is_empty());
    assert!(queue.recv().await.is_none());
}

#[tokio::test]
async fn test_member_with_dropped_queue_is_removed_on_publish() {
    let hub = spawn_hub(8);
    let queue = hub.register("gone".to_string()).await.unwrap();
    drop(queue);

    hub.publish("ping").await.unwrap();
    assert!(hub.members().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_json_reports_serialization_failure() {
    let hub = spawn_hub(8);
    let mut queue = hub.register("a".to_string()).await.unwrap();

    // JSON object keys must be strings
    let mut invalid = HashMap::new();
    invalid.insert((1u8, 2u8), "value");

    let result = hub.publish_json(&invalid).await;
    assert!(matches!(result, Err(HubError::Serialize(_))));

    assert_eq!(hub.members().await.unwrap().len(), 1);
    assert_eq!(queue.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn test_shutdown_closes_member_queues() {
    let (hub, task) = Hub::spawn(&settings(8));
    let mut queue = hub.register("a".to_string()).await.unwrap();

    hub.shutdown();
    task.await.unwrap();

    assert!(hub.is_shutdown());
    assert!(queue.recv().await.is_none());
    assert!(matches!(hub.publish("late").await, Err(HubError::Closed)));
    assert!(matches!(
        hub.register("b".to_string()).await,
        Err(HubError::Closed)
    ));
}

#[tokio::test]
async fn test_hub_stops_when_all_handles_are_dropped() {
    let (hub, task) = Hub::spawn(&settings(8));
    let mut queue = hub.register("a".to_string()).await.unwrap();

    drop(hub);
    task.await.unwrap();

    assert!(queue.recv().await.is_none());
}

#[test]
fn test_lineage_update_wire_format() {
    let json = serde_json::to_string(&LineageUpdate::node_added("t1")).unwrap();
    assert_eq!(json, r#"{"type":"node_added","id":"t1"}"#);

    let edge = LineageUpdate::edge_added("t1", "t2", "feeds");
    let value = serde_json::to_value(&edge).unwrap();
    assert_eq!(value["type"], "edge_added");
    assert_eq!(value["from"], "t1");
    assert_eq!(value["to"], "t2");
    assert_eq!(value["relation"], "feeds");
    assert!(value.get("properties").is_none());

    let parsed: LineageUpdate =
        serde_json::from_str(r#"{"type":"node_removed","id":"t9"}"#).unwrap();
    assert_eq!(
        parsed,
        LineageUpdate::NodeRemoved {
            id: "t9".to_string()
        }
    );
}
