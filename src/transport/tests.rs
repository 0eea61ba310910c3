use crate::config::Settings;
use crate::hub::Hub;
use crate::transport::frame::{coalesce, into_frame, split_frame};
use crate::transport::message::ServerMessage;
use crate::transport::serve;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

#[test]
fn test_connected_notice_format() {
    let json = serde_json::to_string(&ServerMessage::connected()).unwrap();
    assert_eq!(
        json,
        r#"{"type":"connected","message":"WebSocket connection established"}"#
    );
}

#[tokio::test]
async fn test_coalesce_single_payload() {
    let (_tx, mut rx) = mpsc::channel::<Bytes>(8);
    let (frame, count) = coalesce(Bytes::from_static(b"only"), &mut rx);
    assert_eq!(count, 1);
    assert_eq!(frame, WsMessage::text("only"));
}

#[tokio::test]
async fn test_coalesce_joins_already_queued_payloads_in_order() {
    let (tx, mut rx) = mpsc::channel::<Bytes>(8);
    for payload in ["a", "b", "c"] {
        tx.try_send(Bytes::from(payload)).unwrap();
    }

    let first = rx.recv().await.unwrap();
    let (frame, count) = coalesce(first, &mut rx);
    assert_eq!(count, 3);
    assert_eq!(frame, WsMessage::text("a\nb\nc"));

    // later arrivals go into the next frame
    tx.try_send(Bytes::from_static(b"d")).unwrap();
    let next = rx.recv().await.unwrap();
    let (frame, count) = coalesce(next, &mut rx);
    assert_eq!(count, 1);
    assert_eq!(frame, WsMessage::text("d"));
}

#[test]
fn test_non_utf8_payload_goes_out_as_binary() {
    let frame = into_frame(vec![0xff, 0xfe, b'x']);
    assert_eq!(frame, WsMessage::binary(vec![0xff, 0xfe, b'x']));
}

#[test]
fn test_split_frame() {
    let parts: Vec<&[u8]> = split_frame(b"{\"a\":1}\n{\"b\":2}").collect();
    assert_eq!(parts, vec![&b"{\"a\":1}"[..], &b"{\"b\":2}"[..]]);
}

#[tokio::test]
async fn test_upgrade_on_configured_path() {
    let settings = Settings::default();
    let (hub, _hub_task) = Hub::spawn(&settings.hub);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, hub.clone(), settings));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("upgrade succeeds");

    let notice = ws.next().await.unwrap().unwrap();
    let notice: ServerMessage = serde_json::from_str(notice.to_text().unwrap()).unwrap();
    assert_eq!(notice, ServerMessage::connected());
    assert_eq!(hub.members().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upgrade_rejects_other_paths() {
    let settings = Settings::default();
    let (hub, _hub_task) = Hub::spawn(&settings.hub);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, hub.clone(), settings));

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/elsewhere")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        Err(e) => panic!("expected a 404 response, got {e}"),
        Ok(_) => panic!("upgrade on an unknown path should be rejected"),
    }
    assert!(hub.members().await.unwrap().is_empty());
}
