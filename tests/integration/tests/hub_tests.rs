//! Hub integration tests
//!
//! Each test starts its own hub on an ephemeral port.
//!
//! Run with: cargo test -p integration-tests --test hub_tests

use std::time::Duration;

use collab_client::{ClientEvent, ProposalSocket};
use collab_common::{ClientMessage, CloseCode, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use integration_tests::{
    assert_json, assert_status, expect_no_invalidation, next_event, next_invalidation,
    presence_until, snapshot, RawSocket, TestServer, EVENT_TIMEOUT,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

/// Next hub frame on a raw socket, skipping control frames
async fn next_frame(socket: &mut RawSocket) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(EVENT_TIMEOUT, socket.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return ServerMessage::from_json(&text).expect("hub frame");
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_empty_hub() {
    let server = TestServer::start().await.unwrap();

    let health = server.health().await.unwrap();
    assert_eq!(health, json!({"status": "ok", "rooms": 0, "connections": 0}));
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_presence_follows_joins_tab_changes_and_leaves() {
    let server = TestServer::start().await.unwrap();

    let mut alice = server.connect("P1", "Alice", "wbs").await.unwrap();
    presence_until(&mut alice, &snapshot(&[("wbs", "Alice")])).await.unwrap();

    let mut bob = server.connect("P1", "Bob", "pricing").await.unwrap();
    let both = snapshot(&[("wbs", "Alice"), ("pricing", "Bob")]);
    presence_until(&mut alice, &both).await.unwrap();
    presence_until(&mut bob, &both).await.unwrap();

    assert!(bob.change_tab("wbs").await.unwrap());
    let together = snapshot(&[("wbs", "Alice"), ("wbs", "Bob")]);
    presence_until(&mut alice, &together).await.unwrap();
    presence_until(&mut bob, &together).await.unwrap();

    alice.close().await.unwrap();
    presence_until(&mut bob, &snapshot(&[("wbs", "Bob")])).await.unwrap();
    server.wait_for_load(1, 1).await.unwrap();
}

#[tokio::test]
async fn test_repeated_tab_change_publishes_once() {
    let server = TestServer::start().await.unwrap();
    let mut watcher = server.connect("P1", "Bob", "wbs").await.unwrap();
    let mut raw = server.connect_raw("P1", "Alice", "wbs").await.unwrap();
    presence_until(&mut watcher, &snapshot(&[("wbs", "Bob"), ("wbs", "Alice")]))
        .await
        .unwrap();

    let frame = ClientMessage::tab_change("pricing").to_json().unwrap();
    raw.send(Message::Text(frame.clone())).await.unwrap();
    raw.send(Message::Text(frame)).await.unwrap();

    // The change notification acts as a fence behind both tab changes
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.notify_change("P1", "drawings", None).await.unwrap();

    let mut presence_updates = 0;
    loop {
        match next_event(&mut watcher).await.unwrap() {
            ClientEvent::Presence { presence, .. } => {
                assert_eq!(presence, snapshot(&[("wbs", "Bob"), ("pricing", "Alice")]));
                presence_updates += 1;
            }
            ClientEvent::Invalidate { table, .. } => {
                assert_eq!(table, "drawings");
                break;
            }
            ClientEvent::Closed { .. } => panic!("watcher closed"),
        }
    }
    assert_eq!(presence_updates, 1);
}

#[tokio::test]
async fn test_presence_endpoint() {
    let server = TestServer::start().await.unwrap();
    let token = server.token("Carol");

    let empty: Value = assert_json(
        server.get_auth("/api/proposals/P9/presence", &token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(empty, json!({"proposal_id": "P9", "version": 0, "presence": {}}));

    let mut alice = server.connect("P9", "Alice", "schedule").await.unwrap();
    presence_until(&mut alice, &snapshot(&[("schedule", "Alice")])).await.unwrap();

    let current: Value = assert_json(
        server.get_auth("/api/proposals/P9/presence", &token).await.unwrap(),
        StatusCode::OK,
    )
    .await
    .unwrap();
    assert_eq!(current["presence"], json!({"schedule": ["Alice"]}));
    assert_eq!(current["version"], 1);

    let anonymous = server.get("/api/proposals/P9/presence").await.unwrap();
    assert_status(anonymous, StatusCode::UNAUTHORIZED).await.unwrap();
}

// ============================================================================
// Change notifications
// ============================================================================

#[tokio::test]
async fn test_change_reaches_document_members_only() {
    let server = TestServer::start().await.unwrap();
    let mut alice = server.connect("P1", "Alice", "wbs").await.unwrap();
    let mut bob = server.connect("P1", "Bob", "pricing").await.unwrap();
    let mut carol = server.connect("P2", "Carol", "wbs").await.unwrap();
    server.wait_for_load(2, 3).await.unwrap();

    let response = server.notify_change("P1", "wbs_items", None).await.unwrap();
    let body: Value = assert_json(response, StatusCode::ACCEPTED).await.unwrap();
    assert_eq!(body["delivered"], 2);

    let expected = ("wbs_items".to_string(), Some("wbs"));
    assert_eq!(next_invalidation(&mut alice).await.unwrap(), expected);
    assert_eq!(next_invalidation(&mut bob).await.unwrap(), expected);
    expect_no_invalidation(&mut carol, Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_skips_origin_session() {
    let server = TestServer::start().await.unwrap();
    let mut alice = server.connect("P1", "Alice", "pricing").await.unwrap();
    let mut bob = server.connect("P1", "Bob", "pricing").await.unwrap();
    server.wait_for_load(1, 2).await.unwrap();

    let response = server
        .notify_change("P1", "pricing_rows", Some(alice.session_id()))
        .await
        .unwrap();
    let body: Value = assert_json(response, StatusCode::ACCEPTED).await.unwrap();
    assert_eq!(body["delivered"], 1);

    assert_eq!(
        next_invalidation(&mut bob).await.unwrap(),
        ("pricing_rows".to_string(), Some("pricing"))
    );
    expect_no_invalidation(&mut alice, Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_change_without_listeners() {
    let server = TestServer::start().await.unwrap();

    let response = server.notify_change("nobody-here", "drawings", None).await.unwrap();
    let body: Value = assert_json(response, StatusCode::ACCEPTED).await.unwrap();
    assert_eq!(body["delivered"], 0);
    server.wait_for_load(0, 0).await.unwrap();
}

#[tokio::test]
async fn test_change_request_validation() {
    let server = TestServer::start().await.unwrap();

    let anonymous = server
        .post("/api/proposals/P1/changes", &json!({"table": "wbs_items"}))
        .await
        .unwrap();
    assert_status(anonymous, StatusCode::UNAUTHORIZED).await.unwrap();

    let empty = server.notify_change("P1", "  ", None).await.unwrap();
    let body: Value = assert_json(empty, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_invalid_token_rejected_before_upgrade() {
    let server = TestServer::start().await.unwrap();

    let config = collab_client::ClientConfig::new(server.ws_url(), "P1", "not-a-token");
    let err = ProposalSocket::connect(config).await.unwrap_err();
    assert!(err.is_unauthorized(), "unexpected error: {err}");

    let url = format!("{}/ws/proposals/P1", server.ws_url());
    let err = tokio_tungstenite::connect_async(url.as_str()).await.unwrap_err();
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref response) if response.status() == 401
    ));

    server.wait_for_load(0, 0).await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let server = TestServer::start().await.unwrap();
    let mut raw = server.connect_raw("P1", "Alice", "wbs").await.unwrap();

    assert!(matches!(next_frame(&mut raw).await, ServerMessage::Hello { .. }));
    assert!(matches!(next_frame(&mut raw).await, ServerMessage::Presence { version: 1, .. }));

    raw.send(Message::Text("definitely not json".to_string())).await.unwrap();
    raw.send(Message::Text(r#"{"type":"delete_everything"}"#.to_string())).await.unwrap();
    raw.send(Message::Binary(vec![0xde, 0xad])).await.unwrap();
    raw.send(Message::Text(ClientMessage::tab_change("pricing").to_json().unwrap()))
        .await
        .unwrap();

    match next_frame(&mut raw).await {
        ServerMessage::Presence { version, presence } => {
            assert_eq!(version, 2);
            assert_eq!(presence, snapshot(&[("pricing", "Alice")]));
        }
        other => panic!("expected presence, got {other}"),
    }

    raw.send(Message::Text(ClientMessage::Heartbeat.to_json().unwrap())).await.unwrap();
    assert_eq!(next_frame(&mut raw).await, ServerMessage::HeartbeatAck);
}

#[tokio::test]
async fn test_room_removed_after_last_leave() {
    let server = TestServer::start().await.unwrap();

    let alice = server.connect("P1", "Alice", "wbs").await.unwrap();
    let bob = server.connect("P1", "Bob", "wbs").await.unwrap();
    server.wait_for_load(1, 2).await.unwrap();

    alice.close().await.unwrap();
    server.wait_for_load(1, 1).await.unwrap();

    drop(bob);
    server.wait_for_load(0, 0).await.unwrap();

    // A fresh join after teardown gets a fresh room
    let mut carol = server.connect("P1", "Carol", "scope").await.unwrap();
    presence_until(&mut carol, &snapshot(&[("scope", "Carol")])).await.unwrap();
    server.wait_for_load(1, 1).await.unwrap();
}

#[tokio::test]
async fn test_idle_connection_closed() {
    let server = TestServer::start_with(&[
        ("HUB_HEARTBEAT_INTERVAL_MS", "100"),
        ("HUB_IDLE_TIMEOUT_MS", "300"),
    ])
    .await
    .unwrap();

    let config = server.client_config("P1", "Alice", "wbs").without_heartbeat();
    let mut idle = ProposalSocket::connect(config).await.unwrap();

    let code = loop {
        if let ClientEvent::Closed { code } = next_event(&mut idle).await.unwrap() {
            break code;
        }
    };
    assert_eq!(code, Some(CloseCode::IdleTimeout.as_u16()));
    server.wait_for_load(0, 0).await.unwrap();
}

#[tokio::test]
async fn test_heartbeats_keep_connection_alive() {
    let server = TestServer::start_with(&[
        ("HUB_HEARTBEAT_INTERVAL_MS", "100"),
        ("HUB_IDLE_TIMEOUT_MS", "300"),
    ])
    .await
    .unwrap();

    let mut alice = server.connect("P1", "Alice", "wbs").await.unwrap();
    assert_eq!(alice.heartbeat_interval(), Duration::from_millis(100));

    tokio::time::sleep(Duration::from_millis(900)).await;
    server.notify_change("P1", "deliverables", None).await.unwrap();

    assert_eq!(
        next_invalidation(&mut alice).await.unwrap(),
        ("deliverables".to_string(), Some("deliverables"))
    );
    server.wait_for_load(1, 1).await.unwrap();
}
