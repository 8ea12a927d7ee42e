//! WebSocket gateway tests
//!
//! Each test starts a gateway on an ephemeral port and talks to it over a
//! real WebSocket.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{capped_config, unique_room, TestServer, WsClient};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite;

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_stats() {
    let server = TestServer::start().await.expect("Failed to start server");
    let _client = server.connect().await.unwrap();

    let response = server.get("/health").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = response.json().await.unwrap();
    assert_eq!(stats["connections"], 1);
    assert_eq!(stats["router_frozen"], true);
    assert_eq!(stats["shutting_down"], false);

    server.stop().await.unwrap();
}

// ============================================================================
// Request / response
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect().await.unwrap();

    client
        .send_text(r#"{"type":"request","event":"echo","request_id":"r1","data":{"text":"hi"}}"#)
        .await
        .unwrap();

    let reply = client.recv().await.unwrap();
    let reply = serde_json::to_value(&reply).unwrap();
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["request_id"], "r1");
    assert_eq!(reply["code"], 200);
    assert_eq!(reply["data"], json!({"text": "hi"}));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_bad_payload_and_unknown_event_keep_socket_open() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut client = server.connect().await.unwrap();

    let reply = client.call("echo", "r1", json!({"nope": 1})).await.unwrap();
    assert_eq!(reply.code, Some(400));

    let reply = client.call("missing", "r2", json!({})).await.unwrap();
    assert_eq!(reply.code, Some(404));

    let reply = client.call("echo", "r3", json!({"text": "still here"})).await.unwrap();
    assert_eq!(reply.code, Some(200));
    assert_eq!(reply.data, Some(json!({"text": "still here"})));

    server.stop().await.unwrap();
}

// ============================================================================
// Rooms
// ============================================================================

#[tokio::test]
async fn test_room_chat() {
    let server = TestServer::start().await.expect("Failed to start server");
    let room = unique_room();

    let mut alice = server.connect_as("alice").await.unwrap();
    let mut bob = server.connect_as("bob").await.unwrap();

    for (client, id) in [(&mut alice, "j1"), (&mut bob, "j2")] {
        let reply = client.call("join", id, json!({"room": room})).await.unwrap();
        assert_eq!(reply.code, Some(200));
    }

    let reply = alice
        .call("say", "s1", json!({"room": room, "text": "hello"}))
        .await
        .unwrap();
    assert_eq!(reply.data, Some(json!({"delivered": 1})));

    let notice = bob.recv().await.unwrap();
    assert_eq!(notice.event, "message");
    let data = notice.data.unwrap();
    assert_eq!(data["text"], "hello");
    assert_eq!(data["user_id"], "alice");
    assert_eq!(data["from"], alice.connection_id.as_str());

    let reply = alice.call("join", "j3", json!({"room": room})).await.unwrap();
    assert_eq!(reply.code, Some(409));

    server.stop().await.unwrap();
}

// ============================================================================
// Capacity and shutdown
// ============================================================================

#[tokio::test]
async fn test_upgrade_refused_at_capacity() {
    let server = TestServer::start_with_config(capped_config(1))
        .await
        .expect("Failed to start server");
    let _first = server.connect().await.unwrap();

    match tokio_tungstenite::connect_async(server.ws_url(None)).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
    assert_eq!(server.manager.connection_count(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let server = TestServer::start().await.expect("Failed to start server");
    let client = server.connect().await.unwrap();
    assert_eq!(server.manager.connection_count(), 1);

    client.close().await.unwrap();

    for _ in 0..100 {
        if server.manager.connection_count() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(server.manager.connection_count(), 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_sockets_with_going_away() {
    let server = TestServer::start().await.expect("Failed to start server");
    let mut clients: Vec<WsClient> = Vec::new();
    for _ in 0..3 {
        clients.push(server.connect().await.unwrap());
    }

    let manager = std::sync::Arc::clone(&server.manager);
    server.stop().await.unwrap();

    for client in &mut clients {
        assert_eq!(client.recv_close().await.unwrap(), Some(1001));
    }
    assert_eq!(manager.connection_count(), 0);
    assert!(manager.is_shutting_down());
}
