//! Core behaviour tests
//!
//! Drive a manager directly over in-memory sockets.
//!
//! Run with: cargo test -p integration-tests --test core_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use integration_tests::{
    capped_config, fast_heartbeat_config, started_manager, test_config, unique_room, MemoryClient,
};
use relay_common::GatewayConfig;
use relay_gateway::transport::memory_pair;
use relay_gateway::{
    ConnectOptions, Connection, EventType, Frame, GatewayError, Manager, Message, MessageType, Next,
    RoomOptions,
};
use serde_json::json;

// ============================================================================
// Rooms
// ============================================================================

#[tokio::test]
async fn test_room_capacity_flow() {
    let manager = started_manager(test_config()).unwrap();
    let a = MemoryClient::connect(&manager).await.unwrap();
    let b = MemoryClient::connect(&manager).await.unwrap();

    manager
        .create_room("r1", RoomOptions::new().with_capacity(1))
        .unwrap();

    manager.join_room(a.id(), "r1").unwrap();
    let err = manager.join_room(b.id(), "r1").unwrap_err();
    assert!(matches!(err, GatewayError::RoomFull { capacity: 1, .. }));
    assert_eq!(manager.room_info("r1").unwrap().member_count, 1);

    assert!(manager.leave_room(a.id(), "r1").unwrap());
    manager.join_room(b.id(), "r1").unwrap();
    assert_eq!(manager.room_members("r1").unwrap(), vec![b.id().to_string()]);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_double_join_is_a_conflict() {
    let manager = started_manager(test_config()).unwrap();
    let a = MemoryClient::connect(&manager).await.unwrap();
    let room = unique_room();

    manager.join_room(a.id(), &room).unwrap();
    let err = manager.join_room(a.id(), &room).unwrap_err();
    assert!(matches!(err, GatewayError::AlreadyInRoom { .. }));
    assert_eq!(manager.get_room(&room).unwrap().member_count(), 1);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_room_broadcast_excludes_sender() {
    let manager = started_manager(test_config()).unwrap();
    let room = unique_room();

    let mut clients = Vec::new();
    for _ in 0..3 {
        let client = MemoryClient::connect(&manager).await.unwrap();
        manager.join_room(client.id(), &room).unwrap();
        clients.push(client);
    }

    let frame = Frame::message(&Message::notify("chat", json!("hi"))).unwrap();
    let report = manager
        .broadcast_to_room(&room, frame, Some(clients[0].id()))
        .await
        .unwrap();
    assert_eq!(report.targets, 2);
    assert_eq!(report.delivered, 2);

    for client in &mut clients[1..] {
        let message = client.recv().await.unwrap();
        assert_eq!(message.kind, MessageType::Notify);
        assert_eq!(message.event, "chat");
    }
    assert!(clients[0].expect_silence(Duration::from_millis(100)).await);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_closing_connection_leaves_all_rooms() {
    let manager = started_manager(test_config()).unwrap();
    let client = MemoryClient::connect(&manager).await.unwrap();
    let rooms: Vec<String> = (0..3).map(|_| unique_room()).collect();

    for room in &rooms {
        manager.join_room(client.id(), room).unwrap();
    }
    client.connection.close().await;

    for room in &rooms {
        assert_eq!(manager.get_room(room).unwrap().member_count(), 0);
    }
    assert_eq!(manager.connection_count(), 0);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_delete_room_evicts_members() {
    let manager = started_manager(test_config()).unwrap();
    let client = MemoryClient::connect(&manager).await.unwrap();
    let room = unique_room();

    manager.join_room(client.id(), &room).unwrap();
    manager.delete_room(&room).unwrap();

    assert!(manager.get_room(&room).is_none());
    assert!(!client.connection.is_in_room(&room));
    assert!(matches!(
        manager.delete_room(&room),
        Err(GatewayError::RoomNotFound(_))
    ));

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

// ============================================================================
// Protocol
// ============================================================================

#[tokio::test]
async fn test_invalid_messages_close_only_the_offender() {
    let manager = started_manager(test_config()).unwrap();
    let mut offender = MemoryClient::connect(&manager).await.unwrap();
    let mut bystander = MemoryClient::connect(&manager).await.unwrap();

    for _ in 0..11 {
        offender.send(Frame::from("not json")).await.unwrap();
    }

    assert_eq!(offender.recv_close().await.unwrap(), Some(1008));
    assert!(offender.connection.is_closed());

    bystander
        .request("echo", "r1", json!({"text": "fine"}))
        .await
        .unwrap();
    let reply = bystander.recv().await.unwrap();
    assert_eq!(reply.code, Some(200));
    assert_eq!(manager.connection_count(), 1);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_message_threshold_boundary() {
    let manager = started_manager(test_config()).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    for _ in 0..10 {
        client.send(Frame::from("not json")).await.unwrap();
        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageType::Error);
        assert_eq!(reply.code, Some(400));
    }
    assert!(!client.connection.is_closed());
    assert_eq!(manager.connection_count(), 1);

    client.send(Frame::from("not json")).await.unwrap();
    assert_eq!(client.recv_close().await.unwrap(), Some(1008));
    assert!(client.connection.is_closed());
    assert_eq!(manager.connection_count(), 0);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_valid_message_resets_invalid_counter() {
    let manager = started_manager(test_config()).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    for round in 0..3 {
        for _ in 0..8 {
            client.send(Frame::from("{")).await.unwrap();
            let reply = client.recv().await.unwrap();
            assert_eq!(reply.kind, MessageType::Error);
        }
        let id = format!("r{round}");
        client.request("echo", &id, json!({"text": "ok"})).await.unwrap();
        let reply = client.recv().await.unwrap();
        assert_eq!(reply.request_id.as_deref(), Some(id.as_str()));
    }

    assert!(!client.connection.is_closed());
    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_binary_frames_are_decoded() {
    let manager = started_manager(test_config()).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    let request = Message::request("echo", "b1", json!({"text": "bin"}));
    client
        .send(Frame::Binary(request.to_json().unwrap().into_bytes()))
        .await
        .unwrap();

    let reply = client.recv().await.unwrap();
    assert_eq!(reply.request_id.as_deref(), Some("b1"));
    assert_eq!(reply.data, Some(json!({"text": "bin"})));

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_timeout_closes_silent_client() {
    let manager = started_manager(fast_heartbeat_config()).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    assert_eq!(client.recv_close().await.unwrap(), Some(1001));
    assert!(client.connection.is_closed());
    assert_eq!(manager.connection_count(), 0);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_pong_keeps_client_alive() {
    let manager = started_manager(fast_heartbeat_config()).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while tokio::time::Instant::now() < deadline {
        match client.next_frame().await.unwrap() {
            Frame::Ping(data) => client.send(Frame::Pong(data)).await.unwrap(),
            Frame::Close(close) => panic!("closed while answering pings: {close:?}"),
            _ => {}
        }
    }

    assert!(!client.connection.is_closed());
    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pings_continue_while_queue_is_busy() {
    let config = GatewayConfig {
        send_queue_size: 8,
        ..fast_heartbeat_config()
    };
    let manager = started_manager(config).unwrap();
    let mut client = MemoryClient::connect(&manager).await.unwrap();

    let connection = Arc::clone(&client.connection);
    let producer = tokio::spawn(async move {
        while !connection.is_closed() {
            let _ = connection.send(Frame::from("load"));
            tokio::task::yield_now().await;
        }
    });

    let mut pings = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while tokio::time::Instant::now() < deadline {
        match client.next_frame().await.unwrap() {
            Frame::Ping(data) => {
                pings += 1;
                client.send(Frame::Pong(data)).await.unwrap();
            }
            Frame::Close(close) => panic!("closed while answering pings: {close:?}"),
            _ => {}
        }
    }

    assert!(pings >= 3);
    assert!(!client.connection.is_closed());

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
    producer.await.unwrap();
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_middleware_applies_after_freeze() {
    let manager = Manager::new(test_config()).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));

    manager
        .register("whoami", |conn: Arc<Connection>, message: Message| async move {
            Ok::<_, GatewayError>(message.reply(json!({"id": conn.id()})))
        })
        .unwrap();

    let counter = Arc::clone(&seen);
    manager
        .use_middleware(move |conn: Arc<Connection>, message: Message, next: Next| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if message.event == "whoami" && conn.user_id().is_none() {
                    return Ok(Some(Message::error(message.request_id.clone(), 401, "anonymous")));
                }
                next.run(conn, message).await
            }
        })
        .unwrap();

    manager.start();
    assert!(matches!(
        manager.register("late", |_conn: Arc<Connection>, _message: Message| async move {
            Ok::<Option<Message>, GatewayError>(None)
        }),
        Err(GatewayError::RouterFrozen)
    ));

    let mut anonymous = MemoryClient::connect(&manager).await.unwrap();
    anonymous.request("whoami", "w1", json!({})).await.unwrap();
    assert_eq!(anonymous.recv().await.unwrap().code, Some(401));

    let mut named = MemoryClient::connect_with(&manager, ConnectOptions::new().with_user_id("u1"))
        .await
        .unwrap();
    named.request("whoami", "w2", json!({})).await.unwrap();
    let reply = named.recv().await.unwrap();
    assert_eq!(reply.code, Some(200));
    assert_eq!(reply.data, Some(json!({"id": named.id()})));

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

// ============================================================================
// Capacity and concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upgrades_respect_cap() {
    let manager = started_manager(capped_config(10)).unwrap();

    let attempts: Vec<_> = (0..50)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let (server, client) = memory_pair();
                let result = manager.handle_upgrade(server, ConnectOptions::new()).await;
                (result.is_ok(), client)
            })
        })
        .collect();

    let mut accepted = 0;
    let mut clients = Vec::new();
    for attempt in attempts {
        let (ok, client) = attempt.await.unwrap();
        if ok {
            accepted += 1;
        }
        clients.push(client);
    }

    assert_eq!(accepted, 10);
    assert_eq!(manager.connection_count(), 10);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_user_and_global_broadcast() {
    let manager = started_manager(test_config()).unwrap();
    let mut alice_1 = MemoryClient::connect_with(&manager, ConnectOptions::new().with_user_id("alice"))
        .await
        .unwrap();
    let mut alice_2 = MemoryClient::connect_with(&manager, ConnectOptions::new().with_user_id("alice"))
        .await
        .unwrap();
    let mut bob = MemoryClient::connect(&manager).await.unwrap();

    let frame = Frame::message(&Message::notify("dm", json!("psst"))).unwrap();
    assert_eq!(manager.broadcast_to_user("alice", frame).await.unwrap(), 2);
    assert_eq!(alice_1.recv().await.unwrap().event, "dm");
    assert_eq!(alice_2.recv().await.unwrap().event, "dm");
    assert!(bob.expect_silence(Duration::from_millis(100)).await);

    let frame = Frame::message(&Message::notify("all", json!(null))).unwrap();
    assert_eq!(manager.broadcast(frame).await.unwrap(), 3);
    assert_eq!(bob.recv().await.unwrap().event, "all");

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

// ============================================================================
// Events and shutdown
// ============================================================================

#[tokio::test]
async fn test_panicking_subscriber_does_not_stop_bus() {
    let manager = Manager::new(test_config()).unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));

    manager.subscribe(EventType::Connected, |_| panic!("subscriber failure"));
    let counter = Arc::clone(&delivered);
    manager.subscribe(EventType::Connected, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    manager.start();

    let _a = MemoryClient::connect(&manager).await.unwrap();
    let _b = MemoryClient::connect(&manager).await.unwrap();

    for _ in 0..100 {
        if delivered.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 2);

    manager.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_empties_registry_and_refuses_upgrades() {
    let manager = started_manager(test_config()).unwrap();
    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(MemoryClient::connect(&manager).await.unwrap());
    }

    manager.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(manager.connection_count(), 0);
    for client in &mut clients {
        assert_eq!(client.recv_close().await.unwrap(), Some(1001));
    }

    let (server, _client) = memory_pair();
    assert!(matches!(
        manager.handle_upgrade(server, ConnectOptions::new()).await,
        Err(GatewayError::ShuttingDown)
    ));
    assert!(manager.stats().shutting_down);
}
