//! Signaling handler: frame parsing, validation and dispatch to the registry.

mod test_utils;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use callroom_backend::{
    websocket::SignalingHandler, AppError, ConnectionState, MemoryStore, RegistryConfig,
    RoomRegistry, SessionStore,
};
use callroom_common::ServerEvent;
use serde_json::json;
use test_utils::{connect, drain, spawn_registry, user_joined, Events, FlakyStore};

const MAX_CHAT_LENGTH: usize = 4096;

async fn handler(registry: &RoomRegistry) -> (SignalingHandler, Events) {
    let (conn, rx) = connect(registry).await;
    (SignalingHandler::new(registry.clone(), conn, MAX_CHAT_LENGTH), rx)
}

async fn joined_pair(registry: &RoomRegistry, room_id: &str) -> ((SignalingHandler, Events), (SignalingHandler, Events)) {
    let (alice, mut alice_rx) = handler(registry).await;
    let (bob, mut bob_rx) = handler(registry).await;

    alice
        .handle_text(&json!({"type": "join-room", "roomId": room_id, "userId": "alice"}).to_string())
        .await
        .unwrap();
    bob.handle_text(&json!({"type": "join-room", "roomId": room_id, "userId": "bob"}).to_string())
        .await
        .unwrap();

    drain(&mut alice_rx);
    drain(&mut bob_rx);
    ((alice, alice_rx), (bob, bob_rx))
}

#[tokio::test]
async fn test_join_frame_joins_room() {
    let (registry, _store) = spawn_registry();
    let (alice, mut alice_rx) = handler(&registry).await;

    alice
        .handle_text(r#"{"type":"join-room","roomId":"ABC123","userId":"alice"}"#)
        .await
        .unwrap();

    assert_eq!(drain(&mut alice_rx), vec![user_joined("ABC123", 1, "alice")]);
    assert_eq!(
        registry.connection_state(alice.conn()).await.unwrap(),
        ConnectionState::Joined {
            room_id: "ABC123".to_string(),
            user_id: "alice".to_string()
        }
    );
}

#[tokio::test]
async fn test_chat_reaches_everyone_including_sender() {
    let (registry, store) = spawn_registry();
    let ((alice, mut alice_rx), (_bob, mut bob_rx)) = joined_pair(&registry, "CHAT01").await;

    alice
        .handle_text(r#"{"type":"chat-message","sender":"Dr. A","content":"hi","roomId":"CHAT01"}"#)
        .await
        .unwrap();

    let stored = store.get_messages_by_room("CHAT01").await.unwrap();
    assert_eq!(stored.len(), 1);
    let expected = ServerEvent::ChatMessage {
        room_id: "CHAT01".to_string(),
        sender: "Dr. A".to_string(),
        content: "hi".to_string(),
        timestamp: stored[0].timestamp.timestamp_millis(),
    };
    assert_eq!(drain(&mut alice_rx), vec![expected.clone()]);
    assert_eq!(drain(&mut bob_rx), vec![expected]);
}

#[tokio::test]
async fn test_chat_before_join_is_dropped() {
    let (registry, store) = spawn_registry();
    let (alice, mut alice_rx) = handler(&registry).await;

    alice
        .handle_text(r#"{"type":"chat-message","sender":"A","content":"anyone?"}"#)
        .await
        .unwrap();

    assert!(drain(&mut alice_rx).is_empty());
    assert!(store.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offer_is_relayed_to_peer_only() {
    let (registry, _store) = spawn_registry();
    let ((alice, mut alice_rx), (_bob, mut bob_rx)) = joined_pair(&registry, "SIG01").await;

    let frame = json!({
        "type": "webrtc-offer",
        "offer": {"type": "offer", "sdp": "v=0..."},
        "roomId": "SIG01",
        "userId": "mallory",
        "mid": 3
    });
    alice.handle_text(&frame.to_string()).await.unwrap();

    assert!(drain(&mut alice_rx).is_empty());
    let received = drain(&mut bob_rx);
    assert_eq!(received.len(), 1);
    assert_eq!(
        serde_json::to_value(&received[0]).unwrap(),
        json!({
            "type": "webrtc-offer",
            "offer": {"type": "offer", "sdp": "v=0..."},
            "roomId": "SIG01",
            "userId": "alice",
            "mid": 3
        })
    );
}

#[tokio::test]
async fn test_answer_and_candidate_relay() {
    let (registry, _store) = spawn_registry();
    let ((alice, mut alice_rx), (bob, mut bob_rx)) = joined_pair(&registry, "SIG02").await;

    bob.handle_text(r#"{"type":"webrtc-answer","answer":{"type":"answer","sdp":"x"}}"#)
        .await
        .unwrap();
    bob.handle_text(r#"{"type":"webrtc-ice-candidate","candidate":{"candidate":"c1"}}"#)
        .await
        .unwrap();

    let received = drain(&mut alice_rx);
    assert!(matches!(
        &received[..],
        [
            ServerEvent::WebrtcAnswer { user_id: a, .. },
            ServerEvent::WebrtcIceCandidate { user_id: b, .. },
        ] if a == "bob" && b == "bob"
    ));
    assert!(drain(&mut bob_rx).is_empty());

    // alone in a room, nobody receives the relay
    alice.handle_text(r#"{"type":"leave-room"}"#).await.unwrap();
    drain(&mut bob_rx);
    bob.handle_text(r#"{"type":"webrtc-ice-candidate","candidate":null}"#)
        .await
        .unwrap();
    assert!(drain(&mut alice_rx).is_empty());
}

#[tokio::test]
async fn test_bad_frames_are_rejected_without_side_effects() {
    let (registry, _store) = spawn_registry();
    let (alice, mut alice_rx) = handler(&registry).await;

    let malformed = [
        "not json",
        "[1,2,3]",
        r#"{"roomId":"ABC"}"#,
        r#"{"type":"join-room"}"#,
        r#"{"type":"join-room","roomId":"has space"}"#,
        r#"{"type":"join-room","roomId":"ok","userId":""}"#,
        r#"{"type":"chat-message","sender":"A","content":"   "}"#,
        r#"{"type":"chat-message","sender":"","content":"hi"}"#,
    ];
    for frame in malformed {
        let result = alice.handle_text(frame).await;
        assert!(
            matches!(result, Err(AppError::MalformedMessage(_))),
            "{frame} gave {result:?}"
        );
    }

    for frame in [r#"{"type":"dance"}"#, r#"{"type":"user-joined","roomId":"X"}"#] {
        let result = alice.handle_text(frame).await;
        assert!(
            matches!(result, Err(AppError::UnknownMessageType(_))),
            "{frame} gave {result:?}"
        );
    }

    assert!(drain(&mut alice_rx).is_empty());

    // the handler keeps working afterwards
    alice
        .handle_text(r#"{"type":"join-room","roomId":"ok"}"#)
        .await
        .unwrap();
    assert_eq!(drain(&mut alice_rx).len(), 1);
}

#[tokio::test]
async fn test_oversized_chat_is_malformed() {
    let (registry, _store) = spawn_registry();
    let (conn, _rx) = connect(&registry).await;
    let small = SignalingHandler::new(registry.clone(), conn, 5);

    let result = small
        .handle_text(r#"{"type":"chat-message","sender":"A","content":"too long"}"#)
        .await;
    assert!(matches!(result, Err(AppError::MalformedMessage(_))));
}

#[tokio::test]
async fn test_third_join_reports_room_full() {
    let (registry, _store) = spawn_registry();
    let _pair = joined_pair(&registry, "FULL01").await;
    let (carol, mut carol_rx) = handler(&registry).await;

    let result = carol
        .handle_text(r#"{"type":"join-room","roomId":"FULL01","userId":"carol"}"#)
        .await;

    assert!(matches!(result, Err(AppError::RoomFull(ref room)) if room == "FULL01"));
    assert_eq!(
        drain(&mut carol_rx),
        vec![ServerEvent::RoomFull {
            room_id: "FULL01".to_string()
        }]
    );
}

#[tokio::test]
async fn test_leave_frame_notifies_peer() {
    let (registry, _store) = spawn_registry();
    let ((alice, _alice_rx), (_bob, mut bob_rx)) = joined_pair(&registry, "LEAVE1").await;

    alice
        .handle_text(r#"{"type":"leave-room","roomId":"LEAVE1"}"#)
        .await
        .unwrap();

    assert_eq!(
        drain(&mut bob_rx),
        vec![ServerEvent::UserLeft {
            room_id: "LEAVE1".to_string(),
            participant_count: 1,
            user_id: "alice".to_string()
        }]
    );
    assert_eq!(
        registry.connection_state(alice.conn()).await.unwrap(),
        ConnectionState::Connected
    );
}

#[tokio::test]
async fn test_chat_storage_failure_drops_message() {
    let store = Arc::new(FlakyStore::default());
    let registry = RoomRegistry::spawn(store.clone(), RegistryConfig::default());
    let ((alice, mut alice_rx), (_bob, mut bob_rx)) = joined_pair(&registry, "FAIL01").await;

    store.fail_messages.store(true, Ordering::SeqCst);
    let result = alice
        .handle_text(r#"{"type":"chat-message","sender":"A","content":"lost"}"#)
        .await;

    assert!(matches!(result, Err(AppError::Storage(_))));
    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut bob_rx).is_empty());
    assert!(store.get_messages_by_room("FAIL01").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_handler_on_custom_store() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let registry = RoomRegistry::spawn(store.clone(), RegistryConfig::default());
    let ((alice, _), _) = joined_pair(&registry, "CUSTOM").await;

    alice
        .handle_text(r#"{"type":"chat-message","sender":"A","content":"one"}"#)
        .await
        .unwrap();
    alice
        .handle_text(r#"{"type":"chat-message","sender":"A","content":"two"}"#)
        .await
        .unwrap();

    let contents: Vec<_> = store
        .get_messages_by_room("CUSTOM")
        .await
        .unwrap()
        .into_iter()
        .map(|message| message.content)
        .collect();
    assert_eq!(contents, vec!["one", "two"]);
}
