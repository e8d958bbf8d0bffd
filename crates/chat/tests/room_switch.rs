//! Switching rooms.

use std::{sync::Arc, time::Duration};

use assert_matches::assert_matches;
use peerchat_chat::{
    ChatError, ChatRoom, LogSink, SessionConfig, SessionContext, SessionState, SubstrateError,
    substrate::loopback::LoopbackHub, topic_name,
};
use peerchat_net::PeerId;
use peerchat_tasks::{CancelToken, TaskExecutor};
use tokio::time::{sleep, timeout};

fn context(hub: &LoopbackHub, config: SessionConfig) -> SessionContext {
    let peer = PeerId::random();
    let (logs, _) = LogSink::channel();
    SessionContext {
        pubsub: Arc::new(hub.pubsub(peer)),
        local_peer: peer,
        logs,
        executor: TaskExecutor::current(),
        cancel: CancelToken::new(),
        config,
    }
}

#[tokio::test]
async fn test_switch_moves_all_traffic_to_new_room() {
    let hub = LoopbackHub::new();
    let mut alice = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "alice")
        .await
        .unwrap();
    let mut bob = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "bob")
        .await
        .unwrap();
    let mut carol = ChatRoom::join(context(&hub, SessionConfig::default()), "rust", "carol")
        .await
        .unwrap();
    let mut watch = alice.peer_watch();

    alice.switch_room("rust").await.unwrap();

    assert_eq!(alice.room_name(), "rust");
    assert_eq!(alice.state(), SessionState::Active);
    assert!(watch.has_changed().unwrap());
    assert_eq!(watch.borrow_and_update().name(), topic_name("rust"));
    assert_eq!(hub.subscriber_count(&topic_name("lobby")), 1);
    assert_eq!(hub.subscriber_count(&topic_name("rust")), 2);

    bob.publish("anyone in the lobby?").await.unwrap();
    carol.publish("welcome to rust").await.unwrap();
    let message = timeout(Duration::from_secs(1), alice.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.message, "welcome to rust");
    assert!(timeout(Duration::from_millis(100), alice.recv()).await.is_err());

    alice.publish("hi carol").await.unwrap();
    let message = timeout(Duration::from_secs(1), carol.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.sender_name, "alice");
    assert!(timeout(Duration::from_millis(100), bob.recv()).await.is_err());
}

#[tokio::test]
async fn test_switch_sends_already_queued_messages_to_old_room() {
    let hub = LoopbackHub::new();
    let mut alice = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "alice")
        .await
        .unwrap();
    let mut bob = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "bob")
        .await
        .unwrap();

    for i in 0..20 {
        alice.publish(format!("queued {i}")).await.unwrap();
    }
    alice.switch_room("rust").await.unwrap();

    for i in 0..20 {
        let message = timeout(Duration::from_secs(1), bob.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.message, format!("queued {i}"));
    }
    assert_eq!(alice.room_name(), "rust");
}

#[tokio::test]
async fn test_failed_switch_keeps_current_room() {
    let hub = LoopbackHub::new();
    hub.fail_join(&topic_name("broken"));
    let mut alice = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "alice")
        .await
        .unwrap();
    let bob = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "bob")
        .await
        .unwrap();
    let watch = alice.peer_watch();

    assert_matches!(
        alice.switch_room("broken").await,
        Err(ChatError::Join { room, source: SubstrateError::Unavailable }) if room == "broken"
    );

    assert_eq!(alice.room_name(), "lobby");
    assert_eq!(alice.state(), SessionState::Active);
    assert!(!watch.has_changed().unwrap());

    bob.publish("still here").await.unwrap();
    let message = timeout(Duration::from_secs(1), alice.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.message, "still here");
}

#[tokio::test]
async fn test_old_topic_released_after_grace() {
    let hub = LoopbackHub::new();
    let config = SessionConfig {
        leave_grace: Duration::from_millis(500),
        ..Default::default()
    };
    let mut alice = ChatRoom::join(context(&hub, config), "lobby", "alice")
        .await
        .unwrap();
    let old_topic = alice.peer_watch().borrow().clone();

    alice.switch_room("rust").await.unwrap();

    // The swap does not wait for the release.
    old_topic.publish(b"late".to_vec()).await.unwrap();

    sleep(Duration::from_millis(800)).await;
    assert_matches!(
        old_topic.publish(b"later".to_vec()).await,
        Err(SubstrateError::TopicClosed(_))
    );
    assert_eq!(alice.room_name(), "rust");
}

#[tokio::test]
async fn test_name_survives_switch() {
    let hub = LoopbackHub::new();
    let mut alice = ChatRoom::join(context(&hub, SessionConfig::default()), "lobby", "alice")
        .await
        .unwrap();
    let mut carol = ChatRoom::join(context(&hub, SessionConfig::default()), "rust", "carol")
        .await
        .unwrap();

    alice.change_user_name("alicia").await.unwrap();
    alice.switch_room("rust").await.unwrap();
    alice.publish("hello").await.unwrap();

    let message = timeout(Duration::from_secs(1), carol.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.sender_name, "alicia");
}
