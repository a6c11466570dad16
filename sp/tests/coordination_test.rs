//! Integration tests for single-instance coordination
//!
//! Each `PeerContext` stands in for a separate process: the channel lock is
//! per open file, so two contexts in one test contend exactly like two
//! launches would.

use std::time::{Duration, Instant};

use fs2::FileExt;
use singlepeer::{ChannelName, Config, CoordinatorEvent, PeerContext, Role};
use tempfile::TempDir;

fn test_config(temp: &TempDir) -> Config {
    Config {
        connect_retry_delay_ms: 10,
        ..Config::with_runtime_dir(temp.path())
    }
}

async fn expect_message(app: &mut singlepeer::Coordinator) -> String {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), app.next_event())
            .await
            .expect("Timed out waiting for a message")
            .expect("Event bus closed");
        if let CoordinatorEvent::MessageReceived { text } = event {
            return text;
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_switching_identity_releases_previous_channel() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx_a = PeerContext::new(test_config(&temp)).unwrap();
    let app_a = ctx_a.coordinator();
    app_a.set_application_id("org.example.One");
    assert_eq!(app_a.role(), Some(Role::Primary));

    app_a.set_application_id("org.example.Two");
    assert_eq!(app_a.application_id(), "org.example.Two");

    let ctx_b = PeerContext::new(test_config(&temp)).unwrap();
    let app_b = ctx_b.coordinator();
    app_b.set_application_id("org.example.One");
    assert_eq!(app_b.role(), Some(Role::Primary), "Old channel should be free again");
    assert!(!app_b.is_running());
}

#[tokio::test]
async fn test_exactly_one_primary_per_identity() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx_a = PeerContext::new(test_config(&temp)).unwrap();
    let ctx_b = PeerContext::new(test_config(&temp)).unwrap();
    let app_a = ctx_a.coordinator();
    let app_b = ctx_b.coordinator();

    app_a.set_application_id("org.example.Duo");
    app_b.set_application_id("org.example.Duo");

    assert_eq!(app_a.role(), Some(Role::Primary));
    assert_eq!(app_b.role(), Some(Role::Client));
    assert!(!app_a.is_running());
    assert!(app_b.is_running());
}

#[tokio::test]
async fn test_different_identities_do_not_interfere() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx_a = PeerContext::new(test_config(&temp)).unwrap();
    let ctx_b = PeerContext::new(test_config(&temp)).unwrap();
    let app_a = ctx_a.coordinator();
    let app_b = ctx_b.coordinator();

    app_a.set_application_id("org.example.Left");
    app_b.set_application_id("org.example.Right");

    assert!(!app_a.is_running());
    assert!(!app_b.is_running());
}

#[tokio::test]
async fn test_dropping_all_instances_frees_channel() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx_a = PeerContext::new(test_config(&temp)).unwrap();
    let first = ctx_a.coordinator();
    let second = ctx_a.coordinator();
    first.set_application_id("org.example.Handoff");

    let ctx_b = PeerContext::new(test_config(&temp)).unwrap();
    let waiting = ctx_b.coordinator();
    waiting.set_application_id("org.example.Handoff");
    assert_eq!(waiting.role(), Some(Role::Client));
    drop(waiting);

    drop(first);
    drop(second);
    assert_eq!(ctx_a.application_id(), "");

    let ctx_c = PeerContext::new(test_config(&temp)).unwrap();
    let next = ctx_c.coordinator();
    next.set_application_id("org.example.Handoff");
    assert_eq!(next.role(), Some(Role::Primary));
}

#[tokio::test]
async fn test_shutdown_frees_channel() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx_a = PeerContext::new(test_config(&temp)).unwrap();
    let app_a = ctx_a.coordinator();
    app_a.set_application_id("org.example.Shutdown");
    ctx_a.shutdown();

    let ctx_b = PeerContext::new(test_config(&temp)).unwrap();
    let app_b = ctx_b.coordinator();
    app_b.set_application_id("org.example.Shutdown");
    assert_eq!(app_b.role(), Some(Role::Primary));
}

// =============================================================================
// Message relay
// =============================================================================

#[tokio::test]
async fn test_client_message_reaches_every_primary_instance_once() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let primary_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let mut window = primary_ctx.coordinator();
    let mut tray = primary_ctx.coordinator();
    window.set_application_id("org.example.Relay");
    while window.try_next_event().is_some() {}
    while tray.try_next_event().is_some() {}

    let client_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let client = client_ctx.coordinator();
    client.set_application_id("org.example.Relay");
    assert!(client.is_running());

    client.send_message("--open ~/notes.txt").await.unwrap();

    assert_eq!(expect_message(&mut window).await, "--open ~/notes.txt");
    assert_eq!(expect_message(&mut tray).await, "--open ~/notes.txt");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(window.try_next_event().is_none(), "Message must be delivered exactly once");
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let primary_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let mut primary = primary_ctx.coordinator();
    primary.set_application_id("org.example.Order");

    let client_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let client = client_ctx.coordinator();
    client.set_application_id("org.example.Order");

    for text in ["one", "", "three"] {
        client.send_message(text).await.unwrap();
    }

    for expected in ["one", "", "three"] {
        assert_eq!(expect_message(&mut primary).await, expected);
    }
}

#[tokio::test]
async fn test_client_sees_no_messages() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let primary_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let primary = primary_ctx.coordinator();
    primary.set_application_id("org.example.OneWay");

    let client_ctx = PeerContext::new(test_config(&temp)).unwrap();
    let mut client = client_ctx.coordinator();
    client.set_application_id("org.example.OneWay");
    while client.try_next_event().is_some() {}

    client.send_message("ping").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.try_next_event().is_none());
}

#[tokio::test]
async fn test_send_from_primary_or_without_identity_is_silent() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let ctx = PeerContext::new(test_config(&temp)).unwrap();
    let mut app = ctx.coordinator();

    let started = Instant::now();
    app.send_message("nobody home").await.unwrap();

    app.set_application_id("org.example.Alone");
    while app.try_next_event().is_some() {}
    app.send_message("talking to myself").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.try_next_event().is_none());
}

#[tokio::test]
async fn test_zero_timeout_against_unresponsive_primary() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp);

    // A "primary" that holds the channel but never reads its socket
    let channel = ChannelName::derive("org.example.Hung");
    let lock = std::fs::File::create(channel.lock_path(&config.runtime_dir)).unwrap();
    lock.try_lock_exclusive().unwrap();
    let _socket = std::os::unix::net::UnixListener::bind(channel.socket_path(&config.runtime_dir)).unwrap();

    let ctx = PeerContext::new(config).unwrap();
    let app = ctx.coordinator();
    app.set_application_id("org.example.Hung");
    assert!(app.is_running());

    let started = Instant::now();
    let err = app.send_message_with_timeout("hello", Duration::ZERO).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(100));

    let started = Instant::now();
    let err = app
        .send_message_with_timeout("hello", Duration::from_millis(150))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unavailable_channel_assumes_running() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let blocker = temp.path().join("file-not-dir");
    std::fs::write(&blocker, "").unwrap();

    let ctx = PeerContext::new(Config::with_runtime_dir(&blocker)).unwrap();
    let app = ctx.coordinator();
    app.set_application_id("org.example.Blocked");

    assert_eq!(app.role(), Some(Role::Fallback));
    assert!(app.is_running());
    app.send_message("dropped").await.unwrap();
}

#[tokio::test]
async fn test_oversized_message_is_rejected() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = Config {
        max_message_size: 8,
        ..test_config(&temp)
    };

    let primary_ctx = PeerContext::new(config.clone()).unwrap();
    let primary = primary_ctx.coordinator();
    primary.set_application_id("org.example.Small");

    let client_ctx = PeerContext::new(config).unwrap();
    let client = client_ctx.coordinator();
    client.set_application_id("org.example.Small");

    let err = client.send_message("far too long for the limit").await.unwrap_err();
    assert!(matches!(err, singlepeer::CoordinationError::MessageTooLarge { .. }));
}
