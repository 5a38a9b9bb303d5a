//! End-to-end tests over loopback UDP.
//!
//! A full bridge runs against a [`ScriptedBackend`]; the test plays the
//! control surface with two sockets, one sending commands to the bridge and
//! one receiving the published status.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keyosc_bridge::application::control_presentation::KeynoteController;
use keyosc_bridge::application::publish_status::StatusPublisher;
use keyosc_bridge::application::route_command::{CommandRouter, PresentationCatalog};
use keyosc_bridge::application::state_store::{ListenerError, StateStore, StatusRefresher};
use keyosc_bridge::infrastructure::automation::{BackendCall, ScriptedBackend};
use keyosc_bridge::infrastructure::orchestrator::Bridge;
use keyosc_bridge::infrastructure::storage::FsCatalog;
use keyosc_core::{
    decode_packet, encode_message, flatten_packet, BridgeConfig, ConfigUpdate, OscArg, OscMessage,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    bridge: Bridge,
    backend: Arc<ScriptedBackend>,
    store: Arc<StateStore>,
    surface: UdpSocket,
    config_rx: mpsc::UnboundedReceiver<ConfigUpdate>,
}

fn loopback_config(remote_port: u16) -> BridgeConfig {
    BridgeConfig {
        local_port: 0,
        bind_address: "127.0.0.1".to_string(),
        remote_host: "127.0.0.1".to_string(),
        remote_port,
        ..BridgeConfig::default()
    }
}

/// Builds the same object graph as the binary, with a scripted backend.
async fn harness(configure: impl FnOnce(&Arc<StateStore>)) -> Harness {
    let surface = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = loopback_config(surface.local_addr().unwrap().port());

    let store = Arc::new(StateStore::new(config.polling_interval()));
    let backend = Arc::new(ScriptedBackend::with_deck("Deck.key", 10));
    let controller = Arc::new(KeynoteController::new(backend.clone(), Arc::clone(&store)));
    let refresher: Arc<dyn StatusRefresher> = controller.clone();
    // Weak in the store; the router below keeps the controller alive.
    store.set_refresher(&refresher);

    configure(&store);

    let catalog: Arc<dyn PresentationCatalog> = Arc::new(FsCatalog::default());
    let publisher = Arc::new(StatusPublisher::new(&config.namespace));
    let _ = publisher.subscribe(&store);

    let (tx, config_rx) = mpsc::unbounded_channel();
    let router = Arc::new(
        CommandRouter::new(
            controller,
            Arc::clone(&catalog),
            Arc::clone(&publisher),
            &config.namespace,
        )
        .with_config_updates(tx),
    );
    let mut bridge = Bridge::new(config, router, publisher, Arc::clone(&store), catalog);
    tokio_test::assert_ok!(bridge.start().await);

    Harness {
        bridge,
        backend,
        store,
        surface,
        config_rx,
    }
}

async fn send(bridge: &Bridge, message: OscMessage) {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = bridge.local_addr().expect("bridge is running");
    let bytes = encode_message(&message).unwrap();
    client.send_to(&bytes, addr).await.unwrap();
}

/// Reads datagrams until `address` carries `expected`.
async fn wait_for_value(surface: &UdpSocket, address: &str, expected: OscArg) {
    let deadline = Instant::now() + WAIT;
    let mut buf = vec![0u8; 65_536];
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(received) = timeout(remaining, surface.recv_from(&mut buf)).await else {
            panic!("{address} never carried {expected:?}; last values: {seen:?}");
        };
        let (len, _) = received.unwrap();
        let packet = decode_packet(&buf[..len]).unwrap();
        for message in flatten_packet(packet) {
            if message.address == address {
                if message.args.first() == Some(&expected) {
                    return;
                }
                seen.push(message.args);
            }
        }
    }
}

async fn wait_for_action(backend: &ScriptedBackend, call: &BackendCall) {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if backend.actions().contains(call) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("backend never saw {call:?}; calls: {:?}", backend.calls());
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_goto_publishes_new_slide_to_surface() {
    // Arrange
    let mut h = harness(|_| {}).await;

    // Act
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", 4)).await;

    // Assert
    wait_for_value(&h.surface, "/keyosc/keynote_current_slide/value", OscArg::Int(4)).await;
    assert!(h.backend.actions().contains(&BackendCall::ShowSlide(4)));
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_bare_address_without_namespace_is_routed() {
    let mut h = harness(|_| {}).await;

    send(&h.bridge, OscMessage::with_arg("/goto", "6")).await;

    wait_for_value(&h.surface, "/keyosc/keynote_current_slide/value", OscArg::Int(6)).await;
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_non_numeric_goto_is_dropped() {
    // Arrange
    let mut h = harness(|_| {}).await;

    // Act
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", "abc")).await;
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", 2)).await;

    // Assert
    wait_for_action(&h.backend, &BackendCall::ShowSlide(2)).await;
    assert_eq!(h.backend.actions(), vec![BackendCall::ShowSlide(2)]);
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_playing_flag_is_published_as_string() {
    let mut h = harness(|_| {}).await;

    send(&h.bridge, OscMessage::new("/keyosc/start")).await;
    wait_for_value(&h.surface, "/keyosc/keynote_playing/value", OscArg::from("1")).await;

    send(&h.bridge, OscMessage::new("/keyosc/stop")).await;
    wait_for_value(&h.surface, "/keyosc/keynote_playing/value", OscArg::from("0")).await;
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_close_publishes_placeholder_document() {
    let mut h = harness(|_| {}).await;

    send(&h.bridge, OscMessage::new("/keyosc/close")).await;

    wait_for_value(
        &h.surface,
        "/keyosc/keynote_document/value",
        OscArg::from("No document"),
    )
    .await;
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_next_while_stopped_issues_no_navigation() {
    // Arrange
    let mut h = harness(|_| {}).await;

    // Act
    send(&h.bridge, OscMessage::new("/keyosc/next")).await;
    send(&h.bridge, OscMessage::new("/keyosc/previous")).await;
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", 3)).await;
    wait_for_value(&h.surface, "/keyosc/keynote_current_slide/value", OscArg::Int(3)).await;
    sleep(Duration::from_millis(50)).await;

    // Assert
    let actions = h.backend.actions();
    assert!(!actions.contains(&BackendCall::ShowNext), "{actions:?}");
    assert!(!actions.contains(&BackendCall::ShowPrevious), "{actions:?}");
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_open_base64_matches_plain_open() {
    // Arrange
    let mut h = harness(|_| {}).await;

    // Act: base64 of "/tmp/a.key", then an undecodable one
    send(&h.bridge, OscMessage::with_arg("/keyosc/open-base64", "L3RtcC9hLmtleQ==")).await;
    wait_for_action(&h.backend, &BackendCall::Open(PathBuf::from("/tmp/a.key"))).await;
    send(&h.bridge, OscMessage::with_arg("/keyosc/open-base64", "%%%invalid%%%")).await;
    send(&h.bridge, OscMessage::with_arg("/keyosc/open", "/tmp/b.key")).await;
    wait_for_action(&h.backend, &BackendCall::Open(PathBuf::from("/tmp/b.key"))).await;

    // Assert
    let opens: Vec<_> = h
        .backend
        .actions()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Open(_)))
        .collect();
    assert_eq!(
        opens,
        vec![
            BackendCall::Open(PathBuf::from("/tmp/a.key")),
            BackendCall::Open(PathBuf::from("/tmp/b.key")),
        ]
    );
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_failing_listeners_do_not_block_publishing() {
    // Arrange: a listener returning an error and one panicking, both ahead
    // of the publisher in registration order
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut h = harness(move |store| {
        let _ = store.on_state_change(|_| Err(ListenerError("listener failed".to_string())));
        let _ = store.on_state_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("listener panicked");
        });
    })
    .await;

    // Act
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", 5)).await;

    // Assert
    wait_for_value(&h.surface, "/keyosc/keynote_current_slide/value", OscArg::Int(5)).await;
    assert!(calls.load(Ordering::SeqCst) >= 1);
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_start_and_stop_toggle_polling() {
    let mut h = harness(|_| {}).await;
    assert!(!h.store.is_polling());

    send(&h.bridge, OscMessage::new("/keyosc/start")).await;
    wait_for_value(&h.surface, "/keyosc/keynote_playing/value", OscArg::from("1")).await;
    assert!(h.store.is_polling());

    send(&h.bridge, OscMessage::new("/keyosc/stop")).await;
    wait_for_value(&h.surface, "/keyosc/keynote_playing/value", OscArg::from("0")).await;
    assert!(!h.store.is_polling());
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_update_config_rebinds_and_retargets() {
    // Arrange
    let mut h = harness(|_| {}).await;
    let old_addr = h.bridge.local_addr().unwrap();
    let new_surface = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let new_port = probe.local_addr().unwrap().port();
    drop(probe);

    // Act
    let update = ConfigUpdate {
        local_port: Some(new_port),
        remote_port: Some(new_surface.local_addr().unwrap().port()),
        ..ConfigUpdate::default()
    };
    tokio_test::assert_ok!(h.bridge.update_config(&update).await);
    send(&h.bridge, OscMessage::with_arg("/keyosc/goto", 7)).await;

    // Assert
    assert_eq!(h.bridge.local_addr().unwrap().port(), new_port);
    wait_for_value(&new_surface, "/keyosc/keynote_current_slide/value", OscArg::Int(7)).await;
    assert!(UdpSocket::bind(old_addr).await.is_ok(), "old port released");
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_set_path_emits_config_update() {
    // Arrange
    let mut h = harness(|_| {}).await;

    // Act
    send(&h.bridge, OscMessage::with_arg("/keyosc/set-path", "/Users/show/Decks")).await;
    let update = timeout(WAIT, h.config_rx.recv())
        .await
        .expect("config update within timeout")
        .expect("channel open");
    tokio_test::assert_ok!(h.bridge.update_config(&update).await);

    // Assert
    assert_eq!(
        h.bridge.config().content_path,
        Some(PathBuf::from("/Users/show/Decks"))
    );
    assert!(h.bridge.is_running());
    h.bridge.stop().await;
}
