//! Launcher lifecycle behaviour against scripted services.

use std::time::Duration;

use chaperone::config::LaunchConfig;
use chaperone::error::Error;
use chaperone::launcher::{Launcher, LauncherEvent};
use chaperone::service::{ExitStatus, ManagedService, ServiceStatus};
use chaperone::testkit::{journal, ScriptedService};

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> LaunchConfig {
    let mut config = LaunchConfig::parse_toml("poll_interval_ms = 20").unwrap();
    config.install_signal_handlers = false;
    config
}

/// Bind a listener that keeps accepting for the lifetime of the test.
async fn live_port() -> (tokio::net::TcpListener, u16) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port with no listener behind it.
fn dead_port() -> u16 {
    let reserved = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = reserved.local_addr().unwrap().port();
    drop(reserved);
    port
}

/// Collect every event currently observable on the receiver.
async fn drain(
    events: &mut tokio::sync::broadcast::Receiver<LauncherEvent>,
) -> Vec<LauncherEvent> {
    let mut seen = Vec::new();
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn start_resolves_with_api_once_the_port_accepts() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").with_api_port(port).shared();
    let launcher = Launcher::with_services(&test_config(), node, wallet).unwrap();

    let api = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(api.host, "127.0.0.1");
    assert_eq!(api.port, port);
    assert_eq!(launcher.wallet_backend().api().unwrap().port, port);
}

#[tokio::test]
async fn node_start_resolves_before_wallet_start_begins() {
    let (_listener, port) = live_port().await;
    let log = journal();
    let node = ScriptedService::new("node")
        .with_start_delay(Duration::from_millis(80))
        .with_journal(log.clone())
        .shared();
    let wallet = ScriptedService::new("wallet")
        .with_api_port(port)
        .with_journal(log.clone())
        .shared();
    let launcher = Launcher::with_services(&test_config(), node, wallet).unwrap();

    tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    let entries = log.lock().clone();
    let node_started = entries
        .iter()
        .position(|e| e == "node:started")
        .expect("node never started");
    let wallet_called = entries
        .iter()
        .position(|e| e == "wallet:start-called")
        .expect("wallet start never invoked");
    assert!(
        node_started < wallet_called,
        "wallet start began before node start resolved: {entries:?}"
    );
}

#[tokio::test]
async fn node_start_failure_rejects_start_and_never_starts_wallet() {
    let node = ScriptedService::new("node")
        .with_start_error("exec format error")
        .shared();
    let wallet = ScriptedService::new("wallet").shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();

    let err = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap_err();

    match err {
        Error::BackendExited(status) => {
            assert!(matches!(status.node, ExitStatus::FailedToLaunch(_)));
            assert_eq!(status.wallet, ExitStatus::Unknown);
        }
        other => panic!("expected BackendExited, got {other}"),
    }
    assert_eq!(wallet.start_count(), 0);
}

#[tokio::test]
async fn node_self_exit_after_start_prevents_wallet_start() {
    let node = ScriptedService::new("node")
        .with_self_exit_after_start(ExitStatus::Exited(1))
        .shared();
    let wallet = ScriptedService::new("wallet").shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();

    let err = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap_err();

    match err {
        Error::BackendExited(status) => assert_eq!(status.node, ExitStatus::Exited(1)),
        other => panic!("expected BackendExited, got {other}"),
    }
    assert_eq!(wallet.start_count(), 0);
    assert_eq!(wallet.status(), ServiceStatus::Stopped);
}

#[tokio::test]
async fn exit_fires_exactly_once_under_concurrent_stops() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet")
        .with_api_port(port)
        .with_stop_delay(Duration::from_millis(30))
        .shared();
    let launcher = Launcher::with_services(&test_config(), node, wallet).unwrap();
    let mut events = launcher.wallet_backend().subscribe();

    tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let launcher = launcher.clone();
        tasks.push(tokio::spawn(
            async move { launcher.stop(Duration::ZERO).await },
        ));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    let first = results[0].clone();
    assert!(results.iter().all(|status| *status == first));

    let exits = drain(&mut events)
        .await
        .into_iter()
        .filter(|event| matches!(event, LauncherEvent::Exited(_)))
        .count();
    assert_eq!(exits, 1);
}

#[tokio::test]
async fn sequential_stops_return_the_same_combined_status() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet")
        .with_api_port(port)
        .with_stop_exit(ExitStatus::Exited(7))
        .shared();
    let launcher = Launcher::with_services(&test_config(), node, wallet).unwrap();

    tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    let first = launcher.stop(Duration::from_secs(1)).await;
    let second = launcher.stop(Duration::from_secs(1)).await;

    assert_eq!(first, second);
    assert_eq!(first.wallet, ExitStatus::Exited(7));
}

#[tokio::test]
async fn stop_forwards_the_timeout_to_both_services() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").with_api_port(port).shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();

    tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    launcher.stop(Duration::from_secs(5)).await;

    assert_eq!(node.stop_timeouts().first(), Some(&Duration::from_secs(5)));
    assert_eq!(
        wallet.stop_timeouts().first(),
        Some(&Duration::from_secs(5))
    );
}

#[tokio::test]
async fn wallet_self_exit_stops_the_node_and_fires_exit_once() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").with_api_port(port).shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();
    let mut events = launcher.wallet_backend().subscribe();

    tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    wallet.terminate(ExitStatus::Exited(1));

    let seen = drain(&mut events).await;
    let exited: Vec<_> = seen
        .iter()
        .filter_map(|event| match event {
            LauncherEvent::Exited(status) => Some(status.clone()),
            LauncherEvent::Ready(_) => None,
        })
        .collect();

    assert_eq!(exited.len(), 1);
    assert_eq!(exited[0].wallet, ExitStatus::Exited(1));
    assert_eq!(node.status(), ServiceStatus::Stopped);
    assert!(node.stop_timeouts().contains(&Duration::ZERO));
}

#[tokio::test]
async fn ready_never_fires_when_supervision_halts_first() {
    let port = dead_port();
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").with_api_port(port).shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();
    let mut events = launcher.wallet_backend().subscribe();

    let start = {
        let launcher = launcher.clone();
        tokio::spawn(async move { launcher.start().await })
    };

    // Give the probe a few fruitless ticks, then crash the node.
    tokio::time::sleep(Duration::from_millis(120)).await;
    node.terminate(ExitStatus::Signaled(9));

    let result = tokio::time::timeout(WAIT, start).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::BackendExited(_))));

    let seen = drain(&mut events).await;
    assert!(seen
        .iter()
        .all(|event| matches!(event, LauncherEvent::Exited(_))));
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn stop_before_start_reports_unknown_and_start_fails_fast() {
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").shared();
    let launcher =
        Launcher::with_services(&test_config(), node.clone(), wallet.clone()).unwrap();

    let combined = launcher.stop(Duration::ZERO).await;
    assert_eq!(combined.node, ExitStatus::Unknown);
    assert_eq!(combined.wallet, ExitStatus::Unknown);

    let err = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::BackendExited(_)));
    assert_eq!(node.start_count(), 0);
}

#[tokio::test]
async fn second_start_call_observes_the_same_api() {
    let (_listener, port) = live_port().await;
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").with_api_port(port).shared();
    let launcher = Launcher::with_services(&test_config(), node.clone(), wallet).unwrap();

    let first = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(WAIT, launcher.start())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(node.start_count(), 1);
}

#[tokio::test]
async fn api_is_unavailable_before_ready() {
    let node = ScriptedService::new("node").shared();
    let wallet = ScriptedService::new("wallet").shared();
    let launcher = Launcher::with_services(&test_config(), node, wallet).unwrap();

    assert!(matches!(
        launcher.wallet_backend().api(),
        Err(Error::ApiNotReady)
    ));
}
