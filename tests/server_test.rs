//! End-to-end tests against a real server on a temporary Unix socket.

use multimeter_sim::client::MultimeterClient;
use multimeter_sim::config::SimulationConfig;
use multimeter_sim::error::AppResult;
use multimeter_sim::instrument::{ChannelId, ChannelState, ChannelStore, Range, SimulationScheduler};
use multimeter_sim::network::{MultimeterServer, SessionManager};
use multimeter_sim::protocol::CommandProcessor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct TestServer {
    path: PathBuf,
    store: Arc<ChannelStore>,
    sessions: SessionManager,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<AppResult<()>>,
}

impl TestServer {
    fn spawn(path: &Path, channels: usize) -> Self {
        let store = Arc::new(ChannelStore::new(channels));
        let sessions = SessionManager::new();
        let server = MultimeterServer::bind(
            path,
            CommandProcessor::new(store.clone()),
            sessions.clone(),
        )
        .unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));

        Self {
            path: path.to_path_buf(),
            store,
            sessions,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.send_replace(true);
        self.task.await.unwrap().unwrap();
    }
}

fn socket_in(dir: &TempDir) -> PathBuf {
    dir.path().join("multimeter.sock")
}

async fn wait_for_sessions(sessions: &SessionManager, expected: usize) {
    timeout(Duration::from_secs(5), async {
        while sessions.active_count().await != expected {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("active session count never reached {}", expected));
}

#[tokio::test]
async fn test_start_measure_then_status() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 2);
    let mut client = MultimeterClient::connect(&server.path).await.unwrap();

    assert_eq!(client.send_command("start_measure channel0").await.unwrap(), "ok");
    assert_eq!(
        client.send_command("get_status channel0").await.unwrap(),
        "ok, measure_state"
    );
    assert_eq!(
        client.send_command("get_status channel1").await.unwrap(),
        "ok, idle_state"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_requests_leave_channels_untouched() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 2);
    let mut client = MultimeterClient::connect(&server.path).await.unwrap();
    let before = server.store.snapshot();

    assert_eq!(client.send_command("start_measure channel999").await.unwrap(), "fail");
    assert_eq!(
        client.send_command("set_range channel0 range1").await.unwrap(),
        "fail, channel0 range1"
    );
    assert_eq!(client.send_command("set_range").await.unwrap(), "fail, no parameters");
    assert_eq!(
        client.send_command("calibrate channel0").await.unwrap(),
        "fail, unknown command"
    );
    assert_eq!(server.store.snapshot(), before);

    // The connection is still usable after rejected commands
    assert_eq!(
        client.send_command("set_range channel1, range3").await.unwrap(),
        "ok, range3"
    );
    assert_eq!(server.store.channel(ChannelId(1)).unwrap().range, Range::Range3);

    server.stop().await;
}

#[tokio::test]
async fn test_error_channel_requires_diagnostic() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 1);
    let mut client = MultimeterClient::connect(&server.path).await.unwrap();

    server
        .store
        .with_channel(ChannelId(0), |c| c.state = ChannelState::Error)
        .unwrap();

    assert_eq!(
        client.send_command("get_status channel0").await.unwrap(),
        "fail, error_state"
    );
    assert_eq!(client.send_command("start_measure channel0").await.unwrap(), "fail");
    assert_eq!(
        client.send_command("diagnostic channel0").await.unwrap(),
        "ok, channel0"
    );
    assert_eq!(
        client.send_command("get_status channel0").await.unwrap(),
        "ok, idle_state"
    );

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_on_one_channel() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 2);

    let mut workers = Vec::new();
    for _ in 0..8 {
        let path = server.path.clone();
        workers.push(tokio::spawn(async move {
            let mut client = MultimeterClient::connect(&path).await.unwrap();
            for _ in 0..25 {
                assert_eq!(client.send_command("start_measure channel0").await.unwrap(), "ok");

                let reply = client.send_command("set_range channel0, range1").await.unwrap();
                assert!(reply == "ok, range1" || reply == "fail, range1", "{}", reply);

                assert_eq!(client.send_command("stop_measure channel0").await.unwrap(), "ok");

                let reply = client.send_command("get_status channel0").await.unwrap();
                assert!(
                    reply == "ok, idle_state" || reply == "ok, measure_state",
                    "{}",
                    reply
                );
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let channel = server.store.channel(ChannelId(0)).unwrap();
    assert_eq!(channel.state, ChannelState::Idle);
    assert!(channel.range == Range::Range0 || channel.range == Range::Range1);
    assert_eq!(server.store.channel(ChannelId(1)).unwrap().state, ChannelState::Idle);

    server.stop().await;
}

#[tokio::test]
async fn test_closed_connection_releases_session() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 2);

    let mut first = MultimeterClient::connect(&server.path).await.unwrap();
    let mut second = MultimeterClient::connect(&server.path).await.unwrap();
    assert_eq!(first.send_command("get_status channel0").await.unwrap(), "ok, idle_state");
    assert_eq!(second.send_command("get_status channel1").await.unwrap(), "ok, idle_state");
    wait_for_sessions(&server.sessions, 2).await;

    drop(first);
    wait_for_sessions(&server.sessions, 1).await;

    assert_eq!(second.send_command("start_measure channel1").await.unwrap(), "ok");
    let sessions = server.sessions.get_active_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].commands_handled, 2);

    server.stop().await;
}

#[tokio::test]
async fn test_client_reconnects_once_after_server_restart() {
    let dir = tempdir().unwrap();
    let path = socket_in(&dir);
    let server = TestServer::spawn(&path, 1);
    let mut client = MultimeterClient::connect(&path).await.unwrap();
    assert_eq!(client.send_command("get_status channel0").await.unwrap(), "ok, idle_state");

    let sessions = server.sessions.clone();
    server.stop().await;
    wait_for_sessions(&sessions, 0).await;

    // Old connection is gone and there is nothing to reconnect to yet
    assert!(client.send_command("get_status channel0").await.is_err());
    assert!(!client.is_connected());
    assert!(client.send_command("get_status channel0").await.is_err());

    let server = TestServer::spawn(&path, 1);
    assert_eq!(client.send_command("get_status channel0").await.unwrap(), "ok, idle_state");
    assert!(client.is_connected());

    server.stop().await;
}

#[tokio::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempdir().unwrap();
    let path = socket_in(&dir);
    std::fs::write(&path, b"left over").unwrap();

    let server = TestServer::spawn(&path, 1);
    let mut client = MultimeterClient::connect(&path).await.unwrap();
    assert_eq!(client.send_command("diagnostic channel0").await.unwrap(), "fail, channel0");

    server.stop().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_live_readings_stay_in_range() {
    let dir = tempdir().unwrap();
    let server = TestServer::spawn(&socket_in(&dir), 2);
    let config = SimulationConfig {
        time_unit: Duration::from_millis(5),
        error_probability: 0.0,
        busy_probability: 0.0,
        seed: Some(7),
        ..SimulationConfig::default()
    };
    let mut scheduler = SimulationScheduler::spawn(server.store.clone(), config).unwrap();
    let mut client = MultimeterClient::connect(&server.path).await.unwrap();

    assert_eq!(
        client.send_command("set_range channel1, range2").await.unwrap(),
        "ok, range2"
    );
    assert_eq!(client.send_command("start_measure channel1").await.unwrap(), "ok");
    assert_eq!(client.send_command("get_result channel0").await.unwrap(), "fail");

    // No reading is reported until the sampler has run for this measurement
    timeout(Duration::from_secs(5), async {
        while !server.store.channel(ChannelId(1)).unwrap().sampled {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap();

    for _ in 0..5 {
        let reply = client.send_command("get_result channel1").await.unwrap();
        let value: f64 = reply
            .strip_prefix("ok, ")
            .unwrap_or_else(|| panic!("unexpected reply {}", reply))
            .parse()
            .unwrap();
        assert!(Range::Range2.contains(value), "{} outside range2", value);
        sleep(Duration::from_millis(10)).await;
    }

    scheduler.shutdown().await;
    server.stop().await;
}
