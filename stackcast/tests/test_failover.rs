use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use stackcast::client::{ClientConfig, FailoverClient, FeedEvent};
use stackcast::domain::{CallSite, ProfilerError};
use stackcast::profiling::InstrumentationSource;
use stackcast::server::{BroadcastServer, ServerConfig};
use stackcast::stats::RootStats;
use stackcast::transport::Endpoint;
use stackcast_common::SourceKind;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct OneSample {
    running: bool,
}

impl InstrumentationSource for OneSample {
    fn kind(&self) -> SourceKind {
        SourceKind::ThreadSampling
    }

    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError> {
        self.running = true;
        stats.record_sample(&[CallSite::new("tick", "src/tick.rs", 1)]);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

async fn start_server(endpoint: &Endpoint) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let config = ServerConfig {
        endpoint: endpoint.clone(),
        interval: Duration::from_millis(50),
        ship_flat: false,
    };
    let server = BroadcastServer::bind(config, OneSample::default()).await.expect("bind");
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .run(async {
                let _ = stopped.await;
            })
            .await
            .expect("server run");
    });
    (stop, task)
}

/// Next event with the given name, skipping others.
async fn wait_for(rx: &Receiver<FeedEvent>, name: &str) -> FeedEvent {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        while let Ok(event) = rx.try_recv() {
            if event.name() == name {
                return event;
            }
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("no {name} event in time");
}

#[tokio::test]
async fn test_client_survives_server_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let endpoint = Endpoint::Unix(dir.path().join("profiler.sock"));

    // Client first: the socket does not exist yet.
    let config = ClientConfig {
        backoff: Duration::from_millis(50),
        inactivity_timeout: None,
        ..ClientConfig::new(endpoint.clone())
    };
    let (tx, rx) = unbounded();
    let (client_stop, client_stopped) = oneshot::channel::<()>();
    let client = tokio::spawn(FailoverClient::connect_to(config, tx).run(async {
        let _ = client_stopped.await;
    }));

    sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());

    let (stop, server) = start_server(&endpoint).await;
    match wait_for(&rx, "source-kind").await {
        FeedEvent::SourceKind(kind) => assert_eq!(kind, SourceKind::ThreadSampling),
        other => panic!("unexpected {other:?}"),
    }
    wait_for(&rx, "snapshot").await;

    // Server goes away: the client reports it and keeps trying.
    drop(stop);
    server.await.expect("server join");
    wait_for(&rx, "disconnected").await;
    assert!(!dir.path().join("profiler.sock").exists());

    let (stop, server) = start_server(&endpoint).await;
    wait_for(&rx, "connected").await;
    wait_for(&rx, "snapshot").await;

    drop(client_stop);
    client.await.expect("client join").expect("clean client shutdown");
    drop(stop);
    server.await.expect("server join");
}

#[tokio::test]
async fn test_inactive_while_server_stalls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let endpoint = Endpoint::Unix(dir.path().join("slow.sock"));
    let config = ServerConfig {
        endpoint: endpoint.clone(),
        interval: Duration::from_millis(600),
        ship_flat: false,
    };
    let server = BroadcastServer::bind(config, OneSample::default()).await.expect("bind");
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    let config = ClientConfig {
        inactivity_timeout: Some(Duration::from_millis(150)),
        ..ClientConfig::new(endpoint)
    };
    let (tx, rx) = unbounded();
    let (client_stop, client_stopped) = oneshot::channel::<()>();
    let client = tokio::spawn(FailoverClient::connect_to(config, tx).run(async {
        let _ = client_stopped.await;
    }));

    // Snapshots every 600ms, timeout 150ms: each gap is reported, then healed.
    wait_for(&rx, "snapshot").await;
    wait_for(&rx, "inactive").await;
    wait_for(&rx, "active").await;

    drop(client_stop);
    client.await.expect("client join").expect("clean client shutdown");
    drop(stop);
    server.await.expect("server join").expect("server run");
}
