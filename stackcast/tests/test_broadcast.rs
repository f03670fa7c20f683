use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stackcast::domain::{CallSite, ProfilerError, ServerError};
use stackcast::profiling::InstrumentationSource;
use stackcast::server::{BroadcastServer, ServerConfig};
use stackcast::snapshot::{Flatten, Snapshot};
use stackcast::stats::RootStats;
use stackcast::transport::Endpoint;
use stackcast::wire::{read_frame, Message};
use stackcast_common::{MessageKind, SourceKind, ENCODING_VERSION};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Records one `main → work` sample every time it is started.
#[derive(Default)]
struct ScriptedSource {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    running: bool,
}

impl InstrumentationSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::TimerSampling
    }

    fn start(&mut self, stats: Arc<RootStats>) -> Result<(), ProfilerError> {
        if self.running {
            return Err(ProfilerError::AlreadyRunning);
        }
        self.running = true;
        self.starts.fetch_add(1, Ordering::SeqCst);
        stats.record_sample(&[CallSite::new("main", "src/main.rs", 1), CallSite::new("work", "src/work.rs", 2)]);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProfilerError> {
        if !self.running {
            return Err(ProfilerError::NotRunning);
        }
        self.running = false;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

fn config(interval: Duration) -> ServerConfig {
    ServerConfig { endpoint: Endpoint::Tcp("127.0.0.1:0".to_string()), interval, ship_flat: false }
}

async fn next_message(stream: &mut TcpStream, kind: MessageKind) -> Message {
    let frame = timeout(WAIT, read_frame(stream))
        .await
        .expect("frame in time")
        .expect("valid frame")
        .expect("stream open");
    Message::expect(&frame, kind).expect("expected kind")
}

async fn connect_and_greet(endpoint: &Endpoint) -> TcpStream {
    let Endpoint::Tcp(addr) = endpoint else { panic!("tcp endpoint") };
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    match next_message(&mut stream, MessageKind::Greeting).await {
        Message::Greeting(greeting) => assert_eq!(greeting.encoding_version, ENCODING_VERSION),
        other => panic!("expected greeting, got {other:?}"),
    }
    match next_message(&mut stream, MessageKind::SourceKind).await {
        Message::SourceKind(kind) => assert_eq!(kind, SourceKind::TimerSampling),
        other => panic!("expected source kind, got {other:?}"),
    }
    stream
}

async fn next_snapshot(stream: &mut TcpStream) -> Snapshot {
    match next_message(stream, MessageKind::Snapshot).await {
        Message::Snapshot(snapshot) => snapshot,
        other => panic!("expected snapshot, got {other:?}"),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition in time");
}

#[tokio::test]
async fn test_idle_server_does_not_measure() {
    let source = ScriptedSource::default();
    let starts = Arc::clone(&source.starts);
    let server = BroadcastServer::bind(config(Duration::from_millis(20)), source).await.expect("bind");

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    sleep(Duration::from_millis(200)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    drop(stop);
    task.await.expect("join").expect("clean shutdown");
}

#[tokio::test]
async fn test_fan_out_and_late_joiner() {
    let source = ScriptedSource::default();
    let (starts, stops) = (Arc::clone(&source.starts), Arc::clone(&source.stops));
    let server = BroadcastServer::bind(config(Duration::from_millis(100)), source).await.expect("bind");
    let endpoint = server.endpoint().clone();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    let mut first = connect_and_greet(&endpoint).await;
    let snapshot = next_snapshot(&mut first).await;
    let work = snapshot.flatten();
    let work = work.get(&CallSite::new("work", "src/work.rs", 2)).expect("sample shipped");
    assert_eq!(work.own_hits, 1);
    assert!(starts.load(Ordering::SeqCst) >= 1);

    // A late joiner gets the latest completed snapshot right after the intro.
    let mut second = connect_and_greet(&endpoint).await;
    let replayed = next_snapshot(&mut second).await;
    assert!(!replayed.is_flat());

    // Both keep receiving every following cycle.
    let a = next_snapshot(&mut first).await;
    let b = next_snapshot(&mut second).await;
    assert_eq!(a.flatten().len(), b.flatten().len());

    // Nobody left: measuring stops.
    drop(first);
    drop(second);
    wait_until(|| stops.load(Ordering::SeqCst) == starts.load(Ordering::SeqCst)).await;
    sleep(Duration::from_millis(300)).await;
    let settled = starts.load(Ordering::SeqCst);
    assert_eq!(stops.load(Ordering::SeqCst), settled);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(starts.load(Ordering::SeqCst), settled);

    drop(stop);
    task.await.expect("join").expect("clean shutdown");
}

#[tokio::test]
async fn test_flat_shipping() {
    let source = ScriptedSource::default();
    let config = ServerConfig { ship_flat: true, ..config(Duration::from_millis(50)) };
    let server = BroadcastServer::bind(config, source).await.expect("bind");
    let endpoint = server.endpoint().clone();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    let mut viewer = connect_and_greet(&endpoint).await;
    let snapshot = next_snapshot(&mut viewer).await;
    assert!(snapshot.is_flat());
    assert_eq!(snapshot.flatten().len(), 2);

    drop(stop);
    task.await.expect("join").expect("clean shutdown");
}

#[tokio::test]
async fn test_second_server_on_same_address() {
    let first = BroadcastServer::bind(config(Duration::from_secs(1)), ScriptedSource::default())
        .await
        .expect("bind");
    let taken = ServerConfig { endpoint: first.endpoint().clone(), ..config(Duration::from_secs(1)) };

    let err = BroadcastServer::bind(taken, ScriptedSource::default()).await.err().expect("address in use");
    assert!(matches!(err, ServerError::AddressInUse(_)));
}
