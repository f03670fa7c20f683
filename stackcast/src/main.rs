//! # stackcast - Main Entry Point
//!
//! Three subcommands:
//! - **view** (`stackcast view <SOURCE>`): stream snapshots from a server, or
//!   load a dump, and print hotspots
//! - **demo** (`stackcast demo`): serve an instrumented synthetic workload
//! - **inspect** (`stackcast inspect <DUMP>`): summarize a dump file

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use log::info;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stackcast::cli::report::{write_snapshot, write_summary};
use stackcast::cli::workload::{Probe, Workload};
use stackcast::cli::{Args, Command, DemoArgs, InspectArgs, ViewArgs};
use stackcast::client::{ClientConfig, FailoverClient, FeedEvent};
use stackcast::domain::ServerError;
use stackcast::export;
use stackcast::profiling::{
    InstrumentationSource, Sampler, SamplerConfig, StackRegistry, TracerConfig, TracingSource,
};
use stackcast::server::{BroadcastServer, ServerConfig};
use stackcast::snapshot::Snapshot;
use stackcast::transport::{is_dump_file, Endpoint};
use stackcast_common::SourceKind;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_ADDR_IN_USE: i32 = 98;

/// Events buffered between the client and the printer.
const FEED_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UsageError(String);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<UsageError>() {
            return EXIT_USAGE;
        }
        if let Some(ServerError::AddressInUse(_)) = cause.downcast_ref::<ServerError>() {
            return EXIT_ADDR_IN_USE;
        }
    }
    EXIT_ERROR
}

fn parse_endpoint(s: &str) -> Result<Endpoint> {
    Ok(s.parse::<Endpoint>().map_err(UsageError)?)
}

#[tokio::main(flavor = "current_thread")]
async fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::View(view) => run_view(view, args.quiet).await,
        Command::Demo(demo) => run_demo(demo, args.quiet).await,
        Command::Inspect(inspect) => run_inspect(&inspect),
    }
}

// ============================================================================
// demo
// ============================================================================

async fn run_demo(args: DemoArgs, quiet: bool) -> Result<()> {
    let config = ServerConfig {
        endpoint: parse_endpoint(&args.bind)?,
        interval: args.interval(),
        ship_flat: args.flat,
    };

    if args.sampling {
        let registry = StackRegistry::new();
        let sampler = Sampler::new(SamplerConfig::default(), Arc::clone(&registry));
        let workload =
            Workload::spawn(&Probe::Sampled(registry), args.threads).context("Failed to start workload")?;
        serve(config, sampler, workload, &args, quiet).await
    } else {
        let source = TracingSource::new(TracerConfig::default());
        let workload = Workload::spawn(&Probe::Traced(source.tracer()), args.threads)
            .context("Failed to start workload")?;
        serve(config, source, workload, &args, quiet).await
    }
}

async fn serve<S: InstrumentationSource>(
    config: ServerConfig,
    source: S,
    workload: Workload,
    args: &DemoArgs,
    quiet: bool,
) -> Result<()> {
    let server = match BroadcastServer::bind(config, source).await {
        Ok(server) => server,
        Err(e) => {
            let served = workload.stop();
            info!("Workload stopped after {served} requests");
            return Err(e).context("Failed to start server");
        }
    };

    if !quiet {
        println!("stackcast v{}", env!("CARGO_PKG_VERSION"));
        println!("serving: {} ({})", server.endpoint(), server.source_kind());
        println!("interval: {:?}", args.interval());
        println!("workload: {} threads", args.threads);
    }

    let duration_limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let result = server.run(shutdown_signal(duration_limit)).await;

    let served = workload.stop();
    if !quiet {
        eprintln!("\nstopped: {served} requests served");
    }
    result.context("Server failed")
}

/// Ctrl+C, or the optional time limit, whichever comes first.
fn shutdown_signal(limit: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        let timer = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = timer => {}
        }
    }
}

// ============================================================================
// view
// ============================================================================

async fn run_view(args: ViewArgs, quiet: bool) -> Result<()> {
    if is_dump_file(&args.source) {
        let dump = export::load(Path::new(&args.source))
            .with_context(|| format!("Failed to load dump {}", args.source))?;
        if !quiet {
            println!("source: {}", dump.source_kind);
        }
        write_snapshot(&mut io::stdout().lock(), &dump.snapshot, args.flat, args.top)?;
        return Ok(());
    }

    let endpoint = parse_endpoint(&args.source)?;
    if !quiet {
        println!("stackcast v{}", env!("CARGO_PKG_VERSION"));
        println!("viewing: {endpoint}");
    }
    let config = ClientConfig {
        inactivity_timeout: args.inactivity_timeout(),
        ..ClientConfig::new(endpoint)
    };

    // Printer in its own thread, fed over a bounded channel
    let (event_tx, event_rx) = bounded(FEED_CAPACITY);
    let (flat, top) = (args.flat, args.top);
    let printer = std::thread::spawn(move || print_feed(&event_rx, flat, top));

    let client = FailoverClient::connect_to(config, event_tx);
    let result = client.run(shutdown_signal(None)).await;

    // The client dropped its sender, so the printer drains and exits.
    let last = printer.join().ok().flatten();
    if let (Some(path), Some((kind, snapshot))) = (&args.save, &last) {
        export::save(path, *kind, snapshot).with_context(|| format!("Failed to save {}", path.display()))?;
        if !quiet {
            println!("saved: {}", path.display());
        }
    }
    result.context("Viewer failed")
}

/// Print every feed event; returns the last snapshot and its source kind.
fn print_feed(events: &Receiver<FeedEvent>, flat: bool, top: usize) -> Option<(SourceKind, Snapshot)> {
    let mut kind = None;
    let mut last = None;
    for event in events {
        let mut out = io::stdout().lock();
        let written = match event {
            FeedEvent::Connected { server } => writeln!(out, "connected: {server}"),
            FeedEvent::SourceKind(source_kind) => {
                kind = Some(source_kind);
                writeln!(out, "source: {source_kind}")
            }
            FeedEvent::Snapshot(snapshot) => {
                let written = writeln!(out).and_then(|()| write_snapshot(&mut out, &snapshot, flat, top));
                last = Some(snapshot);
                written
            }
            FeedEvent::Inactive => writeln!(out, "inactive: no snapshot received recently"),
            FeedEvent::Active => writeln!(out, "active"),
            FeedEvent::Disconnected { reason } => writeln!(out, "disconnected: {reason}"),
        };
        // stdout closed (e.g. piped into `head`)
        if written.is_err() {
            break;
        }
    }
    kind.zip(last)
}

// ============================================================================
// inspect
// ============================================================================

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let dump = export::load(&args.dump).with_context(|| format!("Failed to load dump {}", args.dump.display()))?;
    write_summary(&mut io::stdout().lock(), dump.source_kind, &dump.snapshot, args.top)?;
    Ok(())
}
