//! CLI argument definitions

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "stackcast",
    version,
    about = "Live call-stack profiling over the network",
    after_help = "\
EXAMPLES:
    stackcast demo                            Profile a synthetic workload on 127.0.0.1:8912
    stackcast demo --sampling --bind :9000    Same, sampled, on another port
    stackcast view 127.0.0.1:8912             Stream hotspots from a server
    stackcast view /tmp/app.sock --flat       Stream from a unix socket
    stackcast view profile.dump               Show a saved snapshot"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream snapshots from a server (or load a dump) and print hotspots
    View(ViewArgs),
    /// Run an instrumented synthetic workload behind a broadcast server
    Demo(DemoArgs),
    /// Print a summary of a dump file
    Inspect(InspectArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ViewArgs {
    /// Dump file, HOST:PORT, or unix socket path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Report the feed inactive after S seconds without a snapshot (0 = never)
    #[arg(long, value_name = "S", default_value = "10")]
    pub timeout: f64,

    /// Show one row per function instead of the call tree
    #[arg(long)]
    pub flat: bool,

    /// Rows to print per snapshot
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Save the last received snapshot to FILE on exit
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
}

impl ViewArgs {
    #[must_use]
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        seconds(self.timeout)
    }
}

#[derive(ClapArgs, Debug)]
pub struct DemoArgs {
    /// Endpoint to serve on: HOST:PORT, :PORT, or a unix socket path
    #[arg(long, default_value = "127.0.0.1:8912")]
    pub bind: String,

    /// Measurement cycle length in seconds
    #[arg(long, value_name = "S", default_value = "5")]
    pub interval: f64,

    /// Sample call stacks instead of tracing every call
    #[arg(long)]
    pub sampling: bool,

    /// Ship flattened snapshots
    #[arg(long)]
    pub flat: bool,

    /// Worker threads in the synthetic workload
    #[arg(long, default_value = "4")]
    pub threads: usize,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,
}

impl DemoArgs {
    /// Cycle length, falling back to one second for non-positive values.
    #[must_use]
    pub fn interval(&self) -> Duration {
        seconds(self.interval).unwrap_or(Duration::from_secs(1))
    }
}

#[derive(ClapArgs, Debug)]
pub struct InspectArgs {
    /// Dump file written by `view --save`
    #[arg(value_name = "DUMP")]
    pub dump: PathBuf,

    /// Rows to print
    #[arg(long, default_value = "20")]
    pub top: usize,
}

/// Positive, representable seconds; anything else is `None`.
fn seconds(value: f64) -> Option<Duration> {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).ok()
    } else {
        None
    }
}
