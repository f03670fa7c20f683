//! Command-line surface of the `stackcast` binary
//!
//! - [`args`]: clap definitions for `view`, `demo` and `inspect`
//! - [`report`]: headless text rendering of snapshots
//! - [`workload`]: the synthetic program `demo` profiles

pub mod args;
pub mod report;
pub mod workload;

pub use args::{Args, Command, DemoArgs, InspectArgs, ViewArgs};
