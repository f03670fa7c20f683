//! # stackcast - Live call-stack profiling over the network
//!
//! stackcast measures where a running process spends its time, one call
//! path at a time, and streams the results to any number of remote viewers
//! while the process keeps running.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Profiled process                            │
//! │                                                                 │
//! │  app threads ──▶ Tracer / StackRegistry                         │
//! │                        │ call paths                             │
//! │                        ▼                                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐     │
//! │  │ Instrument-  │──▶│  RootStats   │──▶│ FrozenSnapshot / │     │
//! │  │ ation source │   │ (live tree)  │   │ FlatSnapshot     │     │
//! │  └──────────────┘   └──────────────┘   └────────┬─────────┘     │
//! │         ▲ start/stop                            │ every cycle   │
//! │  ┌──────┴───────────────────────────────────────▼──────────┐    │
//! │  │      BroadcastServer  (CycleController + ViewerSet)      │    │
//! │  └──────────────────────────────┬───────────────────────────┘    │
//! └─────────────────────────────────┼────────────────────────────────┘
//!                                   │ GREETING, SOURCE_KIND, SNAPSHOT…
//!                  TCP or unix socket (length-prefixed frames)
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ FailoverClient ── FeedEvent ──▶ presentation (headless report)  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Measurement
//!
//! - [`stats`]: the live statistics tree, safe for concurrent recording
//! - [`snapshot`]: immutable frozen trees and their flattened view
//! - [`profiling`]: clocks, the process-wide instrumentation slot, the
//!   tracing and sampling sources, and the measurement cycle
//!
//! ### Distribution
//!
//! - [`wire`]: frame codec and typed protocol messages
//! - [`transport`]: endpoints (`host:port` or socket path) and listeners
//! - [`server`]: the single-task broadcast reactor
//! - [`client`]: the reconnecting viewer client
//!
//! ### Offline and presentation
//!
//! - [`export`]: dump files with the wire encoding
//! - [`analysis`]: hotspot ranking of flattened snapshots
//! - [`cli`]: argument parsing, text reports, the demo workload
//! - [`domain`]: call-sites, time units, error types
//!
//! ## Measurement Cycle
//!
//! Nothing is measured while nobody watches. The first viewer starts the
//! instrumentation; every `interval` the server freezes the tree, clears
//! it, broadcasts the snapshot and resumes; the last viewer leaving ends
//! the cycle early and stops the instrumentation.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Serve a synthetic workload
//! stackcast demo --bind 127.0.0.1:8912
//!
//! # Watch it, saving the last snapshot on Ctrl+C
//! stackcast view 127.0.0.1:8912 --save last.dump
//!
//! # Look at the saved snapshot later
//! stackcast inspect last.dump
//! ```

pub mod analysis;
pub mod cli;
pub mod client;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod server;
pub mod snapshot;
pub mod stats;
pub mod transport;
pub mod wire;
