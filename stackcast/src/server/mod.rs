//! # Broadcast Server
//!
//! Publishes the profiled process's snapshots to every connected viewer.
//!
//! ```text
//!                ┌──────────────── BroadcastServer (one task) ───────────────┐
//! viewer A ◀──── │ ViewerSet ◀── broadcast ◀── CycleController ◀── source    │
//! viewer B ◀──── │    │                            ▲                         │
//!     ...        │    └─ watcher tasks ── disconnect events ──┘ (count edges)│
//!                └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Measuring only happens while at least one viewer is connected. A viewer
//! that joins between cycles immediately receives the most recent completed
//! snapshot.

pub mod reactor;
pub mod viewers;

pub use reactor::BroadcastServer;
pub use viewers::{ViewerId, ViewerSet};

use std::time::Duration;

use crate::profiling::CycleConfig;
use crate::transport::Endpoint;

/// Server settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    /// Length of one measurement cycle.
    pub interval: Duration,
    /// Ship flattened snapshots instead of full trees.
    pub ship_flat: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp("127.0.0.1:8912".to_string()),
            interval: Duration::from_secs(5),
            ship_flat: false,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn cycle(&self) -> CycleConfig {
        CycleConfig { interval: self.interval, ship_flat: self.ship_flat }
    }
}
