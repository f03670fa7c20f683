//! # Failover Client
//!
//! Connects to a broadcast server and streams its snapshots to a
//! presentation layer, treating every disconnection as temporary.
//!
//! ```text
//! FailoverClient (tokio task) ── FeedEvent ──▶ crossbeam channel ──▶ presentation thread
//! ```

pub mod connector;
pub mod failover;

pub use connector::{classify, Connecting, Connector, EndpointConnector, FailureClass, PendingConnect};
pub use failover::FailoverClient;

use std::time::Duration;

use stackcast_common::SourceKind;

use crate::snapshot::Snapshot;
use crate::transport::Endpoint;

/// Client settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// Give up on one in-flight connect after this long (then back off).
    pub connect_timeout: Option<Duration>,
    /// Mark the feed inactive when no snapshot arrived for this long.
    pub inactivity_timeout: Option<Duration>,
    /// Delay before retrying a refused or missing endpoint.
    pub backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp("127.0.0.1:8912".to_string()),
            connect_timeout: None,
            inactivity_timeout: Some(Duration::from_secs(10)),
            backoff: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, ..Self::default() }
    }
}

/// What the client reports to the presentation layer.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Handshake completed with a compatible server.
    Connected { server: String },
    /// Which instrumentation produced the upcoming snapshots.
    SourceKind(SourceKind),
    Snapshot(Snapshot),
    /// Snapshots stopped arriving (the connection may still be up).
    Inactive,
    /// Snapshots resumed after [`FeedEvent::Inactive`].
    Active,
    /// Connection lost; the client is already reconnecting.
    Disconnected { reason: String },
}

impl FeedEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::SourceKind(_) => "source-kind",
            Self::Snapshot(_) => "snapshot",
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}
