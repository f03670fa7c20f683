//! The broadcast server's event loop.
//!
//! One task, one `tokio::select!` over four event sources:
//!
//! | Event                  | Reaction                                        |
//! |------------------------|-------------------------------------------------|
//! | new connection         | greet, replay latest snapshot, count 0 → 1 edge |
//! | watcher: disconnected  | forget viewer, count 1 → 0 edge                 |
//! | cycle deadline         | end cycle, broadcast, drop failed viewers       |
//! | shutdown future        | stop measuring, close viewers, return           |
//!
//! The deadline branch only exists while a cycle is running, so an idle
//! server sleeps until somebody connects.

use log::{debug, info, warn};
use std::future::Future;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{sleep_until, Instant};

use stackcast_common::SourceKind;

use super::viewers::{ViewerId, ViewerSet};
use super::ServerConfig;
use crate::domain::ServerError;
use crate::profiling::{CycleController, InstrumentationSource};
use crate::snapshot::Snapshot;
use crate::transport::{Endpoint, Listener, ViewerStream};
use crate::wire::{Greeting, Message};

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Serves snapshots of one process to any number of viewers.
pub struct BroadcastServer<S: InstrumentationSource> {
    listener: Listener,
    endpoint: Endpoint,
    cycle: CycleController<S>,
    viewers: ViewerSet,
    disconnects: UnboundedReceiver<ViewerId>,
    /// GREETING + SOURCE_KIND, sent to every new viewer.
    intro: Vec<u8>,
    /// Last completed SNAPSHOT frame, replayed to late joiners.
    latest: Option<Vec<u8>>,
}

impl<S: InstrumentationSource> BroadcastServer<S> {
    /// Bind the configured endpoint.
    ///
    /// # Errors
    /// [`ServerError::AddressInUse`] if the endpoint is taken (fatal, never
    /// retried), other bind or encoding failures.
    pub async fn bind(config: ServerConfig, source: S) -> Result<Self, ServerError> {
        let listener = Listener::bind(&config.endpoint).await?;
        let endpoint = listener.local_endpoint()?;
        let kind = source.kind();

        let mut intro = Message::Greeting(Greeting::current()).encode()?;
        intro.extend(Message::SourceKind(kind).encode()?);

        let (events, disconnects) = unbounded_channel();
        info!("Listening on {endpoint} ({kind})");
        Ok(Self {
            listener,
            endpoint,
            cycle: CycleController::new(source, config.cycle()),
            viewers: ViewerSet::new(events),
            disconnects,
            intro,
            latest: None,
        })
    }

    /// The bound endpoint (with the real port when binding port 0).
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        self.cycle.source_kind()
    }

    /// Run until `shutdown` resolves.
    ///
    /// # Errors
    /// Configuration errors from the instrumentation source (a second active
    /// source) end the loop. Viewer I/O errors never do.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tokio::pin!(shutdown);
        let result = loop {
            let deadline = self.cycle.deadline();
            let step = tokio::select! {
                () = &mut shutdown => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.connect(stream, peer).await,
                    Err(e) => {
                        warn!("Accept failed: {e}");
                        Ok(())
                    }
                },
                Some(id) = self.disconnects.recv() => self.disconnect(id),
                () = until(deadline) => self.complete_cycle().await,
            };
            if let Err(e) = step {
                break Err(e);
            }
        };

        self.cycle.shutdown()?;
        self.viewers.close_all().await;
        info!("Server on {} stopped", self.endpoint);
        result
    }

    async fn connect(&mut self, stream: ViewerStream, peer: String) -> Result<(), ServerError> {
        let id = self.viewers.add(stream, peer.clone());
        info!("Connected from {peer} (total: {})", self.viewers.len());

        let mut frames: Vec<&[u8]> = vec![self.intro.as_slice()];
        if let Some(latest) = &self.latest {
            frames.push(latest.as_slice());
        }
        if let Err(e) = self.viewers.send_to(id, &frames).await {
            warn!("Dropping {peer} ({id}) during greeting: {e}");
            self.viewers.remove(id);
            return Ok(());
        }

        self.cycle.viewer_joined()?;
        Ok(())
    }

    fn disconnect(&mut self, id: ViewerId) -> Result<(), ServerError> {
        // Watchers of viewers already dropped after a failed write still
        // report; those are stale.
        let Some(peer) = self.viewers.remove(id) else {
            return Ok(());
        };
        info!("Disconnected from {peer} (total: {})", self.viewers.len());
        if let Some(snapshot) = self.cycle.viewer_left()? {
            self.keep_latest(snapshot);
        }
        Ok(())
    }

    async fn complete_cycle(&mut self) -> Result<(), ServerError> {
        let snapshot = self.cycle.end_cycle()?;
        let mut failed = Vec::new();
        if self.keep_latest(snapshot) {
            if let Some(bytes) = &self.latest {
                failed = self.viewers.broadcast(bytes).await;
                debug!(
                    "Broadcast {} byte snapshot to {} viewers",
                    bytes.len(),
                    self.viewers.len() - failed.len()
                );
            }
        }
        for id in failed {
            self.disconnect(id)?;
        }
        self.cycle.resume()?;
        Ok(())
    }

    /// Encode `snapshot` and remember it for late joiners.
    fn keep_latest(&mut self, snapshot: Snapshot) -> bool {
        match Message::Snapshot(snapshot).encode() {
            Ok(bytes) => {
                self.latest = Some(bytes);
                true
            }
            Err(e) => {
                warn!("Discarding snapshot: {e}");
                false
            }
        }
    }
}
