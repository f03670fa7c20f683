//! The set of connected viewers.
//!
//! Each viewer's stream is split: the server keeps the write half for
//! broadcasting, and a small watcher task owns the read half. Viewers never
//! send anything, so the watcher's only job is to notice end-of-stream or a
//! transport error and report [`ViewerId`] back to the reactor.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::domain::WireError;
use crate::transport::ViewerStream;
use crate::wire::write_encoded;

/// Time budget for one broadcast (or one intro), shared by every write in
/// it. Viewers still stalled when it runs out are dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-assigned connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewerId(pub u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer#{}", self.0)
    }
}

struct Viewer {
    peer: String,
    writer: WriteHalf<ViewerStream>,
    watcher: JoinHandle<()>,
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch(mut reader: ReadHalf<ViewerStream>, id: ViewerId, events: UnboundedSender<ViewerId>) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => debug!("Ignoring {n} bytes from {id}"),
            Err(e) => {
                debug!("Read error from {id}: {e}");
                break;
            }
        }
    }
    // The reactor may already be gone during shutdown.
    let _ = events.send(id);
}

/// Connected viewers, in connection order.
pub struct ViewerSet {
    viewers: BTreeMap<ViewerId, Viewer>,
    next_id: u64,
    events: UnboundedSender<ViewerId>,
}

impl ViewerSet {
    /// Watchers report disconnects on `events`.
    #[must_use]
    pub fn new(events: UnboundedSender<ViewerId>) -> Self {
        Self { viewers: BTreeMap::new(), next_id: 0, events }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ViewerId) -> bool {
        self.viewers.contains_key(&id)
    }

    #[must_use]
    pub fn peer(&self, id: ViewerId) -> Option<&str> {
        self.viewers.get(&id).map(|v| v.peer.as_str())
    }

    /// Register a connection and start watching it.
    pub fn add(&mut self, stream: ViewerStream, peer: String) -> ViewerId {
        let id = ViewerId(self.next_id);
        self.next_id += 1;
        let (reader, writer) = split(stream);
        let watcher = tokio::spawn(watch(reader, id, self.events.clone()));
        self.viewers.insert(id, Viewer { peer, writer, watcher });
        id
    }

    /// Drop a connection; returns its peer name if it was present.
    pub fn remove(&mut self, id: ViewerId) -> Option<String> {
        self.viewers.remove(&id).map(|viewer| viewer.peer.clone())
    }

    /// Send encoded frames to one viewer.
    ///
    /// # Errors
    /// Returns the write error or a timeout; the caller disconnects the viewer.
    pub async fn send_to(&mut self, id: ViewerId, frames: &[&[u8]]) -> std::io::Result<()> {
        let Some(viewer) = self.viewers.get_mut(&id) else {
            return Ok(());
        };
        let deadline = Instant::now() + WRITE_TIMEOUT;
        for bytes in frames {
            send(&mut viewer.writer, bytes, deadline).await?;
        }
        Ok(())
    }

    /// Send `bytes` to every viewer.
    ///
    /// A failing viewer never stops delivery to the others, and all writes
    /// share one [`WRITE_TIMEOUT`] budget. The ids that failed are returned
    /// for the caller to disconnect afterwards.
    pub async fn broadcast(&mut self, bytes: &[u8]) -> Vec<ViewerId> {
        let deadline = Instant::now() + WRITE_TIMEOUT;
        let mut failed = Vec::new();
        for (id, viewer) in &mut self.viewers {
            if let Err(e) = send(&mut viewer.writer, bytes, deadline).await {
                warn!("Dropping {} ({}): {e}", viewer.peer, id);
                failed.push(*id);
            }
        }
        failed
    }

    /// Flush and close every connection.
    pub async fn close_all(&mut self) {
        for (_, mut viewer) in std::mem::take(&mut self.viewers) {
            let _ = viewer.writer.shutdown().await;
        }
    }
}

async fn send(writer: &mut WriteHalf<ViewerStream>, bytes: &[u8], deadline: Instant) -> std::io::Result<()> {
    // A write that completes on its first poll succeeds even past the deadline.
    match timeout_at(deadline, write_encoded(writer, bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(WireError::Io(e))) => Err(e),
        Ok(Err(e)) => Err(std::io::Error::other(e)),
        Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")),
    }
}
