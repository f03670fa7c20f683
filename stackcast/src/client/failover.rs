//! The reconnecting client.
//!
//! ```text
//!  ┌────────────┐  established / in-progress completes  ┌───────────┐
//!  │ Connecting │ ─────────────────────────────────────▶ │ Connected │
//!  └────────────┘                                        └───────────┘
//!     ▲   │ refused / missing: wait `backoff`                  │
//!     │   └──────────────┐                                     │ EOF, I/O or
//!     │                  ▼                                     │ protocol error
//!     │           ┌──────────────┐                             │
//!     └────────── │ Disconnected │ ◀───────────────────────────┘
//!    immediately  └──────────────┘
//! ```
//!
//! Everything the client learns is handed to the presentation layer as
//! [`FeedEvent`]s over a crossbeam channel; the state transitions above
//! surface as `Connected` and `Disconnected`. Only unclassifiable connect
//! errors and an incompatible server end [`FailoverClient::run`] with an
//! error; dropped connections never do.

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::time::Duration;

use stackcast_common::{MessageKind, ENCODING_VERSION};
use tokio::io::AsyncRead;
use tokio::time::sleep;

use super::connector::{classify, Connecting, Connector, EndpointConnector, FailureClass};
use super::{ClientConfig, FeedEvent};
use crate::domain::{ClientError, WireError};
use crate::wire::{read_frame, Frame, Message};

/// Delay before re-polling a connector that reported "in progress" as an error.
const IN_PROGRESS_POLL: Duration = Duration::from_millis(10);

/// Why a connected session ended.
enum SessionEnd {
    /// Connection lost or the server misbehaved: reconnect.
    Lost(String),
    /// The presentation layer hung up: stop quietly.
    Closed,
    Fatal(ClientError),
}

impl From<WireError> for SessionEnd {
    fn from(e: WireError) -> Self {
        if e.is_disconnect() {
            Self::Lost(e.to_string())
        } else {
            Self::Lost(format!("protocol error: {e}"))
        }
    }
}

/// Streams snapshots from a server, reconnecting forever.
pub struct FailoverClient<C: Connector> {
    connector: C,
    config: ClientConfig,
    events: Sender<FeedEvent>,
    attempts: u64,
}

impl FailoverClient<EndpointConnector> {
    /// Client for `config.endpoint`.
    #[must_use]
    pub fn connect_to(config: ClientConfig, events: Sender<FeedEvent>) -> Self {
        let connector = EndpointConnector::new(config.endpoint.clone());
        Self::new(connector, config, events)
    }
}

impl<C: Connector> FailoverClient<C> {
    #[must_use]
    pub fn new(connector: C, config: ClientConfig, events: Sender<FeedEvent>) -> Self {
        Self { connector, config, events, attempts: 0 }
    }

    /// Run until `shutdown` resolves, the event receiver is dropped, or a
    /// fatal error occurs. Shutdown aborts any in-flight connect and any
    /// pending reconnect delay.
    ///
    /// # Errors
    /// [`ClientError::Fatal`] for unclassifiable connect errors,
    /// [`ClientError::IncompatibleVersion`] for a server speaking another
    /// encoding version.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ClientError> {
        tokio::select! {
            () = shutdown => Ok(()),
            result = self.reconnect_forever() => result,
        }
    }

    async fn reconnect_forever(&mut self) -> Result<(), ClientError> {
        loop {
            let Some(stream) = self.establish().await? else {
                continue;
            };

            info!("Connected to {}", self.connector.target());
            let reason = match self.session(stream).await {
                SessionEnd::Lost(reason) => reason,
                SessionEnd::Closed => return Ok(()),
                SessionEnd::Fatal(e) => return Err(e),
            };

            // A lost connection is retried immediately.
            warn!("Connection to {} lost ({reason}); reconnecting", self.connector.target());
            if !self.emit(FeedEvent::Disconnected { reason }) {
                return Ok(());
            }
        }
    }

    /// One connection attempt; `Ok(None)` after a failure worth retrying
    /// (the backoff has already elapsed).
    async fn establish(&mut self) -> Result<Option<C::Stream>, ClientError> {
        self.attempts += 1;
        debug!("Connecting to {} (attempt {})", self.connector.target(), self.attempts);

        let pending = match self.connector.connect() {
            Ok(Connecting::Established(stream)) => return Ok(Some(stream)),
            Ok(Connecting::InProgress(pending)) => pending,
            Err(e) => return self.after_failure(e).await.map(|()| None),
        };

        // Waiting for writability.
        let outcome = match self.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            },
            None => pending.await,
        };
        match outcome {
            Ok(stream) => Ok(Some(stream)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!(
                    "Connecting to {} timed out; retrying in {:?}",
                    self.connector.target(),
                    self.config.backoff
                );
                sleep(self.config.backoff).await;
                Ok(None)
            }
            Err(e) => self.after_failure(e).await.map(|()| None),
        }
    }

    async fn after_failure(&mut self, err: io::Error) -> Result<(), ClientError> {
        match classify(&err) {
            class @ (FailureClass::Refused | FailureClass::Missing) => {
                warn!(
                    "Cannot connect to {} ({class}); retrying in {:?}",
                    self.connector.target(),
                    self.config.backoff
                );
                sleep(self.config.backoff).await;
                Ok(())
            }
            FailureClass::InProgress => {
                sleep(IN_PROGRESS_POLL).await;
                Ok(())
            }
            FailureClass::Fatal => {
                Err(ClientError::Fatal { endpoint: self.connector.target(), source: err })
            }
        }
    }

    async fn session(&mut self, mut stream: C::Stream) -> SessionEnd {
        match self.handshake(&mut stream).await {
            Ok(()) => {}
            Err(end) => return end,
        }

        let mut active = true;
        let mut seen_snapshot = false;
        loop {
            let frame = match self.next_frame(&mut stream, seen_snapshot, &mut active).await {
                Ok(frame) => frame,
                Err(end) => return end,
            };
            let snapshot = match Message::expect(&frame, MessageKind::Snapshot) {
                Ok(Message::Snapshot(snapshot)) => snapshot,
                Ok(_) => continue,
                Err(e) => return e.into(),
            };
            seen_snapshot = true;
            if !active {
                active = true;
                if !self.emit(FeedEvent::Active) {
                    return SessionEnd::Closed;
                }
            }
            if !self.emit(FeedEvent::Snapshot(snapshot)) {
                return SessionEnd::Closed;
            }
        }
    }

    /// GREETING then SOURCE_KIND.
    async fn handshake(&mut self, stream: &mut C::Stream) -> Result<(), SessionEnd> {
        let frame = expect_frame(stream).await?;
        let Message::Greeting(greeting) = Message::expect(&frame, MessageKind::Greeting)? else {
            return Err(SessionEnd::Lost("malformed greeting".to_string()));
        };
        if greeting.encoding_version != ENCODING_VERSION {
            return Err(SessionEnd::Fatal(ClientError::IncompatibleVersion {
                ours: ENCODING_VERSION,
                theirs: greeting.encoding_version,
            }));
        }
        debug!("Greeted by {}", greeting.server);
        if !self.emit(FeedEvent::Connected { server: greeting.server }) {
            return Err(SessionEnd::Closed);
        }

        let frame = expect_frame(stream).await?;
        let Message::SourceKind(kind) = Message::expect(&frame, MessageKind::SourceKind)? else {
            return Err(SessionEnd::Lost("malformed source kind".to_string()));
        };
        if !self.emit(FeedEvent::SourceKind(kind)) {
            return Err(SessionEnd::Closed);
        }
        Ok(())
    }

    /// Next frame, marking the feed inactive if snapshots stop arriving.
    ///
    /// The read future is kept across timer firings so no partial frame
    /// is ever lost.
    async fn next_frame(
        &mut self,
        stream: &mut C::Stream,
        armed: bool,
        active: &mut bool,
    ) -> Result<Frame, SessionEnd> {
        let inactivity = self.config.inactivity_timeout.filter(|_| armed);
        let read = expect_frame(stream);
        tokio::pin!(read);
        loop {
            let limit = inactivity.filter(|_| *active);
            let timer = async move {
                match limit {
                    Some(limit) => sleep(limit).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                frame = &mut read => return frame,
                () = timer => {
                    *active = false;
                    if !self.emit(FeedEvent::Inactive) {
                        return Err(SessionEnd::Closed);
                    }
                }
            }
        }
    }

    /// Hand an event to the presentation layer; `false` once it is gone.
    fn emit(&self, event: FeedEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!("Presentation layer busy, dropping {}", event.name());
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

async fn expect_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Frame, SessionEnd> {
    match read_frame(stream).await? {
        Some(frame) => Ok(frame),
        None => Err(SessionEnd::Lost("closed by server".to_string())),
    }
}
