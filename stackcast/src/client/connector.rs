//! Connection attempts and failure classification.
//!
//! A [`Connector`] makes one non-blocking connection attempt. The attempt
//! either completes on the spot, is still in flight (the socket is waiting
//! to become writable), or fails. Failures are sorted into the categories
//! that drive the failover client's reconnect policy:
//!
//! | Failure                          | Class                       | Client reaction        |
//! |----------------------------------|-----------------------------|------------------------|
//! | `ECONNREFUSED`                   | [`FailureClass::Refused`]    | retry after backoff    |
//! | `ENOENT` (socket file not there) | [`FailureClass::Missing`]    | retry after backoff    |
//! | `EINPROGRESS`, `EWOULDBLOCK`     | [`FailureClass::InProgress`] | keep waiting, no error |
//! | anything else                    | [`FailureClass::Fatal`]      | surfaced to the caller |

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::AsyncRead;
use tokio::net::{TcpStream, UnixStream};

use crate::transport::{Endpoint, ViewerStream};

/// A connection that is still being established.
pub type PendingConnect<S> = Pin<Box<dyn Future<Output = io::Result<S>> + Send>>;

/// Outcome of one connection attempt that did not fail outright.
pub enum Connecting<S> {
    Established(S),
    /// Completes once the socket is writable (or the attempt fails).
    InProgress(PendingConnect<S>),
}

impl<S> fmt::Debug for Connecting<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Established(_) => f.write_str("Established"),
            Self::InProgress(_) => f.write_str("InProgress"),
        }
    }
}

/// Makes connection attempts to one fixed target.
pub trait Connector: Send {
    type Stream: AsyncRead + Unpin + Send;

    /// Start one attempt. Must not block.
    ///
    /// # Errors
    /// Returns the OS error of a failed attempt, to be classified.
    fn connect(&mut self) -> io::Result<Connecting<Self::Stream>>;

    /// Human-readable target, for logs and errors.
    fn target(&self) -> String;
}

/// Connects to an [`Endpoint`] over TCP or a unix domain socket.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: Endpoint,
}

impl EndpointConnector {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl Connector for EndpointConnector {
    type Stream = ViewerStream;

    fn connect(&mut self) -> io::Result<Connecting<ViewerStream>> {
        let endpoint = self.endpoint.clone();
        let mut attempt: PendingConnect<ViewerStream> = Box::pin(async move {
            let stream: ViewerStream = match endpoint {
                Endpoint::Tcp(addr) => {
                    let stream = TcpStream::connect(addr).await?;
                    stream.set_nodelay(true)?;
                    Box::new(stream)
                }
                Endpoint::Unix(path) => Box::new(UnixStream::connect(path).await?),
            };
            Ok(stream)
        });
        // Poll once: immediate success or failure is reported as such, a
        // pending socket becomes an in-flight attempt.
        match (&mut attempt).now_or_never() {
            Some(Ok(stream)) => Ok(Connecting::Established(stream)),
            Some(Err(e)) => Err(e),
            None => Ok(Connecting::InProgress(attempt)),
        }
    }

    fn target(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Reconnect category of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Nobody is listening yet.
    Refused,
    /// The endpoint does not exist yet (socket file not created).
    Missing,
    /// Not a failure: the connection is still being established.
    InProgress,
    /// Anything else; retrying will not help.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Refused => "connection refused",
            Self::Missing => "endpoint missing",
            Self::InProgress => "connection in progress",
            Self::Fatal => "fatal",
        })
    }
}

/// Sort a connect error into its reconnect category.
#[must_use]
pub fn classify(err: &io::Error) -> FailureClass {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => return FailureClass::Refused,
        io::ErrorKind::NotFound => return FailureClass::Missing,
        io::ErrorKind::WouldBlock => return FailureClass::InProgress,
        _ => {}
    }
    match err.raw_os_error() {
        Some(libc::ECONNREFUSED) => FailureClass::Refused,
        Some(libc::ENOENT) => FailureClass::Missing,
        Some(libc::EINPROGRESS | libc::EALREADY | libc::EAGAIN) => FailureClass::InProgress,
        _ => FailureClass::Fatal,
    }
}
