//! Transport endpoints: TCP `host:port` or a local (unix domain) socket path.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};

use crate::domain::ServerError;

/// Anything a viewer connection can run over.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// A connected byte stream, transport erased.
pub type ViewerStream = Box<dyn ByteStream>;

/// Where a server listens or a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = String;

    /// `HOST:PORT` (port numeric) is TCP; anything else is a socket path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty endpoint".to_string());
        }
        if !s.contains('/') {
            if let Some((host, port)) = s.rsplit_once(':') {
                if port.parse::<u16>().is_ok() {
                    let host = if host.is_empty() { "127.0.0.1" } else { host };
                    return Ok(Self::Tcp(format!("{host}:{port}")));
                }
                return Err(format!("invalid port in '{s}'"));
            }
        }
        Ok(Self::Unix(PathBuf::from(s)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => f.write_str(addr),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Removes a bound socket file when the listener goes away.
#[derive(Debug)]
struct SocketFile(PathBuf);

impl Drop for SocketFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// A bound, accepting endpoint.
#[derive(Debug)]
pub struct Listener {
    inner: Bound,
}

#[derive(Debug)]
enum Bound {
    Tcp(TcpListener),
    Unix { listener: UnixListener, file: SocketFile },
}

impl Listener {
    /// Bind `endpoint`. An existing socket file is never removed.
    ///
    /// # Errors
    /// [`ServerError::AddressInUse`] if the address or path is taken,
    /// [`ServerError::Bind`] for any other bind failure.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, ServerError> {
        let classify = |source: io::Error| {
            if source.kind() == io::ErrorKind::AddrInUse {
                ServerError::AddressInUse(endpoint.to_string())
            } else {
                ServerError::Bind { endpoint: endpoint.to_string(), source }
            }
        };
        let inner = match endpoint {
            Endpoint::Tcp(addr) => Bound::Tcp(TcpListener::bind(addr).await.map_err(classify)?),
            Endpoint::Unix(path) => {
                let listener = UnixListener::bind(path).map_err(classify)?;
                Bound::Unix { listener, file: SocketFile(path.clone()) }
            }
        };
        Ok(Self { inner })
    }

    /// The endpoint actually bound (resolves port 0).
    ///
    /// # Errors
    /// Returns the OS error if the local address cannot be queried.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match &self.inner {
            Bound::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            Bound::Unix { file, .. } => Ok(Endpoint::Unix(file.0.clone())),
        }
    }

    /// Accept one connection, with a printable peer name.
    ///
    /// # Errors
    /// Returns the accept error.
    pub async fn accept(&self) -> io::Result<(ViewerStream, String)> {
        match &self.inner {
            Bound::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), addr.to_string()))
            }
            Bound::Unix { listener, file } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), file.0.display().to_string()))
            }
        }
    }
}

/// Whether `source` names an existing regular file (a dump, not an endpoint).
#[must_use]
pub fn is_dump_file(source: &str) -> bool {
    Path::new(source).is_file()
}
