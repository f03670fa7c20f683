//! Structured error types for stackcast
//!
//! Using thiserror for automatic Display implementation and error chaining.

use stackcast_common::{MessageKind, SourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Another instrumentation source ({0}) is already active")]
    AlreadyActive(SourceKind),

    #[error("Measurement cycle is already running")]
    AlreadyRunning,

    #[error("Measurement cycle was not started")]
    NotRunning,

    #[error("Failed to read clock: {0}")]
    Clock(std::io::Error),

    #[error("Failed to spawn instrumentation thread: {0}")]
    Spawn(std::io::Error),

    #[error("Stack provider failed: {0}")]
    StackUnavailable(String),
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Stream closed after {got} of {expected} bytes")]
    Truncated { expected: usize, got: usize },

    #[error("Frame payload of {0} bytes exceeds the protocol limit")]
    FrameTooLarge(u64),

    #[error("Unknown message kind byte: {0}")]
    UnknownKind(u8),

    #[error("Expected {expected} frame, got {got}")]
    UnexpectedKind { expected: MessageKind, got: MessageKind },

    #[error("Failed to encode or decode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether this error means "the peer is gone" rather than a local bug.
    ///
    /// A frame that cannot be completed before the stream closes is treated
    /// exactly like a disconnect.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::Io(_))
    }
}

/// A decoded tree whose arena layout is broken.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Snapshot has no root node")]
    MissingRoot,

    #[error("Node {parent} refers to child {child} outside a {len}-node arena")]
    ChildOutOfRange { parent: usize, child: u32, len: usize },

    #[error("Node {parent} refers to child {child}, which does not follow it")]
    ChildBeforeParent { parent: usize, child: u32 },

    #[error("Node {0} has more than one parent")]
    SharedChild(u32),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Address already in use: {0}")]
    AddressInUse(String),

    #[error("Failed to bind {endpoint}: {source}")]
    Bind { endpoint: String, source: std::io::Error },

    #[error(transparent)]
    Profiler(#[from] ProfilerError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot connect to {endpoint}: {source}")]
    Fatal { endpoint: String, source: std::io::Error },

    #[error("Server speaks encoding version {theirs}, this viewer speaks {ours}")]
    IncompatibleVersion { ours: u32, theirs: u32 },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Dump is missing its {0} frame")]
    MissingFrame(MessageKind),

    #[error("Dump was written with encoding version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
