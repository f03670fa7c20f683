//! Typed protocol messages.
//!
//! Payloads are JSON: self-describing, so a viewer can decode them without
//! a schema, and flat enough (the frozen tree is an arena) that arbitrarily
//! deep call trees stay within the decoder's nesting limit.

use serde::{Deserialize, Serialize};
use stackcast_common::{MessageKind, SourceKind, ENCODING_VERSION};

use super::frame::{encode, Frame};
use crate::domain::WireError;
use crate::snapshot::Snapshot;

/// First message on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub encoding_version: u32,
    /// Free-form server identification (name and version).
    pub server: String,
}

impl Greeting {
    /// Greeting for this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            encoding_version: ENCODING_VERSION,
            server: format!("stackcast {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Every message a server can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Greeting(Greeting),
    SourceKind(SourceKind),
    Snapshot(Snapshot),
}

impl Message {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Greeting(_) => MessageKind::Greeting,
            Self::SourceKind(_) => MessageKind::SourceKind,
            Self::Snapshot(_) => MessageKind::Snapshot,
        }
    }

    /// Serialize into a complete frame.
    ///
    /// # Errors
    /// Payload serialization failure or a payload over the frame limit.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let payload = match self {
            Self::Greeting(greeting) => serde_json::to_vec(greeting)?,
            Self::SourceKind(kind) => serde_json::to_vec(kind)?,
            Self::Snapshot(snapshot) => serde_json::to_vec(snapshot)?,
        };
        encode(self.kind(), &payload)
    }

    /// Decode a frame's payload according to its kind.
    ///
    /// # Errors
    /// Returns [`WireError::Payload`] if the payload does not match its kind.
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        Ok(match frame.kind {
            MessageKind::Greeting => Self::Greeting(serde_json::from_slice(&frame.payload)?),
            MessageKind::SourceKind => Self::SourceKind(serde_json::from_slice(&frame.payload)?),
            MessageKind::Snapshot => Self::Snapshot(serde_json::from_slice(&frame.payload)?),
        })
    }

    /// Decode a frame and require a specific kind.
    ///
    /// # Errors
    /// [`WireError::UnexpectedKind`] when the frame has a different kind.
    pub fn expect(frame: &Frame, expected: MessageKind) -> Result<Self, WireError> {
        if frame.kind != expected {
            return Err(WireError::UnexpectedKind { expected, got: frame.kind });
        }
        Self::from_frame(frame)
    }
}
