//! # Shared Wire Definitions (Server ↔ Viewer)
//!
//! Defines the constants and small value types both ends of a stackcast
//! connection agree on. Kept dependency-free so a third-party viewer can
//! speak the protocol without pulling in the profiler itself.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌──────────┬──────────────────────┬────────────────────────┐
//! │ kind: u8 │ length: u32 (BE)     │ payload: length bytes  │
//! └──────────┴──────────────────────┴────────────────────────┘
//! ```
//!
//! ## Key Types
//!
//! - [`MessageKind`] - The one-byte frame discriminator
//! - [`SourceKind`] - Which instrumentation strategy produced the data
//! - [`FrameHeader`] - Encode/decode of the 5-byte header

#![no_std]

// ============================================================================
// Protocol Constants
// ============================================================================

/// Version of the payload encoding carried in every `GREETING`.
///
/// Bumped whenever the snapshot payload layout changes incompatibly.
/// Viewers refuse to stream from a server announcing a different version.
pub const ENCODING_VERSION: u32 = 1;

/// Size of the fixed frame header: 1 kind byte + 4 length bytes.
pub const FRAME_HEADER_LEN: usize = 5;

/// Upper bound on a single frame payload (256 MiB).
///
/// A declared length above this is a protocol error, not an allocation.
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

/// **Greeting**: first frame on every connection
///
/// Payload: negotiated encoding version and server identification.
pub const KIND_GREETING: u8 = 1;

/// **Source kind**: second frame on every connection
///
/// Payload: the [`SourceKind`] that produces the snapshots.
pub const KIND_SOURCE_KIND: u8 = 2;

/// **Snapshot**: one per completed measurement cycle
///
/// Payload: a frozen or flattened statistics tree plus cycle totals.
pub const KIND_SNAPSHOT: u8 = 3;

// ============================================================================
// Message Kinds
// ============================================================================

/// Frame discriminator.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    Greeting = KIND_GREETING,
    SourceKind = KIND_SOURCE_KIND,
    Snapshot = KIND_SNAPSHOT,
}

impl MessageKind {
    /// Decode a kind byte, `None` for anything this version does not know.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            KIND_GREETING => Some(Self::Greeting),
            KIND_SOURCE_KIND => Some(Self::SourceKind),
            KIND_SNAPSHOT => Some(Self::Snapshot),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::SourceKind => "SOURCE_KIND",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Instrumentation Source Kinds
// ============================================================================

/// Which instrumentation strategy filled the statistics tree.
///
/// Viewers need this to pick matching columns: tracing produces call counts
/// and timings, sampling produces hit counts only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceKind {
    /// Every entry/exit is recorded (deterministic).
    Tracing,
    /// Periodic sampling driven by the process CPU clock.
    TimerSampling,
    /// Periodic sampling by a polling thread on the wall clock.
    ThreadSampling,
}

impl SourceKind {
    /// Whether `deep_time` / `own_time` columns carry real data.
    #[must_use]
    pub const fn records_time(self) -> bool {
        matches!(self, Self::Tracing)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tracing => "tracing",
            Self::TimerSampling => "timer-sampling",
            Self::ThreadSampling => "thread-sampling",
        }
    }
}

impl core::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Frame Header
// ============================================================================

/// Decoded 5-byte frame header.
///
/// The kind byte is kept raw so that unknown kinds can be reported with
/// their value instead of being silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: u8,
    pub len: u32,
}

impl FrameHeader {
    #[must_use]
    pub const fn new(kind: MessageKind, len: u32) -> Self {
        Self { kind: kind.as_byte(), len }
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; FRAME_HEADER_LEN] {
        let len = self.len.to_be_bytes();
        [self.kind, len[0], len[1], len[2], len[3]]
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; FRAME_HEADER_LEN]) -> Self {
        Self { kind: bytes[0], len: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_big_endian() {
        let header = FrameHeader::new(MessageKind::Snapshot, 0x0102_0304);
        assert_eq!(header.to_bytes(), [KIND_SNAPSHOT, 1, 2, 3, 4]);
        assert_eq!(FrameHeader::from_bytes(header.to_bytes()), header);
    }

    #[test]
    fn test_unknown_kind_byte() {
        assert_eq!(MessageKind::from_byte(0), None);
        assert_eq!(MessageKind::from_byte(KIND_GREETING), Some(MessageKind::Greeting));
    }

    #[test]
    fn test_only_tracing_records_time() {
        assert!(SourceKind::Tracing.records_time());
        assert!(!SourceKind::ThreadSampling.records_time());
        assert!(!SourceKind::TimerSampling.records_time());
    }
}
