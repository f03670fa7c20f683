//! Frame encoding: `[kind: u8][len: u32 BE][payload]`.
//!
//! Both a slice-based codec (for buffers and dump files) and async
//! reader/writer helpers (for the reactors) live here. A frame that cannot
//! be completed before its stream ends is reported as
//! [`WireError::Truncated`], which callers treat as a disconnect.

use std::io::{Read, Write};

use stackcast_common::{FrameHeader, MessageKind, FRAME_HEADER_LEN, MAX_PAYLOAD_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::WireError;

/// One decoded frame with its payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

fn checked_len(len: usize) -> Result<u32, WireError> {
    u32::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_LEN)
        .ok_or(WireError::FrameTooLarge(len as u64))
}

fn parse_header(bytes: [u8; FRAME_HEADER_LEN]) -> Result<(MessageKind, usize), WireError> {
    let header = FrameHeader::from_bytes(bytes);
    let kind = MessageKind::from_byte(header.kind).ok_or(WireError::UnknownKind(header.kind))?;
    if header.len > MAX_PAYLOAD_LEN {
        return Err(WireError::FrameTooLarge(u64::from(header.len)));
    }
    Ok((kind, header.len as usize))
}

// ============================================================================
// Slice codec
// ============================================================================

/// Encode one frame.
///
/// # Errors
/// Returns [`WireError::FrameTooLarge`] if the payload exceeds the protocol limit.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let header = FrameHeader::new(kind, checked_len(payload.len())?);
    let mut bytes = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Decode the frame at the start of `bytes`.
///
/// Returns the frame and the number of bytes it occupied, so several frames
/// can be decoded back to back from one buffer.
///
/// # Errors
/// [`WireError::Truncated`] if `bytes` ends before the frame does, plus the
/// header errors ([`WireError::UnknownKind`], [`WireError::FrameTooLarge`]).
pub fn decode(bytes: &[u8]) -> Result<(Frame, usize), WireError> {
    let Some(header) = bytes.get(..FRAME_HEADER_LEN) else {
        return Err(WireError::Truncated { expected: FRAME_HEADER_LEN, got: bytes.len() });
    };
    let mut raw = [0u8; FRAME_HEADER_LEN];
    raw.copy_from_slice(header);
    let (kind, len) = parse_header(raw)?;

    let body = &bytes[FRAME_HEADER_LEN..];
    if body.len() < len {
        return Err(WireError::Truncated { expected: len, got: body.len() });
    }
    Ok((Frame::new(kind, body[..len].to_vec()), FRAME_HEADER_LEN + len))
}

// ============================================================================
// Blocking streams (dump files)
// ============================================================================

fn read_full_blocking<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one frame from a blocking reader; `Ok(None)` on a clean end of stream.
///
/// # Errors
/// Same as [`decode`], plus I/O errors.
pub fn read_frame_blocking<R: Read>(reader: &mut R) -> Result<Option<Frame>, WireError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match read_full_blocking(reader, &mut header)? {
        0 => return Ok(None),
        n if n < FRAME_HEADER_LEN => {
            return Err(WireError::Truncated { expected: FRAME_HEADER_LEN, got: n })
        }
        _ => {}
    }
    let (kind, len) = parse_header(header)?;
    let mut payload = vec![0u8; len];
    let got = read_full_blocking(reader, &mut payload)?;
    if got < len {
        return Err(WireError::Truncated { expected: len, got });
    }
    Ok(Some(Frame::new(kind, payload)))
}

/// Write one frame to a blocking writer.
///
/// # Errors
/// [`WireError::FrameTooLarge`] or the underlying I/O error.
pub fn write_frame_blocking<W: Write>(
    writer: &mut W,
    kind: MessageKind,
    payload: &[u8],
) -> Result<(), WireError> {
    writer.write_all(&encode(kind, payload)?)?;
    Ok(())
}

// ============================================================================
// Async streams (reactors)
// ============================================================================

async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one frame; `Ok(None)` when the peer closed cleanly between frames.
///
/// # Errors
/// [`WireError::Truncated`] when the stream ends mid-frame, header errors,
/// or the underlying I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, WireError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match read_full(reader, &mut header).await? {
        0 => return Ok(None),
        n if n < FRAME_HEADER_LEN => {
            return Err(WireError::Truncated { expected: FRAME_HEADER_LEN, got: n })
        }
        _ => {}
    }
    let (kind, len) = parse_header(header)?;
    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload).await?;
    if got < len {
        return Err(WireError::Truncated { expected: len, got });
    }
    Ok(Some(Frame::new(kind, payload)))
}

/// Write pre-encoded frame bytes and flush.
///
/// # Errors
/// Returns the underlying I/O error.
pub async fn write_encoded<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), WireError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcast_common::KIND_SNAPSHOT;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(MessageKind::Snapshot, b"abc").expect("encode");
        assert_eq!(bytes, [KIND_SNAPSHOT, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut buf = encode(MessageKind::Greeting, b"hi").expect("encode");
        buf.extend(encode(MessageKind::SourceKind, b"").expect("encode"));

        let (first, used) = decode(&buf).expect("first");
        assert_eq!(first, Frame::new(MessageKind::Greeting, b"hi".to_vec()));
        let (second, rest) = decode(&buf[used..]).expect("second");
        assert_eq!(second.kind, MessageKind::SourceKind);
        assert!(second.payload.is_empty());
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut bytes = encode(MessageKind::Snapshot, b"abcdef").expect("encode");
        bytes.truncate(8);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::Truncated { expected: 6, got: 3 }));
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_unknown_kind_and_oversized_length() {
        let err = decode(&[42, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, WireError::UnknownKind(42)));

        let err = decode(&[1, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[test]
    fn test_blocking_reader_clean_end() {
        let bytes = encode(MessageKind::Greeting, b"x").expect("encode");
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(read_frame_blocking(&mut cursor).expect("frame").is_some());
        assert!(read_frame_blocking(&mut cursor).expect("eof").is_none());
    }

    #[tokio::test]
    async fn test_async_stream_closing_mid_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bytes = encode(MessageKind::Snapshot, b"0123456789").expect("encode");
        write_encoded(&mut client, &bytes[..9]).await.expect("write");
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::Truncated { expected: 10, got: 4 }));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bytes = encode(MessageKind::SourceKind, b"\"tracing\"").expect("encode");
        write_encoded(&mut client, &bytes).await.expect("write");
        drop(client);

        let frame = read_frame(&mut server).await.expect("read").expect("frame");
        assert_eq!(frame.kind, MessageKind::SourceKind);
        assert_eq!(frame.payload, b"\"tracing\"");
        assert!(read_frame(&mut server).await.expect("eof").is_none());
    }
}
