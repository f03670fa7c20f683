//! Snapshot dump files.
//!
//! A dump is exactly what a viewer would have received over the wire for
//! one snapshot, so `view` can replay it with the same decoder:
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────────────┐
//! │ GREETING     │ SOURCE_KIND     │ SNAPSHOT         │
//! │ [kind][len]… │ [kind][len]…    │ [kind][len]…     │
//! └──────────────┴─────────────────┴──────────────────┘
//! ```

use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use stackcast_common::{MessageKind, SourceKind, ENCODING_VERSION};

use crate::domain::{ExportError, WireError};
use crate::snapshot::Snapshot;
use crate::wire::{read_frame_blocking, write_frame_blocking, Greeting, Message};

/// Contents of a dump file.
#[derive(Debug, Clone, PartialEq)]
pub struct Dump {
    pub source_kind: SourceKind,
    pub snapshot: Snapshot,
}

/// Write a dump to `path`, replacing any existing file.
///
/// # Errors
/// I/O or encoding failure.
pub fn save(path: &Path, source_kind: SourceKind, snapshot: &Snapshot) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_dump(&mut writer, source_kind, snapshot)?;
    writer.flush()?;
    debug!("Saved {} snapshot to {}", source_kind, path.display());
    Ok(())
}

/// Read the dump at `path`.
///
/// # Errors
/// See [`read_dump`].
pub fn load(path: &Path) -> Result<Dump, ExportError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_dump(&mut reader)
}

/// # Errors
/// I/O or encoding failure.
pub fn write_dump<W: Write>(
    writer: &mut W,
    source_kind: SourceKind,
    snapshot: &Snapshot,
) -> Result<(), ExportError> {
    writer.write_all(&Message::Greeting(Greeting::current()).encode()?)?;
    writer.write_all(&Message::SourceKind(source_kind).encode()?)?;
    let payload = serde_json::to_vec(snapshot).map_err(WireError::from)?;
    write_frame_blocking(writer, MessageKind::Snapshot, &payload)?;
    Ok(())
}

/// # Errors
/// [`ExportError::MissingFrame`] when the stream ends early,
/// [`ExportError::UnsupportedVersion`] for another encoding version,
/// [`ExportError::Wire`] for malformed or out-of-order frames.
pub fn read_dump<R: Read>(reader: &mut R) -> Result<Dump, ExportError> {
    let Message::Greeting(greeting) = next(reader, MessageKind::Greeting)? else {
        return Err(ExportError::MissingFrame(MessageKind::Greeting));
    };
    if greeting.encoding_version != ENCODING_VERSION {
        return Err(ExportError::UnsupportedVersion(greeting.encoding_version));
    }
    let Message::SourceKind(source_kind) = next(reader, MessageKind::SourceKind)? else {
        return Err(ExportError::MissingFrame(MessageKind::SourceKind));
    };
    let Message::Snapshot(snapshot) = next(reader, MessageKind::Snapshot)? else {
        return Err(ExportError::MissingFrame(MessageKind::Snapshot));
    };
    Ok(Dump { source_kind, snapshot })
}

fn next<R: Read>(reader: &mut R, kind: MessageKind) -> Result<Message, ExportError> {
    let frame = read_frame_blocking(reader)?.ok_or(ExportError::MissingFrame(kind))?;
    Ok(Message::expect(&frame, kind)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallSite;
    use crate::snapshot::{Flatten, FrozenSnapshot};
    use crate::stats::RootStats;
    use crate::wire::encode;

    fn sample_snapshot() -> Snapshot {
        let root = RootStats::new();
        let main = CallSite::new("main", "src/main.rs", 1);
        let work = CallSite::new("work", "src/work.rs", 7);
        root.record_sample(&[main.clone(), work.clone()]);
        root.record_sample(&[main.clone(), work]);
        root.record_sample(&[main]);
        Snapshot::Tree(FrozenSnapshot::freeze(&root))
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profile.dump");
        let snapshot = sample_snapshot();

        save(&path, SourceKind::ThreadSampling, &snapshot).expect("save");
        let dump = load(&path).expect("load");

        assert_eq!(dump.source_kind, SourceKind::ThreadSampling);
        assert_eq!(dump.snapshot, snapshot);
    }

    #[test]
    fn test_dump_bytes_match_wire_messages() {
        let snapshot = Snapshot::Flat(sample_snapshot().flatten());
        let mut bytes = Vec::new();
        write_dump(&mut bytes, SourceKind::Tracing, &snapshot).expect("write");

        let mut expected = Message::Greeting(Greeting::current()).encode().expect("encode");
        expected.extend(Message::SourceKind(SourceKind::Tracing).encode().expect("encode"));
        expected.extend(Message::Snapshot(snapshot).encode().expect("encode"));
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_truncated_dump_reports_missing_frame() {
        let mut bytes = Message::Greeting(Greeting::current()).encode().expect("encode");
        bytes.extend(Message::SourceKind(SourceKind::Tracing).encode().expect("encode"));

        let err = read_dump(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ExportError::MissingFrame(MessageKind::Snapshot)));
    }

    #[test]
    fn test_other_version_is_rejected() {
        let greeting = Greeting { encoding_version: ENCODING_VERSION + 7, server: "later".to_string() };
        let bytes = Message::Greeting(greeting).encode().expect("encode");

        let err = read_dump(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedVersion(v) if v == ENCODING_VERSION + 7));
    }

    #[test]
    fn test_out_of_order_frames() {
        let bytes = Message::SourceKind(SourceKind::Tracing).encode().expect("encode");

        let err = read_dump(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ExportError::Wire(WireError::UnexpectedKind { .. })));
    }

    #[test]
    fn test_corrupt_tree_is_an_export_error() {
        let mut bytes = Message::Greeting(Greeting::current()).encode().expect("encode");
        bytes.extend(Message::SourceKind(SourceKind::Tracing).encode().expect("encode"));
        let empty = br#"{"shape":"tree","data":{"nodes":[],"cpu_time":0,"wall_time":0}}"#;
        bytes.extend(encode(MessageKind::Snapshot, empty).expect("encode"));

        let err = read_dump(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ExportError::Wire(WireError::Payload(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(load(&dir.path().join("nope.dump")), Err(ExportError::Io(_))));
    }
}
