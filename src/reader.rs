//! Parsing of raw kernel buffers into structured events.
//!
//! The kernel delivers a packed byte stream of records, each a fixed header
//! followed by a variable-length, NUL-padded name. Parsing walks the stream
//! by each record's declared size; resolution then turns descriptors into
//! paths against the registry, handling the kernel's own bookkeeping records
//! along the way.

use std::ffi::{OsStr, OsString};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::time::Instant;

use crate::event::{EventKind, FileSystemEvent};
use crate::registry::WatchRegistry;

/// `struct inotify_event` without the trailing name: wd, mask, cookie, len.
const HEADER_LEN: usize = mem::size_of::<libc::inotify_event>();

/// One record as delivered by the kernel, before registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawRecord {
    pub wd: i32,
    pub mask: u32,
    /// Name fragment relative to the watched directory; `None` when the
    /// event is about the watched entry itself.
    pub name: Option<OsString>,
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Walk a kernel buffer into records, preserving delivery order.
///
/// A truncated trailing record (which the kernel never produces for a
/// sufficiently sized buffer) is discarded rather than misparsed.
pub(crate) fn parse_records(buf: &[u8]) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LEN <= buf.len() {
        let wd = read_i32(buf, offset);
        let mask = read_u32(buf, offset + 4);
        // offset + 8 is the rename cookie; unused here.
        let name_len = read_u32(buf, offset + 12) as usize;

        let record_end = offset + HEADER_LEN + name_len;
        if record_end > buf.len() {
            tracing::warn!(offset, name_len, "truncated inotify record discarded");
            break;
        }

        let name_bytes = &buf[offset + HEADER_LEN..record_end];
        let trimmed: &[u8] = match name_bytes.iter().position(|&b| b == 0) {
            Some(nul) => &name_bytes[..nul],
            None => name_bytes,
        };
        let name = if trimmed.is_empty() {
            None
        } else {
            Some(OsStr::from_bytes(trimmed).to_os_string())
        };

        records.push(RawRecord { wd, mask, name });
        offset = record_end;
    }

    records
}

/// Resolve raw records against the registry into filesystem events.
///
/// Two kinds of record never reach the filter stage:
/// - `IN_IGNORED` is the kernel invalidating a watch; the registry entry is
///   removed here and the record is consumed as protocol bookkeeping.
/// - records whose descriptor has no registry entry (queue overflows carry
///   wd -1, and unwatch races leave in-flight events behind) are dropped.
///
/// The `IS_DIR` bit is injected whenever the resolved path is currently a
/// directory, so directory events are classifiable even when the kernel
/// omitted the bit.
pub(crate) fn resolve_records(
    records: Vec<RawRecord>,
    registry: &mut WatchRegistry,
    now: Instant,
) -> Vec<FileSystemEvent> {
    let mut events = Vec::with_capacity(records.len());

    for record in records {
        let wd = crate::event::WatchDescriptor(record.wd);
        let mut mask = EventKind::from_bits_retain(record.mask);

        if mask.contains(EventKind::WATCH_INVALIDATED) {
            if let Some(path) = registry.remove(wd) {
                tracing::debug!(path = %path.display(), "kernel invalidated watch");
            }
            continue;
        }

        let Some(base) = registry.path_of(wd) else {
            tracing::trace!(wd = record.wd, mask = record.mask, "event for unknown descriptor dropped");
            continue;
        };

        let path = match &record.name {
            Some(name) => base.join(name),
            None => base.to_path_buf(),
        };

        if path.is_dir() {
            mask |= EventKind::IS_DIR;
        }

        events.push(FileSystemEvent {
            wd,
            mask,
            path,
            time: now,
        });
    }

    events
}
