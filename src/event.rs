//! Event categories and the event values that flow through the engine.
//!
//! `EventKind` mirrors the kernel mask bit for bit, so a mask read from an
//! inotify record round-trips through the engine unchanged. Several bits may
//! be set on one event (a directory creation carries `CREATE | IS_DIR`), so
//! matching goes through `contains`/`intersects`, never equality.

use std::path::PathBuf;
use std::time::Instant;

use bitflags::bitflags;

bitflags! {
    /// Filesystem change categories, as a bit set over the kernel mask.
    ///
    /// `MOVE`, `CLOSE` and `ALL` are composite constants covering their
    /// constituent primitive bits; everything else is a single kernel bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKind: u32 {
        /// File was accessed (read).
        const ACCESS = libc::IN_ACCESS;
        /// Metadata changed (permissions, timestamps, ownership, ...).
        const ATTRIB = libc::IN_ATTRIB;
        /// File opened for writing was closed.
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        /// File not opened for writing was closed.
        const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
        /// File or directory created inside a watched directory.
        const CREATE = libc::IN_CREATE;
        /// File or directory deleted from a watched directory.
        const REMOVE = libc::IN_DELETE;
        /// The watched entry itself was deleted.
        const REMOVE_SELF = libc::IN_DELETE_SELF;
        /// File content was modified.
        const MODIFY = libc::IN_MODIFY;
        /// The watched entry itself was moved.
        const MOVE_SELF = libc::IN_MOVE_SELF;
        /// Entry moved out of a watched directory.
        const MOVED_FROM = libc::IN_MOVED_FROM;
        /// Entry moved into a watched directory.
        const MOVED_TO = libc::IN_MOVED_TO;
        /// File was opened.
        const OPEN = libc::IN_OPEN;
        /// The subject of the event is a directory.
        const IS_DIR = libc::IN_ISDIR;
        /// Filesystem containing the watched entry was unmounted.
        const UNMOUNT = libc::IN_UNMOUNT;
        /// Kernel event queue overflowed; events were lost.
        const QUEUE_OVERFLOW = libc::IN_Q_OVERFLOW;
        /// The kernel invalidated this watch; its descriptor is dead.
        const WATCH_INVALIDATED = libc::IN_IGNORED;
        /// Watch fires once, then the kernel removes it.
        const ONESHOT = libc::IN_ONESHOT;

        /// Both move directions.
        const MOVE = libc::IN_MOVED_FROM | libc::IN_MOVED_TO;
        /// Both close variants.
        const CLOSE = libc::IN_CLOSE_WRITE | libc::IN_CLOSE_NOWRITE;
        /// Every deliverable event category.
        const ALL = libc::IN_ALL_EVENTS;
    }
}

/// Opaque identifier the kernel issues for a watch.
///
/// Only valid while the watch is live; the kernel may invalidate it at any
/// time, so descriptors must never be cached outside the [`WatchRegistry`].
///
/// [`WatchRegistry`]: crate::registry::WatchRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchDescriptor(pub(crate) i32);

impl WatchDescriptor {
    pub(crate) fn raw(self) -> i32 {
        self.0
    }
}

/// A filtered, registry-resolved filesystem event.
///
/// Immutable once constructed; owned by the engine's pending queue until a
/// caller dequeues it through [`WatchEngine::next_event`].
///
/// [`WatchEngine::next_event`]: crate::engine::WatchEngine::next_event
#[derive(Debug, Clone)]
pub struct FileSystemEvent {
    /// Descriptor of the watch that produced the event.
    pub wd: WatchDescriptor,
    /// Kernel mask, with `IS_DIR` injected when the path resolves to a
    /// directory.
    pub mask: EventKind,
    /// Watched path joined with the record's name fragment.
    pub path: PathBuf,
    /// When the record was read from the kernel.
    pub time: Instant,
}

/// Public projection of a [`FileSystemEvent`], built at dispatch time.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The observed event category bits.
    pub event: EventKind,
    /// Resolved path the event refers to.
    pub path: PathBuf,
    /// Capture timestamp.
    pub time: Instant,
}

impl From<FileSystemEvent> for Notification {
    fn from(event: FileSystemEvent) -> Self {
        Self {
            event: event.mask,
            path: event.path,
            time: event.time,
        }
    }
}
