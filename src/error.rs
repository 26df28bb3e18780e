//! Error types for the watch engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by watch operations.
///
/// Engine-internal recoverables (an event arriving for an already-removed
/// descriptor, suppression by the filter pipeline) never show up here; they
/// are handled where they are detected.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The inotify channel or its cancellation pipe could not be created.
    /// Unrecoverable; surfaced at construction time.
    #[error("failed to initialize inotify channel: {source}")]
    Init {
        #[source]
        source: io::Error,
    },

    /// A watch was requested on a path that does not exist.
    #[error("cannot watch {path}: path does not exist", path = .path.display())]
    PathNotFound { path: PathBuf },

    /// The kernel refused the watch because the per-user watch limit is
    /// exhausted. Recoverable: watches already established keep working.
    #[error(
        "cannot watch {path}: inotify watch limit reached, \
         raise fs.inotify.max_user_watches",
        path = .path.display()
    )]
    WatchLimitReached { path: PathBuf },

    /// The kernel refused the watch for a reason other than the watch limit.
    /// Fatal for this operation only; unrelated watches are untouched.
    #[error("failed to watch {path}: {source}", path = .path.display())]
    WatchFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An unwatch was requested for a path with no live watch.
    #[error("{path} is not being watched", path = .path.display())]
    NotWatched { path: PathBuf },

    /// The kernel failed to remove a live watch.
    #[error("failed to remove watch on {path}: {source}", path = .path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A watch or ignore-list mutation was attempted after `stop()`.
    #[error("watch engine is stopped")]
    Stopped,
}
