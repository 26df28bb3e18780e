//! The watch engine: kernel resource lifecycle, watch management and the
//! blocking event loop.
//!
//! One engine owns the inotify channel, the descriptor registry, the filter
//! pipeline and the pending queue. `next_event` is meant to run on a single
//! dedicated consumer thread; control calls (`watch_file`, `stop`, ...) may
//! arrive from any other thread. Shared state sits behind one coarse lock
//! which is never held across the blocking wait.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::event::{EventKind, FileSystemEvent};
use crate::filter::EventFilter;
use crate::reader;
use crate::registry::WatchRegistry;
use crate::sys::{EventChannel, READ_BUFFER_LEN, ReadOutcome};

/// Observer for events suppressed by the debounce policy.
pub type TimeoutObserver = Box<dyn FnMut(FileSystemEvent) + Send>;

/// State mutated by both the consumer thread and control threads.
struct EngineState {
    registry: WatchRegistry,
    filter: EventFilter,
    queue: VecDeque<FileSystemEvent>,
    event_mask: EventKind,
}

/// Watches filesystem paths and serves their change events one at a time.
///
/// Construct via [`WatchEngine::builder`]. Lifecycle: watches and ignore
/// patterns may be added any time before [`stop`](Self::stop); afterwards
/// such mutations are rejected with [`WatchError::Stopped`]. Stopping does
/// not discard events already queued — they drain through
/// [`next_event`](Self::next_event) before the stopped sentinel appears.
pub struct WatchEngine {
    channel: EventChannel,
    stopped: AtomicBool,
    state: Mutex<EngineState>,
    /// Only the consumer thread takes this lock, and it holds it across the
    /// blocking wait; keeping it separate from `state` is what lets control
    /// threads mutate watches while the consumer is blocked.
    read_buf: Mutex<Vec<u8>>,
    /// Kept out of `state` so the observer runs without the state lock held
    /// and may itself call back into the engine.
    on_timeout: Mutex<Option<TimeoutObserver>>,
}

impl WatchEngine {
    /// Create a builder for configuring an engine.
    pub fn builder() -> WatchEngineBuilder {
        WatchEngineBuilder::new()
    }

    /// Create an engine with default configuration (all events, no ignore
    /// patterns, no debouncing).
    pub fn new() -> Result<Self, WatchError> {
        Self::builder().build()
    }

    fn ensure_running(&self) -> Result<(), WatchError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(WatchError::Stopped);
        }
        Ok(())
    }

    /// Register a watch on a single file or directory.
    ///
    /// Fails with [`WatchError::PathNotFound`] if the path does not exist.
    /// If the path currently matches an ignore pattern the call succeeds
    /// without registering anything (a matching once-pattern is consumed).
    /// Kernel watch-limit exhaustion surfaces as the recoverable
    /// [`WatchError::WatchLimitReached`]; any other kernel refusal is
    /// [`WatchError::WatchFailed`].
    pub fn watch_file(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        self.ensure_running()?;
        let path = path.as_ref();
        if !path.exists() {
            return Err(WatchError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut state = self.state.lock();
        if state.filter.is_ignored(path) {
            tracing::debug!(path = %path.display(), "watch skipped: path is ignored");
            return Ok(());
        }

        let mask = state.event_mask;
        match self.channel.add_watch(path, mask.bits()) {
            Ok(wd) => {
                tracing::trace!(path = %path.display(), wd = wd.raw(), "watch added");
                state.registry.insert(wd, path.to_path_buf());
                Ok(())
            }
            Err(e) if e.raw_os_error() == Some(libc::ENOSPC) => {
                tracing::warn!(path = %path.display(), "inotify watch limit reached");
                Err(WatchError::WatchLimitReached {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(WatchError::WatchFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Watch a directory tree, following symlinks.
    ///
    /// Every directory and every symlink in the subtree gets its own watch,
    /// then the root itself; plain files are covered by their parent
    /// directory's watch. Traversal errors on individual entries are logged
    /// and skipped; watch errors propagate but leave already-established
    /// watches in place.
    pub fn watch_directory_recursively(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        self.ensure_running()?;
        let path = path.as_ref();
        if !path.exists() {
            return Err(WatchError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable entry during recursive watch");
                        continue;
                    }
                };
                if entry.depth() == 0 {
                    // The root is watched last, below.
                    continue;
                }
                if entry.file_type().is_dir() || entry.path_is_symlink() {
                    self.watch_file(entry.path())?;
                }
            }
        }

        self.watch_file(path)
    }

    /// Remove the watch registered for `path`.
    ///
    /// Fails with [`WatchError::NotWatched`] if the path has no live watch.
    pub fn unwatch_file(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        self.ensure_running()?;
        let path = path.as_ref();

        let mut state = self.state.lock();
        let wd = state
            .registry
            .descriptor_of(path)
            .ok_or_else(|| WatchError::NotWatched {
                path: path.to_path_buf(),
            })?;

        self.channel
            .remove_watch(wd)
            .map_err(|source| WatchError::RemoveFailed {
                path: path.to_path_buf(),
                source,
            })?;
        state.registry.remove(wd);
        tracing::trace!(path = %path.display(), "watch removed");
        Ok(())
    }

    /// Suppress every future event whose resolved path contains `pattern`.
    pub fn ignore_file(&self, pattern: impl Into<String>) -> Result<(), WatchError> {
        self.ensure_running()?;
        self.state.lock().filter.ignore(pattern.into());
        Ok(())
    }

    /// Suppress the next single event whose resolved path contains
    /// `pattern`; the pattern is consumed by its first match.
    pub fn ignore_file_once(&self, pattern: impl Into<String>) -> Result<(), WatchError> {
        self.ensure_running()?;
        self.state.lock().filter.ignore_once(pattern.into());
        Ok(())
    }

    /// Configure the debounce window and the observer that receives the
    /// suppressed events. Re-arms the window so the next event passes.
    pub fn set_event_timeout(
        &self,
        timeout: Duration,
        observer: impl FnMut(FileSystemEvent) + Send + 'static,
    ) {
        self.state.lock().filter.set_timeout(timeout);
        *self.on_timeout.lock() = Some(Box::new(observer));
    }

    /// The kernel mask used for watches registered from now on.
    pub fn event_mask(&self) -> EventKind {
        self.state.lock().event_mask
    }

    /// Replace the event mask. Affects subsequent registrations only.
    pub fn set_event_mask(&self, mask: EventKind) {
        self.state.lock().event_mask = mask;
    }

    /// Widen the event mask to additionally cover `kind`.
    pub fn merge_event_mask(&self, kind: EventKind) {
        self.state.lock().event_mask |= kind;
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Block until the next filtered event is available.
    ///
    /// Returns `None` once [`stop`](Self::stop) has been called and the
    /// pending queue is drained. Events come out in kernel delivery order.
    pub fn next_event(&self) -> Option<FileSystemEvent> {
        loop {
            if let Some(event) = self.state.lock().queue.pop_front() {
                return Some(event);
            }
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }

            let records = {
                let mut buf = self.read_buf.lock();
                match self.channel.read_pending(&mut buf) {
                    Ok(ReadOutcome::Cancelled) => continue,
                    Ok(ReadOutcome::Data(len)) => reader::parse_records(&buf[..len]),
                    Err(e) => {
                        tracing::error!(error = %e, "inotify read failed");
                        // Back off so a persistent fd error cannot spin.
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                }
            };

            let now = Instant::now();
            let timed_out = {
                let mut state = self.state.lock();
                let state = &mut *state;
                let events = reader::resolve_records(records, &mut state.registry, now);
                state.filter.apply(events, &mut state.queue)
            };

            if !timed_out.is_empty() {
                let mut observer = self.on_timeout.lock();
                if let Some(observer) = observer.as_mut() {
                    for event in timed_out {
                        observer(event);
                    }
                }
            }
        }
    }

    /// Stop the engine: wake any blocked [`next_event`](Self::next_event)
    /// and reject further watch mutations. Idempotent and safe to call from
    /// any thread. Queued events remain drainable.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Err(e) = self.channel.interrupt() {
            tracing::warn!(error = %e, "failed to signal stop pipe");
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchEngine")
            .field("stopped", &self.has_stopped())
            .field("watch_count", &self.watch_count())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`WatchEngine`].
pub struct WatchEngineBuilder {
    ignored: Vec<String>,
    event_mask: EventKind,
    timeout: Duration,
    on_timeout: Option<TimeoutObserver>,
}

impl WatchEngineBuilder {
    /// Create a builder with defaults: all events, nothing ignored, no
    /// debouncing.
    pub fn new() -> Self {
        Self {
            ignored: Vec::new(),
            event_mask: EventKind::ALL,
            timeout: Duration::ZERO,
            on_timeout: None,
        }
    }

    /// Seed the persistent ignore list.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignored.push(pattern.into());
        self
    }

    /// Set the initial kernel event mask.
    pub fn event_mask(mut self, mask: EventKind) -> Self {
        self.event_mask = mask;
        self
    }

    /// Configure debouncing and the suppressed-event observer.
    pub fn event_timeout(
        mut self,
        timeout: Duration,
        observer: impl FnMut(FileSystemEvent) + Send + 'static,
    ) -> Self {
        self.timeout = timeout;
        self.on_timeout = Some(Box::new(observer));
        self
    }

    /// Open the kernel resources and build the engine.
    ///
    /// Fails with [`WatchError::Init`] if the inotify channel or its
    /// cancellation pipe cannot be created.
    pub fn build(self) -> Result<WatchEngine, WatchError> {
        let channel = EventChannel::new().map_err(|source| WatchError::Init { source })?;

        Ok(WatchEngine {
            channel,
            stopped: AtomicBool::new(false),
            state: Mutex::new(EngineState {
                registry: WatchRegistry::new(),
                filter: EventFilter::new(self.ignored, self.timeout),
                queue: VecDeque::new(),
                event_mask: self.event_mask,
            }),
            read_buf: Mutex::new(vec![0u8; READ_BUFFER_LEN]),
            on_timeout: Mutex::new(self.on_timeout),
        })
    }
}

impl Default for WatchEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
