//! Callback dispatch keyed by event category.
//!
//! `Notifier` maps [`EventKind`]s to handlers and drives a [`WatchEngine`]
//! behind a pull-once (`run_once`) or loop (`run`) interface. Composite
//! kinds (`MOVE`, `CLOSE`) register their handler under each constituent
//! primitive, and every registration widens the engine's kernel mask so the
//! requested events are actually delivered.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::WatchEngine;
use crate::error::WatchError;
use crate::event::{EventKind, Notification};

/// Handler invoked with a [`Notification`].
pub type EventObserver = Box<dyn FnMut(Notification) + Send>;

/// Split a composite kind into the primitive kinds it stands for.
fn constituents(kind: EventKind) -> Vec<EventKind> {
    if kind == EventKind::MOVE {
        vec![EventKind::MOVED_FROM, EventKind::MOVED_TO]
    } else if kind == EventKind::CLOSE {
        vec![EventKind::CLOSE_WRITE, EventKind::CLOSE_NOWRITE]
    } else {
        vec![kind]
    }
}

/// Routes engine events to registered handlers.
///
/// Dispatch order per event: the handler registered for the exact observed
/// kind, else a wildcard [`EventKind::ALL`] registration, else the
/// unexpected-event fallback. The default fallback logs the notification at
/// WARN; register [`on_unexpected_event`](Self::on_unexpected_event) to
/// override (including to escalate).
pub struct Notifier {
    engine: Arc<WatchEngine>,
    /// Kind -> index into `handlers`, so a composite registration shares
    /// one handler across its constituents.
    observers: HashMap<EventKind, usize>,
    handlers: Vec<EventObserver>,
    unexpected: Option<EventObserver>,
}

impl Notifier {
    /// Create a notifier over a fresh default engine.
    pub fn new() -> Result<Self, WatchError> {
        Ok(Self::with_engine(Arc::new(WatchEngine::new()?)))
    }

    /// Create a notifier over an existing engine.
    pub fn with_engine(engine: Arc<WatchEngine>) -> Self {
        Self {
            engine,
            observers: HashMap::new(),
            handlers: Vec::new(),
            unexpected: None,
        }
    }

    /// The shared engine, e.g. to `stop()` a blocked [`run`](Self::run)
    /// from another thread.
    pub fn engine(&self) -> &Arc<WatchEngine> {
        &self.engine
    }

    /// Watch a single file or directory.
    pub fn watch_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, WatchError> {
        self.engine.watch_file(path)?;
        Ok(self)
    }

    /// Watch a directory tree, following symlinks.
    pub fn watch_path_recursively(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<&mut Self, WatchError> {
        self.engine.watch_directory_recursively(path)?;
        Ok(self)
    }

    /// Remove the watch for a path.
    pub fn unwatch_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, WatchError> {
        self.engine.unwatch_file(path)?;
        Ok(self)
    }

    /// Persistently suppress events whose path contains `pattern`.
    pub fn ignore_file(&mut self, pattern: impl Into<String>) -> Result<&mut Self, WatchError> {
        self.engine.ignore_file(pattern)?;
        Ok(self)
    }

    /// Suppress the next single event whose path contains `pattern`.
    pub fn ignore_file_once(
        &mut self,
        pattern: impl Into<String>,
    ) -> Result<&mut Self, WatchError> {
        self.engine.ignore_file_once(pattern)?;
        Ok(self)
    }

    /// Configure debouncing; suppressed events reach `observer` as
    /// notifications.
    pub fn set_event_timeout(
        &mut self,
        timeout: Duration,
        mut observer: impl FnMut(Notification) + Send + 'static,
    ) -> &mut Self {
        self.engine
            .set_event_timeout(timeout, move |event| observer(Notification::from(event)));
        self
    }

    /// Register `handler` for `kind`.
    ///
    /// Widens the engine mask by `kind`. Composite kinds register the same
    /// handler under each constituent primitive. Re-registering an exact
    /// kind replaces the previous handler; registration order otherwise
    /// does not matter.
    pub fn on_event(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(Notification) + Send + 'static,
    ) -> &mut Self {
        self.engine.merge_event_mask(kind);
        let index = self.handlers.len();
        self.handlers.push(Box::new(handler));
        for constituent in constituents(kind) {
            self.observers.insert(constituent, index);
        }
        self
    }

    /// Register one shared handler for several kinds.
    pub fn on_events(
        &mut self,
        kinds: impl IntoIterator<Item = EventKind>,
        handler: impl FnMut(Notification) + Send + 'static,
    ) -> &mut Self {
        let index = self.handlers.len();
        self.handlers.push(Box::new(handler));
        for kind in kinds {
            self.engine.merge_event_mask(kind);
            for constituent in constituents(kind) {
                self.observers.insert(constituent, index);
            }
        }
        self
    }

    /// Register the fallback for events no handler matches.
    pub fn on_unexpected_event(
        &mut self,
        handler: impl FnMut(Notification) + Send + 'static,
    ) -> &mut Self {
        self.unexpected = Some(Box::new(handler));
        self
    }

    /// Pull and dispatch exactly one event.
    ///
    /// Returns `false` when the engine reports the stopped sentinel (and
    /// its queue is drained); `true` after dispatching an event, whether a
    /// handler matched or the fallback ran.
    pub fn run_once(&mut self) -> bool {
        let Some(event) = self.engine.next_event() else {
            return false;
        };
        let notification = Notification::from(event);

        let matched = self
            .observers
            .get(&notification.event)
            .or_else(|| self.observers.get(&EventKind::ALL))
            .copied();

        match matched {
            Some(index) => (self.handlers[index])(notification),
            None => match self.unexpected.as_mut() {
                Some(handler) => handler(notification),
                None => tracing::warn!(
                    event = ?notification.event,
                    path = %notification.path.display(),
                    "no handler registered for event"
                ),
            },
        }
        true
    }

    /// Dispatch events until the engine is stopped and drained.
    pub fn run(&mut self) {
        while self.run_once() {}
    }

    /// Forward to the engine's [`stop`](WatchEngine::stop).
    pub fn stop(&self) {
        self.engine.stop();
    }
}
