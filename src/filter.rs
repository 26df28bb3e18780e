//! Suppression pipeline between the reader and the pending queue.
//!
//! Two independent policies run per event, in order: timeout debouncing
//! (collapse bursts into one signal) and ignore matching (one-shot list
//! first, then the persistent list). Filtering only ever drops events; it
//! never reorders them.

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::event::FileSystemEvent;

/// Ignore lists, debounce window and last-accepted bookkeeping.
#[derive(Debug)]
pub(crate) struct EventFilter {
    /// Persistent substring patterns.
    ignored: Vec<String>,
    /// Patterns consumed by their first match.
    ignored_once: Vec<String>,
    /// Minimum spacing between accepted events. Zero disables debouncing.
    timeout: Duration,
    /// `None` until the first event is accepted, so that one always passes.
    last_accepted: Option<Instant>,
}

impl EventFilter {
    pub fn new(ignored: Vec<String>, timeout: Duration) -> Self {
        Self {
            ignored,
            ignored_once: Vec::new(),
            timeout,
            last_accepted: None,
        }
    }

    pub fn ignore(&mut self, pattern: String) {
        self.ignored.push(pattern);
    }

    pub fn ignore_once(&mut self, pattern: String) {
        self.ignored_once.push(pattern);
    }

    /// Reconfigure the debounce window, re-arming so the next event passes.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.last_accepted = None;
    }

    /// Substring match against both ignore lists.
    ///
    /// A hit on the once-list consumes the first matching pattern. Also
    /// consulted by `watch_file`, so a pending once-pattern can swallow the
    /// registration itself, as well as events.
    pub fn is_ignored(&mut self, path: &Path) -> bool {
        let haystack = path.to_string_lossy();

        if let Some(hit) = self
            .ignored_once
            .iter()
            .position(|pattern| haystack.contains(pattern.as_str()))
        {
            self.ignored_once.remove(hit);
            return true;
        }

        self.ignored
            .iter()
            .any(|pattern| haystack.contains(pattern.as_str()))
    }

    fn on_timeout(&self, time: Instant) -> bool {
        match self.last_accepted {
            Some(last) => time.saturating_duration_since(last) < self.timeout,
            None => false,
        }
    }

    /// Run the pipeline over one parsed batch, appending survivors to the
    /// pending queue in arrival order.
    ///
    /// Returns the events suppressed by the debounce policy; the engine
    /// reports those to the timeout observer outside its state lock.
    /// Ignore-list suppressions are silent.
    pub fn apply(
        &mut self,
        events: Vec<FileSystemEvent>,
        queue: &mut VecDeque<FileSystemEvent>,
    ) -> Vec<FileSystemEvent> {
        let mut timed_out = Vec::new();

        for event in events {
            if self.on_timeout(event.time) {
                timed_out.push(event);
            } else if self.is_ignored(&event.path) {
                tracing::trace!(path = %event.path.display(), "event suppressed by ignore list");
            } else {
                self.last_accepted = Some(event.time);
                queue.push_back(event);
            }
        }

        timed_out
    }
}
