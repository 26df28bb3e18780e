//! Bidirectional watch-descriptor to path mapping.
//!
//! Events read from the kernel only carry a watch descriptor, so the engine
//! needs the forward direction to resolve paths; explicit unwatch requests
//! arrive as paths and need the reverse direction. Both maps are kept in
//! lockstep so the pairing stays bijective no matter which side mutates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::event::WatchDescriptor;

/// Registry mapping live watch descriptors to their paths and back.
///
/// Every mutation goes through this type; nothing else touches either map,
/// which is what keeps the bijection invariant honest.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    forward: HashMap<WatchDescriptor, PathBuf>,
    reverse: HashMap<PathBuf, WatchDescriptor>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor/path pairing.
    ///
    /// Overwrite policy: if either side is already mapped, the stale pairing
    /// is removed from both maps first. The kernel hands back the existing
    /// descriptor when a live path is re-registered, so overwriting is the
    /// behavior that keeps one entry per path.
    pub fn insert(&mut self, wd: WatchDescriptor, path: PathBuf) {
        if let Some(old_path) = self.forward.remove(&wd) {
            self.reverse.remove(&old_path);
        }
        if let Some(old_wd) = self.reverse.remove(&path) {
            self.forward.remove(&old_wd);
        }
        self.forward.insert(wd, path.clone());
        self.reverse.insert(path, wd);
    }

    /// Resolve a descriptor to its watched path.
    ///
    /// `None` means the kernel removed the watch while events were still in
    /// flight; callers drop the event rather than treating this as an error.
    pub fn path_of(&self, wd: WatchDescriptor) -> Option<&Path> {
        self.forward.get(&wd).map(PathBuf::as_path)
    }

    /// Reverse lookup, used to resolve explicit unwatch requests.
    pub fn descriptor_of(&self, path: &Path) -> Option<WatchDescriptor> {
        self.reverse.get(path).copied()
    }

    /// Remove both directions of a mapping. Idempotent: removing an absent
    /// descriptor is a no-op.
    pub fn remove(&mut self, wd: WatchDescriptor) -> Option<PathBuf> {
        let path = self.forward.remove(&wd)?;
        self.reverse.remove(&path);
        Some(path)
    }

    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether any watches are live.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
