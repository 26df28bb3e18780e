//! Structured filesystem event streams over Linux inotify.
//!
//! Turns the kernel's raw change notifications into filtered, classified
//! events, consumed either by blocking pulls from a [`WatchEngine`] or by
//! callback dispatch through a [`Notifier`].
//!
//! # Architecture
//!
//! ```text
//! Notifier (EventKind -> handler)
//!     |
//! WatchEngine::next_event
//!     |
//! EventChannel (inotify fd + stop pipe, poll)
//!     -> reader (buffer -> records -> resolved events)
//!     -> filter (debounce, ignore lists)
//!     -> pending queue (FIFO)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vigil::{EventKind, Notifier};
//!
//! let mut notifier = Notifier::new()?;
//! notifier
//!     .watch_path_recursively("/var/data")?
//!     .on_event(EventKind::CREATE, |n| {
//!         println!("created: {}", n.path.display());
//!     })
//!     .on_event(EventKind::CLOSE, |n| {
//!         println!("closed: {}", n.path.display());
//!     });
//!
//! // Typically on a dedicated thread; engine().stop() unblocks it.
//! notifier.run();
//! # Ok::<(), vigil::WatchError>(())
//! ```
//!
//! The engine is a single-consumer design: one thread drives
//! [`WatchEngine::next_event`] (or [`Notifier::run`]) while control calls
//! such as [`WatchEngine::stop`] may come from any other thread.

pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod notifier;
pub mod registry;

mod filter;
mod reader;
mod sys;

pub use engine::{TimeoutObserver, WatchEngine, WatchEngineBuilder};
pub use error::WatchError;
pub use event::{EventKind, FileSystemEvent, Notification, WatchDescriptor};
pub use notifier::{EventObserver, Notifier};
pub use registry::WatchRegistry;
