//! End-to-end engine tests against a real inotify instance.

#![cfg(target_os = "linux")]

use std::fs::{self, File};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use tempfile::TempDir;
use vigil::{EventKind, FileSystemEvent, WatchEngine, WatchError};

const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Pull the next event on a helper thread so a missing event fails the test
/// instead of hanging it.
fn next_event_within(engine: &Arc<WatchEngine>, timeout: Duration) -> Option<FileSystemEvent> {
    let (tx, rx) = bounded(1);
    let engine = Arc::clone(engine);
    thread::spawn(move || {
        let _ = tx.send(engine.next_event());
    });
    rx.recv_timeout(timeout).expect("timed out waiting on next_event")
}

#[test]
fn watch_file_rejects_missing_path() {
    let engine = WatchEngine::new().unwrap();
    let err = engine.watch_file("/no/such/path/anywhere").unwrap_err();
    assert!(matches!(err, WatchError::PathNotFound { .. }));
    assert_eq!(engine.watch_count(), 0);
}

#[test]
fn recursive_watch_rejects_missing_path() {
    let engine = WatchEngine::new().unwrap();
    let err = engine
        .watch_directory_recursively("/no/such/tree")
        .unwrap_err();
    assert!(matches!(err, WatchError::PathNotFound { .. }));
    assert_eq!(engine.watch_count(), 0);
}

#[test]
fn create_event_is_delivered_with_resolved_path() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(WatchEngine::new().unwrap());
    engine.watch_file(dir.path()).unwrap();

    let file = dir.path().join("created.txt");
    File::create(&file).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert!(event.mask.contains(EventKind::CREATE));
    assert!(!event.mask.contains(EventKind::IS_DIR));
    assert_eq!(event.path, file);
}

#[test]
fn directory_creation_carries_is_dir_bit() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();

    fs::create_dir(dir.path().join("sub")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert!(event.mask.contains(EventKind::CREATE));
    assert!(event.mask.contains(EventKind::IS_DIR));
}

#[test]
fn events_are_delivered_in_kernel_order() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();

    for name in ["one.txt", "two.txt", "three.txt"] {
        File::create(dir.path().join(name)).unwrap();
    }

    for name in ["one.txt", "two.txt", "three.txt"] {
        let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
        assert_eq!(event.path, dir.path().join(name));
    }
}

#[test]
fn stop_from_another_thread_unblocks_next_event() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("watched.txt");
    File::create(&file).unwrap();

    let engine = Arc::new(WatchEngine::new().unwrap());
    engine.watch_file(&file).unwrap();

    let stopper = Arc::clone(&engine);
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        stopper.stop();
    });

    let started = Instant::now();
    let event = next_event_within(&engine, EVENT_WAIT);
    assert!(event.is_none(), "expected the stopped sentinel");
    assert!(started.elapsed() < EVENT_WAIT, "stop was not prompt");
}

#[test]
fn stop_is_idempotent() {
    let engine = Arc::new(WatchEngine::new().unwrap());
    engine.stop();
    engine.stop();
    engine.stop();

    assert!(engine.has_stopped());
    assert!(next_event_within(&engine, EVENT_WAIT).is_none());
}

#[test]
fn queued_events_drain_after_stop() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();

    File::create(dir.path().join("a.txt")).unwrap();
    File::create(dir.path().join("b.txt")).unwrap();
    // Give the kernel a moment so both records land in one read batch.
    thread::sleep(Duration::from_millis(100));

    let first = next_event_within(&engine, EVENT_WAIT).expect("expected first event");
    assert_eq!(first.path, dir.path().join("a.txt"));

    engine.stop();

    let second = next_event_within(&engine, EVENT_WAIT).expect("queued event must survive stop");
    assert_eq!(second.path, dir.path().join("b.txt"));
    assert!(next_event_within(&engine, EVENT_WAIT).is_none());
}

#[test]
fn mutation_after_stop_is_rejected() {
    let dir = TempDir::new().unwrap();
    let engine = WatchEngine::new().unwrap();
    engine.stop();

    assert!(matches!(
        engine.watch_file(dir.path()),
        Err(WatchError::Stopped)
    ));
    assert!(matches!(
        engine.ignore_file("pattern"),
        Err(WatchError::Stopped)
    ));
}

#[test]
fn unwatch_of_unwatched_path_fails() {
    let dir = TempDir::new().unwrap();
    let engine = WatchEngine::new().unwrap();
    let err = engine.unwatch_file(dir.path()).unwrap_err();
    assert!(matches!(err, WatchError::NotWatched { .. }));
}

#[test]
fn unwatch_silences_a_path() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();
    engine.unwatch_file(dir.path()).unwrap();
    assert_eq!(engine.watch_count(), 0);

    File::create(dir.path().join("after.txt")).unwrap();
    thread::sleep(Duration::from_millis(100));
    engine.stop();

    // Only the stopped sentinel: the unwatched path produced nothing.
    assert!(next_event_within(&engine, EVENT_WAIT).is_none());
}

#[test]
fn ignore_once_suppresses_exactly_one_event() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();
    engine.ignore_file_once("flagged.txt").unwrap();

    File::create(dir.path().join("flagged.txt")).unwrap();
    File::create(dir.path().join("other.txt")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("other.txt"));

    // The pattern was consumed; the same name now passes.
    fs::remove_file(dir.path().join("flagged.txt")).unwrap();
    File::create(dir.path().join("flagged.txt")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("flagged.txt"));
}

#[test]
fn persistent_ignore_suppresses_every_match() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .ignore(".swp")
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();

    File::create(dir.path().join("a.swp")).unwrap();
    File::create(dir.path().join("b.swp")).unwrap();
    File::create(dir.path().join("kept.txt")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("kept.txt"));
}

#[test]
fn ignored_path_is_not_registered_by_watch_file() {
    let dir = TempDir::new().unwrap();
    let engine = WatchEngine::builder()
        .ignore("ignored-dir")
        .build()
        .unwrap();

    let sub = dir.path().join("ignored-dir");
    fs::create_dir(&sub).unwrap();

    // Quiet success, nothing registered.
    engine.watch_file(&sub).unwrap();
    assert_eq!(engine.watch_count(), 0);
}

#[test]
fn debounce_collapses_bursts_and_reports_them() {
    let dir = TempDir::new().unwrap();
    let (timeout_tx, timeout_rx) = bounded(16);
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .event_timeout(Duration::from_millis(500), move |event| {
                let _ = timeout_tx.send(event.path.clone());
            })
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();

    // Two creates within the window: first passes, second is suppressed.
    File::create(dir.path().join("first.txt")).unwrap();
    File::create(dir.path().join("second.txt")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("first.txt"));

    let suppressed = timeout_rx
        .recv_timeout(EVENT_WAIT)
        .expect("expected timeout callback");
    assert_eq!(suppressed, dir.path().join("second.txt"));

    // Outside the window, delivery resumes.
    thread::sleep(Duration::from_millis(600));
    File::create(dir.path().join("third.txt")).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("third.txt"));
}

#[test]
fn rewatching_same_path_keeps_single_entry() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_file(dir.path()).unwrap();
    engine.watch_file(dir.path()).unwrap();
    assert_eq!(engine.watch_count(), 1);

    // And events are not duplicated.
    File::create(dir.path().join("once.txt")).unwrap();
    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert_eq!(event.path, dir.path().join("once.txt"));

    thread::sleep(Duration::from_millis(100));
    engine.stop();
    assert!(next_event_within(&engine, EVENT_WAIT).is_none());
}

#[test]
fn recursive_watch_covers_nested_directories_only() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    File::create(dir.path().join("plain.txt")).unwrap();

    let engine = Arc::new(
        WatchEngine::builder()
            .event_mask(EventKind::CREATE)
            .build()
            .unwrap(),
    );
    engine.watch_directory_recursively(dir.path()).unwrap();

    // Root, a, a/b. The plain file rides on its parent's watch.
    assert_eq!(engine.watch_count(), 3);

    let file = nested.join("deep.txt");
    File::create(&file).unwrap();

    let event = next_event_within(&engine, EVENT_WAIT).expect("expected an event");
    assert!(event.mask.contains(EventKind::CREATE));
    assert_eq!(event.path, file);
}

#[test]
fn recursive_watch_includes_symlinks() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("target");
    fs::create_dir(&target).unwrap();
    let link = dir.path().join("link");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let engine = WatchEngine::builder()
        .event_mask(EventKind::CREATE)
        .build()
        .unwrap();
    engine.watch_directory_recursively(dir.path()).unwrap();

    // The symlink is registered, but the kernel resolves it to the target
    // inode and returns the target's descriptor, so the registry holds one
    // entry for that pair: root + (target/link).
    assert_eq!(engine.watch_count(), 2);
}
