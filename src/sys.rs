//! Raw kernel channel: the inotify descriptor plus a self-pipe for
//! cancellation.
//!
//! This is the only module that talks to the kernel directly. The blocking
//! wait multiplexes over two descriptors with `poll(2)`: the inotify fd and
//! the read end of an internal pipe. `stop()` writes a byte to the pipe, so
//! a blocked reader wakes up even when the filesystem is completely idle.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::event::WatchDescriptor;

/// Sized so one read can drain a full burst: the kernel rejects reads that
/// cannot hold at least one maximal record (header + NAME_MAX + 1).
pub(crate) const READ_BUFFER_LEN: usize = 64 * 1024;

/// Outcome of one blocking read attempt.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// `len` bytes of raw event records are in the buffer.
    Data(usize),
    /// The cancellation pipe fired; no data was read.
    Cancelled,
}

/// Owns the inotify fd and the cancellation pipe.
///
/// All methods take `&self`; the underlying syscalls are thread-safe, so the
/// consumer thread can block in [`read_pending`](Self::read_pending) while a
/// control thread adds watches or interrupts.
#[derive(Debug)]
pub(crate) struct EventChannel {
    inotify: OwnedFd,
    pipe_read: OwnedFd,
    pipe_write: OwnedFd,
}

impl EventChannel {
    /// Open the inotify channel and the cancellation pipe.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let inotify = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut pipe_fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe2(pipe_fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        let pipe_read = unsafe { OwnedFd::from_raw_fd(pipe_fds[0]) };
        let pipe_write = unsafe { OwnedFd::from_raw_fd(pipe_fds[1]) };

        Ok(Self {
            inotify,
            pipe_read,
            pipe_write,
        })
    }

    /// Register a watch for `path` with the given kernel mask.
    ///
    /// The caller classifies errors; in particular `ENOSPC` means the
    /// per-user watch limit is exhausted.
    pub fn add_watch(&self, path: &Path, mask: u32) -> io::Result<WatchDescriptor> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let wd =
            unsafe { libc::inotify_add_watch(self.inotify.as_raw_fd(), c_path.as_ptr(), mask) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(WatchDescriptor(wd))
    }

    /// Deregister a watch. The kernel follows up with an `IN_IGNORED` record
    /// on the event stream.
    pub fn remove_watch(&self, wd: WatchDescriptor) -> io::Result<()> {
        let rc = unsafe { libc::inotify_rm_watch(self.inotify.as_raw_fd(), wd.raw()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until event records are readable or the pipe is written to.
    ///
    /// No timeout: returns only with data or a cancellation. `EINTR` and a
    /// racing `EAGAIN` (another reader, or readiness consumed between poll
    /// and read) re-enter the wait; zero-length reads keep waiting.
    pub fn read_pending(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        loop {
            let mut fds = [
                libc::pollfd {
                    fd: self.inotify.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.pipe_read.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            // Cancellation wins over pending data so stop() is prompt.
            if fds[1].revents & libc::POLLIN != 0 {
                return Ok(ReadOutcome::Cancelled);
            }

            let len = unsafe {
                libc::read(
                    self.inotify.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if len < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    _ => return Err(err),
                }
            }
            if len == 0 {
                continue;
            }
            return Ok(ReadOutcome::Data(len as usize));
        }
    }

    /// Wake up a blocked [`read_pending`](Self::read_pending).
    ///
    /// A full pipe already guarantees a pending wakeup, so `EAGAIN` counts
    /// as success.
    pub fn interrupt(&self) -> io::Result<()> {
        let byte = [1u8];
        let rc = unsafe {
            libc::write(
                self.pipe_write.as_raw_fd(),
                byte.as_ptr() as *const libc::c_void,
                1,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}
