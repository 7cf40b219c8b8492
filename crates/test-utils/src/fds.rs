//! Descriptor fixtures for watcher tests.

use std::collections::HashSet;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use epwatch::{AsDescriptor, Event};

/// A connected socket pair: `watched` goes to the watcher, `peer` drives it.
pub struct SocketPair {
    pub watched: Arc<UnixStream>,
    pub peer: UnixStream,
}

impl SocketPair {
    pub fn new() -> io::Result<Self> {
        let (watched, peer) = UnixStream::pair()?;
        watched.set_nonblocking(true)?;
        Ok(Self {
            watched: Arc::new(watched),
            peer,
        })
    }

    /// Make `watched` readable.
    pub fn poke(&mut self) -> io::Result<()> {
        self.peer.write_all(b"x")
    }
}

/// A non-blocking eventfd. With a zero counter it is permanently writable,
/// which makes it a cheap always-ready `OUT` source.
pub fn eventfd() -> io::Result<Arc<OwnedFd>> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: freshly created descriptor, owned by nobody else.
    Ok(Arc::new(unsafe { OwnedFd::from_raw_fd(fd) }))
}

pub fn eventfds(n: usize) -> io::Result<Vec<Arc<OwnedFd>>> {
    (0..n).map(|_| eventfd()).collect()
}

/// A FIFO at `path` with both ends held open.
///
/// Keeping a reader lets the writer open without blocking; keeping the
/// writer means readers opened later never see a hangup.
pub struct Fifo {
    pub reader: File,
    pub writer: File,
}

impl Fifo {
    pub fn create(path: &Path) -> io::Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) } == -1 {
            return Err(io::Error::last_os_error());
        }
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        let writer = OpenOptions::new().write(true).open(path)?;
        Ok(Self { reader, writer })
    }

    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }
}

/// A handle whose descriptor is gone.
#[derive(Debug, Default)]
pub struct ClosedHandle;

impl AsDescriptor for ClosedHandle {
    fn descriptor(&self) -> io::Result<RawFd> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }
}

/// Pointer addresses of the event subjects, for set comparisons.
pub fn subject_ptrs<H>(events: &[Event<H>]) -> HashSet<usize> {
    events
        .iter()
        .map(|e| Arc::as_ptr(&e.subject) as usize)
        .collect()
}

pub fn handle_ptrs<H>(handles: &[Arc<H>]) -> HashSet<usize> {
    handles.iter().map(|h| Arc::as_ptr(h) as usize).collect()
}
