// src/source.rs

//! Watched handles used by the `epwatch` binary.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Something the CLI registers with its watcher.
#[derive(Debug)]
pub enum Source {
    /// A path opened read-only and non-blocking: a FIFO or a pollable
    /// character device such as a tty.
    Path { path: PathBuf, file: File },
    /// The process's standard input.
    Stdin(io::Stdin),
    /// Read end of the pair used to wake a blocked wait on shutdown.
    Wakeup(UnixStream),
}

impl Source {
    /// Open `path` without blocking: a FIFO with no writer would otherwise
    /// hang in `open(2)`.
    ///
    /// Regular files and directories are rejected here; epoll refuses them.
    /// Devices are left to the kernel, which answers `EPERM` at registration
    /// for the ones without poll support (`/dev/null`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .with_context(|| format!("opening {path:?} for watching"))?;

        let meta = file
            .metadata()
            .with_context(|| format!("inspecting {path:?}"))?;
        if meta.is_file() || meta.is_dir() {
            bail!(
                "{} is not pollable: epoll cannot watch regular files or directories",
                path.display()
            );
        }
        Ok(Source::Path {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn stdin() -> Self {
        Source::Stdin(io::stdin())
    }

    /// A wakeup source and the stream that triggers it.
    pub fn wakeup_pair() -> Result<(Self, UnixStream)> {
        let (rx, tx) = UnixStream::pair().context("creating wakeup socket pair")?;
        rx.set_nonblocking(true)?;
        Ok((Source::Wakeup(rx), tx))
    }

    pub fn is_wakeup(&self) -> bool {
        matches!(self, Source::Wakeup(_))
    }

    /// Read and discard whatever is buffered, so a level-triggered
    /// registration stops reporting it. Returns the number of bytes dropped;
    /// `0` with a readable event means end of file.
    pub fn drain(&self) -> io::Result<usize> {
        let mut buf = [0u8; 4096];
        let mut total = 0;
        loop {
            let res = match self {
                Source::Path { file, .. } => (&*file).read(&mut buf),
                Source::Wakeup(stream) => (&*stream).read(&mut buf),
                // Stdin may be a blocking terminal; leave it to the caller.
                Source::Stdin(_) => return Ok(0),
            };
            match res {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl AsFd for Source {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Source::Path { file, .. } => file.as_fd(),
            Source::Stdin(stdin) => stdin.as_fd(),
            Source::Wakeup(stream) => stream.as_fd(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path { path, .. } => write!(f, "{}", path.display()),
            Source::Stdin(_) => f.write_str("<stdin>"),
            Source::Wakeup(_) => f.write_str("<wakeup>"),
        }
    }
}
