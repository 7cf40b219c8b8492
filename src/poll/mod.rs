// src/poll/mod.rs

//! Readiness notification over Linux `epoll`.
//!
//! This module is the core of the crate:
//! - [`Watcher`] owns one epoll instance plus the registry of handles that are
//!   currently armed in it.
//! - [`Interest`] / [`CtlOp`] expose the kernel's event bits and control codes.
//! - [`AsyncWatcher`] runs the blocking wait on tokio's blocking pool so the
//!   calling task's worker thread stays free.
//!
//! It is deliberately **not** an event loop: callers decide when to wait and
//! what to do with the returned [`Event`]s.

/// Run a libc call, mapping `-1` to `io::Error::last_os_error()`.
macro_rules! syscall {
    ($fn:ident $args:tt) => {{
        let res = unsafe { libc::$fn $args };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

pub mod async_watcher;
pub mod interest;
pub mod registry;
pub mod watcher;

pub use async_watcher::AsyncWatcher;
pub use interest::{CtlOp, Interest};
pub use watcher::{AsDescriptor, Event, WaitCanceller, Watcher, WatcherOptions};

/// Upper bound on events returned by a single wait call.
pub const MAX_BATCH: usize = 256;
