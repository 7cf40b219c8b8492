// src/poll/interest.rs

use std::fmt;
use std::os::raw::c_int;

use bitflags::bitflags;

use crate::errors::{EpwatchError, Result};

bitflags! {
    /// Event bits as understood by `epoll`.
    ///
    /// Used both for the interest mask passed at registration and for the
    /// fired mask reported by a wait. Reported masks keep any bits the kernel
    /// sets, including ones not named here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u32 {
        const IN = libc::EPOLLIN as u32;
        const PRI = libc::EPOLLPRI as u32;
        const OUT = libc::EPOLLOUT as u32;
        const ERR = libc::EPOLLERR as u32;
        const HUP = libc::EPOLLHUP as u32;
        const RDHUP = libc::EPOLLRDHUP as u32;
        const ONESHOT = libc::EPOLLONESHOT as u32;
        const ET = libc::EPOLLET as u32;
    }
}

impl Interest {
    /// Bits a registration may request. `ERR` and `HUP` are always reported
    /// by the kernel and do not count on their own.
    pub const REQUESTABLE: Interest = Interest::IN
        .union(Interest::PRI)
        .union(Interest::OUT)
        .union(Interest::RDHUP)
        .union(Interest::ET)
        .union(Interest::ONESHOT);

    /// Check that a requested mask names at least one requestable bit.
    pub fn validate_request(self) -> Result<Self> {
        if self.intersects(Self::REQUESTABLE) {
            Ok(self)
        } else {
            Err(EpwatchError::InvalidArgument(format!(
                "undefined events: {:#x} has none of IN, PRI, RDHUP, OUT, ET, ONESHOT",
                self.bits()
            )))
        }
    }

    pub fn is_readable(self) -> bool {
        self.contains(Interest::IN)
    }

    pub fn is_writable(self) -> bool {
        self.contains(Interest::OUT)
    }

    /// Peer hung up or the descriptor is in an error state.
    pub fn is_closed(self) -> bool {
        self.intersects(Interest::HUP | Interest::RDHUP | Interest::ERR)
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }

        let unknown = self.bits() & !Interest::all().bits();
        if unknown != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{unknown:#x}")?;
        }
        Ok(())
    }
}

/// `epoll_ctl` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtlOp {
    Add,
    Modify,
    Delete,
}

impl CtlOp {
    /// The `EPOLL_CTL_*` code passed to the kernel.
    pub const fn code(self) -> c_int {
        match self {
            CtlOp::Add => libc::EPOLL_CTL_ADD,
            CtlOp::Modify => libc::EPOLL_CTL_MOD,
            CtlOp::Delete => libc::EPOLL_CTL_DEL,
        }
    }

}

impl fmt::Display for CtlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CtlOp::Add => "CTL_ADD",
            CtlOp::Modify => "CTL_MOD",
            CtlOp::Delete => "CTL_DEL",
        };
        f.write_str(name)
    }
}
