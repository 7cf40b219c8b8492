// src/poll/registry.rs

//! Liveness anchors for handles armed in an epoll instance.
//!
//! The kernel only stores a `u64` per registration. We put a registration
//! token there and keep the owning `Arc<H>` here, so a handle cannot be
//! dropped while the kernel may still report it. Tokens are never reused
//! within one registry, which keeps a recycled descriptor number from
//! resolving to a stale handle.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

/// Token carried by `modify` for a descriptor we never registered.
/// The kernel rejects such a call with `ENOENT`, so it never comes back.
pub(crate) const UNREGISTERED_TOKEN: u64 = 0;

#[derive(Debug)]
pub struct Registry<H> {
    next_token: u64,
    by_token: HashMap<u64, Arc<H>>,
    by_fd: HashMap<RawFd, u64>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            next_token: UNREGISTERED_TOKEN + 1,
            by_token: HashMap::new(),
            by_fd: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Token the next successful `insert` will use.
    pub fn next_token(&self) -> u64 {
        self.next_token
    }

    /// Token of the live registration for `fd`, if any.
    pub fn token_for(&self, fd: RawFd) -> Option<u64> {
        self.by_fd.get(&fd).copied()
    }

    /// Anchor `handle` under `token`. Call only after the kernel accepted the
    /// registration.
    pub fn insert(&mut self, token: u64, fd: RawFd, handle: Arc<H>) {
        debug_assert!(token >= self.next_token, "registration token reused");
        self.next_token = token + 1;
        if let Some(stale) = self.by_fd.insert(fd, token) {
            // The kernel refuses a second ADD for the same descriptor, so
            // this only happens if the caller closed and reopened it behind
            // our back. Drop the old anchor.
            self.by_token.remove(&stale);
        }
        self.by_token.insert(token, handle);
    }

    /// Release the anchor for `fd`, returning the handle it kept alive.
    pub fn remove_fd(&mut self, fd: RawFd) -> Option<Arc<H>> {
        let token = self.by_fd.remove(&fd)?;
        self.by_token.remove(&token)
    }

    /// Map a token reported by the kernel back to its handle.
    pub fn resolve(&self, token: u64) -> Option<Arc<H>> {
        self.by_token.get(&token).cloned()
    }

    /// Whether this exact handle (pointer identity) is registered.
    pub fn contains(&self, handle: &Arc<H>) -> bool {
        self.by_token.values().any(|h| Arc::ptr_eq(h, handle))
    }

    pub fn handles(&self) -> Vec<Arc<H>> {
        self.by_token.values().cloned().collect()
    }

    /// Drop every anchor, returning how many were released.
    pub fn clear(&mut self) -> usize {
        let released = self.by_token.len();
        self.by_token.clear();
        self.by_fd.clear();
        released
    }
}
