// src/poll/async_watcher.rs

//! Tokio front-end for [`Watcher`].
//!
//! `epoll_wait` blocks its OS thread. Calling it from an async task would
//! stall every other task scheduled on that worker, so each wait is moved to
//! tokio's blocking pool and awaited from there.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::{EpwatchError, Result};

use super::interest::{CtlOp, Interest};
use super::watcher::{AsDescriptor, Event, WaitCanceller, Watcher, WatcherOptions};

/// Cloneable handle to a shared [`Watcher`] whose waits run off the async
/// worker threads.
#[derive(Debug)]
pub struct AsyncWatcher<H> {
    inner: Arc<Watcher<H>>,
}

impl<H> Clone for AsyncWatcher<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> From<Watcher<H>> for AsyncWatcher<H> {
    fn from(watcher: Watcher<H>) -> Self {
        Self {
            inner: Arc::new(watcher),
        }
    }
}

impl<H> AsyncWatcher<H> {
    pub fn new() -> Result<Self> {
        Watcher::new().map(Self::from)
    }

    pub fn with_options(options: WatcherOptions) -> Result<Self> {
        Watcher::with_options(options).map(Self::from)
    }

    /// The shared synchronous watcher.
    pub fn watcher(&self) -> &Watcher<H> {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn canceller(&self) -> WaitCanceller {
        self.inner.canceller()
    }

    /// Take the watcher back, or get `self` returned if other clones or an
    /// in-flight wait still hold it.
    pub fn into_inner(self) -> std::result::Result<Watcher<H>, Self> {
        Arc::try_unwrap(self.inner).map_err(|inner| Self { inner })
    }

    /// Close the underlying watcher. Fails with `StateError` while it is
    /// still shared.
    pub fn close(self) -> Result<()> {
        match self.into_inner() {
            Ok(mut watcher) => watcher.close(),
            Err(_) => Err(EpwatchError::StateError(
                "watcher is still shared by another handle or an in-flight wait".to_string(),
            )),
        }
    }
}

impl<H: AsDescriptor> AsyncWatcher<H> {
    pub fn control(&self, op: CtlOp, handle: Arc<H>, mask: Option<Interest>) -> Result<&Self> {
        self.inner.control(op, handle, mask)?;
        Ok(self)
    }

    pub fn add(&self, handle: Arc<H>, interest: Interest) -> Result<&Self> {
        self.inner.add(handle, interest)?;
        Ok(self)
    }

    pub fn modify(&self, handle: &H, interest: Interest) -> Result<&Self> {
        self.inner.modify(handle, interest)?;
        Ok(self)
    }

    pub fn remove(&self, handle: &H) -> Result<&Self> {
        self.inner.remove(handle)?;
        Ok(self)
    }
}

impl<H> AsyncWatcher<H>
where
    H: AsDescriptor + Send + Sync + 'static,
{
    /// Same contract as [`Watcher::wait`], without blocking the calling
    /// task's worker thread.
    ///
    /// Dropping the returned future does not abort the kernel call; the
    /// blocking thread finishes its wait and the result is discarded.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Event<H>>> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.wait(timeout))
            .await
            .map_err(anyhow::Error::from)?
    }
}
