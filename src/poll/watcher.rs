// src/poll/watcher.rs

use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::raw::c_int;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::errors::{EpwatchError, Result};
use crate::types::InterruptPolicy;

use super::MAX_BATCH;
use super::interest::{CtlOp, Interest};
use super::registry::{Registry, UNREGISTERED_TOKEN};

/// Resolve a watched handle to the descriptor the kernel should watch.
///
/// Implemented for everything that is [`AsFd`]. Types that may have lost
/// their descriptor (e.g. a closed connection wrapper) can implement it
/// directly and return an error.
pub trait AsDescriptor {
    fn descriptor(&self) -> io::Result<RawFd>;
}

impl<T: AsFd + ?Sized> AsDescriptor for T {
    fn descriptor(&self) -> io::Result<RawFd> {
        Ok(self.as_fd().as_raw_fd())
    }
}

/// Tuning knobs for a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Upper bound on events per wait call, `1..=MAX_BATCH`.
    pub max_batch: usize,
    /// What a wait does with its timeout after `EINTR`.
    pub on_interrupt: InterruptPolicy,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            max_batch: MAX_BATCH,
            on_interrupt: InterruptPolicy::default(),
        }
    }
}

impl WatcherOptions {
    pub fn validate(self) -> Result<Self> {
        if self.max_batch == 0 || self.max_batch > MAX_BATCH {
            return Err(EpwatchError::InvalidArgument(format!(
                "max_batch must be in 1..={MAX_BATCH} (got {})",
                self.max_batch
            )));
        }
        Ok(self)
    }
}

/// One readiness report: the registered handle and the bits that fired.
#[derive(Debug)]
pub struct Event<H> {
    pub subject: Arc<H>,
    pub mask: Interest,
}

impl<H> Clone for Event<H> {
    fn clone(&self) -> Self {
        Self {
            subject: Arc::clone(&self.subject),
            mask: self.mask,
        }
    }
}

/// Requests that the next wait on a [`Watcher`] return
/// [`EpwatchError::Cancelled`] instead of (re-)entering the kernel.
///
/// The request is checked when a wait starts and after every `EINTR`. A
/// thread already parked in `epoll_wait` only notices it once a signal
/// interrupts the call; without one, a blocked wait runs until it has events
/// or times out. A request is consumed by the wait that observes it.
#[derive(Debug, Clone)]
pub struct WaitCanceller {
    flag: Arc<AtomicBool>,
}

impl WaitCanceller {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// An epoll instance plus the handles currently armed in it.
///
/// Control and wait take `&self`: the registry sits behind a mutex that is
/// held across `epoll_ctl` (so registry and kernel never disagree) but never
/// across the blocking `epoll_wait`. Share it through an `Arc` to wait on one
/// thread while registering from another.
pub struct Watcher<H> {
    epfd: Option<OwnedFd>,
    registry: Mutex<Registry<H>>,
    options: WatcherOptions,
    cancel: Arc<AtomicBool>,
}

impl<H> fmt::Debug for Watcher<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("epfd", &self.context_fd())
            .field("registered", &self.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<H> Watcher<H> {
    /// Create a watcher with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(WatcherOptions::default())
    }

    /// Create a watcher backed by a fresh close-on-exec epoll instance.
    pub fn with_options(options: WatcherOptions) -> Result<Self> {
        let options = options.validate()?;
        let raw = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))
            .map_err(|e| EpwatchError::resource("epoll_create1", None, None, e))?;
        // SAFETY: `raw` was just returned by epoll_create1 and is owned by no one else.
        let epfd = unsafe { OwnedFd::from_raw_fd(raw) };

        info!(
            epfd = raw,
            max_batch = options.max_batch,
            on_interrupt = ?options.on_interrupt,
            "epoll watcher created"
        );

        Ok(Self {
            epfd: Some(epfd),
            registry: Mutex::new(Registry::new()),
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn options(&self) -> WatcherOptions {
        self.options
    }

    /// Descriptor of the epoll instance, or `None` once closed.
    pub fn context_fd(&self) -> Option<RawFd> {
        self.epfd.as_ref().map(|fd| fd.as_raw_fd())
    }

    pub fn is_closed(&self) -> bool {
        self.epfd.is_none()
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Whether this exact handle (pointer identity) is registered.
    pub fn is_registered(&self, handle: &Arc<H>) -> bool {
        self.registry.lock().contains(handle)
    }

    /// Snapshot of the registered handles, in no particular order.
    pub fn registered(&self) -> Vec<Arc<H>> {
        self.registry.lock().handles()
    }

    pub fn canceller(&self) -> WaitCanceller {
        WaitCanceller {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Close the epoll instance and release every registered handle.
    ///
    /// The handles themselves are not closed. Closing twice is a
    /// `StateError`; dropping a watcher closes it if this was never called.
    pub fn close(&mut self) -> Result<()> {
        let epfd = self
            .epfd
            .take()
            .ok_or_else(|| EpwatchError::StateError("watcher already closed".to_string()))?;
        let released = self.registry.get_mut().clear();

        let raw = epfd.into_raw_fd();
        syscall!(close(raw)).map_err(|e| EpwatchError::resource("close", Some(raw), None, e))?;

        info!(epfd = raw, released, "epoll watcher closed");
        Ok(())
    }

    fn live_epfd(&self) -> Result<RawFd> {
        self.context_fd()
            .ok_or_else(|| EpwatchError::StateError("watcher is closed".to_string()))
    }
}

impl<H: AsDescriptor> Watcher<H> {
    /// Apply an `epoll_ctl` operation in its tagged form.
    ///
    /// `Add` and `Modify` require a mask; `Delete` must not be given one.
    /// Shape errors are reported before anything else is looked at.
    pub fn control(&self, op: CtlOp, handle: Arc<H>, mask: Option<Interest>) -> Result<&Self> {
        match (op, mask) {
            (CtlOp::Add, Some(mask)) => self.add(handle, mask),
            (CtlOp::Modify, Some(mask)) => self.modify(&handle, mask),
            (CtlOp::Delete, None) => self.remove(&handle),
            (CtlOp::Add | CtlOp::Modify, None) => Err(EpwatchError::InvalidArgument(format!(
                "too few arguments: {op} requires an interest mask"
            ))),
            (CtlOp::Delete, Some(_)) => Err(EpwatchError::InvalidArgument(format!(
                "too many arguments: {op} does not take an interest mask"
            ))),
        }
    }

    /// Register `handle` and keep it alive until it is removed or the
    /// watcher is closed.
    pub fn add(&self, handle: Arc<H>, interest: Interest) -> Result<&Self> {
        let interest = interest.validate_request()?;
        let fd = resolve_descriptor(&*handle)?;
        let epfd = self.live_epfd()?;

        let mut registry = self.registry.lock();
        let token = registry.next_token();
        ctl(epfd, CtlOp::Add, fd, Some(epoll_event(interest, token)))?;
        registry.insert(token, fd, handle);

        debug!(
            epfd,
            fd,
            token,
            %interest,
            registered = registry.len(),
            "descriptor added"
        );
        Ok(self)
    }

    /// Change the interest mask of a registered handle.
    ///
    /// Events keep reporting the handle that was originally added for this
    /// descriptor.
    pub fn modify(&self, handle: &H, interest: Interest) -> Result<&Self> {
        let interest = interest.validate_request()?;
        let fd = resolve_descriptor(handle)?;
        let epfd = self.live_epfd()?;

        let registry = self.registry.lock();
        let token = registry.token_for(fd).unwrap_or(UNREGISTERED_TOKEN);
        ctl(epfd, CtlOp::Modify, fd, Some(epoll_event(interest, token)))?;

        debug!(epfd, fd, token, %interest, "descriptor modified");
        Ok(self)
    }

    /// Unregister `handle` and release the registry's reference to it.
    pub fn remove(&self, handle: &H) -> Result<&Self> {
        let fd = resolve_descriptor(handle)?;
        let epfd = self.live_epfd()?;

        let mut registry = self.registry.lock();
        ctl(epfd, CtlOp::Delete, fd, None)?;
        let released = registry.remove_fd(fd);

        debug!(
            epfd,
            fd,
            anchored = released.is_some(),
            registered = registry.len(),
            "descriptor removed"
        );
        Ok(self)
    }

    /// Block until at least one registered handle is ready or `timeout`
    /// elapses. `None` waits forever; `Some(Duration::ZERO)` polls.
    ///
    /// Returns at most `options().max_batch` events, in the order the kernel
    /// reported them. An empty result means the timeout elapsed.
    ///
    /// `EINTR` is retried; see [`InterruptPolicy`] for how the timeout is
    /// treated on retry and [`WaitCanceller`] for stopping a wait.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Event<H>>> {
        let epfd = self.live_epfd()?;
        let capacity = {
            let registry = self.registry.lock();
            if registry.is_empty() {
                return Err(EpwatchError::StateError("empty interest list".to_string()));
            }
            registry.len().min(self.options.max_batch)
        };

        let mut buf = vec![libc::epoll_event { events: 0, u64: 0 }; capacity];
        let ready = self.wait_raw(epfd, &mut buf, timeout)?;

        let registry = self.registry.lock();
        let mut events = Vec::with_capacity(ready);
        for raw in &buf[..ready] {
            let (bits, token) = (raw.events, raw.u64);
            match registry.resolve(token) {
                Some(subject) => events.push(Event {
                    subject,
                    mask: Interest::from_bits_retain(bits),
                }),
                // Removed by another thread after the kernel reported it.
                None => debug!(epfd, token, bits, "dropping event for a released registration"),
            }
        }

        debug!(epfd, capacity, ready, "wait returned");
        Ok(events)
    }

    fn wait_raw(
        &self,
        epfd: RawFd,
        buf: &mut [libc::epoll_event],
        timeout: Option<Duration>,
    ) -> Result<usize> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut remaining = timeout;

        loop {
            if self.cancel.swap(false, Ordering::AcqRel) {
                debug!(epfd, "wait cancelled");
                return Err(EpwatchError::Cancelled);
            }

            let timeout_ms = timeout_to_ms(remaining);
            trace!(epfd, capacity = buf.len(), timeout_ms, "entering epoll_wait");

            match syscall!(epoll_wait(epfd, buf.as_mut_ptr(), buf.len() as c_int, timeout_ms)) {
                Ok(ready) => return Ok(ready as usize),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if self.options.on_interrupt == InterruptPolicy::Deadline {
                        if let Some(deadline) = deadline {
                            remaining = Some(deadline.saturating_duration_since(Instant::now()));
                        }
                    }
                    trace!(epfd, ?remaining, "epoll_wait interrupted; retrying");
                }
                Err(e) => return Err(EpwatchError::resource("epoll_wait", Some(epfd), None, e)),
            }
        }
    }
}

/// A watcher can itself be watched: epoll descriptors are pollable.
impl<H> AsDescriptor for Watcher<H> {
    fn descriptor(&self) -> io::Result<RawFd> {
        self.context_fd()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }
}

fn resolve_descriptor<H: AsDescriptor + ?Sized>(handle: &H) -> Result<RawFd> {
    handle.descriptor().map_err(|e| {
        EpwatchError::InvalidArgument(format!("handle has no open descriptor: {e}"))
    })
}

fn epoll_event(interest: Interest, token: u64) -> libc::epoll_event {
    libc::epoll_event {
        events: interest.bits(),
        u64: token,
    }
}

fn ctl(epfd: RawFd, op: CtlOp, fd: RawFd, event: Option<libc::epoll_event>) -> Result<()> {
    // Kernels before 2.6.9 insist on a non-null event even for DEL.
    let mut event = event.unwrap_or(libc::epoll_event { events: 0, u64: 0 });
    trace!(epfd, fd, %op, "epoll_ctl");
    syscall!(epoll_ctl(epfd, op.code(), fd, &mut event))
        .map(|_| ())
        .map_err(|e| EpwatchError::resource("epoll_ctl", Some(epfd), Some(fd), e))
}

/// Convert to the millisecond argument of `epoll_wait`, rounding up so a
/// short non-zero timeout never turns into a poll.
pub(crate) fn timeout_to_ms(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let round_up = u128::from(t.subsec_nanos() % 1_000_000 != 0);
            let ms = t.as_millis() + round_up;
            ms.min(c_int::MAX as u128) as c_int
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn timeout_conversion() {
        assert_eq!(timeout_to_ms(None), -1);
        assert_eq!(timeout_to_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_to_ms(Some(Duration::from_millis(250))), 250);
        assert_eq!(timeout_to_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_to_ms(Some(Duration::from_micros(1500))), 2);
        assert_eq!(timeout_to_ms(Some(Duration::MAX)), c_int::MAX);
    }

    #[test]
    fn options_reject_out_of_range_batches() {
        for max_batch in [0, MAX_BATCH + 1] {
            let opts = WatcherOptions {
                max_batch,
                ..WatcherOptions::default()
            };
            assert!(matches!(opts.validate(), Err(EpwatchError::InvalidArgument(_))));
        }
        assert!(Watcher::<UnixStream>::with_options(WatcherOptions {
            max_batch: 0,
            ..WatcherOptions::default()
        })
        .is_err());
    }

    #[test]
    fn context_descriptor_is_close_on_exec() {
        let watcher: Watcher<UnixStream> = Watcher::new().unwrap();
        let epfd = watcher.context_fd().unwrap();
        let flags = unsafe { libc::fcntl(epfd, libc::F_GETFD) };
        assert!(flags & libc::FD_CLOEXEC != 0);
    }

    #[test]
    fn modify_of_unknown_descriptor_surfaces_enoent() {
        let watcher = Watcher::new().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();

        let err = watcher.modify(&a, Interest::IN).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(watcher.is_empty());
    }

    #[test]
    fn batch_is_capped_by_options() {
        let watcher = Watcher::with_options(WatcherOptions {
            max_batch: 2,
            ..WatcherOptions::default()
        })
        .unwrap();

        let mut peers = Vec::new();
        for _ in 0..4 {
            let (a, b) = UnixStream::pair().unwrap();
            watcher.add(Arc::new(a), Interest::OUT).unwrap();
            peers.push(b);
        }

        let events = watcher.wait(Some(Duration::ZERO)).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn debug_output_names_the_descriptor() {
        let watcher: Watcher<UnixStream> = Watcher::new().unwrap();
        let rendered = format!("{watcher:?}");
        assert!(rendered.contains("Watcher"));
        assert!(rendered.contains("registered: 0"));
    }
}
