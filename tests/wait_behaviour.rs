use std::error::Error;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use epwatch::{EpwatchError, Interest, Watcher, WatcherOptions};
use epwatch_test_utils::fds::{SocketPair, eventfd};
use epwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn waiting_on_a_fresh_watcher_is_a_state_error() -> TestResult {
    init_tracing();
    let watcher: Watcher<std::os::unix::net::UnixStream> = Watcher::new()?;

    // Would block forever if it reached the kernel.
    match watcher.wait(None) {
        Err(EpwatchError::StateError(msg)) => assert_eq!(msg, "empty interest list"),
        other => panic!("expected StateError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn events_carry_the_registered_handle_itself() -> TestResult {
    let watcher = Watcher::new()?;
    let mut a = SocketPair::new()?;
    let b = SocketPair::new()?;
    watcher.add(Arc::clone(&a.watched), Interest::IN | Interest::RDHUP)?;
    watcher.add(Arc::clone(&b.watched), Interest::IN)?;

    a.poke()?;
    let events = watcher.wait(Some(Duration::from_secs(1)))?;

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(Arc::ptr_eq(&event.subject, &a.watched));
    assert!(!Arc::ptr_eq(&event.subject, &b.watched));
    assert_eq!(event.mask, Interest::IN);
    Ok(())
}

#[test]
fn reused_descriptor_numbers_resolve_to_the_new_handle() -> TestResult {
    let watcher = Watcher::new()?;

    let first = SocketPair::new()?;
    watcher.add(Arc::clone(&first.watched), Interest::IN)?;
    watcher.remove(&first.watched)?;
    drop(first);

    // Likely gets the same descriptor number back.
    let mut second = SocketPair::new()?;
    watcher.add(Arc::clone(&second.watched), Interest::IN)?;
    second.poke()?;

    let events = watcher.wait(Some(Duration::from_secs(1)))?;
    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(&events[0].subject, &second.watched));
    Ok(())
}

#[test]
fn zero_timeout_polls_and_returns_empty() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;
    watcher.add(Arc::clone(&pair.watched), Interest::IN)?;

    let started = Instant::now();
    let events = watcher.wait(Some(Duration::ZERO))?;
    assert!(events.is_empty());
    assert!(started.elapsed() < Duration::from_millis(500));
    Ok(())
}

#[test]
fn bounded_wait_times_out_empty() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;
    watcher.add(Arc::clone(&pair.watched), Interest::IN)?;

    let started = Instant::now();
    let events = watcher.wait(Some(Duration::from_millis(50)))?;
    assert!(events.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(45));
    Ok(())
}

#[test]
fn peer_hangup_is_reported() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;
    let SocketPair { watched, peer } = pair;
    watcher.add(Arc::clone(&watched), Interest::RDHUP)?;

    drop(peer);
    let events = watcher.wait(Some(Duration::from_secs(1)))?;
    assert_eq!(events.len(), 1);
    assert!(events[0].mask.contains(Interest::RDHUP));
    assert!(events[0].mask.is_closed());
    Ok(())
}

#[test]
fn oneshot_disarms_until_modified() -> TestResult {
    let watcher = Watcher::new()?;
    let mut pair = SocketPair::new()?;
    watcher.add(Arc::clone(&pair.watched), Interest::IN | Interest::ONESHOT)?;
    pair.poke()?;

    assert_eq!(watcher.wait(Some(Duration::from_secs(1)))?.len(), 1);
    // Still readable, but disarmed.
    assert!(watcher.wait(Some(Duration::ZERO))?.is_empty());

    watcher.modify(&pair.watched, Interest::IN | Interest::ONESHOT)?;
    let events = watcher.wait(Some(Duration::from_secs(1)))?;
    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(&events[0].subject, &pair.watched));
    Ok(())
}

#[test]
fn level_triggered_keeps_reporting_until_drained() -> TestResult {
    let watcher = Watcher::new()?;
    let mut pair = SocketPair::new()?;
    watcher.add(Arc::clone(&pair.watched), Interest::IN)?;
    pair.poke()?;

    assert_eq!(watcher.wait(Some(Duration::ZERO))?.len(), 1);
    assert_eq!(watcher.wait(Some(Duration::ZERO))?.len(), 1);

    let mut buf = [0u8; 8];
    let n = (&*pair.watched).read(&mut buf)?;
    assert_eq!(n, 1);
    assert!(watcher.wait(Some(Duration::ZERO))?.is_empty());
    Ok(())
}

#[test]
fn edge_triggered_reports_each_transition_once() -> TestResult {
    let watcher = Watcher::new()?;
    let mut pair = SocketPair::new()?;
    watcher.add(Arc::clone(&pair.watched), Interest::IN | Interest::ET)?;
    pair.poke()?;

    assert_eq!(watcher.wait(Some(Duration::ZERO))?.len(), 1);
    assert!(watcher.wait(Some(Duration::ZERO))?.is_empty());

    pair.poke()?;
    assert_eq!(watcher.wait(Some(Duration::from_secs(1)))?.len(), 1);
    Ok(())
}

#[test]
fn different_handle_types_through_one_watcher() -> TestResult {
    // Handles only need to expose a descriptor; owned fds work directly.
    let watcher = Watcher::new()?;
    let efd = eventfd()?;
    watcher.add(Arc::clone(&efd), Interest::OUT)?;

    let events = watcher.wait(Some(Duration::ZERO))?;
    assert_eq!(events.len(), 1);
    assert!(Arc::ptr_eq(&events[0].subject, &efd));
    assert!(events[0].mask.is_writable());
    Ok(())
}

#[test]
fn a_watcher_can_watch_another_watcher() -> TestResult {
    let outer: Watcher<Watcher<std::os::unix::net::UnixStream>> = Watcher::new()?;
    let inner = Arc::new(Watcher::new()?);
    let mut pair = SocketPair::new()?;
    inner.add(Arc::clone(&pair.watched), Interest::IN)?;
    outer.add(Arc::clone(&inner), Interest::IN)?;

    assert!(outer.wait(Some(Duration::ZERO))?.is_empty());
    pair.poke()?;

    let events = outer.wait(Some(Duration::from_secs(1)))?;
    assert_eq!(events.len(), 1);
    let nested = events[0].subject.wait(Some(Duration::ZERO))?;
    assert!(Arc::ptr_eq(&nested[0].subject, &pair.watched));
    Ok(())
}

#[test]
fn smaller_batches_still_reach_every_ready_handle() -> TestResult {
    let watcher = Watcher::with_options(WatcherOptions {
        max_batch: 1,
        ..WatcherOptions::default()
    })?;
    let a = eventfd()?;
    let b = eventfd()?;
    watcher.add(Arc::clone(&a), Interest::OUT | Interest::ET)?;
    watcher.add(Arc::clone(&b), Interest::OUT | Interest::ET)?;

    let first = watcher.wait(Some(Duration::ZERO))?;
    let second = watcher.wait(Some(Duration::ZERO))?;
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert!(!Arc::ptr_eq(&first[0].subject, &second[0].subject));
    assert!(watcher.wait(Some(Duration::ZERO))?.is_empty());
    Ok(())
}
