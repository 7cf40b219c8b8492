use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use epwatch::{CtlOp, EpwatchError, Interest, Watcher};
use epwatch_test_utils::fds::{ClosedHandle, SocketPair};
use epwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn add_and_modify_reject_masks_without_requestable_bits() -> TestResult {
    init_tracing();
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;

    for op in [CtlOp::Add, CtlOp::Modify] {
        for mask in [Interest::empty(), Interest::ERR | Interest::HUP] {
            let err = watcher
                .control(op, Arc::clone(&pair.watched), Some(mask))
                .unwrap_err();
            assert!(
                matches!(err, EpwatchError::InvalidArgument(_)),
                "{op} with {mask:?}: {err:?}"
            );
        }
    }
    assert!(watcher.is_empty());
    Ok(())
}

#[test]
fn delete_with_a_mask_is_rejected_whatever_the_kernel_state() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;

    // Not registered.
    let err = watcher
        .control(CtlOp::Delete, Arc::clone(&pair.watched), Some(Interest::IN))
        .unwrap_err();
    assert!(matches!(err, EpwatchError::InvalidArgument(_)));

    // Registered.
    watcher.add(Arc::clone(&pair.watched), Interest::IN)?;
    let err = watcher
        .control(CtlOp::Delete, Arc::clone(&pair.watched), Some(Interest::empty()))
        .unwrap_err();
    assert!(matches!(err, EpwatchError::InvalidArgument(_)));
    assert!(watcher.is_registered(&pair.watched));
    Ok(())
}

#[test]
fn add_and_modify_without_a_mask_are_rejected() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;

    for op in [CtlOp::Add, CtlOp::Modify] {
        let err = watcher
            .control(op, Arc::clone(&pair.watched), None)
            .unwrap_err();
        match err {
            EpwatchError::InvalidArgument(msg) => assert!(msg.contains("requires")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn tagged_control_round_trip() -> TestResult {
    let watcher = Watcher::new()?;
    let mut pair = SocketPair::new()?;
    let h = Arc::clone(&pair.watched);

    watcher
        .control(CtlOp::Add, Arc::clone(&h), Some(Interest::OUT))?
        .control(CtlOp::Modify, Arc::clone(&h), Some(Interest::IN))?;
    assert_eq!(watcher.len(), 1);

    pair.poke()?;
    let events = watcher.wait(Some(Duration::from_secs(1)))?;
    assert_eq!(events.len(), 1);
    assert!(events[0].mask.is_readable());
    assert!(!events[0].mask.is_writable());

    watcher.control(CtlOp::Delete, Arc::clone(&h), None)?;
    assert!(watcher.is_empty());
    Ok(())
}

#[test]
fn double_add_surfaces_the_kernel_error_and_keeps_one_anchor() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;

    watcher.add(Arc::clone(&pair.watched), Interest::IN)?;
    let err = watcher
        .add(Arc::clone(&pair.watched), Interest::IN)
        .unwrap_err();

    match &err {
        EpwatchError::ResourceError {
            syscall, epfd, fd, ..
        } => {
            assert_eq!(*syscall, "epoll_ctl");
            assert_eq!(*epfd, watcher.context_fd());
            assert!(fd.is_some());
        }
        other => panic!("expected ResourceError, got {other:?}"),
    }
    assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
    assert_eq!(watcher.len(), 1);
    Ok(())
}

#[test]
fn removing_an_unregistered_handle_leaves_the_registry_alone() -> TestResult {
    let watcher = Watcher::new()?;
    let kept = SocketPair::new()?;
    let stranger = SocketPair::new()?;

    watcher.add(Arc::clone(&kept.watched), Interest::IN)?;
    let err = watcher.remove(&stranger.watched).unwrap_err();

    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    assert_eq!(watcher.len(), 1);
    assert!(watcher.is_registered(&kept.watched));
    Ok(())
}

#[test]
fn handle_without_descriptor_is_an_invalid_argument() -> TestResult {
    let watcher: Watcher<ClosedHandle> = Watcher::new()?;

    let err = watcher
        .add(Arc::new(ClosedHandle), Interest::IN)
        .unwrap_err();
    assert!(matches!(err, EpwatchError::InvalidArgument(_)));

    let err = watcher.remove(&ClosedHandle).unwrap_err();
    assert!(matches!(err, EpwatchError::InvalidArgument(_)));
    assert!(watcher.is_empty());
    Ok(())
}

#[test]
fn kernel_refusal_for_regular_files_is_a_resource_error() -> TestResult {
    let watcher = Watcher::new()?;
    let file = Arc::new(tempfile::tempfile()?);

    let err = watcher.add(file, Interest::IN).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EPERM));
    assert!(err.to_string().contains("epoll_ctl(2) failed"));
    assert!(watcher.is_empty());
    Ok(())
}

#[test]
fn registry_anchors_handles_until_removed() -> TestResult {
    let watcher = Watcher::new()?;
    let pair = SocketPair::new()?;
    let weak = Arc::downgrade(&pair.watched);
    let SocketPair { watched, peer } = pair;

    watcher.add(watched, Interest::IN)?;
    // Our own strong reference is gone; the registry keeps it alive.
    let handle = weak.upgrade().expect("registered handle was dropped");
    watcher.remove(&handle)?;
    drop(handle);

    assert!(weak.upgrade().is_none());
    drop(peer);
    Ok(())
}
