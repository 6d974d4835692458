#![cfg(target_os = "linux")]

use std::fs;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;

use sigaio::{Handle, SyncMode};

mod util;

#[test]
fn teardown_abandons_unreaped_operations() {
    let (_reactor, bridge) = util::test_env();
    let dir = util::TestDir::new();
    let path = dir.join("abandoned");
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .unwrap();

    let state = util::CallState::new();
    let seen = Rc::clone(&state);
    bridge
        .handle()
        .submit_write(
            file.as_raw_fd(),
            0,
            &b"doomed"[..],
            move |_: &Handle, res, _buf| seen.record(&res),
        )
        .unwrap();
    assert_eq!(bridge.in_flight(), 1);

    // The dispatch loop never runs; dropping the bridge abandons the
    // operation without resolving its callback.
    drop(bridge);
    assert_eq!(state.calls.get(), 0);
}

#[test]
fn teardown_with_idle_bridge_is_quiet() {
    let (_reactor, bridge) = util::test_env();
    assert_eq!(bridge.in_flight(), 0);
    drop(bridge);
}

#[test]
fn surviving_handle_refuses_submissions_after_teardown() {
    let (_reactor, bridge) = util::test_env();
    let handle = bridge.handle();
    drop(bridge);

    let err = handle
        .submit_sync(0, SyncMode::Data, |_: &Handle, _| {})
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Other);
    assert_eq!(handle.in_flight(), 0);
}
