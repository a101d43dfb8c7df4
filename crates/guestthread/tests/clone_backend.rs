//! Raw-clone backend bring-up, in its own process: backend selection is
//! one-shot and the segment-base binder applies process-wide.
//!
//! The entry deliberately touches nothing but atomics - a clone unit shares
//! its creator's host TLS and must never allocate.

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use guestthread::{
    current_teb, errno_location, init, init_errno_shim, spawn, BackendKind, RuntimeConfig,
};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static CLONE_TID: AtomicI32 = AtomicI32::new(0);
static CLONE_ERRNO_CELL: AtomicUsize = AtomicUsize::new(0);
static CLONE_DONE: AtomicBool = AtomicBool::new(false);

extern "C" fn clone_entry() {
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as i32;
    CLONE_TID.store(tid, Ordering::Release);
    CLONE_ERRNO_CELL.store(errno_location() as usize, Ordering::Release);
    CLONE_DONE.store(true, Ordering::Release);
}

#[test]
fn test_clone_unit_runs_and_self_frees() {
    init(RuntimeConfig::new().backend(BackendKind::Clone)).unwrap();
    init_errno_shim().unwrap();

    // Unbound host threads must degrade to null / the shared cell in
    // segment mode, not fault on the descriptor lookup
    assert!(current_teb().is_none());
    let shared_cell = errno_location() as usize;
    let unbound_cell = std::thread::spawn(|| {
        assert!(current_teb().is_none());
        errno_location() as usize
    })
    .join()
    .unwrap();
    assert_eq!(unbound_cell, shared_cell);

    let main_tid = unsafe { libc::syscall(libc::SYS_gettid) } as i32;
    spawn(clone_entry).unwrap();

    let start = Instant::now();
    while !CLONE_DONE.load(Ordering::Acquire) {
        assert!(start.elapsed() < Duration::from_secs(5), "clone unit never ran");
        std::thread::sleep(Duration::from_millis(1));
    }

    let tid = CLONE_TID.load(Ordering::Acquire);
    assert!(tid > 0);
    assert_ne!(tid, main_tid, "entry must run on its own kernel thread");

    // The bound clone unit resolved its own descriptor cell
    let unit_cell = CLONE_ERRNO_CELL.load(Ordering::Acquire);
    assert_ne!(unit_cell, 0);
    assert_ne!(unit_cell, shared_cell);

    // Give the unit time to finish the temp-stack teardown; there is no
    // join handle to wait on.
    std::thread::sleep(Duration::from_millis(200));
}
