//! Errno shim behavior, in its own process: the shim switch is one-way and
//! would leak into unrelated tests sharing the binary.

use guestthread::{errno_location, init_errno_shim, reap_pending, set_errno, spawn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static UNIT_CELL: AtomicUsize = AtomicUsize::new(0);
static UNIT_VALUE_OK: AtomicBool = AtomicBool::new(false);
static UNIT_DONE: AtomicBool = AtomicBool::new(false);

extern "C" fn errno_recorder_entry() {
    UNIT_CELL.store(errno_location() as usize, Ordering::Release);
    set_errno(7777);
    UNIT_VALUE_OK.store(unsafe { *errno_location() } == 7777, Ordering::Release);
    UNIT_DONE.store(true, Ordering::Release);
}

static SECOND_CELL: AtomicUsize = AtomicUsize::new(0);
static SECOND_DONE: AtomicBool = AtomicBool::new(false);

extern "C" fn second_recorder_entry() {
    SECOND_CELL.store(errno_location() as usize, Ordering::Release);
    SECOND_DONE.store(true, Ordering::Release);
}

#[test]
fn test_shim_switches_from_shared_cell_to_unit_cells() {
    // Pre-init: every caller resolves to the same process-wide cell,
    // whichever host thread it runs on
    let shared_cell = errno_location() as usize;
    let remote_cell = std::thread::spawn(|| errno_location() as usize)
        .join()
        .unwrap();
    assert_eq!(shared_cell, remote_cell, "pre-init cell must be shared");

    init_errno_shim().unwrap();
    // Idempotent
    init_errno_shim().unwrap();

    // This thread never bound a descriptor, so it keeps the shared cell,
    // and so does any other unbound host thread
    assert_eq!(errno_location() as usize, shared_cell);
    let unbound_cell = std::thread::spawn(|| errno_location() as usize)
        .join()
        .unwrap();
    assert_eq!(unbound_cell, shared_cell);

    let _teb = spawn(errno_recorder_entry).unwrap();
    let start = Instant::now();
    while !UNIT_DONE.load(Ordering::Acquire) {
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(1));
    }

    let unit_cell = UNIT_CELL.load(Ordering::Acquire);
    assert_ne!(unit_cell, 0);
    assert_ne!(unit_cell, shared_cell, "unit must get a private errno cell");
    assert!(UNIT_VALUE_OK.load(Ordering::Acquire));

    // The unit's scribbling never reached the shared cell
    set_errno(0);
    assert_eq!(unsafe { *errno_location() }, 0);

    // Cells are pairwise distinct across units
    let _teb2 = spawn(second_recorder_entry).unwrap();
    while !SECOND_DONE.load(Ordering::Acquire) {
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(1));
    }
    let second_cell = SECOND_CELL.load(Ordering::Acquire);
    assert_ne!(second_cell, 0);
    assert_ne!(second_cell, shared_cell);
    assert_ne!(second_cell, unit_cell);

    while !reap_pending() {
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(1));
    }
}
