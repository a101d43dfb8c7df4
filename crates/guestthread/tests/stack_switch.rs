//! The stack-switch primitive is one-way; prove it in a forked child so the
//! non-returning path cannot take the test harness with it.

#![cfg(unix)]

use guestthread_runtime::arch::switch_stack;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use std::sync::atomic::{AtomicUsize, Ordering};

const CHILD_STACK_SIZE: usize = 64 * 1024;

static TARGET_BASE: AtomicUsize = AtomicUsize::new(0);
static TARGET_TOP: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn on_new_stack(arg: *mut u8) -> ! {
    let marker = 0u8;
    let sp = &marker as *const u8 as usize;
    let base = TARGET_BASE.load(Ordering::Relaxed);
    let top = TARGET_TOP.load(Ordering::Relaxed);

    let on_target = sp > base && sp <= top;
    let arg_ok = arg as usize == base;
    libc::_exit(if on_target && arg_ok { 42 } else { 1 });
}

#[test]
fn test_switch_moves_execution_onto_target_stack() {
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    CHILD_STACK_SIZE,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                unsafe { libc::_exit(2) };
            }
            let base = base as *mut u8;
            let top = unsafe { base.add(CHILD_STACK_SIZE) };
            TARGET_BASE.store(base as usize, Ordering::Relaxed);
            TARGET_TOP.store(top as usize, Ordering::Relaxed);

            unsafe { switch_stack(on_new_stack, base, top) }
        }
        ForkResult::Parent { child } => {
            let status = waitpid(child, None).unwrap();
            assert_eq!(status, WaitStatus::Exited(child, 42));
        }
    }
}
