//! Raw clone host backend (linux x86_64)
//!
//! Units are kernel threads sharing the address space, file table, and
//! signal handlers with their creator. The new thread gets no host TLS
//! block of its own, which is the whole reason the segment-base binder
//! mechanism and the in-mapping descriptor exist: nothing on this path may
//! touch ELF TLS or the allocator.
//!
//! Not join-capable. A dead clone thread cannot be waited for through the
//! host threading library, so exiting units release their own stacks from a
//! borrowed temporary one.

use super::HostBackend;
use crate::trampoline;
use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::teb::Teb;

const CLONE_FLAGS: libc::c_int = libc::CLONE_VM
    | libc::CLONE_FS
    | libc::CLONE_FILES
    | libc::CLONE_SIGHAND
    | libc::CLONE_THREAD
    | libc::CLONE_SYSVSEM;

pub(super) struct CloneBackend;

extern "C" fn unit_main(arg: *mut libc::c_void) -> libc::c_int {
    // SAFETY: `arg` is the descriptor handed to clone by spawn.
    unsafe { trampoline::start_thread(arg as *mut Teb) }
}

impl HostBackend for CloneBackend {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn join_capable(&self) -> bool {
        false
    }

    unsafe fn spawn(&self, teb: *mut Teb) -> ThreadResult<()> {
        let t = &*teb;
        // clone(2) takes the initial stack pointer, not the base.
        let ret = libc::clone(
            unit_main,
            t.stack_top() as *mut libc::c_void,
            CLONE_FLAGS,
            teb as *mut libc::c_void,
        );
        if ret == -1 {
            return Err(ThreadError::last_os());
        }
        Ok(())
    }

    fn bind_host_identity(&self, teb: &Teb) {
        teb.set_host_handle(crate::host_tid() as usize);
    }

    fn wait_unit(&self, _handle: usize) {
        // Clone threads cannot be joined; teardown never defers to a peer.
    }

    fn exit_unit(&self, status: i32) -> ! {
        // Direct exit(2): the host's thread-exit path would touch TLS this
        // thread does not have.
        unsafe {
            libc::syscall(libc::SYS_exit, status as libc::c_long);
            std::hint::unreachable_unchecked()
        }
    }
}
