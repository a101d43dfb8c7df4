//! pthread host backend
//!
//! Units are host threads created with an explicit stack
//! (`pthread_attr_setstack`), so the runtime keeps full ownership of the
//! stack mapping. Join-capable: a finished unit's region is reclaimed after
//! `pthread_join` proves nothing can still execute on it.

use super::HostBackend;
use crate::trampoline;
use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::teb::Teb;

pub(super) struct PthreadBackend;

extern "C" fn unit_main(arg: *mut libc::c_void) -> *mut libc::c_void {
    // SAFETY: `arg` is the descriptor passed to pthread_create by spawn.
    unsafe { trampoline::start_thread(arg as *mut Teb) }
}

impl HostBackend for PthreadBackend {
    fn name(&self) -> &'static str {
        "pthread"
    }

    fn join_capable(&self) -> bool {
        true
    }

    unsafe fn spawn(&self, teb: *mut Teb) -> ThreadResult<()> {
        let t = &*teb;
        let low = t.stack_low();
        let len = t.stack_top() as usize - low as usize;

        let mut attr: libc::pthread_attr_t = std::mem::zeroed();
        let ret = libc::pthread_attr_init(&mut attr);
        if ret != 0 {
            return Err(ThreadError::Os(ret));
        }
        let ret = libc::pthread_attr_setstack(&mut attr, low as *mut libc::c_void, len);
        if ret != 0 {
            libc::pthread_attr_destroy(&mut attr);
            return Err(ThreadError::Os(ret));
        }

        let mut handle: libc::pthread_t = std::mem::zeroed();
        let ret = libc::pthread_create(&mut handle, &attr, unit_main, teb as *mut libc::c_void);
        libc::pthread_attr_destroy(&mut attr);
        if ret != 0 {
            return Err(ThreadError::Os(ret));
        }
        Ok(())
    }

    fn bind_host_identity(&self, teb: &Teb) {
        // pthread_self on the unit's own thread; the handle is what a later
        // exiter passes to wait_unit.
        teb.set_host_handle(unsafe { libc::pthread_self() } as usize);
    }

    fn wait_unit(&self, handle: usize) {
        // Exactly one caller ever joins a given handle (the exiter that
        // swapped the descriptor out of the pending slot).
        unsafe {
            libc::pthread_join(handle as libc::pthread_t, std::ptr::null_mut());
        }
    }

    fn exit_unit(&self, status: i32) -> ! {
        unsafe { libc::pthread_exit(status as isize as *mut libc::c_void) }
    }
}
