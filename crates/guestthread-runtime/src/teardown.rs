//! Teardown coordinator
//!
//! A unit cannot free the stack it is executing on, so every exit path has
//! to move the release somewhere else. Which "somewhere" depends on one
//! backend capability:
//!
//! - Join-capable (pthread): the exiter parks its descriptor in a single
//!   process-wide slot and terminates. The *next* exiter swaps the slot,
//!   joins the parked unit, and unmaps its region - the join proves no code
//!   can still run on that stack. The last exiter of a process stays parked
//!   until `reap_pending` or process exit.
//! - Not join-capable (clone): the exiter borrows a temporary stack,
//!   switches onto it, unmaps its own region from there, and makes the raw
//!   host exit call. Nothing survives the unit except the pool-owned
//!   temporary stack.
//!
//! `exit_thread` is the orderly path (guest entry returned or asked to
//! leave); `abort_thread` skips the `Exiting` state and tears down from
//! whatever state the unit is in. The abrupt path may be entered from a
//! signal handler, so it never joins, never switches stacks, and never
//! unmaps: it closes the coordinator fds and makes the host exit call,
//! leaving the region mapped.

use crate::arch;
use crate::backend::backend;
use crate::{binder, memory, signal, temp_stack};
use guestthread_core::state::LifecycleState;
use guestthread_core::{ktrace, kwarn};
use guestthread_core::teb::Teb;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Descriptor of the most recently finished join-capable unit, parked until
/// the next exiter reclaims it.
static PENDING_FREE: AtomicPtr<Teb> = AtomicPtr::new(ptr::null_mut());

/// Everything the final frames need, copied off the dying region before the
/// stack switch.
#[repr(C)]
struct CleanupInfo {
    stack_base: *mut u8,
    status: i32,
}

/// Orderly exit of the calling unit. Never returns.
///
/// Records the status, walks the descriptor through `Exiting` and
/// `CleaningUp`, closes the coordinator fds, and releases the stack by the
/// backend-appropriate strategy.
pub fn exit_thread(status: i32) -> ! {
    terminate(status, true)
}

/// Abrupt teardown of the calling unit. Never returns.
///
/// Legal from any live state - a unit that failed bring-up or hit an
/// unrecoverable fault mid-run jumps straight to `CleaningUp`. Because
/// this can run from a signal handler, no reclamation happens: the fds
/// are closed, the host exit call is made, and the stack region stays
/// mapped. The descriptor is neither parked nor freed.
pub fn abort_thread(status: i32) -> ! {
    terminate(status, false)
}

fn terminate(status: i32, graceful: bool) -> ! {
    let teb = binder::current_teb_ptr();
    if teb.is_null() {
        // Not a guest unit; nothing to reclaim.
        backend().exit_unit(status);
    }
    // SAFETY: a non-null binding is the calling unit's own live descriptor.
    let t = unsafe { &*teb };
    t.set_exit_status(status);
    if graceful {
        t.advance_state(LifecycleState::Exiting);
    }
    t.advance_state(LifecycleState::CleaningUp);
    close_comm_fds(t);
    signal::reset_thread_signals();

    if !graceful {
        // Possibly inside a signal handler: no join, no stack switch, no
        // unmap. The region leaks until process exit.
        backend().exit_unit(status);
    }

    if backend().join_capable() {
        deferred_free(teb, status)
    } else {
        self_free(t, status)
    }
}

/// Strategy A: park this descriptor, reclaim the previous one.
fn deferred_free(teb: *mut Teb, status: i32) -> ! {
    let prev = PENDING_FREE.swap(teb, Ordering::AcqRel);
    if !prev.is_null() {
        // SAFETY: the swap transferred exclusive ownership of `prev`.
        unsafe { release_joined(prev) };
    }
    backend().exit_unit(status)
}

/// Join a parked unit and release everything it owned.
///
/// # Safety
///
/// Caller must hold exclusive ownership of `teb`, obtained by swapping it
/// out of the pending slot.
unsafe fn release_joined(teb: *mut Teb) {
    let t = &*teb;
    ktrace!("freeing parked descriptor {:p}", teb);
    backend().wait_unit(t.host_handle());
    // Take-once semantics make this a no-op when the unit already closed
    // its own fds on the way out.
    close_comm_fds(t);
    t.set_state(LifecycleState::Terminated);

    let base = t.stack_base();
    if base.is_null() {
        return;
    }
    // The descriptor lives in the region header; nothing may touch `t`
    // past this call.
    if let Err(e) = memory::unmap_guest_region(base) {
        kwarn!("leaking stack region at {:p}: {}", base, e);
    }
}

/// Strategy B: switch to a borrowed temporary stack and free our own
/// region from there.
fn self_free(t: &Teb, status: i32) -> ! {
    // Resolve the real allocation bounds from the region table, not the
    // descriptor copy.
    let Some((base, _size)) = memory::region_bounds(t.stack_base()) else {
        // No tracked region (descriptor built by hand); just leave.
        backend().exit_unit(status);
    };

    let claimed = temp_stack::claim();
    // Stash the cleanup record at the low end of the borrowed slot; the
    // final frames grow down from the top and never reach it.
    let info = claimed.base as *mut CleanupInfo;
    // SAFETY: the slot is ours until the host exit call, and CleanupInfo
    // fits well below the deepest final frame.
    unsafe {
        info.write(CleanupInfo {
            stack_base: base,
            status,
        });
    }

    t.set_state(LifecycleState::Terminated);
    t.condemn_stack();
    t.borrow_stack(
        // SAFETY: in-bounds offset within the claimed slot.
        unsafe { claimed.base.add(std::mem::size_of::<CleanupInfo>()) },
        claimed.top,
    );

    // SAFETY: `claimed.top` is the high end of a writable slot and
    // `final_release` never returns. After this line nothing executes on
    // the primary stack.
    unsafe { arch::switch_stack(final_release, claimed.base, claimed.top) }
}

/// Final frames of a self-freeing unit. Runs on the borrowed stack.
unsafe extern "C" fn final_release(arg: *mut u8) -> ! {
    let info = (arg as *mut CleanupInfo).read();
    // The primary region is truly idle now; the descriptor vanishes with it.
    let _ = memory::unmap_guest_region(info.stack_base);
    backend().exit_unit(info.status)
}

fn close_comm_fds(t: &Teb) {
    if let Some(fd) = t.take_request_fd() {
        // SAFETY: take-once semantics guarantee this fd is closed nowhere else.
        unsafe { libc::close(fd) };
    }
    if let Some(fd) = t.take_reply_fd() {
        unsafe { libc::close(fd) };
    }
}

/// Descriptor currently parked in the deferred-free slot, if any.
///
/// Observability only; ownership stays with the slot.
pub fn pending_descriptor() -> *mut Teb {
    PENDING_FREE.load(Ordering::Acquire)
}

/// Drain the deferred-free slot from a managing thread.
///
/// The slot deliberately holds the last exiter until the next exit; a
/// process owner may call this at shutdown (or between test waves) to
/// reclaim it. Returns whether a unit was reclaimed.
pub fn reap_pending() -> bool {
    let prev = PENDING_FREE.swap(ptr::null_mut(), Ordering::AcqRel);
    if prev.is_null() {
        return false;
    }
    // SAFETY: the swap transferred exclusive ownership of `prev`.
    unsafe { release_joined(prev) };
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_slot_starts_empty() {
        assert!(pending_descriptor().is_null());
        assert!(!reap_pending());
    }

    #[test]
    fn test_comm_fds_closed_once() {
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

        let teb = Teb::new(None);
        teb.set_comm_fds(fds[0], fds[1]);
        close_comm_fds(&teb);
        // Second pass finds nothing left to close
        close_comm_fds(&teb);

        assert_eq!(unsafe { libc::fcntl(fds[0], libc::F_GETFD) }, -1);
        assert_eq!(unsafe { libc::fcntl(fds[1], libc::F_GETFD) }, -1);
    }

    #[test]
    fn test_cleanup_record_fits_under_final_frames() {
        use guestthread_core::constants::TEMP_STACK_SIZE;
        assert!(std::mem::size_of::<CleanupInfo>() <= TEMP_STACK_SIZE / 8);
    }
}
