//! Guest thread descriptor
//!
//! One `Teb` exists per guest execution unit. It records the unit's stack
//! range, host handle, the pair of wire descriptors used to talk to the
//! supervising coordinator, the guest entry routine, and the per-unit errno
//! cell.
//!
//! Ownership: the descriptor belongs exclusively to its own unit while it
//! runs. At exit it is handed to the teardown coordinator and destroyed
//! exactly once - either by the next exiting unit (deferred free) or by the
//! unit itself on a borrowed temporary stack. The stack range recorded here
//! is never unmapped while any code may still execute on it.
//!
//! Layout: `repr(C)` with the self pointer as the first field, so a
//! segment-base control-block binding can resolve "current descriptor" with
//! a single offset-zero load.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, AtomicPtr, AtomicU8, AtomicUsize, Ordering};

use crate::state::LifecycleState;

/// Guest entry routine reference
pub type GuestEntry = extern "C" fn();

/// Sentinel for an absent/already-closed communication descriptor
pub const FD_NONE: i32 = -1;

/// Guest thread descriptor
#[repr(C)]
pub struct Teb {
    /// Self pointer - must stay the first field (offset 0)
    self_ptr: AtomicPtr<Teb>,

    /// Low address of the stack mapping (header page included)
    stack_base: AtomicPtr<u8>,

    /// Initial stack pointer (high end of the usable range)
    stack_top: AtomicPtr<u8>,

    /// Low watermark of the usable range (just above the guard page)
    stack_low: AtomicPtr<u8>,

    /// Total size of the mapping
    stack_size: AtomicUsize,

    /// Host unit handle: pthread handle or kernel tid, backend-defined
    host_handle: AtomicUsize,

    /// Wire descriptor for requests to the supervising coordinator
    request_fd: AtomicI32,

    /// Wire descriptor for coordinator replies
    reply_fd: AtomicI32,

    /// Lifecycle state (LifecycleState as u8)
    state: AtomicU8,

    /// Exit status captured when teardown begins
    exit_status: AtomicI32,

    /// Per-unit errno cell; address handed out by the errno shim
    errno: UnsafeCell<i32>,

    /// Guest entry routine; set before spawn, read-only afterwards
    entry: Option<GuestEntry>,
}

// The errno cell is only dereferenced by the owning unit (via the shim);
// every other field is atomic.
unsafe impl Send for Teb {}
unsafe impl Sync for Teb {}

impl Teb {
    /// Create a descriptor with no stack attached yet.
    pub fn new(entry: Option<GuestEntry>) -> Self {
        Self {
            self_ptr: AtomicPtr::new(core::ptr::null_mut()),
            stack_base: AtomicPtr::new(core::ptr::null_mut()),
            stack_top: AtomicPtr::new(core::ptr::null_mut()),
            stack_low: AtomicPtr::new(core::ptr::null_mut()),
            stack_size: AtomicUsize::new(0),
            host_handle: AtomicUsize::new(0),
            request_fd: AtomicI32::new(FD_NONE),
            reply_fd: AtomicI32::new(FD_NONE),
            state: AtomicU8::new(LifecycleState::Created as u8),
            exit_status: AtomicI32::new(0),
            errno: UnsafeCell::new(0),
            entry,
        }
    }

    /// Record this descriptor's own address.
    ///
    /// Called by the binder; `ptr` must point to `self`.
    #[inline]
    pub fn record_self(&self, ptr: *mut Teb) {
        self.self_ptr.store(ptr, Ordering::Release);
    }

    #[inline]
    pub fn self_ptr(&self) -> *mut Teb {
        self.self_ptr.load(Ordering::Acquire)
    }

    /// Attach an already-mapped stack range.
    pub fn attach_stack(&self, base: *mut u8, low: *mut u8, top: *mut u8, size: usize) {
        self.stack_base.store(base, Ordering::Release);
        self.stack_low.store(low, Ordering::Release);
        self.stack_top.store(top, Ordering::Release);
        self.stack_size.store(size, Ordering::Release);
    }

    /// Zero the stack fields to flag "this range may no longer be touched".
    ///
    /// Done immediately before the owning unit vacates its primary stack.
    pub fn condemn_stack(&self) {
        self.stack_base.store(core::ptr::null_mut(), Ordering::Release);
        self.stack_low.store(core::ptr::null_mut(), Ordering::Release);
        self.stack_top.store(core::ptr::null_mut(), Ordering::Release);
        self.stack_size.store(0, Ordering::Release);
    }

    /// Point the usable range at a borrowed temporary stack.
    ///
    /// Only valid after `condemn_stack`; the base/size stay zeroed since the
    /// borrowed stack is pool-owned and never freed.
    pub fn borrow_stack(&self, low: *mut u8, top: *mut u8) {
        self.stack_low.store(low, Ordering::Release);
        self.stack_top.store(top, Ordering::Release);
    }

    #[inline]
    pub fn stack_base(&self) -> *mut u8 {
        self.stack_base.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stack_top(&self) -> *mut u8 {
        self.stack_top.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stack_low(&self) -> *mut u8 {
        self.stack_low.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_host_handle(&self, handle: usize) {
        self.host_handle.store(handle, Ordering::Release);
    }

    #[inline]
    pub fn host_handle(&self) -> usize {
        self.host_handle.load(Ordering::Acquire)
    }

    /// Install the coordinator wire descriptors.
    pub fn set_comm_fds(&self, request: i32, reply: i32) {
        self.request_fd.store(request, Ordering::Release);
        self.reply_fd.store(reply, Ordering::Release);
    }

    /// Take the request descriptor, leaving `FD_NONE` behind.
    ///
    /// Atomic take semantics guarantee each descriptor is closed at most
    /// once for any interleaving of graceful exit, abort, and deferred free.
    #[inline]
    pub fn take_request_fd(&self) -> Option<i32> {
        let fd = self.request_fd.swap(FD_NONE, Ordering::AcqRel);
        (fd != FD_NONE).then_some(fd)
    }

    /// Take the reply descriptor, leaving `FD_NONE` behind.
    #[inline]
    pub fn take_reply_fd(&self) -> Option<i32> {
        let fd = self.reply_fd.swap(FD_NONE, Ordering::AcqRel);
        (fd != FD_NONE).then_some(fd)
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    /// Unconditionally record a new lifecycle state.
    #[inline]
    pub fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Record a new state only if the transition is legal.
    ///
    /// Returns false and leaves the state untouched otherwise.
    pub fn advance_state(&self, next: LifecycleState) -> bool {
        let cur = self.state();
        if !cur.can_advance_to(next) {
            return false;
        }
        // Single-writer per unit; a plain store suffices.
        self.set_state(next);
        true
    }

    #[inline]
    pub fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Release);
    }

    #[inline]
    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(Ordering::Acquire)
    }

    /// Address of the per-unit errno cell.
    #[inline]
    pub fn errno_cell(&self) -> *mut i32 {
        self.errno.get()
    }

    #[inline]
    pub fn entry(&self) -> Option<GuestEntry> {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_entry() {}

    #[test]
    fn test_self_ptr_is_first_field() {
        // The segment-base binding reads offset 0; keep it pinned there.
        let teb = Teb::new(None);
        let base = &teb as *const Teb as usize;
        let field = &teb.self_ptr as *const _ as usize;
        assert_eq!(base, field);
    }

    #[test]
    fn test_fd_take_once() {
        let teb = Teb::new(None);
        teb.set_comm_fds(10, 11);

        assert_eq!(teb.take_request_fd(), Some(10));
        assert_eq!(teb.take_request_fd(), None);
        assert_eq!(teb.take_reply_fd(), Some(11));
        assert_eq!(teb.take_reply_fd(), None);
    }

    #[test]
    fn test_fd_default_absent() {
        let teb = Teb::new(Some(noop_entry));
        assert_eq!(teb.take_request_fd(), None);
        assert_eq!(teb.take_reply_fd(), None);
    }

    #[test]
    fn test_advance_state_legal_chain() {
        let teb = Teb::new(Some(noop_entry));
        assert_eq!(teb.state(), LifecycleState::Created);

        assert!(teb.advance_state(LifecycleState::Bound));
        assert!(teb.advance_state(LifecycleState::SignalsReady));
        assert!(teb.advance_state(LifecycleState::HandshakeDone));
        assert!(teb.advance_state(LifecycleState::Running));
        assert!(teb.advance_state(LifecycleState::Exiting));
        assert_eq!(teb.state(), LifecycleState::Exiting);
    }

    #[test]
    fn test_advance_state_rejects_illegal() {
        let teb = Teb::new(Some(noop_entry));
        assert!(!teb.advance_state(LifecycleState::Running));
        assert_eq!(teb.state(), LifecycleState::Created);
    }

    #[test]
    fn test_condemn_and_borrow_stack() {
        let teb = Teb::new(None);
        let mut buf = [0u8; 64];
        let base = buf.as_mut_ptr();
        let top = unsafe { base.add(64) };
        teb.attach_stack(base, base, top, 64);
        assert_eq!(teb.stack_size(), 64);

        teb.condemn_stack();
        assert!(teb.stack_base().is_null());
        assert_eq!(teb.stack_size(), 0);

        teb.borrow_stack(base, top);
        assert_eq!(teb.stack_top(), top);
        assert!(teb.stack_base().is_null());
    }

    #[test]
    fn test_errno_cell_stable() {
        let teb = Teb::new(None);
        assert_eq!(teb.errno_cell(), teb.errno_cell());
    }
}
