//! Control-block binder
//!
//! Makes "the current unit's descriptor" retrievable in O(1) with no
//! syscall. Binding is idempotent and may be repeated by the same unit.
//!
//! Two mechanisms are compiled, selected once at bring-up together with the
//! backend:
//!
//! - `TlsSlot` - the host's per-thread private-data slot. Works for every
//!   host-created (pthread) unit.
//! - `SegmentBase` (linux x86_64 only) - for raw-clone units, which share
//!   the creator's ELF TLS block and must never touch it. Binding points
//!   the unit's GS segment base at the descriptor so guest code can address
//!   it through the segment register; the accessor resolves the descriptor
//!   from the region table instead, since every bound unit executes on a
//!   tracked guest stack whose header page holds its descriptor. A thread
//!   on no tracked stack resolves to null, so unbound host threads degrade
//!   cleanly rather than reading through a zero segment base.
//!
//! Architectures with neither mechanism fail the build (`lib.rs`).

use guestthread_core::teb::Teb;
use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

/// Binding mechanism for "current descriptor"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinderMode {
    /// Host-provided per-thread private-data slot
    TlsSlot = 0,

    /// GS base carries the descriptor for guest code; lookups resolve
    /// through the stack-region table
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    SegmentBase = 1,
}

static BINDER_MODE: AtomicU8 = AtomicU8::new(BinderMode::TlsSlot as u8);

/// Select the process-wide binding mechanism.
///
/// Called once during backend resolution, before any unit is created.
pub(crate) fn set_mode(mode: BinderMode) {
    BINDER_MODE.store(mode as u8, Ordering::Release);
}

/// The active binding mechanism.
pub fn mode() -> BinderMode {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    if BINDER_MODE.load(Ordering::Acquire) == BinderMode::SegmentBase as u8 {
        return BinderMode::SegmentBase;
    }
    BinderMode::TlsSlot
}

thread_local! {
    /// Current descriptor for this host thread (TlsSlot mechanism)
    static CURRENT_TEB: Cell<*mut Teb> = const { Cell::new(std::ptr::null_mut()) };
}

/// Bind `teb` as the calling unit's descriptor.
///
/// After this returns, `current_teb_ptr()` on the same unit yields exactly
/// `teb`. Safe to call again from the same unit with the same descriptor.
///
/// # Safety
///
/// `teb` must point to a live descriptor owned by the calling unit. In
/// `SegmentBase` mode the caller must be executing on the descriptor's own
/// tracked stack region.
pub unsafe fn bind(teb: *mut Teb) {
    (*teb).record_self(teb);
    match mode() {
        BinderMode::TlsSlot => CURRENT_TEB.with(|cell| cell.set(teb)),
        // A clone unit's thread_local storage is really its creator's;
        // only the segment register may be written here.
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        BinderMode::SegmentBase => segment::set_gs_base(teb),
    }
}

/// Raw pointer to the calling unit's descriptor; null before binding.
#[inline]
pub fn current_teb_ptr() -> *mut Teb {
    match mode() {
        BinderMode::TlsSlot => CURRENT_TEB.with(|cell| cell.get()),
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        BinderMode::SegmentBase => segment::current_from_stack(),
    }
}

/// The calling unit's descriptor, if bound.
#[inline]
pub fn current_teb() -> Option<NonNull<Teb>> {
    NonNull::new(current_teb_ptr())
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod segment {
    use crate::memory;
    use guestthread_core::teb::Teb;

    const ARCH_SET_GS: libc::c_long = 0x1001;

    /// Point the GS base at the descriptor.
    pub(super) unsafe fn set_gs_base(teb: *mut Teb) {
        // arch_prctl cannot fail for a canonical user address.
        libc::syscall(libc::SYS_arch_prctl, ARCH_SET_GS, teb as libc::c_long);
    }

    /// Resolve the calling unit's descriptor from its stack address.
    ///
    /// A bound unit always executes on a tracked guest stack region, and
    /// the descriptor sits in that region's header page. Threads on
    /// untracked stacks (host-created, or a unit already switched onto a
    /// borrowed teardown stack) resolve to null.
    #[inline]
    pub(super) fn current_from_stack() -> *mut Teb {
        let marker = 0u8;
        let sp = &marker as *const u8 as *mut u8;
        match memory::region_bounds(sp) {
            Some((base, _size)) => base as *mut Teb,
            None => std::ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_is_null() {
        std::thread::spawn(|| {
            assert!(current_teb().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_bind_returns_own_descriptor() {
        let mut teb = Box::new(Teb::new(None));
        let ptr: *mut Teb = &mut *teb;
        unsafe { bind(ptr) };
        assert_eq!(current_teb_ptr(), ptr);
        // Rebinding the same descriptor is idempotent
        unsafe { bind(ptr) };
        assert_eq!(current_teb_ptr(), ptr);
    }

    #[test]
    fn test_bindings_are_per_thread() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let mut teb = Box::new(Teb::new(None));
                    let ptr: *mut Teb = &mut *teb;
                    unsafe { bind(ptr) };
                    // Every thread must see exactly its own descriptor
                    for _ in 0..100 {
                        assert_eq!(current_teb_ptr(), ptr);
                        std::thread::yield_now();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn test_stack_resolution_is_null_off_any_region() {
        // A host thread's stack is never in the region table; the segment
        // mechanism must resolve null for it, not fault.
        std::thread::spawn(|| {
            assert!(segment::current_from_stack().is_null());
        })
        .join()
        .unwrap();
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn test_stack_resolution_finds_region_descriptor() {
        use guestthread_core::constants::TEB_HEADER_SIZE;

        let _guard = crate::memory::TEST_REGION_LOCK.lock().unwrap();
        let teb = crate::memory::map_guest_region(64 * 1024, None).unwrap();
        let t = unsafe { teb.as_ref() };
        // Any address in the usable range resolves to the header descriptor
        let inside = unsafe { t.stack_top().sub(256) };
        let (base, _) = crate::memory::region_bounds(inside).unwrap();
        assert_eq!(base as *mut Teb, teb.as_ptr());
        assert_eq!(unsafe { (*(base as *mut Teb)).self_ptr() }, teb.as_ptr());
        assert!(TEB_HEADER_SIZE >= std::mem::size_of::<Teb>());
        unsafe { crate::memory::unmap_guest_region(t.stack_base()).unwrap() };
    }
}
