//! Guest stack memory management
//!
//! Each guest unit's region is one mapping laid out as:
//!
//! ```text
//! base                         base+HDR        base+HDR+GUARD          top
//!  | descriptor header (Teb) | guard PROT_NONE | usable stack, grows down |
//! ```
//!
//! The descriptor lives inside the mapping (like the metadata page of a
//! scheduler slot), so releasing a unit is a single unmap with no heap
//! traffic - teardown code may run on threads that must not touch the
//! allocator.
//!
//! A fixed-size region table records every live mapping. `region_bounds`
//! answers the teardown coordinator's "what are the real allocation bounds
//! of this stack" query by scanning that table: allocation-free and
//! syscall-free, callable from a unit whose own stack is about to vanish.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}

use guestthread_core::constants::{GUARD_SIZE, MAX_STACK_REGIONS, TEB_HEADER_SIZE};
use guestthread_core::error::{MemoryError, ThreadResult};
use guestthread_core::teb::{GuestEntry, Teb};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One tracked mapping; `base == 0` means the entry is free.
struct RegionEntry {
    base: AtomicUsize,
    size: AtomicUsize,
}

/// Fixed-capacity table of live stack regions
struct RegionTable {
    entries: [RegionEntry; MAX_STACK_REGIONS],
}

impl RegionTable {
    const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const FREE: RegionEntry = RegionEntry {
            base: AtomicUsize::new(0),
            size: AtomicUsize::new(0),
        };
        Self {
            entries: [FREE; MAX_STACK_REGIONS],
        }
    }

    fn register(&self, base: usize, size: usize) -> Result<(), MemoryError> {
        for entry in &self.entries {
            // Publish size before base so a concurrent lookup never sees a
            // claimed entry with a stale size.
            if entry
                .base
                .compare_exchange(0, usize::MAX, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                entry.size.store(size, Ordering::Release);
                entry.base.store(base, Ordering::Release);
                return Ok(());
            }
        }
        Err(MemoryError::RegionTableFull)
    }

    fn unregister(&self, base: usize) -> Result<usize, MemoryError> {
        for entry in &self.entries {
            if entry.base.load(Ordering::Acquire) == base {
                let size = entry.size.load(Ordering::Acquire);
                entry.base.store(0, Ordering::Release);
                entry.size.store(0, Ordering::Release);
                return Ok(size);
            }
        }
        Err(MemoryError::UnknownRegion)
    }

    fn lookup(&self, addr: usize) -> Option<(usize, usize)> {
        for entry in &self.entries {
            let base = entry.base.load(Ordering::Acquire);
            if base == 0 || base == usize::MAX {
                continue;
            }
            let size = entry.size.load(Ordering::Acquire);
            if addr >= base && addr < base + size {
                return Some((base, size));
            }
        }
        None
    }
}

static REGIONS: RegionTable = RegionTable::new();

/// Serializes tests that contend on the process-global region table.
#[cfg(test)]
pub(crate) static TEST_REGION_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Total mapping size for a requested usable stack size.
#[inline]
pub const fn region_size(stack_size: usize) -> usize {
    TEB_HEADER_SIZE + GUARD_SIZE + stack_size
}

/// Map a guest stack region and construct its descriptor in the header.
///
/// Returns a pointer into the mapping; the caller owns the region until it
/// hands the descriptor to `create`.
pub fn map_guest_region(stack_size: usize, entry: Option<GuestEntry>) -> ThreadResult<NonNull<Teb>> {
    let total = region_size(stack_size);
    let base = map_region(total)?;
    if let Err(e) = REGIONS.register(base as usize, total) {
        // SAFETY: we just mapped this exact range.
        let _ = unsafe { unmap_raw(base, total) };
        return Err(e.into());
    }

    let teb_ptr = base as *mut Teb;
    // SAFETY: the header page is mapped read/write and large enough for Teb.
    unsafe {
        teb_ptr.write(Teb::new(entry));
        let low = base.add(TEB_HEADER_SIZE + GUARD_SIZE);
        let top = base.add(total);
        (*teb_ptr).attach_stack(base, low, top, total);
        (*teb_ptr).record_self(teb_ptr);
        Ok(NonNull::new_unchecked(teb_ptr))
    }
}

/// Release a guest stack region, descriptor included.
///
/// # Safety
///
/// No code may still execute on the region's stack, and nothing may touch
/// the descriptor afterwards.
pub unsafe fn unmap_guest_region(base: *mut u8) -> ThreadResult<()> {
    let size = REGIONS.unregister(base as usize)?;
    unmap_raw(base, size)
}

/// Real allocation bounds of the region containing `addr`.
///
/// This is the virtual-memory query call of the teardown protocol; it
/// allocates nothing and makes no syscall.
pub fn region_bounds(addr: *mut u8) -> Option<(*mut u8, usize)> {
    REGIONS
        .lookup(addr as usize)
        .map(|(base, size)| (base as *mut u8, size))
}
