//! Unix stack mapping using mmap

use guestthread_core::constants::{GUARD_SIZE, TEB_HEADER_SIZE};
use guestthread_core::error::{MemoryError, ThreadResult};

/// Map one guest region: header and stack read/write, guard page between
/// them left PROT_NONE so overflow past the stack bottom faults instead of
/// corrupting the descriptor.
pub(super) fn map_region(total_size: usize) -> ThreadResult<*mut u8> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            total_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed.into());
    }
    let base = base as *mut u8;

    let ret = unsafe {
        libc::mprotect(
            base.add(TEB_HEADER_SIZE) as *mut libc::c_void,
            GUARD_SIZE,
            libc::PROT_NONE,
        )
    };
    if ret != 0 {
        // SAFETY: the range was just mapped and nothing else references it.
        unsafe {
            libc::munmap(base as *mut libc::c_void, total_size);
        }
        return Err(MemoryError::ProtectionFailed.into());
    }

    Ok(base)
}

/// Unmap a region previously returned by `map_region`.
///
/// # Safety
///
/// No live references into the range, and no thread may be executing on it.
pub(super) unsafe fn unmap_raw(base: *mut u8, size: usize) -> ThreadResult<()> {
    if libc::munmap(base as *mut libc::c_void, size) != 0 {
        return Err(MemoryError::AllocationFailed.into());
    }
    Ok(())
}
