//! Errno virtualization shim
//!
//! The host C library keeps one errno cell per *host* thread; guest units
//! need one per *unit*, stored in the descriptor so it exists even for raw
//! clone units that have no host TLS. The shim is a single function-pointer
//! indirection:
//!
//! - Before bring-up, `errno_location` resolves to one process-wide shared
//!   cell - every caller sees the same address, with the accuracy loss
//!   that implies.
//! - `init_errno_shim` switches the pointer (exactly once, never back) to
//!   the per-unit resolver, which returns the descriptor's cell for bound
//!   units and the shared cell for everything else.
//!
//! Optionally (`GTH_ERRNO_RETROFIT`, linux x86_64), already-linked host
//! code that calls `__errno_location` directly is redirected too, by
//! planting a relative jump at the resolved symbol. That patch serves
//! callers outside this crate; code in here always goes through
//! `errno_location`.

use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::kwarn;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::binder;

/// Active resolver as a fn pointer; 0 means "not yet switched" and stands
/// for the shared resolver.
static ERRNO_LOCATION: AtomicUsize = AtomicUsize::new(0);

/// Process-wide fallback errno cell
struct SharedCell(UnsafeCell<i32>);

// One cell handed to every pre-init or unbound caller; concurrent writes
// race and that coarseness is the documented pre-init behavior.
unsafe impl Sync for SharedCell {}

static SHARED_ERRNO: SharedCell = SharedCell(UnsafeCell::new(0));

fn shared_errno_location() -> *mut i32 {
    SHARED_ERRNO.0.get()
}

fn unit_errno_location() -> *mut i32 {
    match binder::current_teb() {
        // SAFETY: a bound descriptor outlives its own unit's calls.
        Some(teb) => unsafe { teb.as_ref().errno_cell() },
        None => shared_errno_location(),
    }
}

/// Address of the calling unit's errno cell.
#[inline]
pub fn errno_location() -> *mut i32 {
    match ERRNO_LOCATION.load(Ordering::Acquire) {
        0 => shared_errno_location(),
        f => {
            // SAFETY: the slot only ever holds `unit_errno_location`.
            let f: fn() -> *mut i32 = unsafe { std::mem::transmute(f) };
            f()
        }
    }
}

/// Errno value of the calling unit.
#[inline]
pub fn errno() -> i32 {
    // SAFETY: the resolved cell belongs to the calling unit.
    unsafe { *errno_location() }
}

/// Set the calling unit's errno.
#[inline]
pub fn set_errno(value: i32) {
    // SAFETY: the resolved cell belongs to the calling unit.
    unsafe { *errno_location() = value };
}

/// Switch errno resolution to per-unit cells.
///
/// Idempotent, and irreversible - once any unit may have handed out its
/// cell address, falling back would leave dangling cells in use. When the
/// configuration asks for it, also retrofits the host resolver in place;
/// the retrofit is best-effort and its absence is logged, not fatal.
pub fn init_errno_shim() -> ThreadResult<()> {
    let _ = ERRNO_LOCATION.compare_exchange(
        0,
        unit_errno_location as usize,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    if crate::runtime_config().errno_retrofit {
        if let Err(e) = retrofit_host_resolver() {
            kwarn!("errno retrofit unavailable: {}", e);
        }
    }
    Ok(())
}

/// `__errno_location` replacement planted into the host library.
extern "C" fn errno_location_shim() -> *mut i32 {
    errno_location()
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_arch = "x86_64"))] {
        use guestthread_core::constants::PAGE_SIZE;

        /// jmp rel32
        const JMP_OPCODE: u8 = 0xe9;
        const JMP_LEN: usize = 5;

        /// Redirect the host's `__errno_location` to the shim by writing a
        /// relative jump over its first instruction.
        fn retrofit_host_resolver() -> ThreadResult<()> {
            let target = unsafe {
                libc::dlsym(
                    libc::RTLD_NEXT,
                    c"__errno_location".as_ptr(),
                )
            };
            if target.is_null() {
                return Err(ThreadError::UnsupportedBackend(
                    "host __errno_location not resolvable",
                ));
            }
            let target = target as *mut u8;

            let dest = errno_location_shim as usize;
            let next = target as usize + JMP_LEN;
            let rel = dest.wrapping_sub(next) as isize;
            if rel > i32::MAX as isize || rel < i32::MIN as isize {
                return Err(ThreadError::UnsupportedBackend(
                    "shim out of rel32 range of host resolver",
                ));
            }

            // SAFETY: `target` is the entry point of a mapped host function
            // and the patch is 5 bytes long.
            unsafe { patch_jump(target, rel as i32) }
        }

        /// Write `jmp rel32` at `target`, toggling page protections around
        /// the store.
        ///
        /// # Safety
        ///
        /// `target` must point at mapped executable code with at least
        /// `JMP_LEN` bytes that no thread is concurrently executing.
        unsafe fn patch_jump(target: *mut u8, rel: i32) -> ThreadResult<()> {
            let start = (target as usize) & !(PAGE_SIZE - 1);
            // The 5 patched bytes may straddle a page boundary.
            let end = (target as usize + JMP_LEN + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
            let len = end - start;

            let rwx = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
            if libc::mprotect(start as *mut libc::c_void, len, rwx) != 0 {
                return Err(ThreadError::last_os());
            }

            target.write(JMP_OPCODE);
            (target.add(1) as *mut i32).write_unaligned(rel);

            let rx = libc::PROT_READ | libc::PROT_EXEC;
            if libc::mprotect(start as *mut libc::c_void, len, rx) != 0 {
                return Err(ThreadError::last_os());
            }
            Ok(())
        }
    } else {
        fn retrofit_host_resolver() -> ThreadResult<()> {
            Err(ThreadError::UnsupportedBackend(
                "errno retrofit requires linux x86_64",
            ))
        }
    }
}
