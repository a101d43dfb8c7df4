//! # guestthread - guest thread lifecycle runtime
//!
//! Host-thread plumbing for a binary-compatibility runtime: each guest
//! execution unit gets a descriptor embedded in its own stack mapping, a
//! host backend to run on, and a teardown path that reclaims the stack it
//! exited from.
//!
//! ## Quick Start
//!
//! ```ignore
//! use guestthread::{init_from_env, spawn, exit_thread};
//!
//! extern "C" fn guest_entry() {
//!     println!("hello from a guest unit");
//!     // Falling off the end is an orderly exit_thread(0)
//! }
//!
//! fn main() {
//!     init_from_env().unwrap();
//!     let teb = spawn(guest_entry).unwrap();
//!     // ... the unit runs, exits, and its stack is reclaimed
//!     let _ = teb;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Embedding Runtime                      │
//! │            spawn(), hooks, coordinator handshake            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Lifecycle Coordination                    │
//! │      trampoline state machine, binder, errno shim           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼                                       ▼
//!    ┌───────────┐                          ┌───────────┐
//!    │  pthread  │                          │   clone   │
//!    │  backend  │                          │  backend  │
//!    └───────────┘                          └───────────┘
//!          │                                       │
//!          └───────────────────┬───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                   Stack Regions                         │
//!    │   descriptor header | guard page | stack, per unit      │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use guestthread_core::{
    constants, GuestEntry, LifecycleState, MemoryError, Teb, ThreadError, ThreadResult, FD_NONE,
};

// Re-export kprint macros for debug logging
pub use guestthread_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, LogLevel,
};
pub use guestthread_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use guestthread_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime surface
pub use guestthread_runtime::memory::{map_guest_region, region_bounds, unmap_guest_region};
pub use guestthread_runtime::{
    abort_thread, backend, create, current_teb, current_teb_ptr, errno, errno_location,
    exit_thread, host_tid, init, init_errno_shim, init_from_env, install_hooks,
    pending_descriptor, reap_pending, runtime_config, set_errno, BackendKind, BinderMode,
    HostBackend, RuntimeConfig, StartupHooks,
};

use std::ptr::NonNull;

/// Map a stack region, install `entry`, and launch a unit on it.
///
/// Uses the configured per-unit stack size. The returned pointer is a raw
/// observation handle: the descriptor lives in the unit's own stack mapping
/// and is reclaimed by the teardown protocol, so it must not be
/// dereferenced once the unit may have exited.
pub fn spawn(entry: GuestEntry) -> ThreadResult<NonNull<Teb>> {
    spawn_with_stack(entry, runtime_config().stack_size)
}

/// `spawn` with an explicit usable stack size.
pub fn spawn_with_stack(entry: GuestEntry, stack_size: usize) -> ThreadResult<NonNull<Teb>> {
    let teb = map_guest_region(stack_size, Some(entry))?;
    launch(teb)
}

/// Spawn a unit that owns a pair of coordinator wire fds.
///
/// Ownership of both fds transfers to the unit on success; the teardown
/// protocol closes them exactly once. On failure the caller keeps them.
pub fn spawn_with_fds(
    entry: GuestEntry,
    request_fd: i32,
    reply_fd: i32,
) -> ThreadResult<NonNull<Teb>> {
    let teb = map_guest_region(runtime_config().stack_size, Some(entry))?;
    // SAFETY: freshly mapped descriptor, not yet visible to any unit.
    unsafe { teb.as_ref().set_comm_fds(request_fd, reply_fd) };
    launch(teb)
}

fn launch(teb: NonNull<Teb>) -> ThreadResult<NonNull<Teb>> {
    // SAFETY: the region stays mapped; ownership passes to the unit once
    // spawn succeeds.
    if let Err(e) = unsafe { create(teb) } {
        // SAFETY: no unit was launched; we still own the region.
        unsafe {
            let base = teb.as_ref().stack_base();
            let _ = unmap_guest_region(base);
        }
        return Err(e);
    }
    Ok(teb)
}
