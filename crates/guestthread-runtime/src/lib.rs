//! # guestthread-runtime
//!
//! Platform-specific runtime for the guest thread lifecycle subsystem.
//!
//! This crate provides:
//! - Stack memory management and region bookkeeping (mmap)
//! - The control-block binder ("current descriptor" in O(1), no syscall)
//! - Host backends (pthread with explicit stack, raw clone)
//! - The startup trampoline state machine
//! - Teardown coordination (deferred free / temp-stack self-free)
//! - The errno virtualization shim
//! - Temporary teardown stacks and the stack-switch primitive

#![allow(dead_code)]

pub mod arch;
pub mod backend;
pub mod binder;
pub mod config;
pub mod errno;
pub mod hooks;
pub mod memory;
pub mod signal;
pub mod teardown;
pub mod temp_stack;
pub mod trampoline;

// Re-exports
pub use backend::{backend, BackendKind, HostBackend};
pub use binder::{current_teb, current_teb_ptr, BinderMode};
pub use config::RuntimeConfig;
pub use errno::{errno, errno_location, init_errno_shim, set_errno};
pub use hooks::{install_hooks, StartupHooks};
pub use teardown::{abort_thread, exit_thread, pending_descriptor, reap_pending};

use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::teb::Teb;
use std::ptr::NonNull;
use std::sync::OnceLock;

// Architecture detection: binding and stack switching are per-architecture
// capabilities. An unsupported architecture is a hard build failure, never
// a degraded fallback - dereferencing an unbound "current descriptor" is
// undefined behavior.
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture: no stack-switch or binder implementation");
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Perform process bring-up with an explicit configuration.
///
/// Resolves the host backend strategy once; every unit created afterwards
/// uses it. Fails if the requested backend is not available on this target
/// or if bring-up already happened with a different configuration.
pub fn init(config: RuntimeConfig) -> ThreadResult<()> {
    // Resolve log settings now; first-use resolution reads the environment,
    // which clone units must never do.
    guestthread_core::kprint::init();
    backend::select(config.backend)?;
    if CONFIG.set(config).is_err() {
        return Err(ThreadError::AlreadyInitialized);
    }
    Ok(())
}

/// Bring-up from `GTH_*` environment variables.
pub fn init_from_env() -> ThreadResult<()> {
    init(RuntimeConfig::from_env())
}

/// The resolved process configuration (environment defaults if `init` was
/// never called explicitly).
pub fn runtime_config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}

/// Spawn a new guest execution unit for an already-prepared descriptor.
///
/// The descriptor's stack range must be mapped and its entry routine set;
/// the caller keeps ownership of both until this returns `Ok`. On failure
/// no host unit is left running and the caller still owns the descriptor
/// and its stack.
///
/// # Safety
///
/// `teb` must point to a descriptor whose stack range stays mapped for the
/// lifetime of the unit and is not used by anything else.
pub unsafe fn create(teb: NonNull<Teb>) -> ThreadResult<()> {
    let t = teb.as_ref();
    if t.entry().is_none() || t.stack_top().is_null() || t.stack_low().is_null() {
        return Err(ThreadError::InvalidDescriptor);
    }
    backend().spawn(teb.as_ptr())
}

/// Best-effort host-level numeric id of the calling unit.
///
/// Returns `TID_UNAVAILABLE` (-1) where the host offers no cheap id.
pub fn host_tid() -> i32 {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: gettid takes no arguments and cannot fail.
        (unsafe { libc::syscall(libc::SYS_gettid) }) as i32
    }
    #[cfg(not(target_os = "linux"))]
    {
        guestthread_core::constants::TID_UNAVAILABLE
    }
}
