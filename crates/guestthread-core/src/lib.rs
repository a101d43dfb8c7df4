//! # guestthread-core
//!
//! Core types for the guest thread lifecycle subsystem of a
//! binary-compatibility runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! All platform-specific implementations (backends, stack memory, the
//! control-block binder, teardown) live in `guestthread-runtime`.
//!
//! ## Modules
//!
//! - `teb` - Guest thread descriptor (stack bounds, host handle, wire fds)
//! - `state` - Startup/teardown lifecycle state machine
//! - `error` - Error types
//! - `env` - Environment variable utilities
//! - `kprint` - Kernel-style debug printing macros

#![allow(dead_code)]

pub mod env;
pub mod error;
pub mod kprint;
pub mod state;
pub mod teb;

// Re-exports for convenience
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use error::{MemoryError, ThreadError, ThreadResult};
pub use state::LifecycleState;
pub use teb::{GuestEntry, Teb, FD_NONE};

/// Constants for stack layout and teardown resources
pub mod constants {
    /// Host page size assumed for layout math (4 KB)
    pub const PAGE_SIZE: usize = 4096;

    /// Descriptor header at the start of a guest stack region (one page)
    pub const TEB_HEADER_SIZE: usize = 4096;

    /// Guard page between the descriptor header and the stack (4 KB)
    pub const GUARD_SIZE: usize = 4096;

    /// Default usable guest stack size (1 MB)
    pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

    /// Size of one temporary teardown stack
    pub const TEMP_STACK_SIZE: usize = 4096;

    /// Number of temporary teardown stacks
    ///
    /// There is no liveness tracking of claimed slots; this count must
    /// safely exceed the number of units simultaneously mid-teardown.
    pub const NB_TEMP_STACKS: usize = 8;

    /// Capacity of the stack region bookkeeping table
    pub const MAX_STACK_REGIONS: usize = 128;

    /// Sentinel for "host thread id unavailable on this target"
    pub const TID_UNAVAILABLE: i32 = -1;
}
