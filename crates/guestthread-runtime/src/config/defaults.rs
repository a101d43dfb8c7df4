//! Compile-time default configuration values

use guestthread_core::constants;

/// Usable stack size per guest unit
pub const STACK_SIZE: usize = constants::DEFAULT_STACK_SIZE;

/// Patch the host C library's errno resolver at bring-up
pub const ERRNO_RETROFIT: bool = false;

/// Emit lifecycle debug logging
pub const DEBUG_LOGGING: bool = false;
