//! Architecture-specific stack switching
//!
//! One logical primitive, one `naked_asm!` body per architecture family,
//! selected at build time. There is no portable fallback: a target without
//! an implementation cannot run the self-freeing teardown protocol and
//! fails to build (see the `compile_error!` in `lib.rs`).

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::switch_stack;
#[cfg(target_arch = "x86_64")]
pub use x86_64::switch_stack;

/// One-way teardown continuation invoked on the target stack.
pub type SwitchFn = unsafe extern "C" fn(*mut u8) -> !;
