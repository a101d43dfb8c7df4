//! x86_64 stack-switch implementation
//!
//! Uses a naked function; stable in Rust 1.88+.

use super::SwitchFn;
use std::arch::naked_asm;

/// Relocate the stack pointer to `stack_top` and invoke `func(arg)`.
///
/// The frame pointer is cleared so unwinders stop here, and control never
/// returns to the caller's frame - the caller's stack may be unmapped the
/// moment the target function is running.
///
/// # Safety
///
/// `_stack_top` must be the high end of a mapped, writable range large
/// enough for `func`'s frames. `func` must never return.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stack(_func: SwitchFn, _arg: *mut u8, _stack_top: *mut u8) -> ! {
    naked_asm!(
        // Stack must be 16-byte aligned per System V AMD64 ABI; the call
        // below pushes the (never-used) return address for entry alignment.
        "and rdx, -16",
        "mov rsp, rdx",
        "xor ebp, ebp",
        "mov rax, rdi",
        "mov rdi, rsi",
        "call rax",
        // We never return here
        "ud2",
    );
}
