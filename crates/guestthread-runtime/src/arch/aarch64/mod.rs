//! aarch64 stack-switch implementation

use super::SwitchFn;
use std::arch::naked_asm;

/// Relocate the stack pointer to `stack_top` and invoke `func(arg)`.
///
/// # Safety
///
/// `_stack_top` must be the high end of a mapped, writable range large
/// enough for `func`'s frames. `func` must never return.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stack(_func: SwitchFn, _arg: *mut u8, _stack_top: *mut u8) -> ! {
    naked_asm!(
        // SP must stay 16-byte aligned per AAPCS64
        "and x2, x2, #0xfffffffffffffff0",
        "mov sp, x2",
        "mov x29, xzr",
        "mov x9, x0",
        "mov x0, x1",
        "blr x9",
        // We never return here
        "brk #0x1",
    );
}
