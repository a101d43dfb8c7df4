//! Startup trampoline
//!
//! Every host backend launches new units here. The trampoline walks the
//! descriptor through the bring-up states in order: bind the descriptor,
//! record the host identity, arrange signals, run the coordinator
//! handshake, then hand control to the guest entry routine. A failure in
//! any step before `Running` tears the unit down abruptly; guest code never
//! starts half-initialized.

use crate::backend::backend;
use crate::{binder, hooks, teardown};
use guestthread_core::kdebug;
use guestthread_core::state::LifecycleState;
use guestthread_core::teb::Teb;

/// Body of every new unit. Runs on the descriptor's own stack.
///
/// # Safety
///
/// `teb` must be the live descriptor whose stack the caller is executing
/// on, handed over exactly once by a backend `spawn`.
pub(crate) unsafe fn start_thread(teb: *mut Teb) -> ! {
    binder::bind(teb);
    let t = &*teb;
    backend().bind_host_identity(t);
    t.advance_state(LifecycleState::Bound);

    let hooks = hooks::startup_hooks();
    if (hooks.signal_setup)(t).is_err() {
        teardown::abort_thread(1);
    }
    t.advance_state(LifecycleState::SignalsReady);

    if (hooks.handshake)(t).is_err() {
        teardown::abort_thread(1);
    }
    t.advance_state(LifecycleState::HandshakeDone);

    t.advance_state(LifecycleState::Running);
    kdebug!(
        "unit {} running on {} backend",
        crate::host_tid(),
        backend().name()
    );

    match t.entry() {
        Some(entry) => entry(),
        // Unreachable through create(), which refuses entry-less descriptors
        None => teardown::abort_thread(1),
    }

    teardown::exit_thread(0)
}
