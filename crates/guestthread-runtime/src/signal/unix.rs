//! Unix per-thread signal mask management

use guestthread_core::error::{ThreadError, ThreadResult};
use nix::sys::signal::{pthread_sigmask, SigSet, Signal, SigmaskHow};

/// Signals the runtime uses for unit control
const CONTROL_SIGNALS: [Signal; 2] = [Signal::SIGUSR1, Signal::SIGUSR2];

/// Arrange the calling unit's signal mask for guest execution.
///
/// New units inherit their creator's mask; make sure the control signals
/// are deliverable regardless of what the creator had blocked.
pub fn init_thread_signals() -> ThreadResult<()> {
    let mut set = SigSet::empty();
    for sig in CONTROL_SIGNALS {
        set.add(sig);
    }
    pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None)
        .map_err(|e| ThreadError::Os(e as i32))
}

/// Close the calling unit's signal mask for teardown.
///
/// Blocks everything blockable so no control signal can arrive while the
/// unit runs its final frames on a borrowed stack. Best-effort and
/// allocation-free; runs on paths that cannot report failure.
pub fn reset_thread_signals() {
    let set = SigSet::all();
    let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&set), None);
}
