//! Startup hooks
//!
//! The trampoline has two points where the embedding runtime plugs in:
//! per-unit signal setup and the coordinator handshake. Both default to
//! something sensible (real signal setup, no-op handshake) so the crate is
//! usable stand-alone; an embedder installs its own pair once at bring-up.

use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::teb::Teb;
use std::sync::OnceLock;

/// A per-unit startup step. Runs on the new unit's own stack, after binding
/// and before guest code.
pub type UnitHook = fn(&Teb) -> ThreadResult<()>;

/// The pluggable startup steps of the trampoline.
#[derive(Clone, Copy)]
pub struct StartupHooks {
    /// Arranges the unit's signal state; failure aborts the unit.
    pub signal_setup: UnitHook,
    /// Registers the unit with its supervising coordinator over the
    /// descriptor's wire fds; failure aborts the unit.
    pub handshake: UnitHook,
}

fn default_signal_setup(_teb: &Teb) -> ThreadResult<()> {
    crate::signal::init_thread_signals()
}

fn default_handshake(_teb: &Teb) -> ThreadResult<()> {
    Ok(())
}

impl Default for StartupHooks {
    fn default() -> Self {
        Self {
            signal_setup: default_signal_setup,
            handshake: default_handshake,
        }
    }
}

static HOOKS: OnceLock<StartupHooks> = OnceLock::new();

/// Install the process-wide startup hooks.
///
/// Must happen before the first unit is created; fails once any hook set
/// (including the defaults) has been resolved.
pub fn install_hooks(hooks: StartupHooks) -> ThreadResult<()> {
    HOOKS
        .set(hooks)
        .map_err(|_| ThreadError::AlreadyInitialized)
}

/// The resolved hook set (defaults if none were installed).
pub(crate) fn startup_hooks() -> &'static StartupHooks {
    HOOKS.get_or_init(StartupHooks::default)
}
