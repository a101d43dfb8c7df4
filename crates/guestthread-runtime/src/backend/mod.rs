//! Host backend strategies
//!
//! A backend owns the host-level mechanics of a unit's life: launching it on
//! a caller-provided stack, naming it, and terminating it. Exactly one
//! backend is resolved per process, at bring-up, and every unit created
//! afterwards uses it. The teardown coordinator branches on one capability
//! only: whether a finished unit can be joined.
//!
//! - `pthread`: host threads with an explicit stack. Join-capable, so a
//!   dead unit's stack is reclaimed by the next exiter after a join.
//! - `clone` (linux x86_64): raw kernel threads sharing the address space.
//!   Not joinable; an exiting unit frees its own stack from a borrowed
//!   temporary one.

mod pthread;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod clone_linux;

use crate::binder::{self, BinderMode};
use guestthread_core::error::{ThreadError, ThreadResult};
use guestthread_core::teb::Teb;
use std::str::FromStr;
use std::sync::OnceLock;

/// Host-level mechanics of one unit's life.
///
/// All methods are called with the descriptor's stack already mapped;
/// `spawn` must not return success with no unit running nor failure with
/// one left behind.
pub trait HostBackend: Sync {
    /// Stable identifier, also the `GTH_BACKEND` spelling.
    fn name(&self) -> &'static str;

    /// Whether `wait_unit` can block until a finished unit is fully dead.
    ///
    /// Decides the teardown strategy: join-capable backends defer stack
    /// release to the next exiter, the rest self-free on a temporary stack.
    fn join_capable(&self) -> bool;

    /// Launch a unit running the startup trampoline on the descriptor's
    /// stack.
    ///
    /// # Safety
    ///
    /// `teb` must stay valid (descriptor and stack mapping) until the unit
    /// terminates.
    unsafe fn spawn(&self, teb: *mut Teb) -> ThreadResult<()>;

    /// Record the calling unit's host handle in its descriptor.
    fn bind_host_identity(&self, teb: &Teb);

    /// Block until the unit behind `handle` has fully terminated.
    ///
    /// No-op on backends that are not join-capable.
    fn wait_unit(&self, handle: usize);

    /// Terminate the calling unit. Never returns.
    fn exit_unit(&self, status: i32) -> !;
}

/// Selectable backend strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Host threads with an explicit stack
    #[default]
    Pthread,
    /// Raw kernel threads (linux x86_64)
    Clone,
}

impl FromStr for BackendKind {
    type Err = ThreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pthread" => Ok(Self::Pthread),
            "clone" => Ok(Self::Clone),
            _ => Err(ThreadError::UnsupportedBackend("unknown backend name")),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pthread => write!(f, "pthread"),
            Self::Clone => write!(f, "clone"),
        }
    }
}

static BACKEND: OnceLock<&'static dyn HostBackend> = OnceLock::new();

/// Resolve the process-wide backend and its matching binder mechanism.
///
/// Re-selecting the same kind is a no-op; switching after resolution is an
/// error, as is asking for a backend this target cannot provide.
pub(crate) fn select(kind: BackendKind) -> ThreadResult<()> {
    let (chosen, mode): (&'static dyn HostBackend, BinderMode) = match kind {
        BackendKind::Pthread => (&pthread::PthreadBackend, BinderMode::TlsSlot),
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        BackendKind::Clone => (&clone_linux::CloneBackend, BinderMode::SegmentBase),
        #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
        BackendKind::Clone => {
            return Err(ThreadError::UnsupportedBackend(
                "clone backend requires linux x86_64",
            ))
        }
    };

    if let Some(current) = BACKEND.get() {
        if current.name() == chosen.name() {
            return Ok(());
        }
        return Err(ThreadError::AlreadyInitialized);
    }

    binder::set_mode(mode);
    BACKEND
        .set(chosen)
        .map_err(|_| ThreadError::AlreadyInitialized)
}

/// The resolved backend (pthread if nothing was ever selected).
pub fn backend() -> &'static dyn HostBackend {
    *BACKEND.get_or_init(|| {
        binder::set_mode(BinderMode::TlsSlot);
        &pthread::PthreadBackend
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("pthread".parse::<BackendKind>().unwrap(), BackendKind::Pthread);
        assert_eq!("clone".parse::<BackendKind>().unwrap(), BackendKind::Clone);
        assert!("lwp".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_kind_display_round_trip() {
        for kind in [BackendKind::Pthread, BackendKind::Clone] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_reselecting_same_kind_is_ok() {
        // The test binary resolves pthread by default.
        assert_eq!(backend().name(), "pthread");
        assert!(select(BackendKind::Pthread).is_ok());
    }
}
