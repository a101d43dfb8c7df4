//! Guest thread lifecycle states

use core::fmt;

/// State of a guest execution unit, from host creation to host termination.
///
/// The startup trampoline walks `Created` through `Running` in program
/// order; any return from guest code or explicit exit call moves to
/// `Exiting` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Descriptor prepared, host unit not yet entered the trampoline
    Created = 0,

    /// Control-block binding installed; `current_teb` is now valid
    Bound = 1,

    /// Per-unit signal disposition installed
    SignalsReady = 2,

    /// Registered with the supervising coordinator
    HandshakeDone = 3,

    /// Executing the guest entry routine
    Running = 4,

    /// Graceful teardown entered; never returns to Running
    Exiting = 5,

    /// Releasing resources (deferred-free step or temp-stack path)
    CleaningUp = 6,

    /// Host-level unit is gone; descriptor awaits (or received) release
    Terminated = 7,
}

impl LifecycleState {
    /// Check whether advancing to `next` is a legal transition.
    ///
    /// The startup chain is strictly sequential. `CleaningUp` is also
    /// reachable from any non-terminal state: the abrupt-abort path skips
    /// `Exiting` when coordination would be unsafe.
    pub const fn can_advance_to(self, next: LifecycleState) -> bool {
        match (self, next) {
            (LifecycleState::Created, LifecycleState::Bound) => true,
            (LifecycleState::Bound, LifecycleState::SignalsReady) => true,
            (LifecycleState::SignalsReady, LifecycleState::HandshakeDone) => true,
            (LifecycleState::HandshakeDone, LifecycleState::Running) => true,
            (LifecycleState::Running, LifecycleState::Exiting) => true,
            (LifecycleState::Exiting, LifecycleState::CleaningUp) => true,
            (LifecycleState::CleaningUp, LifecycleState::Terminated) => true,
            // Abrupt abort from anywhere still alive
            (s, LifecycleState::CleaningUp) => !s.is_terminal(),
            _ => false,
        }
    }

    /// Check if this unit has passed the point of no return
    #[inline]
    pub const fn is_exiting(&self) -> bool {
        matches!(
            self,
            LifecycleState::Exiting | LifecycleState::CleaningUp | LifecycleState::Terminated
        )
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            0 => LifecycleState::Created,
            1 => LifecycleState::Bound,
            2 => LifecycleState::SignalsReady,
            3 => LifecycleState::HandshakeDone,
            4 => LifecycleState::Running,
            5 => LifecycleState::Exiting,
            6 => LifecycleState::CleaningUp,
            7 => LifecycleState::Terminated,
            _ => LifecycleState::Created, // Default for invalid values
        }
    }
}

impl From<LifecycleState> for u8 {
    fn from(state: LifecycleState) -> u8 {
        state as u8
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_chain() {
        assert!(LifecycleState::Created.can_advance_to(LifecycleState::Bound));
        assert!(LifecycleState::Bound.can_advance_to(LifecycleState::SignalsReady));
        assert!(LifecycleState::SignalsReady.can_advance_to(LifecycleState::HandshakeDone));
        assert!(LifecycleState::HandshakeDone.can_advance_to(LifecycleState::Running));
        assert!(LifecycleState::Running.can_advance_to(LifecycleState::Exiting));
        assert!(LifecycleState::Exiting.can_advance_to(LifecycleState::CleaningUp));
        assert!(LifecycleState::CleaningUp.can_advance_to(LifecycleState::Terminated));
    }

    #[test]
    fn test_no_return_to_running() {
        assert!(!LifecycleState::Exiting.can_advance_to(LifecycleState::Running));
        assert!(!LifecycleState::CleaningUp.can_advance_to(LifecycleState::Running));
        assert!(!LifecycleState::Terminated.can_advance_to(LifecycleState::Running));
    }

    #[test]
    fn test_abrupt_abort_shortcut() {
        // Abort may jump straight to CleaningUp from any live state
        assert!(LifecycleState::Running.can_advance_to(LifecycleState::CleaningUp));
        assert!(LifecycleState::Bound.can_advance_to(LifecycleState::CleaningUp));
        assert!(!LifecycleState::Terminated.can_advance_to(LifecycleState::CleaningUp));
    }

    #[test]
    fn test_roundtrip_u8() {
        for v in 0u8..8 {
            let s = LifecycleState::from(v);
            assert_eq!(u8::from(s), v);
        }
        assert_eq!(LifecycleState::from(200), LifecycleState::Created);
    }

    #[test]
    fn test_is_exiting() {
        assert!(!LifecycleState::Running.is_exiting());
        assert!(LifecycleState::Exiting.is_exiting());
        assert!(LifecycleState::CleaningUp.is_exiting());
        assert!(LifecycleState::Terminated.is_exiting());
    }
}
