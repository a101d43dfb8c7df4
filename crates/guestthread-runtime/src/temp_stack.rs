//! Temporary teardown stacks
//!
//! A unit on the self-freeing exit path must leave its own stack before
//! that stack's memory is reclaimed. It borrows one of these small fixed
//! stacks for the final few frames between the switch and the irreversible
//! host termination call.
//!
//! There is no release operation and no liveness tracking: slots are handed
//! out round-robin by an atomic counter, and correctness rests on the pool
//! size safely exceeding the number of units simultaneously mid-teardown.
//! That is an accepted, probabilistic bound, not a proven one.

use guestthread_core::constants::{NB_TEMP_STACKS, TEMP_STACK_SIZE};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct TempStack([u8; TEMP_STACK_SIZE]);

struct TempStackPool(UnsafeCell<[TempStack; NB_TEMP_STACKS]>);

// Slots are only written through the claimed raw pointer while the claiming
// unit runs its final teardown frames on them.
unsafe impl Sync for TempStackPool {}

static TEMP_STACKS: TempStackPool =
    TempStackPool(UnsafeCell::new([TempStack([0; TEMP_STACK_SIZE]); NB_TEMP_STACKS]));

/// Next temp stack to use
static NEXT_TEMP_STACK: AtomicUsize = AtomicUsize::new(0);

/// A claimed temporary stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedStack {
    /// Pool slot index this claim resolved to
    pub index: usize,
    /// Low address of the slot
    pub base: *mut u8,
    /// High end; initial stack pointer for the switch
    pub top: *mut u8,
}

/// Claim a temporary stack to run thread-exit code on.
pub fn claim() -> ClaimedStack {
    let next = NEXT_TEMP_STACK.fetch_add(1, Ordering::Relaxed);
    let index = next % NB_TEMP_STACKS;
    let base = unsafe { (*TEMP_STACKS.0.get())[index].0.as_mut_ptr() };
    ClaimedStack {
        index,
        base,
        top: unsafe { base.add(TEMP_STACK_SIZE) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The claim counter is process-global; serialize the tests that assert
    // on its sequence.
    static CLAIM_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_claim_round_robin() {
        let _guard = CLAIM_LOCK.lock().unwrap();
        // Earlier claims may have advanced the counter, so check the
        // sequence relative to the first observation.
        let first = claim().index;
        for i in 1..3 * NB_TEMP_STACKS {
            let got = claim().index;
            assert_eq!(got, (first + i) % NB_TEMP_STACKS);
        }
    }

    #[test]
    fn test_claimed_range_is_writable() {
        let _guard = CLAIM_LOCK.lock().unwrap();
        let s = claim();
        assert_eq!(s.top as usize - s.base as usize, TEMP_STACK_SIZE);
        // Touch the slot top-down, the way switched-to code would.
        let mut off = TEMP_STACK_SIZE;
        while off >= 64 {
            off -= 64;
            unsafe { s.base.add(off).write_volatile(0xCD) };
        }
    }

    #[test]
    fn test_slots_are_distinct() {
        let _guard = CLAIM_LOCK.lock().unwrap();
        let a = claim();
        let b = claim();
        assert_ne!(a.index, b.index);
        assert_ne!(a.base, b.base);
    }
}
