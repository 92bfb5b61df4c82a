// Copyright Claudio Mattera 2024-2025.
//
// Distributed under the MIT License or the Apache 2.0 License at your option.
// See the accompanying files LICENSE-MIT.txt and LICENSE-APACHE-2.0.txt, or
// online at
// https://opensource.org/licenses/MIT
// https://opensource.org/licenses/Apache-2.0

//! Reference-counted sleep-state policy
//!
//! A sleep state may be entered only while no lock is held on it. The boot
//! sequence holds a lock on the subsystem-OFF state from early boot until
//! the wakeup timer is armed, which closes the race where the sleep-commit
//! task could power the subsystem down before the OFF profile is written.

use core::future::poll_fn;
use core::sync::atomic::AtomicU32;
use core::sync::atomic::Ordering;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;

/// A sleep state tracked by the policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SleepState {
    /// Core clock stopped, subsystem fully powered
    Idle,

    /// Subsystem powered down except the wakeup logic
    SubsystemOff,
}

impl SleepState {
    /// Number of tracked states
    const COUNT: usize = 2;

    /// Index of this state in the lock table
    fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::SubsystemOff => 1,
        }
    }
}

/// A reference-counted lock table over sleep states
///
/// At most one task may wait on [`allowed`](Self::allowed) at a time.
pub struct StatePolicy {
    /// Number of locks held per state
    counts: [AtomicU32; SleepState::COUNT],

    /// Waker of the task waiting for a state to become allowed
    waker: AtomicWaker,
}

impl StatePolicy {
    /// Create a new policy with no locks held
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [AtomicU32::new(0), AtomicU32::new(0)],
            waker: AtomicWaker::new(),
        }
    }

    /// Take one lock on a state, preventing entry into it
    pub fn lock(&self, state: SleepState) {
        self.counts[state.index()].fetch_add(1, Ordering::AcqRel);
    }

    /// Release one lock on a state
    ///
    /// Releasing a lock that is not held is a programming error.
    pub fn unlock(&self, state: SleepState) {
        let previous = self.counts[state.index()].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unlock without a matching lock");
        if previous == 1 {
            self.waker.wake();
        }
    }

    /// Return whether at least one lock is held on a state
    #[must_use]
    pub fn is_locked(&self, state: SleepState) -> bool {
        self.counts[state.index()].load(Ordering::Acquire) > 0
    }

    /// Return the deepest state not currently locked
    #[must_use]
    pub fn deepest_allowed(&self) -> SleepState {
        if self.is_locked(SleepState::SubsystemOff) {
            SleepState::Idle
        } else {
            SleepState::SubsystemOff
        }
    }

    /// Wait until a state is no longer locked
    pub async fn allowed(&self, state: SleepState) {
        poll_fn(|context| {
            if !self.is_locked(state) {
                return Poll::Ready(());
            }
            self.waker.register(context.waker());
            if self.is_locked(state) {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
    }
}

impl Default for StatePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::future::Future;
    use core::pin::pin;
    use core::task::Context;
    use core::task::RawWaker;
    use core::task::RawWakerVTable;
    use core::task::Waker;

    /// Vtable of a waker that does nothing
    static NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(core::ptr::null(), &NOOP_VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );

    /// Create a waker that does nothing
    fn noop_waker() -> Waker {
        // SAFETY:
        // The vtable functions neither dereference the pointer nor have any
        // other effect
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &NOOP_VTABLE)) }
    }

    #[test]
    fn fresh_policy_allows_subsystem_off() {
        let policy = StatePolicy::new();

        assert!(!policy.is_locked(SleepState::SubsystemOff));
        assert_eq!(policy.deepest_allowed(), SleepState::SubsystemOff);
    }

    #[test]
    fn locked_state_caps_the_deepest_allowed_state() {
        let policy = StatePolicy::new();

        policy.lock(SleepState::SubsystemOff);

        assert!(policy.is_locked(SleepState::SubsystemOff));
        assert_eq!(policy.deepest_allowed(), SleepState::Idle);
    }

    #[test]
    fn lock_is_reference_counted() {
        let policy = StatePolicy::new();

        policy.lock(SleepState::SubsystemOff);
        policy.lock(SleepState::SubsystemOff);
        policy.unlock(SleepState::SubsystemOff);

        assert!(policy.is_locked(SleepState::SubsystemOff));

        policy.unlock(SleepState::SubsystemOff);

        assert!(!policy.is_locked(SleepState::SubsystemOff));
    }

    #[test]
    fn waiter_is_pending_until_the_lock_is_released() {
        let policy = StatePolicy::new();
        policy.lock(SleepState::SubsystemOff);

        let waker = noop_waker();
        let mut context = Context::from_waker(&waker);
        let mut future = pin!(policy.allowed(SleepState::SubsystemOff));

        assert_eq!(future.as_mut().poll(&mut context), Poll::Pending);

        policy.unlock(SleepState::SubsystemOff);

        assert_eq!(future.as_mut().poll(&mut context), Poll::Ready(()));
    }
}
