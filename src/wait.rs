use crate::state::{AtomicState, BuildState, StateMask};
use core::fmt;
use core::mem;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Result of a timed wait on a node milestone.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The node reached a state accepted by the handle.
    Signaled,
    /// The deadline passed first. The caller may simply wait again.
    TimedOut,
}

impl WaitOutcome {
    /// Whether the wait ended because the deadline passed.
    #[must_use]
    pub const fn timed_out(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

pub(crate) type Callback<T> = Box<dyn FnOnce(&T) + Send>;

/// Edge-triggered wait point over a node's atomic state, filtered by an
/// acceptance mask.
///
/// One mutex guards both the condition variable and the callback list, so a
/// single locked section is enough to decide "registered before the
/// transition" versus "registered after". Transitions publish the new state
/// and take the list under that mutex; the taken callbacks run after the
/// lock is released, so a callback is free to re-enter the node or the
/// context.
pub(crate) struct WaitHandle<T> {
    mask: StateMask,
    callbacks: Mutex<Vec<Callback<T>>>,
    cond: Condvar,
}

impl<T> fmt::Debug for WaitHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

impl<T> WaitHandle<T> {
    pub(crate) fn new(mask: StateMask) -> Self {
        Self {
            mask,
            callbacks: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        }
    }

    /// Blocks until the state matches the mask. Fast path is a single
    /// lock-free load; the blocked path rechecks under the mutex on every
    /// wakeup, so spurious wakeups never release a waiter early.
    pub(crate) fn wait(&self, state: &AtomicState) {
        if self.mask.accepts(state.load()) {
            return;
        }
        let mut callbacks = self.callbacks.lock();
        while !self.mask.accepts(state.load()) {
            self.cond.wait(&mut callbacks);
        }
    }

    pub(crate) fn wait_until(&self, state: &AtomicState, deadline: Instant) -> WaitOutcome {
        if self.mask.accepts(state.load()) {
            return WaitOutcome::Signaled;
        }
        let mut callbacks = self.callbacks.lock();
        while !self.mask.accepts(state.load()) {
            if self.cond.wait_until(&mut callbacks, deadline).timed_out() {
                // The transition may have slipped in between the last recheck
                // and the timeout.
                return if self.mask.accepts(state.load()) {
                    WaitOutcome::Signaled
                } else {
                    WaitOutcome::TimedOut
                };
            }
        }
        WaitOutcome::Signaled
    }

    pub(crate) fn wait_for(&self, state: &AtomicState, timeout: Duration) -> WaitOutcome {
        self.wait_until(state, Instant::now() + timeout)
    }

    /// Double-checked callback registration. Returns the callback back to the
    /// caller when the mask already holds, in which case the caller must
    /// invoke it on its own thread; otherwise the callback is queued for the
    /// thread that performs the matching transition.
    pub(crate) fn register(&self, state: &AtomicState, callback: Callback<T>) -> Option<Callback<T>> {
        if self.mask.accepts(state.load()) {
            return Some(callback);
        }
        let mut callbacks = self.callbacks.lock();
        if self.mask.accepts(state.load()) {
            drop(callbacks);
            return Some(callback);
        }
        callbacks.push(callback);
        None
    }

    /// Publishes `to` under this handle's mutex. On success, wakes every
    /// waiter and returns the drained callback list for the caller to run
    /// outside the lock; on a lost transition race, returns `None` and has
    /// no effect.
    pub(crate) fn advance(&self, state: &AtomicState, to: BuildState) -> Option<Vec<Callback<T>>> {
        let mut callbacks = self.callbacks.lock();
        if !state.try_advance(to) {
            return None;
        }
        self.cond.notify_all();
        Some(mem::take(&mut *callbacks))
    }

    /// Wakes waiters and drains callbacks for a transition that was already
    /// published through the node's other handle.
    pub(crate) fn follow(&self) -> Vec<Callback<T>> {
        let mut callbacks = self.callbacks.lock();
        self.cond.notify_all();
        mem::take(&mut *callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BUILT_OR_TERMINAL_MASK;

    #[test]
    fn register_after_acceptance_returns_the_callback() {
        let state = AtomicState::new(BuildState::Starting);
        assert!(state.try_advance(BuildState::NoBuilderAvailable));
        let handle = WaitHandle::<u32>::new(BUILT_OR_TERMINAL_MASK);
        let callback = handle.register(&state, Box::new(|_| {}));
        assert!(callback.is_some());
    }

    #[test]
    fn advance_drains_queued_callbacks_once() {
        let state = AtomicState::new(BuildState::Starting);
        let handle = WaitHandle::<u32>::new(BUILT_OR_TERMINAL_MASK);
        assert!(handle.register(&state, Box::new(|_| {})).is_none());
        assert!(state.try_advance(BuildState::DependenciesKnown));
        let drained = handle.advance(&state, BuildState::ObjectBuilt).unwrap();
        assert_eq!(drained.len(), 1);
        assert!(handle.follow().is_empty());
    }

    #[test]
    fn lost_transition_race_leaves_callbacks_queued() {
        let state = AtomicState::new(BuildState::Starting);
        assert!(state.try_advance(BuildState::Failure));
        let handle = WaitHandle::<u32>::new(BUILT_OR_TERMINAL_MASK);
        assert!(handle.advance(&state, BuildState::ObjectBuilt).is_none());
    }

    #[test]
    fn timed_wait_reports_timeout_before_any_transition() {
        let state = AtomicState::new(BuildState::Starting);
        let handle = WaitHandle::<u32>::new(BUILT_OR_TERMINAL_MASK);
        let outcome = handle.wait_for(&state, Duration::from_millis(10));
        assert!(outcome.timed_out());
    }

    #[test]
    fn wait_returns_immediately_on_accepted_state() {
        let state = AtomicState::new(BuildState::Starting);
        assert!(state.try_advance(BuildState::DependenciesKnown));
        assert!(state.try_advance(BuildState::ObjectBuilt));
        let handle = WaitHandle::<u32>::new(BUILT_OR_TERMINAL_MASK);
        handle.wait(&state);
        assert_eq!(
            handle.wait_for(&state, Duration::from_millis(1)),
            WaitOutcome::Signaled
        );
    }
}
