use core::sync::atomic::{AtomicU8, Ordering};
use derive_more::Display;

/// Lifecycle state of a node record.
///
/// States form a small DAG of their own: `Starting` may move to
/// `NoBuilderAvailable`, `DependenciesKnown` or `Failure`;
/// `DependenciesKnown` may move to `ObjectBuilt` or `Failure`. The three
/// remaining states are terminal and never rewritten.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuildState {
    /// Initial state; the node record exists but discovery has not finished.
    Starting = 0,
    /// Terminal: the provider returned no builder for the key.
    NoBuilderAvailable = 1,
    /// The dependency list is frozen; the build has not completed yet.
    DependenciesKnown = 2,
    /// Terminal: the built value is available.
    ObjectBuilt = 3,
    /// Terminal: discovery or build failed, or a dependency did.
    Failure = 4,
}

impl BuildState {
    /// Whether the state can never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NoBuilderAvailable | Self::ObjectBuilt | Self::Failure
        )
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::NoBuilderAvailable,
            2 => Self::DependenciesKnown,
            3 => Self::ObjectBuilt,
            4 => Self::Failure,
            _ => unreachable!("BuildState::from_raw: {raw}"),
        }
    }
}

/// Set of states a wait handle treats as completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateMask(u8);

impl StateMask {
    pub(crate) const fn of(states: &[BuildState]) -> Self {
        let mut mask = 0;
        let mut i = 0;
        while i < states.len() {
            mask |= states[i].bit();
            i += 1;
        }
        Self(mask)
    }

    pub(crate) const fn accepts(self, state: BuildState) -> bool {
        self.0 & state.bit() != 0
    }
}

/// Wakes when the dependency list is frozen or the node is terminal.
pub(crate) const DEPENDENCIES_KNOWN_MASK: StateMask = StateMask::of(&[
    BuildState::DependenciesKnown,
    BuildState::ObjectBuilt,
    BuildState::Failure,
    BuildState::NoBuilderAvailable,
]);

/// Wakes only when the node is terminal.
pub(crate) const BUILT_OR_TERMINAL_MASK: StateMask = StateMask::of(&[
    BuildState::ObjectBuilt,
    BuildState::Failure,
    BuildState::NoBuilderAvailable,
]);

const fn transition_allowed(from: BuildState, to: BuildState) -> bool {
    matches!(
        (from, to),
        (
            BuildState::Starting,
            BuildState::NoBuilderAvailable | BuildState::DependenciesKnown | BuildState::Failure,
        ) | (
            BuildState::DependenciesKnown,
            BuildState::ObjectBuilt | BuildState::Failure,
        )
    )
}

/// Atomic cell enforcing the legal transition relation.
///
/// Successful transitions publish with release semantics; `dependencies`,
/// `built_value` and `error` are written before the matching transition and
/// read only after an acquire load observes it.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: BuildState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> BuildState {
        BuildState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Attempts to move to `to`, returning whether this call performed the
    /// transition. Illegal transitions (including any write to a terminal
    /// state) are refused, which is what makes terminal states final even
    /// when two threads race to publish different outcomes.
    pub(crate) fn try_advance(&self, to: BuildState) -> bool {
        let mut current = self.load();
        loop {
            if !transition_allowed(current, to) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(raw) => current = BuildState::from_raw(raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            BuildState::NoBuilderAvailable,
            BuildState::ObjectBuilt,
            BuildState::Failure,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                BuildState::Starting,
                BuildState::NoBuilderAvailable,
                BuildState::DependenciesKnown,
                BuildState::ObjectBuilt,
                BuildState::Failure,
            ] {
                assert!(!transition_allowed(terminal, to));
            }
        }
    }

    #[test]
    fn advance_follows_the_relation() {
        let state = AtomicState::new(BuildState::Starting);
        assert!(!state.try_advance(BuildState::ObjectBuilt));
        assert!(state.try_advance(BuildState::DependenciesKnown));
        assert_eq!(state.load(), BuildState::DependenciesKnown);
        assert!(!state.try_advance(BuildState::NoBuilderAvailable));
        assert!(state.try_advance(BuildState::ObjectBuilt));
        assert!(!state.try_advance(BuildState::Failure));
        assert_eq!(state.load(), BuildState::ObjectBuilt);
    }

    #[test]
    fn masks_accept_the_documented_states() {
        assert!(DEPENDENCIES_KNOWN_MASK.accepts(BuildState::DependenciesKnown));
        assert!(DEPENDENCIES_KNOWN_MASK.accepts(BuildState::Failure));
        assert!(!DEPENDENCIES_KNOWN_MASK.accepts(BuildState::Starting));
        assert!(!BUILT_OR_TERMINAL_MASK.accepts(BuildState::DependenciesKnown));
        assert!(BUILT_OR_TERMINAL_MASK.accepts(BuildState::NoBuilderAvailable));
    }

    #[test]
    fn display_matches_variant_names() {
        assert_eq!(BuildState::ObjectBuilt.to_string(), "ObjectBuilt");
        assert_eq!(BuildState::NoBuilderAvailable.to_string(), "NoBuilderAvailable");
    }
}
