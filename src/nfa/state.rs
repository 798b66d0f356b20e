// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Compiled automaton: states and typed transitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pattern::condition::ConditionExpr;
use crate::pattern::skip::AfterMatchSkipStrategy;

/// Name of the accepting state.
pub const FINAL_STATE_NAME: &str = "$end$";

/// Index of a state inside its [`Automaton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl StateId {
    /// Position in [`Automaton::states`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Entry state; a fresh copy is kept alive at all times.
    Start,
    /// Intermediate state.
    Normal,
    /// Accepting state.
    Final,
    /// Reaching it discards the whole branch.
    Stop,
    /// Waiting for a trailing `not_followed_by` to expire; becomes a match on
    /// timeout.
    Pending,
}

/// What a transition does with the current event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionAction {
    /// Accept the event into the partial match and move to the target.
    Take,
    /// Skip the event and move to the target (often the source itself).
    Ignore,
    /// Move to the target without consuming the event.
    Proceed,
}

/// Guarded edge between two states.
#[derive(Debug)]
pub struct Transition<E> {
    /// Action performed when the condition holds.
    pub action: TransitionAction,
    /// State owning the transition.
    pub source: StateId,
    /// Destination state.
    pub target: StateId,
    /// Guard evaluated against the current event.
    pub condition: ConditionExpr<E>,
}

impl<E> Clone for Transition<E> {
    fn clone(&self) -> Self {
        Self {
            action: self.action,
            source: self.source,
            target: self.target,
            condition: self.condition.clone(),
        }
    }
}

/// Automaton state.
#[derive(Debug)]
pub struct State<E> {
    pub(crate) name: String,
    pub(crate) pattern: Arc<str>,
    pub(crate) kind: StateKind,
    pub(crate) transitions: Vec<Transition<E>>,
}

impl<E> State<E> {
    /// Unique internal name, e.g. `b` or `b:1`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the pattern node the state belongs to. Accepted events are
    /// recorded under this name.
    pub fn pattern(&self) -> &Arc<str> {
        &self.pattern
    }

    /// Role of the state.
    pub const fn kind(&self) -> StateKind {
        self.kind
    }

    /// Outgoing transitions in evaluation order.
    pub fn transitions(&self) -> &[Transition<E>] {
        &self.transitions
    }

    /// True for the accepting state.
    pub const fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    /// True for the entry state.
    pub const fn is_start(&self) -> bool {
        matches!(self.kind, StateKind::Start)
    }

    /// True for a stop state.
    pub const fn is_stop(&self) -> bool {
        matches!(self.kind, StateKind::Stop)
    }

    /// True for a pending state.
    pub const fn is_pending(&self) -> bool {
        matches!(self.kind, StateKind::Pending)
    }
}

/// Immutable automaton produced by [`crate::nfa::compiler::compile`].
#[derive(Debug)]
pub struct Automaton<E> {
    states: Vec<State<E>>,
    start: StateId,
    window: i64,
    skip_strategy: AfterMatchSkipStrategy,
    fingerprint: String,
}

impl<E> Automaton<E> {
    pub(crate) fn new(
        states: Vec<State<E>>,
        start: StateId,
        window: i64,
        skip_strategy: AfterMatchSkipStrategy,
    ) -> Self {
        let fingerprint = fingerprint(&states, start, window, &skip_strategy);
        Self {
            states,
            start,
            window,
            skip_strategy,
            fingerprint,
        }
    }

    /// All states; [`StateId`] indexes into this slice.
    pub fn states(&self) -> &[State<E>] {
        &self.states
    }

    /// State by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this automaton. Ids handed out by
    /// the runtime and validated on restore always do.
    pub fn state(&self, id: StateId) -> &State<E> {
        &self.states[id.index()]
    }

    /// State by id, `None` when out of range.
    pub fn get(&self, id: StateId) -> Option<&State<E>> {
        self.states.get(id.index())
    }

    /// Looks a state up by its internal name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|s| s.name == name)
            .map(|i| StateId(i as u32))
    }

    /// Entry state.
    pub const fn start(&self) -> StateId {
        self.start
    }

    /// Time bound in milliseconds, `0` when unbounded.
    pub const fn window(&self) -> i64 {
        self.window
    }

    /// After-match skip strategy.
    pub const fn skip_strategy(&self) -> &AfterMatchSkipStrategy {
        &self.skip_strategy
    }

    /// Hex digest identifying the automaton structure. Snapshots only restore
    /// into an automaton with the same fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint<E>(
    states: &[State<E>],
    start: StateId,
    window: i64,
    skip_strategy: &AfterMatchSkipStrategy,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&start.0.to_le_bytes());
    hasher.update(&window.to_le_bytes());
    hasher.update(format!("{skip_strategy:?}").as_bytes());
    for state in states {
        hasher.update(b"|");
        hasher.update(state.name.as_bytes());
        hasher.update(b"/");
        hasher.update(state.pattern.as_bytes());
        hasher.update(format!("/{:?}", state.kind).as_bytes());
        for t in &state.transitions {
            hasher.update(
                format!(";{:?}>{}:{}", t.action, t.target.0, t.condition.shape()).as_bytes(),
            );
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str, kind: StateKind, transitions: Vec<Transition<i32>>) -> State<i32> {
        State {
            name: name.to_string(),
            pattern: Arc::from(name),
            kind,
            transitions,
        }
    }

    fn take(source: u32, target: u32) -> Transition<i32> {
        Transition {
            action: TransitionAction::Take,
            source: StateId(source),
            target: StateId(target),
            condition: ConditionExpr::True,
        }
    }

    #[test]
    fn test_lookup() {
        let automaton = Automaton::new(
            vec![
                state(FINAL_STATE_NAME, StateKind::Final, vec![]),
                state("a", StateKind::Start, vec![take(1, 0)]),
            ],
            StateId(1),
            0,
            AfterMatchSkipStrategy::no_skip(),
        );
        assert_eq!(automaton.find("a"), Some(StateId(1)));
        assert!(automaton.state(StateId(1)).is_start());
        assert!(automaton.state(StateId(0)).is_final());
        assert!(automaton.get(StateId(7)).is_none());
        assert_eq!(automaton.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_structure() {
        let build = |window: i64, target: u32| {
            Automaton::new(
                vec![
                    state(FINAL_STATE_NAME, StateKind::Final, vec![]),
                    state("a", StateKind::Start, vec![take(1, target)]),
                ],
                StateId(1),
                window,
                AfterMatchSkipStrategy::no_skip(),
            )
        };
        let base = build(0, 0);
        assert_eq!(base.fingerprint(), build(0, 0).fingerprint());
        assert_ne!(base.fingerprint(), build(10, 0).fingerprint());
        assert_ne!(base.fingerprint(), build(0, 1).fingerprint());
    }
}
