// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! NFA runtime: advances computation states event by event.
//!
//! # Per-event step
//!
//! For every live computation state the runtime builds a *decision graph*:
//! starting at the state's automaton state it follows every `Proceed` whose
//! condition holds and collects every `Take` and `Ignore` that holds. Each
//! collected edge yields one successor computation state:
//!
//! - `Take` records the event in the shared buffer under the source state's
//!   pattern name and moves to the target. If the target can reach the Final
//!   state through `Proceed` edges alone, a completed match is produced too.
//! - `Ignore` keeps the history and moves to the target (usually the same
//!   state). It is never applied to a Start state.
//!
//! A Start state is always re-created so new matches can begin on any event.
//! When any successor lands in a Stop state, every successor of that
//! computation state is discarded.
//!
//! Branches receive [`DeweyNumber`] versions following the take/ignore
//! branch counts, so that every computation state descending from the same
//! start carries a distinct version.
//!
//! # Skip strategies
//!
//! Without a skip strategy, completed matches are emitted immediately. With
//! one, completed matches are held back until no live partial match started
//! earlier, then emitted in start order; each emitted match prunes partial
//! and completed matches according to the strategy.

use std::collections::HashSet;
use std::sync::Arc;

use log::trace;

use crate::common::event::EventId;
use crate::common::timestamp::{is_expired, TimerService};
use crate::error::{BufferError, DefinitionError, NfaError};
use crate::nfa::compiler::compile;
use crate::nfa::computation::{sort_by_start, ComputationState, NfaState};
use crate::nfa::dewey::DeweyNumber;
use crate::nfa::output::{Match, TimedOutMatch};
use crate::nfa::shared_buffer::{NodeRef, SharedBuffer};
use crate::nfa::state::{Automaton, State, StateId, TransitionAction};
use crate::pattern::condition::ConditionContext;
use crate::pattern::Pattern;

/// A `Take` or `Ignore` edge selected by the decision graph.
struct Branch {
    action: TransitionAction,
    source: StateId,
    target: StateId,
    /// For `Take`: Final state reachable from `target` by `Proceed` alone.
    completes: Option<StateId>,
}

/// Outgoing edges of one computation state for one event.
struct DecisionGraph {
    branches: Vec<Branch>,
    takes: usize,
    ignores: usize,
}

impl DecisionGraph {
    const fn self_branch_increment(&self) -> usize {
        if self.takes == 0 && self.ignores == 0 {
            0
        } else {
            self.ignores + if self.takes > 1 { self.takes } else { 1 }
        }
    }
}

/// Compiled pattern plus the settings that govern how it runs.
///
/// `Nfa` is immutable and may be shared between keys; per-key state lives in
/// an [`NfaState`] and a [`SharedBuffer`].
#[derive(Debug)]
pub struct Nfa<E> {
    automaton: Arc<Automaton<E>>,
    handle_timeout: bool,
    max_partial_matches: Option<usize>,
}

impl<E> Clone for Nfa<E> {
    fn clone(&self) -> Self {
        Self {
            automaton: Arc::clone(&self.automaton),
            handle_timeout: self.handle_timeout,
            max_partial_matches: self.max_partial_matches,
        }
    }
}

impl<E> Nfa<E> {
    /// Compiles `pattern`. `handle_timeout` enables [`TimedOutMatch`] output.
    pub fn compile(pattern: &Pattern<E>, handle_timeout: bool) -> Result<Self, DefinitionError> {
        Ok(Self::new(Arc::new(compile(pattern)?), handle_timeout))
    }

    /// Wraps an already compiled automaton.
    pub const fn new(automaton: Arc<Automaton<E>>, handle_timeout: bool) -> Self {
        Self {
            automaton,
            handle_timeout,
            max_partial_matches: None,
        }
    }

    /// Caps the number of live partial matches per key.
    #[must_use]
    pub const fn with_max_partial_matches(mut self, limit: Option<usize>) -> Self {
        self.max_partial_matches = limit;
        self
    }

    /// The compiled automaton.
    pub const fn automaton(&self) -> &Arc<Automaton<E>> {
        &self.automaton
    }

    /// Time bound in milliseconds, `0` when unbounded.
    pub fn window(&self) -> i64 {
        self.automaton.window()
    }

    /// Whether expired partial matches are reported.
    pub const fn handles_timeout(&self) -> bool {
        self.handle_timeout
    }

    /// Fresh per-key state holding a single Start computation state.
    pub fn create_initial_state(&self) -> NfaState {
        NfaState::new(vec![ComputationState::start(
            self.automaton.start(),
            DeweyNumber::default(),
        )])
    }

    fn state_of(&self, cs: &ComputationState) -> &State<E> {
        self.automaton.state(cs.state)
    }
}

impl<E: Clone> Nfa<E> {
    /// Feeds one event to every live computation state.
    ///
    /// Events must arrive in non-decreasing timestamp order. Returns the
    /// matches completed by this event. On error the event has been applied
    /// to some computation states but not others; the buffer stays
    /// consistent with `state`.
    pub fn process(
        &self,
        state: &mut NfaState,
        buffer: &mut SharedBuffer<E>,
        event: E,
        timestamp: i64,
        timer: &dyn TimerService,
    ) -> Result<Vec<Match<E>>, NfaError> {
        let id = buffer.register_event(event, timestamp);
        let result = self.do_process(state, buffer, id, timer.current_processing_time());
        let released = buffer.release_event(id);
        let matches = result?;
        released?;
        trace!(
            "event {id}: {} partial, {} completed, {} emitted",
            state.partial_matches.len(),
            state.completed_matches.len(),
            matches.len()
        );
        Ok(matches)
    }

    /// Advances event time to `timestamp`.
    ///
    /// Every computation state with `timestamp - start >= window` expires:
    /// Pending states (trailing `not_followed_by`) complete as matches, the
    /// others are reported as [`TimedOutMatch`] when timeouts are handled.
    /// Completed matches held back by the skip strategy are emitted once no
    /// earlier partial match remains.
    pub fn advance_time(
        &self,
        state: &mut NfaState,
        buffer: &mut SharedBuffer<E>,
        timestamp: i64,
    ) -> Result<(Vec<Match<E>>, Vec<TimedOutMatch<E>>), NfaError> {
        let window = self.window();
        let mut timed_out = Vec::new();
        let mut potential = Vec::new();
        let mut alive = Vec::with_capacity(state.partial_matches.len());

        for cs in std::mem::take(&mut state.partial_matches) {
            let current = self.state_of(&cs);
            if current.is_start() || !is_expired(timestamp, cs.start_timestamp, window) {
                alive.push(cs);
                continue;
            }
            if current.is_pending() {
                potential.push(cs);
                continue;
            }
            if self.handle_timeout {
                let partial = match cs.previous_entry {
                    Some(node) => buffer.materialize(&buffer.extract(node)?)?,
                    None => Match::new(Vec::new()),
                };
                timed_out.push(TimedOutMatch {
                    partial,
                    timeout_timestamp: cs.start_timestamp + window,
                });
            }
            release(buffer, cs.previous_entry)?;
        }
        state.partial_matches = alive;

        let mut matches = Vec::new();
        self.process_matches(state, buffer, potential, &mut matches)?;
        if !timed_out.is_empty() || !matches.is_empty() {
            trace!(
                "advance to {timestamp}: {} timed out, {} emitted",
                timed_out.len(),
                matches.len()
            );
        }
        Ok((matches, timed_out))
    }

    fn do_process(
        &self,
        state: &mut NfaState,
        buffer: &mut SharedBuffer<E>,
        event: EventId,
        processing_time: i64,
    ) -> Result<Vec<Match<E>>, NfaError> {
        let mut potential = Vec::new();
        let mut next_partials = Vec::new();
        let mut pending = std::mem::take(&mut state.partial_matches).into_iter();

        let mut failure = None;
        for cs in pending.by_ref() {
            let successors = match self.compute_next_states(buffer, &cs, event, processing_time) {
                Ok(successors) => successors,
                Err(e) => {
                    next_partials.push(cs);
                    failure = Some(e);
                    break;
                }
            };
            let discard = successors.iter().any(|s| self.state_of(s).is_stop());
            for successor in successors {
                if discard {
                    release(buffer, successor.previous_entry)?;
                } else if self.state_of(&successor).is_final() {
                    potential.push(successor);
                } else {
                    next_partials.push(successor);
                }
            }
        }
        next_partials.extend(pending);

        if let Some(e) = failure {
            for cs in potential {
                release(buffer, cs.previous_entry)?;
            }
            sort_by_start(&mut next_partials);
            state.partial_matches = next_partials;
            return Err(e);
        }

        sort_by_start(&mut next_partials);
        state.partial_matches = next_partials;

        let mut matches = Vec::new();
        if self.automaton.skip_strategy().is_skip_strategy() {
            self.process_matches(state, buffer, potential, &mut matches)?;
        } else {
            for cs in potential {
                let Some(node) = cs.previous_entry else {
                    continue;
                };
                let path = buffer.extract(node)?;
                matches.push(buffer.materialize(&path)?);
                buffer.release(node)?;
            }
        }

        if let Some(limit) = self.max_partial_matches {
            if state.partial_matches.len() > limit {
                return Err(NfaError::TooManyPartialMatches { limit });
            }
        }
        Ok(matches)
    }

    /// Emits completed matches that no earlier partial match can precede,
    /// pruning according to the skip strategy.
    fn process_matches(
        &self,
        state: &mut NfaState,
        buffer: &mut SharedBuffer<E>,
        potential: Vec<ComputationState>,
        out: &mut Vec<Match<E>>,
    ) -> Result<(), NfaError> {
        let strategy = self.automaton.skip_strategy();
        state.completed_matches.extend(potential);
        sort_by_start(&mut state.completed_matches);

        while let Some(earliest) = state.completed_matches.first() {
            let blocked = state
                .partial_matches
                .first()
                .is_some_and(|partial| partial.sort_key() < earliest.sort_key());
            if blocked {
                break;
            }
            let completed = state.completed_matches.remove(0);
            let Some(node) = completed.previous_entry else {
                continue;
            };
            let path = buffer.extract(node)?;
            let pruning_id = match strategy.pruning_id(&path) {
                Ok(id) => id,
                Err(e) => {
                    buffer.release(node)?;
                    return Err(e);
                }
            };
            if let Some(pruning_id) = pruning_id {
                prune(buffer, &mut state.partial_matches, |s| {
                    strategy.should_prune(s.start_event, pruning_id)
                })?;
                prune(buffer, &mut state.completed_matches, |s| {
                    strategy.should_prune(s.start_event, pruning_id)
                })?;
            }
            out.push(buffer.materialize(&path)?);
            buffer.release(node)?;
        }
        Ok(())
    }

    fn compute_next_states(
        &self,
        buffer: &mut SharedBuffer<E>,
        cs: &ComputationState,
        event: EventId,
        processing_time: i64,
    ) -> Result<Vec<ComputationState>, NfaError> {
        let graph = {
            let element = buffer.event(event).ok_or(BufferError::MissingEvent(event))?;
            let mut ctx = ConditionContext::new(buffer, cs.previous_entry, event.timestamp, processing_time);
            self.decision_graph(cs, element, &mut ctx)?
        };

        let is_start = self.state_of(cs).is_start();
        let mut take_to_visit = graph.takes.saturating_sub(1);
        let mut ignore_to_visit = graph.ignores;
        let take_to_skip = graph.takes.saturating_sub(1);
        let mut successors = Vec::new();

        for branch in &graph.branches {
            match branch.action {
                TransitionAction::Ignore => {
                    if is_start {
                        continue;
                    }
                    let version = if branch.target == cs.state {
                        cs.version.increase(graph.self_branch_increment())
                    } else {
                        let version = cs.version.increase(take_to_skip + ignore_to_visit).add_stage();
                        ignore_to_visit = ignore_to_visit.saturating_sub(1);
                        version
                    };
                    if let Some(node) = cs.previous_entry {
                        buffer.retain(node)?;
                    }
                    successors.push(ComputationState {
                        state: branch.target,
                        version,
                        ..cs.clone()
                    });
                }
                TransitionAction::Take => {
                    let current_version = cs.version.increase(take_to_visit);
                    let next_version = current_version.add_stage();
                    take_to_visit = take_to_visit.saturating_sub(1);

                    let page = self.automaton.state(branch.source).pattern();
                    let node = buffer.put(page, event, cs.previous_entry)?;
                    let (start_timestamp, start_event) = if is_start {
                        (event.timestamp, Some(event))
                    } else {
                        (cs.start_timestamp, cs.start_event)
                    };
                    let taken = ComputationState {
                        state: branch.target,
                        previous_entry: Some(node),
                        version: next_version,
                        start_timestamp,
                        previous_timestamp: event.timestamp,
                        start_event,
                    };
                    if let Some(end) = branch.completes {
                        buffer.retain(node)?;
                        successors.push(ComputationState {
                            state: end,
                            ..taken.clone()
                        });
                    }
                    successors.push(taken);
                }
                TransitionAction::Proceed => {}
            }
        }

        if is_start {
            let version = cs.version.increase(graph.self_branch_increment());
            successors.push(ComputationState::start(cs.state, version));
        }
        release(buffer, cs.previous_entry)?;
        Ok(successors)
    }

    fn decision_graph(
        &self,
        cs: &ComputationState,
        event: &E,
        ctx: &mut ConditionContext<'_, E>,
    ) -> Result<DecisionGraph, NfaError> {
        let mut graph = DecisionGraph {
            branches: Vec::new(),
            takes: 0,
            ignores: 0,
        };
        let mut visited = HashSet::new();
        let mut stack = vec![cs.state];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for transition in self.automaton.state(id).transitions() {
                if !transition.condition.evaluate(event, ctx)? {
                    continue;
                }
                let completes = match transition.action {
                    TransitionAction::Proceed => {
                        stack.push(transition.target);
                        continue;
                    }
                    TransitionAction::Take => {
                        graph.takes += 1;
                        self.final_after_proceed(transition.target, event, ctx)?
                    }
                    TransitionAction::Ignore => {
                        if transition.target != cs.state {
                            graph.ignores += 1;
                        }
                        None
                    }
                };
                graph.branches.push(Branch {
                    action: transition.action,
                    source: transition.source,
                    target: transition.target,
                    completes,
                });
            }
        }
        Ok(graph)
    }

    /// Final state reachable from `from` through `Proceed` edges that hold
    /// for `event`.
    fn final_after_proceed(
        &self,
        from: StateId,
        event: &E,
        ctx: &mut ConditionContext<'_, E>,
    ) -> Result<Option<StateId>, NfaError> {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for transition in self.automaton.state(id).transitions() {
                if transition.action != TransitionAction::Proceed || !transition.condition.evaluate(event, ctx)? {
                    continue;
                }
                if self.automaton.state(transition.target).is_final() {
                    return Ok(Some(transition.target));
                }
                stack.push(transition.target);
            }
        }
        Ok(None)
    }
}

fn release<E>(buffer: &mut SharedBuffer<E>, node: Option<NodeRef>) -> Result<(), BufferError> {
    match node {
        Some(node) => buffer.release(node),
        None => Ok(()),
    }
}

fn prune<E>(
    buffer: &mut SharedBuffer<E>,
    states: &mut Vec<ComputationState>,
    discard: impl Fn(&ComputationState) -> bool,
) -> Result<(), BufferError> {
    let mut kept = Vec::with_capacity(states.len());
    for cs in states.drain(..) {
        if discard(&cs) {
            release(buffer, cs.previous_entry)?;
        } else {
            kept.push(cs);
        }
    }
    *states = kept;
    Ok(())
}
