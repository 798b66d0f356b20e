// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Pattern to automaton compiler.
//!
//! The sequence is compiled back to front. Construction starts from the
//! Final state; every node is turned into states whose `Take` transitions
//! lead to the states already built for its successor (the *sink*). The
//! state built for the first node becomes the Start state.
//!
//! # Per-node translation
//!
//! - **Singleton**: one state with `Take(cond) -> sink`, and an `Ignore`
//!   whose guard depends on the contiguity to the predecessor: none for
//!   strict, `!cond` for relaxed, `true` for non-deterministic relaxed.
//! - **Optional**: an extra `Proceed(true)` bypass to the sink. The `Ignore`
//!   then leads to a separate state without the bypass, so the node cannot be
//!   skipped twice.
//! - **Times(n, m)**: unrolled into `m` states; the last `m - n` carry a bypass.
//! - **Looping**: a looping state with `Take(cond)` to itself and
//!   `Proceed(true)` to the sink, preceded by the unrolled minimum. Its
//!   `Ignore` (inner contiguity) leads to a waiting state that can only take.
//!   `until(stop)` rewrites take guards to `!stop && cond` and ignore guards
//!   to `!stop && ignore`.
//! - **Greedy**: every transition of the sink is ANDed with `!cond`, so the
//!   loop keeps an event both could take.
//! - **Group**: the inner sequence is compiled against the same sink; looping
//!   groups route the inner tail through a dummy state that proceeds back to
//!   a second copy of the inner head.
//! - **not_next**: a state with `Proceed(!neg) -> sink` (or `Ignore(!neg)`
//!   when the sink is Final) and `Proceed(neg) -> Stop`.
//! - **not_followed_by**: in the middle it adds `Proceed(neg) -> Stop` to the
//!   states waiting for the next positive node. At the end it compiles to a
//!   Pending state that completes when the time bound expires.
//!
//! Stop states are shared per negated node and carry `Take(neg)` to
//! themselves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::error::DefinitionError;
use crate::nfa::state::{Automaton, State, StateId, StateKind, Transition, TransitionAction, FINAL_STATE_NAME};
use crate::pattern::{
    ConditionExpr, Contiguity, NodeKind, Pattern, PatternNode, QuantifierKind, Times, GROUP_NODE_NAME,
    STATE_NAME_SEPARATOR,
};

/// Validates `pattern` and compiles it into an automaton.
pub fn compile<E>(pattern: &Pattern<E>) -> Result<Automaton<E>, DefinitionError> {
    if let Some(error) = pattern.error() {
        return Err(error.clone());
    }
    validate(pattern)?;

    let nodes = pattern.nodes();
    let mut compiler = Compiler::new(smallest_window(nodes).unwrap_or(0));
    let end = compiler.create_state(FINAL_STATE_NAME, StateKind::Final);
    let sink = compiler.create_middle_states(nodes, None, None, end);
    let start = compiler.convert_pattern(
        Scope {
            nodes,
            index: 0,
            group: None,
            following: nodes.get(1),
        },
        sink,
    );
    compiler.states[start.index()].kind = StateKind::Start;

    debug!(
        "compiled {} pattern nodes into {} states, window {}ms",
        nodes.len(),
        compiler.states.len(),
        compiler.window
    );
    Ok(Automaton::new(
        compiler.states,
        start,
        compiler.window,
        pattern.skip_strategy().clone(),
    ))
}

fn validate<E>(pattern: &Pattern<E>) -> Result<(), DefinitionError> {
    let nodes = pattern.nodes();
    let mut names = HashSet::new();
    validate_sequence(nodes, false, &mut names)?;

    if let Some(last) = nodes.last() {
        if last.is_not_followed_by() && smallest_window(nodes).is_none() {
            return Err(DefinitionError::TrailingNegationWithoutWindow(last.name().to_string()));
        }
    }
    if let Some(target) = pattern.skip_strategy().pattern_name() {
        if !names.contains(target) {
            return Err(DefinitionError::UnknownSkipTarget(target.to_string()));
        }
    }
    Ok(())
}

fn validate_sequence<'p, E>(
    nodes: &'p [PatternNode<E>],
    in_group: bool,
    names: &mut HashSet<&'p str>,
) -> Result<(), DefinitionError> {
    let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
        return Err(DefinitionError::EmptyPattern);
    };
    if first.is_negated() {
        return Err(DefinitionError::NegatedStart(first.name().to_string()));
    }
    if in_group && last.is_negated() {
        return Err(DefinitionError::NegatedGroupTail(last.name().to_string()));
    }
    for (i, node) in nodes.iter().enumerate() {
        match node.kind() {
            NodeKind::Group(inner) => validate_sequence(inner, true, names)?,
            NodeKind::Leaf { .. } => {
                if node.name().contains(STATE_NAME_SEPARATOR) {
                    return Err(DefinitionError::ReservedCharacter {
                        name: node.name().to_string(),
                        separator: STATE_NAME_SEPARATOR,
                    });
                }
                if !names.insert(node.name()) {
                    return Err(DefinitionError::DuplicateName(node.name().to_string()));
                }
            }
        }
        if node.is_negated() && i > 0 && nodes[i - 1].quantifier().optional {
            return Err(DefinitionError::OptionalBeforeNegation {
                optional: nodes[i - 1].name().to_string(),
                negated: node.name().to_string(),
            });
        }
    }
    Ok(())
}

fn smallest_window<E>(nodes: &[PatternNode<E>]) -> Option<i64> {
    nodes
        .iter()
        .filter_map(|node| {
            let inner = match node.kind() {
                NodeKind::Group(inner) => smallest_window(inner),
                NodeKind::Leaf { .. } => None,
            };
            match (node.window(), inner) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        })
        .min()
}

/// Enclosing group of the node being compiled.
struct GroupCtx<'p, E> {
    node: &'p PatternNode<E>,
    /// The inner sequence being compiled is the group's first occurrence,
    /// so its head skips events with the group's own contiguity.
    first_of_loop: bool,
}

impl<E> Clone for GroupCtx<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for GroupCtx<'_, E> {}

/// Position of the node being compiled.
struct Scope<'p, E> {
    nodes: &'p [PatternNode<E>],
    index: usize,
    group: Option<GroupCtx<'p, E>>,
    following: Option<&'p PatternNode<E>>,
}

impl<E> Clone for Scope<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Scope<'_, E> {}

impl<'p, E> Scope<'p, E> {
    fn node(&self) -> &'p PatternNode<E> {
        &self.nodes[self.index]
    }

    fn group_head(&self) -> Option<GroupCtx<'p, E>> {
        if self.index == 0 {
            self.group
        } else {
            None
        }
    }
}

struct Compiler<E> {
    states: Vec<State<E>>,
    used_names: HashSet<String>,
    pages: HashMap<String, Arc<str>>,
    stop_states: HashMap<String, StateId>,
    // greedy loop sink -> unmodified copy reached when the stop condition fires
    original_states: HashMap<StateId, StateId>,
    window: i64,
    groups: usize,
}

impl<E> Compiler<E> {
    fn new(window: i64) -> Self {
        Self {
            states: Vec::new(),
            used_names: HashSet::new(),
            pages: HashMap::new(),
            stop_states: HashMap::new(),
            original_states: HashMap::new(),
            window,
            groups: 0,
        }
    }

    fn create_state(&mut self, pattern: &str, kind: StateKind) -> StateId {
        let mut name = pattern.to_string();
        let mut counter = 0;
        while self.used_names.contains(&name) {
            name = format!("{pattern}{STATE_NAME_SEPARATOR}{counter}");
            counter += 1;
        }
        self.used_names.insert(name.clone());
        let page = Arc::clone(
            self.pages
                .entry(pattern.to_string())
                .or_insert_with(|| Arc::from(pattern)),
        );
        self.states.push(State {
            name,
            pattern: page,
            kind,
            transitions: Vec::new(),
        });
        StateId((self.states.len() - 1) as u32)
    }

    fn add(&mut self, source: StateId, action: TransitionAction, target: StateId, condition: ConditionExpr<E>) {
        self.states[source.index()].transitions.push(Transition {
            action,
            source,
            target,
            condition,
        });
    }

    fn create_middle_states<'p>(
        &mut self,
        nodes: &'p [PatternNode<E>],
        group: Option<GroupCtx<'p, E>>,
        following: Option<&'p PatternNode<E>>,
        sink: StateId,
    ) -> StateId {
        let mut last_sink = sink;
        let mut following = following;
        for index in (1..nodes.len()).rev() {
            let node = &nodes[index];
            if node.is_not_followed_by() {
                if self.window > 0 && self.states[last_sink.index()].is_final() {
                    let not = node.condition();
                    let pending = self.create_state(node.name(), StateKind::Pending);
                    let stop = self.stop_state(node.name(), &not);
                    self.add(pending, TransitionAction::Proceed, stop, not.clone());
                    self.add(pending, TransitionAction::Ignore, pending, not.not());
                    last_sink = pending;
                }
            } else if node.is_negated() {
                let not = node.condition();
                let not_next = self.create_state(node.name(), StateKind::Normal);
                let stop = self.stop_state(node.name(), &not);
                if self.states[last_sink.index()].is_final() {
                    // the match completes on the next event, not on this one
                    self.add(not_next, TransitionAction::Ignore, last_sink, not.clone().not());
                } else {
                    self.add(not_next, TransitionAction::Proceed, last_sink, not.clone().not());
                }
                self.add(not_next, TransitionAction::Proceed, stop, not);
                last_sink = not_next;
            } else {
                let scope = Scope {
                    nodes,
                    index,
                    group,
                    following,
                };
                last_sink = self.convert_pattern(scope, last_sink);
            }
            following = Some(node);
        }
        last_sink
    }

    fn convert_pattern(&mut self, scope: Scope<'_, E>, sink: StateId) -> StateId {
        let node = scope.node();
        let quantifier = node.quantifier();
        let last_sink = match quantifier.kind {
            QuantifierKind::Looping => {
                let sink_without_nots = self.copy_without_transitive_nots(scope, sink, &mut HashMap::new());
                let looping = self.create_looping(scope, sink_without_nots);
                self.create_times_state(scope, looping, sink, quantifier.times)
            }
            QuantifierKind::Times => self.create_times_state(scope, sink, sink, quantifier.times),
            QuantifierKind::Single => {
                let take = node.condition();
                let ignore = self.ignore_condition(scope);
                self.create_singleton_state(scope, sink, Some(sink), take, ignore, quantifier.optional, true)
            }
        };
        self.add_stop_states(scope, last_sink);
        last_sink
    }

    fn create_times_state(&mut self, scope: Scope<'_, E>, sink: StateId, proceed: StateId, times: Times) -> StateId {
        let node = scope.node();
        let until = node.until();
        let inner_ignore = extend_with_until(self.inner_ignore_condition(scope), until, false);
        let take = extend_with_until(Some(node.condition()), until, true).unwrap_or(ConditionExpr::True);

        if node.quantifier().greedy && times.from != times.to {
            self.update_with_greedy_condition(sink, &take);
        }

        let mut last_sink = sink;
        for _ in times.from..times.to {
            last_sink = self.create_singleton_state(
                scope,
                last_sink,
                Some(proceed),
                take.clone(),
                inner_ignore.clone(),
                true,
                false,
            );
            self.add_stop_state_to_looping(scope, last_sink);
        }
        for _ in 1..times.from {
            last_sink =
                self.create_singleton_state(scope, last_sink, None, take.clone(), inner_ignore.clone(), false, false);
            self.add_stop_state_to_looping(scope, last_sink);
        }

        let ignore = self.ignore_condition(scope);
        self.create_singleton_state(
            scope,
            last_sink,
            Some(proceed),
            take,
            ignore,
            node.quantifier().optional,
            true,
        )
    }

    fn create_singleton_state(
        &mut self,
        scope: Scope<'_, E>,
        sink: StateId,
        proceed: Option<StateId>,
        take: ConditionExpr<E>,
        ignore: Option<ConditionExpr<E>>,
        optional: bool,
        first_of_loop: bool,
    ) -> StateId {
        let node = scope.node();
        if let NodeKind::Group(inner) = node.kind() {
            return self.create_group_state(scope, inner, sink, proceed.filter(|_| optional), first_of_loop);
        }

        let state = self.create_state(node.name(), StateKind::Normal);
        // accepting an event invalidates negations that precede an optional node
        let taken_sink = self.copy_without_transitive_nots(scope, sink, &mut HashMap::new());
        self.add(state, TransitionAction::Take, taken_sink, take.clone());

        if let (true, Some(proceed)) = (optional, proceed) {
            match (node.quantifier().greedy, node.until()) {
                (true, Some(until)) => {
                    if let Some(original) = self.original_states.get(&proceed).copied() {
                        self.add(state, TransitionAction::Proceed, original, until.clone());
                    }
                    self.add(state, TransitionAction::Proceed, proceed, until.clone().not());
                }
                _ => self.add(state, TransitionAction::Proceed, proceed, ConditionExpr::True),
            }
        }

        if let Some(ignore) = ignore {
            let ignore_state = if optional {
                let waiting = self.create_state(node.name(), StateKind::Normal);
                self.add(waiting, TransitionAction::Take, taken_sink, take);
                self.add(waiting, TransitionAction::Ignore, waiting, ignore.clone());
                self.add_stop_states(scope, waiting);
                waiting
            } else {
                state
            };
            self.add(state, TransitionAction::Ignore, ignore_state, ignore);
        }
        state
    }

    fn create_looping(&mut self, scope: Scope<'_, E>, sink: StateId) -> StateId {
        let node = scope.node();
        if let NodeKind::Group(inner) = node.kind() {
            return self.create_looping_group_state(scope, inner, sink);
        }

        let until = node.until();
        let ignore = extend_with_until(self.inner_ignore_condition(scope), until, false);
        let take = extend_with_until(Some(node.condition()), until, true).unwrap_or(ConditionExpr::True);

        let looping = self.create_state(node.name(), StateKind::Normal);
        if node.quantifier().greedy {
            if let Some(until) = until {
                let original = self.copy(sink);
                self.add(looping, TransitionAction::Proceed, original, until.clone());
                self.original_states.insert(sink, original);
                self.add(looping, TransitionAction::Proceed, sink, until.clone().not());
            } else {
                self.add(looping, TransitionAction::Proceed, sink, ConditionExpr::True);
            }
            self.update_with_greedy_condition(sink, &node.condition());
        } else {
            self.add(looping, TransitionAction::Proceed, sink, ConditionExpr::True);
        }
        self.add(looping, TransitionAction::Take, looping, take.clone());
        self.add_stop_state_to_looping(scope, looping);

        if let Some(ignore) = ignore {
            let waiting = self.create_state(node.name(), StateKind::Normal);
            self.add(waiting, TransitionAction::Take, looping, take);
            self.add(waiting, TransitionAction::Ignore, waiting, ignore.clone());
            self.add(looping, TransitionAction::Ignore, waiting, ignore);
            self.add_stop_state_to_looping(scope, waiting);
        }
        looping
    }

    fn create_group_state<'p>(
        &mut self,
        scope: Scope<'p, E>,
        inner: &'p [PatternNode<E>],
        sink: StateId,
        proceed: Option<StateId>,
        first_of_loop: bool,
    ) -> StateId {
        let group = GroupCtx {
            node: scope.node(),
            first_of_loop,
        };
        let head = self.compile_group_body(inner, group, scope.following, sink);
        if let Some(proceed) = proceed {
            self.add(head, TransitionAction::Proceed, proceed, ConditionExpr::True);
        }
        head
    }

    fn create_looping_group_state<'p>(
        &mut self,
        scope: Scope<'p, E>,
        inner: &'p [PatternNode<E>],
        sink: StateId,
    ) -> StateId {
        self.groups += 1;
        let dummy = self.create_state(&format!("{GROUP_NODE_NAME}#{}", self.groups), StateKind::Normal);
        let group = GroupCtx {
            node: scope.node(),
            first_of_loop: false,
        };
        let head = self.compile_group_body(inner, group, scope.following, dummy);
        self.add(head, TransitionAction::Proceed, sink, ConditionExpr::True);
        self.add(dummy, TransitionAction::Proceed, head, ConditionExpr::True);
        head
    }

    fn compile_group_body<'p>(
        &mut self,
        inner: &'p [PatternNode<E>],
        group: GroupCtx<'p, E>,
        following: Option<&'p PatternNode<E>>,
        sink: StateId,
    ) -> StateId {
        let last_sink = self.create_middle_states(inner, Some(group), following, sink);
        let head_scope = Scope {
            nodes: inner,
            index: 0,
            group: Some(group),
            following: inner.get(1).or(following),
        };
        self.convert_pattern(head_scope, last_sink)
    }

    fn stop_state(&mut self, name: &str, not: &ConditionExpr<E>) -> StateId {
        if let Some(stop) = self.stop_states.get(name) {
            return *stop;
        }
        let stop = self.create_state(name, StateKind::Stop);
        self.add(stop, TransitionAction::Take, stop, not.clone());
        self.stop_states.insert(name.to_string(), stop);
        stop
    }

    fn add_stop_states(&mut self, scope: Scope<'_, E>, state: StateId) {
        for (name, not) in current_not_conditions(scope) {
            let stop = self.stop_state(name, &not);
            self.add(state, TransitionAction::Proceed, stop, not);
        }
    }

    fn add_stop_state_to_looping(&mut self, scope: Scope<'_, E>, state: StateId) {
        if let Some(following) = scope.following.filter(|f| f.is_not_followed_by()) {
            let not = following.condition();
            let stop = self.stop_state(following.name(), &not);
            self.add(state, TransitionAction::Proceed, stop, not);
        }
    }

    fn update_with_greedy_condition(&mut self, state: StateId, take: &ConditionExpr<E>) {
        for transition in &mut self.states[state.index()].transitions {
            let condition = std::mem::replace(&mut transition.condition, ConditionExpr::True);
            transition.condition = condition.and(take.clone().not());
        }
    }

    fn copy(&mut self, state: StateId) -> StateId {
        let (pattern, kind, transitions) = {
            let original = &self.states[state.index()];
            (
                original.pattern.to_string(),
                original.kind,
                original.transitions.clone(),
            )
        };
        let copy = self.create_state(&pattern, kind);
        for t in transitions {
            let target = if t.target == state { copy } else { t.target };
            self.add(copy, t.action, target, t.condition);
        }
        copy
    }

    /// Copy of `sink` whose `Proceed` edges no longer lead to the Stop states
    /// of negations preceding the current optional node.
    fn copy_without_transitive_nots(
        &mut self,
        scope: Scope<'_, E>,
        sink: StateId,
        copies: &mut HashMap<StateId, StateId>,
    ) -> StateId {
        let nots = current_not_conditions(scope);
        if nots.is_empty() || !scope.node().quantifier().optional {
            return sink;
        }
        if let Some(copy) = copies.get(&sink) {
            return *copy;
        }

        let (pattern, kind, transitions) = {
            let original = &self.states[sink.index()];
            (
                original.pattern.to_string(),
                original.kind,
                original.transitions.clone(),
            )
        };
        let copy = self.create_state(&pattern, kind);
        copies.insert(sink, copy);
        for t in transitions {
            let target = if t.action == TransitionAction::Proceed {
                let target = &self.states[t.target.index()];
                if target.is_stop() {
                    if nots.iter().any(|(name, _)| *name == &*target.pattern) {
                        continue;
                    }
                    t.target
                } else {
                    self.copy_without_transitive_nots(scope, t.target, copies)
                }
            } else if t.target == sink {
                copy
            } else {
                t.target
            };
            self.add(copy, t.action, target, t.condition);
        }
        copy
    }

    fn ignore_condition(&self, scope: Scope<'_, E>) -> Option<ConditionExpr<E>> {
        let node = scope.node();
        let contiguity = match scope.group_head() {
            Some(group) if group.first_of_loop => group.node.contiguity(),
            Some(group) => group.node.quantifier().inner,
            None => node.contiguity(),
        };
        ignore_for(contiguity, node)
    }

    fn inner_ignore_condition(&self, scope: Scope<'_, E>) -> Option<ConditionExpr<E>> {
        let node = scope.node();
        let contiguity = scope
            .group_head()
            .map_or(node.quantifier().inner, |group| group.node.quantifier().inner);
        ignore_for(contiguity, node)
    }
}

fn ignore_for<E>(contiguity: Contiguity, node: &PatternNode<E>) -> Option<ConditionExpr<E>> {
    match contiguity {
        Contiguity::Strict => None,
        Contiguity::Relaxed => Some(node.condition().not()),
        Contiguity::NonDeterministicRelaxed => Some(ConditionExpr::True),
    }
}

fn extend_with_until<E>(
    condition: Option<ConditionExpr<E>>,
    until: Option<&ConditionExpr<E>>,
    is_take: bool,
) -> Option<ConditionExpr<E>> {
    match (until, condition) {
        (Some(until), Some(condition)) => Some(until.clone().not().and(condition)),
        (Some(until), None) if is_take => Some(until.clone().not()),
        (_, condition) => condition,
    }
}

/// Negations still in force for the current node: the `not_followed_by`
/// nodes reachable backwards through optional and negated predecessors.
fn current_not_conditions<'p, E>(scope: Scope<'p, E>) -> Vec<(&'p str, ConditionExpr<E>)> {
    let mut nots = Vec::new();
    for previous in scope.nodes[..scope.index].iter().rev() {
        if !(previous.quantifier().optional || previous.is_not_followed_by()) {
            break;
        }
        if previous.is_not_followed_by() {
            nots.push((previous.name(), previous.condition()));
        }
    }
    nots
}
