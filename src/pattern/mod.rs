// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Pattern definition model.
//!
//! A [`Pattern`] is an ordered sequence of named nodes built with a fluent
//! builder. Each node is either a leaf with a condition or a group wrapping
//! another sequence, and carries a quantifier, the contiguity to its
//! predecessor, an optional stop condition and an optional time bound.
//!
//! # Builder surface
//!
//! ```text
//! begin(name) / begin_group(p)         first node
//! next(name)  / next_group(p)          strict contiguity
//! followed_by(name) / followed_by_group(p)         relaxed contiguity
//! followed_by_any(name) / followed_by_any_group(p) non-deterministic relaxed
//! not_next(name) / not_followed_by(name)           negated nodes
//! filter(c) / or_filter(c) / until(c)  conditions on the last node
//! one_or_more() times(n) times_range(a, b) times_or_more(n)
//! optional() greedy() consecutive() allow_combinations()
//! within(duration)                     time bound (smallest wins)
//! with_skip_strategy(s)                after-match skip strategy
//! ```
//!
//! Misuse of the builder (a quantifier applied twice, `until` on a
//! non-looping node, ...) does not panic: the first error is recorded and
//! returned when the pattern is compiled.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cep::pattern::{Pattern, SimpleCondition};
//!
//! let pattern: Pattern<&str> = Pattern::begin("start")
//!     .filter(SimpleCondition::new(|e: &&str| e.starts_with('a')))
//!     .followed_by("middle")
//!     .filter(SimpleCondition::new(|e: &&str| e.starts_with('b')))
//!     .one_or_more()
//!     .consecutive()
//!     .next("end")
//!     .filter(SimpleCondition::new(|e: &&str| e.starts_with('c')))
//!     .within(Duration::from_secs(10));
//! assert_eq!(pattern.nodes().len(), 3);
//! assert!(pattern.error().is_none());
//! ```

pub mod condition;
pub mod quantifier;
pub mod skip;

use std::time::Duration;

pub use condition::{Condition, ConditionContext, ConditionExpr, IterativeCondition, SimpleCondition};
pub use quantifier::{Contiguity, Quantifier, QuantifierKind, Times};
pub use skip::{AfterMatchSkipStrategy, SkipKind};

use crate::common::timestamp::duration_to_millis;
use crate::error::DefinitionError;

/// Separator between a node name and the iteration suffix of internal state
/// names. Node names must not contain it.
pub const STATE_NAME_SEPARATOR: char = ':';

/// Placeholder name carried by group nodes. Groups never appear in match
/// output; their leaves do.
pub const GROUP_NODE_NAME: &str = "group";

/// Leaf or group.
pub enum NodeKind<E> {
    /// Matches single events against a condition.
    Leaf {
        /// Condition combined from `filter` and `or_filter`; `None` accepts
        /// every event.
        condition: Option<ConditionExpr<E>>,
    },
    /// Matches a nested sequence as a unit.
    Group(Vec<PatternNode<E>>),
}

impl<E> Clone for NodeKind<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Leaf { condition } => Self::Leaf {
                condition: condition.clone(),
            },
            Self::Group(nodes) => Self::Group(nodes.clone()),
        }
    }
}

/// One node of a pattern sequence.
pub struct PatternNode<E> {
    name: String,
    kind: NodeKind<E>,
    quantifier: Quantifier,
    contiguity: Contiguity,
    negated: bool,
    until: Option<ConditionExpr<E>>,
    window: Option<i64>,
}

impl<E> Clone for PatternNode<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            quantifier: self.quantifier,
            contiguity: self.contiguity,
            negated: self.negated,
            until: self.until.clone(),
            window: self.window,
        }
    }
}

impl<E> PatternNode<E> {
    const fn leaf(name: String, contiguity: Contiguity, negated: bool) -> Self {
        Self {
            name,
            kind: NodeKind::Leaf { condition: None },
            quantifier: Quantifier::single(),
            contiguity,
            negated,
            until: None,
            window: None,
        }
    }

    fn group(nodes: Vec<Self>, contiguity: Contiguity) -> Self {
        Self {
            name: GROUP_NODE_NAME.to_string(),
            kind: NodeKind::Group(nodes),
            quantifier: Quantifier::single(),
            contiguity,
            negated: false,
            until: None,
            window: None,
        }
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leaf or group.
    pub const fn kind(&self) -> &NodeKind<E> {
        &self.kind
    }

    /// True for group nodes.
    pub const fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    /// Repetition bounds and flags.
    pub const fn quantifier(&self) -> &Quantifier {
        &self.quantifier
    }

    /// Contiguity to the preceding node. For negated nodes `Strict` means
    /// `not_next` and `Relaxed` means `not_followed_by`.
    pub const fn contiguity(&self) -> Contiguity {
        self.contiguity
    }

    /// True for `not_next` / `not_followed_by` nodes.
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// True for a `not_followed_by` node.
    pub const fn is_not_followed_by(&self) -> bool {
        self.negated && !matches!(self.contiguity, Contiguity::Strict)
    }

    /// Stop condition of a looping node.
    pub const fn until(&self) -> Option<&ConditionExpr<E>> {
        self.until.as_ref()
    }

    /// Time bound in milliseconds set on this node.
    pub const fn window(&self) -> Option<i64> {
        self.window
    }

    /// Condition of a leaf, `True` when none was given or for groups.
    pub fn condition(&self) -> ConditionExpr<E> {
        match &self.kind {
            NodeKind::Leaf {
                condition: Some(condition),
            } => condition.clone(),
            _ => ConditionExpr::True,
        }
    }

    fn check_not_negated(&self, what: &str) -> Result<(), DefinitionError> {
        if self.negated {
            return Err(DefinitionError::quantifier(
                &self.name,
                format!("{what} cannot be applied to a negated pattern"),
            ));
        }
        Ok(())
    }

    fn check_no_quantifier(&self) -> Result<(), DefinitionError> {
        if self.quantifier.kind != QuantifierKind::Single {
            return Err(DefinitionError::quantifier(
                &self.name,
                "a quantifier is already applied",
            ));
        }
        Ok(())
    }

    fn make_optional(&mut self) -> Result<(), DefinitionError> {
        if self.quantifier.optional {
            return Err(DefinitionError::quantifier(&self.name, "optional already applied"));
        }
        self.quantifier.optional = true;
        Ok(())
    }
}

/// A pattern sequence plus the after-match skip strategy.
pub struct Pattern<E> {
    nodes: Vec<PatternNode<E>>,
    skip_strategy: AfterMatchSkipStrategy,
    error: Option<DefinitionError>,
}

impl<E> Clone for Pattern<E> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            skip_strategy: self.skip_strategy.clone(),
            error: self.error.clone(),
        }
    }
}

impl<E> Pattern<E> {
    /// Starts a sequence with a leaf named `name`.
    pub fn begin(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![PatternNode::leaf(name.into(), Contiguity::Relaxed, false)],
            skip_strategy: AfterMatchSkipStrategy::no_skip(),
            error: None,
        }
    }

    /// Starts a sequence with a group.
    pub fn begin_group(group: Self) -> Self {
        let mut pattern = Self {
            nodes: Vec::new(),
            skip_strategy: AfterMatchSkipStrategy::no_skip(),
            error: None,
        };
        pattern.push_group(group, Contiguity::Relaxed);
        pattern
    }

    /// Appends a leaf that must match the event right after the previous node.
    #[must_use]
    pub fn next(self, name: impl Into<String>) -> Self {
        self.push(name.into(), Contiguity::Strict, false)
    }

    /// Appends a leaf matching the first suitable event after the previous node.
    #[must_use]
    pub fn followed_by(self, name: impl Into<String>) -> Self {
        self.push(name.into(), Contiguity::Relaxed, false)
    }

    /// Appends a leaf matching every suitable event after the previous node.
    #[must_use]
    pub fn followed_by_any(self, name: impl Into<String>) -> Self {
        self.push(name.into(), Contiguity::NonDeterministicRelaxed, false)
    }

    /// Appends a negated leaf: the event right after the previous node must
    /// not match.
    #[must_use]
    pub fn not_next(self, name: impl Into<String>) -> Self {
        self.push(name.into(), Contiguity::Strict, true)
    }

    /// Appends a negated leaf: no event between the previous node and the
    /// next one may match.
    #[must_use]
    pub fn not_followed_by(self, name: impl Into<String>) -> Self {
        self.push(name.into(), Contiguity::Relaxed, true)
    }

    /// Appends a group with strict contiguity.
    #[must_use]
    pub fn next_group(mut self, group: Self) -> Self {
        self.push_group(group, Contiguity::Strict);
        self
    }

    /// Appends a group with relaxed contiguity.
    #[must_use]
    pub fn followed_by_group(mut self, group: Self) -> Self {
        self.push_group(group, Contiguity::Relaxed);
        self
    }

    /// Appends a group with non-deterministic relaxed contiguity.
    #[must_use]
    pub fn followed_by_any_group(mut self, group: Self) -> Self {
        self.push_group(group, Contiguity::NonDeterministicRelaxed);
        self
    }

    /// ANDs `condition` with the last node's condition.
    #[must_use]
    pub fn filter(self, condition: impl Condition<E> + 'static) -> Self {
        self.update(|node, _| {
            let NodeKind::Leaf { condition: current } = &mut node.kind else {
                return Err(DefinitionError::condition(
                    &node.name,
                    "group patterns do not take conditions",
                ));
            };
            let added = ConditionExpr::user(condition);
            *current = Some(match current.take() {
                Some(existing) => existing.and(added),
                None => added,
            });
            Ok(())
        })
    }

    /// ORs `condition` with the last node's condition.
    #[must_use]
    pub fn or_filter(self, condition: impl Condition<E> + 'static) -> Self {
        self.update(|node, _| {
            let NodeKind::Leaf { condition: current } = &mut node.kind else {
                return Err(DefinitionError::condition(
                    &node.name,
                    "group patterns do not take conditions",
                ));
            };
            let added = ConditionExpr::user(condition);
            *current = Some(match current.take() {
                Some(existing) => existing.or(added),
                None => added,
            });
            Ok(())
        })
    }

    /// Narrows the last node to one shape of event: only events `project`
    /// maps to `Some` are accepted. Further conditions go through
    /// [`Pattern::filter`] as usual.
    ///
    /// ```
    /// use cep::common::timestamp::FixedTimerService;
    /// use cep::nfa::{Nfa, SharedBuffer};
    /// use cep::pattern::Pattern;
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// enum Click {
    ///     Page(String),
    ///     Checkout(u32),
    /// }
    ///
    /// let pattern: Pattern<Click> = Pattern::begin("checkout").subtype(|c: &Click| match c {
    ///     Click::Checkout(cents) => Some(cents),
    ///     Click::Page(_) => None,
    /// });
    /// let nfa = Nfa::compile(&pattern, false).unwrap();
    /// let mut state = nfa.create_initial_state();
    /// let mut buffer = SharedBuffer::new();
    /// let timer = FixedTimerService(0);
    ///
    /// let page = Click::Page("home".into());
    /// assert!(nfa.process(&mut state, &mut buffer, page, 1, &timer).unwrap().is_empty());
    /// let matches = nfa.process(&mut state, &mut buffer, Click::Checkout(999), 2, &timer).unwrap();
    /// assert_eq!(matches[0].get("checkout"), Some(&[Click::Checkout(999)][..]));
    /// ```
    #[must_use]
    pub fn subtype<S, F>(self, project: F) -> Self
    where
        E: 'static,
        S: ?Sized + 'static,
        F: Fn(&E) -> Option<&S> + Send + Sync + 'static,
    {
        self.filter(SimpleCondition::new(move |event: &E| project(event).is_some()))
    }

    /// Stop condition for a looping node: once an event satisfies it, the
    /// loop accepts no more events.
    #[must_use]
    pub fn until(self, condition: impl Condition<E> + 'static) -> Self {
        self.update(|node, _| {
            if node.is_group() {
                return Err(DefinitionError::condition(
                    &node.name,
                    "group patterns do not take a stop condition",
                ));
            }
            if node.quantifier.kind != QuantifierKind::Looping {
                return Err(DefinitionError::condition(
                    &node.name,
                    "the stop condition is only applicable to looping patterns",
                ));
            }
            if node.until.is_some() {
                return Err(DefinitionError::condition(
                    &node.name,
                    "only one stop condition can be applied",
                ));
            }
            node.until = Some(ConditionExpr::user(condition));
            Ok(())
        })
    }

    /// One or more occurrences.
    #[must_use]
    pub fn one_or_more(self) -> Self {
        self.times_or_more(1)
    }

    /// Exactly `n` occurrences.
    #[must_use]
    pub fn times(self, n: u32) -> Self {
        self.update(|node, _| {
            node.check_not_negated("times")?;
            node.check_no_quantifier()?;
            if n == 0 {
                return Err(DefinitionError::quantifier(&node.name, "times must be positive"));
            }
            node.quantifier.kind = QuantifierKind::Times;
            node.quantifier.times = Times::exactly(n);
            Ok(())
        })
    }

    /// Between `from` and `to` occurrences, inclusive. `from == 0` makes the
    /// node optional.
    #[must_use]
    pub fn times_range(self, from: u32, to: u32) -> Self {
        self.update(|node, previous| {
            node.check_not_negated("times")?;
            node.check_no_quantifier()?;
            if to == 0 || to < from {
                return Err(DefinitionError::quantifier(
                    &node.name,
                    format!("invalid range {from}..={to}"),
                ));
            }
            let mut from = from;
            if from == 0 {
                check_previous_not_greedy(node, previous)?;
                node.make_optional()?;
                from = 1;
            }
            node.quantifier.kind = QuantifierKind::Times;
            node.quantifier.times = Times { from, to };
            Ok(())
        })
    }

    /// At least `n` occurrences. `n == 0` makes the node optional.
    #[must_use]
    pub fn times_or_more(self, n: u32) -> Self {
        self.update(|node, previous| {
            node.check_not_negated("one_or_more")?;
            node.check_no_quantifier()?;
            let mut n = n;
            if n == 0 {
                check_previous_not_greedy(node, previous)?;
                node.make_optional()?;
                n = 1;
            }
            node.quantifier.kind = QuantifierKind::Looping;
            node.quantifier.times = Times::exactly(n);
            Ok(())
        })
    }

    /// The node may match zero events.
    #[must_use]
    pub fn optional(self) -> Self {
        self.update(|node, previous| {
            node.check_not_negated("optional")?;
            check_previous_not_greedy(node, previous)?;
            node.make_optional()
        })
    }

    /// Prefer the longest run for a looping or ranged node.
    #[must_use]
    pub fn greedy(self) -> Self {
        self.update(|node, _| {
            node.check_not_negated("greedy")?;
            if node.is_group() {
                return Err(DefinitionError::quantifier(
                    &node.name,
                    "greedy is not applicable to group patterns",
                ));
            }
            if !node.quantifier.repeats() {
                return Err(DefinitionError::quantifier(
                    &node.name,
                    "greedy is not applicable to a singleton",
                ));
            }
            if node.quantifier.inner == Contiguity::NonDeterministicRelaxed {
                return Err(DefinitionError::quantifier(
                    &node.name,
                    "greedy is not applicable together with allow_combinations",
                ));
            }
            node.quantifier.greedy = true;
            Ok(())
        })
    }

    /// Occurrences of a looping or ranged node must be adjacent.
    #[must_use]
    pub fn consecutive(self) -> Self {
        self.update(|node, _| set_inner(node, Contiguity::Strict))
    }

    /// Occurrences of a looping or ranged node branch on every matching event.
    #[must_use]
    pub fn allow_combinations(self) -> Self {
        self.update(|node, _| {
            if node.quantifier.greedy {
                return Err(DefinitionError::quantifier(
                    &node.name,
                    "allow_combinations is not applicable to a greedy pattern",
                ));
            }
            set_inner(node, Contiguity::NonDeterministicRelaxed)
        })
    }

    /// Time bound measured from the first accepted event. When several nodes
    /// carry a bound the smallest applies.
    #[must_use]
    pub fn within(self, window: Duration) -> Self {
        self.update(|node, _| match duration_to_millis(window) {
            Some(millis) if millis > 0 => {
                node.window = Some(millis);
                Ok(())
            }
            other => Err(DefinitionError::InvalidWindow {
                name: node.name.clone(),
                millis: other.unwrap_or(i64::MAX),
            }),
        })
    }

    /// Sets the after-match skip strategy.
    #[must_use]
    pub fn with_skip_strategy(mut self, strategy: AfterMatchSkipStrategy) -> Self {
        self.skip_strategy = strategy;
        self
    }

    /// Nodes in sequence order.
    pub fn nodes(&self) -> &[PatternNode<E>] {
        &self.nodes
    }

    /// After-match skip strategy.
    pub const fn skip_strategy(&self) -> &AfterMatchSkipStrategy {
        &self.skip_strategy
    }

    /// First builder misuse, if any.
    pub const fn error(&self) -> Option<&DefinitionError> {
        self.error.as_ref()
    }

    fn fail(&mut self, error: DefinitionError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push(mut self, name: String, contiguity: Contiguity, negated: bool) -> Self {
        if negated {
            if let Some(last) = self.nodes.last() {
                if last.quantifier.optional {
                    let error = DefinitionError::OptionalBeforeNegation {
                        optional: last.name.clone(),
                        negated: name.clone(),
                    };
                    self.fail(error);
                }
            }
        }
        self.nodes.push(PatternNode::leaf(name, contiguity, negated));
        self
    }

    fn push_group(&mut self, group: Self, contiguity: Contiguity) {
        if let Some(error) = group.error {
            self.fail(error);
        }
        self.nodes.push(PatternNode::group(group.nodes, contiguity));
    }

    fn update<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut PatternNode<E>, Option<&PatternNode<E>>) -> Result<(), DefinitionError>,
    {
        let outcome = match self.nodes.split_last_mut() {
            Some((last, rest)) => f(last, rest.last()),
            None => Err(DefinitionError::EmptyPattern),
        };
        if let Err(error) = outcome {
            self.fail(error);
        }
        self
    }
}

fn check_previous_not_greedy<E>(
    node: &PatternNode<E>,
    previous: Option<&PatternNode<E>>,
) -> Result<(), DefinitionError> {
    match previous {
        Some(prev) if prev.quantifier.greedy => Err(DefinitionError::quantifier(
            &node.name,
            format!("an optional pattern cannot follow greedy pattern `{}`", prev.name),
        )),
        _ => Ok(()),
    }
}

fn set_inner<E>(node: &mut PatternNode<E>, inner: Contiguity) -> Result<(), DefinitionError> {
    if !node.quantifier.repeats() {
        return Err(DefinitionError::quantifier(
            &node.name,
            "inner contiguity is only applicable to looping or times patterns",
        ));
    }
    if node.quantifier.inner != Contiguity::Relaxed {
        return Err(DefinitionError::quantifier(
            &node.name,
            "consecutive and allow_combinations are mutually exclusive",
        ));
    }
    node.quantifier.inner = inner;
    Ok(())
}
