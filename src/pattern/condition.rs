// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Conditions evaluated against events while matching.
//!
//! A condition is an opaque capability `filter(event, context) -> bool`. It may
//! capture external state and is not required to be pure; after a restore the
//! engine can re-evaluate a condition on an event it has already seen, so
//! non-idempotent conditions are the caller's responsibility.
//!
//! The [`ConditionContext`] gives access to the event timestamp, the processing
//! time, and the events already accepted for a named pattern in the current
//! partial match. The latter walks the shared buffer and costs time
//! proportional to the length of the partial match; the result is cached for
//! the lifetime of the context.

use std::fmt;
use std::sync::Arc;

use crate::error::ConditionError;
use crate::nfa::shared_buffer::{EventPath, NodeRef, SharedBuffer};

/// A predicate over events.
pub trait Condition<E>: Send + Sync {
    /// Returns whether `event` satisfies the condition.
    ///
    /// Errors are never treated as `false`: they abort processing of the
    /// current event and surface to the caller.
    fn filter(&self, event: &E, ctx: &mut ConditionContext<'_, E>) -> Result<bool, ConditionError>;
}

/// Condition that only looks at the event.
///
/// # Examples
///
/// ```
/// use cep::pattern::{Pattern, SimpleCondition};
///
/// let pattern: Pattern<i64> = Pattern::begin("big").filter(SimpleCondition::new(|v: &i64| *v > 10));
/// assert_eq!(pattern.nodes().len(), 1);
/// ```
pub struct SimpleCondition<F>(F);

impl<F> SimpleCondition<F> {
    /// Wraps a closure.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<E, F> Condition<E> for SimpleCondition<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn filter(&self, event: &E, _ctx: &mut ConditionContext<'_, E>) -> Result<bool, ConditionError> {
        Ok((self.0)(event))
    }
}

/// Condition with access to the partial match through [`ConditionContext`].
pub struct IterativeCondition<F>(F);

impl<F> IterativeCondition<F> {
    /// Wraps a closure.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<E, F> Condition<E> for IterativeCondition<F>
where
    F: Fn(&E, &mut ConditionContext<'_, E>) -> Result<bool, ConditionError> + Send + Sync,
{
    fn filter(&self, event: &E, ctx: &mut ConditionContext<'_, E>) -> Result<bool, ConditionError> {
        (self.0)(event, ctx)
    }
}

/// Read-only view of the matching state handed to conditions.
pub struct ConditionContext<'a, E> {
    buffer: &'a SharedBuffer<E>,
    previous: Option<NodeRef>,
    timestamp: i64,
    processing_time: i64,
    matched: Option<EventPath>,
}

impl<'a, E> ConditionContext<'a, E> {
    pub(crate) const fn new(
        buffer: &'a SharedBuffer<E>,
        previous: Option<NodeRef>,
        timestamp: i64,
        processing_time: i64,
    ) -> Self {
        Self {
            buffer,
            previous,
            timestamp,
            processing_time,
            matched: None,
        }
    }

    /// Timestamp of the event being evaluated.
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Processing time supplied by the host's timer service.
    pub const fn current_processing_time(&self) -> i64 {
        self.processing_time
    }

    /// Events already accepted for `name` in the current partial match, in
    /// timestamp order. Empty when the pattern has not accepted any event.
    pub fn events_for_pattern(&mut self, name: &str) -> Result<Vec<&'a E>, ConditionError> {
        let Some(previous) = self.previous else {
            return Ok(Vec::new());
        };
        let buffer = self.buffer;
        if self.matched.is_none() {
            let path = buffer
                .extract(previous)
                .map_err(|e| ConditionError::new(e.to_string()))?;
            self.matched = Some(path);
        }
        let Some(ids) = self
            .matched
            .as_ref()
            .and_then(|path| path.iter().find(|(page, _)| &**page == name))
            .map(|(_, ids)| ids)
        else {
            return Ok(Vec::new());
        };
        ids.iter()
            .map(|id| {
                buffer
                    .event(*id)
                    .ok_or_else(|| ConditionError::new(format!("event {id} is not stored")))
            })
            .collect()
    }
}

/// Compiled condition tree attached to automaton transitions.
pub enum ConditionExpr<E> {
    /// Always holds.
    True,
    /// User-supplied condition.
    User(Arc<dyn Condition<E>>),
    /// Negation.
    Not(Box<ConditionExpr<E>>),
    /// Conjunction, short-circuiting left to right.
    And(Box<ConditionExpr<E>>, Box<ConditionExpr<E>>),
    /// Disjunction, short-circuiting left to right.
    Or(Box<ConditionExpr<E>>, Box<ConditionExpr<E>>),
}

impl<E> ConditionExpr<E> {
    /// Wraps a user condition.
    pub fn user(condition: impl Condition<E> + 'static) -> Self {
        Self::User(Arc::new(condition))
    }

    /// Logical negation.
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Logical conjunction.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Logical disjunction.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluates the tree against `event`.
    pub fn evaluate(&self, event: &E, ctx: &mut ConditionContext<'_, E>) -> Result<bool, ConditionError> {
        match self {
            Self::True => Ok(true),
            Self::User(condition) => condition.filter(event, ctx),
            Self::Not(inner) => Ok(!inner.evaluate(event, ctx)?),
            Self::And(left, right) => Ok(left.evaluate(event, ctx)? && right.evaluate(event, ctx)?),
            Self::Or(left, right) => Ok(left.evaluate(event, ctx)? || right.evaluate(event, ctx)?),
        }
    }

    /// Structural description used for automaton fingerprints.
    pub fn shape(&self) -> String {
        match self {
            Self::True => "true".to_string(),
            Self::User(_) => "cond".to_string(),
            Self::Not(inner) => format!("!{}", inner.shape()),
            Self::And(left, right) => format!("({}&{})", left.shape(), right.shape()),
            Self::Or(left, right) => format!("({}|{})", left.shape(), right.shape()),
        }
    }
}

impl<E> Clone for ConditionExpr<E> {
    fn clone(&self) -> Self {
        match self {
            Self::True => Self::True,
            Self::User(condition) => Self::User(Arc::clone(condition)),
            Self::Not(inner) => Self::Not(inner.clone()),
            Self::And(left, right) => Self::And(left.clone(), right.clone()),
            Self::Or(left, right) => Self::Or(left.clone(), right.clone()),
        }
    }
}

impl<E> fmt::Debug for ConditionExpr<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shape())
    }
}
