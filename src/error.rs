// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Structured error types.
//!
//! Errors are split by the phase that raises them:
//!
//! - [`DefinitionError`]: the pattern cannot be compiled. Fatal at startup.
//! - [`NfaError`]: processing of one event (or one watermark) failed for a key.
//! - [`SnapshotError`]: a checkpoint could not be written or restored.
//! - [`CepError`]: umbrella used by the keyed operator.

use thiserror::Error;

use crate::common::event::EventId;

/// A pattern definition that cannot be compiled into an automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    /// The pattern contains no nodes.
    #[error("pattern is empty")]
    EmptyPattern,

    /// Two nodes share a name.
    #[error("duplicate pattern name `{0}`; names must be unique")]
    DuplicateName(String),

    /// A node name contains the separator used for internal state names.
    #[error("pattern name `{name}` must not contain `{separator}`")]
    ReservedCharacter {
        /// Offending name.
        name: String,
        /// The reserved separator.
        separator: char,
    },

    /// A negated node directly follows an optional node.
    #[error("optional pattern `{optional}` cannot precede negated pattern `{negated}`")]
    OptionalBeforeNegation {
        /// Name of the optional node.
        optional: String,
        /// Name of the negated node.
        negated: String,
    },

    /// A sequence (or group body) starts with a negated node.
    #[error("a pattern sequence cannot begin with negated pattern `{0}`")]
    NegatedStart(String),

    /// A group body ends with a negated node.
    #[error("a group cannot end with negated pattern `{0}`")]
    NegatedGroupTail(String),

    /// `not_followed_by` ends the pattern but no time bound is set.
    #[error("`not_followed_by(\"{0}\")` cannot end a pattern without a time bound")]
    TrailingNegationWithoutWindow(String),

    /// The skip strategy references a node that does not exist.
    #[error("skip strategy references unknown pattern `{0}`")]
    UnknownSkipTarget(String),

    /// A quantifier was applied where it is not allowed.
    #[error("invalid quantifier on `{name}`: {reason}")]
    InvalidQuantifier {
        /// Node the quantifier was applied to.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A condition was attached where it is not allowed.
    #[error("invalid condition on `{name}`: {reason}")]
    InvalidCondition {
        /// Node the condition was attached to.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// The time bound is not a positive number of milliseconds.
    #[error("time bound on `{name}` must be positive, got {millis}ms")]
    InvalidWindow {
        /// Node the bound was attached to.
        name: String,
        /// The rejected bound.
        millis: i64,
    },
}

impl DefinitionError {
    pub(crate) fn quantifier(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidQuantifier {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn condition(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCondition {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error raised by a user condition. Never swallowed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("condition failed: {message}")]
pub struct ConditionError {
    /// Human-readable description supplied by the condition.
    pub message: String,
}

impl ConditionError {
    /// Creates a condition error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Inconsistency inside the shared buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BufferError {
    /// A reference points at a freed entry or edge.
    #[error("dangling buffer reference: entry {entry}, edge {edge}")]
    DanglingReference {
        /// Entry slot.
        entry: u32,
        /// Edge slot inside the entry.
        edge: u32,
    },

    /// An entry refers to an event that is no longer stored.
    #[error("event {0} is not stored in the buffer")]
    MissingEvent(EventId),
}

/// Failure while processing an event or advancing time for one key.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NfaError {
    /// A skip strategy referenced a pattern absent from the completed match.
    #[error("could not skip to `{pattern}`: no such element in the found match")]
    SkipStrategyMiss {
        /// The referenced pattern name.
        pattern: String,
    },

    /// A user condition failed.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// The shared buffer is inconsistent.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The configured limit on live partial matches was exceeded.
    #[error("too many partial matches: limit is {limit}")]
    TooManyPartialMatches {
        /// The configured limit.
        limit: usize,
    },
}

/// Failure while taking or restoring a snapshot.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The snapshot was taken with a different automaton.
    #[error("snapshot automaton {found} does not match compiled automaton {expected}")]
    IncompatibleAutomaton {
        /// Fingerprint of the running automaton.
        expected: String,
        /// Fingerprint stored in the snapshot.
        found: String,
    },

    /// The snapshot references a state the automaton does not have.
    #[error("snapshot references unknown automaton state {0}")]
    UnknownState(usize),

    /// Encoding or decoding failed.
    #[error("snapshot codec: {0}")]
    Codec(#[from] bincode::Error),
}

/// Umbrella error returned by [`crate::operator::CepOperator`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CepError {
    /// Pattern compilation failed.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Processing failed.
    #[error(transparent)]
    Nfa(#[from] NfaError),

    /// Snapshot or restore failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Configuration could not be parsed.
    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}
