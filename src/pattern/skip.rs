// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! After-match skip strategies.
//!
//! Once a match is emitted, the strategy decides which other partial and
//! completed matches are discarded. Every strategy reduces to a *pruning id*
//! (an [`EventId`] taken from the emitted match) and a comparison between
//! that id and the start event of each candidate:
//!
//! | Strategy | Pruning id | Discarded when `start` is |
//! |---|---|---|
//! | `NoSkip` | none | never |
//! | `SkipToNext` | earliest event of the match | `<= id` |
//! | `SkipPastLastEvent` | latest event of the match | `<= id` |
//! | `SkipToFirst(p)` | first event of `p` | `< id` |
//! | `SkipToLast(p)` | last event of `p` | `< id` |

use serde::{Deserialize, Serialize};

use crate::common::event::EventId;
use crate::error::NfaError;
use crate::nfa::shared_buffer::EventPath;

/// Which strategy to apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipKind {
    /// Every match is emitted; nothing is discarded.
    NoSkip,
    /// Discard matches starting at or before the first event of the match.
    SkipToNext,
    /// Discard matches starting at or before the last event of the match.
    SkipPastLastEvent,
    /// Discard matches starting before the first event of the named pattern.
    SkipToFirst(String),
    /// Discard matches starting before the last event of the named pattern.
    SkipToLast(String),
}

/// After-match skip strategy attached to the root of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AfterMatchSkipStrategy {
    kind: SkipKind,
    throw_on_missing: bool,
}

impl AfterMatchSkipStrategy {
    /// Emits every match.
    #[must_use]
    pub const fn no_skip() -> Self {
        Self {
            kind: SkipKind::NoSkip,
            throw_on_missing: false,
        }
    }

    /// Discards partial matches that started with the same event as the match.
    #[must_use]
    pub const fn skip_to_next() -> Self {
        Self {
            kind: SkipKind::SkipToNext,
            throw_on_missing: false,
        }
    }

    /// Discards partial matches that started within the match.
    #[must_use]
    pub const fn skip_past_last_event() -> Self {
        Self {
            kind: SkipKind::SkipPastLastEvent,
            throw_on_missing: false,
        }
    }

    /// Discards partial matches that started before the first event of `name`.
    #[must_use]
    pub fn skip_to_first(name: impl Into<String>) -> Self {
        Self {
            kind: SkipKind::SkipToFirst(name.into()),
            throw_on_missing: false,
        }
    }

    /// Discards partial matches that started before the last event of `name`.
    #[must_use]
    pub fn skip_to_last(name: impl Into<String>) -> Self {
        Self {
            kind: SkipKind::SkipToLast(name.into()),
            throw_on_missing: false,
        }
    }

    /// Raise [`NfaError::SkipStrategyMiss`] instead of skipping nothing when
    /// the referenced pattern has no events in a match.
    #[must_use]
    pub fn throw_exception_on_miss(mut self) -> Self {
        self.throw_on_missing = true;
        self
    }

    /// The strategy kind.
    #[must_use]
    pub const fn kind(&self) -> &SkipKind {
        &self.kind
    }

    /// Whether a missing reference is an error.
    #[must_use]
    pub const fn throws_on_missing(&self) -> bool {
        self.throw_on_missing
    }

    /// False only for `NoSkip`.
    #[must_use]
    pub const fn is_skip_strategy(&self) -> bool {
        !matches!(self.kind, SkipKind::NoSkip)
    }

    /// Name of the referenced pattern for `SkipToFirst` / `SkipToLast`.
    #[must_use]
    pub fn pattern_name(&self) -> Option<&str> {
        match &self.kind {
            SkipKind::SkipToFirst(name) | SkipKind::SkipToLast(name) => Some(name),
            _ => None,
        }
    }

    /// Computes the pruning id for an emitted match.
    ///
    /// `Ok(None)` means nothing is discarded.
    pub fn pruning_id(&self, path: &EventPath) -> Result<Option<EventId>, NfaError> {
        let all = || path.iter().flat_map(|(_, ids)| ids.iter().copied());
        let id = match &self.kind {
            SkipKind::NoSkip => None,
            SkipKind::SkipToNext => all().min(),
            SkipKind::SkipPastLastEvent => all().max(),
            SkipKind::SkipToFirst(name) => self.referenced(path, name)?.and_then(|ids| ids.first().copied()),
            SkipKind::SkipToLast(name) => self.referenced(path, name)?.and_then(|ids| ids.last().copied()),
        };
        Ok(id)
    }

    fn referenced<'p>(&self, path: &'p EventPath, name: &str) -> Result<Option<&'p [EventId]>, NfaError> {
        match path
            .iter()
            .find(|(page, ids)| &**page == name && !ids.is_empty())
        {
            Some((_, ids)) => Ok(Some(ids.as_slice())),
            None if self.throw_on_missing => Err(NfaError::SkipStrategyMiss {
                pattern: name.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Whether a match starting at `start` is discarded for `pruning_id`.
    ///
    /// Candidates that have not accepted any event are never discarded.
    #[must_use]
    pub fn should_prune(&self, start: Option<EventId>, pruning_id: EventId) -> bool {
        let Some(start) = start else {
            return false;
        };
        match self.kind {
            SkipKind::NoSkip => false,
            SkipKind::SkipToNext | SkipKind::SkipPastLastEvent => start <= pruning_id,
            SkipKind::SkipToFirst(_) | SkipKind::SkipToLast(_) => start < pruning_id,
        }
    }
}

impl Default for AfterMatchSkipStrategy {
    fn default() -> Self {
        Self::no_skip()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn id(ts: i64) -> EventId {
        EventId::new(ts, ts as u64)
    }

    fn path() -> EventPath {
        vec![
            (Arc::from("a"), vec![id(1)]),
            (Arc::from("b"), vec![id(2), id(3), id(4)]),
            (Arc::from("c"), vec![id(5)]),
        ]
    }

    #[test]
    fn test_no_skip_never_prunes() {
        let s = AfterMatchSkipStrategy::no_skip();
        assert!(!s.is_skip_strategy());
        assert_eq!(s.pruning_id(&path()).unwrap(), None);
        assert!(!s.should_prune(Some(id(0)), id(10)));
    }

    #[test]
    fn test_skip_to_next_uses_earliest_event() {
        let s = AfterMatchSkipStrategy::skip_to_next();
        let pruning = s.pruning_id(&path()).unwrap().unwrap();
        assert_eq!(pruning, id(1));
        assert!(s.should_prune(Some(id(1)), pruning));
        assert!(!s.should_prune(Some(id(2)), pruning));
    }

    #[test]
    fn test_skip_past_last_event_uses_latest_event() {
        let s = AfterMatchSkipStrategy::skip_past_last_event();
        let pruning = s.pruning_id(&path()).unwrap().unwrap();
        assert_eq!(pruning, id(5));
        assert!(s.should_prune(Some(id(5)), pruning));
        assert!(!s.should_prune(Some(id(6)), pruning));
    }

    #[test]
    fn test_skip_to_first_and_last_are_strict() {
        let first = AfterMatchSkipStrategy::skip_to_first("b");
        assert_eq!(first.pattern_name(), Some("b"));
        let pruning = first.pruning_id(&path()).unwrap().unwrap();
        assert_eq!(pruning, id(2));
        assert!(first.should_prune(Some(id(1)), pruning));
        assert!(!first.should_prune(Some(id(2)), pruning));

        let last = AfterMatchSkipStrategy::skip_to_last("b");
        assert_eq!(last.pruning_id(&path()).unwrap(), Some(id(4)));
    }

    #[test]
    fn test_missing_reference_falls_back_to_no_skip() {
        let s = AfterMatchSkipStrategy::skip_to_first("x");
        assert_eq!(s.pruning_id(&path()).unwrap(), None);
    }

    #[test]
    fn test_missing_reference_can_raise() {
        let s = AfterMatchSkipStrategy::skip_to_last("x").throw_exception_on_miss();
        assert!(s.throws_on_missing());
        let err = s.pruning_id(&path()).unwrap_err();
        assert!(matches!(err, NfaError::SkipStrategyMiss { pattern } if pattern == "x"));
    }

    #[test]
    fn test_unstarted_candidates_survive() {
        let s = AfterMatchSkipStrategy::skip_past_last_event();
        assert!(!s.should_prune(None, id(100)));
    }
}
