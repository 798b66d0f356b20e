// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Live partial matches and the per-key runtime state.

use serde::{Deserialize, Serialize};

use crate::common::event::EventId;
use crate::nfa::dewey::DeweyNumber;
use crate::nfa::shared_buffer::NodeRef;
use crate::nfa::state::StateId;

/// Sort key of a computation state that has not accepted any event yet.
const UNSTARTED: EventId = EventId::new(i64::MAX, u64::MAX);

/// One partial match positioned at one automaton state.
///
/// Loop iteration counts are not stored: quantifiers are unrolled into
/// distinct states at compile time, so the state id already encodes how many
/// occurrences were accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationState {
    /// Current automaton state.
    pub state: StateId,
    /// Last accepted event in the shared buffer, `None` before the first.
    pub previous_entry: Option<NodeRef>,
    /// Branch version.
    pub version: DeweyNumber,
    /// Timestamp of the first accepted event, `-1` before the first.
    pub start_timestamp: i64,
    /// Timestamp of the last accepted event, `-1` before the first.
    pub previous_timestamp: i64,
    /// First accepted event.
    pub start_event: Option<EventId>,
}

impl ComputationState {
    /// Fresh state at the automaton's start.
    #[must_use]
    pub const fn start(state: StateId, version: DeweyNumber) -> Self {
        Self {
            state,
            previous_entry: None,
            version,
            start_timestamp: -1,
            previous_timestamp: -1,
            start_event: None,
        }
    }

    /// Ordering key: the start event, unstarted states last.
    #[must_use]
    pub fn sort_key(&self) -> EventId {
        self.start_event.unwrap_or(UNSTARTED)
    }
}

/// Stable sort by start event.
pub(crate) fn sort_by_start(states: &mut [ComputationState]) {
    states.sort_by_key(ComputationState::sort_key);
}

/// Per-key runtime state: live partial matches and completed matches held
/// back by the skip strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfaState {
    pub(crate) partial_matches: Vec<ComputationState>,
    pub(crate) completed_matches: Vec<ComputationState>,
}

impl NfaState {
    pub(crate) fn new(partial_matches: Vec<ComputationState>) -> Self {
        Self {
            partial_matches,
            completed_matches: Vec::new(),
        }
    }

    /// Live partial matches ordered by start event.
    pub fn partial_matches(&self) -> &[ComputationState] {
        &self.partial_matches
    }

    /// Completed matches waiting for earlier partial matches to resolve.
    pub fn completed_matches(&self) -> &[ComputationState] {
        &self.completed_matches
    }

    /// True when nothing but unstarted states is alive.
    pub fn is_idle(&self) -> bool {
        self.completed_matches.is_empty()
            && self.partial_matches.iter().all(|s| s.start_event.is_none())
    }

    /// Every buffer reference held by a live or completed state.
    pub fn held_references(&self) -> Vec<NodeRef> {
        self.partial_matches
            .iter()
            .chain(&self.completed_matches)
            .filter_map(|s| s.previous_entry)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(ts: i64, seq: u64) -> ComputationState {
        ComputationState {
            start_event: Some(EventId::new(ts, seq)),
            start_timestamp: ts,
            previous_timestamp: ts,
            previous_entry: Some(NodeRef {
                entry: seq as u32,
                edge: 0,
            }),
            ..ComputationState::start(StateId(1), DeweyNumber::default())
        }
    }

    #[test]
    fn test_unstarted_sorts_last() {
        let mut states = vec![
            ComputationState::start(StateId(0), DeweyNumber::default()),
            started(20, 2),
            started(10, 1),
        ];
        sort_by_start(&mut states);
        assert_eq!(states[0].start_timestamp, 10);
        assert_eq!(states[1].start_timestamp, 20);
        assert!(states[2].start_event.is_none());
    }

    #[test]
    fn test_idle_and_references() {
        let mut state = NfaState::new(vec![ComputationState::start(StateId(0), DeweyNumber::default())]);
        assert!(state.is_idle());
        assert!(state.held_references().is_empty());
        state.partial_matches.push(started(5, 3));
        assert!(!state.is_idle());
        assert_eq!(state.held_references(), vec![NodeRef { entry: 3, edge: 0 }]);
    }
}
