// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Opaque per-operator snapshots.
//!
//! A snapshot is a `bincode` blob holding the automaton fingerprint, the
//! current watermark and, for every key, its queued events, computation
//! states and shared buffer. Restoring checks the fingerprint first and then
//! that every computation state names a state of the running automaton.

use std::collections::HashMap;
use std::hash::Hash;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::nfa::computation::NfaState;
use crate::nfa::shared_buffer::SharedBuffer;
use crate::nfa::state::Automaton;
use crate::operator::gate::EventQueue;

/// Everything the operator keeps for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyState<E> {
    pub(crate) queue: EventQueue<E>,
    pub(crate) nfa_state: NfaState,
    pub(crate) buffer: SharedBuffer<E>,
}

impl<E> KeyState<E> {
    pub(crate) fn new(nfa_state: NfaState) -> Self {
        Self {
            queue: EventQueue::new(),
            nfa_state,
            buffer: SharedBuffer::new(),
        }
    }

    /// Events waiting for a watermark.
    pub const fn queue(&self) -> &EventQueue<E> {
        &self.queue
    }

    /// Computation states.
    pub const fn nfa_state(&self) -> &NfaState {
        &self.nfa_state
    }

    /// Shared buffer.
    pub const fn buffer(&self) -> &SharedBuffer<E> {
        &self.buffer
    }

    /// True when the key holds nothing but a fresh Start state.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.nfa_state.is_idle() && self.buffer.is_empty()
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a, K, E> {
    fingerprint: &'a str,
    watermark: i64,
    keys: Vec<(&'a K, &'a KeyState<E>)>,
}

#[derive(Deserialize)]
struct Snapshot<K, E> {
    fingerprint: String,
    watermark: i64,
    keys: Vec<(K, KeyState<E>)>,
}

/// Restored operator state.
pub(crate) struct Restored<K, E> {
    pub(crate) watermark: i64,
    pub(crate) keys: HashMap<K, KeyState<E>>,
}

pub(crate) fn encode<K, E>(
    fingerprint: &str,
    watermark: i64,
    keys: &HashMap<K, KeyState<E>>,
) -> Result<Vec<u8>, SnapshotError>
where
    K: Serialize,
    E: Serialize,
{
    let snapshot = SnapshotRef {
        fingerprint,
        watermark,
        keys: keys.iter().collect(),
    };
    Ok(bincode::serialize(&snapshot)?)
}

pub(crate) fn decode<K, E>(bytes: &[u8], automaton: &Automaton<E>) -> Result<Restored<K, E>, SnapshotError>
where
    K: DeserializeOwned + Eq + Hash,
    E: DeserializeOwned,
{
    let snapshot: Snapshot<K, E> = bincode::deserialize(bytes)?;
    if snapshot.fingerprint != automaton.fingerprint() {
        warn!(
            "rejecting snapshot taken with automaton {}, running {}",
            snapshot.fingerprint,
            automaton.fingerprint()
        );
        return Err(SnapshotError::IncompatibleAutomaton {
            expected: automaton.fingerprint().to_string(),
            found: snapshot.fingerprint,
        });
    }

    let states = automaton.states().len();
    for (_, key) in &snapshot.keys {
        let nfa_state = &key.nfa_state;
        for cs in nfa_state.partial_matches().iter().chain(nfa_state.completed_matches()) {
            if cs.state.index() >= states {
                warn!("rejecting snapshot: unknown automaton state {}", cs.state.index());
                return Err(SnapshotError::UnknownState(cs.state.index()));
            }
        }
    }

    Ok(Restored {
        watermark: snapshot.watermark,
        keys: snapshot.keys.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfa::compiler::compile;
    use crate::nfa::computation::ComputationState;
    use crate::nfa::dewey::DeweyNumber;
    use crate::nfa::state::StateId;
    use crate::pattern::Pattern;

    fn automaton(second: &str) -> Automaton<String> {
        compile(&Pattern::begin("a").followed_by(second)).unwrap()
    }

    fn keys(state: StateId) -> HashMap<u32, KeyState<String>> {
        let mut key = KeyState::new(NfaState::new(vec![ComputationState::start(state, DeweyNumber::default())]));
        key.queue.push(7, "queued".to_string());
        HashMap::from([(1, key)])
    }

    #[test]
    fn test_roundtrip() {
        let automaton = automaton("b");
        let bytes = encode(automaton.fingerprint(), 42, &keys(automaton.start())).unwrap();
        let restored: Restored<u32, String> = decode(&bytes, &automaton).unwrap();
        assert_eq!(restored.watermark, 42);
        let key = &restored.keys[&1];
        assert_eq!(key.queue().len(), 1);
        assert_eq!(key.nfa_state().partial_matches()[0].state, automaton.start());
    }

    #[test]
    fn test_rejects_other_automaton() {
        let taken = automaton("b");
        let running = automaton("c");
        let bytes = encode(taken.fingerprint(), 0, &keys(taken.start())).unwrap();
        let err = decode::<u32, String>(&bytes, &running).err().unwrap();
        assert!(matches!(err, SnapshotError::IncompatibleAutomaton { .. }));
    }

    #[test]
    fn test_rejects_unknown_state() {
        let automaton = automaton("b");
        let bytes = encode(automaton.fingerprint(), 0, &keys(StateId(99))).unwrap();
        let err = decode::<u32, String>(&bytes, &automaton).err().unwrap();
        assert!(matches!(err, SnapshotError::UnknownState(99)));
    }

    #[test]
    fn test_rejects_garbage() {
        let automaton = automaton("b");
        let err = decode::<u32, String>(b"\x01\x02", &automaton).err().unwrap();
        assert!(matches!(err, SnapshotError::Codec(_)));
    }
}
