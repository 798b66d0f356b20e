// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Keyed event-time operator.
//!
//! [`CepOperator`] owns one compiled [`Nfa`] and, per key, a time-order gate,
//! the computation states and the shared buffer. Events are buffered until a
//! watermark confirms that no earlier event can arrive; they are then fed to
//! the runtime in timestamp order. Timeouts are evaluated on watermarks, never
//! on a wall clock.
//!
//! # Watermark step
//!
//! For every key, each buffered timestamp `t <= w` is handled in ascending
//! order: time is advanced to `t` (expiring partial matches), then the events
//! stamped `t` are processed. Finally time is advanced to `w` itself. Keys
//! left with nothing but a fresh Start state are dropped.
//!
//! An event stamped before the last watermark is late: it is never matched
//! and goes to [`MatchSink::on_late`].
//!
//! # Example
//!
//! ```
//! use cep::config::CepConfig;
//! use cep::operator::{CepOperator, CollectingSink};
//! use cep::pattern::{Pattern, SimpleCondition};
//!
//! let pattern: Pattern<String> = Pattern::begin("login")
//!     .filter(SimpleCondition::new(|e: &String| e == "login"))
//!     .followed_by("purchase")
//!     .filter(SimpleCondition::new(|e: &String| e == "purchase"));
//! let mut operator = CepOperator::new(&pattern, CepConfig::default()).unwrap();
//! let mut sink = CollectingSink::default();
//!
//! // out of order: the gate sorts by timestamp
//! operator.process_element("user-1", "purchase".to_string(), 20, &mut sink);
//! operator.process_element("user-1", "login".to_string(), 10, &mut sink);
//! operator.process_watermark(30, &mut sink).unwrap();
//!
//! assert_eq!(sink.matches.len(), 1);
//! assert_eq!(sink.matches[0].0, "user-1");
//! ```

pub mod gate;
pub mod snapshot;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::timestamp::{SystemTimerService, TimerService};
use crate::config::CepConfig;
use crate::error::{CepError, NfaError, SnapshotError};
use crate::nfa::output::{Match, TimedOutMatch};
use crate::nfa::runtime::Nfa;
use crate::pattern::Pattern;

pub use gate::{EventComparator, EventQueue};
pub use snapshot::KeyState;

/// Receives the operator's output.
pub trait MatchSink<K, E> {
    /// A completed match.
    fn on_match(&mut self, key: &K, matched: Match<E>);

    /// A partial match whose time bound expired.
    fn on_timeout(&mut self, key: &K, timed_out: TimedOutMatch<E>) {
        let _ = (key, timed_out);
    }

    /// An event stamped before the current watermark. Dropped with a warning
    /// unless overridden.
    fn on_late(&mut self, key: &K, event: E, timestamp: i64) {
        let _ = (key, event);
        warn!("dropping late event stamped {timestamp}");
    }
}

/// [`MatchSink`] that keeps everything it receives.
#[derive(Debug, Clone)]
pub struct CollectingSink<K, E> {
    /// Completed matches in emission order.
    pub matches: Vec<(K, Match<E>)>,
    /// Timed-out partial matches in emission order.
    pub timeouts: Vec<(K, TimedOutMatch<E>)>,
    /// Late events with their timestamps.
    pub late: Vec<(K, E, i64)>,
}

impl<K, E> Default for CollectingSink<K, E> {
    fn default() -> Self {
        Self {
            matches: Vec::new(),
            timeouts: Vec::new(),
            late: Vec::new(),
        }
    }
}

impl<K: Clone, E> MatchSink<K, E> for CollectingSink<K, E> {
    fn on_match(&mut self, key: &K, matched: Match<E>) {
        self.matches.push((key.clone(), matched));
    }

    fn on_timeout(&mut self, key: &K, timed_out: TimedOutMatch<E>) {
        self.timeouts.push((key.clone(), timed_out));
    }

    fn on_late(&mut self, key: &K, event: E, timestamp: i64) {
        self.late.push((key.clone(), event, timestamp));
    }
}

/// Keyed pattern-matching operator driven by watermarks.
pub struct CepOperator<K, E> {
    nfa: Nfa<E>,
    config: CepConfig,
    comparator: Option<EventComparator<E>>,
    timer: Arc<dyn TimerService + Send + Sync>,
    keys: HashMap<K, KeyState<E>>,
    watermark: i64,
}

impl<K, E> CepOperator<K, E>
where
    K: Eq + Hash + Clone,
    E: Clone,
{
    /// Compiles `pattern` and creates an operator with no keys.
    pub fn new(pattern: &Pattern<E>, config: CepConfig) -> Result<Self, CepError> {
        let nfa = Nfa::compile(pattern, config.emit_timeouts)?.with_max_partial_matches(config.max_partial_matches);
        debug!(
            "operator ready: window {}ms, timeouts {}",
            nfa.window(),
            config.emit_timeouts
        );
        Ok(Self {
            nfa,
            config,
            comparator: None,
            timer: Arc::new(SystemTimerService),
            keys: HashMap::new(),
            watermark: i64::MIN,
        })
    }

    /// Orders events sharing a timestamp. Without it, arrival order is kept.
    #[must_use]
    pub fn with_comparator(mut self, comparator: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static) -> Self {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    /// Source of processing time handed to conditions.
    #[must_use]
    pub fn with_timer_service(mut self, timer: Arc<dyn TimerService + Send + Sync>) -> Self {
        self.timer = timer;
        self
    }

    /// The compiled runtime.
    pub const fn nfa(&self) -> &Nfa<E> {
        &self.nfa
    }

    /// The configuration in use.
    pub const fn config(&self) -> &CepConfig {
        &self.config
    }

    /// Last watermark, `i64::MIN` before the first.
    pub const fn current_watermark(&self) -> i64 {
        self.watermark
    }

    /// Number of keys with live state.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// State kept for `key`, if any.
    pub fn key_state(&self, key: &K) -> Option<&KeyState<E>> {
        self.keys.get(key)
    }

    /// Buffers an event, or hands it to [`MatchSink::on_late`] when it is
    /// stamped before the current watermark.
    pub fn process_element(&mut self, key: K, event: E, timestamp: i64, out: &mut dyn MatchSink<K, E>) {
        if timestamp < self.watermark {
            trace!("late event stamped {timestamp} behind watermark {}", self.watermark);
            out.on_late(&key, event, timestamp);
            return;
        }
        let nfa = &self.nfa;
        self.keys
            .entry(key)
            .or_insert_with(|| KeyState::new(nfa.create_initial_state()))
            .queue
            .push(timestamp, event);
    }

    /// Advances the watermark and runs every key up to it.
    ///
    /// A watermark not above the current one still drains and advances the
    /// keys, but never moves the watermark back. On error, processing stops
    /// at the failing key. The event that raised the error is dropped; the
    /// events of that key not yet processed go back to its gate, and other
    /// keys keep their queues, so the next watermark resumes from there.
    pub fn process_watermark(&mut self, watermark: i64, out: &mut dyn MatchSink<K, E>) -> Result<(), CepError> {
        if watermark < self.watermark {
            trace!("ignoring watermark {watermark} behind {}", self.watermark);
            return Ok(());
        }
        self.watermark = watermark;
        let nfa = &self.nfa;
        let timer = self.timer.as_ref();

        for (key, state) in &mut self.keys {
            let mut ready = state.queue.release(watermark, self.comparator.as_ref()).into_iter();
            while let Some((timestamp, events)) = ready.next() {
                let mut events = events.into_iter();
                if let Err(err) = feed_bucket(nfa, timer, key, state, timestamp, &mut events, out) {
                    // the failing event is consumed; everything after it goes back to the gate
                    let requeued = requeue(state, timestamp, events, ready);
                    warn!("watermark {watermark} failed at {timestamp}, {requeued} events requeued: {err}");
                    return Err(err.into());
                }
            }
            let (matches, timeouts) = nfa.advance_time(&mut state.nfa_state, &mut state.buffer, watermark)?;
            emit(out, key, matches, timeouts);
            if self.config.compact_on_watermark {
                let removed = state.buffer.prune(watermark);
                if removed > 0 {
                    trace!("compaction removed {removed} buffer items");
                }
            }
        }

        let before = self.keys.len();
        self.keys.retain(|_, state| !state.is_idle());
        if before != self.keys.len() {
            trace!("dropped {} idle keys", before - self.keys.len());
        }
        Ok(())
    }

    /// Serialises the whole operator state.
    pub fn snapshot(&self) -> Result<Vec<u8>, SnapshotError>
    where
        K: Serialize,
        E: Serialize,
    {
        snapshot::encode(self.nfa.automaton().fingerprint(), self.watermark, &self.keys)
    }

    /// Replaces the operator state with a snapshot taken by an operator
    /// compiled from the same pattern. Nothing changes on error.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), SnapshotError>
    where
        K: DeserializeOwned,
        E: DeserializeOwned,
    {
        let restored = snapshot::decode(bytes, self.nfa.automaton())?;
        debug!(
            "restored {} keys at watermark {}",
            restored.keys.len(),
            restored.watermark
        );
        self.watermark = restored.watermark;
        self.keys = restored.keys;
        Ok(())
    }
}

fn feed_bucket<K, E: Clone>(
    nfa: &Nfa<E>,
    timer: &dyn TimerService,
    key: &K,
    state: &mut KeyState<E>,
    timestamp: i64,
    events: &mut impl Iterator<Item = E>,
    out: &mut dyn MatchSink<K, E>,
) -> Result<(), NfaError> {
    let (matches, timeouts) = nfa.advance_time(&mut state.nfa_state, &mut state.buffer, timestamp)?;
    emit(out, key, matches, timeouts);
    for event in events {
        let matches = nfa.process(&mut state.nfa_state, &mut state.buffer, event, timestamp, timer)?;
        emit(out, key, matches, Vec::new());
    }
    Ok(())
}

fn requeue<E>(
    state: &mut KeyState<E>,
    timestamp: i64,
    events: impl Iterator<Item = E>,
    later: impl Iterator<Item = (i64, Vec<E>)>,
) -> usize {
    let before = state.queue.len();
    for event in events {
        state.queue.push(timestamp, event);
    }
    for (timestamp, bucket) in later {
        for event in bucket {
            state.queue.push(timestamp, event);
        }
    }
    state.queue.len() - before
}

fn emit<K, E>(out: &mut dyn MatchSink<K, E>, key: &K, matches: Vec<Match<E>>, timeouts: Vec<TimedOutMatch<E>>) {
    for timed_out in timeouts {
        out.on_timeout(key, timed_out);
    }
    for matched in matches {
        out.on_match(key, matched);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::timestamp::FixedTimerService;
    use crate::error::ConditionError;
    use crate::pattern::{IterativeCondition, SimpleCondition};

    fn is(name: &'static str) -> SimpleCondition<impl Fn(&String) -> bool> {
        SimpleCondition::new(move |e: &String| e.starts_with(name))
    }

    fn a_then_b() -> Pattern<String> {
        Pattern::begin("a").filter(is("a")).followed_by("b").filter(is("b"))
    }

    fn names(m: &Match<String>) -> Vec<&str> {
        m.events().map(String::as_str).collect()
    }

    fn operator(pattern: &Pattern<String>) -> CepOperator<u32, String> {
        CepOperator::new(pattern, CepConfig::default())
            .unwrap()
            .with_timer_service(Arc::new(FixedTimerService(0)))
    }

    #[test]
    fn test_events_wait_for_watermark() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_element(1, "a".into(), 1, &mut sink);
        op.process_element(1, "b".into(), 2, &mut sink);
        assert!(sink.matches.is_empty());
        assert_eq!(op.key_state(&1).unwrap().queue().len(), 2);

        op.process_watermark(1, &mut sink).unwrap();
        assert!(sink.matches.is_empty());
        op.process_watermark(2, &mut sink).unwrap();
        assert_eq!(sink.matches.len(), 1);
        assert_eq!(names(&sink.matches[0].1), vec!["a", "b"]);
    }

    #[test]
    fn test_out_of_order_events_are_sorted() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_element(1, "b".into(), 20, &mut sink);
        op.process_element(1, "a".into(), 10, &mut sink);
        op.process_watermark(25, &mut sink).unwrap();
        assert_eq!(sink.matches.len(), 1);
        assert_eq!(op.key_count(), 0);
    }

    #[test]
    fn test_late_events_are_diverted() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_watermark(10, &mut sink).unwrap();
        op.process_element(1, "a".into(), 9, &mut sink);
        op.process_element(1, "a".into(), 10, &mut sink);
        assert_eq!(sink.late, vec![(1, "a".to_string(), 9)]);
        assert_eq!(op.key_state(&1).unwrap().queue().len(), 1);
    }

    #[test]
    fn test_watermark_never_moves_back() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_watermark(10, &mut sink).unwrap();
        op.process_watermark(5, &mut sink).unwrap();
        assert_eq!(op.current_watermark(), 10);
    }

    #[test]
    fn test_keys_are_isolated() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_element(1, "a".into(), 1, &mut sink);
        op.process_element(2, "b".into(), 2, &mut sink);
        op.process_watermark(5, &mut sink).unwrap();
        assert!(sink.matches.is_empty());
        op.process_element(2, "a".into(), 6, &mut sink);
        op.process_element(1, "b".into(), 7, &mut sink);
        op.process_element(2, "b".into(), 8, &mut sink);
        op.process_watermark(10, &mut sink).unwrap();
        let mut keys: Vec<u32> = sink.matches.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn test_comparator_orders_equal_timestamps() {
        let strict = Pattern::begin("a").filter(is("a")).next("b").filter(is("b"));
        let mut sink = CollectingSink::default();

        let mut arrival = operator(&strict);
        arrival.process_element(1, "b".into(), 5, &mut sink);
        arrival.process_element(1, "a".into(), 5, &mut sink);
        arrival.process_watermark(5, &mut sink).unwrap();
        assert!(sink.matches.is_empty());

        let mut sorted = operator(&strict).with_comparator(|x: &String, y: &String| x.cmp(y));
        sorted.process_element(1, "b".into(), 5, &mut sink);
        sorted.process_element(1, "a".into(), 5, &mut sink);
        sorted.process_watermark(5, &mut sink).unwrap();
        assert_eq!(sink.matches.len(), 1);
    }

    #[test]
    fn test_timeout_on_watermark() {
        let pattern = a_then_b().within(Duration::from_millis(10));
        let mut op = operator(&pattern);
        let mut sink = CollectingSink::default();
        op.process_element(7, "a".into(), 100, &mut sink);
        op.process_watermark(109, &mut sink).unwrap();
        assert!(sink.timeouts.is_empty());
        op.process_watermark(110, &mut sink).unwrap();
        assert_eq!(sink.timeouts.len(), 1);
        let (key, timed_out) = &sink.timeouts[0];
        assert_eq!(*key, 7);
        assert_eq!(timed_out.timeout_timestamp, 110);
        assert_eq!(timed_out.partial.get("a").map(<[String]>::len), Some(1));
        assert_eq!(op.key_count(), 0);
    }

    #[test]
    fn test_event_after_window_times_out_first() {
        let pattern = a_then_b().within(Duration::from_millis(10));
        let mut op = operator(&pattern);
        let mut sink = CollectingSink::default();
        op.process_element(1, "a".into(), 0, &mut sink);
        op.process_element(1, "b".into(), 10, &mut sink);
        op.process_watermark(20, &mut sink).unwrap();
        assert!(sink.matches.is_empty());
        assert_eq!(sink.timeouts.len(), 1);
    }

    #[test]
    fn test_timeouts_can_be_disabled() {
        let pattern = a_then_b().within(Duration::from_millis(10));
        let config = CepConfig {
            emit_timeouts: false,
            ..CepConfig::default()
        };
        let mut op: CepOperator<u32, String> = CepOperator::new(&pattern, config).unwrap();
        let mut sink = CollectingSink::default();
        op.process_element(1, "a".into(), 0, &mut sink);
        op.process_watermark(50, &mut sink).unwrap();
        assert!(sink.timeouts.is_empty());
        assert_eq!(op.key_count(), 0);
    }

    #[test]
    fn test_condition_error_surfaces() {
        let failing = IterativeCondition::new(
            |e: &String, _ctx: &mut crate::pattern::ConditionContext<'_, String>| -> Result<bool, ConditionError> {
                if e == "bad" {
                    Err(ConditionError::new("bad event"))
                } else {
                    Ok(true)
                }
            },
        );
        let pattern = Pattern::begin("a").filter(failing);
        let mut op = operator(&pattern);
        let mut sink = CollectingSink::default();
        op.process_element(1, "bad".into(), 1, &mut sink);
        let err = op.process_watermark(1, &mut sink).unwrap_err();
        assert!(matches!(err, CepError::Nfa(NfaError::Condition(_))));
    }

    #[test]
    fn test_failed_watermark_requeues_remaining_events() {
        let failing = IterativeCondition::new(
            |e: &String, _ctx: &mut crate::pattern::ConditionContext<'_, String>| -> Result<bool, ConditionError> {
                if e == "bad" {
                    Err(ConditionError::new("bad event"))
                } else {
                    Ok(e.starts_with('a'))
                }
            },
        );
        let pattern = Pattern::begin("a").filter(failing);
        let mut op = operator(&pattern);
        let mut sink = CollectingSink::default();
        op.process_element(1, "bad".into(), 1, &mut sink);
        op.process_element(1, "a1".into(), 1, &mut sink);
        op.process_element(1, "a2".into(), 2, &mut sink);

        assert!(op.process_watermark(2, &mut sink).is_err());
        assert!(sink.matches.is_empty());
        assert_eq!(op.key_state(&1).unwrap().queue().len(), 2);
        assert_eq!(op.key_state(&1).unwrap().queue().earliest(), Some(1));

        op.process_watermark(3, &mut sink).unwrap();
        let mut matched: Vec<Vec<&str>> = sink.matches.iter().map(|(_, m)| names(m)).collect();
        matched.sort();
        assert_eq!(matched, vec![vec!["a1"], vec!["a2"]]);
        assert_eq!(op.key_count(), 0);
    }

    #[test]
    fn test_snapshot_restore_resumes_matching() {
        let mut op = operator(&a_then_b());
        let mut sink = CollectingSink::default();
        op.process_element(1, "a".into(), 1, &mut sink);
        op.process_watermark(1, &mut sink).unwrap();
        op.process_element(1, "b".into(), 5, &mut sink);
        let bytes = op.snapshot().unwrap();

        let mut restored = operator(&a_then_b());
        restored.restore(&bytes).unwrap();
        assert_eq!(restored.current_watermark(), 1);
        assert_eq!(restored.key_count(), 1);
        restored.process_watermark(5, &mut sink).unwrap();
        assert_eq!(sink.matches.len(), 1);
        assert_eq!(names(&sink.matches[0].1), vec!["a", "b"]);
    }

    #[test]
    fn test_restore_rejects_other_pattern() {
        let op = operator(&a_then_b());
        let bytes = op.snapshot().unwrap();
        let other = Pattern::begin("a").filter(is("a")).next("b").filter(is("b"));
        let mut restored = operator(&other);
        let err = restored.restore(&bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::IncompatibleAutomaton { .. }));
        assert_eq!(restored.current_watermark(), i64::MIN);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let pattern: Pattern<String> = Pattern::begin("a").followed_by("a");
        assert!(matches!(
            CepOperator::<u32, String>::new(&pattern, CepConfig::default()),
            Err(CepError::Definition(_))
        ));
    }
}
