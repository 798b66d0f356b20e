// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Event identity shared across the buffer, the runtime and the skip strategies.
//!
//! The engine never inspects user events. Each event accepted for processing is
//! assigned an [`EventId`] made of its timestamp and a per-buffer sequence
//! number. Ordering by `(timestamp, sequence)` equals processing order because
//! events reach the runtime in non-decreasing timestamp order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an event registered in a [`crate::nfa::SharedBuffer`].
///
/// `Ord` compares the timestamp first and the registration sequence second,
/// so two events with the same timestamp are ordered by arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    /// Event timestamp in milliseconds.
    pub timestamp: i64,
    /// Registration sequence number, unique within one buffer.
    pub sequence: u64,
}

impl EventId {
    /// Creates an event id.
    #[must_use]
    pub const fn new(timestamp: i64, sequence: u64) -> Self {
        Self {
            timestamp,
            sequence,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.timestamp, self.sequence)
    }
}

/// Stable-sorts events that share a timestamp with an optional comparator.
///
/// Without a comparator, or when the comparator reports two events equal,
/// arrival order is preserved. Already-ordered input is detected with a single
/// O(n) scan and left untouched.
pub fn sort_same_timestamp<E, F>(events: &mut [E], comparator: Option<F>)
where
    F: Fn(&E, &E) -> Ordering,
{
    let Some(cmp) = comparator else {
        return;
    };
    if events
        .windows(2)
        .all(|w| cmp(&w[0], &w[1]) != Ordering::Greater)
    {
        return;
    }
    events.sort_by(cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_orders_by_timestamp_then_sequence() {
        let a = EventId::new(100, 7);
        let b = EventId::new(200, 1);
        let c = EventId::new(200, 2);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_event_id_display() {
        assert_eq!(EventId::new(42, 3).to_string(), "42#3");
    }

    #[test]
    fn test_sort_without_comparator_keeps_arrival_order() {
        let mut events = vec![3, 1, 2];
        sort_same_timestamp::<i32, fn(&i32, &i32) -> Ordering>(&mut events, None);
        assert_eq!(events, vec![3, 1, 2]);
    }

    #[test]
    fn test_sort_with_comparator() {
        let mut events = vec![3, 1, 2];
        sort_same_timestamp(&mut events, Some(|a: &i32, b: &i32| a.cmp(b)));
        assert_eq!(events, vec![1, 2, 3]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut events = vec![(1, 'x'), (0, 'y'), (1, 'z'), (0, 'w')];
        sort_same_timestamp(&mut events, Some(|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0)));
        assert_eq!(events, vec![(0, 'y'), (0, 'w'), (1, 'x'), (1, 'z')]);
    }
}
