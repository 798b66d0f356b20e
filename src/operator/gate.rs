// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Time-order gate: per-key queue of events waiting for a watermark.
//!
//! Events are bucketed by timestamp. A watermark `w` releases every bucket
//! with timestamp `<= w` in ascending order; inside a bucket the events keep
//! arrival order unless a comparator is configured.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::event::sort_same_timestamp;

/// Tie-breaker for events sharing a timestamp.
pub type EventComparator<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// Events of one key ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueue<E> {
    buckets: BTreeMap<i64, Vec<E>>,
    len: usize,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    /// Empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
            len: 0,
        }
    }

    /// Buffers `event`.
    pub fn push(&mut self, timestamp: i64, event: E) {
        self.buckets.entry(timestamp).or_default().push(event);
        self.len += 1;
    }

    /// Number of buffered events.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is buffered.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest buffered timestamp.
    pub fn earliest(&self) -> Option<i64> {
        self.buckets.keys().next().copied()
    }

    /// Removes and returns every bucket with timestamp `<= watermark`, in
    /// ascending timestamp order, each sorted with `comparator` when given.
    pub fn release(
        &mut self,
        watermark: i64,
        comparator: Option<&EventComparator<E>>,
    ) -> Vec<(i64, Vec<E>)> {
        let pending = match watermark.checked_add(1) {
            Some(bound) => self.buckets.split_off(&bound),
            None => BTreeMap::new(),
        };
        let ready = std::mem::replace(&mut self.buckets, pending);
        ready
            .into_iter()
            .map(|(timestamp, mut events)| {
                self.len -= events.len();
                sort_same_timestamp(&mut events, comparator.map(|c| &**c));
                (timestamp, events)
            })
            .collect()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn release_is_ordered_and_complete(
            timestamps in prop::collection::vec(0i64..50, 0..64),
            watermark in 0i64..60,
        ) {
            let mut queue = EventQueue::new();
            for (arrival, ts) in timestamps.iter().enumerate() {
                queue.push(*ts, (*ts, arrival));
            }
            let released = queue.release(watermark, None);

            let flat: Vec<(i64, usize)> = released.iter().flat_map(|(_, events)| events.iter().copied()).collect();
            prop_assert!(flat.iter().all(|(ts, _)| *ts <= watermark));
            prop_assert!(flat.windows(2).all(|w| w[0] < w[1]), "ordered by timestamp then arrival");
            prop_assert!(released.iter().all(|(ts, events)| events.iter().all(|(t, _)| t == ts)));

            let expected = timestamps.iter().filter(|ts| **ts <= watermark).count();
            prop_assert_eq!(flat.len(), expected);
            prop_assert_eq!(queue.len(), timestamps.len() - expected);
            prop_assert!(queue.earliest().map_or(true, |ts| ts > watermark));
        }
    }
}
