// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Values emitted by the runtime.

use std::sync::Arc;

/// A completed match: events grouped by pattern name.
///
/// Groups appear in the order their first event was accepted; events inside
/// a group are in timestamp order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<E> {
    groups: Vec<(Arc<str>, Vec<E>)>,
}

impl<E> Match<E> {
    pub(crate) const fn new(groups: Vec<(Arc<str>, Vec<E>)>) -> Self {
        Self { groups }
    }

    /// Events accepted by the pattern `name`.
    pub fn get(&self, name: &str) -> Option<&[E]> {
        self.groups
            .iter()
            .find(|(page, _)| &**page == name)
            .map(|(_, events)| events.as_slice())
    }

    /// `(name, events)` pairs in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[E])> {
        self.groups
            .iter()
            .map(|(page, events)| (&**page, events.as_slice()))
    }

    /// Pattern names present in the match.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(page, _)| &**page)
    }

    /// All events, group by group.
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.groups.iter().flat_map(|(_, events)| events.iter())
    }

    /// Total number of events.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, events)| events.len()).sum()
    }

    /// True for an empty partial match.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the match.
    pub fn into_groups(self) -> Vec<(Arc<str>, Vec<E>)> {
        self.groups
    }
}

/// A partial match whose time bound expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutMatch<E> {
    /// Events accepted before the bound expired.
    pub partial: Match<E>,
    /// `start + window`: the instant the partial match expired.
    pub timeout_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let m = Match::new(vec![
            (Arc::from("a"), vec![1, 2]),
            (Arc::from("b"), vec![3]),
        ]);
        assert_eq!(m.get("a"), Some(&[1, 2][..]));
        assert_eq!(m.get("z"), None);
        assert_eq!(m.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.events().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(m.len(), 3);
        assert!(!m.is_empty());
        assert_eq!(m.iter().count(), 2);
    }

    #[test]
    fn test_empty() {
        let m: Match<i32> = Match::new(Vec::new());
        assert!(m.is_empty());
    }
}
