// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Quantifiers and contiguity modes attached to pattern nodes.

use serde::{Deserialize, Serialize};

/// How a node relates to the events between it and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Contiguity {
    /// No gaps: the next event must match.
    Strict,
    /// Non-matching events are skipped; the first matching event is taken.
    Relaxed,
    /// Every matching event is both taken and skipped, branching the match.
    NonDeterministicRelaxed,
}

/// Shape of a quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    /// Exactly one event.
    Single,
    /// `from` or more events.
    Looping,
    /// Between `from` and `to` events.
    Times,
}

/// Repetition bounds. For looping quantifiers `to == from` and the upper bound
/// is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Times {
    /// Minimum number of occurrences.
    pub from: u32,
    /// Maximum number of occurrences (inclusive).
    pub to: u32,
}

impl Times {
    /// Exactly `n` occurrences.
    #[must_use]
    pub const fn exactly(n: u32) -> Self {
        Self { from: n, to: n }
    }
}

/// How often a node repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantifier {
    /// Shape of the quantifier.
    pub kind: QuantifierKind,
    /// Repetition bounds.
    pub times: Times,
    /// The node may match zero events.
    pub optional: bool,
    /// Prefer the longest match for looping or ranged nodes.
    pub greedy: bool,
    /// Contiguity between consecutive occurrences of the node itself.
    pub inner: Contiguity,
}

impl Quantifier {
    /// Single occurrence, not optional.
    #[must_use]
    pub const fn single() -> Self {
        Self {
            kind: QuantifierKind::Single,
            times: Times::exactly(1),
            optional: false,
            greedy: false,
            inner: Contiguity::Relaxed,
        }
    }

    /// Minimum number of occurrences (zero when optional).
    #[must_use]
    pub const fn min(&self) -> u32 {
        if self.optional {
            0
        } else {
            self.times.from
        }
    }

    /// Maximum number of occurrences, `None` when unbounded.
    #[must_use]
    pub const fn max(&self) -> Option<u32> {
        match self.kind {
            QuantifierKind::Looping => None,
            QuantifierKind::Single | QuantifierKind::Times => Some(self.times.to),
        }
    }

    /// True for looping and ranged quantifiers.
    #[must_use]
    pub const fn repeats(&self) -> bool {
        !matches!(self.kind, QuantifierKind::Single)
    }
}

impl Default for Quantifier {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bounds() {
        let q = Quantifier::single();
        assert_eq!(q.min(), 1);
        assert_eq!(q.max(), Some(1));
        assert!(!q.repeats());
    }

    #[test]
    fn test_looping_is_unbounded() {
        let q = Quantifier {
            kind: QuantifierKind::Looping,
            times: Times::exactly(2),
            ..Quantifier::single()
        };
        assert_eq!(q.min(), 2);
        assert_eq!(q.max(), None);
        assert!(q.repeats());
    }

    #[test]
    fn test_optional_min_is_zero() {
        let q = Quantifier {
            kind: QuantifierKind::Times,
            times: Times { from: 2, to: 4 },
            optional: true,
            ..Quantifier::single()
        };
        assert_eq!(q.min(), 0);
        assert_eq!(q.max(), Some(4));
    }
}
