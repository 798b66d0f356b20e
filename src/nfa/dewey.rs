// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Dewey-decimal versions of computation states.
//!
//! Every time a computation state branches, the copies receive distinct
//! versions: `increase` bumps the last digit for siblings, `add_stage` opens a
//! new level for a state that moved to the next node. Two copies of the same
//! partial match therefore never share a version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version number such as `1.0.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeweyNumber(Vec<u32>);

impl DeweyNumber {
    /// Single-digit version.
    #[must_use]
    pub fn new(start: u32) -> Self {
        Self(vec![start])
    }

    /// Copy with the last digit increased by `times`.
    #[must_use]
    pub fn increase(&self, times: usize) -> Self {
        let mut digits = self.0.clone();
        if let Some(last) = digits.last_mut() {
            *last = last.saturating_add(u32::try_from(times).unwrap_or(u32::MAX));
        }
        Self(digits)
    }

    /// Copy with a trailing `0` stage.
    #[must_use]
    pub fn add_stage(&self) -> Self {
        let mut digits = self.0.clone();
        digits.push(0);
        Self(digits)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a version has at least one digit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digits from most to least significant.
    #[must_use]
    pub fn digits(&self) -> &[u32] {
        &self.0
    }
}

impl Default for DeweyNumber {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Display for DeweyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, digit) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increase_and_stage() {
        let v = DeweyNumber::default();
        assert_eq!(v.to_string(), "1");
        let sibling = v.increase(2);
        assert_eq!(sibling.to_string(), "3");
        let child = sibling.add_stage();
        assert_eq!(child.to_string(), "3.0");
        assert_eq!(child.increase(1).to_string(), "3.1");
        assert_eq!(child.len(), 2);
        assert_eq!(child.digits(), &[3, 0]);
    }

    #[test]
    fn test_increase_is_a_copy() {
        let v = DeweyNumber::new(4);
        let _ = v.increase(1);
        assert_eq!(v, DeweyNumber::new(4));
        assert_eq!(v.increase(0), v);
    }
}
