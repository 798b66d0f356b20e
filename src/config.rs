// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Operator configuration.

use serde::{Deserialize, Serialize};

use crate::error::CepError;

/// Settings of a [`crate::operator::CepOperator`].
///
/// Every field has a default, so a host configuration only lists what it
/// changes:
///
/// ```
/// use cep::config::CepConfig;
///
/// let config = CepConfig::from_json(r#"{ "max_partial_matches": 1000 }"#).unwrap();
/// assert_eq!(config.max_partial_matches, Some(1000));
/// assert!(config.emit_timeouts);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CepConfig {
    /// Report partial matches whose time bound expired.
    pub emit_timeouts: bool,
    /// Per-key limit on live partial matches. Exceeding it fails the event.
    pub max_partial_matches: Option<usize>,
    /// Compact each key's shared buffer after every watermark.
    pub compact_on_watermark: bool,
}

impl Default for CepConfig {
    fn default() -> Self {
        Self {
            emit_timeouts: true,
            max_partial_matches: None,
            compact_on_watermark: true,
        }
    }
}

impl CepConfig {
    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self, CepError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CepConfig::default();
        assert!(config.emit_timeouts);
        assert!(config.compact_on_watermark);
        assert_eq!(config.max_partial_matches, None);
        assert_eq!(CepConfig::from_json("{}").unwrap(), config);
    }

    #[test]
    fn test_overrides() {
        let config = CepConfig::from_json(r#"{"emit_timeouts": false, "compact_on_watermark": false}"#).unwrap();
        assert!(!config.emit_timeouts);
        assert!(!config.compact_on_watermark);
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        assert!(matches!(
            CepConfig::from_json(r#"{"emit_timeout": true}"#),
            Err(CepError::Config(_))
        ));
        assert!(CepConfig::from_json("not json").is_err());
    }
}
