//! # `cep` — Complex Event Processing over Keyed Event Streams
//!
//! Detects sequences of events that satisfy a declarative pattern, in event
//! time, per key. Patterns are built with a fluent API, compiled into a
//! non-deterministic automaton, and run by an operator that sorts
//! out-of-order input behind watermarks.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pattern`] | Fluent pattern builder: contiguity, quantifiers, conditions, groups, skip strategies |
//! | [`nfa`] | Compiler, shared buffer, Dewey versions and the automaton runtime |
//! | [`operator`] | Per-key time-order gate, watermark handling, timeouts and snapshots |
//! | [`config`] | Operator settings, loadable from JSON |
//! | [`error`] | Error types of every layer |
//! | [`common`] | Event ids and time helpers shared by the layers above |
//!
//! ## Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use cep::{CepConfig, CepOperator, CollectingSink, Pattern, SimpleCondition};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Reading {
//!     celsius: f64,
//! }
//!
//! // two hot readings followed by a cool-down, all within a minute
//! let pattern = Pattern::begin("hot")
//!     .filter(SimpleCondition::new(|r: &Reading| r.celsius > 90.0))
//!     .times(2)
//!     .consecutive()
//!     .followed_by("cool")
//!     .filter(SimpleCondition::new(|r: &Reading| r.celsius < 60.0))
//!     .within(Duration::from_secs(60));
//!
//! let mut operator = CepOperator::new(&pattern, CepConfig::default()).unwrap();
//! let mut sink = CollectingSink::default();
//!
//! for (ts, celsius) in [(1_000, 95.0), (2_000, 97.0), (3_000, 75.0), (4_000, 50.0)] {
//!     operator.process_element("sensor-1", Reading { celsius }, ts, &mut sink);
//! }
//! operator.process_watermark(5_000, &mut sink).unwrap();
//!
//! assert_eq!(sink.matches.len(), 1);
//! let (_, matched) = &sink.matches[0];
//! assert_eq!(matched.get("hot").map(<[Reading]>::len), Some(2));
//! assert_eq!(matched.get("cool"), Some(&[Reading { celsius: 50.0 }][..]));
//! ```

pub mod common;
pub mod config;
pub mod error;
pub mod nfa;
pub mod operator;
pub mod pattern;

pub use config::CepConfig;
pub use error::{BufferError, CepError, ConditionError, DefinitionError, NfaError, SnapshotError};
pub use nfa::{Match, Nfa, TimedOutMatch};
pub use operator::{CepOperator, CollectingSink, MatchSink};
pub use pattern::{AfterMatchSkipStrategy, Condition, ConditionContext, IterativeCondition, Pattern, SimpleCondition};
