// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Compiled automaton and the runtime that drives it.
//!
//! | Module | Role |
//! |---|---|
//! | [`compiler`] | validates a [`Pattern`](crate::pattern::Pattern) and builds an [`Automaton`] |
//! | [`state`] | states, transitions and the automaton itself |
//! | [`shared_buffer`] | reference-counted store of accepted events |
//! | [`computation`] | computation states and per-key runtime state |
//! | [`dewey`] | branch version numbers |
//! | [`runtime`] | [`Nfa::process`] and [`Nfa::advance_time`] |
//! | [`output`] | [`Match`] and [`TimedOutMatch`] |
//!
//! # Example
//!
//! ```
//! use cep::common::timestamp::FixedTimerService;
//! use cep::nfa::{Nfa, SharedBuffer};
//! use cep::pattern::{Pattern, SimpleCondition};
//!
//! let pattern: Pattern<i64> = Pattern::begin("low")
//!     .filter(SimpleCondition::new(|v: &i64| *v < 10))
//!     .followed_by("high")
//!     .filter(SimpleCondition::new(|v: &i64| *v > 100));
//! let nfa = Nfa::compile(&pattern, false).unwrap();
//! let mut state = nfa.create_initial_state();
//! let mut buffer = SharedBuffer::new();
//! let timer = FixedTimerService(0);
//!
//! assert!(nfa.process(&mut state, &mut buffer, 5, 1, &timer).unwrap().is_empty());
//! assert!(nfa.process(&mut state, &mut buffer, 50, 2, &timer).unwrap().is_empty());
//! let matches = nfa.process(&mut state, &mut buffer, 500, 3, &timer).unwrap();
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].get("low"), Some(&[5][..]));
//! assert_eq!(matches[0].get("high"), Some(&[500][..]));
//! ```

pub mod compiler;
pub mod computation;
pub mod dewey;
pub mod output;
pub mod runtime;
pub mod shared_buffer;
pub mod state;

pub use compiler::compile;
pub use computation::{ComputationState, NfaState};
pub use dewey::DeweyNumber;
pub use output::{Match, TimedOutMatch};
pub use runtime::Nfa;
pub use shared_buffer::{EventPath, NodeRef, SharedBuffer};
pub use state::{Automaton, State, StateId, StateKind, Transition, TransitionAction, FINAL_STATE_NAME};
