// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/duckdb-behavioral)

//! Common types and utilities shared across the pattern model, the NFA and the operator.

pub mod event;
pub mod timestamp;
