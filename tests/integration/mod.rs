//! Integration test suite for qpar.
//!
//! These tests exercise the public API from a task list to a formatted
//! response: graph building, layering, layer-parallel execution, metrics
//! and the reference table interpreter.
//!
//! # Test Categories
//!
//! - `layering`: Plan shape on fixed and randomly generated graphs
//! - `parallel_execution`: Barriers, worker bounds and failure containment
//! - `performance`: Timing-based speedup and efficiency checks
//! - `query_e2e`: Full runs over an in-memory dataset
//!
//! Timing tests sleep for around 100ms per task; run with
//! `cargo test --test integration performance -- --nocapture` to see figures.

mod fixtures;

mod parallel_execution;
mod query_e2e;
