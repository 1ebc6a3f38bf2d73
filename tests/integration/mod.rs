//! Integration test suite for taskweave.
//!
//! These tests drive the public API end to end: planning goals, composing
//! and dispatching layers to mock workers, cancelling runs, and converging
//! replicated state.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Goal-to-result runs through the orchestrator
//! - `parallel_dispatch`: Layer concurrency and the worker bound
//! - `cancellation`: Cancellation and worker timeouts
//! - `replication`: CRDT convergence properties
//! - `evidence`: Evidence graph recording and replay
//! - `performance`: Layering and dispatch overhead thresholds
//!
//! # CI Compatibility
//!
//! Workers are in-process mocks and timing-sensitive tests run on paused
//! tokio time, so the suite needs no network and no wall-clock slack.


mod cancellation;
mod parallel_dispatch;
mod replication;
