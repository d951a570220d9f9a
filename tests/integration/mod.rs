//! Integration test suite for kanri.
//!
//! These tests exercise the engine surface end to end: task lifecycle,
//! dependency analysis, requirement parsing, search and trigger
//! dispatch. They verify that all components work together correctly.
//!
//! # Test Categories
//!
//! - `engine_e2e`: full engine operation scenarios
//! - `graph_properties`: randomized acyclicity and determinism checks
//! - `trigger_dispatch`: asynchronous trigger dispatch behavior
//!
//! # CI Compatibility
//!
//! All external effects go through a scripted executor; no network or
//! vendor APIs are touched, so the suite is safe to run in CI.

mod fixtures;

mod engine_e2e;
mod graph_properties;
mod trigger_dispatch;
