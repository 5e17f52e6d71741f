// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the PrometheusReplica reconcile engine.
//!
//! These tests drive full reconcile passes WITHOUT requiring a live
//! Kubernetes cluster. The engine runs against `MockStore`, an in-memory
//! implementation of the production `ObjectStore` trait.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_second_pass_is_idempotent
//! ```
//!
//! ## Test Categories
//!
//! - **Pass lifecycle**: first pass, idempotent repeats, deletion
//! - **Persistence**: status is written only when its value changes
//! - **Failure handling**: materialize, observe and persist failures abort the pass
//! - **Concurrency**: passes for one instance never overlap

#[path = "../common/mod.rs"]
mod common;
mod reconcile_tests;
