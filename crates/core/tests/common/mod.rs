//! Common test utilities and helpers for supervisor integration tests.
//!
//! This module provides shared functionality across the integration tests:
//! - The `dummy-basic.sh` launch fixture
//! - Supervisor configurations tuned for fast tests

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;
