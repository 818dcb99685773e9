//! Shared test utilities for pdfedit integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with temp directories
//! - Builders for configurations and generated PDF fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FlakyTransform, TestHarness};
