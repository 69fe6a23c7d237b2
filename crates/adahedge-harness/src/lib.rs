//! Conformance and determinism tooling for adahedge.
//!
//! This crate provides:
//! - Fixture verify: compare forecasts against reference outputs
//! - Determinism gate: bit-identical reruns plus forecaster invariants
//! - Structured JSONL logging with an artifact index
//! - Single-table runs for ad-hoc inspection

#![forbid(unsafe_code)]

pub mod determinism;
pub mod error;
pub mod fixtures;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{Expected, FixtureCase, FixtureSet, LossInput};
pub use runner::{RunOutput, run_table};
pub use verify::{CaseResult, VerificationReport, verify_fixture_set};
