//! Shape validation errors.
//!
//! The recurrence has exactly one failure kind: the loss table does not have
//! the shape of an expert-advice problem. Numeric edge cases (ties, zero
//! accumulated gap, extreme magnitudes, empty horizon) are handled by the
//! evaluator and never surface here.

use thiserror::Error;

/// The loss table cannot be interpreted as `T` rows of `K >= 2` expert losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidShape {
    /// Fewer than two experts. Blending a single expert is not advice.
    #[error("loss table second dimension must be >= 2 (got {experts} experts)")]
    TooFewExperts { experts: usize },
    /// A row has a different number of losses than the first row.
    #[error("loss row {row} has {found} entries, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// A flat buffer does not divide into rows of `experts` entries.
    #[error("flat loss buffer of length {len} is not a multiple of {experts} experts")]
    FlatLength { len: usize, experts: usize },
}
