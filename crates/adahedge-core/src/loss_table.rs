//! Rectangular `T × K` table of expert losses.

use crate::error::InvalidShape;

/// Row-major loss table: entry `(t, k)` is the loss of expert `k` at step `t`.
///
/// The table only guarantees rectangularity. The `K >= 2` precondition belongs
/// to the forecaster, so a one-column table can be built and then rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct LossTable {
    values: Vec<f64>,
    experts: usize,
}

impl LossTable {
    /// Build from a slice of rows. All rows must have the length of the first.
    ///
    /// An empty slice yields an empty table with zero experts; use
    /// [`LossTable::empty`] to keep the expert count for a zero-length horizon.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, InvalidShape> {
        let experts = rows.first().map_or(0, |r| r.as_ref().len());
        let mut values = Vec::with_capacity(rows.len() * experts);
        for (row, losses) in rows.iter().enumerate() {
            let losses = losses.as_ref();
            if losses.len() != experts {
                return Err(InvalidShape::RaggedRow {
                    row,
                    expected: experts,
                    found: losses.len(),
                });
            }
            values.extend_from_slice(losses);
        }
        Ok(Self { values, experts })
    }

    /// Build from a row-major buffer.
    pub fn from_flat(values: Vec<f64>, experts: usize) -> Result<Self, InvalidShape> {
        let fits = if experts == 0 {
            values.is_empty()
        } else {
            values.len() % experts == 0
        };
        if !fits {
            return Err(InvalidShape::FlatLength {
                len: values.len(),
                experts,
            });
        }
        Ok(Self { values, experts })
    }

    /// A table with `experts` columns and no rows.
    #[must_use]
    pub fn empty(experts: usize) -> Self {
        Self {
            values: Vec::new(),
            experts,
        }
    }

    /// Number of timesteps `T`.
    #[must_use]
    pub fn horizon(&self) -> usize {
        if self.experts == 0 {
            0
        } else {
            self.values.len() / self.experts
        }
    }

    /// Number of experts `K`.
    #[must_use]
    pub fn experts(&self) -> usize {
        self.experts
    }

    /// Loss row for step `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t >= horizon()`.
    #[must_use]
    pub fn row(&self, t: usize) -> &[f64] {
        &self.values[t * self.experts..(t + 1) * self.experts]
    }

    /// Iterate rows in time order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        // chunks_exact panics on a zero chunk size.
        self.values.chunks_exact(self.experts.max(1))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Row-major backing storage.
    #[must_use]
    pub fn as_flat(&self) -> &[f64] {
        &self.values
    }
}
