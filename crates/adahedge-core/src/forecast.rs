//! Outputs of a forecasting run.

use crate::mixture::LearningRate;

/// Schema tag mixed into [`Forecast::digest`].
const DIGEST_DOMAIN: &[u8] = b"adahedge.forecast.v1";

/// Weights played and losses incurred over a whole loss table.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    experts: usize,
    /// Row-major `T × K`; row `t` is the distribution played before seeing loss row `t`.
    weights: Vec<f64>,
    /// Loss the learner incurred at each step.
    incurred: Vec<f64>,
    /// Final cumulative expert losses `L`.
    cumulative: Vec<f64>,
    /// Final accumulated mixability gap `Delta`.
    gap: f64,
}

impl Forecast {
    pub(crate) fn with_capacity(experts: usize, horizon: usize) -> Self {
        Self {
            experts,
            weights: Vec::with_capacity(experts * horizon),
            incurred: Vec::with_capacity(horizon),
            cumulative: vec![0.0; experts],
            gap: 0.0,
        }
    }

    pub(crate) fn push_step(&mut self, weights: &[f64], incurred: f64) {
        debug_assert_eq!(weights.len(), self.experts);
        self.weights.extend_from_slice(weights);
        self.incurred.push(incurred);
    }

    pub(crate) fn finish(&mut self, cumulative: &[f64], gap: f64) {
        self.cumulative.copy_from_slice(cumulative);
        self.gap = gap;
    }

    #[must_use]
    pub fn experts(&self) -> usize {
        self.experts
    }

    /// Number of steps `T`.
    #[must_use]
    pub fn horizon(&self) -> usize {
        self.incurred.len()
    }

    /// Row-major weight table `W`.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight row played at step `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t >= horizon()`.
    #[must_use]
    pub fn weight_row(&self, t: usize) -> &[f64] {
        &self.weights[t * self.experts..(t + 1) * self.experts]
    }

    /// Iterate weight rows in time order.
    pub fn weight_rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.weights.chunks_exact(self.experts.max(1))
    }

    /// Incurred-loss sequence `h`.
    #[must_use]
    pub fn incurred(&self) -> &[f64] {
        &self.incurred
    }

    /// Final cumulative expert losses.
    #[must_use]
    pub fn cumulative_losses(&self) -> &[f64] {
        &self.cumulative
    }

    /// Final accumulated mixability gap `Delta`.
    #[must_use]
    pub fn mixability_gap(&self) -> f64 {
        self.gap
    }

    /// Total loss suffered by the learner, `Σ h`.
    #[must_use]
    pub fn learner_loss(&self) -> f64 {
        self.incurred.iter().sum()
    }

    /// Index and cumulative loss of the best expert in hindsight (lowest index on ties).
    ///
    /// `None` only for a forecast over zero experts, which the forecaster never produces.
    #[must_use]
    pub fn best_expert(&self) -> Option<(usize, f64)> {
        self.cumulative
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (k, loss)| match best {
                Some((_, best_loss)) if best_loss <= loss => best,
                _ => Some((k, loss)),
            })
    }

    /// Learner loss minus the best expert's loss. Zero for an empty horizon.
    ///
    /// AdaHedge keeps this below `2 · mixability_gap()`.
    #[must_use]
    pub fn regret(&self) -> f64 {
        match self.best_expert() {
            Some((_, best)) => self.learner_loss() - best,
            None => 0.0,
        }
    }

    /// BLAKE3 digest of the shape and the exact bit patterns of `W`, `h` and `Delta`.
    ///
    /// Two runs over the same table must agree on this digest.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        *self.digest_hash().as_bytes()
    }

    /// [`Forecast::digest`] as lowercase hex.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        self.digest_hash().to_hex().to_string()
    }

    fn digest_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(&(self.experts as u64).to_le_bytes());
        hasher.update(&(self.horizon() as u64).to_le_bytes());
        for v in self.weights.iter().chain(&self.incurred) {
            hasher.update(&v.to_bits().to_le_bytes());
        }
        hasher.update(&self.gap.to_bits().to_le_bytes());
        hasher.finalize()
    }
}

/// Diagnostics for one transition of the recurrence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTrace {
    /// Zero-based timestep.
    pub step: usize,
    /// Rate used for both evaluator calls of this step.
    pub learning_rate: LearningRate,
    /// Mix loss before the step's losses were added.
    pub mix_loss_before: f64,
    /// Mix loss after the step's losses were added.
    pub mix_loss_after: f64,
    /// Loss incurred by the learner.
    pub incurred: f64,
    /// Clamped per-step gap `max(0, h - (M - M_prev))`.
    pub gap: f64,
    /// `Delta` after this step.
    pub cumulative_gap: f64,
}
