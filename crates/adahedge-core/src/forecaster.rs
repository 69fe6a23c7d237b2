//! AdaHedge: exponential weights with a learning rate tuned by its own
//! mixability gap.
//!
//! Per step `t`, with cumulative losses `L` and accumulated gap `Delta`:
//! 1. `eta = ln(K) / Delta`, or `∞` while `Delta == 0` (Follow-The-Leader).
//! 2. `(w, M_prev) = mix(eta, L)`; `w` is the row played at `t`.
//! 3. `h = w · l_t`.
//! 4. `L += l_t`.
//! 5. `M = mix(eta, L).mix_loss` (same `eta`).
//! 6. `delta = max(0, h - (M - M_prev))`. The clamp absorbs rounding in the
//!    log-sum-exp; in exact arithmetic the gap is never negative.
//! 7. `Delta += delta`.
//!
//! Reference: S. de Rooij, T. van Erven, P. D. Grünwald, W. M. Koolen,
//! "Follow the Leader If You Can, Hedge If You Must", JMLR 15 (2014), Fig. 1.

use crate::error::InvalidShape;
use crate::forecast::{Forecast, StepTrace};
use crate::loss_table::LossTable;
use crate::mixture::{LearningRate, mix, mix_into};

/// Minimum number of experts for the problem to be expert advice.
pub const MIN_EXPERTS: usize = 2;

/// Streaming AdaHedge learner over a fixed set of experts.
#[derive(Debug, Clone)]
pub struct AdaHedge {
    experts: usize,
    /// Cumulative losses `L`.
    cumulative: Vec<f64>,
    /// Accumulated mixability gap `Delta`.
    gap: f64,
    steps: usize,
    /// Weights played at the most recent step.
    played: Vec<f64>,
    /// Sink for the discarded weights of the post-update evaluation.
    scratch: Vec<f64>,
}

impl AdaHedge {
    /// New learner with `L = 0` and `Delta = 0`.
    pub fn new(experts: usize) -> Result<Self, InvalidShape> {
        if experts < MIN_EXPERTS {
            return Err(InvalidShape::TooFewExperts { experts });
        }
        Ok(Self {
            experts,
            cumulative: vec![0.0; experts],
            gap: 0.0,
            steps: 0,
            played: vec![1.0 / experts as f64; experts],
            scratch: vec![0.0; experts],
        })
    }

    #[must_use]
    pub fn experts(&self) -> usize {
        self.experts
    }

    /// Number of loss rows observed so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Rate the next step will use.
    #[must_use]
    pub fn learning_rate(&self) -> LearningRate {
        LearningRate::from_gap(self.experts, self.gap)
    }

    /// Accumulated mixability gap `Delta`. Never negative, never decreases.
    #[must_use]
    pub fn mixability_gap(&self) -> f64 {
        self.gap
    }

    #[must_use]
    pub fn cumulative_losses(&self) -> &[f64] {
        &self.cumulative
    }

    /// Distribution the learner will play on the next step.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        mix(self.learning_rate(), &self.cumulative).weights
    }

    /// Distribution played at the most recent observed step.
    ///
    /// Before the first observation this is the uniform distribution, which
    /// is also what the first step plays.
    #[must_use]
    pub fn last_played(&self) -> &[f64] {
        &self.played
    }

    /// Observe one loss row: play, suffer, and update the rate state.
    pub fn observe(&mut self, losses: &[f64]) -> Result<StepTrace, InvalidShape> {
        if losses.len() != self.experts {
            return Err(InvalidShape::RaggedRow {
                row: self.steps,
                expected: self.experts,
                found: losses.len(),
            });
        }
        Ok(self.step(losses))
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        self.cumulative.fill(0.0);
        self.gap = 0.0;
        self.steps = 0;
        self.played.fill(1.0 / self.experts as f64);
    }

    fn step(&mut self, losses: &[f64]) -> StepTrace {
        debug_assert_eq!(losses.len(), self.experts);
        let rate = self.learning_rate();

        let mix_loss_before = mix_into(rate, &self.cumulative, &mut self.played);

        let mut incurred = 0.0;
        for (w, l) in self.played.iter().zip(losses) {
            incurred += w * l;
        }

        for (cum, l) in self.cumulative.iter_mut().zip(losses) {
            *cum += l;
        }

        let mix_loss_after = mix_into(rate, &self.cumulative, &mut self.scratch);

        let gap = (incurred - (mix_loss_after - mix_loss_before)).max(0.0);
        self.gap += gap;
        self.steps += 1;

        StepTrace {
            step: self.steps - 1,
            learning_rate: rate,
            mix_loss_before,
            mix_loss_after,
            incurred,
            gap,
            cumulative_gap: self.gap,
        }
    }
}

/// Run AdaHedge over a whole loss table.
///
/// Fails only if the table has fewer than two experts. An empty horizon yields
/// empty outputs.
pub fn forecast(losses: &LossTable) -> Result<Forecast, InvalidShape> {
    drive(losses, |_| {})
}

/// [`forecast`], also returning one [`StepTrace`] per timestep.
pub fn forecast_traced(losses: &LossTable) -> Result<(Forecast, Vec<StepTrace>), InvalidShape> {
    let mut traces = Vec::with_capacity(losses.horizon());
    let forecast = drive(losses, |trace| traces.push(trace))?;
    Ok((forecast, traces))
}

fn drive(
    losses: &LossTable,
    mut on_step: impl FnMut(StepTrace),
) -> Result<Forecast, InvalidShape> {
    let mut learner = AdaHedge::new(losses.experts())?;
    let mut out = Forecast::with_capacity(losses.experts(), losses.horizon());
    for row in losses.rows() {
        let trace = learner.step(row);
        out.push_step(learner.last_played(), trace.incurred);
        on_step(trace);
    }
    out.finish(learner.cumulative_losses(), learner.mixability_gap());
    Ok(out)
}
