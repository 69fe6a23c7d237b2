//! Exponential-weights mixture and its mix loss.
//!
//! For a learning rate `eta` and cumulative losses `L`, the Gibbs weights are
//! `w_k ∝ exp(-eta · L_k)` and the mix loss is the soft-minimum
//! `M = -ln(mean_k exp(-eta · L_k)) / eta`. Both are evaluated after shifting
//! by `min(L)` so that neither the exponentials nor their sum can overflow or
//! underflow to zero, whatever the magnitude of `L`.
//!
//! Limits:
//! - `eta = ∞` (Follow-The-Leader): uniform over the experts attaining
//!   `min(L)`, mix loss `min(L)`.
//! - `eta = 0`: uniform over all experts, mix loss `mean(L)`.
//!
//! A rate that overflowed to `∞`, or a leader whose cumulative loss
//! overflowed to `±∞`, is evaluated with the Follow-The-Leader limit.

/// Learning rate of the exponential-weights mixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    /// `eta` in `[0, ∞)`.
    Finite(f64),
    /// Limit `eta → ∞`: all mass on the current leaders.
    Infinite,
}

impl LearningRate {
    /// AdaHedge rate `ln(K) / Delta`, or `Infinite` while no gap has accumulated.
    ///
    /// An infinite `delta` yields `Finite(0.0)`. A `delta` so small that the
    /// quotient overflows is treated like zero.
    #[must_use]
    pub fn from_gap(experts: usize, delta: f64) -> Self {
        if delta == 0.0 {
            return Self::Infinite;
        }
        let eta = (experts as f64).ln() / delta;
        if eta.is_finite() {
            Self::Finite(eta)
        } else {
            Self::Infinite
        }
    }

    /// Numeric value, with `f64::INFINITY` standing in for `Infinite`.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            Self::Finite(eta) => eta,
            Self::Infinite => f64::INFINITY,
        }
    }

    #[must_use]
    pub const fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// Weights and mix loss for one `(eta, L)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    /// Probability vector over the experts.
    pub weights: Vec<f64>,
    /// Soft-minimum of the cumulative losses at this rate.
    pub mix_loss: f64,
}

/// Evaluate the mixture for `rate` over `cumulative` losses.
///
/// `cumulative` must be non-empty; it is otherwise unrestricted (any sign,
/// any finite magnitude).
#[must_use]
pub fn mix(rate: LearningRate, cumulative: &[f64]) -> Mixture {
    let mut weights = vec![0.0; cumulative.len()];
    let mix_loss = mix_into(rate, cumulative, &mut weights);
    Mixture { weights, mix_loss }
}

/// Allocation-free [`mix`]: writes the weights into `weights` and returns the
/// mix loss.
///
/// # Panics
///
/// Panics if `weights.len() != cumulative.len()`.
pub fn mix_into(rate: LearningRate, cumulative: &[f64], weights: &mut [f64]) -> f64 {
    assert_eq!(
        weights.len(),
        cumulative.len(),
        "weight buffer must have one slot per expert"
    );
    debug_assert!(!cumulative.is_empty(), "mixture over zero experts");

    let mn = cumulative.iter().copied().fold(f64::INFINITY, f64::min);
    let experts = cumulative.len() as f64;

    match rate {
        LearningRate::Finite(eta) if eta == 0.0 => {
            weights.fill(1.0);
            normalize(weights, experts);
            let total: f64 = cumulative.iter().sum();
            total / experts
        }
        LearningRate::Finite(eta) if eta.is_finite() && mn.is_finite() => {
            let mut s = 0.0;
            for (w, &l) in weights.iter_mut().zip(cumulative) {
                *w = (-eta * (l - mn)).exp();
                s += *w;
            }
            normalize(weights, s);
            mn - (s / experts).ln() / eta
        }
        // Infinite rate, or a leader at `±∞` where `l - mn` is undefined.
        LearningRate::Finite(_) | LearningRate::Infinite => {
            let mut leaders = 0.0;
            for (w, &l) in weights.iter_mut().zip(cumulative) {
                *w = if l == mn { 1.0 } else { 0.0 };
                leaders += *w;
            }
            normalize(weights, leaders);
            mn
        }
    }
}

#[inline]
fn normalize(weights: &mut [f64], s: f64) {
    for w in weights.iter_mut() {
        *w /= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_distribution(w: &[f64]) {
        let s: f64 = w.iter().sum();
        assert!((s - 1.0).abs() < 1e-12, "sum={s}");
        assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)), "{w:?}");
    }

    #[test]
    fn gap_zero_means_infinite_rate() {
        assert_eq!(LearningRate::from_gap(3, 0.0), LearningRate::Infinite);
        let LearningRate::Finite(eta) = LearningRate::from_gap(4, 2.0) else {
            panic!("expected finite rate");
        };
        assert!((eta - 4f64.ln() / 2.0).abs() < 1e-15);
        assert_eq!(
            LearningRate::from_gap(2, f64::INFINITY),
            LearningRate::Finite(0.0)
        );
        assert_eq!(LearningRate::Infinite.value(), f64::INFINITY);
    }

    #[test]
    fn infinite_rate_splits_over_leaders() {
        let m = mix(LearningRate::Infinite, &[2.0, 1.0, 1.0, 5.0]);
        assert_eq!(m.weights, vec![0.0, 0.5, 0.5, 0.0]);
        assert_eq!(m.mix_loss, 1.0);
    }

    #[test]
    fn infinite_rate_single_leader_takes_all() {
        let m = mix(LearningRate::Infinite, &[3.0, -1.0, 0.0]);
        assert_eq!(m.weights, vec![0.0, 1.0, 0.0]);
        assert_eq!(m.mix_loss, -1.0);
    }

    #[test]
    fn equal_losses_give_uniform_weights_and_exact_mix_loss() {
        for rate in [LearningRate::Infinite, LearningRate::Finite(0.7)] {
            let m = mix(rate, &[4.0, 4.0, 4.0]);
            assert_eq!(m.weights, vec![1.0 / 3.0; 3]);
            assert_eq!(m.mix_loss, 4.0);
        }
    }

    #[test]
    fn finite_rate_matches_unshifted_formula() {
        let losses = [0.3, 1.2, 0.9];
        let eta: f64 = 1.5;
        let raw: Vec<f64> = losses.iter().map(|l| (-eta * l).exp()).collect();
        let s: f64 = raw.iter().sum();
        let expected_mix = -(s / 3.0).ln() / eta;

        let m = mix(LearningRate::Finite(eta), &losses);
        assert_distribution(&m.weights);
        for (w, r) in m.weights.iter().zip(&raw) {
            assert!((w - r / s).abs() < 1e-12);
        }
        assert!((m.mix_loss - expected_mix).abs() < 1e-12);
    }

    #[test]
    fn mix_loss_lies_between_min_and_mean() {
        let losses = [1.0, 2.0, 6.0];
        for eta in [1e-6, 0.1, 1.0, 10.0, 1e6] {
            let m = mix(LearningRate::Finite(eta), &losses);
            assert!(m.mix_loss >= 1.0 - 1e-9, "eta={eta} M={}", m.mix_loss);
            assert!(m.mix_loss <= 3.0 + 1e-9, "eta={eta} M={}", m.mix_loss);
        }
        let near_zero = mix(LearningRate::Finite(1e-9), &losses).mix_loss;
        assert!((near_zero - 3.0).abs() < 1e-6);
        let near_inf = mix(LearningRate::Finite(1e9), &losses).mix_loss;
        assert!((near_inf - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_rate_is_the_mean_limit() {
        let m = mix(LearningRate::Finite(0.0), &[1.0, 2.0, 6.0]);
        assert_eq!(m.weights, vec![1.0 / 3.0; 3]);
        assert_eq!(m.mix_loss, 3.0);
    }

    #[test]
    fn huge_cumulative_losses_stay_finite() {
        let losses = [1.0e300, 1.0e300 + 1.0e285, -1.0e300];
        let m = mix(LearningRate::Finite(2.0), &losses);
        assert_distribution(&m.weights);
        assert!(m.mix_loss.is_finite());
        assert_eq!(m.weights[2], 1.0);

        let close = [1.0e9, 1.0e9 + 1.0];
        let m = mix(LearningRate::Finite(1.0), &close);
        assert_distribution(&m.weights);
        assert!(m.weights[0] > m.weights[1]);
        assert!(m.mix_loss >= 1.0e9 && m.mix_loss <= 1.0e9 + 0.5);
    }

    #[test]
    fn overflowing_rate_falls_back_to_leaders() {
        assert_eq!(LearningRate::from_gap(2, 5.0e-311), LearningRate::Infinite);
        assert_eq!(
            LearningRate::from_gap(3, f64::MIN_POSITIVE / 4.0),
            LearningRate::Infinite
        );
        assert!(matches!(
            LearningRate::from_gap(2, 1.0e-300),
            LearningRate::Finite(eta) if eta.is_finite()
        ));

        let m = mix(LearningRate::Finite(f64::INFINITY), &[1.0e-310, 0.0, 0.0]);
        assert_eq!(m.weights, vec![0.0, 0.5, 0.5]);
        assert_eq!(m.mix_loss, 0.0);
    }

    #[test]
    fn infinite_cumulative_losses_keep_weights_finite() {
        for rate in [
            LearningRate::Finite(1.0e-308),
            LearningRate::Finite(2.0),
            LearningRate::Infinite,
        ] {
            let m = mix(rate, &[f64::INFINITY, f64::INFINITY]);
            assert_eq!(m.weights, vec![0.5, 0.5]);
            assert_eq!(m.mix_loss, f64::INFINITY);

            let m = mix(rate, &[f64::NEG_INFINITY, 3.0, f64::NEG_INFINITY]);
            assert_eq!(m.weights, vec![0.5, 0.0, 0.5]);
            assert_eq!(m.mix_loss, f64::NEG_INFINITY);
        }

        // An infinite loser is simply weightless.
        let m = mix(LearningRate::Finite(1.0), &[f64::INFINITY, 0.0]);
        assert_eq!(m.weights, vec![0.0, 1.0]);
        assert!(m.mix_loss.is_finite());
    }

    #[test]
    fn mix_into_reuses_buffer() {
        let mut buf = [9.0; 2];
        let loss = mix_into(LearningRate::Infinite, &[0.0, 1.0], &mut buf);
        assert_eq!(buf, [1.0, 0.0]);
        assert_eq!(loss, 0.0);
    }

    #[test]
    #[should_panic(expected = "one slot per expert")]
    fn mix_into_rejects_mismatched_buffer() {
        let mut buf = [0.0; 3];
        let _ = mix_into(LearningRate::Infinite, &[0.0, 1.0], &mut buf);
    }
}
