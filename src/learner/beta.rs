//! Beta-Binomial posterior algebra.
//!
//! [`BetaPosterior`] is the per-(slot, channel) learning cell: a conjugate
//! Beta prior over the probability that the cell is active on a given day,
//! updated by one binary observation per processed day. All operations are
//! pure; `update` returns a new value and never mutates the receiver.

use serde::{Deserialize, Serialize};

use crate::types::{Channel, SlotGrid, SLOTS_PER_DAY};

/// Lower clamp applied to the mean before taking logs.
const NLL_P_MIN: f64 = 0.001;

/// Upper clamp applied to the mean before taking logs.
const NLL_P_MAX: f64 = 0.999;

// ============================================================================
// Binary observation capability
// ============================================================================

/// Something that can be conditioned on a binary observation and yields a
/// probability. The learner's update and surprise computations go through
/// this seam, so the Beta cell could be swapped for any conjugate-updatable
/// model without touching the pipeline.
pub trait BinaryObservable: Sized {
    /// Current probability of the positive outcome.
    fn probability(&self) -> f64;

    /// A new model conditioned on one observation.
    fn conditioned(&self, observed: bool) -> Self;

    /// Negative log-likelihood of an observation under the current model.
    /// The probability is clamped to [0.001, 0.999] so a hard 0/1 never
    /// produces an infinite surprise.
    fn nll(&self, observed: bool) -> f64 {
        let p = self.probability().clamp(NLL_P_MIN, NLL_P_MAX);
        if observed {
            -p.ln()
        } else {
            -(1.0 - p).ln()
        }
    }
}

// ============================================================================
// Credible intervals
// ============================================================================

/// Supported credible-interval levels with their normal-approximation
/// z multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredibleLevel {
    P90,
    P95,
    P99,
}

impl CredibleLevel {
    /// Two-sided z multiplier for the level.
    pub const fn z(self) -> f64 {
        match self {
            CredibleLevel::P90 => 1.645,
            CredibleLevel::P95 => 1.96,
            CredibleLevel::P99 => 2.576,
        }
    }
}

// ============================================================================
// Beta posterior
// ============================================================================

/// Beta distribution posterior parameters.
///
/// `alpha` = prior + active observations, `beta` = prior + inactive
/// observations. Both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaPosterior {
    pub const fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Posterior mean: E[p] = alpha / (alpha + beta).
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior variance.
    pub fn variance(&self) -> f64 {
        let (a, b) = (self.alpha, self.beta);
        let n = a + b;
        (a * b) / (n * n * (n + 1.0))
    }

    /// Posterior standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Normal-approximation credible interval, clipped to [0, 1].
    ///
    /// Against the exact Beta quantile the error is at most 2% once
    /// `alpha + beta >= 7` and essentially zero from 14 on. Extreme means
    /// (p < 0.01 or p > 0.99) are outside the approximation's remit.
    pub fn credible_interval(&self, level: CredibleLevel) -> (f64, f64) {
        let z = level.z();
        let lo = (self.mean() - z * self.std_dev()).max(0.0);
        let hi = (self.mean() + z * self.std_dev()).min(1.0);
        (lo, hi)
    }

    /// Width of the 90% credible interval.
    pub fn ci_width(&self) -> f64 {
        let (lo, hi) = self.credible_interval(CredibleLevel::P90);
        hi - lo
    }

    /// Conditioned copy: alpha+1 on an active day, beta+1 otherwise.
    pub fn update(&self, observed: bool) -> Self {
        if observed {
            Self::new(self.alpha + 1.0, self.beta)
        } else {
            Self::new(self.alpha, self.beta + 1.0)
        }
    }
}

impl BinaryObservable for BetaPosterior {
    fn probability(&self) -> f64 {
        self.mean()
    }

    fn conditioned(&self, observed: bool) -> Self {
        self.update(observed)
    }
}

// ============================================================================
// Routine model
// ============================================================================

/// The full learned routine: one Beta posterior per (channel, slot) cell,
/// 4 x 96 = 384 cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineModel {
    cells: [[BetaPosterior; SLOTS_PER_DAY]; Channel::COUNT],
}

impl RoutineModel {
    /// Fresh model with every cell at the configured prior.
    pub fn seeded(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            cells: [[BetaPosterior::new(prior_alpha, prior_beta); SLOTS_PER_DAY]; Channel::COUNT],
        }
    }

    /// Posterior for one cell.
    pub fn posterior(&self, channel: Channel, slot: usize) -> BetaPosterior {
        self.cells[channel.index()][slot]
    }

    /// Replace one cell (used when hydrating from the store).
    pub fn set(&mut self, channel: Channel, slot: usize, posterior: BetaPosterior) {
        if slot < SLOTS_PER_DAY {
            self.cells[channel.index()][slot] = posterior;
        }
    }

    /// A new model with every cell conditioned on the day's active bit.
    /// The receiver is untouched; metrics computed against it afterwards
    /// still describe the pre-update state.
    pub fn updated(&self, grid: &SlotGrid) -> Self {
        let mut next = self.clone();
        for ch in Channel::ALL {
            for slot in 0..SLOTS_PER_DAY {
                let observed = grid.get(ch, slot) == 1;
                next.cells[ch.index()][slot] = self.posterior(ch, slot).conditioned(observed);
            }
        }
        next
    }

    /// Mean 90% credible-interval width across all cells.
    pub fn avg_ci_width(&self) -> f64 {
        let total: f64 = self
            .cells
            .iter()
            .flat_map(|row| row.iter())
            .map(BetaPosterior::ci_width)
            .sum();
        total / (Channel::COUNT * SLOTS_PER_DAY) as f64
    }

    /// Iterate all cells in (channel, slot) order.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, usize, BetaPosterior)> + '_ {
        Channel::ALL.into_iter().flat_map(move |ch| {
            (0..SLOTS_PER_DAY).map(move |slot| (ch, slot, self.posterior(ch, slot)))
        })
    }
}
