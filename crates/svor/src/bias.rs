//! Per-threshold bias bounds and the ordering multipliers.
//!
//! For threshold `t`, `bj_up[t]` is the smallest bias value any example
//! allows from above and `bj_low[t]` the largest it requires from below;
//! `ij_up`/`ij_low` name the witnessing examples. Optimality at `t` means
//! `bj_low[t] - bj_up[t] <= TOL`.
//!
//! With explicit thresholds the ordering `b_0 <= b_1 <= ...` is part of
//! the problem, so bounds propagate across thresholds: a lower bound on
//! `b_s` also bounds every `b_t` with `t > s`, an upper bound on `b_s`
//! bounds every `b_t` with `t < s`, and while `mu[t] > 0` the thresholds
//! `t` and `t + 1` are tied and share bounds in both directions. The
//! reduced arrays `bmu_up`/`bmu_low` hold these propagated bounds and
//! `imu_up`/`imu_low` the threshold each one came from.

use crate::alphas::Category;
use crate::error::SvorError;

/// Bias bound bookkeeping for `K - 1` thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasTracker {
    pub bj_up: Vec<f64>,
    pub bj_low: Vec<f64>,
    pub ij_up: Vec<Option<usize>>,
    pub ij_low: Vec<Option<usize>>,
    pub bmu_up: Vec<f64>,
    pub bmu_low: Vec<f64>,
    pub imu_up: Vec<usize>,
    pub imu_low: Vec<usize>,
    /// `mu[t]` couples thresholds `t` and `t + 1` (explicit thresholds only).
    pub mu: Vec<f64>,
}

impl BiasTracker {
    /// Tracker for `num_thresholds` thresholds with no witnesses.
    pub fn new(num_thresholds: usize) -> Self {
        let t = num_thresholds;
        Self {
            bj_up: vec![f64::INFINITY; t],
            bj_low: vec![f64::NEG_INFINITY; t],
            ij_up: vec![None; t],
            ij_low: vec![None; t],
            bmu_up: vec![f64::INFINITY; t],
            bmu_low: vec![f64::NEG_INFINITY; t],
            imu_up: (0..t).collect(),
            imu_low: (0..t).collect(),
            mu: vec![0.0; t.saturating_sub(1)],
        }
    }

    #[inline]
    pub fn num_thresholds(&self) -> usize {
        self.bj_up.len()
    }

    /// Forget every bound and witness.
    pub fn reset_bounds(&mut self) {
        self.bj_up.fill(f64::INFINITY);
        self.bj_low.fill(f64::NEG_INFINITY);
        self.ij_up.fill(None);
        self.ij_low.fill(None);
    }

    /// Zero the ordering multipliers.
    pub fn reset_mu(&mut self) {
        self.mu.fill(0.0);
    }

    #[inline]
    pub(crate) fn invalidate_up(&mut self, t: usize) {
        self.bj_up[t] = f64::INFINITY;
        self.ij_up[t] = None;
    }

    #[inline]
    pub(crate) fn invalidate_low(&mut self, t: usize) {
        self.bj_low[t] = f64::NEG_INFINITY;
        self.ij_low[t] = None;
    }

    /// Offer `value` from `example` as a bound candidate at threshold `t`.
    #[inline]
    pub fn vote(&mut self, t: usize, example: usize, value: f64, category: Category) {
        if category.lowers_b_up() && (self.ij_up[t].is_none() || value < self.bj_up[t]) {
            self.bj_up[t] = value;
            self.ij_up[t] = Some(example);
        }
        if category.raises_b_low() && (self.ij_low[t].is_none() || value > self.bj_low[t]) {
            self.bj_low[t] = value;
            self.ij_low[t] = Some(example);
        }
    }

    /// KKT gap at threshold `t`.
    #[inline]
    pub fn gap(&self, t: usize) -> f64 {
        self.bj_low[t] - self.bj_up[t]
    }

    /// Gap of the propagated bounds at threshold `t`.
    #[inline]
    pub fn chain_gap(&self, t: usize) -> f64 {
        self.bmu_low[t] - self.bmu_up[t]
    }

    /// Threshold with the largest gap above `tol`, or `None` when every
    /// threshold is optimal.
    pub fn active_threshold(&self, tol: f64) -> Option<usize> {
        most_violated((0..self.num_thresholds()).map(|t| self.gap(t)), tol)
    }

    /// Threshold with the largest propagated gap above `tol`.
    ///
    /// Requires a prior [`rebuild_chain`](Self::rebuild_chain).
    pub fn active_cross_threshold(&self, tol: f64) -> Option<usize> {
        most_violated((0..self.num_thresholds()).map(|t| self.chain_gap(t)), tol)
    }

    /// Recompute `bmu_up`/`bmu_low`. Thresholds tie when `mu > floor`.
    pub fn rebuild_chain(&mut self, floor: f64) {
        let n = self.num_thresholds();
        if n == 0 {
            return;
        }

        // b_low^t = max(b_low^(t-1), b_low^t)
        for t in 0..n {
            self.bmu_low[t] = self.bj_low[t];
            self.imu_low[t] = t;
            if t > 0 && self.bmu_low[t - 1] > self.bmu_low[t] {
                self.bmu_low[t] = self.bmu_low[t - 1];
                self.imu_low[t] = self.imu_low[t - 1];
            }
        }

        // b_up^t = min(b_up^t, b_up^(t+1))
        for t in (0..n).rev() {
            self.bmu_up[t] = self.bj_up[t];
            self.imu_up[t] = t;
            if t + 1 < n && self.bmu_up[t + 1] < self.bmu_up[t] {
                self.bmu_up[t] = self.bmu_up[t + 1];
                self.imu_up[t] = self.imu_up[t + 1];
            }
        }

        // Tied neighbours share bounds in the other direction too.
        for t in 1..n {
            if self.mu[t - 1] > floor && self.bmu_up[t - 1] < self.bmu_up[t] {
                self.bmu_up[t] = self.bmu_up[t - 1];
                self.imu_up[t] = self.imu_up[t - 1];
            }
        }
        for t in (0..n - 1).rev() {
            if self.mu[t] > floor && self.bmu_low[t + 1] > self.bmu_low[t] {
                self.bmu_low[t] = self.bmu_low[t + 1];
                self.imu_low[t] = self.imu_low[t + 1];
            }
        }
    }

    /// Example and threshold behind `bmu_up[t]`.
    #[inline]
    pub fn chain_up_witness(&self, t: usize) -> Option<(usize, usize)> {
        let s = self.imu_up[t];
        self.ij_up[s].map(|i| (i, s))
    }

    /// Example and threshold behind `bmu_low[t]`.
    #[inline]
    pub fn chain_low_witness(&self, t: usize) -> Option<(usize, usize)> {
        let s = self.imu_low[t];
        self.ij_low[s].map(|i| (i, s))
    }

    /// Resolve final thresholds from `(low, up)` bound pairs.
    ///
    /// Each threshold is the midpoint of its bounds (or the finite one if
    /// only one side has a witness). Fails if a gap exceeds `tol` or a
    /// threshold drops more than `tol` below its predecessor; smaller
    /// inversions are lifted so the result is non-decreasing.
    pub fn resolve(&self, use_chain: bool, tol: f64) -> Result<Vec<f64>, SvorError> {
        let (low, up) = if use_chain {
            (&self.bmu_low, &self.bmu_up)
        } else {
            (&self.bj_low, &self.bj_up)
        };

        let mut biasj: Vec<f64> = Vec::with_capacity(low.len());
        for t in 0..low.len() {
            let gap = low[t] - up[t];
            if gap > tol {
                return Err(SvorError::ConvergenceFailure { threshold: t + 1, gap });
            }

            let previous = biasj.last().copied();
            let mut b = match (low[t].is_finite(), up[t].is_finite()) {
                (true, true) => (low[t] + up[t]) / 2.0,
                (true, false) => low[t],
                (false, true) => up[t],
                (false, false) => previous.unwrap_or(0.0),
            };

            if let Some(prev) = previous {
                if b + tol < prev {
                    return Err(SvorError::NonMonotonicThresholds {
                        threshold: t + 1,
                        value: b,
                        previous: prev,
                    });
                }
                b = b.max(prev);
            }
            biasj.push(b);
        }
        Ok(biasj)
    }
}

fn most_violated(gaps: impl Iterator<Item = f64>, tol: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (t, gap) in gaps.enumerate() {
        if gap > tol && best.map_or(true, |(_, g)| gap > g) {
            best = Some((t, gap));
        }
    }
    best.map(|(t, _)| t)
}
