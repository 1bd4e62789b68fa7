//! SMO active-set solver for the SVOR dual problem.
//!
//! The solver owns the whole optimization state: the alpha arena, the
//! cache list of free examples, the bias tracker and the kernel engine.
//! Both threshold representations share this code; they differ in how an
//! example's multipliers map onto thresholds (see [`crate::alphas`]), in
//! how `examine_example` pairs a violating example, and in whether the
//! inner loop works on raw or on propagated bounds.
//!
//! The outer loop is Platt's two-phase scheme: an examine-all sweep over
//! every example, then a tight loop on the most violating threshold until
//! it is optimal, repeated until a sweep changes nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alphas::{AlphaStore, Category, Side};
use crate::bias::BiasTracker;
use crate::cache::CacheList;
use crate::error::SvorError;
use crate::kernel::{KernelConfig, KernelEngine};
use crate::types::{OrdinalDataset, SvorParameter, ThresholdRepresentation};

/// Cooperative cancellation flag checked at the top of every outer-loop
/// iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next outer iteration.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of a successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionInfo {
    /// Non-decreasing thresholds, `K - 1` values.
    pub thresholds: Vec<f64>,
    /// Committed pair updates.
    pub iterations: usize,
    /// Examine-all sweeps.
    pub sweeps: usize,
}

/// SMO solver state for one training run.
pub struct Solver<'a> {
    pub(crate) kernel: KernelEngine<'a>,
    pub(crate) store: AlphaStore,
    pub(crate) cache: CacheList,
    pub(crate) bias: BiasTracker,
    pub(crate) tol: f64,
    pub(crate) eps: f64,
    max_iter: usize,
    pub(crate) iterations: usize,
    sweeps: usize,
    /// Per-example stamp marking decision values already updated in the
    /// current pair step.
    pub(crate) stamp: Vec<u64>,
    pub(crate) epoch: u64,
}

impl<'a> Solver<'a> {
    /// Build the solver state: validate inputs, resolve the kernel and
    /// allocate one alpha record per example.
    pub fn new(dataset: &'a OrdinalDataset, param: &SvorParameter) -> Result<Self, SvorError> {
        param.validate()?;
        if dataset.is_empty() {
            return Err(SvorError::EmptyDataset);
        }
        if dataset.num_ranks() < 2 {
            return Err(SvorError::InvalidDataset(
                "ordinal regression needs at least two ranks".into(),
            ));
        }

        let store = AlphaStore::create(dataset, param)?;
        let config = KernelConfig::new(param, dataset.feature_kinds())?;
        let kernel = KernelEngine::new(dataset.features(), config, param.cache_all)?;
        let n = dataset.len();

        Ok(Self {
            kernel,
            store,
            cache: CacheList::new(n),
            bias: BiasTracker::new(dataset.num_thresholds()),
            tol: param.tol,
            eps: param.eps,
            max_iter: param.max_iter,
            iterations: 0,
            sweeps: 0,
            stamp: vec![0; n],
            epoch: 0,
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn store(&self) -> &AlphaStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheList {
        &self.cache
    }

    pub fn bias(&self) -> &BiasTracker {
        &self.bias
    }

    pub fn kernel(&self) -> &KernelEngine<'a> {
        &self.kernel
    }

    /// Committed pair updates so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[inline]
    fn is_explicit(&self) -> bool {
        self.store.representation() == ThresholdRepresentation::Explicit
    }

    /// `mu` values at or below this are treated as zero.
    #[inline]
    pub(crate) fn mu_floor(&self) -> f64 {
        self.eps * self.eps
    }

    /// Recompute the propagated bounds from the raw ones.
    #[inline]
    pub(crate) fn rebuild_chain(&mut self) {
        let floor = self.mu_floor();
        self.bias.rebuild_chain(floor);
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Reset all multipliers, the cache list and `mu` to the zero start.
    pub fn clean(&mut self) {
        self.store.clean();
        self.cache.clear();
        self.bias.reset_mu();
        self.bias.reset_bounds();
    }

    /// Full consistency pass.
    ///
    /// Clamps multipliers into their boxes, recomputes every decision
    /// value directly, rebuilds the cache list and re-derives all bounds
    /// and witnesses. Running it twice in a row yields identical state.
    pub fn check_alphas(&mut self) -> Result<(), SvorError> {
        let drift = self.store.clamp_all();
        if drift > self.eps {
            log::warn!("multipliers drifted outside their box by {drift:.3e}; clamped");
        }

        self.bias.reset_bounds();
        self.cache.clear();
        for i in 0..self.store.len() {
            if self.store.record(i).is_free() {
                self.cache.add(i)?;
            }
        }

        for i in 0..self.store.len() {
            let f = self.compute_f(i);
            self.store.record_mut(i).f_cache = f;
        }
        for i in 0..self.store.len() {
            self.vote_all(i);
        }
        self.rebuild_chain();
        Ok(())
    }

    // ─── Decision values and voting ─────────────────────────────────

    /// Decision value at training example `i` by a direct kernel sum.
    pub fn compute_f(&self, i: usize) -> f64 {
        self.store
            .records()
            .iter()
            .enumerate()
            .filter_map(|(j, r)| {
                let beta = r.beta();
                (beta != 0.0).then(|| beta * self.kernel.evaluate(j, i))
            })
            .sum()
    }

    /// Offer every multiplier of example `i` as a bound candidate.
    pub(crate) fn vote_all(&mut self, i: usize) {
        let record = self.store.record(i);
        let f = record.f_cache;
        for slot in &record.slots {
            self.bias
                .vote(slot.threshold, i, slot.side.bias_value(f), slot.category);
        }
    }

    /// Refresh the decision value of an example that is not maintained
    /// incrementally, and let it vote.
    fn refresh_bound_example(&mut self, i: usize) {
        if !self.cache.contains(i) {
            let f = self.compute_f(i);
            self.store.record_mut(i).f_cache = f;
            self.vote_all(i);
        }
    }

    // ─── Working-set selection ──────────────────────────────────────

    /// Look for a KKT violation involving example `i` and try to fix it
    /// with one pair update. Returns whether an update was committed.
    pub fn examine_example(&mut self, i: usize) -> Result<bool, SvorError> {
        self.refresh_bound_example(i);
        if self.is_explicit() {
            self.examine_explicit(i)
        } else {
            self.examine_implicit(i)
        }
    }

    /// Pair `i` with the opposite witness at the threshold where it
    /// violates the current bounds the most.
    fn examine_implicit(&mut self, i: usize) -> Result<bool, SvorError> {
        let record = self.store.record(i);
        let f = record.f_cache;
        let mut best: Option<(usize, f64)> = None;
        let mut witness = None;

        for slot in &record.slots {
            let t = slot.threshold;
            let value = slot.side.bias_value(f);
            let mut consider = |viol: f64, w: Option<usize>| {
                if viol > self.tol && best.map_or(true, |(_, v)| viol > v) {
                    best = Some((t, viol));
                    witness = w;
                }
            };
            if slot.category.lowers_b_up() {
                consider(self.bias.bj_low[t] - value, self.bias.ij_low[t]);
            }
            if slot.category.raises_b_low() {
                consider(value - self.bias.bj_up[t], self.bias.ij_up[t]);
            }
        }

        match (best, witness) {
            (Some((t, _)), Some(w)) => {
                let stepped = self.takestep(w, i, t)?;
                if !stepped {
                    log::debug!(
                        "takestep failed for examples {} and {} at threshold {}",
                        w + 1,
                        i + 1,
                        t + 1
                    );
                }
                Ok(stepped)
            }
            _ => Ok(false),
        }
    }

    /// Check the up side of `i` (threshold `rank - 1`), then its down side
    /// (threshold `rank - 2`), against the propagated bounds.
    fn examine_explicit(&mut self, i: usize) -> Result<bool, SvorError> {
        self.rebuild_chain();

        let record = self.store.record(i);
        let f = record.f_cache;
        let mut sides: Vec<(usize, Side, Category)> = record
            .slots
            .iter()
            .map(|s| (s.threshold, s.side, s.category))
            .collect();
        // Up side first.
        sides.sort_by_key(|&(_, side, _)| side != Side::Up);

        for (t, side, category) in sides {
            let value = side.bias_value(f);
            let low_viol = if category.lowers_b_up() {
                self.bias.bmu_low[t] - value
            } else {
                f64::NEG_INFINITY
            };
            let up_viol = if category.raises_b_low() {
                value - self.bias.bmu_up[t]
            } else {
                f64::NEG_INFINITY
            };
            if low_viol <= self.tol && up_viol <= self.tol {
                continue;
            }

            // (first, second): the first participant holds the smaller
            // bias value.
            let pair = if low_viol > up_viol {
                self.bias.chain_low_witness(t).map(|w| ((i, t), w))
            } else {
                self.bias.chain_up_witness(t).map(|w| (w, (i, t)))
            };
            let Some(((i1, t1), (i2, t2))) = pair else {
                continue;
            };

            if self.cross_takestep(i1, t1, i2, t2)? {
                return Ok(true);
            }
            log::debug!(
                "pair step failed for examples {} (threshold {}) and {} (threshold {})",
                i1 + 1,
                t1 + 1,
                i2 + 1,
                t2 + 1
            );
        }
        Ok(false)
    }

    /// Threshold with the largest raw gap above `TOL`.
    pub fn active_threshold(&self) -> Option<usize> {
        self.bias.active_threshold(self.tol)
    }

    /// Threshold with the largest propagated gap above `TOL`.
    pub fn active_cross_threshold(&mut self) -> Option<usize> {
        self.rebuild_chain();
        self.bias.active_cross_threshold(self.tol)
    }

    /// One pair update on the most violating threshold, using the
    /// propagated bounds in the explicit representation.
    ///
    /// Returns `false` when every threshold is optimal or the step fails.
    pub fn step_active(&mut self) -> Result<bool, SvorError> {
        let stepped = if self.is_explicit() {
            let Some(t) = self.active_cross_threshold() else {
                return Ok(false);
            };
            match (self.bias.chain_up_witness(t), self.bias.chain_low_witness(t)) {
                (Some((i1, t1)), Some((i2, t2))) => self.cross_takestep(i1, t1, i2, t2)?,
                _ => false,
            }
        } else {
            let Some(t) = self.active_threshold() else {
                return Ok(false);
            };
            match (self.bias.ij_up[t], self.bias.ij_low[t]) {
                (Some(i1), Some(i2)) => self.takestep(i1, i2, t)?,
                _ => false,
            }
        };
        if !stepped {
            log::debug!("inner loop stalled; falling back to a full sweep");
        }
        Ok(stepped)
    }

    /// Repeatedly update the most violating pair until no threshold is
    /// violated or a step fails. Returns the number of committed steps.
    fn optimize_active(&mut self) -> Result<usize, SvorError> {
        let mut changed = 0;
        while self.iterations < self.max_iter && self.step_active()? {
            changed += 1;
        }
        Ok(changed)
    }

    // ─── Outer loop ─────────────────────────────────────────────────

    /// Run SMO from the zero start to convergence.
    pub fn solve(&mut self, cancel: Option<&CancellationToken>) -> Result<SolutionInfo, SvorError> {
        self.clean();
        self.check_alphas()?;
        self.iterations = 0;
        self.sweeps = 0;

        let mut examine_all = true;
        let mut num_changed = 0usize;
        while num_changed > 0 || examine_all {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(SvorError::Cancelled);
            }
            if self.iterations >= self.max_iter {
                log::warn!("reaching max number of iterations ({})", self.max_iter);
                break;
            }

            if examine_all {
                num_changed = 0;
                for i in 0..self.store.len() {
                    if self.iterations >= self.max_iter {
                        break;
                    }
                    if self.examine_example(i)? {
                        num_changed += 1;
                    }
                }
                self.sweeps += 1;
                log::debug!("sweep {}: {} examples changed", self.sweeps, num_changed);
            } else {
                self.optimize_active()?;
                num_changed = 0;
            }

            if examine_all {
                examine_all = false;
            } else if num_changed == 0 {
                examine_all = true;
            }
        }

        let explicit = self.is_explicit();
        if explicit {
            self.rebuild_chain();
        }
        let thresholds = self.bias.resolve(explicit, self.tol)?;
        Ok(SolutionInfo {
            thresholds,
            iterations: self.iterations,
            sweeps: self.sweeps,
        })
    }
}
