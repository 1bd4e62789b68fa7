//! Joint update of two multipliers.
//!
//! Every pair update in both representations goes through
//! [`Solver::solve_pair`]. A participant is an (example, threshold) pair;
//! with `z = ±1` its side sign, moving along the feasible direction by `u`
//! changes the first participant's `beta` by `+u` and the second's by
//! `-u`, so `sum(beta)` is preserved. The unconstrained optimum is
//! `u = (e2 - e1) / eta` where `e = f - z` is the bias value and
//! `eta = K11 + K22 - 2 K12`.
//!
//! When the participants sit at different thresholds the ordering
//! multipliers between them move too and must stay non-negative. When
//! they belong to the same example the kernel terms cancel, the
//! sub-problem is linear and `u` goes to whichever end of the interval
//! the slope points at.

use crate::alphas::clamp;
use crate::error::SvorError;
use crate::solver::Solver;

/// One multiplier taking part in a pair update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Participant {
    pub example: usize,
    pub threshold: usize,
}

/// Interval of `u` keeping `alpha + sign * u` inside `[0, bound]`.
#[inline]
fn box_interval(alpha: f64, bound: f64, sign: f64) -> (f64, f64) {
    if sign > 0.0 {
        (-alpha, bound - alpha)
    } else {
        (alpha - bound, alpha)
    }
}

impl Solver<'_> {
    /// Optimize the multipliers of `i1` and `i2` at threshold `t`.
    pub(crate) fn takestep(&mut self, i1: usize, i2: usize, t: usize) -> Result<bool, SvorError> {
        self.solve_pair(
            Participant { example: i1, threshold: t },
            Participant { example: i2, threshold: t },
        )
    }

    /// Optimize two multipliers that may sit at different thresholds.
    pub(crate) fn cross_takestep(
        &mut self,
        i1: usize,
        t1: usize,
        i2: usize,
        t2: usize,
    ) -> Result<bool, SvorError> {
        if i1 == i2 {
            if t1 == t2 {
                return Ok(false);
            }
            return self.cross_identical(i1);
        }
        if t1 == t2 {
            return self.takestep(i1, i2, t1);
        }
        self.solve_pair(
            Participant { example: i1, threshold: t1 },
            Participant { example: i2, threshold: t2 },
        )
    }

    /// Move the down and up multipliers of one example together.
    ///
    /// Both grow by the same amount, so `beta` and every decision value
    /// stay unchanged while the coupling multiplier between the two
    /// thresholds shrinks.
    pub(crate) fn cross_identical(&mut self, i: usize) -> Result<bool, SvorError> {
        let rank = self.store.record(i).rank;
        if rank < 2 || rank > self.store.num_thresholds() {
            return Ok(false);
        }
        self.solve_pair(
            Participant { example: i, threshold: rank - 2 },
            Participant { example: i, threshold: rank - 1 },
        )
    }

    /// Optimize the pair and update every dependent cache on success.
    ///
    /// Returns `false` without touching any state when the pair cannot
    /// make progress.
    pub(crate) fn solve_pair(
        &mut self,
        p1: Participant,
        p2: Participant,
    ) -> Result<bool, SvorError> {
        if p1 == p2 {
            return Ok(false);
        }
        let (i1, i2) = (p1.example, p2.example);
        let (Some(s1), Some(s2)) = (
            self.store.slot_index(i1, p1.threshold),
            self.store.slot_index(i2, p2.threshold),
        ) else {
            return Ok(false);
        };

        let v1 = self.store.record(i1).slots[s1];
        let v2 = self.store.record(i2).slots[s2];
        let (z1, z2) = (v1.side.sign(), v2.side.sign());
        let (c1, c2) = (self.store.bound(v1.side), self.store.bound(v2.side));
        let e1 = v1.side.bias_value(self.store.record(i1).f_cache);
        let e2 = v2.side.bias_value(self.store.record(i2).f_cache);

        // ─── Feasible interval ──────────────────────────────────────

        let (lo1, hi1) = box_interval(v1.alpha, c1, z1);
        // The second multiplier moves by -z2 * u.
        let (lo2, hi2) = box_interval(v2.alpha, c2, -z2);
        let mut lo = lo1.max(lo2);
        let mut hi = hi1.min(hi2);

        let (t1, t2) = (p1.threshold, p2.threshold);
        let coupled = t1.min(t2)..t1.max(t2);
        let dir = if t1 < t2 { -1.0 } else { 1.0 };
        for m in coupled.clone() {
            if dir < 0.0 {
                hi = hi.min(self.bias.mu[m]);
            } else {
                lo = lo.max(-self.bias.mu[m]);
            }
        }
        if lo > hi {
            return Ok(false);
        }

        // ─── Step ───────────────────────────────────────────────────

        let slope = e2 - e1;
        let u = if i1 == i2 {
            if slope > 0.0 {
                hi
            } else if slope < 0.0 {
                lo
            } else {
                return Ok(false);
            }
        } else {
            let eta = self.kernel.evaluate(i1, i1) + self.kernel.evaluate(i2, i2)
                - 2.0 * self.kernel.evaluate(i1, i2);
            if eta <= 0.0 {
                log::debug!(
                    "non-positive curvature {eta:.3e} for examples {} and {}",
                    i1 + 1,
                    i2 + 1
                );
                return Ok(false);
            }
            (slope / eta).max(lo).min(hi)
        };

        let n1 = clamp(v1.alpha + z1 * u, c1);
        let n2 = clamp(v2.alpha - z2 * u, c2);
        let (d1, d2) = (n1 - v1.alpha, n2 - v2.alpha);
        if d1 == 0.0 && d2 == 0.0 {
            return Ok(false);
        }

        // ─── Commit ─────────────────────────────────────────────────

        self.store.set_alpha(i1, s1, n1);
        self.store.set_alpha(i2, s2, n2);
        for m in coupled {
            self.bias.mu[m] = (self.bias.mu[m] + dir * u).max(0.0);
        }
        self.refresh_after_step(i1, z1 * d1, i2, z2 * d2)?;
        self.iterations += 1;
        Ok(true)
    }

    /// Change of `f_k` caused by the committed `beta` deltas.
    #[inline]
    fn pair_delta(&self, k: usize, i1: usize, db1: f64, i2: usize, db2: f64) -> f64 {
        if i1 == i2 {
            (db1 + db2) * self.kernel.evaluate(i1, k)
        } else {
            db1 * self.kernel.evaluate(i1, k) + db2 * self.kernel.evaluate(i2, k)
        }
    }

    /// Apply the pair's delta to `f_k` once per step.
    #[inline]
    fn bump_f(&mut self, k: usize, i1: usize, db1: f64, i2: usize, db2: f64) {
        if self.stamp[k] == self.epoch {
            return;
        }
        self.stamp[k] = self.epoch;
        if db1 == 0.0 && db2 == 0.0 {
            return;
        }
        let delta = self.pair_delta(k, i1, db1, i2, db2);
        self.store.record_mut(k).f_cache += delta;
    }

    /// Bias value of `example`'s multiplier at threshold `t`.
    fn witness_value(&self, example: usize, t: usize) -> Option<f64> {
        let slot = self.store.slot_index(example, t)?;
        let record = self.store.record(example);
        Some(record.slots[slot].side.bias_value(record.f_cache))
    }

    /// Bring decision values, cache membership and bias bounds up to date
    /// after a committed pair update.
    fn refresh_after_step(
        &mut self,
        i1: usize,
        db1: f64,
        i2: usize,
        db2: f64,
    ) -> Result<(), SvorError> {
        self.epoch += 1;

        // Witnesses off the cache list keep their bound, moved by the new
        // decision value. Any other witness is re-elected below.
        let mut invalidated_up = Vec::new();
        let mut invalidated_low = Vec::new();
        for t in 0..self.bias.num_thresholds() {
            if let Some(w) = self.bias.ij_up[t] {
                let kept = w != i1 && w != i2 && !self.cache.contains(w);
                if kept {
                    self.bump_f(w, i1, db1, i2, db2);
                }
                match self.witness_value(w, t).filter(|_| kept) {
                    Some(value) => self.bias.bj_up[t] = value,
                    None => {
                        self.bias.invalidate_up(t);
                        invalidated_up.push(t);
                    }
                }
            }
            if let Some(w) = self.bias.ij_low[t] {
                let kept = w != i1 && w != i2 && !self.cache.contains(w);
                if kept {
                    self.bump_f(w, i1, db1, i2, db2);
                }
                match self.witness_value(w, t).filter(|_| kept) {
                    Some(value) => self.bias.bj_low[t] = value,
                    None => {
                        self.bias.invalidate_low(t);
                        invalidated_low.push(t);
                    }
                }
            }
        }

        self.bump_f(i1, i1, db1, i2, db2);
        self.bump_f(i2, i1, db1, i2, db2);
        for i in [i1, i2] {
            let free = self.store.record(i).is_free();
            self.cache.set_membership(i, free)?;
        }

        let members = self.cache.to_vec();
        for k in members {
            self.bump_f(k, i1, db1, i2, db2);
            self.vote_all(k);
        }
        for i in [i1, i2] {
            if !self.cache.contains(i) {
                self.vote_all(i);
            }
        }

        let lost = invalidated_up.iter().any(|&t| self.bias.ij_up[t].is_none())
            || invalidated_low.iter().any(|&t| self.bias.ij_low[t].is_none());
        if lost {
            log::debug!("bias witness lost after update; running a full check");
            self.check_alphas()?;
        } else {
            self.rebuild_chain();
        }
        Ok(())
    }
}
