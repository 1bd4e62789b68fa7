//! Per-example dual multipliers and their category tags.
//!
//! A multiplier is attached to an (example, threshold) pair. Its [`Side`]
//! says whether the example's rank is at or below the threshold (`Up`:
//! the constraint is `f + 1 <= b`) or above it (`Down`: `f - 1 >= b`).
//! The explicit representation keeps at most two multipliers per example
//! (the thresholds adjacent to its rank), the implicit one keeps one per
//! threshold.

use crate::error::SvorError;
use crate::types::{OrdinalDataset, SvorParameter, ThresholdRepresentation};

/// Minimum number of examples needed to form a pair.
pub const MIN_EXAMPLES: usize = 2;

/// Position of an example relative to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Rank at or below the threshold.
    Up,
    /// Rank above the threshold.
    Down,
}

impl Side {
    /// Side of an example with 1-based `rank` at 0-based `threshold`.
    #[inline]
    pub fn of(rank: usize, threshold: usize) -> Side {
        if rank <= threshold + 1 {
            Side::Up
        } else {
            Side::Down
        }
    }

    /// Sign of the multiplier in the signed coefficient `beta`.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Side::Up => -1.0,
            Side::Down => 1.0,
        }
    }

    /// Candidate bias value of an example with decision value `f`.
    #[inline]
    pub fn bias_value(self, f: f64) -> f64 {
        f - self.sign()
    }
}

/// Category of a multiplier relative to its box `[0, C]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// `Io_a`: up side, strictly inside the box.
    FreeUp,
    /// `Io_b`: down side, strictly inside the box.
    FreeDown,
    /// `I_One`: down side at zero.
    DownAtZero,
    /// `I_Two`: up side at zero.
    UpAtZero,
    /// `I_Thr`: up side at C.
    UpAtBound,
    /// `I_Fou`: down side at C.
    DownAtBound,
}

impl Category {
    #[inline]
    pub fn is_free(self) -> bool {
        matches!(self, Category::FreeUp | Category::FreeDown)
    }

    /// Whether this multiplier's bias value is an upper bound candidate.
    #[inline]
    pub fn lowers_b_up(self) -> bool {
        matches!(
            self,
            Category::FreeUp | Category::UpAtBound | Category::FreeDown | Category::DownAtZero
        )
    }

    /// Whether this multiplier's bias value is a lower bound candidate.
    #[inline]
    pub fn raises_b_low(self) -> bool {
        matches!(
            self,
            Category::FreeUp | Category::UpAtZero | Category::FreeDown | Category::DownAtBound
        )
    }
}

/// Project a multiplier into `[0, bound]`.
#[inline]
pub fn clamp(value: f64, bound: f64) -> f64 {
    value.max(0.0).min(bound)
}

/// Category of `alpha` in `[0, bound]`, treating values within `band` of
/// either end as sitting on it.
pub fn classify(alpha: f64, bound: f64, side: Side, band: f64) -> Category {
    let at_bound = (bound - alpha).abs() < band;
    let at_zero = alpha.abs() < band;
    match side {
        Side::Up if at_bound => Category::UpAtBound,
        Side::Up if at_zero => Category::UpAtZero,
        Side::Up => Category::FreeUp,
        Side::Down if at_bound => Category::DownAtBound,
        Side::Down if at_zero => Category::DownAtZero,
        Side::Down => Category::FreeDown,
    }
}

/// One multiplier of an example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// 0-based threshold index.
    pub threshold: usize,
    pub side: Side,
    pub alpha: f64,
    pub category: Category,
}

/// Dual state of one example.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaRecord {
    /// 1-based ordinal rank.
    pub rank: usize,
    /// Multipliers ordered by threshold.
    pub slots: Vec<Slot>,
    /// Cached decision value. Exact while the example is on the cache
    /// list or is a live bias witness.
    pub f_cache: f64,
}

impl AlphaRecord {
    /// Signed coefficient of the example in the decision function.
    #[inline]
    pub fn beta(&self) -> f64 {
        self.slots.iter().map(|s| s.side.sign() * s.alpha).sum()
    }

    /// True when any multiplier is strictly inside its box.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.slots.iter().any(|s| s.category.is_free())
    }
}

/// Arena of [`AlphaRecord`]s in dataset order.
#[derive(Debug, Clone)]
pub struct AlphaStore {
    representation: ThresholdRepresentation,
    num_thresholds: usize,
    c_up: f64,
    c_down: f64,
    band: f64,
    records: Vec<AlphaRecord>,
}

impl AlphaStore {
    /// Allocate one record per example with every multiplier at zero.
    pub fn create(dataset: &OrdinalDataset, param: &SvorParameter) -> Result<Self, SvorError> {
        if dataset.is_empty() {
            return Err(SvorError::EmptyDataset);
        }
        if dataset.len() < MIN_EXAMPLES {
            return Err(SvorError::TooFewExamples { count: dataset.len() });
        }

        let num_thresholds = dataset.num_thresholds();
        let representation = param.representation;
        let band = match representation {
            ThresholdRepresentation::Explicit => param.eps * param.eps,
            ThresholdRepresentation::Implicit => param.eps * param.eps * param.eps,
        };

        let records = dataset
            .ranks()
            .iter()
            .map(|&rank| {
                let thresholds: Vec<usize> = match representation {
                    ThresholdRepresentation::Explicit => (rank.saturating_sub(2)..rank)
                        .filter(|&t| t < num_thresholds)
                        .collect(),
                    ThresholdRepresentation::Implicit => (0..num_thresholds).collect(),
                };
                let slots = thresholds
                    .into_iter()
                    .map(|threshold| {
                        let side = Side::of(rank, threshold);
                        Slot {
                            threshold,
                            side,
                            alpha: 0.0,
                            category: classify(0.0, param_bound(param, side), side, band),
                        }
                    })
                    .collect();
                AlphaRecord { rank, slots, f_cache: 0.0 }
            })
            .collect();

        Ok(Self {
            representation,
            num_thresholds,
            c_up: param.c_up(),
            c_down: param.c_down(),
            band,
            records,
        })
    }

    /// Reset every multiplier and decision value to zero.
    pub fn clean(&mut self) {
        let (c_up, c_down, band) = (self.c_up, self.c_down, self.band);
        for record in &mut self.records {
            record.f_cache = 0.0;
            for slot in &mut record.slots {
                slot.alpha = 0.0;
                let bound = side_bound(c_up, c_down, slot.side);
                slot.category = classify(0.0, bound, slot.side, band);
            }
        }
    }

    /// Clamp every multiplier into its box and recompute categories.
    ///
    /// Returns the largest correction applied.
    pub(crate) fn clamp_all(&mut self) -> f64 {
        let (c_up, c_down, band) = (self.c_up, self.c_down, self.band);
        let mut drift: f64 = 0.0;
        for record in &mut self.records {
            for slot in &mut record.slots {
                let bound = side_bound(c_up, c_down, slot.side);
                let clamped = clamp(slot.alpha, bound);
                drift = drift.max((clamped - slot.alpha).abs());
                slot.alpha = clamped;
                slot.category = classify(clamped, bound, slot.side, band);
            }
        }
        drift
    }

    /// Position of the multiplier of example `i` at `threshold`, if any.
    #[inline]
    pub fn slot_index(&self, i: usize, threshold: usize) -> Option<usize> {
        match self.representation {
            ThresholdRepresentation::Implicit => {
                (threshold < self.num_thresholds).then_some(threshold)
            }
            ThresholdRepresentation::Explicit => self.records[i]
                .slots
                .iter()
                .position(|s| s.threshold == threshold),
        }
    }

    /// Store a new value for a multiplier and recompute its category.
    pub(crate) fn set_alpha(&mut self, i: usize, slot: usize, value: f64) {
        let (c_up, c_down, band) = (self.c_up, self.c_down, self.band);
        let s = &mut self.records[i].slots[slot];
        s.alpha = value;
        s.category = classify(value, side_bound(c_up, c_down, s.side), s.side, band);
    }

    /// Box bound for a side.
    #[inline]
    pub fn bound(&self, side: Side) -> f64 {
        side_bound(self.c_up, self.c_down, side)
    }

    #[inline]
    pub fn representation(&self) -> ThresholdRepresentation {
        self.representation
    }

    #[inline]
    pub fn num_thresholds(&self) -> usize {
        self.num_thresholds
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn record(&self, i: usize) -> &AlphaRecord {
        &self.records[i]
    }

    #[inline]
    pub(crate) fn record_mut(&mut self, i: usize) -> &mut AlphaRecord {
        &mut self.records[i]
    }

    pub fn records(&self) -> &[AlphaRecord] {
        &self.records
    }

    /// Multipliers of example `i` in the layout of the representation:
    /// `[up, down]` for explicit thresholds, one per threshold otherwise.
    pub fn multipliers(&self, i: usize) -> Vec<f64> {
        let record = &self.records[i];
        match self.representation {
            ThresholdRepresentation::Implicit => record.slots.iter().map(|s| s.alpha).collect(),
            ThresholdRepresentation::Explicit => {
                let pick = |side| {
                    record
                        .slots
                        .iter()
                        .find(|s| s.side == side)
                        .map_or(0.0, |s| s.alpha)
                };
                vec![pick(Side::Up), pick(Side::Down)]
            }
        }
    }
}

#[inline]
fn side_bound(c_up: f64, c_down: f64, side: Side) -> f64 {
    match side {
        Side::Up => c_up,
        Side::Down => c_down,
    }
}

#[inline]
fn param_bound(param: &SvorParameter, side: Side) -> f64 {
    side_bound(param.c_up(), param.c_down(), side)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(ranks: Vec<usize>) -> OrdinalDataset {
        let features = ranks.iter().map(|&r| vec![r as f64]).collect();
        OrdinalDataset::new(features, ranks).unwrap()
    }

    #[test]
    fn side_of_rank() {
        assert_eq!(Side::of(1, 0), Side::Up);
        assert_eq!(Side::of(2, 0), Side::Down);
        assert_eq!(Side::of(2, 1), Side::Up);
        assert_eq!(Side::Up.bias_value(0.5), 1.5);
        assert_eq!(Side::Down.bias_value(0.5), -0.5);
    }

    #[test]
    fn classify_bands() {
        let band = 1e-12;
        assert_eq!(classify(0.0, 1.0, Side::Up, band), Category::UpAtZero);
        assert_eq!(classify(1.0, 1.0, Side::Up, band), Category::UpAtBound);
        assert_eq!(classify(0.5, 1.0, Side::Up, band), Category::FreeUp);
        assert_eq!(classify(1e-13, 1.0, Side::Down, band), Category::DownAtZero);
        assert_eq!(classify(1.0 - 1e-13, 1.0, Side::Down, band), Category::DownAtBound);
        assert_eq!(classify(0.5, 1.0, Side::Down, band), Category::FreeDown);
    }

    #[test]
    fn voting_table() {
        assert!(Category::UpAtBound.lowers_b_up() && !Category::UpAtBound.raises_b_low());
        assert!(!Category::UpAtZero.lowers_b_up() && Category::UpAtZero.raises_b_low());
        assert!(Category::DownAtZero.lowers_b_up() && !Category::DownAtZero.raises_b_low());
        assert!(!Category::DownAtBound.lowers_b_up() && Category::DownAtBound.raises_b_low());
        assert!(Category::FreeUp.lowers_b_up() && Category::FreeUp.raises_b_low());
        assert!(Category::FreeDown.is_free() && !Category::DownAtZero.is_free());
    }

    #[test]
    fn clamp_is_pure_projection() {
        assert_eq!(clamp(-0.1, 1.0), 0.0);
        assert_eq!(clamp(1.2, 1.0), 1.0);
        assert_eq!(clamp(0.3, 1.0), 0.3);
    }

    #[test]
    fn explicit_slots_flank_rank() {
        let store = AlphaStore::create(&dataset(vec![1, 2, 3]), &SvorParameter::default()).unwrap();
        let thresholds = |i: usize| -> Vec<(usize, Side)> {
            store.record(i).slots.iter().map(|s| (s.threshold, s.side)).collect()
        };
        assert_eq!(thresholds(0), vec![(0, Side::Up)]);
        assert_eq!(thresholds(1), vec![(0, Side::Down), (1, Side::Up)]);
        assert_eq!(thresholds(2), vec![(1, Side::Down)]);
        assert_eq!(store.slot_index(1, 1), Some(1));
        assert_eq!(store.slot_index(0, 1), None);
    }

    #[test]
    fn implicit_slots_cover_all_thresholds() {
        let param = SvorParameter {
            representation: ThresholdRepresentation::Implicit,
            ..Default::default()
        };
        let store = AlphaStore::create(&dataset(vec![1, 2, 3]), &param).unwrap();
        let sides: Vec<Side> = store.record(1).slots.iter().map(|s| s.side).collect();
        assert_eq!(sides, vec![Side::Down, Side::Up]);
        assert_eq!(store.record(1).slots[0].category, Category::DownAtZero);
        assert_eq!(store.record(1).slots[1].category, Category::UpAtZero);
        assert_eq!(store.slot_index(2, 1), Some(1));
    }

    #[test]
    fn create_rejects_small_datasets() {
        let empty = OrdinalDataset::new(Vec::new(), Vec::new()).unwrap();
        assert_eq!(
            AlphaStore::create(&empty, &SvorParameter::default()).unwrap_err(),
            SvorError::EmptyDataset
        );
        assert_eq!(
            AlphaStore::create(&dataset(vec![1]), &SvorParameter::default()).unwrap_err(),
            SvorError::TooFewExamples { count: 1 }
        );
    }

    #[test]
    fn clamp_all_reports_drift_and_reclassifies() {
        let mut store =
            AlphaStore::create(&dataset(vec![1, 2]), &SvorParameter::default()).unwrap();
        store.record_mut(0).slots[0].alpha = 1.5;
        let drift = store.clamp_all();
        assert!((drift - 0.5).abs() < 1e-15);
        assert_eq!(store.record(0).slots[0].alpha, 1.0);
        assert_eq!(store.record(0).slots[0].category, Category::UpAtBound);
    }

    #[test]
    fn beta_and_multiplier_layout() {
        let mut store =
            AlphaStore::create(&dataset(vec![1, 2, 3]), &SvorParameter::default()).unwrap();
        store.set_alpha(1, 0, 0.25);
        store.set_alpha(1, 1, 0.5);
        assert!((store.record(1).beta() - (-0.25)).abs() < 1e-15);
        assert_eq!(store.multipliers(1), vec![0.5, 0.25]);
        assert!(store.record(1).is_free());
        store.clean();
        assert_eq!(store.multipliers(1), vec![0.0, 0.0]);
        assert!(!store.record(1).is_free());
    }
}
