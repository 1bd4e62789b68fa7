//! Kernel functions for ordinal regression.
//!
//! Provides both:
//! - Standalone `k_function` for prediction (two dense vectors)
//! - `KernelEngine` for training (indexes the dataset, adds the diagonal
//!   bump, optionally precomputes the full lower-triangular matrix)

use crate::error::SvorError;
use crate::types::{FeatureKind, KernelType, SvorParameter};

/// Added to `K(x_i, x_i)` for a training example against itself so that
/// every pair of distinct examples has a strictly positive curvature.
pub const DIAGONAL_BUMP: f64 = 0.001;

// ─── Integer power ──────────────────────────────────────────────────

/// Integer power by squaring.
#[inline]
pub fn powi(base: f64, times: u32) -> f64 {
    let mut tmp = base;
    let mut ret = 1.0;
    let mut t = times;
    while t > 0 {
        if t % 2 == 1 {
            ret *= tmp;
        }
        tmp *= tmp;
        t /= 2;
    }
    ret
}

// ─── Resolved kernel configuration ──────────────────────────────────

/// Kernel family, hyperparameters and normalized per-feature weights.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub kernel_type: KernelType,
    pub kappa: f64,
    pub degree: u32,
    /// ARD weights, summing to 1.
    pub ard: Vec<f64>,
    pub feature_kinds: Vec<FeatureKind>,
}

impl KernelConfig {
    /// Resolve the kernel for data of the given feature kinds.
    ///
    /// Uniform `1/dim` weights are used unless `param.ard` is set, in which
    /// case the supplied weights are rescaled to sum to 1.
    pub fn new(param: &SvorParameter, feature_kinds: &[FeatureKind]) -> Result<Self, SvorError> {
        let dim = feature_kinds.len();
        if dim < 1 {
            return Err(SvorError::InvalidDataset("dimension is less than 1".into()));
        }

        let ard = match &param.ard {
            Some(weights) => {
                if weights.len() != dim {
                    return Err(SvorError::DimensionMismatch {
                        expected: dim,
                        found: weights.len(),
                    });
                }
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return Err(SvorError::InvalidParameter("ARD weights sum to zero".into()));
                }
                weights.iter().map(|w| w / total).collect()
            }
            None => vec![1.0 / dim as f64; dim],
        };

        Ok(Self {
            kernel_type: param.kernel_type,
            kappa: param.kappa,
            degree: param.degree,
            ard,
            feature_kinds: feature_kinds.to_vec(),
        })
    }

    /// Number of features the kernel expects.
    pub fn dimension(&self) -> usize {
        self.ard.len()
    }

    /// True if `K(x, y)` is a weighted dot product of the raw features,
    /// so that the model collapses to an explicit weight vector.
    pub fn is_linear(&self) -> bool {
        let linear_family = match self.kernel_type {
            KernelType::Linear => true,
            KernelType::Polynomial => self.degree <= 1,
            KernelType::Gaussian => false,
        };
        linear_family
            && self
                .feature_kinds
                .iter()
                .all(|&k| k == FeatureKind::Continuous)
    }
}

// ─── Standalone kernel evaluation ───────────────────────────────────

/// Weighted dot product with the categorical match/mismatch rule.
#[inline]
fn weighted_dot(x: &[f64], y: &[f64], config: &KernelConfig) -> f64 {
    let mut sum = 0.0;
    for d in 0..config.ard.len() {
        match config.feature_kinds[d] {
            FeatureKind::Continuous => sum += config.ard[d] * x[d] * y[d],
            FeatureKind::Categorical => {
                if x[d] == y[d] {
                    sum += config.ard[d];
                } else {
                    sum -= config.ard[d];
                }
            }
        }
    }
    sum
}

/// Weighted squared distance used by the Gaussian kernel.
#[inline]
fn weighted_sq_dist(x: &[f64], y: &[f64], config: &KernelConfig) -> f64 {
    let mut sum = 0.0;
    for d in 0..config.ard.len() {
        if x[d] == y[d] {
            continue;
        }
        match config.feature_kinds[d] {
            FeatureKind::Continuous => {
                let diff = x[d] - y[d];
                sum += config.kappa * config.ard[d] * diff * diff;
            }
            FeatureKind::Categorical => sum += config.kappa * config.ard[d],
        }
    }
    sum
}

/// Evaluate K(x, y) between two distinct points.
///
/// The diagonal bump is not applied here: it belongs to a training
/// example paired with itself, which only [`KernelEngine`] can tell.
pub fn k_function(x: &[f64], y: &[f64], config: &KernelConfig) -> f64 {
    match config.kernel_type {
        KernelType::Linear => weighted_dot(x, y, config),
        KernelType::Polynomial => {
            let s = weighted_dot(x, y, config);
            if config.degree > 1 {
                powi(s + 1.0, config.degree)
            } else {
                s
            }
        }
        KernelType::Gaussian => {
            let dim = config.dimension() as f64;
            (-weighted_sq_dist(x, y, config) * dim).exp()
        }
    }
}

// ─── Kernel engine for training ─────────────────────────────────────

/// Kernel evaluator over the training set.
///
/// With `cache_all`, row `i` holds `K(i, j)` for `j <= i`, diagonal bump
/// included, and `evaluate` becomes a lookup.
pub struct KernelEngine<'a> {
    x: Vec<&'a [f64]>,
    config: KernelConfig,
    rows: Option<Vec<Vec<f64>>>,
}

impl<'a> KernelEngine<'a> {
    /// Create an engine for the given rows. Rows must match the config's
    /// dimension.
    pub fn new(
        x: &'a [Vec<f64>],
        config: KernelConfig,
        cache_all: bool,
    ) -> Result<Self, SvorError> {
        let dim = config.dimension();
        if let Some(bad) = x.iter().find(|row| row.len() != dim) {
            return Err(SvorError::DimensionMismatch {
                expected: dim,
                found: bad.len(),
            });
        }

        let mut engine = Self {
            x: x.iter().map(|row| row.as_slice()).collect(),
            config,
            rows: None,
        };
        if cache_all {
            engine.rows = Some(engine.compute_rows());
        }
        Ok(engine)
    }

    #[cfg(not(feature = "rayon"))]
    fn compute_rows(&self) -> Vec<Vec<f64>> {
        (0..self.x.len())
            .map(|i| (0..=i).map(|j| self.compute(i, j)).collect())
            .collect()
    }

    #[cfg(feature = "rayon")]
    fn compute_rows(&self) -> Vec<Vec<f64>> {
        use rayon::prelude::*;
        (0..self.x.len())
            .into_par_iter()
            .map(|i| (0..=i).map(|j| self.compute(i, j)).collect())
            .collect()
    }

    #[inline]
    fn compute(&self, i: usize, j: usize) -> f64 {
        let k = k_function(self.x[i], self.x[j], &self.config);
        if i == j {
            k + DIAGONAL_BUMP
        } else {
            k
        }
    }

    /// Evaluate K(x\[i\], x\[j\]).
    #[inline]
    pub fn evaluate(&self, i: usize, j: usize) -> f64 {
        match &self.rows {
            Some(rows) if i >= j => rows[i][j],
            Some(rows) => rows[j][i],
            None => self.compute(i, j),
        }
    }

    /// Number of training rows.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when the engine indexes no rows.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Whether the full matrix was precomputed.
    pub fn is_cached(&self) -> bool {
        self.rows.is_some()
    }

    /// The resolved kernel configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kernel_type: KernelType, kinds: Vec<FeatureKind>) -> KernelConfig {
        let param = SvorParameter {
            kernel_type,
            degree: 2,
            kappa: 0.5,
            ..Default::default()
        };
        KernelConfig::new(&param, &kinds).unwrap()
    }

    #[test]
    fn powi_basic() {
        assert_eq!(powi(2.0, 10), 1024.0);
        assert_eq!(powi(3.0, 0), 1.0);
        assert_eq!(powi(5.0, 1), 5.0);
        assert!((powi(1.5, 3) - 3.375).abs() < 1e-15);
    }

    #[test]
    fn uniform_ard_by_default() {
        let cfg = config(KernelType::Linear, vec![FeatureKind::Continuous; 4]);
        assert_eq!(cfg.ard, vec![0.25; 4]);
    }

    #[test]
    fn supplied_ard_is_normalized() {
        let param = SvorParameter {
            ard: Some(vec![1.0, 3.0]),
            ..Default::default()
        };
        let cfg = KernelConfig::new(&param, &[FeatureKind::Continuous; 2]).unwrap();
        assert!((cfg.ard[0] - 0.25).abs() < 1e-15);
        assert!((cfg.ard[1] - 0.75).abs() < 1e-15);
    }

    #[test]
    fn ard_length_mismatch_is_error() {
        let param = SvorParameter {
            ard: Some(vec![1.0]),
            ..Default::default()
        };
        let err = KernelConfig::new(&param, &[FeatureKind::Continuous; 2]).unwrap_err();
        assert_eq!(err, SvorError::DimensionMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn zero_dimension_is_error() {
        assert!(KernelConfig::new(&SvorParameter::default(), &[]).is_err());
    }

    #[test]
    fn kernel_linear() {
        let cfg = config(KernelType::Linear, vec![FeatureKind::Continuous; 2]);
        // 0.5*1*3 + 0.5*2*4 = 5.5
        assert!((k_function(&[1.0, 2.0], &[3.0, 4.0], &cfg) - 5.5).abs() < 1e-15);
    }

    #[test]
    fn kernel_poly() {
        let cfg = config(KernelType::Polynomial, vec![FeatureKind::Continuous; 2]);
        // (5.5 + 1)^2
        assert!((k_function(&[1.0, 2.0], &[3.0, 4.0], &cfg) - 42.25).abs() < 1e-12);
    }

    #[test]
    fn kernel_gaussian() {
        let cfg = config(KernelType::Gaussian, vec![FeatureKind::Continuous; 2]);
        // dist = 0.5*0.5*(1 + 1) = 0.5, times dim 2 -> exp(-1)
        let expected = (-1.0_f64).exp();
        assert!((k_function(&[1.0, 0.0], &[0.0, 1.0], &cfg) - expected).abs() < 1e-15);
    }

    #[test]
    fn gaussian_self_kernel_is_one() {
        let cfg = config(KernelType::Gaussian, vec![FeatureKind::Continuous; 3]);
        let x = [3.0, -2.0, 0.7];
        assert_eq!(k_function(&x, &x, &cfg), 1.0);
    }

    #[test]
    fn categorical_mismatch_subtracts_weight() {
        let cfg = config(
            KernelType::Linear,
            vec![FeatureKind::Continuous, FeatureKind::Categorical],
        );
        // 0.5*2*2 - 0.5
        assert!((k_function(&[2.0, 1.0], &[2.0, 3.0], &cfg) - 1.5).abs() < 1e-15);
        // 0.5*2*2 + 0.5
        assert!((k_function(&[2.0, 3.0], &[2.0, 3.0], &cfg) - 2.5).abs() < 1e-15);
    }

    #[test]
    fn categorical_mismatch_in_gaussian_distance() {
        let cfg = config(KernelType::Gaussian, vec![FeatureKind::Categorical]);
        // kappa*ard = 0.5, dim 1
        let expected = (-0.5_f64).exp();
        assert!((k_function(&[1.0], &[4.0], &cfg) - expected).abs() < 1e-15);
    }

    #[test]
    fn engine_adds_bump_on_diagonal_only() {
        let data = vec![vec![1.0, 2.0], vec![1.0, 2.0]];
        let cfg = config(KernelType::Linear, vec![FeatureKind::Continuous; 2]);
        let engine = KernelEngine::new(&data, cfg, false).unwrap();
        assert!((engine.evaluate(0, 0) - (2.5 + DIAGONAL_BUMP)).abs() < 1e-15);
        assert!((engine.evaluate(0, 1) - 2.5).abs() < 1e-15);
    }

    #[test]
    fn cached_engine_matches_direct() {
        let data = vec![
            vec![0.5, -1.0, 0.0],
            vec![-0.25, 0.75, 1.0],
            vec![1.0, 0.5, -2.0],
            vec![0.0, 0.0, 0.3],
        ];
        let cfg = config(KernelType::Gaussian, vec![FeatureKind::Continuous; 3]);
        let cached = KernelEngine::new(&data, cfg.clone(), true).unwrap();
        let direct = KernelEngine::new(&data, cfg, false).unwrap();
        assert!(cached.is_cached());
        for i in 0..data.len() {
            for j in 0..data.len() {
                assert_eq!(cached.evaluate(i, j), direct.evaluate(i, j), "({i},{j})");
                assert_eq!(cached.evaluate(i, j), cached.evaluate(j, i));
            }
        }
    }

    #[test]
    fn engine_rejects_ragged_rows() {
        let data = vec![vec![1.0, 2.0], vec![1.0]];
        let cfg = config(KernelType::Linear, vec![FeatureKind::Continuous; 2]);
        assert!(KernelEngine::new(&data, cfg, true).is_err());
    }

    #[test]
    fn linear_detection() {
        assert!(config(KernelType::Linear, vec![FeatureKind::Continuous]).is_linear());
        assert!(!config(KernelType::Polynomial, vec![FeatureKind::Continuous]).is_linear());
        assert!(!config(KernelType::Gaussian, vec![FeatureKind::Continuous]).is_linear());
        assert!(!config(KernelType::Linear, vec![FeatureKind::Categorical]).is_linear());
    }
}
