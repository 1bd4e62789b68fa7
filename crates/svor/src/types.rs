use crate::error::SvorError;
use crate::kernel::KernelConfig;

/// How the K-1 thresholds enter the dual problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdRepresentation {
    /// SVOREX: two multipliers per example (at the thresholds just above
    /// and just below its rank) with explicit ordering multipliers `mu`.
    Explicit,
    /// SVORIM: one multiplier per example per threshold.
    Implicit,
}

/// Type of kernel function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelType {
    /// `K(x,y) = exp(-dim · Σ κ·w_d·(x_d - y_d)²)`
    Gaussian,
    /// `K(x,y) = (Σ w_d·x_d·y_d + 1)^P` when `P > 1`, the plain weighted
    /// product otherwise.
    Polynomial,
    /// `K(x,y) = Σ w_d·x_d·y_d`
    Linear,
}

/// Whether a feature is numeric or a discrete code.
///
/// Categorical features only take part in kernels through equality:
/// matching codes add `w_d`, mismatching ones subtract it (or add `κ·w_d`
/// to the Gaussian distance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeatureKind {
    /// Numeric value, used through products and squared differences.
    #[default]
    Continuous,
    /// Discrete code, compared only for equality.
    Categorical,
}

/// An ordinal regression problem: dense feature rows with ranks `1..=K`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinalDataset {
    features: Vec<Vec<f64>>,
    ranks: Vec<usize>,
    feature_kinds: Vec<FeatureKind>,
    num_ranks: usize,
}

impl OrdinalDataset {
    /// Build a dataset with all features continuous.
    ///
    /// Every row must have the same length, every value must be finite and
    /// every rank must be at least 1. The number of ranks `K` is the largest rank present, and every
    /// rank in `1..=K` must occur at least once.
    pub fn new(features: Vec<Vec<f64>>, ranks: Vec<usize>) -> Result<Self, SvorError> {
        if features.len() != ranks.len() {
            return Err(SvorError::InvalidDataset(format!(
                "{} feature rows but {} ranks",
                features.len(),
                ranks.len()
            )));
        }

        let dim = features.first().map_or(0, Vec::len);
        if let Some(row) = features.iter().position(|r| r.len() != dim) {
            return Err(SvorError::InvalidDataset(format!(
                "row {} has {} features, expected {}",
                row + 1,
                features[row].len(),
                dim
            )));
        }

        if let Some(row) = features
            .iter()
            .position(|r| r.iter().any(|v| !v.is_finite()))
        {
            return Err(SvorError::InvalidDataset(format!(
                "row {} has a non-finite feature",
                row + 1
            )));
        }

        if ranks.iter().any(|&r| r == 0) {
            return Err(SvorError::InvalidDataset("ranks must start at 1".into()));
        }

        let num_ranks = ranks.iter().copied().max().unwrap_or(0);
        if num_ranks > ranks.len() {
            return Err(SvorError::InvalidDataset(format!(
                "rank {} exceeds the {} examples; ranks must be contiguous",
                num_ranks,
                ranks.len()
            )));
        }
        let mut seen = vec![false; num_ranks];
        for &r in &ranks {
            seen[r - 1] = true;
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(SvorError::InvalidDataset(format!(
                "rank {} has no examples; ranks must be contiguous",
                missing + 1
            )));
        }

        Ok(Self {
            feature_kinds: vec![FeatureKind::Continuous; dim],
            features,
            ranks,
            num_ranks,
        })
    }

    /// Replace the per-feature kinds. Categorical columns must hold codes
    /// that compare exactly (e.g. small integers).
    pub fn with_feature_kinds(mut self, kinds: Vec<FeatureKind>) -> Result<Self, SvorError> {
        if kinds.len() != self.dimension() {
            return Err(SvorError::DimensionMismatch {
                expected: self.dimension(),
                found: kinds.len(),
            });
        }
        self.feature_kinds = kinds;
        Ok(self)
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// True when the dataset holds no examples.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Number of features per example.
    pub fn dimension(&self) -> usize {
        self.feature_kinds.len()
    }

    /// Number of ordinal ranks `K`.
    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    /// Number of thresholds `K - 1`.
    pub fn num_thresholds(&self) -> usize {
        self.num_ranks.saturating_sub(1)
    }

    /// Feature rows, in example order.
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Ranks, in example order.
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// Per-feature kinds.
    pub fn feature_kinds(&self) -> &[FeatureKind] {
        &self.feature_kinds
    }
}

/// Solver and kernel parameters.
///
/// Defaults: explicit thresholds,
/// Gaussian kernel with `κ = 1`, `C = 1`, `TOL = 1e-3`, `EPS = 1e-6`.
#[derive(Debug, Clone, PartialEq)]
pub struct SvorParameter {
    /// Threshold representation (SVOREX or SVORIM).
    pub representation: ThresholdRepresentation,
    /// Kernel function type.
    pub kernel_type: KernelType,
    /// Gaussian bandwidth factor κ.
    pub kappa: f64,
    /// Polynomial degree P.
    pub degree: u32,
    /// Regularization constant C.
    pub c: f64,
    /// Box bound for multipliers of examples ranked at or below a
    /// threshold. Falls back to `c`.
    pub c_up: Option<f64>,
    /// Box bound for multipliers of examples ranked above a threshold.
    /// Falls back to `c`.
    pub c_down: Option<f64>,
    /// Tolerance of the KKT gap.
    pub tol: f64,
    /// Numerical precision used to decide whether a multiplier sits on a bound.
    pub eps: f64,
    /// Precompute the full lower-triangular kernel matrix.
    pub cache_all: bool,
    /// Per-feature ARD weights. Normalized to sum 1; uniform when `None`.
    pub ard: Option<Vec<f64>>,
    /// Upper limit on committed pair updates.
    pub max_iter: usize,
}

impl Default for SvorParameter {
    fn default() -> Self {
        Self {
            representation: ThresholdRepresentation::Explicit,
            kernel_type: KernelType::Gaussian,
            kappa: 1.0,
            degree: 1,
            c: 1.0,
            c_up: None,
            c_down: None,
            tol: 1e-3,
            eps: 1e-6,
            cache_all: true,
            ard: None,
            max_iter: 10_000_000,
        }
    }
}

impl SvorParameter {
    /// Box bound for "up" multipliers.
    #[inline]
    pub fn c_up(&self) -> f64 {
        self.c_up.unwrap_or(self.c)
    }

    /// Box bound for "down" multipliers.
    #[inline]
    pub fn c_down(&self) -> f64 {
        self.c_down.unwrap_or(self.c)
    }

    /// Validate parameter values (independent of training data).
    pub fn validate(&self) -> Result<(), SvorError> {
        if !(self.eps > 0.0 && self.eps < 1.0) {
            return Err(SvorError::InvalidParameter("eps must lie in (0, 1)".into()));
        }

        if self.tol <= 0.0 || !self.tol.is_finite() {
            return Err(SvorError::InvalidParameter("tol <= 0".into()));
        }

        let floor = self.eps * self.eps;
        for (name, value) in [("C", self.c), ("C_up", self.c_up()), ("C_down", self.c_down())] {
            if !value.is_finite() || value <= floor {
                return Err(SvorError::InvalidParameter(format!("{name} is too small")));
            }
        }

        let kappa_ok = self.kappa > 0.0 && self.kappa.is_finite();
        if self.kernel_type == KernelType::Gaussian && !kappa_ok {
            return Err(SvorError::InvalidParameter("kappa <= 0".into()));
        }

        if self.kernel_type == KernelType::Polynomial && self.degree == 0 {
            return Err(SvorError::InvalidParameter(
                "degree of polynomial kernel must be >= 1".into(),
            ));
        }

        if let Some(ard) = &self.ard {
            if ard.iter().any(|&w| w < 0.0 || !w.is_finite()) {
                return Err(SvorError::InvalidParameter(
                    "ARD weights must be finite and non-negative".into(),
                ));
            }
            if ard.iter().sum::<f64>() <= 0.0 {
                return Err(SvorError::InvalidParameter("ARD weights sum to zero".into()));
            }
        }

        if self.max_iter == 0 {
            return Err(SvorError::InvalidParameter("max_iter must be positive".into()));
        }

        Ok(())
    }
}

/// A trained ordinal regression model.
#[derive(Debug, Clone, PartialEq)]
pub struct SvorModel {
    /// Parameters used during training.
    pub param: SvorParameter,
    /// Resolved kernel (normalized ARD weights and feature kinds).
    pub kernel: KernelConfig,
    /// Number of ranks `K`.
    pub num_ranks: usize,
    /// Support vectors (examples with a nonzero signed coefficient).
    pub sv: Vec<Vec<f64>>,
    /// Signed coefficient of each support vector.
    pub sv_coef: Vec<f64>,
    /// Original indices of support vectors in the training set (1-based).
    pub sv_indices: Vec<usize>,
    /// Non-decreasing thresholds, `K - 1` values.
    pub thresholds: Vec<f64>,
    /// Per-example multipliers after training, one row per training
    /// example (`[up, down]` or one entry per threshold).
    pub alphas: Vec<Vec<f64>>,
    /// Committed pair updates.
    pub iterations: usize,
    /// Full examine-all sweeps.
    pub sweeps: usize,
    /// Wall-clock training time in seconds.
    pub duration: f64,
}

impl SvorModel {
    /// Threshold representation the model was trained with.
    pub fn representation(&self) -> ThresholdRepresentation {
        self.param.representation
    }

    /// Return total number of support vectors.
    pub fn support_vector_count(&self) -> usize {
        self.sv.len()
    }

    /// Return original 1-based support-vector indices.
    pub fn support_vector_indices(&self) -> &[usize] {
        &self.sv_indices
    }

    /// Return the `K - 1` thresholds.
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }
}
