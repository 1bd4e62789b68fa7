/// Errors returned by svor-rs operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SvorError {
    /// A solver parameter failed validation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The dataset is malformed (ragged rows, bad ranks, bad feature kinds).
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Training was requested on a dataset without examples.
    #[error("dataset is empty")]
    EmptyDataset,

    /// The solver needs at least two examples to form a pair.
    #[error("dataset has {count} example(s); at least 2 are required")]
    TooFewExamples {
        /// Number of examples supplied.
        count: usize,
    },

    /// A feature vector does not match the training dimension.
    #[error("dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch {
        /// Training dimension.
        expected: usize,
        /// Dimension of the offending vector.
        found: usize,
    },

    /// The KKT gap at a threshold stayed above tolerance after the solver stopped.
    #[error("KKT conditions violated at threshold {threshold}: gap {gap:.6}")]
    ConvergenceFailure {
        /// 1-based threshold index.
        threshold: usize,
        /// Measured `b_low - b_up` gap.
        gap: f64,
    },

    /// Resolved thresholds decrease by more than the tolerance.
    #[error("threshold {threshold} = {value:.6} is below the previous threshold {previous:.6}")]
    NonMonotonicThresholds {
        /// 1-based threshold index.
        threshold: usize,
        /// Value at `threshold`.
        value: f64,
        /// Value at `threshold - 1`.
        previous: f64,
    },

    /// The free-example list was asked to do something inconsistent.
    #[error("cache list: {0}")]
    CacheList(String),

    /// Training was stopped through a [`crate::CancellationToken`].
    #[error("training cancelled")]
    Cancelled,
}
