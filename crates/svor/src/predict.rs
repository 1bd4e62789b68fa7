//! Prediction with a trained model.
//!
//! The decision value is `f(x) = sum_sv coef * K(sv, x)`; the rank is one
//! plus the number of leading thresholds that `f(x)` exceeds.

use crate::error::SvorError;
use crate::kernel::k_function;
use crate::metrics::{mean_absolute_error, misclassification_rate};
use crate::types::{OrdinalDataset, SvorModel};

/// Scores of a model on a labelled dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean absolute rank error.
    pub mean_absolute_error: f64,
    /// Fraction of examples with a wrong rank.
    pub misclassification_rate: f64,
    /// Number of support vectors in the model.
    pub support_vectors: usize,
}

impl SvorModel {
    /// Latent value `f(x)`.
    pub fn decision_value(&self, x: &[f64]) -> Result<f64, SvorError> {
        let dim = self.kernel.dimension();
        if x.len() != dim {
            return Err(SvorError::DimensionMismatch {
                expected: dim,
                found: x.len(),
            });
        }
        Ok(self
            .sv
            .iter()
            .zip(self.sv_coef.iter())
            .map(|(sv, &coef)| coef * k_function(sv, x, &self.kernel))
            .sum())
    }

    /// Rank in `1..=num_ranks` for a decision value.
    pub fn rank_of(&self, f: f64) -> usize {
        1 + self.thresholds.iter().take_while(|&&b| f > b).count()
    }

    /// Predict the rank of one example.
    pub fn predict(&self, x: &[f64]) -> Result<usize, SvorError> {
        Ok(self.rank_of(self.decision_value(x)?))
    }

    /// Predict the rank of every row.
    #[cfg(not(feature = "rayon"))]
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, SvorError> {
        rows.iter().map(|x| self.predict(x)).collect()
    }

    /// Predict the rank of every row.
    #[cfg(feature = "rayon")]
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, SvorError> {
        use rayon::prelude::*;
        rows.par_iter().map(|x| self.predict(x)).collect()
    }

    /// Score the model on a labelled dataset.
    pub fn evaluate(&self, dataset: &OrdinalDataset) -> Result<Evaluation, SvorError> {
        if dataset.is_empty() {
            return Err(SvorError::EmptyDataset);
        }
        let predictions = self.predict_batch(dataset.features())?;
        Ok(Evaluation {
            mean_absolute_error: mean_absolute_error(&predictions, dataset.ranks()),
            misclassification_rate: misclassification_rate(&predictions, dataset.ranks()),
            support_vectors: self.support_vector_count(),
        })
    }

    /// Weight vector `w` with `f(x) = w · x`, available when the kernel is
    /// a weighted dot product over continuous features.
    pub fn linear_weights(&self) -> Option<Vec<f64>> {
        if !self.kernel.is_linear() {
            return None;
        }
        let mut w = vec![0.0; self.kernel.dimension()];
        for (sv, &coef) in self.sv.iter().zip(self.sv_coef.iter()) {
            for (d, wd) in w.iter_mut().enumerate() {
                *wd += coef * sv[d];
            }
        }
        for (wd, &a) in w.iter_mut().zip(self.kernel.ard.iter()) {
            *wd *= a;
        }
        Some(w)
    }
}
