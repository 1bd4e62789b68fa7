//! Lightweight scoring helpers for ordinal predictions.

/// Mean absolute difference between predicted and true ranks.
pub fn mean_absolute_error(predictions: &[usize], ranks: &[usize]) -> f64 {
    if predictions.is_empty() || predictions.len() != ranks.len() {
        return 0.0;
    }

    let total: usize = predictions
        .iter()
        .zip(ranks.iter())
        .map(|(&pred, &rank)| pred.abs_diff(rank))
        .sum();

    total as f64 / ranks.len() as f64
}

/// Fraction of examples whose predicted rank differs from the true rank.
pub fn misclassification_rate(predictions: &[usize], ranks: &[usize]) -> f64 {
    if predictions.is_empty() || predictions.len() != ranks.len() {
        return 0.0;
    }

    let wrong = predictions
        .iter()
        .zip(ranks.iter())
        .filter(|(&pred, &rank)| pred != rank)
        .count();

    wrong as f64 / ranks.len() as f64
}
