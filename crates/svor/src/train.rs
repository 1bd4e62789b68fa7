//! Training pipeline.
//!
//! Provides `svor_train`, which runs the SMO solver on an `OrdinalDataset`
//! and packages the result as an `SvorModel`.

use std::time::Instant;

use crate::error::SvorError;
use crate::solver::{CancellationToken, Solver};
use crate::types::{OrdinalDataset, SvorModel, SvorParameter};

/// Train an ordinal regression model.
pub fn svor_train(dataset: &OrdinalDataset, param: &SvorParameter) -> Result<SvorModel, SvorError> {
    train(dataset, param, None)
}

/// Train an ordinal regression model that stops with
/// [`SvorError::Cancelled`] once `cancel` is triggered.
pub fn svor_train_with_cancel(
    dataset: &OrdinalDataset,
    param: &SvorParameter,
    cancel: &CancellationToken,
) -> Result<SvorModel, SvorError> {
    train(dataset, param, Some(cancel))
}

fn train(
    dataset: &OrdinalDataset,
    param: &SvorParameter,
    cancel: Option<&CancellationToken>,
) -> Result<SvorModel, SvorError> {
    let start = Instant::now();
    let mut solver = Solver::new(dataset, param)?;
    crate::info(&format!(
        "{:?} thresholds: {} examples, {} ranks, dimension {}",
        param.representation,
        dataset.len(),
        dataset.num_ranks(),
        dataset.dimension()
    ));

    let si = solver.solve(cancel)?;
    let duration = start.elapsed().as_secs_f64();
    crate::info(&format!(
        "optimization finished, #iter = {}, #sweeps = {}, {:.3}s",
        si.iterations, si.sweeps, duration
    ));

    // Extract support vectors
    let store = solver.store();
    let mut sv = Vec::new();
    let mut sv_coef = Vec::new();
    let mut sv_indices = Vec::new();
    let mut n_bsv = 0;
    for (i, record) in store.records().iter().enumerate() {
        let beta = record.beta();
        if beta != 0.0 {
            sv.push(dataset.features()[i].clone());
            sv_coef.push(beta);
            sv_indices.push(i + 1); // 1-based
        }
        if record
            .slots
            .iter()
            .any(|s| s.alpha > 0.0 && s.alpha >= store.bound(s.side))
        {
            n_bsv += 1;
        }
    }
    crate::info(&format!("nSV = {}, nBSV = {}", sv.len(), n_bsv));
    for (t, b) in si.thresholds.iter().enumerate() {
        crate::info(&format!("threshold {} = {:.6}", t + 1, b));
    }

    let alphas = (0..store.len()).map(|i| store.multipliers(i)).collect();

    Ok(SvorModel {
        param: param.clone(),
        kernel: solver.kernel().config().clone(),
        num_ranks: dataset.num_ranks(),
        sv,
        sv_coef,
        sv_indices,
        thresholds: si.thresholds,
        alphas,
        iterations: si.iterations,
        sweeps: si.sweeps,
        duration,
    })
}
