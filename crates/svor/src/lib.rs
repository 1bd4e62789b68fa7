//! # svor-rs
//!
//! Support Vector Ordinal Regression trained with an SMO-style active-set
//! dual solver. Two threshold representations are provided:
//!
//! - **Explicit** (SVOREX): every example carries an "up" and a "down"
//!   multiplier at the two thresholds around its rank, and threshold
//!   ordering is enforced through non-negative coupling multipliers.
//! - **Implicit** (SVORIM): every example carries one multiplier per
//!   threshold and the ordering of thresholds follows from the dual.
//!
//! ```no_run
//! use svor_rs::{svor_train, OrdinalDataset, SvorParameter, KernelType};
//!
//! let data = OrdinalDataset::new(
//!     vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]],
//!     vec![1, 1, 2, 2, 3, 3],
//! )?;
//! let param = SvorParameter {
//!     kernel_type: KernelType::Linear,
//!     ..Default::default()
//! };
//! let model = svor_train(&data, &param)?;
//! assert_eq!(model.predict(&[4.5])?, 3);
//! # Ok::<(), svor_rs::SvorError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon`: parallel kernel-cache fill and batch prediction (off by default).

use std::sync::atomic::{AtomicBool, Ordering};

pub mod types;
pub mod error;
pub mod kernel;
pub mod cache;
pub mod alphas;
pub mod bias;
mod takestep;
pub mod solver;
pub mod train;
pub mod predict;
pub mod metrics;

pub use error::SvorError;
pub use predict::Evaluation;
pub use solver::{CancellationToken, SolutionInfo, Solver};
pub use train::{svor_train, svor_train_with_cancel};
pub use types::*;

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence progress messages emitted through [`info`].
///
/// Warnings about numerical trouble are still routed to `log::warn!`.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

/// Emit a progress message unless quiet mode is on.
pub(crate) fn info(msg: &str) {
    if !QUIET.load(Ordering::Relaxed) {
        log::info!("{}", msg);
    }
}
