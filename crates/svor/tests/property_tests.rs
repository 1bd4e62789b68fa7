//! Property-based tests for svor-rs using proptest.
//!
//! These tests verify core invariants:
//! - Kernel symmetry and the diagonal bump
//! - Every multiplier stays inside its box while examining examples
//! - Cached decision values agree with a direct kernel sum
//! - The cache list holds exactly the free examples
//! - A full consistency pass is idempotent
//! - Solving closes the KKT gap at every threshold
//! - Trained thresholds are non-decreasing and predictions are valid ranks

use proptest::prelude::*;
use svor_rs::cache::CacheList;
use svor_rs::kernel::{k_function, KernelConfig, KernelEngine, DIAGONAL_BUMP};
use svor_rs::{
    svor_train, FeatureKind, KernelType, OrdinalDataset, Solver, SvorParameter,
    ThresholdRepresentation,
};

/// Random dataset with `n` rows of `dim` features and every rank in
/// `1..=k` present.
fn dataset_strategy() -> impl Strategy<Value = OrdinalDataset> {
    (2usize..=4, 1usize..=3, 6usize..=12).prop_flat_map(|(k, dim, n)| {
        (
            prop::collection::vec(prop::collection::vec(-3.0f64..3.0, dim), n),
            prop::collection::vec(1usize..=k, n),
        )
            .prop_map(move |(features, mut ranks)| {
                for (i, r) in ranks.iter_mut().take(k).enumerate() {
                    *r = i + 1;
                }
                OrdinalDataset::new(features, ranks).unwrap()
            })
    })
}

fn representation_strategy() -> impl Strategy<Value = ThresholdRepresentation> {
    prop_oneof![
        Just(ThresholdRepresentation::Explicit),
        Just(ThresholdRepresentation::Implicit),
    ]
}

fn kernel_strategy() -> impl Strategy<Value = KernelType> {
    prop_oneof![
        Just(KernelType::Gaussian),
        Just(KernelType::Polynomial),
        Just(KernelType::Linear),
    ]
}

fn param(representation: ThresholdRepresentation, kernel_type: KernelType) -> SvorParameter {
    SvorParameter {
        representation,
        kernel_type,
        degree: 2,
        c: 2.0,
        ..Default::default()
    }
}

/// Assert the state invariants that must hold between pair updates.
fn check_state(solver: &Solver<'_>) -> Result<(), TestCaseError> {
    let store = solver.store();
    let mut total = 0.0;
    for (i, record) in store.records().iter().enumerate() {
        for slot in &record.slots {
            prop_assert!(slot.alpha >= 0.0);
            prop_assert!(slot.alpha <= store.bound(slot.side));
        }
        prop_assert_eq!(solver.cache().contains(i), record.is_free());
        if solver.cache().contains(i) {
            prop_assert!((record.f_cache - solver.compute_f(i)).abs() < 1e-8);
        }
        total += record.beta();
    }
    prop_assert!(total.abs() < 1e-9);
    prop_assert!(solver.cache().is_consistent());
    prop_assert!(solver.bias().mu.iter().all(|&m| m >= 0.0));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn kernel_is_symmetric(
        kernel_type in kernel_strategy(),
        pair in (1usize..=4).prop_flat_map(|d| (
            prop::collection::vec(-5.0f64..5.0, d),
            prop::collection::vec(-5.0f64..5.0, d),
        )),
    ) {
        let (x, y) = pair;
        let param = SvorParameter {
            kernel_type,
            degree: 3,
            ..Default::default()
        };
        let cfg = KernelConfig::new(&param, &vec![FeatureKind::Continuous; x.len()]).unwrap();
        let kxy = k_function(&x, &y, &cfg);
        let kyx = k_function(&y, &x, &cfg);
        prop_assert!((kxy - kyx).abs() <= 1e-12 * (1.0 + kxy.abs()));
        if kernel_type == KernelType::Gaussian {
            prop_assert!(kxy > 0.0 && kxy <= 1.0);
        }

        let rows = vec![x.clone(), y.clone()];
        let engine = KernelEngine::new(&rows, cfg.clone(), false).unwrap();
        prop_assert_eq!(engine.evaluate(0, 1), kxy);
        prop_assert_eq!(engine.evaluate(0, 0), k_function(&x, &x, &cfg) + DIAGONAL_BUMP);
    }

    #[test]
    fn examine_keeps_state_consistent(
        data in dataset_strategy(),
        representation in representation_strategy(),
        kernel_type in kernel_strategy(),
    ) {
        let param = param(representation, kernel_type);
        let mut solver = Solver::new(&data, &param).unwrap();
        solver.check_alphas().unwrap();
        check_state(&solver)?;
        for _ in 0..2 {
            for i in 0..data.len() {
                solver.examine_example(i).unwrap();
                check_state(&solver)?;
            }
        }
    }

    #[test]
    fn active_steps_keep_state_consistent(
        data in dataset_strategy(),
        representation in representation_strategy(),
        kernel_type in kernel_strategy(),
    ) {
        let param = param(representation, kernel_type);
        let mut solver = Solver::new(&data, &param).unwrap();
        solver.check_alphas().unwrap();
        for i in 0..data.len() {
            solver.examine_example(i).unwrap();
        }
        check_state(&solver)?;
        for _ in 0..4 * data.len() {
            if !solver.step_active().unwrap() {
                break;
            }
            check_state(&solver)?;
        }
    }

    #[test]
    fn solve_closes_every_gap(
        data in dataset_strategy(),
        representation in representation_strategy(),
        kernel_type in kernel_strategy(),
    ) {
        svor_rs::set_quiet(true);
        let param = param(representation, kernel_type);
        let mut solver = Solver::new(&data, &param).unwrap();
        let info = solver
            .solve(None)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(info.thresholds.len(), data.num_thresholds());
        for t in 0..data.num_thresholds() {
            let gap = match representation {
                ThresholdRepresentation::Explicit => solver.bias().chain_gap(t),
                ThresholdRepresentation::Implicit => solver.bias().gap(t),
            };
            prop_assert!(gap <= param.tol, "gap {} at threshold {}", gap, t + 1);
        }
        check_state(&solver)?;
    }

    #[test]
    fn check_alphas_is_idempotent(
        data in dataset_strategy(),
        representation in representation_strategy(),
    ) {
        let param = param(representation, KernelType::Gaussian);
        let mut solver = Solver::new(&data, &param).unwrap();
        solver.check_alphas().unwrap();
        for i in 0..data.len() {
            solver.examine_example(i).unwrap();
        }

        solver.check_alphas().unwrap();
        let bias = solver.bias().clone();
        let members = solver.cache().to_vec();
        let records = solver.store().records().to_vec();

        solver.check_alphas().unwrap();
        prop_assert_eq!(&bias, solver.bias());
        prop_assert_eq!(members, solver.cache().to_vec());
        prop_assert_eq!(records.as_slice(), solver.store().records());
    }

    #[test]
    fn trained_thresholds_are_monotone(
        data in dataset_strategy(),
        representation in representation_strategy(),
        kernel_type in kernel_strategy(),
    ) {
        svor_rs::set_quiet(true);
        let param = param(representation, kernel_type);
        let model = svor_train(&data, &param).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(model.thresholds.len(), data.num_thresholds());
        for w in model.thresholds.windows(2) {
            prop_assert!(w[0] <= w[1]);
        }
        for x in data.features() {
            let rank = model.predict(x).unwrap();
            prop_assert!((1..=data.num_ranks()).contains(&rank));
        }
    }

    #[test]
    fn cache_list_tracks_membership(
        ops in prop::collection::vec((0usize..16, any::<bool>()), 1..64),
    ) {
        let mut list = CacheList::new(16);
        let mut model = std::collections::BTreeSet::new();
        for (i, insert) in ops {
            if insert {
                prop_assert_eq!(list.add(i).is_ok(), model.insert(i));
            } else {
                prop_assert_eq!(list.remove(i).is_ok(), model.remove(&i));
            }
            prop_assert!(list.is_consistent());
            prop_assert_eq!(list.len(), model.len());
            for j in 0..16 {
                prop_assert_eq!(list.contains(j), model.contains(&j));
            }
        }
    }
}
