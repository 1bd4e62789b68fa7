#![no_main]
use libfuzzer_sys::fuzz_target;
use svor_rs::{svor_train, KernelType, OrdinalDataset, SvorParameter, ThresholdRepresentation};

// Byte layout: [flags, dim, (rank, features...)*]. Small values keep each
// run cheap; every error path is acceptable, panics are not.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let flags = data[0];
    let dim = 1 + (data[1] % 3) as usize;
    let mut features = Vec::new();
    let mut ranks = Vec::new();
    for chunk in data[2..].chunks_exact(dim + 1).take(24) {
        ranks.push(1 + (chunk[0] % 4) as usize);
        features.push(chunk[1..].iter().map(|&b| (b as f64 - 128.0) / 32.0).collect());
    }

    let Ok(dataset) = OrdinalDataset::new(features, ranks) else {
        return;
    };
    let param = SvorParameter {
        representation: if flags & 1 == 0 {
            ThresholdRepresentation::Explicit
        } else {
            ThresholdRepresentation::Implicit
        },
        kernel_type: match (flags >> 1) % 3 {
            0 => KernelType::Gaussian,
            1 => KernelType::Polynomial,
            _ => KernelType::Linear,
        },
        degree: 2,
        max_iter: 20_000,
        ..Default::default()
    };
    svor_rs::set_quiet(true);
    if let Ok(model) = svor_train(&dataset, &param) {
        for x in dataset.features() {
            let _ = model.predict(x);
        }
    }
});
