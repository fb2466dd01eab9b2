//! Benchmarks for per-trace conditioning and feature extraction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use retina_core::{FeatureConfig, StimType, Trace, TraceId, TraceMetadata};
use retina_signal::{normalize, FeatureExtractor, SignalConditioner};

fn create_test_trace(n_samples: usize) -> Trace {
    let values: Vec<f64> = (0..n_samples)
        .map(|i| {
            let t = i as f64 * 20.0;
            let response = (-(t - 1000.0).powi(2) / 2.0e5).exp();
            response + 0.05 * (i as f64 * 1.7).sin()
        })
        .collect();

    Trace::from_values(
        TraceId(0),
        StimType::Static,
        false,
        20.0,
        &values,
        TraceMetadata::new(1.0, 1.0, 0.4),
    )
}

fn benchmark_conditioning(c: &mut Criterion) {
    let conditioner = SignalConditioner::default();
    let trace = create_test_trace(250);
    let normalized = normalize(&trace).unwrap();

    c.bench_function("condition_250", |b| {
        b.iter(|| conditioner.condition(black_box(&normalized)))
    });

    let long = normalize(&create_test_trace(5000)).unwrap();
    c.bench_function("condition_5000", |b| {
        b.iter(|| conditioner.condition(black_box(&long)))
    });
}

fn benchmark_feature_extraction(c: &mut Criterion) {
    let conditioner = SignalConditioner::default();
    let extractor = FeatureExtractor::new(FeatureConfig::default(), 20.0);
    let conditioned = conditioner.condition(&normalize(&create_test_trace(250)).unwrap());

    c.bench_function("extract_features_250", |b| {
        b.iter(|| extractor.extract(black_box(&conditioned)))
    });
}

criterion_group!(benches, benchmark_conditioning, benchmark_feature_extraction);
criterion_main!(benches);
