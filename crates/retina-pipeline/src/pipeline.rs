//! End-to-end classification run.
//!
//! Per-trace stages run on the rayon pool. The population stages start only
//! once every trace has either produced a feature vector or been rejected.

use rayon::prelude::*;

use retina_cluster::{
    label_features, label_traces, reduce, standardize, ClusterEngine, ClusterResult,
    LabeledFeatureVector, LabeledSample, PrincipalComponentSpace, StandardizedTable,
};
use retina_core::{PipelineConfig, Result, Trace, TraceTable};
use retina_signal::{
    normalize, ConditionedTrace, FeatureExtractor, FeatureTable, SignalConditioner,
    TraceRejection,
};
use serde::Serialize;

/// Everything a run produces, for reporting and visualization
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Every trace that survived normalization, all stimuli, table order
    pub conditioned: Vec<ConditionedTrace>,
    /// Active-stimulus feature records plus all rejections
    pub features: FeatureTable,
    pub standardized: StandardizedTable,
    pub pca: PrincipalComponentSpace,
    pub clusters: ClusterResult,
    pub labeled_samples: Vec<LabeledSample>,
    pub labeled_features: Vec<LabeledFeatureVector>,
}

/// Runs the full classification for one configuration
pub struct ClassificationPipeline {
    config: PipelineConfig,
    conditioner: SignalConditioner,
    engine: ClusterEngine,
}

impl ClassificationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let conditioner = SignalConditioner::new(&config.conditioning);
        let engine =
            ClusterEngine::new(config.clustering.clone()).with_singularity_limits(&config.pca);

        Ok(Self {
            config,
            conditioner,
            engine,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn condition_one(&self, trace: &Trace) -> std::result::Result<ConditionedTrace, TraceRejection> {
        normalize(trace)
            .map(|normalized| self.conditioner.condition(&normalized))
            .map_err(|e| TraceRejection::new(trace.id, trace.stimulus, e))
    }

    /// Normalize and condition every trace in the table
    pub fn condition(&self, table: &TraceTable) -> (Vec<ConditionedTrace>, Vec<TraceRejection>) {
        let results: Vec<_> = table
            .traces()
            .par_iter()
            .map(|trace| self.condition_one(trace))
            .collect();

        let mut conditioned = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        for result in results {
            match result {
                Ok(trace) => conditioned.push(trace),
                Err(rejection) => rejected.push(rejection),
            }
        }

        (conditioned, rejected)
    }

    /// Extract features from the conditioned traces of the active stimulus
    pub fn extract(&self, conditioned: &[ConditionedTrace], frame_period_ms: f64) -> FeatureTable {
        let extractor = FeatureExtractor::new(self.config.features.clone(), frame_period_ms);
        let stimulus = self.config.features.stimulus;

        let results: Vec<_> = conditioned
            .par_iter()
            .filter(|t| t.stimulus == stimulus)
            .map(|trace| {
                extractor
                    .extract(trace)
                    .map_err(|e| TraceRejection::new(trace.id, trace.stimulus, e))
            })
            .collect();

        let mut table = FeatureTable::default();
        for result in results {
            match result {
                Ok(vector) => table.vectors.push(vector),
                Err(rejection) => table.rejected.push(rejection),
            }
        }
        table
    }

    pub fn run(&self, table: &TraceTable) -> Result<PipelineOutput> {
        let stimulus = self.config.features.stimulus;
        tracing::info!(traces = table.len(), ?stimulus, "Starting classification run");

        let (conditioned, normalization_rejects) = self.condition(table);
        let mut features = self.extract(&conditioned, table.frame_period_ms());

        // Normalization failures of the active stimulus belong with the feature rejections
        let (mut rejected, passive): (Vec<TraceRejection>, Vec<TraceRejection>) =
            normalization_rejects
                .into_iter()
                .partition(|r| r.stimulus == stimulus);
        for rejection in &passive {
            tracing::warn!(
                trace = %rejection.id,
                stimulus = ?rejection.stimulus,
                reason = %rejection.reason,
                "Trace dropped from conditioned output"
            );
        }
        rejected.append(&mut features.rejected);
        features.rejected = rejected;

        for rejection in &features.rejected {
            tracing::warn!(trace = %rejection.id, reason = %rejection.reason, "Trace excluded");
        }
        tracing::info!(
            accepted = features.len(),
            rejected = features.rejected.len(),
            "Feature extraction complete"
        );

        self.config.clustering.check_range(features.len())?;

        let standardized = standardize(&features, &self.config.standardize.columns)?;

        let pca = reduce(&standardized, &self.config.pca)?;
        let top: Vec<&str> = pca
            .top_contributors(pca.k_star)
            .iter()
            .map(|c| c.feature.name())
            .collect();
        tracing::info!(k_star = pca.k_star, ?top, "Principal components computed");

        let clusters = self.engine.run(&standardized)?;

        let labeled_samples = label_traces(&conditioned, &clusters.assignment);
        let labeled_features = label_features(&features.vectors, &clusters.assignment);

        tracing::info!(
            k = clusters.assignment.k,
            samples = labeled_samples.len(),
            "Classification run complete"
        );

        Ok(PipelineOutput {
            conditioned,
            features,
            standardized,
            pca,
            clusters,
            labeled_samples,
            labeled_features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retina_core::{Error, Feature, StimType, TraceId, TraceMetadata};

    const FRAME_MS: f64 = 20.0;

    struct Lcg(u64);

    impl Lcg {
        /// Uniform in `[lo, hi)`
        fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            lo + (hi - lo) * ((self.0 >> 11) as f64 / (1u64 << 53) as f64)
        }
    }

    /// Piecewise response: baseline, peak plateau, transient, hyperpolarization
    fn response(id: u32, stimulus: StimType, kind: usize, rng: &mut Lcg) -> Trace {
        let transient = if kind % 2 == 0 { 0.6 } else { 0.15 } + rng.uniform(-0.03, 0.03);
        let hyper = if kind / 2 == 0 { 0.05 } else { -0.4 } + rng.uniform(-0.03, 0.03);
        let baseline = rng.uniform(0.0, 0.1);
        let plateau = rng.uniform(0.8, 1.0);
        let wiggle = rng.uniform(0.01, 0.05);
        let scale = rng.uniform(1.0, 3.0);
        let peak_time = rng.uniform(0.9, 1.2);
        let rise_time = rng.uniform(0.3, 0.6);
        let hyper_wiggle = rng.uniform(0.01, 0.05);

        let values: Vec<f64> = (0..250)
            .map(|i| {
                let t = i as f64 * FRAME_MS;
                let shape = if t < 800.0 {
                    baseline
                } else if t < 1800.0 {
                    plateau
                } else if t < 2700.0 {
                    transient + wiggle * (2.0 * std::f64::consts::PI * t / 1000.0).sin()
                } else if t < 3100.0 {
                    0.0
                } else if t < 4700.0 {
                    hyper + hyper_wiggle * (2.0 * std::f64::consts::PI * t / 1000.0).sin()
                } else {
                    0.0
                };
                scale * shape
            })
            .collect();

        Trace::from_values(
            TraceId(id),
            stimulus,
            id % 4 == 0,
            FRAME_MS,
            &values,
            TraceMetadata::new(scale, peak_time, rise_time),
        )
    }

    /// `n` static cells, the first `moving` of which also have a moving-bar
    /// recording, plus one silent cell
    fn population(n: u32, moving: u32) -> TraceTable {
        let mut rng = Lcg(0x9e37_79b9_7f4a_7c15);
        let mut traces: Vec<Trace> = (1..=n)
            .map(|id| response(id, StimType::Static, id as usize % 4, &mut rng))
            .collect();

        for id in 1..=moving {
            traces.push(response(id, StimType::Moving, id as usize % 4, &mut rng));
        }

        traces.push(Trace::from_values(
            TraceId(n + 1),
            StimType::Static,
            false,
            FRAME_MS,
            &[0.0; 250],
            TraceMetadata::new(0.0, 1.0, 0.5),
        ));

        TraceTable::new(FRAME_MS, traces).unwrap()
    }

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.standardize.columns = config.clustering.columns.clone();
        config.pca.exclude.clear();
        config
    }

    #[test]
    fn test_end_to_end() {
        let pipeline = ClassificationPipeline::new(test_config()).unwrap();
        let output = pipeline.run(&population(24, 3)).unwrap();

        // Silent cell rejected, everything else kept
        assert_eq!(output.features.len(), 24);
        assert_eq!(output.features.rejected.len(), 1);
        assert!(matches!(
            output.features.rejected[0].error,
            Error::PeakZero { trace: TraceId(25), .. }
        ));
        assert_eq!(output.conditioned.len(), 24 + 3);

        let k = output.clusters.assignment.k;
        assert!((2..=8).contains(&k));
        assert_eq!(output.clusters.report.points.len(), 7);
        assert_eq!(output.labeled_features.len(), 24);

        // Static and moving samples of every clustered trace are labeled
        assert_eq!(output.labeled_samples.len(), (24 + 3) * 250);
        assert!(output
            .labeled_samples
            .iter()
            .all(|s| s.cluster >= 1 && s.cluster <= k));
        let moving = output
            .labeled_samples
            .iter()
            .filter(|s| s.stimulus == StimType::Moving)
            .count();
        assert_eq!(moving, 3 * 250);

        let pca_total: f64 = output.pca.contributions.iter().map(|c| c.percent).sum();
        assert!((pca_total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_config_runs() {
        let pipeline = ClassificationPipeline::new(PipelineConfig::default()).unwrap();

        for n in [24, 60] {
            let output = pipeline.run(&population(n, 3)).unwrap();
            assert_eq!(output.features.len(), n as usize);
            assert_eq!(output.standardized.columns(), &Feature::DERIVED);
            assert_eq!(output.pca.columns.len(), 8);
            assert!(!output.pca.columns.contains(&Feature::MedianTransient));
            assert_eq!(output.clusters.columns, PipelineConfig::default().clustering.columns);
        }
    }

    #[test]
    fn test_dependent_cluster_columns_abort() {
        let mut config = PipelineConfig::default();
        config.clustering.columns = vec![
            Feature::MeanTransient,
            Feature::MedianTransient,
            Feature::DifCenters,
        ];

        let result = ClassificationPipeline::new(config)
            .unwrap()
            .run(&population(24, 3));
        assert!(matches!(result, Err(Error::SingularFeatureSet { .. })));
    }

    #[test]
    fn test_run_is_deterministic() {
        let pipeline = ClassificationPipeline::new(test_config()).unwrap();
        let table = population(16, 3);

        let a = pipeline.run(&table).unwrap();
        let b = pipeline.run(&table).unwrap();
        assert_eq!(a.clusters, b.clusters);
        assert_eq!(a.labeled_features, b.labeled_features);
    }

    #[test]
    fn test_moving_stimulus_selected() {
        let mut config = test_config();
        config.features.stimulus = StimType::Moving;

        let pipeline = ClassificationPipeline::new(config).unwrap();
        let output = pipeline.run(&population(14, 12)).unwrap();

        // The silent cell has no moving recording
        assert_eq!(output.features.len(), 12);
        assert!(output.features.rejected.is_empty());
        assert_eq!(output.clusters.assignment.labels.len(), 12);
        assert!(output.features.get(TraceId(13)).is_none());
        assert_eq!(output.labeled_samples.len(), 2 * 12 * 250);
    }

    #[test]
    fn test_population_too_small_for_range() {
        let pipeline = ClassificationPipeline::new(test_config()).unwrap();
        let result = pipeline.run(&population(6, 3));
        assert!(matches!(
            result,
            Err(Error::InvalidRange { k_max: 8, n: 6, .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.conditioning.highpass_cutoff = 1.5;
        assert!(matches!(
            ClassificationPipeline::new(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_output_serializes() {
        let mut config = test_config();
        config.clustering.k_max = 4;
        let output = ClassificationPipeline::new(config)
            .unwrap()
            .run(&population(10, 3))
            .unwrap();

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["features"]["rejected"][0]["id"], 11);
        assert!(json["clusters"]["report"]["points"].is_array());
        assert_eq!(
            json["standardized"]["columns"][0],
            Feature::MeanTransient.name()
        );
    }
}
