//! Window-based summary features of conditioned traces.
//!
//! All windows are stimulus-relative except the AUC window, which is anchored
//! at each trace's own peak time.

use retina_core::{
    Error, Feature, FeatureConfig, Result, StimType, TimeWindow, TraceId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::conditioner::ConditionedTrace;

/// Summary statistics of one trace plus its passthrough metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub id: TraceId,
    pub is_sac: bool,

    /// Transient phase
    pub mean_transient: f64,
    pub median_transient: f64,
    pub sd_transient: f64,

    /// Hyperpolarization phase
    pub mean_hyper: f64,
    pub median_hyper: f64,
    pub sd_hyper: f64,

    /// `1 - mean` over the baseline window
    pub rise: f64,
    /// `rise / (peakT - riseT)`
    pub slope: f64,
    /// Registered duration measured from rise onset (ms)
    pub t_shift: f64,
    /// Rectangle-rule integral over the peak-anchored window
    pub auc: f64,
    /// `mean_transient - median_transient`
    pub dif_centers: f64,

    pub peak: f64,
    pub peak_time: f64,
    pub rise_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl FeatureVector {
    /// Value of a named numeric column
    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::MeanTransient => self.mean_transient,
            Feature::MedianTransient => self.median_transient,
            Feature::SdTransient => self.sd_transient,
            Feature::MeanHyper => self.mean_hyper,
            Feature::MedianHyper => self.median_hyper,
            Feature::SdHyper => self.sd_hyper,
            Feature::Rise => self.rise,
            Feature::Slope => self.slope,
            Feature::TShift => self.t_shift,
            Feature::Auc => self.auc,
            Feature::DifCenters => self.dif_centers,
            Feature::Peak => self.peak,
            Feature::PeakTime => self.peak_time,
            Feature::RiseTime => self.rise_time,
        }
    }

    /// Values of several columns, in the given order
    pub fn row(&self, columns: &[Feature]) -> Vec<f64> {
        columns.iter().map(|&c| self.value(c)).collect()
    }
}

/// A trace excluded from the feature table and the reason why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRejection {
    pub id: TraceId,
    pub stimulus: StimType,
    pub reason: String,
    #[serde(skip)]
    pub error: Error,
}

impl TraceRejection {
    pub fn new(id: TraceId, stimulus: StimType, error: Error) -> Self {
        Self {
            id,
            stimulus,
            reason: error.to_string(),
            error,
        }
    }
}

/// Feature records of the active population plus every excluded trace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureTable {
    pub vectors: Vec<FeatureVector>,
    pub rejected: Vec<TraceRejection>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn ids(&self) -> Vec<TraceId> {
        self.vectors.iter().map(|v| v.id).collect()
    }

    pub fn get(&self, id: TraceId) -> Option<&FeatureVector> {
        self.vectors.iter().find(|v| v.id == id)
    }

    /// All values of one column, in row order
    pub fn column(&self, feature: Feature) -> Vec<f64> {
        self.vectors.iter().map(|v| v.value(feature)).collect()
    }
}

/// Mean of a non-empty slice
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a non-empty slice (mean of the two middle values for even length)
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation (n - 1 denominator); needs at least two values
pub fn sample_sd(values: &[f64]) -> f64 {
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Rectangle-rule integral of the defined samples in `window`
pub fn area_under_curve(trace: &ConditionedTrace, window: TimeWindow, frame_period_ms: f64) -> f64 {
    trace
        .defined_in(window.start_ms, window.end_ms)
        .map(|(_, v)| v)
        .sum::<f64>()
        * frame_period_ms
}

/// Computes [`FeatureVector`]s from conditioned traces
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    frame_period_ms: f64,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig, frame_period_ms: f64) -> Self {
        Self {
            config,
            frame_period_ms,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Peak-anchored AUC window of a trace, in milliseconds
    pub fn auc_window(&self, trace: &ConditionedTrace) -> TimeWindow {
        let anchor = self.config.metadata_time_unit.to_ms(trace.metadata.peak_time);
        TimeWindow::new(anchor, anchor + self.config.auc_length_ms)
    }

    /// Defined values of a window, failing when coverage is insufficient
    fn window_values(
        &self,
        trace: &ConditionedTrace,
        name: &str,
        window: TimeWindow,
        min_samples: usize,
    ) -> Result<Vec<f64>> {
        let values: Vec<f64> = trace
            .defined_in(window.start_ms, window.end_ms)
            .map(|(_, v)| v)
            .collect();

        let slots = window.frame_slots(self.frame_period_ms);
        let required = ((slots as f64 * self.config.min_window_coverage).ceil() as usize).max(min_samples);

        if values.len() < required {
            return Err(Error::IncompleteWindow {
                trace: trace.id,
                window: name.to_string(),
                start_ms: window.start_ms,
                end_ms: window.end_ms,
                available: values.len(),
                required,
            });
        }

        Ok(values)
    }

    /// Extract all features of one conditioned trace
    pub fn extract(&self, trace: &ConditionedTrace) -> Result<FeatureVector> {
        let cfg = &self.config;
        let meta = &trace.metadata;

        // Transient phase
        let transient = self.window_values(trace, "transient", cfg.transient_window, 2)?;
        let mean_transient = mean(&transient);
        let median_transient = median(&transient);
        let sd_transient = sample_sd(&transient);

        // Hyperpolarization phase
        let hyper = self.window_values(trace, "hyper", cfg.hyper_window, 2)?;
        let mean_hyper = mean(&hyper);
        let median_hyper = median(&hyper);
        let sd_hyper = sample_sd(&hyper);

        // Baseline
        let baseline = self.window_values(trace, "rise", cfg.rise_window, 1)?;
        let rise = 1.0 - mean(&baseline);

        // Peak-anchored area
        let auc_window = self.auc_window(trace);
        self.window_values(trace, "auc", auc_window, 1)?;
        let auc = area_under_curve(trace, auc_window, self.frame_period_ms);

        let onset = meta.peak_time - meta.rise_time;
        if onset.abs() < f64::EPSILON {
            return Err(Error::DegenerateSlope {
                trace: trace.id,
                peak_time: meta.peak_time,
                rise_time: meta.rise_time,
            });
        }
        let slope = rise / onset;

        let rise_ms = cfg.metadata_time_unit.to_ms(meta.rise_time);
        let t_shift = trace
            .samples
            .iter()
            .map(|s| s.time_ms - rise_ms)
            .fold(f64::NEG_INFINITY, f64::max);

        tracing::trace!(trace = %trace.id, rise, auc, "Features extracted");

        Ok(FeatureVector {
            id: trace.id,
            is_sac: trace.is_sac,
            mean_transient,
            median_transient,
            sd_transient,
            mean_hyper,
            median_hyper,
            sd_hyper,
            rise,
            slope,
            t_shift,
            auc,
            dif_centers: mean_transient - median_transient,
            peak: meta.peak,
            peak_time: meta.peak_time,
            rise_time: meta.rise_time,
            annotation: meta.annotation.clone(),
            extra: meta.extra.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioner::ConditionedSample;
    use retina_core::TraceMetadata;

    const FRAME_MS: f64 = 20.0;

    /// 5 s trace at 20 ms sampled from `f(time_ms)`, first 9 samples undefined
    fn conditioned_from(f: impl Fn(f64) -> f64, peak_time_s: f64, rise_time_s: f64) -> ConditionedTrace {
        let samples = (0..250)
            .map(|i| {
                let t = i as f64 * FRAME_MS;
                ConditionedSample {
                    time_ms: t,
                    value: if i < 9 { None } else { Some(f(t)) },
                }
            })
            .collect();

        ConditionedTrace {
            id: TraceId(4),
            stimulus: StimType::Static,
            is_sac: false,
            samples,
            metadata: TraceMetadata::new(3.0, peak_time_s, rise_time_s),
        }
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default(), FRAME_MS)
    }

    #[test]
    fn test_statistics_helpers() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 6.0]), 3.0);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!((sample_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138090).abs() < 1e-6);
    }

    #[test]
    fn test_piecewise_constant_features() {
        let trace = conditioned_from(
            |t| {
                if (2000.0..2500.0).contains(&t) {
                    0.8
                } else if (3500.0..4500.0).contains(&t) {
                    -0.2
                } else {
                    0.1
                }
            },
            1.0,
            0.5,
        );
        let f = extractor().extract(&trace).unwrap();

        assert!((f.mean_transient - 0.8).abs() < 1e-12);
        assert!((f.median_transient - 0.8).abs() < 1e-12);
        assert!(f.sd_transient.abs() < 1e-12);
        assert!((f.mean_hyper + 0.2).abs() < 1e-12);
        assert!((f.rise - 0.9).abs() < 1e-12);
        assert!((f.slope - 1.8).abs() < 1e-12); // 0.9 / (1.0 - 0.5)
        assert!((f.t_shift - 4480.0).abs() < 1e-9); // 4980 - 500
        assert!((f.auc - 0.1 * 25.0 * FRAME_MS).abs() < 1e-9);
        assert!(f.dif_centers.abs() < 1e-12);
    }

    #[test]
    fn test_auc_anchored_at_peak() {
        let ramp = |t: f64| t / 1000.0;
        let early = extractor().extract(&conditioned_from(ramp, 1.0, 0.2)).unwrap();
        let late = extractor().extract(&conditioned_from(ramp, 2.0, 0.2)).unwrap();

        // Window shifted by one second adds 1.0 to each of 25 samples
        assert!((late.auc - early.auc - 25.0 * FRAME_MS).abs() < 1e-9);
    }

    #[test]
    fn test_auc_scales_linearly() {
        let shape = |t: f64| (t / 300.0).sin() + 0.25;
        let base = conditioned_from(shape, 1.3, 0.4);
        let mut scaled = base.clone();
        for s in scaled.samples.iter_mut() {
            s.value = s.value.map(|v| v * 3.5);
        }

        let ex = extractor();
        let a = ex.extract(&base).unwrap().auc;
        let b = ex.extract(&scaled).unwrap().auc;
        assert!((b - 3.5 * a).abs() < 1e-9 * a.abs().max(1.0));
    }

    #[test]
    fn test_skew_indicator() {
        // Transient window with one large outlier pulls the mean above the median
        let trace = conditioned_from(|t| if t == 2000.0 { 5.0 } else { 0.5 }, 1.0, 0.5);
        let f = extractor().extract(&trace).unwrap();
        assert!(f.dif_centers > 0.0);
        assert!((f.dif_centers - (f.mean_transient - f.median_transient)).abs() < 1e-15);
    }

    #[test]
    fn test_degenerate_slope() {
        let trace = conditioned_from(|_| 0.3, 0.7, 0.7);
        assert!(matches!(
            extractor().extract(&trace),
            Err(Error::DegenerateSlope { trace: TraceId(4), .. })
        ));
    }

    #[test]
    fn test_short_trace_incomplete() {
        let mut trace = conditioned_from(|_| 0.3, 1.0, 0.5);
        trace.samples.truncate(190); // ends at 3780 ms, hyper window unfilled

        match extractor().extract(&trace) {
            Err(Error::IncompleteWindow { window, .. }) => assert_eq!(window, "hyper"),
            other => panic!("expected IncompleteWindow, got {:?}", other),
        }
    }

    #[test]
    fn test_auc_window_beyond_trace() {
        let trace = conditioned_from(|_| 0.3, 4.9, 0.5);
        match extractor().extract(&trace) {
            Err(Error::IncompleteWindow { window, .. }) => assert_eq!(window, "auc"),
            other => panic!("expected IncompleteWindow, got {:?}", other),
        }
    }

    #[test]
    fn test_rise_tolerates_smoothing_prefix() {
        // 9 of 38 baseline slots are undefined, still above half coverage
        let trace = conditioned_from(|_| 0.0, 1.0, 0.5);
        let f = extractor().extract(&trace).unwrap();
        assert!((f.rise - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_milliseconds_metadata() {
        let config = FeatureConfig {
            metadata_time_unit: retina_core::TimeUnit::Milliseconds,
            ..FeatureConfig::default()
        };
        let ex = FeatureExtractor::new(config, FRAME_MS);
        let trace = conditioned_from(|_| 0.3, 1000.0, 500.0);

        assert_eq!(ex.auc_window(&trace), TimeWindow::new(1000.0, 1500.0));
        let f = ex.extract(&trace).unwrap();
        assert!((f.t_shift - 4480.0).abs() < 1e-9);
    }

    #[test]
    fn test_value_lookup_matches_fields() {
        let trace = conditioned_from(|t| t / 5000.0, 1.0, 0.5);
        let f = extractor().extract(&trace).unwrap();

        assert_eq!(f.value(Feature::Auc), f.auc);
        assert_eq!(f.value(Feature::PeakTime), 1.0);
        assert_eq!(f.row(&[Feature::Rise, Feature::Slope]), vec![f.rise, f.slope]);
    }

    #[test]
    fn test_rejection_record_shape() {
        let mut table = FeatureTable::default();
        table.rejected.push(TraceRejection::new(
            TraceId(9),
            StimType::Static,
            Error::PeakZero {
                trace: TraceId(9),
                peak: 0.0,
            },
        ));

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["rejected"][0]["id"], 9);
        assert_eq!(json["rejected"][0]["stimulus"], "static");
        assert!(json["rejected"][0]["reason"].as_str().unwrap().contains("Trace 9"));
        assert!(json["rejected"][0].get("error").is_none());
    }
}
