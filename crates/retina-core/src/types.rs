//! Fundamental record types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

/// Stable integer identifier of a recorded cell response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId(pub u32);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stimulus presented while the trace was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimType {
    Static,
    Moving,
}

/// Unit used by the scalar timing metadata (`peakT`, `riseT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn to_ms(&self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value * 1000.0,
            TimeUnit::Milliseconds => value,
        }
    }
}

/// Half-open stimulus-relative time range `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl TimeWindow {
    pub const fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn contains(&self, time_ms: f64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms
    }

    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }

    /// Number of frames the window spans at the given frame period
    pub fn frame_slots(&self, frame_period_ms: f64) -> usize {
        if frame_period_ms <= 0.0 || self.duration_ms() <= 0.0 {
            return 0;
        }
        (self.duration_ms() / frame_period_ms).ceil() as usize
    }

    pub fn is_valid(&self) -> bool {
        self.start_ms.is_finite() && self.end_ms.is_finite() && self.end_ms > self.start_ms
    }
}

/// One raw measurement of a trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time_ms: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time_ms: f64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Scalar metadata recorded alongside a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Peak response amplitude used for normalization
    pub peak: f64,
    /// Time of the response peak (unit set by `FeatureConfig::metadata_time_unit`)
    pub peak_time: f64,
    /// Time of response onset, same unit as `peak_time`
    pub rise_time: f64,
    /// Free-text annotation from the recording sheet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Other numeric attributes carried through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl TraceMetadata {
    pub fn new(peak: f64, peak_time: f64, rise_time: f64) -> Self {
        Self {
            peak,
            peak_time,
            rise_time,
            annotation: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }
}

/// A recorded response of one cell under one stimulus type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: TraceId,
    pub stimulus: StimType,
    /// Starburst amacrine cell flag
    pub is_sac: bool,
    pub samples: Vec<Sample>,
    pub metadata: TraceMetadata,
}

impl Trace {
    pub fn new(
        id: TraceId,
        stimulus: StimType,
        is_sac: bool,
        samples: Vec<Sample>,
        metadata: TraceMetadata,
    ) -> Self {
        Self {
            id,
            stimulus,
            is_sac,
            samples,
            metadata,
        }
    }

    /// Build a trace from evenly spaced values starting at t = 0
    pub fn from_values(
        id: TraceId,
        stimulus: StimType,
        is_sac: bool,
        frame_period_ms: f64,
        values: &[f64],
        metadata: TraceMetadata,
    ) -> Self {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(i as f64 * frame_period_ms, v))
            .collect();
        Self::new(id, stimulus, is_sac, samples, metadata)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_time_ms(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(Error::InvalidInput(format!("trace {} has no samples", self.id)));
        }

        let non_finite = self
            .samples
            .iter()
            .position(|s| !s.time_ms.is_finite() || !s.value.is_finite());
        if let Some(bad) = non_finite {
            return Err(Error::InvalidInput(format!(
                "trace {} has a non-finite sample at index {}",
                self.id, bad
            )));
        }

        if self.samples.windows(2).any(|w| w[1].time_ms <= w[0].time_ms) {
            return Err(Error::InvalidInput(format!(
                "trace {} sample times are not strictly increasing",
                self.id
            )));
        }

        let m = &self.metadata;
        if !m.peak_time.is_finite() || !m.rise_time.is_finite() {
            return Err(Error::InvalidInput(format!(
                "trace {} has non-finite timing metadata",
                self.id
            )));
        }

        Ok(())
    }
}

/// Validated trace population handed over by the ingestion boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTable {
    frame_period_ms: f64,
    traces: Vec<Trace>,
}

impl TraceTable {
    /// Validate and wrap a set of traces.
    ///
    /// Rejects a non-positive frame period, duplicated (id, stimulus) pairs,
    /// empty traces, non-finite values and unordered sample times. Peak
    /// amplitude is not checked here; a zero peak disqualifies only its own
    /// trace during normalization.
    pub fn new(frame_period_ms: f64, traces: Vec<Trace>) -> Result<Self> {
        if !frame_period_ms.is_finite() || frame_period_ms <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "frame period must be positive, got {frame_period_ms}"
            )));
        }

        let mut seen = HashSet::with_capacity(traces.len());
        for trace in &traces {
            if !seen.insert((trace.id, trace.stimulus)) {
                return Err(Error::DuplicateTrace {
                    trace: trace.id,
                    stimulus: trace.stimulus,
                });
            }
            trace.validate()?;
        }

        Ok(Self {
            frame_period_ms,
            traces,
        })
    }

    pub fn frame_period_ms(&self) -> f64 {
        self.frame_period_ms
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// Traces recorded under one stimulus type, in table order
    pub fn by_stimulus(&self, stimulus: StimType) -> impl Iterator<Item = &Trace> {
        self.traces.iter().filter(move |t| t.stimulus == stimulus)
    }

    pub fn get(&self, id: TraceId, stimulus: StimType) -> Option<&Trace> {
        self.traces
            .iter()
            .find(|t| t.id == id && t.stimulus == stimulus)
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

/// Named numeric column of the per-trace feature record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    MeanTransient,
    MedianTransient,
    SdTransient,
    MeanHyper,
    MedianHyper,
    SdHyper,
    Rise,
    Slope,
    TShift,
    Auc,
    DifCenters,
    Peak,
    PeakTime,
    RiseTime,
}

impl Feature {
    /// Columns derived from the conditioned signal
    pub const DERIVED: [Feature; 11] = [
        Feature::MeanTransient,
        Feature::MedianTransient,
        Feature::SdTransient,
        Feature::MeanHyper,
        Feature::MedianHyper,
        Feature::SdHyper,
        Feature::Rise,
        Feature::Slope,
        Feature::TShift,
        Feature::Auc,
        Feature::DifCenters,
    ];

    /// Passthrough metadata columns
    pub const METADATA: [Feature; 3] = [Feature::Peak, Feature::PeakTime, Feature::RiseTime];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::MeanTransient => "MeanTransient",
            Feature::MedianTransient => "MedianTransient",
            Feature::SdTransient => "SDTransient",
            Feature::MeanHyper => "MeanHyper",
            Feature::MedianHyper => "MedianHyper",
            Feature::SdHyper => "SDHyper",
            Feature::Rise => "Rise",
            Feature::Slope => "Slope",
            Feature::TShift => "TShift",
            Feature::Auc => "AUC",
            Feature::DifCenters => "difCenters",
            Feature::Peak => "peak",
            Feature::PeakTime => "peakT",
            Feature::RiseTime => "riseT",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a column list for error reporting
pub fn column_names(columns: &[Feature]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(id: u32, stimulus: StimType, values: &[f64]) -> Trace {
        Trace::from_values(
            TraceId(id),
            stimulus,
            false,
            20.0,
            values,
            TraceMetadata::new(1.0, 0.04, 0.02),
        )
    }

    #[test]
    fn test_time_window_is_half_open() {
        let w = TimeWindow::new(2000.0, 2500.0);
        assert!(w.contains(2000.0));
        assert!(w.contains(2499.9));
        assert!(!w.contains(2500.0));
        assert_eq!(w.frame_slots(20.0), 25);
    }

    #[test]
    fn test_time_unit_conversion() {
        assert_eq!(TimeUnit::Seconds.to_ms(1.25), 1250.0);
        assert_eq!(TimeUnit::Milliseconds.to_ms(1.25), 1.25);
    }

    #[test]
    fn test_from_values_spacing() {
        let t = trace(1, StimType::Static, &[0.0, 1.0, 2.0]);
        assert_eq!(t.samples[2].time_ms, 40.0);
        assert_eq!(t.last_time_ms(), Some(40.0));
    }

    #[test]
    fn test_table_rejects_duplicates() {
        let result = TraceTable::new(
            20.0,
            vec![
                trace(1, StimType::Static, &[1.0]),
                trace(1, StimType::Static, &[2.0]),
            ],
        );
        assert!(matches!(result, Err(Error::DuplicateTrace { .. })));
    }

    #[test]
    fn test_same_id_allowed_across_stimuli() {
        let table = TraceTable::new(
            20.0,
            vec![
                trace(1, StimType::Static, &[1.0]),
                trace(1, StimType::Moving, &[2.0]),
            ],
        )
        .unwrap();

        assert_eq!(table.by_stimulus(StimType::Static).count(), 1);
        assert!(table.get(TraceId(1), StimType::Moving).is_some());
    }

    #[test]
    fn test_table_rejects_bad_shape() {
        assert!(TraceTable::new(0.0, vec![]).is_err());
        assert!(TraceTable::new(20.0, vec![trace(1, StimType::Static, &[])]).is_err());
        assert!(TraceTable::new(20.0, vec![trace(1, StimType::Static, &[f64::NAN])]).is_err());

        let mut unordered = trace(2, StimType::Static, &[1.0, 2.0]);
        unordered.samples[1].time_ms = 0.0;
        assert!(TraceTable::new(20.0, vec![unordered]).is_err());
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(Feature::Auc.name(), "AUC");
        assert_eq!(Feature::SdHyper.to_string(), "SDHyper");
        assert_eq!(column_names(&[Feature::Rise, Feature::Slope]), vec!["Rise", "Slope"]);
    }

    #[test]
    fn test_stimulus_serializes_lowercase() {
        let json = serde_json::to_string(&StimType::Moving).unwrap();
        assert_eq!(json, "\"moving\"");
    }
}
