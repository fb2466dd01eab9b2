//! Peak-amplitude normalization.

use retina_core::{Error, Result, Sample, StimType, Trace, TraceId, TraceMetadata};
use serde::{Deserialize, Serialize};

/// A trace rescaled so its peak amplitude equals one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrace {
    pub id: TraceId,
    pub stimulus: StimType,
    pub is_sac: bool,
    pub samples: Vec<Sample>,
    pub metadata: TraceMetadata,
}

impl NormalizedTrace {
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

/// Divide every raw sample by the trace's recorded peak.
///
/// Fails with [`Error::PeakZero`] when the peak is zero or not finite, so no
/// infinite or NaN sample ever leaves this stage.
pub fn normalize(trace: &Trace) -> Result<NormalizedTrace> {
    let peak = trace.metadata.peak;
    if !peak.is_finite() || peak == 0.0 {
        return Err(Error::PeakZero {
            trace: trace.id,
            peak,
        });
    }

    let samples = trace
        .samples
        .iter()
        .map(|s| Sample::new(s.time_ms, s.value / peak))
        .collect();

    Ok(NormalizedTrace {
        id: trace.id,
        stimulus: trace.stimulus,
        is_sac: trace.is_sac,
        samples,
        metadata: trace.metadata.clone(),
    })
}
