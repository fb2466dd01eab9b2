//! Noise removal and smoothing of normalized traces.
//!
//! Each trace is processed on its own:
//!
//! 1. A first-order high-pass filter isolates a high-frequency noise estimate
//! 2. The estimate is subtracted from the normalized signal
//! 3. A trailing moving average suppresses residual jitter; samples without a
//!    full window are marked missing

use retina_core::{ConditioningConfig, StimType, TraceId, TraceMetadata};
use serde::{Deserialize, Serialize};

use crate::filtering::{HighPassFilter, MovingAverageFilter};
use crate::normalize::NormalizedTrace;

/// A conditioned sample; `None` where the smoothing window was incomplete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    pub time_ms: f64,
    pub value: Option<f64>,
}

/// Normalized, denoised and smoothed trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedTrace {
    pub id: TraceId,
    pub stimulus: StimType,
    pub is_sac: bool,
    pub samples: Vec<ConditionedSample>,
    pub metadata: TraceMetadata,
}

impl ConditionedTrace {
    /// Defined samples falling inside `[start_ms, end_ms)`
    pub fn defined_in(&self, start_ms: f64, end_ms: f64) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.samples
            .iter()
            .filter(move |s| s.time_ms >= start_ms && s.time_ms < end_ms)
            .filter_map(|s| s.value.map(|v| (s.time_ms, v)))
    }

    /// Number of leading samples without a value
    pub fn undefined_prefix(&self) -> usize {
        self.samples.iter().take_while(|s| s.value.is_none()).count()
    }
}

/// Two-stage conditioning filter configured once per run
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    highpass_cutoff: f64,
    smoothing_window: usize,
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(&ConditioningConfig::default())
    }
}

impl SignalConditioner {
    pub fn new(config: &ConditioningConfig) -> Self {
        Self {
            highpass_cutoff: config.highpass_cutoff,
            smoothing_window: config.smoothing_window,
        }
    }

    /// Noise estimate: the high-pass filtered signal
    pub fn noise_estimate(&self, signal: &[f64]) -> Vec<f64> {
        HighPassFilter::new(self.highpass_cutoff).filter_signal(signal)
    }

    /// Condition a raw value sequence
    pub fn condition_values(&self, signal: &[f64]) -> Vec<Option<f64>> {
        let noise = self.noise_estimate(signal);

        let denoised: Vec<f64> = signal
            .iter()
            .zip(noise.iter())
            .map(|(&x, &n)| x - n)
            .collect();

        MovingAverageFilter::new(self.smoothing_window).filter_signal(&denoised)
    }

    /// Condition a normalized trace; time stamps and identity are preserved
    pub fn condition(&self, trace: &NormalizedTrace) -> ConditionedTrace {
        let smoothed = self.condition_values(&trace.values());

        let samples = trace
            .samples
            .iter()
            .zip(smoothed)
            .map(|(s, value)| ConditionedSample {
                time_ms: s.time_ms,
                value,
            })
            .collect();

        ConditionedTrace {
            id: trace.id,
            stimulus: trace.stimulus,
            is_sac: trace.is_sac,
            samples,
            metadata: trace.metadata.clone(),
        }
    }
}
