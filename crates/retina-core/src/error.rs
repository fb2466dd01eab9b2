//! Error types for the bipolar cell classification pipeline.

use thiserror::Error;

use crate::types::{StimType, TraceId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Trace {trace}: peak amplitude {peak} cannot be used for normalization")]
    PeakZero { trace: TraceId, peak: f64 },

    #[error(
        "Trace {trace}: {window} window [{start_ms}, {end_ms}) ms has {available} usable samples, need {required}"
    )]
    IncompleteWindow {
        trace: TraceId,
        window: String,
        start_ms: f64,
        end_ms: f64,
        available: usize,
        required: usize,
    },

    #[error("Trace {trace}: slope undefined, peak time {peak_time} equals rise time {rise_time}")]
    DegenerateSlope {
        trace: TraceId,
        peak_time: f64,
        rise_time: f64,
    },

    #[error("Feature column {column} has zero variance")]
    DegenerateColumn { column: String },

    #[error("Singular feature set {columns:?}: {reason}")]
    SingularFeatureSet { columns: Vec<String>, reason: String },

    #[error("Invalid cluster range [{k_min}, {k_max}] for {n} traces (need 2 <= k_min <= k_max <= n - 1)")]
    InvalidRange { k_min: usize, k_max: usize, n: usize },

    #[error("Duplicate trace {trace} for {stimulus:?} stimulus")]
    DuplicateTrace { trace: TraceId, stimulus: StimType },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient data: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },
}

impl Error {
    /// Whether this error only disqualifies a single trace rather than the run
    pub fn is_per_trace(&self) -> bool {
        matches!(
            self,
            Error::PeakZero { .. } | Error::IncompleteWindow { .. } | Error::DegenerateSlope { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_trace_classification() {
        let peak = Error::PeakZero {
            trace: TraceId(3),
            peak: 0.0,
        };
        assert!(peak.is_per_trace());

        let column = Error::DegenerateColumn {
            column: "Rise".into(),
        };
        assert!(!column.is_per_trace());
    }

    #[test]
    fn test_error_messages_name_the_trace() {
        let err = Error::DegenerateSlope {
            trace: TraceId(17),
            peak_time: 1.2,
            rise_time: 1.2,
        };
        assert!(err.to_string().contains("Trace 17"));
    }
}
