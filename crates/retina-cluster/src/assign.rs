//! Joining cluster labels back onto trace and feature records.
//!
//! Both joins are inner joins by trace ID: records of traces that were not
//! clustered are dropped, and input order is preserved.

use retina_core::{StimType, TraceId};
use retina_signal::{ConditionedTrace, FeatureVector};
use serde::Serialize;
use std::collections::HashMap;

use crate::engine::ClusterAssignment;

/// One conditioned sample tagged with its trace's cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabeledSample {
    pub id: TraceId,
    pub stimulus: StimType,
    pub is_sac: bool,
    pub time_ms: f64,
    pub value: Option<f64>,
    pub cluster: usize,
}

/// Feature record with its cluster label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledFeatureVector {
    pub cluster: usize,
    #[serde(flatten)]
    pub features: FeatureVector,
}

fn lookup(assignment: &ClusterAssignment) -> HashMap<TraceId, usize> {
    assignment.labels.iter().map(|l| (l.id, l.cluster)).collect()
}

/// Every sample of every labeled trace receives that trace's label
pub fn label_traces(traces: &[ConditionedTrace], assignment: &ClusterAssignment) -> Vec<LabeledSample> {
    let labels = lookup(assignment);

    traces
        .iter()
        .filter_map(|trace| labels.get(&trace.id).map(|&cluster| (trace, cluster)))
        .flat_map(|(trace, cluster)| {
            trace.samples.iter().map(move |s| LabeledSample {
                id: trace.id,
                stimulus: trace.stimulus,
                is_sac: trace.is_sac,
                time_ms: s.time_ms,
                value: s.value,
                cluster,
            })
        })
        .collect()
}

pub fn label_features(
    vectors: &[FeatureVector],
    assignment: &ClusterAssignment,
) -> Vec<LabeledFeatureVector> {
    let labels = lookup(assignment);

    vectors
        .iter()
        .filter_map(|v| {
            labels.get(&v.id).map(|&cluster| LabeledFeatureVector {
                cluster,
                features: v.clone(),
            })
        })
        .collect()
}
