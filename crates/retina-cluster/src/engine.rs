//! Hierarchical clustering with automatic choice of the cluster count.

use rayon::prelude::*;
use retina_core::{ClusterConfig, Feature, PcaConfig, Result, TraceId};
use serde::Serialize;

use crate::distance::DistanceMatrix;
use crate::linkage::Dendrogram;
use crate::pca::check_singular;
use crate::standardize::{FeatureMatrix, StandardizedTable};
use crate::validity::{select_k, ClusterValidityReport, ValidityEvaluator, ValidityPoint};

/// Cluster membership of one trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterLabel {
    pub id: TraceId,
    pub is_sac: bool,
    /// 1-based cluster label
    pub cluster: usize,
}

/// Flat partition of the clustered traces, in input row order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    pub k: usize,
    pub labels: Vec<ClusterLabel>,
}

impl ClusterAssignment {
    fn from_labels(matrix: &FeatureMatrix, k: usize, labels: &[usize]) -> Self {
        Self {
            k,
            labels: matrix
                .ids
                .iter()
                .zip(matrix.is_sac.iter())
                .zip(labels.iter())
                .map(|((&id, &is_sac), &cluster)| ClusterLabel { id, is_sac, cluster })
                .collect(),
        }
    }

    pub fn label_of(&self, id: TraceId) -> Option<usize> {
        self.labels.iter().find(|l| l.id == id).map(|l| l.cluster)
    }

    /// Members per cluster; index 0 holds cluster 1
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for label in &self.labels {
            sizes[label.cluster - 1] += 1;
        }
        sizes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    /// Columns that entered the distance computation
    pub columns: Vec<Feature>,
    pub assignment: ClusterAssignment,
    pub report: ClusterValidityReport,
    pub dendrogram: Dendrogram,
}

/// Runs distance, linkage and validity sweep for one configuration
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    config: ClusterConfig,
    collinearity_threshold: f64,
    rank_tolerance: f64,
}

impl ClusterEngine {
    /// Engine with the default singularity limits of [`PcaConfig`]
    pub fn new(config: ClusterConfig) -> Self {
        let limits = PcaConfig::default();
        Self {
            config,
            collinearity_threshold: limits.collinearity_threshold,
            rank_tolerance: limits.rank_tolerance,
        }
    }

    /// Use the collinearity and rank limits of `pca` for the clustering columns
    pub fn with_singularity_limits(mut self, pca: &PcaConfig) -> Self {
        self.collinearity_threshold = pca.collinearity_threshold;
        self.rank_tolerance = pca.rank_tolerance;
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Cluster the configured columns of a standardized table
    pub fn run(&self, table: &StandardizedTable) -> Result<ClusterResult> {
        let matrix = table.select(&self.config.columns)?;
        self.cluster(&matrix)
    }

    pub fn cluster(&self, matrix: &FeatureMatrix) -> Result<ClusterResult> {
        let n = matrix.n_rows();
        self.config.check_range(n)?;

        check_singular(matrix, self.collinearity_threshold, self.rank_tolerance)?;

        tracing::debug!(
            traces = n,
            columns = matrix.n_cols(),
            metric = ?self.config.metric,
            linkage = ?self.config.linkage,
            "Clustering feature matrix"
        );

        let distances = DistanceMatrix::compute(&matrix.values, self.config.metric);
        let dendrogram = Dendrogram::build(&distances, self.config.linkage);
        let evaluator = ValidityEvaluator::new(&distances);

        let index = self.config.index;
        let points = (self.config.k_min..=self.config.k_max)
            .into_par_iter()
            .map(|k| -> Result<ValidityPoint> {
                let labels = dendrogram.cut(k)?;
                Ok(ValidityPoint {
                    k,
                    value: evaluator.evaluate(index, &labels),
                })
            })
            .collect::<Result<Vec<ValidityPoint>>>()?;

        let best = select_k(
            &points,
            index,
            self.config.tie_break,
            self.config.tie_tolerance,
        )?;

        let labels = dendrogram.cut(best.k)?;
        let assignment = ClusterAssignment::from_labels(matrix, best.k, &labels);

        tracing::info!(
            k = best.k,
            index = index.name(),
            value = best.value,
            sizes = ?assignment.sizes(),
            "Selected cluster count"
        );

        Ok(ClusterResult {
            columns: matrix.columns.clone(),
            assignment,
            report: ClusterValidityReport {
                index,
                tie_break: self.config.tie_break,
                points,
                best_k: best.k,
                best_value: best.value,
            },
            dendrogram,
        })
    }
}
