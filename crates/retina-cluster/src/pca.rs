//! Principal component analysis used to rank features for clustering.
//!
//! The decomposition never feeds the clustering directly. It tells the caller
//! how many components carry the configured share of variance and which
//! original columns dominate them, and it refuses feature sets whose
//! covariance is singular.

use nalgebra::{DMatrix, Dyn, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use retina_core::{column_names, Error, Feature, PcaConfig, Result, TraceId};
use serde::Serialize;

use crate::standardize::{FeatureMatrix, StandardizedTable};

/// One principal axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalComponent {
    /// 1-based rank by variance explained
    pub index: usize,
    pub eigenvalue: f64,
    pub variance_explained: f64,
    pub cumulative_variance: f64,
    /// Coefficients per input column, in column order
    pub loadings: Vec<f64>,
}

/// Share of the retained components' variance attributable to a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: Feature,
    /// Percent, summing to 100 over all columns
    pub percent: f64,
}

/// Result of the decomposition over an explicit trace set and column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalComponentSpace {
    pub ids: Vec<TraceId>,
    pub columns: Vec<Feature>,
    /// Ordered by descending eigenvalue
    pub components: Vec<PrincipalComponent>,
    /// Projected coordinates, one row per trace, one column per component
    pub scores: Array2<f64>,
    /// Minimal component count reaching the variance threshold
    pub k_star: usize,
    pub contributions: Vec<FeatureContribution>,
}

impl PrincipalComponentSpace {
    pub fn cumulative_variance(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.cumulative_variance).collect()
    }

    /// Columns ranked by contribution to the first `k_star` components
    pub fn top_contributors(&self, n: usize) -> Vec<&FeatureContribution> {
        let mut ranked: Vec<&FeatureContribution> = self.contributions.iter().collect();
        ranked.sort_by(|a, b| b.percent.total_cmp(&a.percent));
        ranked.truncate(n);
        ranked
    }

    /// Projected coordinate of one trace on one component (1-based)
    pub fn score(&self, id: TraceId, component: usize) -> Option<f64> {
        let row = self.ids.iter().position(|&i| i == id)?;
        if component == 0 || component > self.components.len() {
            return None;
        }
        Some(self.scores[[row, component - 1]])
    }
}

fn pearson(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
    let n = a.len() as f64;
    let ma = a.sum() / n;
    let mb = b.sum() / n;

    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }

    cov / (va * vb).sqrt()
}

/// Reject constant and pairwise collinear columns.
///
/// Runs before any covariance or distance is computed.
pub fn check_feature_set(matrix: &FeatureMatrix, collinearity_threshold: f64) -> Result<()> {
    let constant = matrix.constant_columns();
    if !constant.is_empty() {
        return Err(Error::SingularFeatureSet {
            columns: column_names(&constant),
            reason: "column is constant over the trace set".into(),
        });
    }

    for i in 0..matrix.n_cols() {
        for j in (i + 1)..matrix.n_cols() {
            let r = pearson(matrix.values.column(i), matrix.values.column(j));
            if r.abs() >= collinearity_threshold {
                return Err(Error::SingularFeatureSet {
                    columns: column_names(&[matrix.columns[i], matrix.columns[j]]),
                    reason: format!("columns are collinear (r = {r:.4}); substitute a non-collinear alternative"),
                });
            }
        }
    }

    Ok(())
}

fn covariance(centered: &Array2<f64>) -> Array2<f64> {
    let n = centered.nrows();
    centered.t().dot(centered) / (n - 1) as f64
}

/// Eigendecomposition plus the eigenvalue order, largest first
fn sorted_eigen(cov: &Array2<f64>) -> (SymmetricEigen<f64, Dyn>, Vec<usize>) {
    let p = cov.nrows();
    let eigen = SymmetricEigen::new(DMatrix::from_fn(p, p, |i, j| cov[[i, j]]));

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    (eigen, order)
}

fn ensure_full_rank(
    matrix: &FeatureMatrix,
    eigen: &SymmetricEigen<f64, Dyn>,
    order: &[usize],
    rank_tolerance: f64,
) -> Result<()> {
    let n = matrix.n_rows();
    let p = matrix.n_cols();

    let largest = eigen.eigenvalues[order[0]].max(0.0);
    let smallest = eigen.eigenvalues[order[p - 1]];
    if largest > 0.0 && smallest > rank_tolerance * largest {
        return Ok(());
    }

    let null = eigen.eigenvectors.column(order[p - 1]);
    let max_loading = null.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let involved: Vec<Feature> = columns_where(&matrix.columns, |j| {
        null[j].abs() >= 0.1 * max_loading
    });

    let reason = if n <= p {
        format!("{n} traces cannot span {p} columns")
    } else {
        "columns are linearly dependent".to_string()
    };
    Err(Error::SingularFeatureSet {
        columns: column_names(&involved),
        reason,
    })
}

fn centered(matrix: &FeatureMatrix) -> Result<Array2<f64>> {
    if matrix.n_cols() == 0 {
        return Err(Error::InvalidInput("feature matrix has no columns".into()));
    }
    if matrix.n_rows() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: matrix.n_rows(),
        });
    }

    let means: Array1<f64> = matrix
        .values
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::InvalidInput("empty feature matrix".into()))?;
    Ok(&matrix.values - &means)
}

/// Reject column sets whose covariance is singular: constant columns,
/// collinear pairs, and linear dependence among several columns.
pub fn check_singular(
    matrix: &FeatureMatrix,
    collinearity_threshold: f64,
    rank_tolerance: f64,
) -> Result<()> {
    let x = centered(matrix)?;
    check_feature_set(matrix, collinearity_threshold)?;

    let (eigen, order) = sorted_eigen(&covariance(&x));
    ensure_full_rank(matrix, &eigen, &order, rank_tolerance)
}

/// Run PCA over the standardized table minus `config.exclude`
pub fn reduce(table: &StandardizedTable, config: &PcaConfig) -> Result<PrincipalComponentSpace> {
    let columns: Vec<Feature> = table
        .columns()
        .iter()
        .copied()
        .filter(|c| !config.exclude.contains(c))
        .collect();

    if columns.is_empty() {
        return Err(Error::InvalidInput("every column is excluded from PCA".into()));
    }

    let matrix = table.select(&columns)?;
    decompose(&matrix, config)
}

/// Eigendecomposition of the covariance of `matrix`
pub fn decompose(matrix: &FeatureMatrix, config: &PcaConfig) -> Result<PrincipalComponentSpace> {
    let n = matrix.n_rows();
    let p = matrix.n_cols();

    // Center always; scale on request
    let mut x = centered(matrix)?;
    check_feature_set(matrix, config.collinearity_threshold)?;
    if config.scale {
        for mut col in x.columns_mut() {
            let sd = (col.iter().map(|v| v * v).sum::<f64>() / (n - 1) as f64).sqrt();
            col.mapv_inplace(|v| v / sd);
        }
    }

    let (eigen, order) = sorted_eigen(&covariance(&x));
    ensure_full_rank(matrix, &eigen, &order, config.rank_tolerance)?;

    let total: f64 = order.iter().map(|&k| eigen.eigenvalues[k].max(0.0)).sum();

    let mut components = Vec::with_capacity(p);
    let mut vectors = Array2::<f64>::zeros((p, p));
    let mut cumulative = 0.0;
    for (rank, &k) in order.iter().enumerate() {
        let eigenvalue = eigen.eigenvalues[k].max(0.0);
        let mut loadings: Vec<f64> = eigen.eigenvectors.column(k).iter().copied().collect();

        // Largest-magnitude loading positive
        let pivot = loadings
            .iter()
            .copied()
            .fold(0.0_f64, |m, v| if v.abs() > m.abs() { v } else { m });
        if pivot < 0.0 {
            loadings.iter_mut().for_each(|v| *v = -*v);
        }

        for (j, &l) in loadings.iter().enumerate() {
            vectors[[j, rank]] = l;
        }

        let variance_explained = eigenvalue / total;
        cumulative += variance_explained;
        components.push(PrincipalComponent {
            index: rank + 1,
            eigenvalue,
            variance_explained,
            cumulative_variance: cumulative,
            loadings,
        });
    }

    let k_star = components
        .iter()
        .position(|c| c.cumulative_variance >= config.variance_threshold - 1e-12)
        .map(|i| i + 1)
        .unwrap_or(p);

    let scores = x.dot(&vectors);
    let contributions = contributions(&matrix.columns, &components[..k_star]);

    tracing::debug!(
        columns = p,
        k_star,
        threshold = config.variance_threshold,
        "Principal components computed"
    );

    Ok(PrincipalComponentSpace {
        ids: matrix.ids.clone(),
        columns: matrix.columns.clone(),
        components,
        scores,
        k_star,
        contributions,
    })
}

fn columns_where(columns: &[Feature], keep: impl Fn(usize) -> bool) -> Vec<Feature> {
    columns
        .iter()
        .enumerate()
        .filter(|(j, _)| keep(*j))
        .map(|(_, &f)| f)
        .collect()
}

fn contributions(columns: &[Feature], retained: &[PrincipalComponent]) -> Vec<FeatureContribution> {
    let weight: f64 = retained.iter().map(|c| c.eigenvalue).sum();

    columns
        .iter()
        .enumerate()
        .map(|(j, &feature)| {
            let share: f64 = retained
                .iter()
                .map(|c| c.loadings[j].powi(2) * c.eigenvalue)
                .sum();
            FeatureContribution {
                feature,
                percent: if weight > 0.0 { 100.0 * share / weight } else { 0.0 },
            }
        })
        .collect()
}
