//! Population z-scoring of continuous feature columns.

use ndarray::{Array2, Axis};
use retina_core::{Error, Feature, Result, TraceId};
use retina_signal::{FeatureTable, FeatureVector};
use serde::Serialize;
use std::collections::HashSet;

/// Mean and SD used to standardize one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnStats {
    pub feature: Feature,
    pub mean: f64,
    pub sd: f64,
}

/// Numeric matrix over an explicit trace set and column ordering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    pub ids: Vec<TraceId>,
    pub is_sac: Vec<bool>,
    pub columns: Vec<Feature>,
    /// Rows follow `ids`, columns follow `columns`
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Columns whose values do not vary across rows
    pub fn constant_columns(&self) -> Vec<Feature> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(j, _)| {
                let col = self.values.column(*j);
                let first = col.iter().next().copied().unwrap_or(0.0);
                let scale = first.abs().max(1.0);
                col.iter().all(|v| (v - first).abs() <= 1e-12 * scale)
            })
            .map(|(_, &f)| f)
            .collect()
    }
}

/// Feature table with the chosen continuous columns replaced by z-scores.
///
/// Statistics are fixed at construction; filtering rows later never
/// recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardizedTable {
    ids: Vec<TraceId>,
    is_sac: Vec<bool>,
    columns: Vec<Feature>,
    values: Array2<f64>,
    stats: Vec<ColumnStats>,
    source: Vec<FeatureVector>,
}

impl StandardizedTable {
    pub fn ids(&self) -> &[TraceId] {
        &self.ids
    }

    pub fn is_sac(&self) -> &[bool] {
        &self.is_sac
    }

    pub fn columns(&self) -> &[Feature] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn column_index(&self, feature: Feature) -> Option<usize> {
        self.columns.iter().position(|&c| c == feature)
    }

    /// Standardized records: scaled columns replaced, everything else untouched
    pub fn vectors(&self) -> Vec<FeatureVector> {
        self.source
            .iter()
            .enumerate()
            .map(|(row, original)| {
                let mut v = original.clone();
                for (j, &feature) in self.columns.iter().enumerate() {
                    set_value(&mut v, feature, self.values[[row, j]]);
                }
                v
            })
            .collect()
    }

    /// Keep only the listed traces, preserving row order and statistics
    pub fn retain(&self, keep: &[TraceId]) -> Self {
        let keep: HashSet<TraceId> = keep.iter().copied().collect();
        let rows: Vec<usize> = (0..self.ids.len())
            .filter(|&i| keep.contains(&self.ids[i]))
            .collect();

        Self {
            ids: rows.iter().map(|&i| self.ids[i]).collect(),
            is_sac: rows.iter().map(|&i| self.is_sac[i]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &rows),
            stats: self.stats.clone(),
            source: rows.iter().map(|&i| self.source[i].clone()).collect(),
        }
    }

    /// Matrix of the requested standardized columns, in the requested order
    pub fn select(&self, columns: &[Feature]) -> Result<FeatureMatrix> {
        let indices = columns
            .iter()
            .map(|&f| {
                self.column_index(f).ok_or_else(|| {
                    Error::InvalidInput(format!("column {f} was not standardized"))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(FeatureMatrix {
            ids: self.ids.clone(),
            is_sac: self.is_sac.clone(),
            columns: columns.to_vec(),
            values: self.values.select(Axis(1), &indices),
        })
    }
}

fn set_value(v: &mut FeatureVector, feature: Feature, value: f64) {
    let slot = match feature {
        Feature::MeanTransient => &mut v.mean_transient,
        Feature::MedianTransient => &mut v.median_transient,
        Feature::SdTransient => &mut v.sd_transient,
        Feature::MeanHyper => &mut v.mean_hyper,
        Feature::MedianHyper => &mut v.median_hyper,
        Feature::SdHyper => &mut v.sd_hyper,
        Feature::Rise => &mut v.rise,
        Feature::Slope => &mut v.slope,
        Feature::TShift => &mut v.t_shift,
        Feature::Auc => &mut v.auc,
        Feature::DifCenters => &mut v.dif_centers,
        Feature::Peak => &mut v.peak,
        Feature::PeakTime => &mut v.peak_time,
        Feature::RiseTime => &mut v.rise_time,
    };
    *slot = value;
}

/// Z-score `columns` over every trace in `table`.
///
/// Uses the sample SD (n - 1). All columns are checked before any value is
/// scaled, so a zero-variance column yields [`Error::DegenerateColumn`]
/// without partial output.
pub fn standardize(table: &FeatureTable, columns: &[Feature]) -> Result<StandardizedTable> {
    let n = table.len();
    if n < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: n,
        });
    }

    let mut seen = HashSet::new();
    if let Some(dup) = columns.iter().find(|c| !seen.insert(**c)) {
        return Err(Error::InvalidInput(format!("column {dup} listed twice")));
    }

    let raw = Array2::from_shape_fn((n, columns.len()), |(i, j)| {
        table.vectors[i].value(columns[j])
    });

    let mut stats = Vec::with_capacity(columns.len());
    for (j, &feature) in columns.iter().enumerate() {
        let col = raw.column(j);
        let mean = col.sum() / n as f64;
        let ss: f64 = col.iter().map(|v| (v - mean).powi(2)).sum();
        let sd = (ss / (n - 1) as f64).sqrt();

        if !sd.is_finite() || sd <= 1e-12 * mean.abs().max(1.0) {
            return Err(Error::DegenerateColumn {
                column: feature.name().to_string(),
            });
        }
        stats.push(ColumnStats { feature, mean, sd });
    }

    let values = Array2::from_shape_fn((n, columns.len()), |(i, j)| {
        (raw[[i, j]] - stats[j].mean) / stats[j].sd
    });

    tracing::debug!(rows = n, columns = columns.len(), "Standardized feature table");

    Ok(StandardizedTable {
        ids: table.ids(),
        is_sac: table.vectors.iter().map(|v| v.is_sac).collect(),
        columns: columns.to_vec(),
        values,
        stats,
        source: table.vectors.clone(),
    })
}
