//! Internal cluster validity indices and selection of the cluster count.

use retina_core::{Error, Result, TieBreak, ValidityIndex};
use serde::Serialize;

use crate::distance::DistanceMatrix;

/// Index value for one candidate cluster count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidityPoint {
    pub k: usize,
    pub value: f64,
}

/// Index curve over the evaluated range and the selected count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterValidityReport {
    pub index: ValidityIndex,
    pub tie_break: TieBreak,
    /// One point per k, ascending
    pub points: Vec<ValidityPoint>,
    pub best_k: usize,
    pub best_value: f64,
}

impl ClusterValidityReport {
    pub fn value_at(&self, k: usize) -> Option<f64> {
        self.points.iter().find(|p| p.k == k).map(|p| p.value)
    }
}

/// Scores partitions of a fixed distance matrix.
///
/// The sorted pairwise distances and their prefix sums are computed once and
/// shared by every candidate partition.
pub struct ValidityEvaluator<'a> {
    distances: &'a DistanceMatrix,
    prefix: Vec<f64>,
}

impl<'a> ValidityEvaluator<'a> {
    pub fn new(distances: &'a DistanceMatrix) -> Self {
        let mut sorted: Vec<f64> = distances.pairs().map(|(_, _, d)| d).collect();
        sorted.sort_by(f64::total_cmp);

        let mut prefix = Vec::with_capacity(sorted.len() + 1);
        prefix.push(0.0);
        let mut acc = 0.0;
        for d in sorted {
            acc += d;
            prefix.push(acc);
        }

        Self { distances, prefix }
    }

    pub fn evaluate(&self, index: ValidityIndex, labels: &[usize]) -> f64 {
        match index {
            ValidityIndex::CIndex => self.c_index(labels),
            ValidityIndex::Silhouette => self.silhouette(labels),
            ValidityIndex::Dunn => self.dunn(labels),
        }
    }

    /// Hubert & Levin C-index: `(S_w - S_min) / (S_max - S_min)`.
    ///
    /// `S_w` sums the within-cluster distances, `S_min`/`S_max` the same
    /// number of smallest/largest distances overall. NaN when no pair is
    /// within a cluster or every distance is equal.
    pub fn c_index(&self, labels: &[usize]) -> f64 {
        let mut within_sum = 0.0;
        let mut within_pairs = 0usize;
        for (i, j, d) in self.distances.pairs() {
            if labels[i] == labels[j] {
                within_sum += d;
                within_pairs += 1;
            }
        }

        let total_pairs = self.prefix.len() - 1;
        if within_pairs == 0 {
            return f64::NAN;
        }

        let s_min = self.prefix[within_pairs];
        let s_max = self.prefix[total_pairs] - self.prefix[total_pairs - within_pairs];
        let span = s_max - s_min;
        if span <= 0.0 {
            return f64::NAN;
        }

        (within_sum - s_min) / span
    }

    /// Mean silhouette width; singleton clusters score zero
    pub fn silhouette(&self, labels: &[usize]) -> f64 {
        let n = labels.len();
        let k = labels.iter().copied().max().unwrap_or(0);
        if n == 0 || k < 2 {
            return f64::NAN;
        }

        let mut sizes = vec![0usize; k + 1];
        for &l in labels {
            sizes[l] += 1;
        }

        let mut total = 0.0;
        for i in 0..n {
            if sizes[labels[i]] == 1 {
                continue;
            }

            let mut sums = vec![0.0; k + 1];
            for j in 0..n {
                if i != j {
                    sums[labels[j]] += self.distances.get(i, j);
                }
            }

            let a = sums[labels[i]] / (sizes[labels[i]] - 1) as f64;
            let b = (1..=k)
                .filter(|&c| c != labels[i] && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let scale = a.max(b);
            if scale > 0.0 {
                total += (b - a) / scale;
            }
        }

        total / n as f64
    }

    /// Smallest between-cluster distance over the largest cluster diameter
    pub fn dunn(&self, labels: &[usize]) -> f64 {
        let mut min_between = f64::INFINITY;
        let mut max_diameter: f64 = 0.0;
        for (i, j, d) in self.distances.pairs() {
            if labels[i] == labels[j] {
                max_diameter = max_diameter.max(d);
            } else {
                min_between = min_between.min(d);
            }
        }

        if !min_between.is_finite() || max_diameter <= 0.0 {
            return f64::NAN;
        }
        min_between / max_diameter
    }
}

/// Choose the best finite point under `index` and `tie_break`
pub fn select_k(
    points: &[ValidityPoint],
    index: ValidityIndex,
    tie_break: TieBreak,
    tie_tolerance: f64,
) -> Result<ValidityPoint> {
    let finite = || points.iter().filter(|p| p.value.is_finite());

    let best = finite()
        .map(|p| p.value)
        .reduce(|a, b| if index.minimizes() { a.min(b) } else { a.max(b) })
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} is undefined for every candidate cluster count",
                index.name()
            ))
        })?;

    let tied = finite().filter(|p| (p.value - best).abs() <= tie_tolerance);
    let chosen = match tie_break {
        TieBreak::SmallestK => tied.min_by_key(|p| p.k),
        TieBreak::LargestK => tied.max_by_key(|p| p.k),
    };

    chosen.copied().ok_or_else(|| {
        Error::InvalidInput(format!("{} selection found no candidate", index.name()))
    })
}
