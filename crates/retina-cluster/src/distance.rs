//! Pairwise dissimilarity between feature rows.

use ndarray::{Array2, ArrayView1};
use retina_core::DistanceMetric;
use serde::Serialize;

/// Distance between two rows under `metric`
pub fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    let pairs = a.iter().zip(b.iter());
    match metric {
        DistanceMetric::Euclidean => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
        DistanceMetric::Maximum => pairs.fold(0.0, |m, (x, y)| f64::max(m, (x - y).abs())),
        DistanceMetric::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
        DistanceMetric::Canberra => pairs
            .filter_map(|(x, y)| {
                let denom = x.abs() + y.abs();
                // 0/0 terms contribute nothing
                (denom > 0.0).then(|| (x - y).abs() / denom)
            })
            .sum(),
        DistanceMetric::Minkowski { p } => pairs
            .map(|(x, y)| (x - y).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
    }
}

/// Symmetric matrix of pairwise distances with a zero diagonal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMatrix {
    metric: DistanceMetric,
    values: Array2<f64>,
}

impl DistanceMatrix {
    /// Distances between all rows of `data`
    pub fn compute(data: &Array2<f64>, metric: DistanceMetric) -> Self {
        let n = data.nrows();
        let mut values = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            for j in (i + 1)..n {
                let d = distance(data.row(i), data.row(j), metric);
                values[[i, j]] = d;
                values[[j, i]] = d;
            }
        }

        Self { metric, values }
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Upper-triangle entries `(i, j, d)` with `i < j`, row-major
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.len();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j, self.values[[i, j]])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_metrics() {
        let a = array![0.0, 3.0, -1.0];
        let b = array![4.0, 0.0, -1.0];

        let d = |m| distance(a.view(), b.view(), m);
        assert!((d(DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((d(DistanceMetric::Maximum) - 4.0).abs() < 1e-12);
        assert!((d(DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
        assert!((d(DistanceMetric::Minkowski { p: 2.0 }) - 5.0).abs() < 1e-12);
        assert!((d(DistanceMetric::Minkowski { p: 1.0 }) - 7.0).abs() < 1e-12);
        // |0-4|/4 + |3-0|/3 + 0/2
        assert!((d(DistanceMetric::Canberra) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_canberra_skips_zero_pairs() {
        let a = array![0.0, 1.0];
        let b = array![0.0, 3.0];
        let d = distance(a.view(), b.view(), DistanceMetric::Canberra);
        assert!((d - 0.5).abs() < 1e-12);
        assert!(d.is_finite());
    }

    #[test]
    fn test_matrix_symmetric() {
        let data = array![[0.0, 0.0], [3.0, 4.0], [6.0, 8.0]];
        let m = DistanceMatrix::compute(&data, DistanceMetric::Euclidean);

        assert_eq!(m.len(), 3);
        for i in 0..3 {
            assert_eq!(m.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert!((m.get(0, 2) - 10.0).abs() < 1e-12);

        let pairs: Vec<(usize, usize)> = m.pairs().map(|(i, j, _)| (i, j)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }
}
