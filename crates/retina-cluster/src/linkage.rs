//! Agglomerative hierarchical clustering via Lance-Williams updates.
//!
//! Node numbering: leaves are `0..n`, the node created by merge step `s` is
//! `n + s`. The scan for the closest pair runs row-major over the active
//! clusters, so ties always resolve to the first pair found and the tree is
//! fully determined by the input matrix.

use retina_core::{Error, LinkageMethod, Result};
use serde::Serialize;

use crate::distance::DistanceMatrix;

/// One agglomeration step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Merge {
    /// Smaller of the two node ids
    pub left: usize,
    pub right: usize,
    pub height: f64,
    /// Leaves under the new node
    pub size: usize,
}

/// Full merge history over `n` leaves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dendrogram {
    n: usize,
    method: LinkageMethod,
    merges: Vec<Merge>,
}

fn lance_williams(
    method: LinkageMethod,
    d_ik: f64,
    d_jk: f64,
    d_ij: f64,
    n_i: f64,
    n_j: f64,
    n_k: f64,
) -> f64 {
    match method {
        LinkageMethod::Single => d_ik.min(d_jk),
        LinkageMethod::Complete => d_ik.max(d_jk),
        LinkageMethod::Average => (n_i * d_ik + n_j * d_jk) / (n_i + n_j),
        LinkageMethod::McQuitty => 0.5 * (d_ik + d_jk),
        LinkageMethod::WardD | LinkageMethod::WardD2 => {
            ((n_i + n_k) * d_ik + (n_j + n_k) * d_jk - n_k * d_ij) / (n_i + n_j + n_k)
        }
    }
}

impl Dendrogram {
    /// Agglomerate every leaf of `distances` into a single tree
    pub fn build(distances: &DistanceMatrix, method: LinkageMethod) -> Self {
        let n = distances.len();
        let squared = method == LinkageMethod::WardD2;

        let mut d = distances.values().clone();
        if squared {
            d.mapv_inplace(|v| v * v);
        }

        let mut active = vec![true; n];
        let mut node = (0..n).collect::<Vec<usize>>();
        let mut size = vec![1usize; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if !active[i] {
                    continue;
                }
                for j in (i + 1)..n {
                    if !active[j] {
                        continue;
                    }
                    let v = d[[i, j]];
                    if best.map_or(true, |(_, _, b)| v < b) {
                        best = Some((i, j, v));
                    }
                }
            }

            let Some((i, j, d_ij)) = best else { break };

            let (n_i, n_j) = (size[i] as f64, size[j] as f64);
            for k in 0..n {
                if !active[k] || k == i || k == j {
                    continue;
                }
                let updated =
                    lance_williams(method, d[[i, k]], d[[j, k]], d_ij, n_i, n_j, size[k] as f64);
                d[[i, k]] = updated;
                d[[k, i]] = updated;
            }

            merges.push(Merge {
                left: node[i].min(node[j]),
                right: node[i].max(node[j]),
                height: if squared { d_ij.max(0.0).sqrt() } else { d_ij },
                size: size[i] + size[j],
            });

            active[j] = false;
            node[i] = n + step;
            size[i] += size[j];
        }

        tracing::trace!(leaves = n, ?method, "Dendrogram built");

        Self { n, method, merges }
    }

    pub fn n_leaves(&self) -> usize {
        self.n
    }

    pub fn method(&self) -> LinkageMethod {
        self.method
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    /// Flat partition into `k` clusters.
    ///
    /// Labels run `1..=k` in order of first appearance over the leaves.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        if k == 0 || k > self.n {
            return Err(Error::InvalidInput(format!(
                "cannot cut {} leaves into {k} clusters",
                self.n
            )));
        }

        let mut parent: Vec<usize> = (0..self.n).collect();
        let mut representative: Vec<usize> = (0..self.n).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for merge in &self.merges[..self.n - k] {
            let a = find(&mut parent, representative[merge.left]);
            let b = find(&mut parent, representative[merge.right]);
            parent[b] = a;
            representative.push(a);
        }

        let mut labels = vec![0usize; self.n];
        let mut root_label: Vec<Option<usize>> = vec![None; self.n];
        let mut next = 1;
        for leaf in 0..self.n {
            let root = find(&mut parent, leaf);
            labels[leaf] = *root_label[root].get_or_insert_with(|| {
                next += 1;
                next - 1
            });
        }

        Ok(labels)
    }
}
