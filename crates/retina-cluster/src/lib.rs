//! # Retina-Cluster
//!
//! Population-level analysis of extracted trace features.
//!
//! ## Stages
//!
//! 1. **Standardization**: z-score continuous columns over the population
//! 2. **PCA**: rank columns by contribution and detect singular feature sets
//! 3. **Clustering**: distance matrix, hierarchical linkage and a validity
//!    index sweep that picks the cluster count
//! 4. **Assignment**: join cluster labels back onto samples and features
//!
//! The distance matrix is O(N²) in memory; populations of a few hundred
//! traces are the intended scale.

pub mod assign;
pub mod distance;
pub mod engine;
pub mod linkage;
pub mod pca;
pub mod standardize;
pub mod validity;

pub use assign::*;
pub use distance::*;
pub use engine::*;
pub use linkage::*;
pub use pca::*;
pub use standardize::*;
pub use validity::*;
