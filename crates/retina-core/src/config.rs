//! Pipeline configuration.
//!
//! Only computation-affecting options live here. Every group has a `Default`
//! that reproduces the reference analysis settings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Feature, StimType, TimeUnit, TimeWindow};

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Noise removal and smoothing
    pub conditioning: ConditioningConfig,

    /// Window statistics
    pub features: FeatureConfig,

    /// Population z-scoring
    pub standardize: StandardizeConfig,

    /// Principal component analysis
    pub pca: PcaConfig,

    /// Hierarchical clustering and model selection
    pub clustering: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// High-pass cutoff as a fraction of the Nyquist frequency
    pub highpass_cutoff: f64,

    /// Trailing moving-average length (samples)
    pub smoothing_window: usize,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            highpass_cutoff: 0.1,
            smoothing_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Stimulus whose traces are summarized
    pub stimulus: StimType,

    /// Transient response phase
    pub transient_window: TimeWindow,

    /// Hyperpolarization phase
    pub hyper_window: TimeWindow,

    /// Pre-response baseline used for `Rise`
    pub rise_window: TimeWindow,

    /// Length of the peak-anchored AUC window (ms)
    pub auc_length_ms: f64,

    /// Unit of `peakT` / `riseT` in the trace metadata
    pub metadata_time_unit: TimeUnit,

    /// Minimum fraction of a window's frame slots that must hold a defined sample
    pub min_window_coverage: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            stimulus: StimType::Static,
            transient_window: TimeWindow::new(2000.0, 2500.0),
            hyper_window: TimeWindow::new(3500.0, 4500.0),
            rise_window: TimeWindow::new(0.0, 750.0),
            auc_length_ms: 500.0,
            metadata_time_unit: TimeUnit::Seconds,
            min_window_coverage: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardizeConfig {
    /// Continuous columns to z-score, in matrix order
    pub columns: Vec<Feature>,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            columns: Feature::DERIVED.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Cumulative variance explained that fixes the component count
    pub variance_threshold: f64,

    /// Divide centered columns by their SD before decomposition
    pub scale: bool,

    /// Columns left out of the decomposition
    pub exclude: Vec<Feature>,

    /// |Pearson r| at or above which two columns count as collinear
    pub collinearity_threshold: f64,

    /// Smallest/largest eigenvalue ratio below which the set is rank deficient
    pub rank_tolerance: f64,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.8,
            scale: false,
            // Medians track their window means closely on smooth responses;
            // difCenters is MeanTransient - MedianTransient
            exclude: vec![
                Feature::MedianTransient,
                Feature::MedianHyper,
                Feature::DifCenters,
            ],
            collinearity_threshold: 0.995,
            rank_tolerance: 1e-10,
        }
    }
}

/// Pairwise dissimilarity between feature rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Euclidean,
    /// Chebyshev distance
    Maximum,
    Manhattan,
    Canberra,
    Minkowski { p: f64 },
}

/// Agglomeration rule (Lance-Williams family)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
    McQuitty,
    /// Ward's criterion applied to unsquared dissimilarities
    WardD,
    /// Ward's minimum-variance criterion on squared dissimilarities
    WardD2,
}

/// Internal cluster validity index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityIndex {
    /// Hubert & Levin C-index (lower is better)
    CIndex,
    /// Mean silhouette width (higher is better)
    Silhouette,
    /// Dunn index (higher is better)
    Dunn,
}

impl ValidityIndex {
    pub fn minimizes(&self) -> bool {
        matches!(self, ValidityIndex::CIndex)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValidityIndex::CIndex => "cindex",
            ValidityIndex::Silhouette => "silhouette",
            ValidityIndex::Dunn => "dunn",
        }
    }
}

/// Which k wins when several reach the optimal index value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    SmallestK,
    LargestK,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Standardized columns that enter the distance computation
    pub columns: Vec<Feature>,

    pub metric: DistanceMetric,

    pub linkage: LinkageMethod,

    pub index: ValidityIndex,

    /// Inclusive candidate range for the cluster count
    pub k_min: usize,
    pub k_max: usize,

    pub tie_break: TieBreak,

    /// Index values within this distance of the optimum count as ties
    pub tie_tolerance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                Feature::MeanTransient,
                Feature::SdTransient,
                Feature::MeanHyper,
                Feature::Rise,
                Feature::Slope,
                Feature::Auc,
            ],
            metric: DistanceMetric::Euclidean,
            linkage: LinkageMethod::WardD2,
            index: ValidityIndex::CIndex,
            k_min: 2,
            k_max: 8,
            tie_break: TieBreak::SmallestK,
            tie_tolerance: 1e-12,
        }
    }
}

impl ClusterConfig {
    /// Check the candidate range against a population of `n` traces
    pub fn check_range(&self, n: usize) -> Result<()> {
        if self.k_min < 2 || self.k_min > self.k_max || self.k_max + 1 > n {
            return Err(Error::InvalidRange {
                k_min: self.k_min,
                k_max: self.k_max,
                n,
            });
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Load configuration from file, overridable by `RETINA__*` variables
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("RETINA").separator("__"))
            .build()?;

        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("RETINA").separator("__"))
            .build()?;

        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject settings that cannot produce a meaningful run.
    ///
    /// The upper bound `k_max <= N - 1` depends on the population and is
    /// checked separately by [`ClusterConfig::check_range`].
    pub fn validate(&self) -> Result<()> {
        let c = &self.conditioning;
        if !(c.highpass_cutoff > 0.0 && c.highpass_cutoff < 1.0) {
            return Err(Error::Config(format!(
                "highpass_cutoff must lie in (0, 1), got {}",
                c.highpass_cutoff
            )));
        }
        if c.smoothing_window == 0 {
            return Err(Error::Config("smoothing_window must be at least 1".into()));
        }

        let f = &self.features;
        for (name, window) in [
            ("transient_window", f.transient_window),
            ("hyper_window", f.hyper_window),
            ("rise_window", f.rise_window),
        ] {
            if !window.is_valid() {
                return Err(Error::Config(format!(
                    "{name} [{}, {}) is empty or inverted",
                    window.start_ms, window.end_ms
                )));
            }
        }
        if !(f.auc_length_ms.is_finite() && f.auc_length_ms > 0.0) {
            return Err(Error::Config("auc_length_ms must be positive".into()));
        }
        if !(f.min_window_coverage > 0.0 && f.min_window_coverage <= 1.0) {
            return Err(Error::Config("min_window_coverage must lie in (0, 1]".into()));
        }

        if self.standardize.columns.is_empty() {
            return Err(Error::Config("no columns to standardize".into()));
        }

        let p = &self.pca;
        if !(p.variance_threshold > 0.0 && p.variance_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "variance_threshold must lie in (0, 1], got {}",
                p.variance_threshold
            )));
        }
        if !(p.collinearity_threshold > 0.0 && p.collinearity_threshold <= 1.0) {
            return Err(Error::Config("collinearity_threshold must lie in (0, 1]".into()));
        }
        if !(p.rank_tolerance.is_finite() && p.rank_tolerance >= 0.0) {
            return Err(Error::Config(format!(
                "rank_tolerance must be finite and non-negative, got {}",
                p.rank_tolerance
            )));
        }

        let k = &self.clustering;
        if k.columns.is_empty() {
            return Err(Error::Config("no clustering columns selected".into()));
        }
        if let Some(missing) = k
            .columns
            .iter()
            .find(|col| !self.standardize.columns.contains(col))
        {
            return Err(Error::Config(format!(
                "clustering column {missing} is not standardized"
            )));
        }
        if let DistanceMetric::Minkowski { p } = k.metric {
            if !(p.is_finite() && p > 0.0) {
                return Err(Error::Config(format!("Minkowski order must be positive, got {p}")));
            }
        }
        if k.k_min < 2 || k.k_min > k.k_max {
            return Err(Error::InvalidRange {
                k_min: k.k_min,
                k_max: k.k_max,
                n: 0,
            });
        }
        if !(k.tie_tolerance >= 0.0) {
            return Err(Error::Config("tie_tolerance must be non-negative".into()));
        }

        Ok(())
    }
}
