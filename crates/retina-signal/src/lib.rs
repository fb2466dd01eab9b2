//! # Retina-Signal
//!
//! Per-trace signal processing for two-photon bipolar cell recordings.
//!
//! ## Stages
//!
//! 1. **Normalization**: divide every sample by the trace's peak amplitude
//! 2. **Conditioning**: subtract a first-order high-pass noise estimate, then
//!    apply a trailing moving average
//! 3. **Feature Extraction**: fixed-window statistics and a peak-anchored AUC
//!
//! Traces never interact here, so every stage can run on independent workers.

pub mod conditioner;
pub mod features;
pub mod filtering;
pub mod normalize;

pub use conditioner::*;
pub use features::*;
pub use filtering::*;
pub use normalize::*;
