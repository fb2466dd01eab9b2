//! # Retina-Pipeline
//!
//! Batch orchestration of the bipolar cell classification stages, from a
//! validated [`retina_core::TraceTable`] to labeled samples and features.

pub mod pipeline;

pub use pipeline::*;
