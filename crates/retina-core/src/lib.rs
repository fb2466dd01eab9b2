//! # Retina-Core
//!
//! Core types, configuration and error handling for clustering two-photon
//! imaging traces of retinal bipolar cells into functional groups.
//!
//! Every pipeline stage consumes and returns the explicitly typed records
//! defined here; no stage mutates a structure owned by another.

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::*;
pub use error::{Error, Result};
pub use types::*;
