//! # Pipelines Module
//!
//! High-level workflow orchestration over the data, DAG and engine layers.
//!
//! ## Sub-modules
//! - `gp`: the generalized-pruning inference pipeline

pub mod gp;

pub use gp::GpPipeline;
