//! # Engine Module
//!
//! The numerical backend: the PLV arena, the operation bytecode, the
//! substitution-model interfaces, 1-D optimization and the
//! generalized-pruning executor that ties them together.
//!
//! ## Sub-modules
//! - `operation`: the closed operation set and PLV slot addressing
//! - `arena`: contiguous (optionally memory-mapped) PLV storage + rescaling
//! - `substitution`: substitution / site / clock model interfaces
//! - `optimize`: Brent minimization and gradient ascent
//! - `gp_engine`: the operation-stream executor

pub mod arena;
pub mod gp_engine;
pub mod operation;
pub mod optimize;
pub mod substitution;

pub use arena::PlvArena;
pub use gp_engine::GpEngine;
pub use operation::{plv_index, GpOperation, PlvKind};
pub use substitution::{ClockModel, SiteModel, SubstitutionModel};
