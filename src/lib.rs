//! # Subito
//!
//! Subsplit-Bayesian-network inference engine for distributions over rooted
//! phylogenetic tree topologies, with branch-length optimization by
//! generalized pruning on a subsplit DAG.
//!
//! ## Modules
//! - `bitset`: clade / subsplit / PCSP bit algebra
//! - `config`: engine configuration and numeric constants
//! - `data`: alignments, site patterns, topologies, tree collections
//! - `dag`: the subsplit DAG and its operation scheduler
//! - `engine`: the PLV arena and the operation-stream executor
//! - `error`: error types and result alias
//! - `sbn`: parameter indexing and probability estimation
//! - `pipelines`: end-to-end workflow orchestration
//! - `utils`: log-space arithmetic

pub mod bitset;
pub mod config;
pub mod dag;
pub mod data;
pub mod engine;
pub mod error;
pub mod pipelines;
pub mod sbn;
pub mod utils;

// Re-export commonly used types
pub use bitset::Bitset;
pub use config::{BranchOptimizer, EngineConfig};
pub use dag::node::{Direction, Side};
pub use dag::subsplit_dag::SubsplitDag;
pub use data::alignment::Alignment;
pub use data::site_pattern::SitePattern;
pub use data::topology::{ladder_topology, Topology, TopologyBuilder};
pub use data::tree::{Tree, TreeCollection};
pub use engine::{ClockModel, GpEngine, GpOperation, PlvKind, SiteModel, SubstitutionModel};
pub use error::{Result, SubitoError};
pub use pipelines::GpPipeline;
pub use sbn::indexer::SbnIndexer;
