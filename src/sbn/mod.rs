//! # SBN Module
//!
//! The subsplit-Bayesian-network parameterization: indexing of rootsplits
//! and PCSPs into one contiguous parameter vector, and estimation of the
//! probabilities living in it.
//!
//! ## Sub-modules
//! - `indexer`: rootsplit block + per-parent PCSP ranges, lookup maps
//! - `probability`: simple-average and EM estimators, topology probabilities

pub mod indexer;
pub mod probability;
