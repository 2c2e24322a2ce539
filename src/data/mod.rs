//! # Data Module
//!
//! In-memory representations of the engine's inputs.
//!
//! ## Design Philosophy
//! - **Flat arenas over pointer trees:** topologies are stored as indexed
//!   node vectors with a fixed id discipline, so they hash, compare and
//!   traverse without chasing references.
//! - **Validate at the boundary:** alignments, trees and collections check
//!   their shape at construction; everything downstream can assume it.
//!
//! ## Sub-modules
//! - `alignment`: taxon-to-sequence map and the DNA symbol table
//! - `site_pattern`: compressed alignment columns with weights
//! - `topology`: rooted bifurcating topologies and the canonical builder
//! - `tree`: trees with branch lengths, tree collections

pub mod alignment;
pub mod site_pattern;
pub mod topology;
pub mod tree;
