//! # DAG Module
//!
//! The subsplit DAG and its operation scheduler.
//!
//! ## Sub-modules
//! - `node`: DAG nodes with direction × clade-side adjacency lists
//! - `subsplit_dag`: construction, traversal orders, topology counting
//! - `schedule`: deterministic operation streams for each engine phase

pub mod node;
pub mod schedule;
pub mod subsplit_dag;
