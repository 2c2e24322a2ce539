//! # Trees and Tree Collections
//!
//! A [`Tree`] pairs a topology with per-edge branch lengths (indexed by the
//! child node id of each edge). A [`TreeCollection`] holds the input sample
//! of rooted trees over one shared taxon set, optionally with per-taxon
//! sampling dates (carried for time-tree collaborators; unused by the
//! likelihood core).

use std::collections::{BTreeMap, HashMap};

use crate::data::topology::Topology;
use crate::error::{Result, SubitoError};

/// A rooted tree: topology plus branch lengths
#[derive(Clone, Debug)]
pub struct Tree {
    topology: Topology,
    /// Branch length of the edge above each node, indexed by node id.
    /// The root's entry is unused and conventionally zero.
    branch_lengths: Vec<f64>,
}

impl Tree {
    pub fn new(topology: Topology, branch_lengths: Vec<f64>) -> Result<Self> {
        if branch_lengths.len() != topology.node_count() {
            return Err(SubitoError::invalid_data(format!(
                "branch length vector has {} entries for {} nodes",
                branch_lengths.len(),
                topology.node_count()
            )));
        }
        if branch_lengths.iter().any(|&length| length < 0.0) {
            return Err(SubitoError::invalid_data("negative branch length"));
        }
        Ok(Self {
            topology,
            branch_lengths,
        })
    }

    /// A tree with every branch length set to the same value
    pub fn with_constant_branch_length(topology: Topology, length: f64) -> Self {
        let branch_lengths = vec![length; topology.node_count()];
        Self {
            topology,
            branch_lengths,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn branch_lengths(&self) -> &[f64] {
        &self.branch_lengths
    }

    /// Branch length of the edge above `node_id`
    pub fn branch_length(&self, node_id: usize) -> f64 {
        self.branch_lengths[node_id]
    }
}

/// A collection of rooted trees over a shared, ordered taxon set
#[derive(Clone, Debug, Default)]
pub struct TreeCollection {
    taxon_names: Vec<String>,
    trees: Vec<Tree>,
    /// Optional per-taxon sampling dates for time trees; unused by the core
    taxon_dates: Option<BTreeMap<String, f64>>,
}

impl TreeCollection {
    pub fn new(taxon_names: Vec<String>, trees: Vec<Tree>) -> Result<Self> {
        if taxon_names.len() < 2 {
            return Err(SubitoError::invalid_data(
                "a tree collection needs at least two taxa",
            ));
        }
        if trees.is_empty() {
            return Err(SubitoError::invalid_data("empty tree collection"));
        }
        for tree in &trees {
            if tree.topology().taxon_count() != taxon_names.len() {
                return Err(SubitoError::invalid_data(format!(
                    "tree over {} taxa in a collection of {}",
                    tree.topology().taxon_count(),
                    taxon_names.len()
                )));
            }
        }
        Ok(Self {
            taxon_names,
            trees,
            taxon_dates: None,
        })
    }

    /// Attach a taxon-to-date mapping (time trees); every taxon must be
    /// covered.
    pub fn with_taxon_dates(mut self, dates: BTreeMap<String, f64>) -> Result<Self> {
        for name in &self.taxon_names {
            if !dates.contains_key(name) {
                return Err(SubitoError::invalid_data(format!(
                    "no date for taxon '{name}'"
                )));
            }
        }
        self.taxon_dates = Some(dates);
        Ok(self)
    }

    pub fn taxon_count(&self) -> usize {
        self.taxon_names.len()
    }

    pub fn taxon_names(&self) -> &[String] {
        &self.taxon_names
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn taxon_dates(&self) -> Option<&BTreeMap<String, f64>> {
        self.taxon_dates.as_ref()
    }

    /// Collapse the collection into distinct topologies with multiplicities,
    /// in first-occurrence order.
    pub fn topology_counter(&self) -> Vec<(Topology, u32)> {
        let mut index: HashMap<&Topology, usize> = HashMap::new();
        let mut counter: Vec<(Topology, u32)> = Vec::new();
        for tree in &self.trees {
            match index.get(tree.topology()) {
                Some(&at) => counter[at].1 += 1,
                None => {
                    index.insert(tree.topology(), counter.len());
                    counter.push((tree.topology().clone(), 1));
                }
            }
        }
        counter
    }
}
