//! # Subsplit DAG
//!
//! The DAG whose nodes are the subsplits reachable from the observed
//! rootsplits and whose edges are PCSPs tagged with a clade side. Leaf nodes
//! (one fake subsplit per taxon) occupy ids `0..taxon_count`; rootsplit
//! nodes take the largest ids. The implicit universal ancestor is the parent
//! of every rootsplit node.
//!
//! Construction happens once, from a tree collection, and the DAG is
//! immutable afterwards: node creation (post-order from each rootsplit),
//! edge wiring on both clade sides, leaf-edge parameter extension, the two
//! traversal orders, and the topology-count dynamic program.

use std::collections::{HashMap, HashSet};

use crate::bitset::Bitset;
use crate::dag::node::{Direction, SdagNode, Side};
use crate::data::tree::TreeCollection;
use crate::error::{Result, SubitoError};
use crate::sbn::indexer::SbnIndexer;

/// An edge's clade side and its slot in the parameter vector
#[derive(Clone, Copy, Debug)]
pub struct EdgeParameter {
    pub side: Side,
    pub gpcsp: usize,
}

/// The subsplit DAG over an observed tree collection
#[derive(Clone, Debug)]
pub struct SubsplitDag {
    taxon_count: usize,
    indexer: SbnIndexer,
    nodes: Vec<SdagNode>,
    subsplit_to_id: HashMap<Bitset, usize>,
    /// Node id of each rootsplit, in rootsplit index order
    rootsplit_ids: Vec<usize>,
    /// (parent node id, child node id) to side and parameter slot
    edge_params: HashMap<(usize, usize), EdgeParameter>,
    /// Leaf-edge PCSP bitsets to their appended parameter slots
    leaf_pcsp_to_index: HashMap<Bitset, usize>,
    /// gpcsp_count plus one parameter per leaf edge
    parameter_count: usize,
    /// Non-leaf ids, children before parents
    rootward_order: Vec<usize>,
    /// Non-leaf ids, parents before children
    leafward_order: Vec<usize>,
    /// Topologies spanned below each node (leaves contribute 1)
    topology_count_below: Vec<f64>,
}

impl SubsplitDag {
    pub fn new(tree_collection: &TreeCollection) -> Result<Self> {
        let taxon_count = tree_collection.taxon_count();
        let topology_counter = tree_collection.topology_counter();
        let indexer = SbnIndexer::new(&topology_counter)?;

        let mut dag = Self {
            taxon_count,
            indexer,
            nodes: Vec::new(),
            subsplit_to_id: HashMap::new(),
            rootsplit_ids: Vec::new(),
            edge_params: HashMap::new(),
            leaf_pcsp_to_index: HashMap::new(),
            parameter_count: 0,
            rootward_order: Vec::new(),
            leafward_order: Vec::new(),
            topology_count_below: Vec::new(),
        };
        dag.build_nodes();
        dag.build_edges()?;
        dag.rootsplit_ids = dag
            .indexer
            .rootsplits()
            .iter()
            .map(|clade| {
                let subsplit = Bitset::rootsplit_subsplit(clade);
                dag.subsplit_to_id.get(&subsplit).copied().ok_or_else(|| {
                    SubitoError::indexer_lookup(subsplit.subsplit_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        dag.rootward_order = dag.rootward_pass_traversal();
        dag.leafward_order = dag.leafward_pass_traversal();
        dag.count_topologies();
        Ok(dag)
    }

    // ** Accessors

    pub fn taxon_count(&self) -> usize {
        self.taxon_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: usize) -> &SdagNode {
        &self.nodes[id]
    }

    pub fn indexer(&self) -> &SbnIndexer {
        &self.indexer
    }

    pub fn rootsplit_count(&self) -> usize {
        self.rootsplit_ids.len()
    }

    /// Node ids of the rootsplits, in rootsplit index order
    pub fn rootsplit_ids(&self) -> &[usize] {
        &self.rootsplit_ids
    }

    pub fn gpcsp_count(&self) -> usize {
        self.indexer.gpcsp_count()
    }

    /// Parameters including the appended leaf-edge slots
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn rootward_order(&self) -> &[usize] {
        &self.rootward_order
    }

    pub fn leafward_order(&self) -> &[usize] {
        &self.leafward_order
    }

    /// Side and parameter slot of the (parent, child) edge
    pub fn edge_parameter(&self, parent: usize, child: usize) -> Result<EdgeParameter> {
        self.edge_params.get(&(parent, child)).copied().ok_or_else(|| {
            SubitoError::indexer_lookup(format!(
                "{} -> {}",
                self.nodes[parent].subsplit().subsplit_string(),
                self.nodes[child].subsplit().subsplit_string()
            ))
        })
    }

    /// Parameter slot of a PCSP bitset, covering real and leaf edges
    pub fn pcsp_parameter_index(&self, pcsp: &Bitset) -> Option<usize> {
        self.indexer
            .pcsp_index(pcsp)
            .or_else(|| self.leaf_pcsp_to_index.get(pcsp).copied())
    }

    /// Number of distinct rooted topologies the DAG spans
    pub fn topology_count(&self) -> f64 {
        self.rootsplit_ids
            .iter()
            .map(|&id| self.topology_count_below[id])
            .sum()
    }

    /// Topologies spanned below one node
    pub fn topology_count_below(&self, id: usize) -> f64 {
        self.topology_count_below[id]
    }

    /// Discrete-uniform SBN parameters: rootsplit block `1/R`, each parent
    /// range uniform, leaf-edge slots pinned to one.
    pub fn build_uniform_q(&self) -> Vec<f64> {
        let mut q = vec![1.0; self.parameter_count];
        let rootsplit_count = self.rootsplit_count();
        for value in q[..rootsplit_count].iter_mut() {
            *value = 1.0 / rootsplit_count as f64;
        }
        for (_, (start, stop)) in self.indexer.parent_ranges() {
            let share = 1.0 / (stop - start) as f64;
            for value in q[start..stop].iter_mut() {
                *value = share;
            }
        }
        q
    }

    // ** Construction

    /// The children subsplits of an oriented parent: the indexer's range,
    /// plus a synthesized fake subsplit when the focal clade is a singleton.
    fn children_subsplits(&self, subsplit: &Bitset, include_fake: bool) -> Vec<Bitset> {
        let children = self.indexer.children_subsplits(subsplit);
        if !children.is_empty() || !include_fake {
            return children;
        }
        match (
            subsplit.split_chunk(0).any(),
            subsplit.split_chunk(1).singleton_option(),
        ) {
            (true, Some(taxon)) => vec![Bitset::fake_subsplit(taxon, self.taxon_count)],
            _ => Vec::new(),
        }
    }

    fn create_and_insert_node(&mut self, subsplit: Bitset) {
        if !self.subsplit_to_id.contains_key(&subsplit) {
            let id = self.nodes.len();
            self.subsplit_to_id.insert(subsplit.clone(), id);
            self.nodes.push(SdagNode::new(id, subsplit));
        }
    }

    /// Create the fake-subsplit leaves, then every subsplit reachable from
    /// the rootsplits, children before parents.
    fn build_nodes(&mut self) {
        for taxon in 0..self.taxon_count {
            self.create_and_insert_node(Bitset::fake_subsplit(taxon, self.taxon_count));
        }
        let mut visited: HashSet<Bitset> = HashSet::new();
        let rootsplit_subsplits: Vec<Bitset> = self
            .indexer
            .rootsplits()
            .iter()
            .map(Bitset::rootsplit_subsplit)
            .collect();
        for subsplit in rootsplit_subsplits {
            self.build_nodes_depth_first(subsplit, &mut visited);
        }
    }

    fn build_nodes_depth_first(&mut self, start: Bitset, visited: &mut HashSet<Bitset>) {
        // Explicit stack; the second encounter of a frame creates the node.
        let mut stack: Vec<(Bitset, bool)> = vec![(start, false)];
        while let Some((subsplit, expanded)) = stack.pop() {
            if expanded {
                self.create_and_insert_node(subsplit);
                continue;
            }
            if !visited.insert(subsplit.clone()) {
                continue;
            }
            let right = self.children_subsplits(&subsplit, false);
            let left = self.children_subsplits(&subsplit.rotate_subsplit(), false);
            stack.push((subsplit, true));
            // Right-side subtrees are processed first (LIFO order).
            for child in left.into_iter().rev() {
                stack.push((child, false));
            }
            for child in right.into_iter().rev() {
                stack.push((child, false));
            }
        }
    }

    /// Wire every non-leaf node to its children on both sides and assign
    /// parameter slots: real edges take their indexer slot, leaf edges get
    /// fresh slots appended after `gpcsp_count`.
    fn build_edges(&mut self) -> Result<()> {
        let mut next_leaf_param = self.indexer.gpcsp_count();
        for parent_id in self.taxon_count..self.nodes.len() {
            for side in [Side::Right, Side::Left] {
                let oriented = match side {
                    Side::Right => self.nodes[parent_id].subsplit().clone(),
                    Side::Left => self.nodes[parent_id].subsplit().rotate_subsplit(),
                };
                for child_subsplit in self.children_subsplits(&oriented, true) {
                    let child_id = *self
                        .subsplit_to_id
                        .get(&child_subsplit)
                        .ok_or_else(|| {
                            SubitoError::indexer_lookup(child_subsplit.subsplit_string())
                        })?;
                    let gpcsp = if child_subsplit.is_fake_subsplit() {
                        let pcsp =
                            Bitset::pcsp(&oriented, &Bitset::zero(self.taxon_count));
                        let slot = next_leaf_param;
                        next_leaf_param += 1;
                        self.leaf_pcsp_to_index.insert(pcsp, slot);
                        slot
                    } else {
                        let pcsp =
                            Bitset::pcsp(&oriented, &child_subsplit.split_chunk(0));
                        self.indexer.require_pcsp_index(&pcsp)?
                    };
                    self.nodes[parent_id].add_neighbor(Direction::Leafward, side, child_id);
                    self.nodes[child_id].add_neighbor(Direction::Rootward, side, parent_id);
                    self.edge_params
                        .insert((parent_id, child_id), EdgeParameter { side, gpcsp });
                }
            }
        }
        self.parameter_count = next_leaf_param;
        Ok(())
    }

    /// Post-order over leafward edges from every rootsplit: children before
    /// parents, leaves excluded.
    fn rootward_pass_traversal(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        for &root_id in &self.rootsplit_ids {
            self.depth_first(root_id, Direction::Leafward, &mut visited, &mut order);
        }
        order
    }

    /// Post-order over rootward edges from every leaf: ancestors before
    /// descendants, leaves excluded.
    fn leafward_pass_traversal(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        for leaf_id in 0..self.taxon_count {
            self.depth_first(leaf_id, Direction::Rootward, &mut visited, &mut order);
        }
        order
    }

    fn depth_first(
        &self,
        start: usize,
        direction: Direction,
        visited: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) {
        let mut stack: Vec<(usize, bool)> = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if !self.nodes[id].is_leaf() {
                    order.push(id);
                }
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for side in [Side::Left, Side::Right] {
                for &neighbor in self.nodes[id].neighbors(direction, side).iter().rev() {
                    stack.push((neighbor, false));
                }
            }
        }
    }

    /// Dynamic program for the number of topologies the DAG spans:
    /// per-side sums of child counts, multiplied across sides.
    fn count_topologies(&mut self) {
        let mut below = vec![1.0; self.nodes.len()];
        for &id in &self.rootward_order {
            let node = &self.nodes[id];
            let mut product = 1.0;
            for side in [Side::Left, Side::Right] {
                let sum: f64 = node
                    .neighbors(Direction::Leafward, side)
                    .iter()
                    .map(|&child| below[child])
                    .sum();
                product *= sum;
            }
            below[id] = product;
        }
        self.topology_count_below = below;
    }
}
