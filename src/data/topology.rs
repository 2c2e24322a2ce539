//! # Rooted Tree Topologies
//!
//! Flat-arena representation of rooted bifurcating topologies.
//!
//! Node ids follow a fixed discipline: leaves take ids `0..taxon_count`
//! (equal to their taxon id), internal nodes follow in post-order, so the
//! root always carries the maximum id and every internal node's children
//! have smaller ids. [`TopologyBuilder::finish`] canonicalizes any build
//! order into this form, ordering siblings by their leaf-set bitsets; two
//! builds of the same topology therefore produce identical node arrays,
//! which makes [`Topology`] directly usable as a hash-map key.

use crate::bitset::Bitset;
use crate::error::{Result, SubitoError};

/// One node of a flattened topology
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TopologyNode {
    /// Child ids, present for internal nodes only
    children: Option<[usize; 2]>,
    /// Set of leaves at or below this node
    leaves: Bitset,
}

/// A rooted bifurcating topology over a fixed taxon set
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topology {
    taxon_count: usize,
    nodes: Vec<TopologyNode>,
}

/// An edge of a rooted topology, described by the bitsets the SBN machinery
/// needs: the oriented parent subsplit (`sister|focal`) and the
/// lexicographically smaller child half (empty for an edge to a leaf).
#[derive(Clone, Debug)]
pub struct RootedEdge {
    pub parent_id: usize,
    pub child_id: usize,
    /// `sister|focal` where the focal clade is the child's leaf set
    pub oriented_parent: Bitset,
    /// Smaller half of the child's subsplit; empty when the child is a leaf
    pub child0: Bitset,
}

impl RootedEdge {
    /// True when this edge ends in a leaf
    pub fn is_leaf_edge(&self) -> bool {
        self.child0.none()
    }

    /// The PCSP bitset `sister|focal|child0` labelling this edge
    pub fn pcsp(&self) -> Bitset {
        Bitset::pcsp(&self.oriented_parent, &self.child0)
    }
}

impl Topology {
    pub fn taxon_count(&self) -> usize {
        self.taxon_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Id of the root (always the maximum id)
    pub fn root_id(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_leaf(&self, id: usize) -> bool {
        self.nodes[id].children.is_none()
    }

    /// Children of an internal node
    pub fn children(&self, id: usize) -> Option<[usize; 2]> {
        self.nodes[id].children
    }

    /// Leaf-set bitset at or below a node
    pub fn leaves(&self, id: usize) -> &Bitset {
        &self.nodes[id].leaves
    }

    /// Internal node ids in bottom-up (post-)order
    pub fn internal_ids(&self) -> impl Iterator<Item = usize> {
        self.taxon_count..self.nodes.len()
    }

    /// Id of the node whose leaf set equals `leaves`, if any
    pub fn node_with_leaves(&self, leaves: &Bitset) -> Option<usize> {
        self.nodes.iter().position(|node| &node.leaves == leaves)
    }

    /// Parent id of every non-root node, indexed by child id
    pub fn parent_id_vector(&self) -> Vec<usize> {
        let mut parents = vec![0usize; self.nodes.len() - 1];
        for id in self.internal_ids() {
            let [left, right] = self.nodes[id].children.unwrap();
            parents[left] = id;
            parents[right] = id;
        }
        parents
    }

    /// The canonical subsplit of an internal node: its two child clades
    pub fn subsplit_of(&self, id: usize) -> Bitset {
        let [left, right] = self.nodes[id]
            .children
            .expect("subsplit_of requires an internal node");
        Bitset::subsplit(&self.nodes[left].leaves, &self.nodes[right].leaves)
    }

    /// The rootsplit as a clade: the lexicographically smaller root-child
    /// clade (its complement is implied).
    pub fn rootsplit_clade(&self) -> Bitset {
        let [left, right] = self.nodes[self.root_id()].children.unwrap();
        let a = &self.nodes[left].leaves;
        let b = &self.nodes[right].leaves;
        if a < b { a.clone() } else { b.clone() }
    }

    /// Every edge of the topology as a [`RootedEdge`], parents in id order,
    /// each parent's children in stored (canonical) order.
    pub fn rooted_edges(&self) -> Vec<RootedEdge> {
        let mut edges = Vec::with_capacity(self.nodes.len() - 1);
        for parent_id in self.internal_ids() {
            let [left, right] = self.nodes[parent_id].children.unwrap();
            for (child_id, sister_id) in [(left, right), (right, left)] {
                let sister = &self.nodes[sister_id].leaves;
                let focal = &self.nodes[child_id].leaves;
                let child0 = match self.nodes[child_id].children {
                    Some([a, b]) => {
                        let a = &self.nodes[a].leaves;
                        let b = &self.nodes[b].leaves;
                        if a < b { a.clone() } else { b.clone() }
                    }
                    None => Bitset::zero(self.taxon_count),
                };
                edges.push(RootedEdge {
                    parent_id,
                    child_id,
                    oriented_parent: sister.concat(focal),
                    child0,
                });
            }
        }
        edges
    }

    /// All rootings of the underlying unrooted topology, one per unrooted
    /// edge (`2·taxon_count − 3` of them), in a deterministic order. The
    /// first returned rooting is this topology itself.
    pub fn rootings(&self) -> Vec<Topology> {
        let parents = self.parent_id_vector();
        let [root_left, root_right] = self.nodes[self.root_id()].children.unwrap();
        let mut rootings = Vec::with_capacity(2 * self.taxon_count - 3);
        // The two root edges are one unrooted edge; keep the left child as
        // its representative so the original topology comes out first.
        let mut representatives = vec![root_left];
        representatives.extend(
            (0..self.nodes.len() - 1).filter(|&id| id != root_left && id != root_right),
        );
        for edge_child in representatives {
            rootings.push(self.rerooted_at(edge_child, &parents));
        }
        rootings
    }

    /// Reroot on the edge above `edge_child`: the new root's children are
    /// the subtree at `edge_child` and the rest of the tree folded upward.
    fn rerooted_at(&self, edge_child: usize, parents: &[usize]) -> Topology {
        let mut builder = TopologyBuilder::new(self.taxon_count);
        let below = self.copy_subtree(&mut builder, edge_child);
        let above = self.fold_upward(&mut builder, parents[edge_child], edge_child, parents);
        let root = builder.join(below, above);
        builder
            .finish(root)
            .expect("rerooting preserves topology validity")
    }

    fn copy_subtree(&self, builder: &mut TopologyBuilder, id: usize) -> usize {
        match self.nodes[id].children {
            None => builder.leaf(id),
            Some([left, right]) => {
                let left = self.copy_subtree(builder, left);
                let right = self.copy_subtree(builder, right);
                builder.join(left, right)
            }
        }
    }

    /// Rebuild the part of the tree on the far side of the edge
    /// `(node, came_from)`, viewed from below.
    fn fold_upward(
        &self,
        builder: &mut TopologyBuilder,
        node: usize,
        came_from: usize,
        parents: &[usize],
    ) -> usize {
        let [left, right] = self.nodes[node].children.unwrap();
        let sibling = if left == came_from { right } else { left };
        let sibling_id = self.copy_subtree(builder, sibling);
        if node == self.root_id() {
            // The old root is suppressed; its other subtree is the rest.
            sibling_id
        } else {
            let upward = self.fold_upward(builder, parents[node], node, parents);
            builder.join(sibling_id, upward)
        }
    }
}

/// Incremental builder producing canonical [`Topology`] values
pub struct TopologyBuilder {
    taxon_count: usize,
    nodes: Vec<BuilderNode>,
}

#[derive(Clone, Copy)]
enum BuilderNode {
    Leaf(usize),
    Internal(usize, usize),
}

impl TopologyBuilder {
    pub fn new(taxon_count: usize) -> Self {
        Self {
            taxon_count,
            nodes: Vec::new(),
        }
    }

    /// Add a leaf for the given taxon; returns its builder id
    pub fn leaf(&mut self, taxon: usize) -> usize {
        self.nodes.push(BuilderNode::Leaf(taxon));
        self.nodes.len() - 1
    }

    /// Join two previously added nodes; returns the new builder id
    pub fn join(&mut self, left: usize, right: usize) -> usize {
        self.nodes.push(BuilderNode::Internal(left, right));
        self.nodes.len() - 1
    }

    /// Canonicalize the tree rooted at `root` into a [`Topology`]: leaves
    /// take their taxon ids, internal nodes are numbered in post-order with
    /// siblings ordered by leaf set, and every taxon must appear exactly
    /// once.
    pub fn finish(self, root: usize) -> Result<Topology> {
        let taxon_count = self.taxon_count;
        if taxon_count < 2 {
            return Err(SubitoError::invalid_data(
                "a topology needs at least two taxa",
            ));
        }
        if matches!(self.nodes[root], BuilderNode::Leaf(_)) {
            return Err(SubitoError::invalid_data(
                "the root of a topology must be internal",
            ));
        }
        let mut nodes: Vec<Option<TopologyNode>> = vec![None; 2 * taxon_count - 1];
        let mut next_internal = taxon_count;
        let assigned_root =
            self.polish(root, &mut nodes, &mut next_internal)?;
        if next_internal != 2 * taxon_count - 1 {
            return Err(SubitoError::invalid_data(format!(
                "topology has {} internal nodes, expected {}",
                next_internal - taxon_count,
                taxon_count - 1
            )));
        }
        debug_assert_eq!(assigned_root, 2 * taxon_count - 2);
        let nodes = nodes
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SubitoError::invalid_data("topology does not cover all taxa"))?;
        Ok(Topology { taxon_count, nodes })
    }

    /// Post-order id assignment; returns the assigned id of `builder_id`.
    fn polish(
        &self,
        builder_id: usize,
        nodes: &mut [Option<TopologyNode>],
        next_internal: &mut usize,
    ) -> Result<usize> {
        match self.nodes[builder_id] {
            BuilderNode::Leaf(taxon) => {
                if taxon >= self.taxon_count {
                    return Err(SubitoError::invalid_data(format!(
                        "taxon id {} out of range for {} taxa",
                        taxon, self.taxon_count
                    )));
                }
                if nodes[taxon].is_some() {
                    return Err(SubitoError::invalid_data(format!(
                        "taxon id {taxon} appears more than once"
                    )));
                }
                nodes[taxon] = Some(TopologyNode {
                    children: None,
                    leaves: Bitset::singleton(self.taxon_count, taxon),
                });
                Ok(taxon)
            }
            BuilderNode::Internal(left, right) => {
                let left = self.polish(left, nodes, next_internal)?;
                let right = self.polish(right, nodes, next_internal)?;
                if *next_internal >= nodes.len() {
                    return Err(SubitoError::invalid_data(
                        "too many internal nodes for the taxon count",
                    ));
                }
                let left_leaves = nodes[left].as_ref().unwrap().leaves.clone();
                let right_leaves = nodes[right].as_ref().unwrap().leaves.clone();
                if !left_leaves.is_disjoint(&right_leaves) {
                    return Err(SubitoError::invalid_data(
                        "a taxon appears on both sides of an internal node",
                    ));
                }
                // Canonical sibling order keyed by leaf sets.
                let children = if left_leaves < right_leaves {
                    [left, right]
                } else {
                    [right, left]
                };
                let id = *next_internal;
                *next_internal += 1;
                nodes[id] = Some(TopologyNode {
                    children: Some(children),
                    leaves: &left_leaves | &right_leaves,
                });
                Ok(id)
            }
        }
    }
}

/// Build a maximally unbalanced "ladder" topology `(((0,1),2),…)`
pub fn ladder_topology(taxon_count: usize) -> Result<Topology> {
    let mut builder = TopologyBuilder::new(taxon_count);
    let mut spine = builder.leaf(0);
    for taxon in 1..taxon_count {
        let leaf = builder.leaf(taxon);
        spine = builder.join(spine, leaf);
    }
    builder.finish(spine)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `((0,1),2)` over three taxa
    fn three_taxon() -> Topology {
        let mut builder = TopologyBuilder::new(3);
        let l0 = builder.leaf(0);
        let l1 = builder.leaf(1);
        let l2 = builder.leaf(2);
        let inner = builder.join(l0, l1);
        let root = builder.join(inner, l2);
        builder.finish(root).unwrap()
    }

    #[test]
    fn test_polish_id_discipline() {
        let t = three_taxon();
        assert_eq!(t.node_count(), 5);
        assert_eq!(t.root_id(), 4);
        for leaf in 0..3 {
            assert!(t.is_leaf(leaf));
            assert_eq!(t.leaves(leaf).singleton_option(), Some(leaf));
        }
        // The cherry (0,1) is the first internal node.
        assert_eq!(t.leaves(3).count(), 2);
        assert_eq!(t.leaves(t.root_id()).count(), 3);
    }

    #[test]
    fn test_build_order_does_not_matter() {
        let t1 = three_taxon();
        let mut builder = TopologyBuilder::new(3);
        let l2 = builder.leaf(2);
        let l1 = builder.leaf(1);
        let l0 = builder.leaf(0);
        let inner = builder.join(l1, l0);
        let root = builder.join(l2, inner);
        let t2 = builder.finish(root).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.parent_id_vector(), t2.parent_id_vector());
    }

    #[test]
    fn test_rejects_bad_builds() {
        let mut builder = TopologyBuilder::new(2);
        let l0 = builder.leaf(0);
        let l0_again = builder.leaf(0);
        let root = builder.join(l0, l0_again);
        assert!(builder.finish(root).is_err());

        let mut builder = TopologyBuilder::new(3);
        let l0 = builder.leaf(0);
        let l1 = builder.leaf(1);
        let root = builder.join(l0, l1);
        assert!(builder.finish(root).is_err());
    }

    #[test]
    fn test_rooted_edges() {
        let t = three_taxon();
        let edges = t.rooted_edges();
        assert_eq!(edges.len(), 4);
        let leaf_edges = edges.iter().filter(|e| e.is_leaf_edge()).count();
        assert_eq!(leaf_edges, 3);
        for edge in &edges {
            assert_eq!(edge.pcsp().len(), 9);
            if !edge.is_leaf_edge() {
                assert!(edge.pcsp().pcsp_is_valid());
            }
        }
    }

    #[test]
    fn test_rootings_enumeration() {
        let t = three_taxon();
        let rootings = t.rootings();
        // 2n - 3 = 3 rootings for three taxa.
        assert_eq!(rootings.len(), 3);
        assert_eq!(rootings[0], t);
        // Each rooting is a valid topology over the same taxa and they are
        // pairwise distinct.
        for (i, a) in rootings.iter().enumerate() {
            assert_eq!(a.taxon_count(), 3);
            for b in rootings.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_rootings_share_unrooted_shape() {
        let t = ladder_topology(5).unwrap();
        let rootings = t.rootings();
        assert_eq!(rootings.len(), 7);
        // Rerooting any rooting at the original rootsplit edge must give
        // back a tree from the same unrooted equivalence class; check via
        // the multiset of rootings being closed.
        for rooting in &rootings {
            let back = rooting.rootings();
            assert_eq!(back.len(), 7);
            for b in &back {
                assert!(rootings.contains(b));
            }
        }
    }

    #[test]
    fn test_subsplit_and_rootsplit() {
        let t = three_taxon();
        let root_subsplit = t.subsplit_of(t.root_id());
        assert!(root_subsplit.subsplit_is_canonical());
        let rootsplit = t.rootsplit_clade();
        let full = &rootsplit | &!&rootsplit;
        assert_eq!(full.count(), 3);
    }
}
