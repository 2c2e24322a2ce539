//! # SBN Indexer
//!
//! Assigns every observed rootsplit and PCSP a slot in one contiguous
//! parameter vector: rootsplits occupy `[0, R)`, and each observed parent
//! subsplit owns a contiguous child range inside `[R, gpcsp_count)`. The
//! indexer is the single source of truth for parameter addressing; the
//! subsplit DAG, the scheduler and the probability estimators all consult
//! it.
//!
//! Counters are ordered maps, so index assignment is a pure function of the
//! observed topologies: loading the same collection twice yields an
//! identical indexer.

use std::collections::{BTreeMap, HashMap};

use crate::bitset::Bitset;
use crate::data::topology::Topology;
use crate::error::{Result, SubitoError};

/// Sentinel index for structures outside the indexed support
pub const OUT_OF_SUPPORT: usize = usize::MAX;

/// One topology's SBN events per rooting: element `[0]` is the rootsplit
/// index, the rest are PCSP indices; any of them may be [`OUT_OF_SUPPORT`].
pub type RootedRepresentation = Vec<usize>;

/// The rootsplit block and per-parent PCSP ranges of an observed collection
#[derive(Clone, Debug)]
pub struct SbnIndexer {
    taxon_count: usize,
    /// Observed rootsplit clades, position = index in `[0, R)`
    rootsplits: Vec<Bitset>,
    rootsplit_to_index: HashMap<Bitset, usize>,
    /// PCSP bitset (`sister|focal|child0`) to index in `[R, gpcsp_count)`
    pcsp_to_index: HashMap<Bitset, usize>,
    /// Oriented parent subsplit to its contiguous child range
    parent_to_range: HashMap<Bitset, (usize, usize)>,
    /// Child subsplit of each PCSP index, offset by the rootsplit count
    index_to_child: Vec<Bitset>,
}

impl SbnIndexer {
    /// Index the rootsplits and PCSPs observed in a topology counter.
    pub fn new(topology_counter: &[(Topology, u32)]) -> Result<Self> {
        let (first, _) = topology_counter
            .first()
            .ok_or_else(|| SubitoError::invalid_data("empty topology counter"))?;
        let taxon_count = first.taxon_count();

        // Ordered counters make index assignment deterministic.
        let mut rootsplit_counter: BTreeMap<Bitset, u32> = BTreeMap::new();
        let mut pcsp_counter: BTreeMap<Bitset, BTreeMap<Bitset, u32>> = BTreeMap::new();
        for (topology, count) in topology_counter {
            *rootsplit_counter
                .entry(topology.rootsplit_clade())
                .or_insert(0) += count;
            for edge in topology.rooted_edges() {
                if edge.is_leaf_edge() {
                    continue;
                }
                *pcsp_counter
                    .entry(edge.oriented_parent.clone())
                    .or_default()
                    .entry(edge.child0.clone())
                    .or_insert(0) += count;
            }
        }

        let mut indexer = Self {
            taxon_count,
            rootsplits: Vec::with_capacity(rootsplit_counter.len()),
            rootsplit_to_index: HashMap::new(),
            pcsp_to_index: HashMap::new(),
            parent_to_range: HashMap::new(),
            index_to_child: Vec::new(),
        };

        let mut index = 0usize;
        for rootsplit in rootsplit_counter.keys() {
            safe_insert(
                &mut indexer.rootsplit_to_index,
                rootsplit.clone(),
                index,
            )?;
            indexer.rootsplits.push(rootsplit.clone());
            index += 1;
        }
        for (parent, child_counter) in &pcsp_counter {
            safe_insert(
                &mut indexer.parent_to_range,
                parent.clone(),
                (index, index + child_counter.len()),
            )?;
            for child0 in child_counter.keys() {
                safe_insert(
                    &mut indexer.pcsp_to_index,
                    Bitset::pcsp(parent, child0),
                    index,
                )?;
                indexer
                    .index_to_child
                    .push(Bitset::child_subsplit(parent, child0));
                index += 1;
            }
        }
        Ok(indexer)
    }

    pub fn taxon_count(&self) -> usize {
        self.taxon_count
    }

    /// Number of observed rootsplits (the size of the leading block)
    pub fn rootsplit_count(&self) -> usize {
        self.rootsplits.len()
    }

    /// Total indexed parameters: rootsplits plus PCSPs
    pub fn gpcsp_count(&self) -> usize {
        self.rootsplits.len() + self.index_to_child.len()
    }

    /// Observed rootsplit clades in index order
    pub fn rootsplits(&self) -> &[Bitset] {
        &self.rootsplits
    }

    pub fn rootsplit_index(&self, clade: &Bitset) -> Option<usize> {
        self.rootsplit_to_index.get(clade).copied()
    }

    pub fn pcsp_index(&self, pcsp: &Bitset) -> Option<usize> {
        self.pcsp_to_index.get(pcsp).copied()
    }

    /// Like [`Self::pcsp_index`] but failing loudly: absence means a
    /// scheduler or construction bug, not missing data.
    pub fn require_pcsp_index(&self, pcsp: &Bitset) -> Result<usize> {
        self.pcsp_index(pcsp)
            .ok_or_else(|| SubitoError::indexer_lookup(pcsp.pcsp_string()))
    }

    /// The contiguous child range of an oriented parent subsplit
    pub fn parent_range(&self, parent: &Bitset) -> Option<(usize, usize)> {
        self.parent_to_range.get(parent).copied()
    }

    /// Child subsplit stored at a PCSP index
    pub fn child_subsplit_at(&self, index: usize) -> &Bitset {
        &self.index_to_child[index - self.rootsplits.len()]
    }

    /// The child subsplits of an oriented parent, in index order
    pub fn children_subsplits(&self, parent: &Bitset) -> Vec<Bitset> {
        match self.parent_range(parent) {
            Some((start, stop)) => (start..stop)
                .map(|index| self.child_subsplit_at(index).clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Iterate the per-parent ranges (order unspecified)
    pub fn parent_ranges(&self) -> impl Iterator<Item = (&Bitset, (usize, usize))> {
        self.parent_to_range.iter().map(|(k, &v)| (k, v))
    }

    /// The rootsplit and internal-edge PCSP indices of one rooted topology,
    /// with [`OUT_OF_SUPPORT`] marking events outside the support.
    pub fn rooted_representation_of(&self, topology: &Topology) -> RootedRepresentation {
        let mut representation = Vec::with_capacity(topology.taxon_count() - 1);
        representation.push(
            self.rootsplit_index(&topology.rootsplit_clade())
                .unwrap_or(OUT_OF_SUPPORT),
        );
        for edge in topology.rooted_edges() {
            if edge.is_leaf_edge() {
                continue;
            }
            representation.push(self.pcsp_index(&edge.pcsp()).unwrap_or(OUT_OF_SUPPORT));
        }
        representation
    }

    /// Representations of every rooting of a topology, in rooting order
    pub fn representation_over_rootings(
        &self,
        topology: &Topology,
    ) -> Vec<RootedRepresentation> {
        topology
            .rootings()
            .iter()
            .map(|rooting| self.rooted_representation_of(rooting))
            .collect()
    }

    /// Key-set and range equality, used to compare independently built
    /// indexers.
    pub fn same_support_as(&self, other: &SbnIndexer) -> bool {
        self.rootsplits == other.rootsplits
            && self.pcsp_to_index == other.pcsp_to_index
            && self.parent_to_range == other.parent_to_range
    }
}

fn safe_insert<K: std::hash::Hash + Eq + ToString, V>(
    map: &mut HashMap<K, V>,
    key: K,
    value: V,
) -> Result<()> {
    let rendered = key.to_string();
    if map.insert(key, value).is_some() {
        return Err(SubitoError::invalid_data(format!(
            "duplicate indexer insertion for {rendered}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::topology::{ladder_topology, TopologyBuilder};

    fn five_taxon_counter() -> Vec<(Topology, u32)> {
        let ladder = ladder_topology(5).unwrap();
        let mut builder = TopologyBuilder::new(5);
        let l0 = builder.leaf(0);
        let l1 = builder.leaf(1);
        let l2 = builder.leaf(2);
        let l3 = builder.leaf(3);
        let l4 = builder.leaf(4);
        let a = builder.join(l0, l1);
        let b = builder.join(l2, l3);
        let ab = builder.join(a, b);
        let root = builder.join(ab, l4);
        let balanced = builder.finish(root).unwrap();
        vec![(ladder, 2), (balanced, 1)]
    }

    #[test]
    fn test_block_layout() {
        let counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&counter).unwrap();
        let r = indexer.rootsplit_count();
        assert!(r >= 1);
        // Ranges are disjoint and cover [R, gpcsp_count).
        let mut covered = vec![false; indexer.gpcsp_count() - r];
        for (_, (start, stop)) in indexer.parent_ranges() {
            assert!(start >= r && stop <= indexer.gpcsp_count() && start < stop);
            for slot in covered[start - r..stop - r].iter_mut() {
                assert!(!*slot, "overlapping parent ranges");
                *slot = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn test_bijection_over_observed_edges() {
        let counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&counter).unwrap();
        for (topology, _) in &counter {
            for edge in topology.rooted_edges() {
                if edge.is_leaf_edge() {
                    continue;
                }
                let index = indexer.pcsp_index(&edge.pcsp()).unwrap();
                assert!(index >= indexer.rootsplit_count());
                assert!(index < indexer.gpcsp_count());
                // Child-subsplit lookup recovers the same index through the
                // parent range.
                let child = Bitset::child_subsplit(&edge.oriented_parent, &edge.child0);
                assert_eq!(indexer.child_subsplit_at(index), &child);
                let (start, stop) = indexer.parent_range(&edge.oriented_parent).unwrap();
                assert!((start..stop).contains(&index));
            }
        }
    }

    #[test]
    fn test_deterministic_rebuild() {
        let counter = five_taxon_counter();
        let a = SbnIndexer::new(&counter).unwrap();
        let b = SbnIndexer::new(&counter).unwrap();
        assert!(a.same_support_as(&b));
        assert_eq!(a.gpcsp_count(), b.gpcsp_count());
    }

    #[test]
    fn test_rooted_representation() {
        let counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&counter).unwrap();
        for (topology, _) in &counter {
            let representation = indexer.rooted_representation_of(topology);
            // Rootsplit plus one entry per internal edge (taxon_count - 2).
            assert_eq!(representation.len(), 4);
            assert!(representation.iter().all(|&i| i != OUT_OF_SUPPORT));
        }
        // Rootings other than the observed ones may leave the support.
        let rootings = indexer.representation_over_rootings(&counter[0].0);
        assert_eq!(rootings.len(), 7);
        assert!(rootings[0].iter().all(|&i| i != OUT_OF_SUPPORT));
    }

    #[test]
    fn test_duplicate_insertion_is_fatal() {
        let mut map: HashMap<String, usize> = HashMap::new();
        safe_insert(&mut map, "0110".to_string(), 1).unwrap();
        assert!(safe_insert(&mut map, "0110".to_string(), 2).is_err());
    }
}
