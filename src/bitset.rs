//! # Bitset and Subsplit Algebra
//!
//! Fixed-width bit vectors with three semantic interpretations:
//!
//! - *Clade*: length = taxon count; set bits are the taxa in a clade.
//! - *Subsplit*: length = 2 × taxon count, split into two clade halves
//!   ("chunk 0" and "chunk 1"). A subsplit is canonical iff chunk 0 sorts
//!   lexicographically before chunk 1. A *rootsplit* is a subsplit whose
//!   chunks partition the whole taxon set; a *fake subsplit* pairs an empty
//!   chunk 0 with a singleton chunk 1 (a leaf).
//! - *PCSP*: length = 3 × taxon count, halves `sister|focal|child0`. The
//!   second child half is implied as `focal \ child0`.
//!
//! Operations are pure and allocate at most one new bitset. The ordering is
//! lexicographic over bits (clear before set at the first difference), which
//! doubles as the canonical order for map keys.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use bitvec::prelude::*;

/// Fixed-width bit vector keyed on semantic interpretation by its callers
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Bitset {
    bits: BitVec<u64, Lsb0>,
}

impl Bitset {
    /// Create an all-zero bitset of the given length
    pub fn zero(len: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; len],
        }
    }

    /// Create a singleton clade over `len` taxa
    pub fn singleton(len: usize, taxon: usize) -> Self {
        let mut bits = bitvec![u64, Lsb0; 0; len];
        bits.set(taxon, true);
        Self { bits }
    }

    /// Create from explicit bit values
    pub fn from_bits(values: impl IntoIterator<Item = bool>) -> Self {
        Self {
            bits: values.into_iter().collect(),
        }
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True if the bitset has zero width
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.bits.set(index, value);
    }

    /// True if any bit is set
    pub fn any(&self) -> bool {
        self.bits.any()
    }

    /// True if no bit is set
    pub fn none(&self) -> bool {
        self.bits.not_any()
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// The index of the single set bit, if exactly one bit is set
    pub fn singleton_option(&self) -> Option<usize> {
        let mut ones = self.bits.iter_ones();
        match (ones.next(), ones.next()) {
            (Some(index), None) => Some(index),
            _ => None,
        }
    }

    /// Iterate indices of set bits
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    /// True if `self ∩ other = ∅`
    pub fn is_disjoint(&self, other: &Bitset) -> bool {
        debug_assert_eq!(self.len(), other.len());
        self.bits
            .iter_ones()
            .all(|index| !other.bits[index])
    }

    /// True if every set bit of `self` is set in `other`
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        debug_assert_eq!(self.len(), other.len());
        self.bits.iter_ones().all(|index| other.bits[index])
    }

    /// Concatenate, producing a wider bitset (`self` first)
    pub fn concat(&self, other: &Bitset) -> Bitset {
        let mut bits = self.bits.clone();
        bits.extend_from_bitslice(&other.bits);
        Bitset { bits }
    }

    /// Slice out the `index`-th of `count` equal-width chunks
    fn chunk(&self, index: usize, count: usize) -> Bitset {
        debug_assert_eq!(self.len() % count, 0);
        let width = self.len() / count;
        Bitset {
            bits: self.bits[index * width..(index + 1) * width].to_bitvec(),
        }
    }

    // ** Subsplit interpretation

    /// Build the canonical subsplit of two disjoint clades
    pub fn subsplit(a: &Bitset, b: &Bitset) -> Bitset {
        debug_assert_eq!(a.len(), b.len());
        debug_assert!(a.is_disjoint(b), "subsplit chunks must be disjoint");
        if b < a {
            b.concat(a)
        } else {
            a.concat(b)
        }
    }

    /// Build the rootsplit subsplit `(clade, complement)` in canonical order
    pub fn rootsplit_subsplit(clade: &Bitset) -> Bitset {
        Bitset::subsplit(clade, &!clade)
    }

    /// Build the fake subsplit `(∅, {taxon})` for a leaf
    pub fn fake_subsplit(taxon: usize, taxon_count: usize) -> Bitset {
        Bitset::zero(taxon_count).concat(&Bitset::singleton(taxon_count, taxon))
    }

    /// One of the two clade halves of a subsplit
    pub fn split_chunk(&self, index: usize) -> Bitset {
        self.chunk(index, 2)
    }

    /// Swap the two halves of a subsplit
    pub fn rotate_subsplit(&self) -> Bitset {
        self.split_chunk(1).concat(&self.split_chunk(0))
    }

    /// True when chunk 0 sorts at or before chunk 1
    pub fn subsplit_is_canonical(&self) -> bool {
        self.split_chunk(0) <= self.split_chunk(1)
    }

    /// Union of the two subsplit halves
    pub fn subsplit_union(&self) -> Bitset {
        &self.split_chunk(0) | &self.split_chunk(1)
    }

    /// True for `(∅, {leaf})` subsplits
    pub fn is_fake_subsplit(&self) -> bool {
        self.split_chunk(0).none() && self.split_chunk(1).singleton_option().is_some()
    }

    /// Render a subsplit as `chunk0|chunk1`
    pub fn subsplit_string(&self) -> String {
        format!("{}|{}", self.split_chunk(0), self.split_chunk(1))
    }

    // ** PCSP interpretation

    /// Build the PCSP bitset `sister|focal|child0` from an oriented parent
    /// subsplit (focal clade in chunk 1) and the lexicographically smaller
    /// child half. An empty child half encodes an edge to a leaf.
    pub fn pcsp(parent: &Bitset, child0: &Bitset) -> Bitset {
        debug_assert_eq!(parent.len(), 2 * child0.len());
        debug_assert!(child0.is_subset_of(&parent.split_chunk(1)));
        parent.concat(child0)
    }

    /// One of the three equal-width PCSP chunks
    pub fn pcsp_chunk(&self, index: usize) -> Bitset {
        self.chunk(index, 3)
    }

    /// True when the child half properly refines the focal clade
    pub fn pcsp_is_valid(&self) -> bool {
        let sister = self.pcsp_chunk(0);
        let focal = self.pcsp_chunk(1);
        let child0 = self.pcsp_chunk(2);
        sister.is_disjoint(&focal)
            && child0.is_subset_of(&focal)
            && child0.any()
            && child0 != focal
    }

    /// The canonical child subsplit of a PCSP, given the oriented parent and
    /// the stored child half: `(child0, focal \ child0)` in canonical order.
    pub fn child_subsplit(parent: &Bitset, child0: &Bitset) -> Bitset {
        let focal = parent.split_chunk(1);
        let other = &focal ^ child0;
        Bitset::subsplit(child0, &other)
    }

    /// Render a PCSP as `sister|focal|child0`
    pub fn pcsp_string(&self) -> String {
        format!(
            "{}|{}|{}",
            self.pcsp_chunk(0),
            self.pcsp_chunk(1),
            self.pcsp_chunk(2)
        )
    }
}

impl PartialOrd for Bitset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bitset {
    /// Lexicographic over bits from index zero; width breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.bits.iter().by_vals().zip(other.bits.iter().by_vals()) {
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.len().cmp(&other.len())
    }
}

impl Bitset {
    fn zip_with(&self, rhs: &Bitset, op: impl Fn(bool, bool) -> bool) -> Bitset {
        debug_assert_eq!(self.len(), rhs.len());
        Bitset {
            bits: self
                .bits
                .iter()
                .by_vals()
                .zip(rhs.bits.iter().by_vals())
                .map(|(a, b)| op(a, b))
                .collect(),
        }
    }
}

impl Not for &Bitset {
    type Output = Bitset;
    fn not(self) -> Bitset {
        Bitset {
            bits: self.bits.iter().by_vals().map(|bit| !bit).collect(),
        }
    }
}

impl BitAnd for &Bitset {
    type Output = Bitset;
    fn bitand(self, rhs: &Bitset) -> Bitset {
        self.zip_with(rhs, |a, b| a & b)
    }
}

impl BitOr for &Bitset {
    type Output = Bitset;
    fn bitor(self, rhs: &Bitset) -> Bitset {
        self.zip_with(rhs, |a, b| a | b)
    }
}

impl BitXor for &Bitset {
    type Output = Bitset;
    fn bitxor(self, rhs: &Bitset) -> Bitset {
        self.zip_with(rhs, |a, b| a ^ b)
    }
}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits.iter().by_vals() {
            write!(f, "{}", if bit { '1' } else { '0' })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitset({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clade(bits: &[u8]) -> Bitset {
        Bitset::from_bits(bits.iter().map(|&b| b != 0))
    }

    #[test]
    fn test_basic_queries() {
        let b = clade(&[0, 1, 0, 1]);
        assert_eq!(b.len(), 4);
        assert_eq!(b.count(), 2);
        assert!(b.any());
        assert!(!b.none());
        assert_eq!(b.singleton_option(), None);
        assert_eq!(clade(&[0, 0, 1, 0]).singleton_option(), Some(2));
    }

    #[test]
    fn test_lexicographic_order() {
        // Clear sorts before set at the first differing bit.
        assert!(clade(&[0, 1]) < clade(&[1, 0]));
        assert!(clade(&[0, 0, 1]) < clade(&[0, 1, 0]));
        assert!(clade(&[1, 0]) == clade(&[1, 0]));
    }

    #[test]
    fn test_bit_ops() {
        let a = clade(&[1, 1, 0, 0]);
        let b = clade(&[0, 1, 1, 0]);
        assert_eq!(&a & &b, clade(&[0, 1, 0, 0]));
        assert_eq!(&a | &b, clade(&[1, 1, 1, 0]));
        assert_eq!(&a ^ &b, clade(&[1, 0, 1, 0]));
        assert_eq!(!&a, clade(&[0, 0, 1, 1]));
        assert!(clade(&[1, 0, 0, 0]).is_disjoint(&clade(&[0, 1, 1, 0])));
        assert!(clade(&[0, 1, 0, 0]).is_subset_of(&b));
    }

    #[test]
    fn test_subsplit_canonicalization() {
        let a = clade(&[1, 0, 0]);
        let b = clade(&[0, 1, 1]);
        let s = Bitset::subsplit(&a, &b);
        // [0,1,1] sorts before [1,0,0], so it lands in chunk 0.
        assert_eq!(s.split_chunk(0), b);
        assert_eq!(s.split_chunk(1), a);
        assert!(s.subsplit_is_canonical());
        assert_eq!(s.subsplit_union(), clade(&[1, 1, 1]));
    }

    #[test]
    fn test_rotate_subsplit_involution() {
        let s = Bitset::subsplit(&clade(&[1, 0, 0, 1]), &clade(&[0, 1, 0, 0]));
        assert_eq!(s.rotate_subsplit().rotate_subsplit(), s);
        assert!(!s.rotate_subsplit().subsplit_is_canonical() || s == s.rotate_subsplit());
    }

    #[test]
    fn test_rootsplit_and_fake_subsplits() {
        let r = Bitset::rootsplit_subsplit(&clade(&[1, 0, 1]));
        assert_eq!(r.subsplit_union(), clade(&[1, 1, 1]));
        assert!(r.subsplit_is_canonical());

        let fake = Bitset::fake_subsplit(1, 3);
        assert!(fake.is_fake_subsplit());
        assert_eq!(fake.split_chunk(1).singleton_option(), Some(1));
        assert!(!r.is_fake_subsplit());
    }

    #[test]
    fn test_pcsp_construction_and_validity() {
        // Parent (sister = {0}, focal = {1,2,3}); child half {1}.
        let parent = clade(&[1, 0, 0, 0]).concat(&clade(&[0, 1, 1, 1]));
        let child0 = clade(&[0, 1, 0, 0]);
        let pcsp = Bitset::pcsp(&parent, &child0);
        assert_eq!(pcsp.len(), 12);
        assert!(pcsp.pcsp_is_valid());
        assert_eq!(pcsp.pcsp_chunk(2), child0);

        // Leaf-edge PCSP: empty child half is representable but not "valid".
        let leaf_parent = clade(&[0, 1, 1, 0]).concat(&clade(&[1, 0, 0, 0]));
        let leaf_pcsp = Bitset::pcsp(&leaf_parent, &Bitset::zero(4));
        assert!(!leaf_pcsp.pcsp_is_valid());
    }

    #[test]
    fn test_child_subsplit() {
        let parent = clade(&[1, 0, 0, 0]).concat(&clade(&[0, 1, 1, 1]));
        let child0 = clade(&[0, 1, 0, 0]);
        let child = Bitset::child_subsplit(&parent, &child0);
        assert!(child.subsplit_is_canonical());
        assert_eq!(child.subsplit_union(), clade(&[0, 1, 1, 1]));
        // The two halves are {1} and {2,3}.
        assert_eq!(child.split_chunk(0), clade(&[0, 0, 1, 1]));
        assert_eq!(child.split_chunk(1), clade(&[0, 1, 0, 0]));
    }

    #[test]
    fn test_display() {
        let s = Bitset::fake_subsplit(0, 2);
        assert_eq!(s.to_string(), "0010");
        assert_eq!(s.subsplit_string(), "00|10");
    }
}
