//! # PLV Arena
//!
//! One contiguous, optionally file-backed buffer of partial likelihood
//! vectors. A slot is a dense `state_count × pattern_count` matrix in
//! row-major order (state varies slower); slots are addressed by plain
//! integers and handed out as slices that share the single backing store.
//!
//! When a backing path is configured the buffer is a memory-mapped file:
//! a raw headerless `f64` array in (slot, state, pattern) order that
//! survives the process and belongs to the caller. Otherwise the mapping is
//! anonymous. Either way the mapping is acquired at construction and
//! released on drop.
//!
//! Each slot carries an integer rescaling counter `c`: rescaling divides the
//! stored value by `threshold^c`, so the slot's true value is its stored
//! value times `threshold^(+c)`. Zeroed slots have `c = 0`.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::data::alignment::STATE_COUNT;
use crate::error::{Result, SubitoError};

/// The arena of PLV slots with per-slot rescaling counters
pub struct PlvArena {
    mmap: MmapMut,
    plv_count: usize,
    pattern_count: usize,
    slot_len: usize,
    rescaling_counts: Vec<i32>,
    threshold: f64,
    log_threshold: f64,
}

impl PlvArena {
    /// Reserve `plv_count` slots of shape `STATE_COUNT × pattern_count`,
    /// zero-initialized, file-backed when `backing_path` is given.
    pub fn new(
        plv_count: usize,
        pattern_count: usize,
        threshold: f64,
        backing_path: Option<&Path>,
    ) -> Result<Self> {
        if plv_count == 0 {
            return Err(SubitoError::invalid_data("zero PLV count for arena"));
        }
        if pattern_count == 0 {
            return Err(SubitoError::invalid_data("zero pattern count for arena"));
        }
        let slot_len = STATE_COUNT * pattern_count;
        let byte_len = plv_count * slot_len * std::mem::size_of::<f64>();
        let mmap = match backing_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|error| SubitoError::Resource {
                        path: path.to_path_buf(),
                        message: error.to_string(),
                    })?;
                file.set_len(byte_len as u64)
                    .map_err(|error| SubitoError::Resource {
                        path: path.to_path_buf(),
                        message: error.to_string(),
                    })?;
                // The mapping outlives the handle; the file is ours for the
                // arena's lifetime.
                unsafe { MmapMut::map_mut(&file) }.map_err(|error| SubitoError::Resource {
                    path: path.to_path_buf(),
                    message: error.to_string(),
                })?
            }
            None => MmapMut::map_anon(byte_len)?,
        };
        Ok(Self {
            mmap,
            plv_count,
            pattern_count,
            slot_len,
            rescaling_counts: vec![0; plv_count],
            threshold,
            log_threshold: threshold.ln(),
        })
    }

    pub fn plv_count(&self) -> usize {
        self.plv_count
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    fn data(&self) -> &[f64] {
        bytemuck::cast_slice(&self.mmap)
    }

    fn data_mut(&mut self) -> &mut [f64] {
        bytemuck::cast_slice_mut(&mut self.mmap)
    }

    /// Immutable view of one slot
    pub fn slot(&self, index: usize) -> &[f64] {
        &self.data()[index * self.slot_len..(index + 1) * self.slot_len]
    }

    /// Mutable view of one slot
    pub fn slot_mut(&mut self, index: usize) -> &mut [f64] {
        let range = index * self.slot_len..(index + 1) * self.slot_len;
        &mut self.data_mut()[range]
    }

    /// Mutable destination plus one read-only source; the two must differ.
    pub fn slot_pair_mut(&mut self, dest: usize, src: usize) -> (&mut [f64], &[f64]) {
        assert_ne!(dest, src, "aliasing slot access");
        let len = self.slot_len;
        let data = self.data_mut();
        let (low, high) = (dest.min(src), dest.max(src));
        let (head, tail) = data.split_at_mut(high * len);
        let low_slice = &mut head[low * len..(low + 1) * len];
        let high_slice = &mut tail[..len];
        if dest < src {
            (low_slice, high_slice)
        } else {
            (high_slice, low_slice)
        }
    }

    /// Mutable destination plus two read-only sources; the destination must
    /// differ from both sources (which may coincide).
    pub fn slot_triple_mut(
        &mut self,
        dest: usize,
        src1: usize,
        src2: usize,
    ) -> (&mut [f64], &[f64], &[f64]) {
        assert!(dest != src1 && dest != src2, "aliasing slot access");
        if src1 == src2 {
            let (dest_slice, src_slice) = self.slot_pair_mut(dest, src1);
            return (dest_slice, src_slice, src_slice);
        }
        let len = self.slot_len;
        let mut sorted = [(dest, 0usize), (src1, 1), (src2, 2)];
        sorted.sort_unstable_by_key(|&(slot, _)| slot);
        let data = self.data_mut();
        let (head, rest) = data.split_at_mut(sorted[1].0 * len);
        let (mid, tail) = rest.split_at_mut((sorted[2].0 - sorted[1].0) * len);
        let first = &mut head[sorted[0].0 * len..(sorted[0].0 + 1) * len];
        let second = &mut mid[..len];
        let third = &mut tail[..len];
        let mut by_role: [Option<&mut [f64]>; 3] = [None, None, None];
        by_role[sorted[0].1] = Some(first);
        by_role[sorted[1].1] = Some(second);
        by_role[sorted[2].1] = Some(third);
        let [dest_slice, src1_slice, src2_slice] = by_role;
        let dest_slice = dest_slice.expect("destination slice assigned");
        let src1_slice: &[f64] = src1_slice.expect("first source assigned");
        let src2_slice: &[f64] = src2_slice.expect("second source assigned");
        (dest_slice, src1_slice, src2_slice)
    }

    // ** Rescaling discipline

    pub fn rescaling_count(&self, index: usize) -> i32 {
        self.rescaling_counts[index]
    }

    pub fn set_rescaling_count(&mut self, index: usize, count: i32) {
        self.rescaling_counts[index] = count;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `c · log(threshold)` for the slot: the log correction restoring the
    /// slot's true scale
    pub fn log_rescaling_for(&self, index: usize) -> f64 {
        f64::from(self.rescaling_counts[index]) * self.log_threshold
    }

    /// Zero the slot and clear its rescaling counter
    pub fn zero_slot(&mut self, index: usize) {
        self.slot_mut(index).fill(0.0);
        self.rescaling_counts[index] = 0;
    }

    /// Divide the slot by `threshold^count`, incrementing its counter
    fn rescale(&mut self, index: usize, count: i32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let factor = self.threshold.powi(-count);
        for value in self.slot_mut(index).iter_mut() {
            *value *= factor;
        }
        self.rescaling_counts[index] = self.rescaling_counts[index]
            .checked_add(count)
            .ok_or_else(|| SubitoError::numeric("rescaling counter overflow"))?;
        Ok(())
    }

    /// Rescale the slot until its minimum entry reaches the threshold.
    /// Exact zeros are left alone; negative entries are fatal.
    pub fn rescale_if_needed(&mut self, index: usize) -> Result<()> {
        let mut min_entry = f64::INFINITY;
        for &value in self.slot(index) {
            if value < min_entry {
                min_entry = value;
            }
        }
        if min_entry < 0.0 {
            return Err(SubitoError::numeric(format!(
                "negative PLV entry {min_entry} in slot {index}"
            )));
        }
        if min_entry == 0.0 {
            return Ok(());
        }
        let mut count = 0;
        while min_entry < self.threshold {
            min_entry /= self.threshold;
            count += 1;
        }
        self.rescale(index, count)
    }
}
