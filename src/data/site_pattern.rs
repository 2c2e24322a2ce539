//! # Site Pattern Compression
//!
//! Compresses an alignment into its unique column patterns with integer
//! weights, so the likelihood engine touches each distinct column once.
//!
//! Patterns are stored per taxon (one symbol row per taxon, one entry per
//! pattern) in first-occurrence column order, which keeps everything built
//! on top of them deterministic.

use std::collections::HashMap;

use crate::data::alignment::{symbol_of, Alignment};
use crate::error::{Result, SubitoError};

/// Compressed site patterns over a fixed taxon ordering
#[derive(Clone, Debug)]
pub struct SitePattern {
    /// Per-taxon symbol rows; `rows[taxon][pattern]`
    rows: Vec<Vec<u8>>,
    /// Multiplicity of each pattern across the alignment
    weights: Vec<f64>,
}

impl SitePattern {
    /// Compress `alignment` with taxon ids assigned by position in
    /// `taxon_names`. Every named taxon must be present in the alignment.
    pub fn new(alignment: &Alignment, taxon_names: &[String]) -> Result<Self> {
        if taxon_names.is_empty() {
            return Err(SubitoError::invalid_data("no taxa for site pattern"));
        }
        let length = alignment.length();
        let mut sequences = Vec::with_capacity(taxon_names.len());
        for name in taxon_names {
            sequences.push(alignment.sequence(name)?.as_bytes());
        }

        // Deduplicate columns, preserving first-occurrence order.
        let mut pattern_index: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut patterns: Vec<Vec<u8>> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for site in 0..length {
            let mut column = Vec::with_capacity(sequences.len());
            for sequence in &sequences {
                column.push(symbol_of(sequence[site] as char)?);
            }
            match pattern_index.get(&column) {
                Some(&index) => weights[index] += 1.0,
                None => {
                    pattern_index.insert(column.clone(), patterns.len());
                    patterns.push(column);
                    weights.push(1.0);
                }
            }
        }

        // Transpose into per-taxon rows.
        let rows = (0..taxon_names.len())
            .map(|taxon| patterns.iter().map(|pattern| pattern[taxon]).collect())
            .collect();

        Ok(Self { rows, weights })
    }

    /// Number of distinct patterns
    pub fn pattern_count(&self) -> usize {
        self.weights.len()
    }

    /// Number of taxa
    pub fn taxon_count(&self) -> usize {
        self.rows.len()
    }

    /// Symbol row for one taxon, one entry per pattern
    pub fn row(&self, taxon: usize) -> &[u8] {
        &self.rows[taxon]
    }

    /// Pattern multiplicities
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Total number of sites represented
    pub fn site_count(&self) -> f64 {
        self.weights.iter().sum()
    }
}
