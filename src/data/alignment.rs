//! # Alignment
//!
//! In-memory nucleotide alignment: a mapping from taxon name to sequence.
//! Sequences must all share one length; characters come from the DNA symbol
//! table (upper- or lower-case bases plus `-` for a gap).

use std::collections::BTreeMap;

use crate::error::{Result, SubitoError};

/// Number of nucleotide states
pub const STATE_COUNT: usize = 4;

/// The symbol code used for a gap character: a tip column of all ones
pub const GAP_SYMBOL: u8 = STATE_COUNT as u8;

/// Map a sequence character to its symbol code
pub fn symbol_of(character: char) -> Result<u8> {
    match character {
        'A' | 'a' => Ok(0),
        'C' | 'c' => Ok(1),
        'G' | 'g' => Ok(2),
        'T' | 't' => Ok(3),
        '-' => Ok(GAP_SYMBOL),
        other => Err(SubitoError::invalid_data(format!(
            "unknown sequence character '{other}'"
        ))),
    }
}

/// A nucleotide alignment keyed by taxon name.
///
/// Storage is an ordered map so that iteration, and everything derived from
/// it, is deterministic.
#[derive(Clone, Debug, Default)]
pub struct Alignment {
    data: BTreeMap<String, String>,
}

impl Alignment {
    /// Build an alignment from (taxon, sequence) pairs, validating shape and
    /// symbols up front.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut data = BTreeMap::new();
        for (taxon, sequence) in pairs {
            if data.insert(taxon.clone(), sequence).is_some() {
                return Err(SubitoError::invalid_data(format!(
                    "duplicate taxon '{taxon}' in alignment"
                )));
            }
        }
        let alignment = Self { data };
        alignment.validate()?;
        Ok(alignment)
    }

    /// Number of sequences
    pub fn sequence_count(&self) -> usize {
        self.data.len()
    }

    /// Shared sequence length
    pub fn length(&self) -> usize {
        self.data
            .values()
            .next()
            .map(|sequence| sequence.len())
            .unwrap_or(0)
    }

    /// Look up a taxon's sequence
    pub fn sequence(&self, taxon: &str) -> Result<&str> {
        self.data
            .get(taxon)
            .map(String::as_str)
            .ok_or_else(|| {
                SubitoError::invalid_data(format!("taxon '{taxon}' not found in alignment"))
            })
    }

    /// Iterate (taxon, sequence) in taxon order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data
            .iter()
            .map(|(taxon, sequence)| (taxon.as_str(), sequence.as_str()))
    }

    fn validate(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(SubitoError::invalid_data("empty alignment"));
        }
        let length = self.length();
        if length == 0 {
            return Err(SubitoError::invalid_data("zero-length alignment"));
        }
        for (taxon, sequence) in &self.data {
            if sequence.len() != length {
                return Err(SubitoError::invalid_data(format!(
                    "sequence for '{}' has length {}, expected {}",
                    taxon,
                    sequence.len(),
                    length
                )));
            }
            for character in sequence.chars() {
                symbol_of(character)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(taxon: &str, sequence: &str) -> (String, String) {
        (taxon.to_string(), sequence.to_string())
    }

    #[test]
    fn test_valid_alignment() {
        let alignment =
            Alignment::new([pair("mars", "ACGT"), pair("saturn", "A-GT")]).unwrap();
        assert_eq!(alignment.sequence_count(), 2);
        assert_eq!(alignment.length(), 4);
        assert_eq!(alignment.sequence("mars").unwrap(), "ACGT");
        assert!(alignment.sequence("pluto").is_err());
    }

    #[test]
    fn test_rejects_ragged_alignment() {
        assert!(Alignment::new([pair("a", "ACGT"), pair("b", "ACG")]).is_err());
    }

    #[test]
    fn test_rejects_unknown_symbols() {
        assert!(Alignment::new([pair("a", "ACNT")]).is_err());
        assert!(Alignment::new([]).is_err());
    }

    #[test]
    fn test_symbol_table() {
        assert_eq!(symbol_of('A').unwrap(), 0);
        assert_eq!(symbol_of('c').unwrap(), 1);
        assert_eq!(symbol_of('G').unwrap(), 2);
        assert_eq!(symbol_of('t').unwrap(), 3);
        assert_eq!(symbol_of('-').unwrap(), GAP_SYMBOL);
    }
}
