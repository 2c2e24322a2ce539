//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Severity rises through the variants: input-shape problems surface before
//! any engine operation runs; indexer-lookup and numeric failures indicate a
//! scheduler or arithmetic fault mid-stream and abort the current phase.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for subito operations
#[derive(Error, Debug)]
pub enum SubitoError {
    /// I/O errors (mmap backing file creation, truncation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input data (alignment not aligned, taxa mismatch, bad symbol)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// A PCSP or subsplit was not found in the indexer.
    /// Indicates a scheduler bug; carries the offending bitset rendering.
    #[error("Indexer lookup failed for bitset {bitset}")]
    IndexerLookup { bitset: String },

    /// Numeric failures (non-finite log-likelihood, negative PLV entry,
    /// out-of-range optimizer result, rescaling counter overflow)
    #[error("Numeric error: {message}")]
    Numeric { message: String },

    /// Configuration errors (invalid thresholds or bounds)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Resource errors other than plain I/O
    #[error("Resource error at {path}: {message}")]
    Resource { path: PathBuf, message: String },
}

/// Type alias for Results using SubitoError
pub type Result<T> = std::result::Result<T, SubitoError>;

impl SubitoError {
    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an indexer lookup error from the offending bitset
    pub fn indexer_lookup(bitset: impl ToString) -> Self {
        Self::IndexerLookup {
            bitset: bitset.to_string(),
        }
    }

    /// Create a numeric error
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::Numeric {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
