//! # Engine Configuration
//!
//! Numeric constants and backing-storage options for the generalized-pruning
//! engine, with validation. Every tolerance the engine consults lives here so
//! that reference values can be reproduced exactly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SubitoError};

/// Which 1-D optimizer handles `OptimizeBranchLength` operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchOptimizer {
    /// Brent minimization of the negative log-likelihood (default)
    Brent,
    /// Gradient ascent using the closed-form derivative matrix
    GradientAscent,
}

/// Configuration for [`GpEngine`](crate::engine::GpEngine) and
/// [`GpPipeline`](crate::pipelines::GpPipeline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rescaling threshold for partial likelihood vectors.
    /// A slot whose minimum entry falls below this is divided by it,
    /// incrementing the slot's rescaling counter.
    pub rescaling_threshold: f64,

    /// Lower bound for branch lengths handed to the optimizer
    pub branch_length_min: f64,

    /// Upper bound for branch lengths; effectively unbounded in practice
    pub branch_length_max: f64,

    /// Significant digits requested from Brent optimization
    pub significant_digits: usize,

    /// Iteration cap for 1-D optimization. Exceeding it returns the best
    /// value found so far; it is not an error.
    pub max_optimizer_iterations: usize,

    /// Step size for the gradient-ascent optimizer
    pub gradient_step_size: f64,

    /// Relative tolerance for the gradient-ascent optimizer
    pub gradient_relative_tolerance: f64,

    /// Which optimizer handles branch-length operations
    pub branch_optimizer: BranchOptimizer,

    /// Optional file backing for the PLV arena. When present the file
    /// survives the process and must be deleted by the caller.
    pub mmap_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rescaling_threshold: (2.0f64).powi(-40),
            branch_length_min: 1e-6,
            branch_length_max: 1e4,
            significant_digits: 6,
            max_optimizer_iterations: 1000,
            gradient_step_size: 0.002,
            gradient_relative_tolerance: 1e-4,
            branch_optimizer: BranchOptimizer::Brent,
            mmap_path: None,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.rescaling_threshold > 0.0 && self.rescaling_threshold < 1.0) {
            return Err(SubitoError::config(
                "rescaling_threshold must lie strictly between 0 and 1",
            ));
        }
        if self.branch_length_min <= 0.0 {
            return Err(SubitoError::config("branch_length_min must be positive"));
        }
        if self.branch_length_max <= self.branch_length_min {
            return Err(SubitoError::config(
                "branch_length_max must exceed branch_length_min",
            ));
        }
        if self.significant_digits == 0 {
            return Err(SubitoError::config(
                "significant_digits must be at least 1",
            ));
        }
        if self.max_optimizer_iterations == 0 {
            return Err(SubitoError::config(
                "max_optimizer_iterations must be at least 1",
            ));
        }
        Ok(())
    }

    /// Natural log of the rescaling threshold
    pub fn log_rescaling_threshold(&self) -> f64 {
        self.rescaling_threshold.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rescaling_threshold, (2.0f64).powi(-40));
        assert_eq!(config.branch_length_min, 1e-6);
        assert_eq!(config.significant_digits, 6);
        assert_eq!(config.max_optimizer_iterations, 1000);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut config = EngineConfig::default();
        config.branch_length_max = config.branch_length_min;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.rescaling_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
