//! # Utilities Module
//!
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! ## Sub-modules
//! - `numeric`: Log-space arithmetic (log-add, log-sum, normalization)

pub mod numeric;
