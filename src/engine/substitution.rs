//! # Phylogenetic Model Interfaces
//!
//! The engine consumes a substitution model through its eigensystem only:
//! right eigenvectors, their inverse, the eigenvalue vector and the
//! stationary distribution. Site and clock models enter through equally
//! narrow interfaces (category rates and a per-branch rate multiplier).
//!
//! Jukes-Cantor is provided in closed form; any reversible model can be
//! supplied as a precomputed eigensystem.

use nalgebra::{Matrix4, Vector4};

use crate::error::{Result, SubitoError};

/// A nucleotide substitution model in eigendecomposed form
#[derive(Clone, Debug)]
pub struct SubstitutionModel {
    /// Matrix of right eigenvectors of the rate matrix
    eigenvectors: Matrix4<f64>,
    /// Inverse of the eigenvector matrix
    inverse_eigenvectors: Matrix4<f64>,
    /// Eigenvalues of the rate matrix
    eigenvalues: Vector4<f64>,
    /// Stationary state frequencies
    stationary_frequencies: Vector4<f64>,
}

impl SubstitutionModel {
    /// Assemble a model from a precomputed eigensystem
    pub fn from_eigensystem(
        eigenvectors: Matrix4<f64>,
        inverse_eigenvectors: Matrix4<f64>,
        eigenvalues: Vector4<f64>,
        stationary_frequencies: Vector4<f64>,
    ) -> Result<Self> {
        let frequency_sum: f64 = stationary_frequencies.iter().sum();
        if (frequency_sum - 1.0).abs() > 1e-10 {
            return Err(SubitoError::invalid_data(format!(
                "stationary frequencies sum to {frequency_sum}, not 1"
            )));
        }
        Ok(Self {
            eigenvectors,
            inverse_eigenvectors,
            eigenvalues,
            stationary_frequencies,
        })
    }

    /// The Jukes-Cantor model: uniform frequencies, all exchange rates
    /// equal, scaled to one expected substitution per unit branch length.
    pub fn jc69() -> Self {
        let eigenvectors = Matrix4::new(
            1.0, 2.0, 0.0, 0.5, //
            1.0, -2.0, 0.5, 0.0, //
            1.0, 2.0, 0.0, -0.5, //
            1.0, -2.0, -0.5, 0.0,
        );
        let inverse_eigenvectors = Matrix4::new(
            0.25, 0.25, 0.25, 0.25, //
            0.125, -0.125, 0.125, -0.125, //
            0.0, 1.0, 0.0, -1.0, //
            1.0, 0.0, -1.0, 0.0,
        );
        let eigenvalues = Vector4::new(0.0, -4.0 / 3.0, -4.0 / 3.0, -4.0 / 3.0);
        let stationary_frequencies = Vector4::new(0.25, 0.25, 0.25, 0.25);
        Self {
            eigenvectors,
            inverse_eigenvectors,
            eigenvalues,
            stationary_frequencies,
        }
    }

    pub fn state_count(&self) -> usize {
        4
    }

    pub fn eigenvectors(&self) -> &Matrix4<f64> {
        &self.eigenvectors
    }

    pub fn inverse_eigenvectors(&self) -> &Matrix4<f64> {
        &self.inverse_eigenvectors
    }

    pub fn eigenvalues(&self) -> &Vector4<f64> {
        &self.eigenvalues
    }

    pub fn stationary_frequencies(&self) -> &Vector4<f64> {
        &self.stationary_frequencies
    }

    /// `P(t) = V · diag(exp(t·λ)) · V⁻¹`
    pub fn transition_matrix(&self, branch_length: f64) -> Matrix4<f64> {
        let diagonal =
            Matrix4::from_diagonal(&self.eigenvalues.map(|lambda| (branch_length * lambda).exp()));
        self.eigenvectors * diagonal * self.inverse_eigenvectors
    }

    /// `dP/dt = V · diag(λ·exp(t·λ)) · V⁻¹`
    pub fn derivative_matrix(&self, branch_length: f64) -> Matrix4<f64> {
        let diagonal = Matrix4::from_diagonal(
            &self
                .eigenvalues
                .map(|lambda| lambda * (branch_length * lambda).exp()),
        );
        self.eigenvectors * diagonal * self.inverse_eigenvectors
    }
}

/// Across-site rate heterogeneity; only the constant-rate single category is
/// exercised by the core.
#[derive(Clone, Debug)]
pub struct SiteModel {
    category_proportions: Vec<f64>,
    category_rates: Vec<f64>,
}

impl SiteModel {
    /// The constant-rate site model: one category at rate one
    pub fn constant() -> Self {
        Self {
            category_proportions: vec![1.0],
            category_rates: vec![1.0],
        }
    }

    pub fn new(category_proportions: Vec<f64>, category_rates: Vec<f64>) -> Result<Self> {
        if category_proportions.len() != 1 || category_rates.len() != 1 {
            return Err(SubitoError::invalid_data(
                "only the single-category constant-rate site model is supported",
            ));
        }
        Ok(Self {
            category_proportions,
            category_rates,
        })
    }

    pub fn category_proportions(&self) -> &[f64] {
        &self.category_proportions
    }

    pub fn category_rates(&self) -> &[f64] {
        &self.category_rates
    }

    /// The single category rate
    pub fn rate(&self) -> f64 {
        self.category_rates[0]
    }
}

/// Per-branch rate multiplier; the strict clock with rate one suffices for
/// the core.
#[derive(Clone, Copy, Debug)]
pub struct ClockModel {
    rate: f64,
}

impl ClockModel {
    pub fn strict(rate: f64) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Default for ClockModel {
    fn default() -> Self {
        Self::strict(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jc69_transition_matrix_closed_form() {
        let model = SubstitutionModel::jc69();
        for &t in &[0.0, 0.05, 0.3, 2.0] {
            let p = model.transition_matrix(t);
            let e = (-4.0 * t / 3.0).exp();
            let same = 0.25 + 0.75 * e;
            let diff = 0.25 - 0.25 * e;
            for row in 0..4 {
                for col in 0..4 {
                    let expected = if row == col { same } else { diff };
                    assert!(
                        (p[(row, col)] - expected).abs() < 1e-12,
                        "P[{row}][{col}] = {} at t = {t}",
                        p[(row, col)]
                    );
                }
            }
            // Rows are probability distributions.
            for row in 0..4 {
                let row_sum: f64 = (0..4).map(|col| p[(row, col)]).sum();
                assert!((row_sum - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_jc69_derivative_matches_finite_difference() {
        let model = SubstitutionModel::jc69();
        let t = 0.2;
        let h = 1e-7;
        let d = model.derivative_matrix(t);
        let finite = (model.transition_matrix(t + h) - model.transition_matrix(t - h)) / (2.0 * h);
        for row in 0..4 {
            for col in 0..4 {
                assert!((d[(row, col)] - finite[(row, col)]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_eigensystem_validation() {
        let jc = SubstitutionModel::jc69();
        assert!(SubstitutionModel::from_eigensystem(
            *jc.eigenvectors(),
            *jc.inverse_eigenvectors(),
            *jc.eigenvalues(),
            Vector4::new(0.5, 0.5, 0.5, 0.5),
        )
        .is_err());
    }

    #[test]
    fn test_site_model_is_single_category_only() {
        assert!(SiteModel::new(vec![1.0], vec![1.0]).is_ok());
        assert!(SiteModel::new(vec![0.5, 0.5], vec![0.5, 1.5]).is_err());
        assert_eq!(SiteModel::constant().rate(), 1.0);
    }
}
