//! # Generalized-Pruning Engine
//!
//! Executes operation streams against the PLV arena: stationary
//! initialization, Hadamard products with rescaling, weighted evolved
//! accumulation, per-pattern log-likelihoods, SBN-probability updates,
//! log-sum-exp marginal accumulation and 1-D branch-length optimization.
//!
//! The engine owns per-call scratch (the transition and derivative matrices
//! and the per-pattern buffers); they are write-only caches between
//! operations and carry no state across them.

use std::sync::Arc;

use aligned_vec::{AVec, ConstAlign};
use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;

use crate::config::{BranchOptimizer, EngineConfig};
use crate::data::alignment::{GAP_SYMBOL, STATE_COUNT};
use crate::data::site_pattern::SitePattern;
use crate::engine::arena::PlvArena;
use crate::engine::operation::{plv_index, plv_kind_of_index, GpOperation, PlvKind};
use crate::engine::optimize::{brent_minimize, gradient_ascent};
use crate::engine::substitution::{ClockModel, SiteModel, SubstitutionModel};
use crate::error::{Result, SubitoError};
use crate::utils::numeric::{log_add, log_or_neg_inf, log_sum};

/// Cache-line aligned scratch buffer for per-pattern values
type AlignedBuffer = AVec<f64, ConstAlign<64>>;

fn aligned_zeros(len: usize) -> AlignedBuffer {
    let mut buffer = AlignedBuffer::with_capacity(64, len);
    for _ in 0..len {
        buffer.push(0.0);
    }
    buffer
}

/// Load one pattern's column of a row-major PLV slot
#[inline]
fn column(slot: &[f64], pattern_count: usize, pattern: usize) -> Vector4<f64> {
    Vector4::new(
        slot[pattern],
        slot[pattern_count + pattern],
        slot[2 * pattern_count + pattern],
        slot[3 * pattern_count + pattern],
    )
}

/// The operation-stream executor
pub struct GpEngine {
    site_pattern: SitePattern,
    config: EngineConfig,
    model: Arc<SubstitutionModel>,
    site_model: SiteModel,
    clock_model: ClockModel,
    node_count: usize,
    arena: PlvArena,
    branch_lengths: Vec<f64>,
    log_likelihoods: Vec<f64>,
    q: Vec<f64>,
    site_pattern_weights: Vec<f64>,
    log_marginal_likelihood: f64,
    // Per-call scratch; write-only caches across operations.
    transition_matrix: Matrix4<f64>,
    derivative_matrix: Matrix4<f64>,
    per_pattern_log_likelihoods: AlignedBuffer,
    per_pattern_likelihoods: AlignedBuffer,
    per_pattern_derivatives: AlignedBuffer,
}

impl GpEngine {
    /// Build an engine over `6 · node_count` PLV slots and `parameter_count`
    /// branch-length / probability / log-likelihood slots, with tip PLVs
    /// populated from the site pattern.
    pub fn new(
        site_pattern: SitePattern,
        node_count: usize,
        parameter_count: usize,
        model: Arc<SubstitutionModel>,
        site_model: SiteModel,
        clock_model: ClockModel,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pattern_count = site_pattern.pattern_count();
        if pattern_count == 0 {
            return Err(SubitoError::invalid_data("zero pattern count"));
        }
        if node_count < site_pattern.taxon_count() {
            return Err(SubitoError::invalid_data(
                "fewer DAG nodes than taxa",
            ));
        }
        let arena = PlvArena::new(
            PlvKind::COUNT * node_count,
            pattern_count,
            config.rescaling_threshold,
            config.mmap_path.as_deref(),
        )?;
        let mut engine = Self {
            site_pattern_weights: site_pattern.weights().to_vec(),
            site_pattern,
            config,
            model,
            site_model,
            clock_model,
            node_count,
            arena,
            branch_lengths: vec![1.0; parameter_count],
            log_likelihoods: vec![0.0; parameter_count],
            q: vec![1.0; parameter_count],
            log_marginal_likelihood: f64::NEG_INFINITY,
            transition_matrix: Matrix4::zeros(),
            derivative_matrix: Matrix4::zeros(),
            per_pattern_log_likelihoods: aligned_zeros(pattern_count),
            per_pattern_likelihoods: aligned_zeros(pattern_count),
            per_pattern_derivatives: aligned_zeros(pattern_count),
        };
        engine.initialize_tip_plvs();
        Ok(engine)
    }

    /// Write the tip partial likelihoods: a one-hot column per observed
    /// symbol, an all-ones column for a gap.
    fn initialize_tip_plvs(&mut self) {
        let pattern_count = self.arena.pattern_count();
        for taxon in 0..self.site_pattern.taxon_count() {
            let row = self.site_pattern.row(taxon).to_vec();
            let slot = self
                .arena
                .slot_mut(plv_index(PlvKind::P, self.node_count, taxon));
            for (pattern, &symbol) in row.iter().enumerate() {
                if symbol == GAP_SYMBOL {
                    for state in 0..STATE_COUNT {
                        slot[state * pattern_count + pattern] = 1.0;
                    }
                } else {
                    slot[usize::from(symbol) * pattern_count + pattern] = 1.0;
                }
            }
        }
    }

    // ** Accessors

    pub fn site_pattern(&self) -> &SitePattern {
        &self.site_pattern
    }

    pub fn arena(&self) -> &PlvArena {
        &self.arena
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn branch_lengths(&self) -> &[f64] {
        &self.branch_lengths
    }

    pub fn set_branch_length(&mut self, gpcsp: usize, length: f64) {
        self.branch_lengths[gpcsp] = length;
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    pub fn set_q(&mut self, q: Vec<f64>) -> Result<()> {
        if q.len() != self.q.len() {
            return Err(SubitoError::invalid_data(format!(
                "q has {} entries, engine holds {}",
                q.len(),
                self.q.len()
            )));
        }
        self.q = q;
        Ok(())
    }

    pub fn log_likelihoods(&self) -> &[f64] {
        &self.log_likelihoods
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    pub fn reset_log_marginal_likelihood(&mut self) {
        self.log_marginal_likelihood = f64::NEG_INFINITY;
    }

    // ** Operation dispatch

    /// Execute a stream in order; the single dispatch site for the bytecode.
    pub fn process_operations(&mut self, operations: &[GpOperation]) -> Result<()> {
        for operation in operations {
            self.apply(operation)?;
        }
        Ok(())
    }

    fn apply(&mut self, operation: &GpOperation) -> Result<()> {
        match *operation {
            GpOperation::Zero { dest } => {
                self.arena.zero_slot(dest);
                Ok(())
            }
            GpOperation::SetToStationary { dest } => self.set_to_stationary(dest),
            GpOperation::Multiply { dest, src1, src2 } => self.multiply(dest, src1, src2),
            GpOperation::IncrementWithWeightedEvolvedPlv { dest, gpcsp, src } => {
                self.increment_with_weighted_evolved_plv(dest, gpcsp, src)
            }
            GpOperation::Likelihood {
                dest,
                parent,
                child,
            } => self.likelihood(dest, parent, child),
            GpOperation::OptimizeBranchLength {
                gpcsp,
                parent,
                child,
            } => match self.config.branch_optimizer {
                BranchOptimizer::Brent => self.brent_optimization(gpcsp, parent, child),
                BranchOptimizer::GradientAscent => {
                    self.gradient_ascent_optimization(gpcsp, parent, child)
                }
            },
            GpOperation::UpdateSbnProbabilities { start, stop } => {
                self.update_sbn_probabilities(start, stop)
            }
            GpOperation::IncrementMarginalLikelihood {
                stationary,
                rootsplit,
                p,
            } => self.increment_marginal_likelihood(stationary, rootsplit, p),
            GpOperation::PrepForMarginalization { dest, ref srcs } => {
                self.prep_for_marginalization(dest, srcs)
            }
        }
    }

    fn set_to_stationary(&mut self, dest: usize) -> Result<()> {
        let pattern_count = self.arena.pattern_count();
        let frequencies = *self.model.stationary_frequencies();
        let slot = self.arena.slot_mut(dest);
        for state in 0..STATE_COUNT {
            slot[state * pattern_count..(state + 1) * pattern_count].fill(frequencies[state]);
        }
        self.arena.set_rescaling_count(dest, 0);
        Ok(())
    }

    fn multiply(&mut self, dest: usize, src1: usize, src2: usize) -> Result<()> {
        let count =
            self.arena.rescaling_count(src1) + self.arena.rescaling_count(src2);
        {
            let (dest_slice, a, b) = self.arena.slot_triple_mut(dest, src1, src2);
            for ((out, &x), &y) in dest_slice.iter_mut().zip(a).zip(b) {
                *out = x * y;
            }
        }
        self.arena.set_rescaling_count(dest, count);
        self.arena.rescale_if_needed(dest)
    }

    /// `dest += q[gpcsp] · P(ℓ) · src`, with the transition transposed for
    /// `RHat` destinations (the leafward message direction) and the stored
    /// contribution corrected when the destination is less rescaled than the
    /// source.
    fn increment_with_weighted_evolved_plv(
        &mut self,
        dest: usize,
        gpcsp: usize,
        src: usize,
    ) -> Result<()> {
        self.set_transition_matrix(self.branch_lengths[gpcsp]);
        let transition = if plv_kind_of_index(dest, self.node_count) == PlvKind::RHat {
            self.transition_matrix.transpose()
        } else {
            self.transition_matrix
        };
        let rescaling_difference =
            self.arena.rescaling_count(dest) - self.arena.rescaling_count(src);
        if rescaling_difference > 0 {
            return Err(SubitoError::numeric(
                "destination rescaled beyond source in weighted evolved increment",
            ));
        }
        // A source with the larger counter is stored amplified by
        // threshold^(c_src - c_dst) relative to the destination's scale;
        // its contribution is corrected back down by the same factor.
        let rescaling_factor = if rescaling_difference == 0 {
            1.0
        } else {
            self.arena.threshold().powi(-rescaling_difference)
        };
        let weight = self.q[gpcsp] * rescaling_factor;
        let pattern_count = self.arena.pattern_count();
        let (dest_slice, src_slice) = self.arena.slot_pair_mut(dest, src);
        for pattern in 0..pattern_count {
            let evolved = transition * column(src_slice, pattern_count, pattern);
            for state in 0..STATE_COUNT {
                dest_slice[state * pattern_count + pattern] += weight * evolved[state];
            }
        }
        Ok(())
    }

    fn likelihood(&mut self, dest: usize, parent: usize, child: usize) -> Result<()> {
        self.set_transition_matrix(self.branch_lengths[dest]);
        self.prepare_per_pattern_log_likelihoods(parent, child);
        let weighted: f64 = self
            .per_pattern_log_likelihoods
            .iter()
            .zip(&self.site_pattern_weights)
            .map(|(&ll, &w)| ll * w)
            .sum();
        self.log_likelihoods[dest] = log_or_neg_inf(self.q[dest]) + weighted;
        if self.log_likelihoods[dest].is_nan() {
            return Err(SubitoError::numeric(format!(
                "NaN log-likelihood for edge {dest}"
            )));
        }
        Ok(())
    }

    fn update_sbn_probabilities(&mut self, start: usize, stop: usize) -> Result<()> {
        if stop - start == 1 {
            self.q[start] = 1.0;
            return Ok(());
        }
        let log_norm = log_sum(&self.log_likelihoods[start..stop]);
        if !log_norm.is_finite() {
            return Err(SubitoError::numeric(format!(
                "non-finite log-sum {log_norm} normalizing q[{start}..{stop}]"
            )));
        }
        for index in start..stop {
            self.q[index] = (self.log_likelihoods[index] - log_norm).exp();
        }
        Ok(())
    }

    fn increment_marginal_likelihood(
        &mut self,
        stationary: usize,
        rootsplit: usize,
        p: usize,
    ) -> Result<()> {
        if self.arena.rescaling_count(stationary) != 0 {
            return Err(SubitoError::numeric(
                "rescaled stationary distribution in marginal-likelihood increment",
            ));
        }
        let pattern_count = self.arena.pattern_count();
        let correction = self.arena.log_rescaling_for(p);
        let stationary_slice = self.arena.slot(stationary);
        let p_slice = self.arena.slot(p);
        let scratch = &mut self.per_pattern_log_likelihoods;
        scratch
            .par_iter_mut()
            .enumerate()
            .for_each(|(pattern, out)| {
                let product = column(stationary_slice, pattern_count, pattern)
                    .dot(&column(p_slice, pattern_count, pattern));
                *out = product.ln() + correction;
            });
        let weighted: f64 = scratch
            .iter()
            .zip(&self.site_pattern_weights)
            .map(|(&ll, &w)| ll * w)
            .sum();
        self.log_likelihoods[rootsplit] = log_or_neg_inf(self.q[rootsplit]) + weighted;
        if self.log_likelihoods[rootsplit].is_nan() {
            return Err(SubitoError::numeric(
                "NaN rootsplit log-likelihood in marginal increment",
            ));
        }
        self.log_marginal_likelihood = log_add(
            self.log_marginal_likelihood,
            self.log_likelihoods[rootsplit],
        );
        Ok(())
    }

    fn prep_for_marginalization(&mut self, dest: usize, srcs: &[usize]) -> Result<()> {
        let min_count = srcs
            .iter()
            .map(|&src| self.arena.rescaling_count(src))
            .min()
            .ok_or_else(|| {
                SubitoError::numeric("empty source list in marginalization prep")
            })?;
        self.arena.zero_slot(dest);
        self.arena.set_rescaling_count(dest, min_count);
        Ok(())
    }

    // ** Transition matrices

    /// Effective substitution distance for a stored branch length
    fn effective_length(&self, branch_length: f64) -> f64 {
        branch_length * self.clock_model.rate() * self.site_model.rate()
    }

    fn set_transition_matrix(&mut self, branch_length: f64) {
        self.transition_matrix = self
            .model
            .transition_matrix(self.effective_length(branch_length));
    }

    fn set_transition_and_derivative_matrices(&mut self, branch_length: f64) {
        let length = self.effective_length(branch_length);
        self.transition_matrix = self.model.transition_matrix(length);
        self.derivative_matrix = self.model.derivative_matrix(length);
    }

    // ** Per-pattern likelihood plumbing

    /// `log((parentᵀ · P · child) diagonal)` per pattern, plus the rescaling
    /// corrections of both slots.
    fn prepare_per_pattern_log_likelihoods(&mut self, parent: usize, child: usize) {
        let pattern_count = self.arena.pattern_count();
        let transition = self.transition_matrix;
        let correction =
            self.arena.log_rescaling_for(parent) + self.arena.log_rescaling_for(child);
        let parent_slice = self.arena.slot(parent);
        let child_slice = self.arena.slot(child);
        self.per_pattern_log_likelihoods
            .par_iter_mut()
            .enumerate()
            .for_each(|(pattern, out)| {
                let evolved = transition * column(child_slice, pattern_count, pattern);
                let product = column(parent_slice, pattern_count, pattern).dot(&evolved);
                *out = product.ln() + correction;
            });
    }

    /// Unrescaled per-pattern likelihoods and their branch-length
    /// derivatives; the rescaling factors cancel in the ratio.
    fn prepare_per_pattern_derivative_ratios(&mut self, parent: usize, child: usize) {
        let pattern_count = self.arena.pattern_count();
        let transition = self.transition_matrix;
        let derivative = self.derivative_matrix;
        let parent_slice = self.arena.slot(parent);
        let child_slice = self.arena.slot(child);
        let likelihoods = &mut self.per_pattern_likelihoods;
        let derivatives = &mut self.per_pattern_derivatives;
        likelihoods
            .par_iter_mut()
            .zip(derivatives.par_iter_mut())
            .enumerate()
            .for_each(|(pattern, (likelihood, slope))| {
                let child_column = column(child_slice, pattern_count, pattern);
                let parent_column = column(parent_slice, pattern_count, pattern);
                *likelihood = parent_column.dot(&(transition * child_column));
                *slope = parent_column.dot(&(derivative * child_column));
            });
    }

    /// Prior-weighted log-likelihood of one edge at the current branch
    /// length, and its derivative with respect to that length.
    fn log_likelihood_and_derivative(
        &mut self,
        gpcsp: usize,
        parent: usize,
        child: usize,
    ) -> (f64, f64) {
        self.set_transition_and_derivative_matrices(self.branch_lengths[gpcsp]);
        self.prepare_per_pattern_log_likelihoods(parent, child);
        let log_likelihood = log_or_neg_inf(self.q[gpcsp])
            + self
                .per_pattern_log_likelihoods
                .iter()
                .zip(&self.site_pattern_weights)
                .map(|(&ll, &w)| ll * w)
                .sum::<f64>();
        self.prepare_per_pattern_derivative_ratios(parent, child);
        let derivative: f64 = self
            .per_pattern_derivatives
            .iter()
            .zip(self.per_pattern_likelihoods.iter())
            .zip(&self.site_pattern_weights)
            .map(|((&slope, &likelihood), &w)| w * slope / likelihood)
            .sum();
        (log_likelihood, derivative)
    }

    // ** Branch-length optimization

    fn negative_log_likelihood_at(
        &mut self,
        branch_length: f64,
        gpcsp: usize,
        parent: usize,
        child: usize,
    ) -> f64 {
        self.set_transition_matrix(branch_length);
        self.prepare_per_pattern_log_likelihoods(parent, child);
        -(log_or_neg_inf(self.q[gpcsp])
            + self
                .per_pattern_log_likelihoods
                .iter()
                .zip(&self.site_pattern_weights)
                .map(|(&ll, &w)| ll * w)
                .sum::<f64>())
    }

    fn brent_optimization(&mut self, gpcsp: usize, parent: usize, child: usize) -> Result<()> {
        let current_length = self.branch_lengths[gpcsp];
        let current_value =
            self.negative_log_likelihood_at(current_length, gpcsp, parent, child);
        let (minimum, maximum) = (
            self.config.branch_length_min,
            self.config.branch_length_max,
        );
        let (significant_digits, max_iterations) = (
            self.config.significant_digits,
            self.config.max_optimizer_iterations,
        );
        let (optimum, optimum_value) = brent_minimize(
            |length| self.negative_log_likelihood_at(length, gpcsp, parent, child),
            minimum,
            maximum,
            significant_digits,
            max_iterations,
        );
        if !(minimum..=maximum).contains(&optimum) {
            return Err(SubitoError::numeric(format!(
                "optimizer returned branch length {optimum} outside [{minimum}, {maximum}]"
            )));
        }
        // Numerical optimization can come back strictly worse near a
        // plateau; keep the starting value in that case.
        if optimum_value > current_value {
            self.branch_lengths[gpcsp] = current_length;
        } else {
            self.branch_lengths[gpcsp] = optimum;
        }
        Ok(())
    }

    fn gradient_ascent_optimization(
        &mut self,
        gpcsp: usize,
        parent: usize,
        child: usize,
    ) -> Result<()> {
        let (minimum, maximum) = (
            self.config.branch_length_min,
            self.config.branch_length_max,
        );
        let (tolerance, step_size, max_iterations) = (
            self.config.gradient_relative_tolerance,
            self.config.gradient_step_size,
            self.config.max_optimizer_iterations,
        );
        let start = self.branch_lengths[gpcsp];
        let (optimum, _) = gradient_ascent(
            |length| {
                self.branch_lengths[gpcsp] = length;
                self.log_likelihood_and_derivative(gpcsp, parent, child)
            },
            start,
            tolerance,
            step_size,
            minimum,
            maximum,
            max_iterations,
        );
        if !(minimum..=maximum).contains(&optimum) {
            return Err(SubitoError::numeric(format!(
                "optimizer returned branch length {optimum} outside [{minimum}, {maximum}]"
            )));
        }
        self.branch_lengths[gpcsp] = optimum;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::alignment::Alignment;

    fn engine_over(pairs: &[(&str, &str)], node_count: usize, parameter_count: usize) -> GpEngine {
        let alignment = Alignment::new(
            pairs
                .iter()
                .map(|(taxon, sequence)| (taxon.to_string(), sequence.to_string())),
        )
        .unwrap();
        let taxon_names: Vec<String> = pairs.iter().map(|(taxon, _)| taxon.to_string()).collect();
        let site_pattern = SitePattern::new(&alignment, &taxon_names).unwrap();
        GpEngine::new(
            site_pattern,
            node_count,
            parameter_count,
            Arc::new(SubstitutionModel::jc69()),
            SiteModel::constant(),
            ClockModel::default(),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_tip_initialization_and_gap() {
        let engine = engine_over(&[("a", "AC-"), ("b", "GGT")], 3, 2);
        let pattern_count = engine.site_pattern().pattern_count();
        assert_eq!(pattern_count, 3);
        let tip_a = engine.arena().slot(plv_index(PlvKind::P, 3, 0));
        // Pattern order is first occurrence: A, C, gap.
        assert_eq!(tip_a[0], 1.0); // state A, pattern 0
        assert_eq!(tip_a[pattern_count + 1], 1.0); // state C, pattern 1
        for state in 0..STATE_COUNT {
            assert_eq!(tip_a[state * pattern_count + 2], 1.0, "gap column is ones");
        }
        let column_sum: f64 = (0..STATE_COUNT).map(|s| tip_a[s * pattern_count]).sum();
        assert_eq!(column_sum, 1.0);
    }

    #[test]
    fn test_set_to_stationary() {
        let mut engine = engine_over(&[("a", "AC"), ("b", "GT")], 3, 2);
        let dest = plv_index(PlvKind::RHat, 3, 2);
        engine
            .process_operations(&[GpOperation::SetToStationary { dest }])
            .unwrap();
        assert!(engine.arena().slot(dest).iter().all(|&v| v == 0.25));
        assert_eq!(engine.arena().rescaling_count(dest), 0);
    }

    #[test]
    fn test_multiply_adds_rescaling_counts() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 2);
        let (s1, s2, dest) = (
            plv_index(PlvKind::PHatLeft, 3, 2),
            plv_index(PlvKind::PHatRight, 3, 2),
            plv_index(PlvKind::P, 3, 2),
        );
        // Seed the source slots with mid-range values and fake counters.
        {
            let arena = &mut engine.arena;
            arena.slot_mut(s1).fill(0.5);
            arena.set_rescaling_count(s1, 2);
            arena.slot_mut(s2).fill(0.25);
            arena.set_rescaling_count(s2, 1);
        }
        engine
            .process_operations(&[GpOperation::Multiply {
                dest,
                src1: s1,
                src2: s2,
            }])
            .unwrap();
        assert!(engine.arena().slot(dest).iter().all(|&v| v == 0.125));
        assert_eq!(engine.arena().rescaling_count(dest), 3);
    }

    #[test]
    fn test_multiply_rescales_small_products() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 2);
        let threshold = engine.config.rescaling_threshold;
        let (s1, s2, dest) = (
            plv_index(PlvKind::PHatLeft, 3, 2),
            plv_index(PlvKind::PHatRight, 3, 2),
            plv_index(PlvKind::P, 3, 2),
        );
        {
            let arena = &mut engine.arena;
            arena.slot_mut(s1).fill(threshold);
            arena.slot_mut(s2).fill(threshold);
        }
        engine
            .process_operations(&[GpOperation::Multiply {
                dest,
                src1: s1,
                src2: s2,
            }])
            .unwrap();
        assert!(engine.arena().rescaling_count(dest) > 0);
        for &stored in engine.arena().slot(dest) {
            assert!(stored >= threshold);
        }
    }

    #[test]
    fn test_increment_rejects_over_rescaled_destination() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 2);
        let dest = plv_index(PlvKind::PHatLeft, 3, 2);
        let src = plv_index(PlvKind::P, 3, 0);
        engine.arena.set_rescaling_count(dest, 1);
        let result = engine.process_operations(&[
            GpOperation::IncrementWithWeightedEvolvedPlv {
                dest,
                gpcsp: 0,
                src,
            },
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_prep_for_marginalization_takes_min_count() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 2);
        let (a, b, dest) = (
            plv_index(PlvKind::P, 3, 0),
            plv_index(PlvKind::P, 3, 1),
            plv_index(PlvKind::PHatLeft, 3, 2),
        );
        engine.arena.set_rescaling_count(a, 4);
        engine.arena.set_rescaling_count(b, 2);
        engine
            .process_operations(&[GpOperation::PrepForMarginalization {
                dest,
                srcs: vec![a, b],
            }])
            .unwrap();
        assert_eq!(engine.arena().rescaling_count(dest), 2);
        assert!(engine.arena().slot(dest).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_update_sbn_probabilities() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 4);
        engine.log_likelihoods[1] = (0.2f64).ln();
        engine.log_likelihoods[2] = (0.6f64).ln();
        engine.log_likelihoods[3] = (0.2f64).ln();
        engine
            .process_operations(&[GpOperation::UpdateSbnProbabilities { start: 1, stop: 4 }])
            .unwrap();
        let total: f64 = engine.q()[1..4].iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((engine.q()[2] - 0.6).abs() < 1e-12);
        // Singleton ranges pin to one.
        engine.q[0] = 0.3;
        engine
            .process_operations(&[GpOperation::UpdateSbnProbabilities { start: 0, stop: 1 }])
            .unwrap();
        assert_eq!(engine.q()[0], 1.0);
    }

    #[test]
    fn test_marginal_requires_unrescaled_stationary() {
        let mut engine = engine_over(&[("a", "A"), ("b", "A")], 3, 2);
        let stationary = plv_index(PlvKind::RHat, 3, 2);
        let p = plv_index(PlvKind::P, 3, 2);
        engine.arena.set_rescaling_count(stationary, 1);
        let result = engine.process_operations(&[
            GpOperation::IncrementMarginalLikelihood {
                stationary,
                rootsplit: 0,
                p,
            },
        ]);
        assert!(result.is_err());
    }
}
