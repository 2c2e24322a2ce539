//! # Generalized-Pruning Pipeline
//!
//! Orchestrates the full workflow over one alignment and one rooted tree
//! collection:
//! 1. Validate input shapes (alignment coverage, tree/taxon agreement)
//! 2. Compress the alignment into site patterns
//! 3. Build the subsplit DAG and its indexer
//! 4. Assemble the engine; seed uniform SBN parameters and hot-start branch
//!    lengths from the observed trees
//! 5. Run scheduled phases: PLV population, likelihood evaluation,
//!    branch-length optimization, SBN-parameter optimization
//! 6. Train counting-based SBN parameters (simple average / EM) and score
//!    topologies
//!
//! All numeric work happens by emitting operation streams from the DAG
//! scheduler and handing them to the engine in order.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::dag::subsplit_dag::SubsplitDag;
use crate::data::alignment::Alignment;
use crate::data::site_pattern::SitePattern;
use crate::data::tree::TreeCollection;
use crate::engine::gp_engine::GpEngine;
use crate::engine::substitution::{ClockModel, SiteModel, SubstitutionModel};
use crate::error::{Result, SubitoError};
use crate::sbn::probability::{
    self, data_log_likelihood, representation_counter_of, RepresentationCounter,
};

/// The top-level inference pipeline
pub struct GpPipeline {
    tree_collection: TreeCollection,
    dag: SubsplitDag,
    engine: GpEngine,
    /// Counting-based SBN parameters over the indexer block (no leaf edges)
    sbn_parameters: Vec<f64>,
}

impl GpPipeline {
    /// Validate inputs and assemble the DAG and engine.
    pub fn new(
        alignment: &Alignment,
        tree_collection: TreeCollection,
        model: Arc<SubstitutionModel>,
        site_model: SiteModel,
        clock_model: ClockModel,
        config: EngineConfig,
    ) -> Result<Self> {
        let site_pattern = SitePattern::new(alignment, tree_collection.taxon_names())?;
        let dag = SubsplitDag::new(&tree_collection)?;
        info!(
            taxa = tree_collection.taxon_count(),
            trees = tree_collection.tree_count(),
            dag_nodes = dag.node_count(),
            parameters = dag.parameter_count(),
            patterns = site_pattern.pattern_count(),
            "assembled subsplit DAG"
        );
        let mut engine = GpEngine::new(
            site_pattern,
            dag.node_count(),
            dag.parameter_count(),
            model,
            site_model,
            clock_model,
            config,
        )?;
        engine.set_q(dag.build_uniform_q())?;
        let sbn_parameters = vec![0.0; dag.gpcsp_count()];
        let mut pipeline = Self {
            tree_collection,
            dag,
            engine,
            sbn_parameters,
        };
        pipeline.hot_start_branch_lengths()?;
        Ok(pipeline)
    }

    /// Convenience constructor with Jukes-Cantor and constant-rate models
    pub fn jc69(
        alignment: &Alignment,
        tree_collection: TreeCollection,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::new(
            alignment,
            tree_collection,
            Arc::new(SubstitutionModel::jc69()),
            SiteModel::constant(),
            ClockModel::default(),
            config,
        )
    }

    // ** Accessors

    pub fn dag(&self) -> &SubsplitDag {
        &self.dag
    }

    pub fn engine(&self) -> &GpEngine {
        &self.engine
    }

    pub fn tree_collection(&self) -> &TreeCollection {
        &self.tree_collection
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.engine.log_marginal_likelihood()
    }

    /// Branch lengths over the full parameter vector (leaf edges included)
    pub fn branch_lengths(&self) -> &[f64] {
        self.engine.branch_lengths()
    }

    /// Engine SBN probabilities over the full parameter vector
    pub fn gp_q(&self) -> &[f64] {
        self.engine.q()
    }

    /// Per-edge log-likelihoods over the full parameter vector
    pub fn log_likelihoods(&self) -> &[f64] {
        self.engine.log_likelihoods()
    }

    /// Counting-based SBN parameters in the indexer's layout
    pub fn sbn_parameters(&self) -> &[f64] {
        &self.sbn_parameters
    }

    // ** Branch-length seeding

    /// Seed each parameter slot with the mean branch length observed for its
    /// PCSP across the collection; slots never observed stay at one.
    fn hot_start_branch_lengths(&mut self) -> Result<()> {
        let parameter_count = self.dag.parameter_count();
        let mut sums = vec![0.0; parameter_count];
        let mut observations = vec![0u32; parameter_count];
        for tree in self.tree_collection.trees() {
            for edge in tree.topology().rooted_edges() {
                let pcsp = edge.pcsp();
                let index = self.dag.pcsp_parameter_index(&pcsp).ok_or_else(|| {
                    SubitoError::indexer_lookup(pcsp.pcsp_string())
                })?;
                sums[index] += tree.branch_length(edge.child_id);
                observations[index] += 1;
            }
        }
        for (index, (&total, &count)) in sums.iter().zip(&observations).enumerate() {
            if count > 0 {
                self.engine
                    .set_branch_length(index, total / f64::from(count));
            }
        }
        Ok(())
    }

    // ** Scheduled phases

    /// Reset the running marginal and refresh every PLV with a rootward then
    /// a leafward pass.
    pub fn reset_marginal_and_populate_plvs(&mut self) -> Result<()> {
        self.engine.reset_log_marginal_likelihood();
        let rootward = self.dag.rootward_pass_ops()?;
        let leafward = self.dag.leafward_pass_ops()?;
        self.engine.process_operations(&rootward)?;
        self.engine.process_operations(&leafward)
    }

    /// Populate PLVs, then evaluate per-edge log-likelihoods and the
    /// marginal log-likelihood.
    #[instrument(skip(self))]
    pub fn compute_likelihoods(&mut self) -> Result<()> {
        self.reset_marginal_and_populate_plvs()?;
        let ops = self.dag.likelihood_ops()?;
        self.engine.process_operations(&ops)
    }

    /// Run the depth-first branch-length optimization schedule for a fixed
    /// number of sweeps.
    #[instrument(skip(self))]
    pub fn estimate_branch_lengths(&mut self, sweeps: usize) -> Result<()> {
        self.reset_marginal_and_populate_plvs()?;
        let ops = self.dag.branch_length_optimization_ops()?;
        for sweep in 0..sweeps {
            self.engine.process_operations(&ops)?;
            info!(sweep, "branch-length optimization sweep complete");
        }
        Ok(())
    }

    /// Update the engine's SBN probabilities from per-edge likelihoods,
    /// then re-evaluate the marginal likelihood under the updated rootsplit
    /// probabilities.
    #[instrument(skip(self))]
    pub fn estimate_sbn_parameters(&mut self) -> Result<()> {
        self.reset_marginal_and_populate_plvs()?;
        let ops = self.dag.sbn_parameter_optimization_ops()?;
        self.engine.process_operations(&ops)?;
        // Terminal marginal evaluation, consistent with the new q.
        self.engine.reset_log_marginal_likelihood();
        let marginal_ops = self.dag.marginal_likelihood_ops();
        self.engine.process_operations(&marginal_ops)
    }

    // ** Counting-based SBN training

    fn representation_counter(&self) -> RepresentationCounter {
        representation_counter_of(
            self.dag.indexer(),
            &self.tree_collection.topology_counter(),
        )
    }

    /// Simple-average SBN parameters from the observed trees
    pub fn train_simple_average(&mut self) {
        let counter = self.representation_counter();
        probability::simple_average(&mut self.sbn_parameters, &counter, self.dag.indexer());
    }

    /// EM over latent rootings; returns the per-iteration data
    /// log-likelihood trace.
    #[instrument(skip(self))]
    pub fn train_expectation_maximization(
        &mut self,
        alpha: f64,
        iteration_count: usize,
    ) -> Result<Vec<f64>> {
        let counter = self.representation_counter();
        probability::expectation_maximization(
            &mut self.sbn_parameters,
            &counter,
            self.dag.indexer(),
            alpha,
            iteration_count,
        )
    }

    /// Probability of each distinct observed topology under the trained
    /// counting-based parameters, in counter order.
    pub fn topology_probabilities(&self) -> Vec<f64> {
        self.representation_counter()
            .iter()
            .map(|(rootings, _)| probability::probability_of(&self.sbn_parameters, rootings))
            .collect()
    }

    /// Weighted data log-likelihood of the observed topologies under the
    /// trained counting-based parameters
    pub fn topology_data_log_likelihood(&self) -> f64 {
        data_log_likelihood(&self.sbn_parameters, &self.representation_counter())
    }
}
