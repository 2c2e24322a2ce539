//! Branch-length optimization against the Jukes-Cantor closed-form maximum
//! likelihood estimate on the {AA: 10, AC: 1} pattern set.

use anyhow::Result;

use subito::engine::optimize::brent_minimize;
use subito::{
    Alignment, BranchOptimizer, EngineConfig, GpPipeline, Tree, TreeCollection,
    TopologyBuilder,
};

/// Closed-form Jukes-Cantor distance for 1 mismatch in 11 sites
fn closed_form_mle() -> f64 {
    -0.75 * (1.0f64 - (4.0 / 3.0) * (1.0 / 11.0)).ln()
}

/// Negative log-likelihood of the pattern set as a function of the tip-to-tip
/// path length
fn negative_log_likelihood(t: f64) -> f64 {
    let decay = (-4.0 * t / 3.0).exp();
    let p_same = 0.25 + 0.75 * decay;
    let p_diff = 0.25 - 0.25 * decay;
    -(10.0 * (0.25 * p_same).ln() + (0.25 * p_diff).ln())
}

#[test]
fn brent_recovers_closed_form_mle() {
    let (optimum, _) = brent_minimize(negative_log_likelihood, 1e-6, 1e4, 6, 1000);
    let expected = closed_form_mle();
    assert!(
        (optimum - expected).abs() < 1e-5,
        "Brent found {optimum}, closed form {expected}"
    );
}

fn two_taxon_pipeline(config: EngineConfig) -> Result<GpPipeline> {
    // Ten agreeing sites, one mismatch.
    let alignment = Alignment::new([
        ("a".to_string(), "AAAAAAAAAAA".to_string()),
        ("b".to_string(), "AAAAAAAAAAC".to_string()),
    ])?;
    let mut builder = TopologyBuilder::new(2);
    let a = builder.leaf(0);
    let b = builder.leaf(1);
    let root = builder.join(a, b);
    let topology = builder.finish(root)?;
    let collection = TreeCollection::new(
        vec!["a".to_string(), "b".to_string()],
        vec![Tree::with_constant_branch_length(topology, 1.0)],
    )?;
    Ok(GpPipeline::jc69(&alignment, collection, config)?)
}

#[test]
fn engine_brent_sweeps_reach_the_mle() -> Result<()> {
    let mut pipeline = two_taxon_pipeline(EngineConfig::default())?;
    pipeline.estimate_branch_lengths(3)?;
    // The likelihood depends on the two tip branch lengths only through
    // their sum, which must land on the closed-form optimum.
    let rootsplit_count = pipeline.dag().rootsplit_count();
    let total: f64 = pipeline.branch_lengths()[rootsplit_count..].iter().sum();
    let expected = closed_form_mle();
    assert!(
        (total - expected).abs() < 1e-5,
        "optimized path length {total}, closed form {expected}"
    );
    Ok(())
}

#[test]
fn gradient_ascent_agrees_with_brent() -> Result<()> {
    let mut config = EngineConfig::default();
    config.branch_optimizer = BranchOptimizer::GradientAscent;
    config.gradient_step_size = 0.01;
    config.gradient_relative_tolerance = 1e-7;
    config.max_optimizer_iterations = 20_000;
    let mut pipeline = two_taxon_pipeline(config)?;
    pipeline.estimate_branch_lengths(4)?;
    let rootsplit_count = pipeline.dag().rootsplit_count();
    let total: f64 = pipeline.branch_lengths()[rootsplit_count..].iter().sum();
    let expected = closed_form_mle();
    assert!(
        (total - expected).abs() < 1e-3,
        "gradient ascent path length {total}, closed form {expected}"
    );
    Ok(())
}

#[test]
fn optimization_never_worsens_the_marginal() -> Result<()> {
    let mut pipeline = two_taxon_pipeline(EngineConfig::default())?;
    pipeline.compute_likelihoods()?;
    let before = pipeline.log_marginal_likelihood();
    pipeline.estimate_branch_lengths(2)?;
    pipeline.compute_likelihoods()?;
    let after = pipeline.log_marginal_likelihood();
    assert!(
        after >= before - 1e-10,
        "marginal dropped from {before} to {after}"
    );
    Ok(())
}
