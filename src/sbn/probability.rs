//! # SBN Probability Estimation
//!
//! Training of the SBN parameter vector `q` from a sample of rooted trees,
//! and evaluation of per-topology probabilities.
//!
//! The parameter vector is laid out as the indexer defines it: first the
//! rootsplit probabilities, then the conditional child probabilities of each
//! parent range. The simple-average estimator counts the events of each tree
//! as given; expectation-maximization treats the rooting as latent,
//! reweighting every rooting of each topology by its probability under the
//! current parameters.
//!
//! All per-topology products run in log space; a parameter at or below zero
//! contributes negative infinity, never NaN.

use crate::error::{Result, SubitoError};
use crate::sbn::indexer::{RootedRepresentation, SbnIndexer, OUT_OF_SUPPORT};
use crate::utils::numeric::{log_add, log_or_neg_inf};

/// Per-topology rooting representations with multiplicities
pub type RepresentationCounter = Vec<(Vec<RootedRepresentation>, f64)>;

/// Build the representation counter for a topology counter: every rooting of
/// every distinct topology, with the observed rooting first.
pub fn representation_counter_of(
    indexer: &SbnIndexer,
    topology_counter: &[(crate::data::topology::Topology, u32)],
) -> RepresentationCounter {
    topology_counter
        .iter()
        .map(|(topology, count)| {
            (
                indexer.representation_over_rootings(topology),
                f64::from(*count),
            )
        })
        .collect()
}

/// Increment every in-support entry of one rooting representation
fn increment_by(counts: &mut [f64], representation: &RootedRepresentation, value: f64) {
    for &index in representation {
        if index != OUT_OF_SUPPORT {
            counts[index] += value;
        }
    }
}

/// Normalize the rootsplit block and every parent range of `q` in place.
/// A range summing to zero is left untouched (its mass is genuinely zero).
pub fn probability_normalize_params(q: &mut [f64], indexer: &SbnIndexer) {
    normalize_range(q, 0, indexer.rootsplit_count());
    for (_, (start, stop)) in indexer.parent_ranges() {
        normalize_range(q, start, stop);
    }
}

fn normalize_range(q: &mut [f64], start: usize, stop: usize) {
    let total: f64 = q[start..stop].iter().sum();
    if total > 0.0 {
        for value in q[start..stop].iter_mut() {
            *value /= total;
        }
    }
}

/// Accumulate observed-rooting event counts into `counts`
fn accumulate_counts(counts: &mut [f64], counter: &RepresentationCounter) {
    counts.iter_mut().for_each(|c| *c = 0.0);
    for (rootings, weight) in counter {
        // The tree as given is the first rooting.
        increment_by(counts, &rootings[0], *weight);
    }
}

/// Simple-average estimator: normalized observed event counts
pub fn simple_average(q: &mut [f64], counter: &RepresentationCounter, indexer: &SbnIndexer) {
    accumulate_counts(q, counter);
    probability_normalize_params(q, indexer);
}

/// Log-probability of one rooting under `log_q`
fn log_rooting_probability(log_q: &[f64], representation: &RootedRepresentation) -> f64 {
    let mut total = 0.0;
    for &index in representation {
        if index == OUT_OF_SUPPORT {
            return f64::NEG_INFINITY;
        }
        total += log_q[index];
    }
    total
}

/// Log-probability of a topology: log-sum over its rootings
pub fn log_probability_of(log_q: &[f64], rootings: &[RootedRepresentation]) -> f64 {
    rootings.iter().fold(f64::NEG_INFINITY, |acc, rooting| {
        log_add(acc, log_rooting_probability(log_q, rooting))
    })
}

/// Probability of a topology as a sum over its rootings of the product of
/// its SBN parameters
pub fn probability_of(q: &[f64], rootings: &[RootedRepresentation]) -> f64 {
    log_probability_of(&log_of(q), rootings).exp()
}

fn log_of(q: &[f64]) -> Vec<f64> {
    q.iter().map(|&value| log_or_neg_inf(value)).collect()
}

/// Total weighted data log-likelihood of the counter under `q`
pub fn data_log_likelihood(q: &[f64], counter: &RepresentationCounter) -> f64 {
    let log_q = log_of(q);
    counter
        .iter()
        .map(|(rootings, weight)| weight * log_probability_of(&log_q, rootings))
        .sum()
}

/// Expectation-maximization over latent rootings.
///
/// Initializes `q` from the simple average, then runs exactly
/// `iteration_count` iterations of: posterior rooting weights per topology,
/// weighted count accumulation into `m_bar`, smoothing with
/// `alpha · m_tilde`, and per-range normalization. Returns the data
/// log-likelihood after each iteration; there is no convergence early-exit.
pub fn expectation_maximization(
    q: &mut [f64],
    counter: &RepresentationCounter,
    indexer: &SbnIndexer,
    alpha: f64,
    iteration_count: usize,
) -> Result<Vec<f64>> {
    if counter.is_empty() {
        return Err(SubitoError::invalid_data(
            "empty representation counter for EM",
        ));
    }
    // m_tilde: raw observed counts; its normalization is the SA estimate,
    // which is the starting point.
    let mut m_tilde = vec![0.0; q.len()];
    accumulate_counts(&mut m_tilde, counter);
    q.copy_from_slice(&m_tilde);
    probability_normalize_params(q, indexer);

    let mut m_bar = vec![0.0; q.len()];
    let mut scores = Vec::with_capacity(iteration_count);
    for _ in 0..iteration_count {
        m_bar.iter_mut().for_each(|c| *c = 0.0);
        let log_q = log_of(q);
        for (rootings, weight) in counter {
            // Posterior distribution over the rootings of this topology.
            let log_weights: Vec<f64> = rootings
                .iter()
                .map(|rooting| log_rooting_probability(&log_q, rooting))
                .collect();
            let log_total = log_weights
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, log_add);
            if log_total == f64::NEG_INFINITY {
                // Every rooting has zero mass; nothing to attribute.
                continue;
            }
            for (rooting, &log_weight) in rootings.iter().zip(&log_weights) {
                let posterior = (log_weight - log_total).exp();
                if posterior > 0.0 {
                    increment_by(&mut m_bar, rooting, weight * posterior);
                }
            }
        }
        for (target, (&bar, &tilde)) in q.iter_mut().zip(m_bar.iter().zip(&m_tilde)) {
            *target = bar + alpha * tilde;
        }
        probability_normalize_params(q, indexer);
        scores.push(data_log_likelihood(q, counter));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::topology::{ladder_topology, Topology, TopologyBuilder};

    fn five_taxon_counter() -> Vec<(Topology, u32)> {
        let ladder = ladder_topology(5).unwrap();
        let mut builder = TopologyBuilder::new(5);
        let l0 = builder.leaf(0);
        let l1 = builder.leaf(1);
        let l2 = builder.leaf(2);
        let l3 = builder.leaf(3);
        let l4 = builder.leaf(4);
        let a = builder.join(l0, l1);
        let b = builder.join(l2, l3);
        let ab = builder.join(a, b);
        let root = builder.join(ab, l4);
        let balanced = builder.finish(root).unwrap();
        vec![(ladder, 2), (balanced, 1)]
    }

    #[test]
    fn test_simple_average_normalization() {
        let topology_counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&topology_counter).unwrap();
        let counter = representation_counter_of(&indexer, &topology_counter);
        let mut q = vec![0.0; indexer.gpcsp_count()];
        simple_average(&mut q, &counter, &indexer);

        let rootsplit_sum: f64 = q[..indexer.rootsplit_count()].iter().sum();
        assert!((rootsplit_sum - 1.0).abs() < 1e-12);
        for (_, (start, stop)) in indexer.parent_ranges() {
            let range_sum: f64 = q[start..stop].iter().sum();
            assert!((range_sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_em_monotone_and_at_least_simple_average() {
        let topology_counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&topology_counter).unwrap();
        let counter = representation_counter_of(&indexer, &topology_counter);

        let mut q_sa = vec![0.0; indexer.gpcsp_count()];
        simple_average(&mut q_sa, &counter, &indexer);
        let sa_score = data_log_likelihood(&q_sa, &counter);

        let mut q_em = vec![0.0; indexer.gpcsp_count()];
        let scores =
            expectation_maximization(&mut q_em, &counter, &indexer, 0.0, 10).unwrap();
        assert_eq!(scores.len(), 10);
        for pair in scores.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-10, "EM score decreased: {pair:?}");
        }
        assert!(scores[scores.len() - 1] >= sa_score - 1e-10);

        // Normalization invariants survive EM.
        let rootsplit_sum: f64 = q_em[..indexer.rootsplit_count()].iter().sum();
        assert!((rootsplit_sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_probability_of_observed_trees_positive() {
        let topology_counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&topology_counter).unwrap();
        let counter = representation_counter_of(&indexer, &topology_counter);
        let mut q = vec![0.0; indexer.gpcsp_count()];
        simple_average(&mut q, &counter, &indexer);
        for (rootings, _) in &counter {
            let p = probability_of(&q, rootings);
            assert!(p > 0.0 && p <= 1.0);
        }
    }

    #[test]
    fn test_zero_parameters_never_nan() {
        let topology_counter = five_taxon_counter();
        let indexer = SbnIndexer::new(&topology_counter).unwrap();
        let counter = representation_counter_of(&indexer, &topology_counter);
        let q = vec![0.0; indexer.gpcsp_count()];
        let p = probability_of(&q, &counter[0].0);
        assert_eq!(p, 0.0);
        assert!(!data_log_likelihood(&q, &counter).is_nan());
    }
}
