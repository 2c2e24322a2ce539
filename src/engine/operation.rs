//! # Operation Stream
//!
//! The closed set of tagged operations the scheduler emits and the engine
//! executes. Operations address PLV slots and parameter slots by plain
//! integers; the arena maps slot indices to matrix views. A single `match`
//! in the engine dispatches on the tag.

use std::fmt;

/// The six PLV views kept per DAG node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlvKind {
    /// Combined leafward-looking PLV: `p = p_hat_left ⊙ p_hat_right`
    P,
    /// Accumulator over left-side children
    PHatLeft,
    /// Accumulator over right-side children
    PHatRight,
    /// Accumulator over rootward parents (stationary at rootsplits)
    RHat,
    /// Message to left-side children: `r_hat ⊙ p_hat_right`
    RLeft,
    /// Message to right-side children: `r_hat ⊙ p_hat_left`
    RRight,
}

impl PlvKind {
    pub const COUNT: usize = 6;

    /// Stride index of this kind in the arena layout
    pub fn stride(self) -> usize {
        match self {
            PlvKind::P => 0,
            PlvKind::PHatLeft => 1,
            PlvKind::PHatRight => 2,
            PlvKind::RHat => 3,
            PlvKind::RLeft => 4,
            PlvKind::RRight => 5,
        }
    }
}

/// Arena slot of a (kind, node) pair: `kind · node_count + node_id`
#[inline]
pub fn plv_index(kind: PlvKind, node_count: usize, node_id: usize) -> usize {
    kind.stride() * node_count + node_id
}

/// The kind stored at an arena slot index
#[inline]
pub fn plv_kind_of_index(index: usize, node_count: usize) -> PlvKind {
    match index / node_count {
        0 => PlvKind::P,
        1 => PlvKind::PHatLeft,
        2 => PlvKind::PHatRight,
        3 => PlvKind::RHat,
        4 => PlvKind::RLeft,
        _ => PlvKind::RRight,
    }
}

/// One record of the operation stream
#[derive(Clone, Debug, PartialEq)]
pub enum GpOperation {
    /// Zero the PLV at `dest` and clear its rescaling counter
    Zero { dest: usize },
    /// Replicate the stationary distribution across all site patterns
    SetToStationary { dest: usize },
    /// `dest = src1 ⊙ src2`; rescaling counters add, rescale if needed
    Multiply {
        dest: usize,
        src1: usize,
        src2: usize,
    },
    /// `dest += q[gpcsp] · P(branch_lengths[gpcsp]) · src`, with a
    /// rescaling-factor correction; transposed transition when `dest` is an
    /// `RHat` slot
    IncrementWithWeightedEvolvedPlv {
        dest: usize,
        gpcsp: usize,
        src: usize,
    },
    /// Store the edge's prior-weighted log-likelihood at
    /// `log_likelihoods[dest]`
    Likelihood {
        dest: usize,
        parent: usize,
        child: usize,
    },
    /// Run 1-D optimization of `branch_lengths[gpcsp]`
    OptimizeBranchLength {
        gpcsp: usize,
        parent: usize,
        child: usize,
    },
    /// Normalize `log_likelihoods[start..stop]` into probabilities in `q`;
    /// a single-element range forces `q = 1`
    UpdateSbnProbabilities { start: usize, stop: usize },
    /// Fold one rootsplit's contribution into the running log-marginal
    IncrementMarginalLikelihood {
        stationary: usize,
        rootsplit: usize,
        p: usize,
    },
    /// Zero `dest` and set its rescaling counter to the minimum of the
    /// sources', preparing it for accumulation
    PrepForMarginalization { dest: usize, srcs: Vec<usize> },
}

impl fmt::Display for GpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpOperation::Zero { dest } => write!(f, "Zero({dest})"),
            GpOperation::SetToStationary { dest } => write!(f, "SetToStationary({dest})"),
            GpOperation::Multiply { dest, src1, src2 } => {
                write!(f, "Multiply({dest} = {src1} ⊙ {src2})")
            }
            GpOperation::IncrementWithWeightedEvolvedPlv { dest, gpcsp, src } => {
                write!(f, "Increment({dest} += q[{gpcsp}]·P·{src})")
            }
            GpOperation::Likelihood {
                dest,
                parent,
                child,
            } => write!(f, "Likelihood(ll[{dest}] from {parent} × {child})"),
            GpOperation::OptimizeBranchLength {
                gpcsp,
                parent,
                child,
            } => write!(f, "OptimizeBranchLength(bl[{gpcsp}] on {parent} × {child})"),
            GpOperation::UpdateSbnProbabilities { start, stop } => {
                write!(f, "UpdateSbnProbabilities([{start}, {stop}))")
            }
            GpOperation::IncrementMarginalLikelihood {
                stationary,
                rootsplit,
                p,
            } => write!(
                f,
                "IncrementMarginalLikelihood(rootsplit {rootsplit}, {stationary} × {p})"
            ),
            GpOperation::PrepForMarginalization { dest, srcs } => {
                write!(f, "PrepForMarginalization({dest} <- min of {srcs:?})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plv_index_round_trip() {
        let node_count = 11;
        for kind in [
            PlvKind::P,
            PlvKind::PHatLeft,
            PlvKind::PHatRight,
            PlvKind::RHat,
            PlvKind::RLeft,
            PlvKind::RRight,
        ] {
            for node_id in [0, 3, 10] {
                let index = plv_index(kind, node_count, node_id);
                assert_eq!(plv_kind_of_index(index, node_count), kind);
                assert_eq!(index % node_count, node_id);
            }
        }
    }

    #[test]
    fn test_display_is_compact() {
        let op = GpOperation::Multiply {
            dest: 1,
            src1: 2,
            src2: 3,
        };
        assert_eq!(op.to_string(), "Multiply(1 = 2 ⊙ 3)");
    }
}
