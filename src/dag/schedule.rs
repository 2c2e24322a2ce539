//! # DAG Scheduler
//!
//! Translates DAG traversals into operation streams for each engine phase.
//! Every stream is a pure function of the DAG, the indexer and the phase:
//! traversal seeds, adjacency lists and parameter ranges are all stored in
//! deterministic order, so re-emitting a phase reproduces the stream
//! byte for byte.
//!
//! Naming convention for the six PLV views of a node: `p_hat` accumulators
//! gather evolved child PLVs per clade side, `p` is their product, `r_hat`
//! gathers evolved parent messages (the stationary distribution at
//! rootsplits), and `r_left`/`r_right` are the messages this node sends to
//! its left- and right-side children.

use std::collections::HashSet;

use crate::dag::node::{Direction, Side};
use crate::dag::subsplit_dag::SubsplitDag;
use crate::engine::operation::{plv_index, GpOperation, PlvKind};
use crate::error::Result;

/// Message kind a parent sends to children on the given side
fn message_kind(side: Side) -> PlvKind {
    match side {
        Side::Left => PlvKind::RLeft,
        Side::Right => PlvKind::RRight,
    }
}

/// Accumulator kind for children on the given side
fn accumulator_kind(side: Side) -> PlvKind {
    match side {
        Side::Left => PlvKind::PHatLeft,
        Side::Right => PlvKind::PHatRight,
    }
}

impl SubsplitDag {
    #[inline]
    fn plv(&self, kind: PlvKind, node_id: usize) -> usize {
        plv_index(kind, self.node_count(), node_id)
    }

    /// Rootward pass: accumulate `p_hat` per side from child `p` vectors,
    /// then combine into `p`, children before parents.
    pub fn rootward_pass_ops(&self) -> Result<Vec<GpOperation>> {
        let mut ops = Vec::new();
        for &id in self.rootward_order() {
            for side in [Side::Right, Side::Left] {
                let dest = self.plv(accumulator_kind(side), id);
                let children = self.node(id).neighbors(Direction::Leafward, side);
                let srcs: Vec<usize> = children
                    .iter()
                    .map(|&child| self.plv(PlvKind::P, child))
                    .collect();
                ops.push(GpOperation::PrepForMarginalization { dest, srcs });
                for &child in children {
                    ops.push(GpOperation::IncrementWithWeightedEvolvedPlv {
                        dest,
                        gpcsp: self.edge_parameter(id, child)?.gpcsp,
                        src: self.plv(PlvKind::P, child),
                    });
                }
            }
            ops.push(GpOperation::Multiply {
                dest: self.plv(PlvKind::P, id),
                src1: self.plv(PlvKind::PHatRight, id),
                src2: self.plv(PlvKind::PHatLeft, id),
            });
        }
        Ok(ops)
    }

    /// Leafward pass: stationary `r_hat` at the rootsplits, accumulated
    /// parent messages elsewhere, then the two outgoing messages, parents
    /// before children.
    pub fn leafward_pass_ops(&self) -> Result<Vec<GpOperation>> {
        let mut ops = Vec::new();
        for &id in self.leafward_order() {
            if self.node(id).is_rootsplit() {
                ops.push(GpOperation::SetToStationary {
                    dest: self.plv(PlvKind::RHat, id),
                });
            } else {
                self.push_r_hat_accumulation(id, true, &mut ops)?;
            }
            ops.push(GpOperation::Multiply {
                dest: self.plv(PlvKind::RRight, id),
                src1: self.plv(PlvKind::RHat, id),
                src2: self.plv(PlvKind::PHatLeft, id),
            });
            ops.push(GpOperation::Multiply {
                dest: self.plv(PlvKind::RLeft, id),
                src1: self.plv(PlvKind::RHat, id),
                src2: self.plv(PlvKind::PHatRight, id),
            });
        }
        Ok(ops)
    }

    /// `r_hat(id) += q·Pᵀ·r_side(parent)` over all rootward edges. Uses
    /// `PrepForMarginalization` in the plain passes; the interleaved
    /// optimization schedules zero instead, because parent messages are
    /// re-rescaled between accumulations.
    fn push_r_hat_accumulation(
        &self,
        id: usize,
        prep: bool,
        ops: &mut Vec<GpOperation>,
    ) -> Result<()> {
        let dest = self.plv(PlvKind::RHat, id);
        let mut increments = Vec::new();
        let mut srcs = Vec::new();
        for side in [Side::Right, Side::Left] {
            for &parent in self.node(id).neighbors(Direction::Rootward, side) {
                let src = self.plv(message_kind(side), parent);
                srcs.push(src);
                increments.push(GpOperation::IncrementWithWeightedEvolvedPlv {
                    dest,
                    gpcsp: self.edge_parameter(parent, id)?.gpcsp,
                    src,
                });
            }
        }
        if prep {
            ops.push(GpOperation::PrepForMarginalization { dest, srcs });
        } else {
            ops.push(GpOperation::Zero { dest });
        }
        ops.extend(increments);
        Ok(())
    }

    /// Depth-first branch-length optimization from every rootsplit.
    pub fn branch_length_optimization_ops(&self) -> Result<Vec<GpOperation>> {
        let mut ops = Vec::new();
        let mut visited = HashSet::new();
        for &root_id in self.rootsplit_ids() {
            self.schedule_branch_length_optimization(root_id, &mut visited, &mut ops)?;
        }
        Ok(ops)
    }

    fn schedule_branch_length_optimization(
        &self,
        id: usize,
        visited: &mut HashSet<usize>,
        ops: &mut Vec<GpOperation>,
    ) -> Result<()> {
        visited.insert(id);
        self.push_node_refresh_prefix(id, ops)?;
        if self.node(id).is_leaf() {
            return Ok(());
        }
        for side in [Side::Right, Side::Left] {
            ops.push(GpOperation::Zero {
                dest: self.plv(accumulator_kind(side), id),
            });
            let children = self.node(id).neighbors(Direction::Leafward, side).to_vec();
            for child in children {
                if !visited.contains(&child) {
                    self.schedule_branch_length_optimization(child, visited, ops)?;
                }
                let gpcsp = self.edge_parameter(id, child)?.gpcsp;
                ops.push(GpOperation::OptimizeBranchLength {
                    gpcsp,
                    parent: self.plv(message_kind(side), id),
                    child: self.plv(PlvKind::P, child),
                });
                ops.push(GpOperation::IncrementWithWeightedEvolvedPlv {
                    dest: self.plv(accumulator_kind(side), id),
                    gpcsp,
                    src: self.plv(PlvKind::P, child),
                });
            }
            self.push_opposite_message_refresh(id, side, ops);
        }
        ops.push(GpOperation::Multiply {
            dest: self.plv(PlvKind::P, id),
            src1: self.plv(PlvKind::PHatRight, id),
            src2: self.plv(PlvKind::PHatLeft, id),
        });
        Ok(())
    }

    /// Depth-first SBN-parameter optimization: likelihood evaluation per
    /// edge with per-range probability updates, a marginal-likelihood
    /// increment per rootsplit (which also produces the rootsplit
    /// log-likelihoods), and finally the rootsplit-block renormalization.
    /// The caller refreshes the marginal afterwards so it reflects the
    /// updated rootsplit probabilities.
    pub fn sbn_parameter_optimization_ops(&self) -> Result<Vec<GpOperation>> {
        let mut ops = Vec::new();
        let mut visited = HashSet::new();
        let marginal_ops = self.marginal_likelihood_ops();
        for (rootsplit, &root_id) in self.rootsplit_ids().iter().enumerate() {
            self.schedule_sbn_parameter_optimization(root_id, &mut visited, &mut ops)?;
            ops.push(marginal_ops[rootsplit].clone());
        }
        ops.push(GpOperation::UpdateSbnProbabilities {
            start: 0,
            stop: self.rootsplit_count(),
        });
        Ok(ops)
    }

    fn schedule_sbn_parameter_optimization(
        &self,
        id: usize,
        visited: &mut HashSet<usize>,
        ops: &mut Vec<GpOperation>,
    ) -> Result<()> {
        visited.insert(id);
        self.push_node_refresh_prefix(id, ops)?;
        if self.node(id).is_leaf() {
            return Ok(());
        }
        for side in [Side::Right, Side::Left] {
            ops.push(GpOperation::Zero {
                dest: self.plv(accumulator_kind(side), id),
            });
            let children = self.node(id).neighbors(Direction::Leafward, side).to_vec();
            for child in children {
                if !visited.contains(&child) {
                    self.schedule_sbn_parameter_optimization(child, visited, ops)?;
                }
                let gpcsp = self.edge_parameter(id, child)?.gpcsp;
                ops.push(GpOperation::IncrementWithWeightedEvolvedPlv {
                    dest: self.plv(accumulator_kind(side), id),
                    gpcsp,
                    src: self.plv(PlvKind::P, child),
                });
                ops.push(GpOperation::Likelihood {
                    dest: gpcsp,
                    parent: self.plv(message_kind(side), id),
                    child: self.plv(PlvKind::P, child),
                });
            }
            self.push_sbn_range_update(id, side, ops);
            self.push_opposite_message_refresh(id, side, ops);
        }
        ops.push(GpOperation::Multiply {
            dest: self.plv(PlvKind::P, id),
            src1: self.plv(PlvKind::PHatRight, id),
            src2: self.plv(PlvKind::PHatLeft, id),
        });
        Ok(())
    }

    /// Refresh `r_hat` and both outgoing messages of a non-rootsplit node
    /// from its parents; rootsplit `r_hat` keeps its stationary value.
    fn push_node_refresh_prefix(&self, id: usize, ops: &mut Vec<GpOperation>) -> Result<()> {
        if self.node(id).is_rootsplit() {
            return Ok(());
        }
        self.push_r_hat_accumulation(id, false, ops)?;
        ops.push(GpOperation::Multiply {
            dest: self.plv(PlvKind::RRight, id),
            src1: self.plv(PlvKind::RHat, id),
            src2: self.plv(PlvKind::PHatLeft, id),
        });
        ops.push(GpOperation::Multiply {
            dest: self.plv(PlvKind::RLeft, id),
            src1: self.plv(PlvKind::RHat, id),
            src2: self.plv(PlvKind::PHatRight, id),
        });
        Ok(())
    }

    /// After refreshing one side's accumulator, the message to the *other*
    /// side is stale; recompute it.
    fn push_opposite_message_refresh(&self, id: usize, side: Side, ops: &mut Vec<GpOperation>) {
        ops.push(GpOperation::Multiply {
            dest: self.plv(message_kind(side.opposite()), id),
            src1: self.plv(PlvKind::RHat, id),
            src2: self.plv(accumulator_kind(side), id),
        });
    }

    /// Normalize the SBN probabilities of one parent-side range (skipped for
    /// singleton ranges, whose probability is pinned to one).
    fn push_sbn_range_update(&self, id: usize, side: Side, ops: &mut Vec<GpOperation>) {
        let oriented = match side {
            Side::Right => self.node(id).subsplit().clone(),
            Side::Left => self.node(id).subsplit().rotate_subsplit(),
        };
        if let Some((start, stop)) = self.indexer().parent_range(&oriented) {
            if stop - start > 1 {
                ops.push(GpOperation::UpdateSbnProbabilities { start, stop });
            }
        }
    }

    /// Likelihood of every DAG edge, then the marginal over rootsplits.
    pub fn likelihood_ops(&self) -> Result<Vec<GpOperation>> {
        let mut ops = Vec::new();
        for id in self.taxon_count()..self.node_count() {
            for side in [Side::Right, Side::Left] {
                for &child in self.node(id).neighbors(Direction::Leafward, side) {
                    ops.push(GpOperation::Likelihood {
                        dest: self.edge_parameter(id, child)?.gpcsp,
                        parent: self.plv(message_kind(side), id),
                        child: self.plv(PlvKind::P, child),
                    });
                }
            }
        }
        ops.extend(self.marginal_likelihood_ops());
        Ok(ops)
    }

    /// One marginal-likelihood increment per rootsplit
    pub fn marginal_likelihood_ops(&self) -> Vec<GpOperation> {
        self.rootsplit_ids()
            .iter()
            .enumerate()
            .map(|(rootsplit, &root_id)| GpOperation::IncrementMarginalLikelihood {
                stationary: self.plv(PlvKind::RHat, root_id),
                rootsplit,
                p: self.plv(PlvKind::P, root_id),
            })
            .collect()
    }
}
