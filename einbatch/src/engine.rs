//! Round-based driver.
//!
//! The driver alternates discovery and execution: collect every ready
//! contraction across all trees, group the frontier by signature, run each
//! group (batched or member-by-member, per policy), write results back, and
//! repeat until every root is computed. Each round strictly consumes the
//! frontier it discovered, so a tree of depth d finishes in at most d
//! rounds regardless of how many trees run alongside it.

use crate::error::EngineError;
use crate::executor::execute_group;
use crate::label::Label;
use crate::schedule::{collect_frontier, group_frontier};
use crate::tree::ContractionTree;
use crate::Contractor;
use log::debug;
use ndarray::ArrayD;
use rayon::prelude::*;
use serde::Serialize;

/// Tunables for batched execution.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Groups with fewer members than this run unbatched, one primitive
    /// call per member. The default of 2 batches everything that can be.
    pub min_group_size: usize,
    /// Execute the groups of a round on the rayon thread pool. Results
    /// and reports are identical either way.
    pub parallel: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy {
            min_group_size: 2,
            parallel: false,
        }
    }
}

impl BatchPolicy {
    pub fn with_min_group_size(mut self, min_group_size: usize) -> Self {
        self.min_group_size = min_group_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// One signature group as it was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    /// Canonical rendering of the group signature.
    pub signature: String,
    pub members: usize,
    /// Whether the group ran as a single stacked primitive call.
    pub batched: bool,
}

/// The groups of one scheduling round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub groups: Vec<GroupSummary>,
}

impl RoundReport {
    /// Ready nodes consumed by this round.
    pub fn ready_nodes(&self) -> usize {
        self.groups.iter().map(|g| g.members).sum()
    }
}

/// Per-round account of what was grouped and how it ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub rounds: Vec<RoundReport>,
}

impl BatchReport {
    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Primitive calls issued over the whole run.
    pub fn primitive_calls(&self) -> usize {
        self.rounds
            .iter()
            .flat_map(|r| &r.groups)
            .map(|g| if g.batched { 1 } else { g.members })
            .sum()
    }
}

/// Run every tree to completion and return the root values in input order.
///
/// All-or-nothing: the first error aborts the run and no partial results
/// are returned. Trees are validated up front, so a malformed input fails
/// before any contraction runs.
pub(crate) fn run<L, T, P>(
    mut trees: Vec<ContractionTree<L, T>>,
    contractor: &P,
    policy: &BatchPolicy,
) -> Result<(Vec<ArrayD<T>>, BatchReport), EngineError>
where
    L: Label + Sync,
    T: Clone + Send + Sync,
    P: Contractor<T> + Sync,
{
    for (i, tree) in trees.iter_mut().enumerate() {
        tree.validate(i)?;
    }

    let mut report = BatchReport::default();
    let mut round = 0usize;
    loop {
        let frontier = collect_frontier(&trees);
        if frontier.is_empty() {
            if let Some(stuck) = trees.iter().position(|t| !t.is_complete()) {
                return Err(EngineError::MalformedTree {
                    tree: stuck,
                    reason: "no contraction is ready but the tree is incomplete".into(),
                });
            }
            break;
        }
        let ready = frontier.len();
        for rn in &frontier {
            trees[rn.tree].mark_ready(rn.node);
        }

        let batches = group_frontier(frontier);
        debug!(
            "round {}: {} ready node(s) in {} group(s)",
            round,
            ready,
            batches.len()
        );

        let groups: Vec<GroupSummary> = batches
            .iter()
            .map(|b| GroupSummary {
                signature: b.signature.to_string(),
                members: b.members.len(),
                batched: b.members.len() >= policy.min_group_size,
            })
            .collect();

        let results: Vec<Vec<ArrayD<T>>> = if policy.parallel {
            batches
                .par_iter()
                .map(|b| execute_group(&trees, b, contractor, policy.min_group_size))
                .collect::<Result<_, _>>()?
        } else {
            batches
                .iter()
                .map(|b| execute_group(&trees, b, contractor, policy.min_group_size))
                .collect::<Result<_, _>>()?
        };

        for (batch, outs) in batches.iter().zip(results) {
            debug_assert_eq!(outs.len(), batch.members.len());
            for (&(t, n), value) in batch.members.iter().zip(outs) {
                trees[t].assign(n, value);
            }
        }

        report.rounds.push(RoundReport { groups });
        round += 1;
    }

    let mut outputs = Vec::with_capacity(trees.len());
    for (i, tree) in trees.iter_mut().enumerate() {
        match tree.take_root_value() {
            Some(value) => outputs.push(value),
            None => {
                return Err(EngineError::MalformedTree {
                    tree: i,
                    reason: "root value missing after completion".into(),
                })
            }
        }
    }
    Ok((outputs, report))
}
