//! Frontier collection and signature grouping.
//!
//! Each round, the scheduler scans every active tree for contraction nodes
//! whose children are all computed, then partitions that frontier by
//! [`Signature`] equality. Grouping order is the order of first appearance,
//! so partitions are reproducible across runs on the same input.

use crate::label::Label;
use crate::signature::Signature;
use crate::tree::{ContractionTree, NodeId};
use std::collections::HashMap;

/// A ready contraction step: which tree, which node, and its signature.
#[derive(Debug, Clone)]
pub struct ReadyNode {
    pub tree: usize,
    pub node: NodeId,
    pub signature: Signature,
}

/// Collect the current frontier across all trees. Read-only: trees whose
/// root is already computed are skipped, state transitions are left to the
/// driver.
pub fn collect_frontier<L: Label, T>(trees: &[ContractionTree<L, T>]) -> Vec<ReadyNode> {
    let mut frontier = Vec::new();
    for (t, tree) in trees.iter().enumerate() {
        if tree.is_complete() {
            continue;
        }
        for i in 0..tree.len() {
            let id = NodeId(i);
            if tree.is_ready(id) {
                frontier.push(ReadyNode {
                    tree: t,
                    node: id,
                    signature: tree.step_signature(id),
                });
            }
        }
    }
    frontier
}

/// One round's worth of batch-compatible ready nodes.
///
/// Ephemeral: built by [`group_frontier`], consumed by the executor,
/// discarded once results are written back. Members usually come from
/// distinct trees, but two ready nodes of one tree may share a signature
/// and land in the same group.
#[derive(Debug, Clone)]
pub struct Batch {
    pub signature: Signature,
    /// Member steps as (tree, node) pairs, in first-appearance order.
    pub members: Vec<(usize, NodeId)>,
}

/// Partition a frontier into groups of equal signature, preserving the
/// order in which each signature first appears.
pub fn group_frontier(frontier: Vec<ReadyNode>) -> Vec<Batch> {
    let mut order: HashMap<Signature, usize> = HashMap::new();
    let mut batches: Vec<Batch> = Vec::new();
    for rn in frontier {
        match order.get(&rn.signature) {
            Some(&at) => batches[at].members.push((rn.tree, rn.node)),
            None => {
                order.insert(rn.signature.clone(), batches.len());
                batches.push(Batch {
                    signature: rn.signature,
                    members: vec![(rn.tree, rn.node)],
                });
            }
        }
    }
    batches
}
