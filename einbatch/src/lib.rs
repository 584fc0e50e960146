//! # einbatch - Batched Execution of Tensor Network Contraction Trees
//!
//! A Rust library for executing populations of tensor network contraction
//! trees, discovering structurally identical contraction steps across the
//! population and fusing them into batched primitive calls.
//!
//! ## Why Batch Contractions?
//!
//! A *contraction tree* prescribes the order in which a tensor network is
//! evaluated: leaves are input tensors, internal nodes are intermediate
//! results, and each node carries the index pattern of the tensor it
//! produces. Workloads rarely evaluate one tree in isolation. Parameter
//! sweeps, sampled quantum circuits, and ensemble ML inference all evaluate
//! *many* networks that share structure and differ only in the numbers
//! inside the tensors.
//!
//! Dense contraction backends (BLAS, GPUs) pay a fixed overhead per call
//! and only reach peak throughput on large operands. Executing a thousand
//! small matrix products one by one leaves most of that throughput on the
//! table; stacking them into a single call with one extra batch axis does
//! not. This crate finds those opportunities automatically: at every step
//! it groups the contractions that are *exactly* compatible, runs each
//! group as one primitive call, and splits the results back out so every
//! tree still sees plain per-tree semantics.
//!
//! Batching never changes results. Two steps land in the same group only
//! when they agree on operand count, canonical index structure, and exact
//! operand shapes, so the fused call computes precisely the same numbers
//! the separate calls would have.
//!
//! ## Features
//!
//! This crate provides two main features:
//!
//! 1. **Batch discovery** — Scan a population of trees round by round and
//!    group the ready contraction steps by [`Signature`]
//! 2. **Batched execution** — Run each group through a pluggable
//!    [`Contractor`] primitive as a single stacked call
//!
//! ### Feature 1: Batch discovery
//!
//! The driver works in rounds. Each round collects the *frontier*, the set
//! of contraction nodes whose children are all computed, and partitions it
//! by signature. The [`BatchReport`] records what was grouped and how each
//! group ran:
//!
//! ```rust
//! use einbatch::{batch_contract_with_report, BatchPolicy, ContractionTree, NaiveContractor};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let mut trees = Vec::new();
//! for scale in 1..=3 {
//!     let data = vec![scale as f64; 16];
//!     let mut tree = ContractionTree::new(vec!['i', 'k']);
//!     let a = tree.leaf(vec!['i', 'j'], ArrayD::from_shape_vec(IxDyn(&[4, 4]), data.clone()).unwrap());
//!     let b = tree.leaf(vec!['j', 'k'], ArrayD::from_shape_vec(IxDyn(&[4, 4]), data).unwrap());
//!     tree.contraction(vec![a, b], vec!['i', 'k']);
//!     trees.push(tree);
//! }
//!
//! let (outputs, report) =
//!     batch_contract_with_report(trees, &NaiveContractor, &BatchPolicy::default()).unwrap();
//! assert_eq!(outputs.len(), 3);
//! // All three steps were compatible: one round, one batched group.
//! assert_eq!(report.num_rounds(), 1);
//! assert_eq!(report.rounds[0].groups[0].members, 3);
//! ```
//!
//! ### Feature 2: Batched execution
//!
//! For a group of n members, the k-th operands of all members are stacked
//! along a new leading axis, the equation gains a batch index on every
//! term, and the primitive runs once. [`batch_einsum`] wraps the whole
//! pipeline behind einsum notation:
//!
//! ```rust
//! use einbatch::{batch_einsum, BatchPolicy, NaiveContractor};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let a = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let b = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![5.0, 6.0, 7.0, 8.0]).unwrap();
//!
//! // Two matrix products with the same structure run as one primitive call.
//! let outputs = batch_einsum(
//!     &["ij,jk->ik", "ab,bc->ac"],
//!     vec![vec![a.clone(), b.clone()], vec![b, a]],
//!     &NaiveContractor,
//!     &BatchPolicy::default(),
//! )
//! .unwrap();
//! assert_eq!(outputs.len(), 2);
//! assert_eq!(outputs[0][[0, 0]], 19.0);
//! ```
//!
//! ## Algorithm Details
//!
//! ### Signatures
//!
//! A [`Signature`] is the batching key of one contraction step: the operand
//! index patterns and the node output, relabeled to consecutive integers in
//! order of first appearance, plus the exact operand shapes. Renaming
//! indices never changes a signature; changing an extent, an operand
//! count, or the contraction structure always does.
//!
//! ### The round loop
//!
//! ```text
//! while some tree is incomplete:
//!     frontier = every node whose children are all computed
//!     group frontier by signature (first-appearance order)
//!     for each group: stack -> contract once -> split
//!     write results back into the trees
//! ```
//!
//! Rounds are synchronous: a result computed in round r becomes visible to
//! the frontier of round r+1, so a tree of depth d completes in exactly d
//! rounds and deep trees keep pace with shallow ones. Groups in one round
//! are independent and can run on the rayon thread pool
//! ([`BatchPolicy::with_parallel`]).
//!
//! The primitive itself is a seam: implement [`Contractor`] over your
//! backend of choice. [`NaiveContractor`] is the bundled nested-loop
//! reference implementation.

pub mod eincode;
pub mod engine;
pub mod error;
pub mod executor;
pub mod json;
pub mod label;
pub mod naive;
pub mod schedule;
pub mod signature;
pub mod tree;

#[cfg(test)]
pub mod test_utils;

// Re-export main types
pub use eincode::{parse_eincode, EinCode, ParseError};
pub use engine::{BatchPolicy, BatchReport, GroupSummary, RoundReport};
pub use error::{EngineError, PrimitiveError};
pub use executor::execute_group;
pub use label::Label;
pub use naive::NaiveContractor;
pub use schedule::{collect_frontier, group_frontier, Batch, ReadyNode};
pub use signature::Signature;
pub use tree::{linear_tree, ContractionTree, Node, NodeId, NodeState};

use ndarray::{ArrayD, ArrayViewD};

/// Black-box dense contraction primitive driven by the engine.
///
/// Equations arrive in canonical form: labels are consecutive integers
/// numbered by first appearance across the operand patterns, and batched
/// calls prefix one extra batch label to every pattern. Implementations
/// follow standard einsum semantics, multiplying operands over shared
/// labels and summing over every label absent from the output.
pub trait Contractor<T> {
    /// Contract `operands` according to `code`.
    ///
    /// There is one operand per `code.ixs` entry, with matching rank. A
    /// returned error aborts the whole run; the engine wraps it with the
    /// group's signature and member count.
    fn contract(
        &self,
        code: &EinCode<usize>,
        operands: &[ArrayViewD<'_, T>],
    ) -> Result<ArrayD<T>, PrimitiveError>;
}

/// Contract every tree to completion and return the root values in input
/// order, batching compatible steps across trees.
pub fn batch_contract<L, T, P>(
    trees: Vec<ContractionTree<L, T>>,
    contractor: &P,
    policy: &BatchPolicy,
) -> Result<Vec<ArrayD<T>>, EngineError>
where
    L: Label + Sync,
    T: Clone + Send + Sync,
    P: Contractor<T> + Sync,
{
    engine::run(trees, contractor, policy).map(|(outputs, _)| outputs)
}

/// Like [`batch_contract`], additionally returning the per-round
/// [`BatchReport`] of what was grouped and how it ran.
pub fn batch_contract_with_report<L, T, P>(
    trees: Vec<ContractionTree<L, T>>,
    contractor: &P,
    policy: &BatchPolicy,
) -> Result<(Vec<ArrayD<T>>, BatchReport), EngineError>
where
    L: Label + Sync,
    T: Clone + Send + Sync,
    P: Contractor<T> + Sync,
{
    engine::run(trees, contractor, policy)
}

/// Evaluate one einsum expression per entry, batching across entries.
///
/// Each expression is parsed and turned into a left-to-right linear
/// contraction tree over its operands; identical steps across entries are
/// then fused exactly as in [`batch_contract`].
///
/// # Example
///
/// ```rust
/// use einbatch::{batch_einsum, BatchPolicy, NaiveContractor};
/// use ndarray::ArrayD;
/// use ndarray::IxDyn;
///
/// let m = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let outputs = batch_einsum(
///     &["ii->", "ij->ji"],
///     vec![vec![m.clone()], vec![m]],
///     &NaiveContractor,
///     &BatchPolicy::default(),
/// )
/// .unwrap();
/// assert_eq!(outputs[0].sum(), 5.0);
/// assert_eq!(outputs[1][[1, 0]], 2.0);
/// ```
pub fn batch_einsum<T, P>(
    exprs: &[&str],
    operands: Vec<Vec<ArrayD<T>>>,
    contractor: &P,
    policy: &BatchPolicy,
) -> Result<Vec<ArrayD<T>>, EngineError>
where
    T: Clone + Send + Sync,
    P: Contractor<T> + Sync,
{
    if exprs.len() != operands.len() {
        return Err(EngineError::IncompleteInput {
            tree: exprs.len().min(operands.len()),
            reason: format!(
                "got {} expressions and {} operand lists",
                exprs.len(),
                operands.len()
            ),
        });
    }
    let mut trees = Vec::with_capacity(exprs.len());
    for (i, (expr, ops)) in exprs.iter().zip(operands).enumerate() {
        let code = parse_eincode(expr)?;
        if code.num_operands() != ops.len() {
            return Err(EngineError::IncompleteInput {
                tree: i,
                reason: format!(
                    "expression {:?} names {} operands, got {}",
                    expr,
                    code.num_operands(),
                    ops.len()
                ),
            });
        }
        trees.push(linear_tree(&code, ops));
    }
    engine::run(trees, contractor, policy).map(|(outputs, _)| outputs)
}


#[cfg(test)]
mod grouping_tests {
    //! Tests pinning down what is grouped together, via the report.

    use super::*;
    use crate::test_utils::{reference_contract, seeded_tensor};

    fn expr_tree(expr: &str, ops: Vec<ArrayD<f64>>) -> ContractionTree<char, f64> {
        linear_tree(&parse_eincode(expr).unwrap(), ops)
    }

    fn matmul(seed: u64, shapes: (&[usize], &[usize])) -> ContractionTree<char, f64> {
        expr_tree(
            "ij,jk->ik",
            vec![seeded_tensor(shapes.0, seed), seeded_tensor(shapes.1, seed + 100)],
        )
    }

    #[test]
    fn test_renaming_invariance_groups_across_expressions() {
        let trees = vec![
            expr_tree(
                "ij,jk->ik",
                vec![seeded_tensor(&[4, 4], 1), seeded_tensor(&[4, 4], 2)],
            ),
            expr_tree(
                "ab,bc->ac",
                vec![seeded_tensor(&[4, 4], 3), seeded_tensor(&[4, 4], 4)],
            ),
        ];
        let (_, report) =
            batch_contract_with_report(trees, &NaiveContractor, &BatchPolicy::default()).unwrap();
        assert_eq!(report.rounds[0].groups.len(), 1);
        assert_eq!(report.rounds[0].groups[0].members, 2);
    }

    #[test]
    fn test_shape_differences_split_groups() {
        let trees = vec![
            matmul(1, (&[4, 4], &[4, 4])),
            matmul(2, (&[3, 5], &[5, 2])),
        ];
        let (_, report) =
            batch_contract_with_report(trees, &NaiveContractor, &BatchPolicy::default()).unwrap();
        let groups = &report.rounds[0].groups;
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.members == 1 && !g.batched));
    }

    #[test]
    fn test_mixed_population_batches_the_compatible_pair() {
        let build = || {
            vec![
                matmul(1, (&[4, 4], &[4, 4])),
                expr_tree(
                    "ij,ij->ij",
                    vec![seeded_tensor(&[4, 4], 5), seeded_tensor(&[4, 4], 6)],
                ),
                matmul(2, (&[4, 4], &[4, 4])),
            ]
        };
        let expected: Vec<ArrayD<f64>> = build()
            .iter()
            .map(|t| reference_contract(t, &NaiveContractor))
            .collect();
        let (outputs, report) =
            batch_contract_with_report(build(), &NaiveContractor, &BatchPolicy::default())
                .unwrap();

        assert_eq!(outputs, expected);
        let groups = &report.rounds[0].groups;
        assert_eq!(groups.len(), 2);
        // The two matrix products fused; the elementwise product ran alone.
        assert_eq!(groups[0].members, 2);
        assert!(groups[0].batched);
        assert_eq!(groups[1].members, 1);
        assert!(!groups[1].batched);
    }

    #[test]
    fn test_chains_finish_in_depth_rounds() {
        let chain = |seed: u64| {
            expr_tree(
                "ij,jk,kl,lm->im",
                vec![
                    seeded_tensor(&[4, 4], seed),
                    seeded_tensor(&[4, 4], seed + 1),
                    seeded_tensor(&[4, 4], seed + 2),
                    seeded_tensor(&[4, 4], seed + 3),
                ],
            )
        };
        let (_, report) = batch_contract_with_report(
            vec![chain(1), chain(10)],
            &NaiveContractor,
            &BatchPolicy::default(),
        )
        .unwrap();

        // Left-to-right chains of 4 matrices are three contractions deep
        // and every round fuses the two chains' steps.
        assert_eq!(report.num_rounds(), 3);
        for round in &report.rounds {
            assert_eq!(round.groups.len(), 1);
            assert_eq!(round.groups[0].members, 2);
            assert!(round.groups[0].batched);
        }
        assert_eq!(report.primitive_calls(), 3);
    }

    #[test]
    fn test_short_tree_waits_out_the_deep_one() {
        let deep = expr_tree(
            "ij,jk,kl->il",
            vec![
                seeded_tensor(&[4, 4], 1),
                seeded_tensor(&[4, 4], 2),
                seeded_tensor(&[4, 4], 3),
            ],
        );
        let shallow = matmul(4, (&[4, 4], &[4, 4]));
        let (_, report) = batch_contract_with_report(
            vec![deep, shallow],
            &NaiveContractor,
            &BatchPolicy::default(),
        )
        .unwrap();

        assert_eq!(report.num_rounds(), 2);
        // Round 0 pairs the shallow tree with the deep tree's first step;
        // round 1 is the deep tree finishing alone.
        assert_eq!(report.rounds[0].groups[0].members, 2);
        assert_eq!(report.rounds[1].ready_nodes(), 1);
    }

    #[test]
    fn test_min_group_size_leaves_small_groups_unbatched() {
        let trees = vec![matmul(1, (&[4, 4], &[4, 4])), matmul(2, (&[4, 4], &[4, 4]))];
        let policy = BatchPolicy::default().with_min_group_size(3);
        let (_, report) =
            batch_contract_with_report(trees, &NaiveContractor, &policy).unwrap();
        assert!(!report.rounds[0].groups[0].batched);
        assert_eq!(report.primitive_calls(), 2);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let build = || {
            vec![
                matmul(1, (&[4, 4], &[4, 4])),
                matmul(2, (&[3, 5], &[5, 2])),
                matmul(3, (&[4, 4], &[4, 4])),
                expr_tree(
                    "ij,jk,kl->il",
                    vec![
                        seeded_tensor(&[3, 3], 4),
                        seeded_tensor(&[3, 3], 5),
                        seeded_tensor(&[3, 3], 6),
                    ],
                ),
            ]
        };
        let first =
            batch_contract_with_report(build(), &NaiveContractor, &BatchPolicy::default())
                .unwrap();
        let second =
            batch_contract_with_report(build(), &NaiveContractor, &BatchPolicy::default())
                .unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
