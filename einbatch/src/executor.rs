//! Batched execution of signature groups.
//!
//! A group whose members all share one [`Signature`](crate::Signature) is
//! executed as a single primitive call: the k-th operand of every member is
//! stacked along a new leading axis, the group's equation is rewritten with
//! a fresh batch index on every term, and the primitive's output is split
//! back into per-member results. Groups smaller than the policy threshold
//! skip the stack/split round trip and call the primitive once per member.

use crate::error::EngineError;
use crate::label::Label;
use crate::schedule::Batch;
use crate::tree::ContractionTree;
use crate::Contractor;
use log::debug;
use ndarray::{ArrayD, ArrayViewD, Axis};

/// Execute one group and return its per-member results, in member order.
///
/// Every member's operands are checked against the group signature before
/// any primitive call; a mismatch means the caller handed over a batch that
/// was not produced by the scheduler, and is reported rather than fed to
/// the primitive.
pub fn execute_group<L, T, P>(
    trees: &[ContractionTree<L, T>],
    batch: &Batch,
    contractor: &P,
    min_group_size: usize,
) -> Result<Vec<ArrayD<T>>, EngineError>
where
    L: Label,
    T: Clone,
    P: Contractor<T> + ?Sized,
{
    let sig = &batch.signature;
    let members = batch.members.len();

    let member_ops: Vec<Vec<ArrayViewD<'_, T>>> = batch
        .members
        .iter()
        .map(|&(t, n)| trees[t].child_operands(n))
        .collect();

    for (&(t, n), ops) in batch.members.iter().zip(&member_ops) {
        if ops.len() != sig.arity() {
            return Err(EngineError::ShapeMismatch {
                signature: sig.to_string(),
                reason: format!(
                    "node {} of tree {} has {} operands, the group expects {}",
                    n.index(),
                    t,
                    ops.len(),
                    sig.arity()
                ),
            });
        }
        for (p, op) in ops.iter().enumerate() {
            if op.shape() != sig.shapes()[p] {
                return Err(EngineError::ShapeMismatch {
                    signature: sig.to_string(),
                    reason: format!(
                        "operand {} of node {} in tree {} has shape {:?}, the group expects {:?}",
                        p,
                        n.index(),
                        t,
                        op.shape(),
                        sig.shapes()[p]
                    ),
                });
            }
        }
    }

    if members < min_group_size {
        debug!("executing {} member(s) of [{}] unbatched", members, sig);
        let code = sig.code();
        let mut results = Vec::with_capacity(members);
        for ops in &member_ops {
            let out = contractor
                .contract(&code, ops)
                .map_err(|e| EngineError::Primitive {
                    signature: sig.to_string(),
                    members: 1,
                    source: e,
                })?;
            results.push(out);
        }
        return Ok(results);
    }

    debug!("executing {} member(s) of [{}] as one batch", members, sig);
    let mut stacked: Vec<ArrayD<T>> = Vec::with_capacity(sig.arity());
    for p in 0..sig.arity() {
        let slices: Vec<ArrayViewD<'_, T>> =
            member_ops.iter().map(|ops| ops[p].clone()).collect();
        let piled =
            ndarray::stack(Axis(0), &slices).map_err(|e| EngineError::ShapeMismatch {
                signature: sig.to_string(),
                reason: format!("stacking operand {}: {}", p, e),
            })?;
        stacked.push(piled);
    }

    let batched: Vec<ArrayViewD<'_, T>> = stacked.iter().map(|a| a.view()).collect();
    let out = contractor
        .contract(&sig.batched_code(), &batched)
        .map_err(|e| EngineError::Primitive {
            signature: sig.to_string(),
            members,
            source: e,
        })?;

    if out.ndim() == 0 || out.shape()[0] != members {
        return Err(EngineError::ShapeMismatch {
            signature: sig.to_string(),
            reason: format!(
                "primitive returned shape {:?} for a batch of {}",
                out.shape(),
                members
            ),
        });
    }

    Ok((0..members)
        .map(|k| out.index_axis(Axis(0), k).to_owned())
        .collect())
}
