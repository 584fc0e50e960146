//! Reference contraction primitive.
//!
//! [`NaiveContractor`] evaluates an einsum equation by looping over the
//! full index domain, one multiply-add per point. It is far too slow for
//! real workloads but transparently correct, which makes it the baseline
//! every optimized backend is checked against in the tests.

use crate::eincode::EinCode;
use crate::error::PrimitiveError;
use crate::Contractor;
use log::trace;
use ndarray::{ArrayD, ArrayViewD, IxDyn, LinalgScalar};
use std::collections::HashMap;

/// Nested-loop einsum over dynamic-rank arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveContractor;

impl<T: LinalgScalar> Contractor<T> for NaiveContractor {
    fn contract(
        &self,
        code: &EinCode<usize>,
        operands: &[ArrayViewD<'_, T>],
    ) -> Result<ArrayD<T>, PrimitiveError> {
        naive_einsum(code, operands)
    }
}

fn naive_einsum<T: LinalgScalar>(
    code: &EinCode<usize>,
    operands: &[ArrayViewD<'_, T>],
) -> Result<ArrayD<T>, PrimitiveError> {
    if operands.is_empty() {
        return Err(PrimitiveError::new("at least one operand is required"));
    }
    if code.num_operands() != operands.len() {
        return Err(PrimitiveError::new(format!(
            "equation names {} operands, got {}",
            code.num_operands(),
            operands.len()
        )));
    }

    let mut extents: HashMap<usize, usize> = HashMap::new();
    for (ix, op) in code.ixs.iter().zip(operands) {
        if ix.len() != op.ndim() {
            return Err(PrimitiveError::new(format!(
                "pattern {:?} has {} indices but the operand has rank {}",
                ix,
                ix.len(),
                op.ndim()
            )));
        }
        for (&l, &d) in ix.iter().zip(op.shape()) {
            if let Some(prev) = extents.insert(l, d) {
                if prev != d {
                    return Err(PrimitiveError::new(format!(
                        "index {} is bound to extents {} and {}",
                        l, prev, d
                    )));
                }
            }
        }
    }

    let out_shape: Vec<usize> = code
        .iy
        .iter()
        .map(|l| {
            extents.get(l).copied().ok_or_else(|| {
                PrimitiveError::new(format!("output index {} appears in no operand", l))
            })
        })
        .collect::<Result<_, _>>()?;

    // Sweep the joint domain of every index, accumulating into the output
    // cell selected by the output indices.
    let labels = code.unique_labels();
    let sizes: Vec<usize> = labels.iter().map(|l| extents[l]).collect();
    let total: usize = sizes.iter().product();
    trace!(
        "naive einsum over {} points, {} output cells",
        total,
        out_shape.iter().product::<usize>()
    );

    let mut result = ArrayD::<T>::zeros(IxDyn(&out_shape));
    let mut assign: HashMap<usize, usize> = HashMap::new();
    for point in 0..total {
        let mut rem = point;
        for (pos, &l) in labels.iter().enumerate().rev() {
            assign.insert(l, rem % sizes[pos]);
            rem /= sizes[pos];
        }

        let idx: Vec<usize> = code.ixs[0].iter().map(|l| assign[l]).collect();
        let mut term = operands[0][&*idx];
        for (ix, op) in code.ixs.iter().zip(operands).skip(1) {
            let idx: Vec<usize> = ix.iter().map(|l| assign[l]).collect();
            term = term * op[&*idx];
        }

        let out_idx: Vec<usize> = code.iy.iter().map(|l| assign[l]).collect();
        let cell = result[&*out_idx];
        result[&*out_idx] = cell + term;
    }
    Ok(result)
}
