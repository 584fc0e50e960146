//! Shared helpers for the test modules.

use crate::eincode::EinCode;
use crate::label::Label;
use crate::signature::canonical_relabel;
use crate::tree::{ContractionTree, NodeId};
use crate::Contractor;
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Tensor with reproducible pseudo-random entries in [0, 1).
pub fn seeded_tensor(shape: &[usize], seed: u64) -> ArrayD<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let size: usize = shape.iter().product();
    let data: Vec<f64> = (0..size).map(|_| rng.random::<f64>()).collect();
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

/// Element-wise closeness with relative and absolute tolerance.
pub fn tensors_approx_equal(a: &ArrayD<f64>, b: &ArrayD<f64>, rtol: f64, atol: f64) -> bool {
    if a.shape() != b.shape() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

/// Evaluate a tree node by node, one primitive call each, without any
/// scheduling or batching. Engine results are checked against this.
///
/// Children precede parents in the arena, so a single forward sweep
/// computes every node and the last value is the root's.
pub fn reference_contract<L: Label, T: Clone>(
    tree: &ContractionTree<L, T>,
    contractor: &impl Contractor<T>,
) -> ArrayD<T> {
    let mut values: Vec<Option<ArrayD<T>>> = vec![None; tree.len()];
    for i in 0..tree.len() {
        let node = tree.node(NodeId(i));
        if node.is_leaf() {
            values[i] = Some(node.value().unwrap().clone());
            continue;
        }
        let patterns: Vec<&[L]> = node
            .children()
            .iter()
            .map(|&c| tree.node(c).indices())
            .collect();
        let operands: Vec<ArrayViewD<'_, T>> = node
            .children()
            .iter()
            .map(|&c| values[c.index()].as_ref().unwrap().view())
            .collect();
        let (ixs, iy) = canonical_relabel(&patterns, node.indices());
        let out = contractor
            .contract(&EinCode::new(ixs, iy), &operands)
            .unwrap();
        values[i] = Some(out);
    }
    values.pop().unwrap().unwrap()
}

/// Left-deep chain of matrix products over integer labels 0..=n, with the
/// k-th matrix carrying the pattern [k, k+1].
pub fn matrix_chain_tree(mats: Vec<ArrayD<f64>>) -> ContractionTree<usize, f64> {
    let n = mats.len();
    assert!(n > 0, "a chain needs at least one matrix");
    let mut tree = ContractionTree::new(vec![0, n]);
    let mut ids = Vec::with_capacity(n);
    for (k, m) in mats.into_iter().enumerate() {
        ids.push(tree.leaf(vec![k, k + 1], m));
    }
    let mut acc = ids[0];
    for (k, &id) in ids.iter().enumerate().skip(1) {
        acc = tree.contraction(vec![acc, id], vec![0, k + 1]);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naive::NaiveContractor;

    #[test]
    fn test_seeded_tensor_is_reproducible() {
        let a = seeded_tensor(&[3, 4], 42);
        let b = seeded_tensor(&[3, 4], 42);
        let c = seeded_tensor(&[3, 4], 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn test_tensors_approx_equal() {
        let a = seeded_tensor(&[2, 2], 7);
        let mut b = a.clone();
        assert!(tensors_approx_equal(&a, &b, 1e-9, 1e-12));

        b[[0, 0]] += 1e-3;
        assert!(!tensors_approx_equal(&a, &b, 1e-9, 1e-12));
        assert!(!tensors_approx_equal(&a, &seeded_tensor(&[4], 7), 1e-9, 1e-12));
    }

    #[test]
    fn test_matrix_chain_tree_shape() {
        let mats = vec![
            seeded_tensor(&[2, 3], 1),
            seeded_tensor(&[3, 4], 2),
            seeded_tensor(&[4, 5], 3),
        ];
        let mut tree = matrix_chain_tree(mats);
        tree.validate(0).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.output(), &[0, 3]);

        let out = reference_contract(&tree, &NaiveContractor);
        assert_eq!(out.shape(), &[2, 5]);
    }

    #[test]
    fn test_reference_contract_matmul() {
        let a = seeded_tensor(&[3, 3], 10);
        let b = seeded_tensor(&[3, 3], 11);

        let mut tree = ContractionTree::new(vec!['i', 'k']);
        let la = tree.leaf(vec!['i', 'j'], a.clone());
        let lb = tree.leaf(vec!['j', 'k'], b.clone());
        tree.contraction(vec![la, lb], vec!['i', 'k']);

        let code = EinCode::new(vec![vec![0, 1], vec![1, 2]], vec![0, 2]);
        let direct = NaiveContractor
            .contract(&code, &[a.view(), b.view()])
            .unwrap();
        assert_eq!(reference_contract(&tree, &NaiveContractor), direct);
    }
}
