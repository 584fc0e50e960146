//! Contraction trees.
//!
//! A [`ContractionTree`] is an arena of nodes addressed by opaque
//! [`NodeId`] handles. Leaves carry materialized tensors; contraction nodes
//! carry an output index pattern, child handles, and, once computed, a
//! value. Children always precede their parents in the arena, so trees are
//! acyclic by construction and scanning for ready nodes is a flat pass.
//! Sharing is allowed: several contraction nodes may read the same child.
//!
//! Node values are single-assignment. Each node moves through the states
//! pending, ready, done; the transitions are validated and any other
//! transition panics, since it can only arise from a bug in the scheduler.

use crate::eincode::EinCode;
use crate::error::EngineError;
use crate::label::Label;
use crate::signature::Signature;
use ndarray::{ArrayD, ArrayViewD};
use std::collections::{HashMap, HashSet};

/// Opaque handle to a node within one [`ContractionTree`].
///
/// Handles are only meaningful for the tree that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its tree's arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Evaluation state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet computable: some child is missing its value, or the node is
    /// an unbound leaf.
    Pending,
    /// Selected for execution in the current round; all children are done.
    Ready,
    /// Value present. Final.
    Done,
}

/// Structural role of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Input tensor.
    Leaf,
    /// Contraction over one or more children.
    Contraction { children: Vec<NodeId> },
}

/// One node of a contraction tree.
#[derive(Debug, Clone)]
pub struct Node<L, T> {
    indices: Vec<L>,
    kind: NodeKind,
    value: Option<ArrayD<T>>,
    state: NodeState,
}

impl<L, T> Node<L, T> {
    /// Output index pattern (for a leaf, the pattern of the stored tensor).
    pub fn indices(&self) -> &[L] {
        &self.indices
    }

    /// Child handles; empty for leaves.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Leaf => &[],
            NodeKind::Contraction { children } => children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// The node's computed tensor, if any.
    pub fn value(&self) -> Option<&ArrayD<T>> {
        self.value.as_ref()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }
}

/// A rooted tree (or shared-node DAG) of contraction steps over leaf
/// tensors, declaring an overall output index pattern.
#[derive(Debug, Clone)]
pub struct ContractionTree<L, T> {
    nodes: Vec<Node<L, T>>,
    output: Vec<L>,
    root: Option<NodeId>,
}

impl<L: Label, T> ContractionTree<L, T> {
    /// Create an empty tree declaring its overall output pattern.
    pub fn new(output: Vec<L>) -> Self {
        Self {
            nodes: Vec::new(),
            output,
            root: None,
        }
    }

    /// Add a leaf holding a tensor. The pattern names one index per axis.
    pub fn leaf(&mut self, indices: Vec<L>, value: ArrayD<T>) -> NodeId {
        self.push(Node {
            indices,
            kind: NodeKind::Leaf,
            value: Some(value),
            state: NodeState::Done,
        })
    }

    /// Add a leaf without a tensor, to be bound later with [`bind_leaf`].
    ///
    /// Useful for building one tree structure and cloning it for many leaf
    /// assignments. A tree with unbound leaves fails validation.
    ///
    /// [`bind_leaf`]: ContractionTree::bind_leaf
    pub fn unbound_leaf(&mut self, indices: Vec<L>) -> NodeId {
        self.push(Node {
            indices,
            kind: NodeKind::Leaf,
            value: None,
            state: NodeState::Pending,
        })
    }

    /// Bind a tensor to an unbound leaf.
    ///
    /// # Panics
    /// Panics if the node is not a leaf or already holds a value.
    pub fn bind_leaf(&mut self, id: NodeId, value: ArrayD<T>) {
        let node = &mut self.nodes[id.0];
        assert!(
            node.is_leaf() && node.value.is_none(),
            "bind_leaf expects an unbound leaf, node {} is not one",
            id.0
        );
        node.value = Some(value);
        node.state = NodeState::Done;
    }

    /// Bind one tensor per unbound leaf, in the order the leaves were added.
    ///
    /// # Panics
    /// Panics if `values` does not hold exactly one tensor per unbound leaf.
    pub fn bind_leaves(&mut self, values: Vec<ArrayD<T>>) {
        let unbound: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf() && n.value.is_none())
            .map(|(i, _)| NodeId(i))
            .collect();
        assert_eq!(
            unbound.len(),
            values.len(),
            "tree has {} unbound leaves, got {} tensors",
            unbound.len(),
            values.len()
        );
        for (id, value) in unbound.into_iter().zip(values) {
            self.bind_leaf(id, value);
        }
    }

    /// Add a contraction node over existing children.
    ///
    /// # Panics
    /// Panics if `children` is empty or names a node this tree does not
    /// contain.
    pub fn contraction(&mut self, children: Vec<NodeId>, output: Vec<L>) -> NodeId {
        assert!(
            !children.is_empty(),
            "a contraction node needs at least one child"
        );
        for c in &children {
            assert!(
                c.0 < self.nodes.len(),
                "child node {} does not exist in this tree",
                c.0
            );
        }
        self.push(Node {
            indices: output,
            kind: NodeKind::Contraction { children },
            value: None,
            state: NodeState::Pending,
        })
    }

    fn push(&mut self, node: Node<L, T>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// The declared overall output pattern.
    pub fn output(&self) -> &[L] {
        &self.output
    }

    /// Access a node.
    ///
    /// # Panics
    /// Panics if `id` did not come from this tree.
    pub fn node(&self, id: NodeId) -> &Node<L, T> {
        &self.nodes[id.0]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// The root node. `None` until the tree has been validated.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Whether the root's value has been computed.
    pub fn is_complete(&self) -> bool {
        self.root
            .map(|r| self.nodes[r.0].state == NodeState::Done)
            .unwrap_or(false)
    }

    /// Check structural consistency and locate the root. Run once per tree
    /// before any contraction executes; `tree` is the tree's position in
    /// the run, used for error context.
    pub(crate) fn validate(&mut self, tree: usize) -> Result<(), EngineError> {
        if self.nodes.is_empty() {
            return Err(EngineError::MalformedTree {
                tree,
                reason: "tree has no nodes".into(),
            });
        }

        let mut parented = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for child in node.children() {
                parented[child.0] = true;
            }
        }
        let unparented: Vec<usize> = parented
            .iter()
            .enumerate()
            .filter(|(_, &p)| !p)
            .map(|(i, _)| i)
            .collect();
        if unparented.len() != 1 {
            return Err(EngineError::MalformedTree {
                tree,
                reason: format!(
                    "expected exactly one root node, found {}",
                    unparented.len()
                ),
            });
        }
        let root = NodeId(unparented[0]);

        if self.nodes[root.0].indices != self.output {
            return Err(EngineError::MalformedTree {
                tree,
                reason: format!(
                    "root pattern {:?} does not match the declared output {:?}",
                    self.nodes[root.0].indices, self.output
                ),
            });
        }

        let mut extents: HashMap<&L, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            match &node.kind {
                NodeKind::Leaf => {
                    let value = node.value.as_ref().ok_or_else(|| {
                        EngineError::MalformedTree {
                            tree,
                            reason: format!("leaf node {i} has no value"),
                        }
                    })?;
                    if value.ndim() != node.indices.len() {
                        return Err(EngineError::IncompleteInput {
                            tree,
                            reason: format!(
                                "leaf node {i} has rank {} but its pattern names {} indices",
                                value.ndim(),
                                node.indices.len()
                            ),
                        });
                    }
                    for (l, &d) in node.indices.iter().zip(value.shape()) {
                        if let Some(prev) = extents.insert(l, d) {
                            if prev != d {
                                return Err(EngineError::IncompleteInput {
                                    tree,
                                    reason: format!(
                                        "index {:?} is bound to extents {} and {}",
                                        l, prev, d
                                    ),
                                });
                            }
                        }
                    }
                }
                NodeKind::Contraction { children } => {
                    if children.is_empty() {
                        return Err(EngineError::MalformedTree {
                            tree,
                            reason: format!("node {i} has no children"),
                        });
                    }
                    for (k, l) in node.indices.iter().enumerate() {
                        if node.indices[..k].contains(l) {
                            return Err(EngineError::MalformedTree {
                                tree,
                                reason: format!("node {i} repeats output index {:?}", l),
                            });
                        }
                    }
                    for l in &node.indices {
                        let in_children = children
                            .iter()
                            .any(|c| self.nodes[c.0].indices.contains(l));
                        if !in_children {
                            return Err(EngineError::MalformedTree {
                                tree,
                                reason: format!(
                                    "node {i} output index {:?} does not appear in any child",
                                    l
                                ),
                            });
                        }
                    }
                }
            }
        }

        self.root = Some(root);
        Ok(())
    }

    /// Whether a node is a pending contraction with every child done.
    pub(crate) fn is_ready(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        !node.is_leaf()
            && node.state == NodeState::Pending
            && node
                .children()
                .iter()
                .all(|c| self.nodes[c.0].state == NodeState::Done)
    }

    /// Validated pending-to-ready transition.
    pub(crate) fn mark_ready(&mut self, id: NodeId) {
        assert!(
            self.is_ready(id),
            "invalid state transition: node {} is not a pending contraction with all children done",
            id.0
        );
        self.nodes[id.0].state = NodeState::Ready;
    }

    /// Validated ready-to-done transition; stores the computed value.
    /// Single-assignment: a second write to the same node panics.
    pub(crate) fn assign(&mut self, id: NodeId, value: ArrayD<T>) {
        let node = &mut self.nodes[id.0];
        assert!(
            node.state == NodeState::Ready && node.value.is_none(),
            "invalid state transition: node {} assigned while {:?}",
            id.0,
            node.state
        );
        node.value = Some(value);
        node.state = NodeState::Done;
    }

    /// Signature of a ready node's contraction step.
    ///
    /// # Panics
    /// Panics if some child has no value yet.
    pub(crate) fn step_signature(&self, id: NodeId) -> Signature {
        let node = &self.nodes[id.0];
        let children = node.children();
        let patterns: Vec<&[L]> = children
            .iter()
            .map(|c| self.nodes[c.0].indices.as_slice())
            .collect();
        let shapes: Vec<&[usize]> = children
            .iter()
            .map(|c| {
                self.nodes[c.0]
                    .value
                    .as_ref()
                    .expect("signature requested for a node whose children are not all computed")
                    .shape()
            })
            .collect();
        Signature::of(&patterns, &shapes, &node.indices)
    }

    /// Views of a scheduled node's operand tensors, in child order.
    ///
    /// # Panics
    /// Panics if some child has no value yet.
    pub(crate) fn child_operands(&self, id: NodeId) -> Vec<ArrayViewD<'_, T>> {
        self.nodes[id.0]
            .children()
            .iter()
            .map(|c| {
                self.nodes[c.0]
                    .value
                    .as_ref()
                    .expect("operand of a scheduled contraction is not computed")
                    .view()
            })
            .collect()
    }

    /// Move the root's value out of the tree.
    pub(crate) fn take_root_value(&mut self) -> Option<ArrayD<T>> {
        self.root.and_then(|r| self.nodes[r.0].value.take())
    }
}

/// Build a left-to-right linear contraction tree for a flat expression.
///
/// Operands are contracted in listed order; each intermediate step keeps
/// exactly the indices that later operands or the final output still need.
/// This is a default-order policy: callers wanting a better order should
/// build trees themselves or load them from an optimizer's plan.
///
/// # Panics
/// Panics if `leaves` does not supply one tensor per operand pattern, or if
/// the expression has no operands.
pub fn linear_tree<L: Label, T>(code: &EinCode<L>, leaves: Vec<ArrayD<T>>) -> ContractionTree<L, T> {
    let n = code.num_operands();
    assert!(n > 0, "an expression needs at least one operand");
    assert_eq!(
        leaves.len(),
        n,
        "one leaf tensor per operand pattern required"
    );

    let mut tree = ContractionTree::new(code.iy.clone());
    let ids: Vec<NodeId> = code
        .ixs
        .iter()
        .zip(leaves)
        .map(|(ix, value)| tree.leaf(ix.clone(), value))
        .collect();

    if n == 1 {
        if code.ixs[0] != code.iy {
            tree.contraction(vec![ids[0]], code.iy.clone());
        }
        return tree;
    }

    let mut acc = ids[0];
    let mut acc_ix: Vec<L> = code.ixs[0].clone();
    for k in 1..n {
        let out = if k == n - 1 {
            code.iy.clone()
        } else {
            let mut needed: HashSet<&L> = code.iy.iter().collect();
            for ix in &code.ixs[k + 1..] {
                needed.extend(ix.iter());
            }
            let mut out = Vec::new();
            for l in acc_ix.iter().chain(code.ixs[k].iter()) {
                if needed.contains(l) && !out.contains(l) {
                    out.push(l.clone());
                }
            }
            out
        };
        acc = tree.contraction(vec![acc, ids[k]], out.clone());
        acc_ix = out;
    }
    tree
}
