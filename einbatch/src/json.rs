//! JSON import and export of contraction plans.
//!
//! A plan is the tensor-network-native description of a tree: leaf patterns,
//! requested output, and a nested contraction order. The format is
//! compatible with Julia's OMEinsumContractionOrders.jl, so plans produced
//! by its optimizers can be executed here directly.
//!
//! # Example
//!
//! ```rust
//! use einbatch::json::{from_json_string, TreePlan};
//! use einbatch::{batch_contract, BatchPolicy, NaiveContractor};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let plan: TreePlan<char> = from_json_string(
//!     r#"{
//!         "label-type": "Char",
//!         "inputs": [["i", "j"], ["j", "k"]],
//!         "output": ["i", "k"],
//!         "tree": {
//!             "isleaf": false,
//!             "args": [{"isleaf": true, "tensorindex": 0},
//!                      {"isleaf": true, "tensorindex": 1}],
//!             "eins": {"ixs": [["i", "j"], ["j", "k"]], "iy": ["i", "k"]}
//!         }
//!     }"#,
//! )
//! .unwrap();
//!
//! let a = ArrayD::from_elem(IxDyn(&[2, 3]), 1.0);
//! let b = ArrayD::from_elem(IxDyn(&[3, 2]), 1.0);
//! let tree = plan.build(vec![a, b]).unwrap();
//! let outputs = batch_contract(vec![tree], &NaiveContractor, &BatchPolicy::default()).unwrap();
//! assert_eq!(outputs[0].shape(), &[2, 2]);
//! assert_eq!(outputs[0].sum(), 12.0);
//! ```

use crate::label::Label;
use crate::tree::{ContractionTree, NodeId};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Error type for JSON operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    /// Reading or writing the file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not well-formed JSON for this format.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// The plan uses a format feature this engine does not execute.
    #[error("unsupported plan feature: {0}")]
    Unsupported(String),
    /// The plan is structurally inconsistent.
    #[error("invalid plan: {0}")]
    Plan(String),
    /// The number of leaf tensors does not match the plan.
    #[error("plan declares {expected} leaf tensors, got {got}")]
    LeafCount { expected: usize, got: usize },
}

/// How the plan's labels deserialize; Julia writes this field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LabelType {
    /// Labels are characters ('i', 'j', ...).
    Char,
    /// Labels are 64-bit integers.
    Int64,
    /// Labels are machine-size integers.
    Int,
}

/// A contraction plan: leaf patterns, output, and nesting order, without
/// tensor data. One plan can be built into many trees, one per set of
/// leaf tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePlan<L: Label> {
    /// Index pattern of each leaf tensor, in tensor-index order.
    pub inputs: Vec<Vec<L>>,
    /// Requested output indices of the whole plan.
    pub output: Vec<L>,
    tree: PlanTree<L>,
}

/// JSON format for contraction plans (Julia-compatible).
///
/// Format:
/// ```json
/// {
///   "label-type": "Char",
///   "inputs": [["i", "j"], ["j", "k"]],
///   "output": ["i", "k"],
///   "tree": { ... },
///   "slices": ["j"]  // optional, rejected here unless empty
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PlanJson<L: Label> {
    label_type: LabelType,
    /// Leaf patterns, in tensor-index order.
    inputs: Vec<Vec<L>>,
    /// Output indices of the whole plan.
    output: Vec<L>,
    /// Nested contraction order.
    tree: PlanTree<L>,
    /// Indices the optimizer chose to slice over, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    slices: Option<Vec<L>>,
}

/// Tree node structure matching Julia's JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanTree<L: Label> {
    /// Reference to one input tensor.
    Leaf {
        /// `true` on this variant.
        isleaf: bool,
        /// 0-based position in `inputs`.
        #[serde(rename = "tensorindex")]
        tensor_index: usize,
    },
    /// One contraction step over child subtrees.
    Node {
        /// `false` on this variant.
        isleaf: bool,
        /// Operand subtrees, in operand order.
        args: Vec<PlanTree<L>>,
        /// The equation joining the children.
        eins: EinsJson<L>,
    },
}

/// JSON-compatible equation at a contraction node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EinsJson<L: Label> {
    /// Index pattern of each child
    pub ixs: Vec<Vec<L>>,
    /// Output indices of this node
    pub iy: Vec<L>,
}

impl<L: Label> TreePlan<L> {
    /// Build an executable tree from this plan and one tensor per input
    /// slot. The plan's structure is checked as the tree is assembled, so
    /// a malformed plan fails here rather than at run time.
    pub fn build<T>(&self, leaves: Vec<ArrayD<T>>) -> Result<ContractionTree<L, T>, JsonError> {
        if leaves.len() != self.inputs.len() {
            return Err(JsonError::LeafCount {
                expected: self.inputs.len(),
                got: leaves.len(),
            });
        }
        let mut slots: Vec<Option<ArrayD<T>>> = leaves.into_iter().map(Some).collect();
        let mut tree = ContractionTree::new(self.output.clone());
        build_node(&mut tree, &self.tree, &self.inputs, &mut slots)?;
        if let Some(unused) = slots.iter().position(Option::is_some) {
            return Err(JsonError::Plan(format!(
                "input tensor {} is not referenced by the plan",
                unused
            )));
        }
        Ok(tree)
    }

    /// Extract the plan of an executable tree. Leaves are numbered in the
    /// order they were added. Fails if the tree does not have exactly one
    /// root or shares nodes, neither of which the plan format can express.
    pub fn from_tree<T>(tree: &ContractionTree<L, T>) -> Result<TreePlan<L>, JsonError> {
        let mut parented = vec![false; tree.len()];
        for i in 0..tree.len() {
            for &child in tree.node(NodeId(i)).children() {
                parented[child.index()] = true;
            }
        }
        let roots: Vec<usize> = (0..tree.len()).filter(|&i| !parented[i]).collect();
        let root = match roots.as_slice() {
            [only] => NodeId(*only),
            _ => {
                return Err(JsonError::Plan(format!(
                    "tree has {} roots, expected exactly one",
                    roots.len()
                )))
            }
        };

        let mut inputs = Vec::new();
        let mut leaf_slot = vec![usize::MAX; tree.len()];
        for i in 0..tree.len() {
            let node = tree.node(NodeId(i));
            if node.is_leaf() {
                leaf_slot[i] = inputs.len();
                inputs.push(node.indices().to_vec());
            }
        }

        let mut seen = vec![false; tree.len()];
        let plan_tree = plan_node(tree, root, &leaf_slot, &mut seen)?;
        Ok(TreePlan {
            inputs,
            output: tree.output().to_vec(),
            tree: plan_tree,
        })
    }
}

fn build_node<L: Label, T>(
    tree: &mut ContractionTree<L, T>,
    node: &PlanTree<L>,
    inputs: &[Vec<L>],
    slots: &mut [Option<ArrayD<T>>],
) -> Result<NodeId, JsonError> {
    match node {
        PlanTree::Leaf { tensor_index, .. } => {
            let ti = *tensor_index;
            if ti >= inputs.len() {
                return Err(JsonError::Plan(format!(
                    "leaf tensor index {} is out of range for {} inputs",
                    ti,
                    inputs.len()
                )));
            }
            match slots[ti].take() {
                Some(value) => Ok(tree.leaf(inputs[ti].clone(), value)),
                None => Err(JsonError::Plan(format!(
                    "input tensor {} is referenced more than once",
                    ti
                ))),
            }
        }
        PlanTree::Node { args, eins, .. } => {
            if args.is_empty() {
                return Err(JsonError::Plan("contraction node has no children".into()));
            }
            if eins.ixs.len() != args.len() {
                return Err(JsonError::Plan(format!(
                    "node lists {} operand patterns for {} children",
                    eins.ixs.len(),
                    args.len()
                )));
            }
            let mut children = Vec::with_capacity(args.len());
            for arg in args {
                children.push(build_node(tree, arg, inputs, slots)?);
            }
            for (i, &child) in children.iter().enumerate() {
                if tree.node(child).indices() != eins.ixs[i].as_slice() {
                    return Err(JsonError::Plan(format!(
                        "child {} carries pattern {:?}, the node expects {:?}",
                        i,
                        tree.node(child).indices(),
                        eins.ixs[i]
                    )));
                }
            }
            Ok(tree.contraction(children, eins.iy.clone()))
        }
    }
}

fn plan_node<L: Label, T>(
    tree: &ContractionTree<L, T>,
    id: NodeId,
    leaf_slot: &[usize],
    seen: &mut [bool],
) -> Result<PlanTree<L>, JsonError> {
    if seen[id.index()] {
        return Err(JsonError::Plan(
            "tree shares nodes, which the plan format cannot express".into(),
        ));
    }
    seen[id.index()] = true;

    let node = tree.node(id);
    if node.is_leaf() {
        return Ok(PlanTree::Leaf {
            isleaf: true,
            tensor_index: leaf_slot[id.index()],
        });
    }
    let mut args = Vec::with_capacity(node.children().len());
    let mut ixs = Vec::with_capacity(node.children().len());
    for &child in node.children() {
        ixs.push(tree.node(child).indices().to_vec());
        args.push(plan_node(tree, child, leaf_slot, seen)?);
    }
    Ok(PlanTree::Node {
        isleaf: false,
        args,
        eins: EinsJson {
            ixs,
            iy: node.indices().to_vec(),
        },
    })
}

// ============================================================================
// Public API
// ============================================================================

/// Write a contraction plan to a JSON file.
pub fn writejson<L, P>(path: P, plan: &TreePlan<L>) -> Result<(), JsonError>
where
    L: Label + Serialize,
    P: AsRef<Path>,
{
    let json_str = to_json_string(plan)?;
    std::fs::write(path, json_str)?;
    Ok(())
}

/// Write a contraction plan to a JSON string.
pub fn to_json_string<L: Label + Serialize>(plan: &TreePlan<L>) -> Result<String, JsonError> {
    let wire = PlanJson {
        label_type: detect_label_type::<L>(),
        inputs: plan.inputs.clone(),
        output: plan.output.clone(),
        tree: plan.tree.clone(),
        slices: None,
    };
    Ok(serde_json::to_string_pretty(&wire)?)
}

/// Read a contraction plan from a JSON file.
///
/// Plans with a non-empty `slices` field are rejected: slicing trades
/// memory for extra passes and is a different execution strategy.
pub fn readjson<L, P>(path: P) -> Result<TreePlan<L>, JsonError>
where
    L: Label + for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let json: PlanJson<L> = serde_json::from_reader(reader)?;
    json_to_plan(json)
}

/// Read a contraction plan from a JSON string.
pub fn from_json_string<L>(s: &str) -> Result<TreePlan<L>, JsonError>
where
    L: Label + for<'de> Deserialize<'de>,
{
    let json: PlanJson<L> = serde_json::from_str(s)?;
    json_to_plan(json)
}

fn json_to_plan<L: Label>(json: PlanJson<L>) -> Result<TreePlan<L>, JsonError> {
    if let Some(slices) = &json.slices {
        if !slices.is_empty() {
            return Err(JsonError::Unsupported(
                "sliced contraction plans are not executable here".into(),
            ));
        }
    }
    Ok(TreePlan {
        inputs: json.inputs,
        output: json.output,
        tree: json.tree,
    })
}

/// Detect the label type for JSON metadata.
fn detect_label_type<L: Label>() -> LabelType {
    let type_name = std::any::type_name::<L>();
    if type_name.contains("char") {
        LabelType::Char
    } else {
        LabelType::Int64
    }
}

// ============================================================================
// Tests
// ============================================================================
