//! Canonical contraction signatures.
//!
//! A [`Signature`] encodes what a contraction step does, independent of the
//! index names its tree happens to use: the operand patterns and the output
//! pattern relabeled to a canonical alphabet, plus the exact operand shapes.
//! Two ready nodes with equal signatures perform structurally identical
//! contractions on identically shaped data and can run as one batched call.

use crate::eincode::EinCode;
use crate::label::Label;
use std::collections::HashMap;
use std::fmt;

/// Relabel patterns to the canonical alphabet `0, 1, 2, ...`.
///
/// Fresh labels are assigned on first occurrence, scanning the operand
/// patterns left to right and then the output. Pure function: two pattern
/// sets related by a consistent renaming map to the same result.
pub fn canonical_relabel<L: Label>(
    patterns: &[&[L]],
    output: &[L],
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut map: HashMap<&L, usize> = HashMap::new();
    let ixs = patterns.iter().map(|p| relabel(&mut map, p)).collect();
    let iy = relabel(&mut map, output);
    (ixs, iy)
}

fn relabel<'a, L: Label>(map: &mut HashMap<&'a L, usize>, pattern: &'a [L]) -> Vec<usize> {
    pattern
        .iter()
        .map(|l| {
            let next = map.len();
            *map.entry(l).or_insert(next)
        })
        .collect()
}

/// Canonical key deciding whether two contraction steps are
/// batch-compatible.
///
/// Equality covers the canonicalized operand patterns in order, the
/// canonicalized output pattern, and the exact shape of every operand.
/// Matching ranks alone is not enough: a `(4, 4) x (4, 4)` matmul and a
/// `(3, 5) x (5, 7)` matmul share a pattern but cannot be stacked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ixs: Vec<Vec<usize>>,
    iy: Vec<usize>,
    shapes: Vec<Vec<usize>>,
}

impl Signature {
    /// Build the signature of a contraction step from its operand patterns,
    /// the concrete operand shapes, and its output pattern.
    ///
    /// Total over well-formed steps; shape/pattern rank agreement is the
    /// caller's responsibility (checked when trees are validated).
    pub fn of<L: Label>(patterns: &[&[L]], shapes: &[&[usize]], output: &[L]) -> Self {
        debug_assert_eq!(patterns.len(), shapes.len());
        let (ixs, iy) = canonical_relabel(patterns, output);
        Self {
            ixs,
            iy,
            shapes: shapes.iter().map(|s| s.to_vec()).collect(),
        }
    }

    /// Number of operands.
    pub fn arity(&self) -> usize {
        self.ixs.len()
    }

    /// Exact shape of every operand, in operand order.
    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    /// The canonical contraction, as handed to the primitive for unbatched
    /// execution.
    pub fn code(&self) -> EinCode<usize> {
        EinCode::new(self.ixs.clone(), self.iy.clone())
    }

    /// The canonical contraction with a fresh batch index prefixed to every
    /// operand pattern and to the output.
    ///
    /// The batch index is broadcast, not contracted: members stacked along
    /// the new leading axis are evaluated independently in one call.
    pub fn batched_code(&self) -> EinCode<usize> {
        let batch = self.fresh_label();
        let prefix = |pattern: &[usize]| -> Vec<usize> {
            let mut p = Vec::with_capacity(pattern.len() + 1);
            p.push(batch);
            p.extend_from_slice(pattern);
            p
        };
        EinCode::new(
            self.ixs.iter().map(|ix| prefix(ix)).collect(),
            prefix(&self.iy),
        )
    }

    /// Smallest label not used by the canonical patterns.
    fn fresh_label(&self) -> usize {
        self.ixs
            .iter()
            .chain(std::iter::once(&self.iy))
            .flatten()
            .max()
            .map_or(0, |m| m + 1)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ix) in self.ixs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            for &l in ix {
                write_canonical_label(f, l)?;
            }
        }
        write!(f, " -> ")?;
        for &l in &self.iy {
            write_canonical_label(f, l)?;
        }
        write!(f, " | ")?;
        for (i, shape) in self.shapes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write_shape(f, shape)?;
        }
        Ok(())
    }
}

fn write_canonical_label(f: &mut fmt::Formatter<'_>, l: usize) -> fmt::Result {
    if l < 26 {
        write!(f, "{}", (b'a' + l as u8) as char)
    } else if l < 52 {
        write!(f, "{}", (b'A' + (l - 26) as u8) as char)
    } else {
        write!(f, "_{}", l)
    }
}

fn write_shape(f: &mut fmt::Formatter<'_>, shape: &[usize]) -> fmt::Result {
    write!(f, "(")?;
    for (i, d) in shape.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", d)?;
    }
    if shape.len() == 1 {
        write!(f, ",")?;
    }
    write!(f, ")")
}
