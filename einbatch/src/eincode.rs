//! Index-contraction expressions.
//!
//! An [`EinCode`] names the index pattern of every operand and of the
//! output, in generalized einsum notation. It describes a single
//! contraction step or a whole flat expression; it carries no tensor data.
//!
//! ```rust
//! use einbatch::eincode::parse_eincode;
//!
//! let code = parse_eincode("ij,jk->ik").unwrap();
//! assert_eq!(code.ixs, vec![vec!['i', 'j'], vec!['j', 'k']]);
//! assert_eq!(code.iy, vec!['i', 'k']);
//! ```

use crate::label::Label;
use std::collections::HashMap;
use std::fmt;

/// An index-contraction expression: one pattern per operand plus the
/// output pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EinCode<L> {
    /// Index pattern of each operand, in operand order.
    pub ixs: Vec<Vec<L>>,
    /// Index pattern of the output.
    pub iy: Vec<L>,
}

impl<L: Label> EinCode<L> {
    pub fn new(ixs: Vec<Vec<L>>, iy: Vec<L>) -> Self {
        Self { ixs, iy }
    }

    /// Number of operands.
    pub fn num_operands(&self) -> usize {
        self.ixs.len()
    }

    /// All distinct labels, in first-occurrence order scanning the operand
    /// patterns left to right and then the output.
    pub fn unique_labels(&self) -> Vec<L> {
        let mut seen = Vec::new();
        for ix in self.ixs.iter().chain(std::iter::once(&self.iy)) {
            for l in ix {
                if !seen.contains(l) {
                    seen.push(l.clone());
                }
            }
        }
        seen
    }

    /// Shape of the output given the operand shapes, or `None` when the
    /// shapes are inconsistent with the patterns (wrong arity or rank, an
    /// index bound to two different extents, or an output index that no
    /// operand carries).
    pub fn output_shape(&self, shapes: &[Vec<usize>]) -> Option<Vec<usize>> {
        if shapes.len() != self.ixs.len() {
            return None;
        }
        let mut extents: HashMap<&L, usize> = HashMap::new();
        for (ix, shape) in self.ixs.iter().zip(shapes) {
            if ix.len() != shape.len() {
                return None;
            }
            for (l, &d) in ix.iter().zip(shape) {
                match extents.insert(l, d) {
                    Some(prev) if prev != d => return None,
                    _ => {}
                }
            }
        }
        self.iy.iter().map(|l| extents.get(l).copied()).collect()
    }
}

impl<L: fmt::Display> fmt::Display for EinCode<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ix) in self.ixs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            for l in ix {
                write!(f, "{}", l)?;
            }
        }
        write!(f, " -> ")?;
        for l in &self.iy {
            write!(f, "{}", l)?;
        }
        Ok(())
    }
}

/// Errors produced while parsing an einsum expression string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty einsum expression")]
    Empty,
    #[error("invalid character {0:?} in einsum expression")]
    InvalidCharacter(char),
    #[error("expected at most one '->' separator")]
    MultipleArrows,
    #[error("duplicate output index {0:?}")]
    DuplicateOutput(char),
    #[error("output index {0:?} does not appear in any operand")]
    UnknownOutput(char),
}

/// Parse an expression like `"ij,jk->ik"` into an [`EinCode`].
///
/// Labels are single ASCII letters; whitespace is ignored. Without an
/// explicit `->`, the output consists of the indices that occur exactly
/// once across the operands, in alphabetical order. An empty operand
/// segment denotes a rank-0 (scalar) operand.
pub fn parse_eincode(expr: &str) -> Result<EinCode<char>, ParseError> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

    let mut parts = compact.split("->");
    let lhs = parts.next().unwrap_or("");
    let rhs = parts.next();
    if parts.next().is_some() {
        return Err(ParseError::MultipleArrows);
    }
    if lhs.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut ixs = Vec::new();
    for segment in lhs.split(',') {
        let mut ix = Vec::new();
        for c in segment.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(ParseError::InvalidCharacter(c));
            }
            ix.push(c);
        }
        ixs.push(ix);
    }

    let iy = match rhs {
        Some(out) => {
            let mut iy = Vec::new();
            for c in out.chars() {
                if !c.is_ascii_alphabetic() {
                    return Err(ParseError::InvalidCharacter(c));
                }
                if iy.contains(&c) {
                    return Err(ParseError::DuplicateOutput(c));
                }
                if !ixs.iter().any(|ix| ix.contains(&c)) {
                    return Err(ParseError::UnknownOutput(c));
                }
                iy.push(c);
            }
            iy
        }
        None => implicit_output(&ixs),
    };

    Ok(EinCode::new(ixs, iy))
}

/// Indices occurring exactly once across all operands, sorted.
fn implicit_output(ixs: &[Vec<char>]) -> Vec<char> {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for ix in ixs {
        for &c in ix {
            *counts.entry(c).or_insert(0) += 1;
        }
    }
    let mut out: Vec<char> = counts
        .into_iter()
        .filter(|&(_, n)| n == 1)
        .map(|(c, _)| c)
        .collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explicit_output() {
        let code = parse_eincode("ij,jk->ik").unwrap();
        assert_eq!(code.ixs, vec![vec!['i', 'j'], vec!['j', 'k']]);
        assert_eq!(code.iy, vec!['i', 'k']);
        assert_eq!(code.num_operands(), 2);
    }

    #[test]
    fn test_parse_ignores_whitespace() {
        let code = parse_eincode(" i j , j k -> i k ").unwrap();
        assert_eq!(code, parse_eincode("ij,jk->ik").unwrap());
    }

    #[test]
    fn test_parse_implicit_output() {
        // Indices occurring once, alphabetically ordered.
        let code = parse_eincode("ij,jk").unwrap();
        assert_eq!(code.iy, vec!['i', 'k']);

        let code = parse_eincode("kj,ji").unwrap();
        assert_eq!(code.iy, vec!['i', 'k']);
    }

    #[test]
    fn test_parse_implicit_trace() {
        let code = parse_eincode("ii").unwrap();
        assert_eq!(code.iy, Vec::<char>::new());
    }

    #[test]
    fn test_parse_explicit_scalar_output() {
        let code = parse_eincode("ij,ji->").unwrap();
        assert_eq!(code.iy, Vec::<char>::new());
    }

    #[test]
    fn test_parse_scalar_operand() {
        let code = parse_eincode("i,->i").unwrap();
        assert_eq!(code.ixs, vec![vec!['i'], vec![]]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_eincode(""), Err(ParseError::Empty));
        assert_eq!(parse_eincode("->ik"), Err(ParseError::Empty));
        assert_eq!(
            parse_eincode("i1,jk->ik"),
            Err(ParseError::InvalidCharacter('1'))
        );
        assert_eq!(parse_eincode("a->b->c"), Err(ParseError::MultipleArrows));
        assert_eq!(
            parse_eincode("ij,jk->ii"),
            Err(ParseError::DuplicateOutput('i'))
        );
        assert_eq!(
            parse_eincode("ij,jk->iz"),
            Err(ParseError::UnknownOutput('z'))
        );
    }

    #[test]
    fn test_unique_labels_first_occurrence_order() {
        let code = parse_eincode("kj,ji->ik").unwrap();
        assert_eq!(code.unique_labels(), vec!['k', 'j', 'i']);
    }

    #[test]
    fn test_output_shape() {
        let code = parse_eincode("ij,jk->ik").unwrap();
        assert_eq!(
            code.output_shape(&[vec![4, 5], vec![5, 7]]),
            Some(vec![4, 7])
        );
        // Conflicting extent for j.
        assert_eq!(code.output_shape(&[vec![4, 5], vec![6, 7]]), None);
        // Wrong rank.
        assert_eq!(code.output_shape(&[vec![4], vec![5, 7]]), None);
        // Wrong arity.
        assert_eq!(code.output_shape(&[vec![4, 5]]), None);
    }

    #[test]
    fn test_display() {
        let code = parse_eincode("ij,jk->ik").unwrap();
        assert_eq!(code.to_string(), "ij, jk -> ik");

        let scalar = parse_eincode("ij,ji->").unwrap();
        assert_eq!(scalar.to_string(), "ij, ji -> ");
    }
}
