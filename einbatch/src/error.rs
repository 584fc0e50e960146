//! Error types for the batching engine.

use crate::eincode::ParseError;

/// Error raised by a [`Contractor`](crate::Contractor) implementation.
///
/// The engine never retries a failed primitive call; the error is wrapped
/// with group context and surfaced to the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PrimitiveError {
    message: String,
}

impl PrimitiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur while evaluating a collection of contraction trees.
///
/// Any error aborts the whole run; no partial results are returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A tree's structure is inconsistent: a node's output pattern does not
    /// follow from its children, a leaf lacks a value, or the tree has no
    /// unique root.
    #[error("malformed tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },

    /// Operands inside one batch group do not share identical shapes.
    ///
    /// Unreachable when grouping keys are computed correctly; its occurrence
    /// indicates an internal invariant violation and is surfaced rather than
    /// silently recovered.
    #[error("shape mismatch in group [{signature}]: {reason}")]
    ShapeMismatch { signature: String, reason: String },

    /// The external contraction primitive failed on a group.
    #[error("contraction primitive failed on group [{signature}] with {members} member(s)")]
    Primitive {
        signature: String,
        members: usize,
        #[source]
        source: PrimitiveError,
    },

    /// The supplied leaf tensors do not match what a tree declares, either in
    /// count or in shape. Detected before any contraction executes.
    #[error("incomplete input for tree {tree}: {reason}")]
    IncompleteInput { tree: usize, reason: String },

    /// An index-contraction expression could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_error_display() {
        let err = PrimitiveError::new("unsupported pattern");
        assert_eq!(err.to_string(), "unsupported pattern");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::MalformedTree {
            tree: 2,
            reason: "leaf node 0 has no value".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed tree 2: leaf node 0 has no value"
        );

        let err = EngineError::Primitive {
            signature: "ab, bc -> ac | (4, 4), (4, 4)".into(),
            members: 3,
            source: PrimitiveError::new("boom"),
        };
        assert!(err.to_string().contains("3 member(s)"));
    }

    #[test]
    fn test_primitive_error_is_source() {
        use std::error::Error;

        let err = EngineError::Primitive {
            signature: "a -> a | (2,)".into(),
            members: 1,
            source: PrimitiveError::new("boom"),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }
}
