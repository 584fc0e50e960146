//! Index label abstraction.
//!
//! Contraction patterns are sequences of labels naming tensor axes. The
//! engine never interprets labels beyond equality; `char` is the usual
//! choice for parsed expressions, `usize` or `String` for generated trees.

use std::fmt::Debug;
use std::hash::Hash;

/// Trait bound for index labels.
///
/// Anything clonable, hashable, orderable and debuggable can serve as a
/// label type. Implemented automatically.
pub trait Label: Clone + Eq + Hash + Ord + Debug {}

impl<T: Clone + Eq + Hash + Ord + Debug> Label for T {}
