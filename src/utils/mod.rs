//! Shared utilities: bit vectors, DOT escaping, and the generic graph.

mod bitset;
mod dot;

pub mod graph;

pub use bitset::{BitSet, BitSetIter};
pub use dot::escape_dot;
