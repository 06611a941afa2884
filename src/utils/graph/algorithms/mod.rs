//! Graph algorithms shared by the CFG and the analyses built on it.
//!
//! - [`postorder`], [`reverse_postorder`], [`postorder_all`] - Deterministic DFS orderings
//! - [`compute_dominators`] - Dominator tree construction

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, compute_dominators_rooted, DominatorTree};
pub use traversal::{postorder, postorder_all, reverse_postorder};
