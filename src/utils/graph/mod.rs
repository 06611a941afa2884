//! Generic directed graph infrastructure.
//!
//! The control flow graph is a thin, block-aware layer over the types in this
//! module. Keeping the graph generic lets the algorithms be tested on plain
//! payloads and reused wherever an arena of vertices with typed edges is
//! needed.
//!
//! # Key Components
//!
//! - [`NodeId`] / [`EdgeId`] - Strongly-typed arena indices
//! - [`DirectedGraph`] - Adjacency-list multigraph with vertex and edge removal
//! - [`algorithms`] - Traversals and dominators
//! - [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`] - Traits the algorithms consume
//!
//! # Identifiers and removal
//!
//! Removing a vertex tombstones its slot rather than compacting the arena.
//! Identifiers therefore stay valid (and unique) for the lifetime of the graph,
//! and [`GraphBase::node_bound`] is the right size for per-node side tables.

mod directed;
mod edge;
mod node;
mod traits;

pub mod algorithms;

pub use directed::DirectedGraph;
pub use edge::EdgeId;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
