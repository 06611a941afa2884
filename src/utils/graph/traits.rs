//! Trait definitions for graph abstractions.
//!
//! Algorithms in [`super::algorithms`] are written against these traits rather
//! than a concrete graph type, so the same traversal code serves the raw
//! [`super::DirectedGraph`] and the [`crate::cfg::Cfg`] wrapper.
//!
//! - [`GraphBase`] - Arena bound and live node iteration
//! - [`Successors`] - Forward adjacency
//! - [`Predecessors`] - Backward adjacency
//! - [`RootedGraph`] - Graphs with a designated entry node

use crate::utils::graph::NodeId;

/// Core graph properties.
pub trait GraphBase {
    /// Upper bound (exclusive) of every node index ever handed out.
    ///
    /// Removed vertices leave holes, so this can exceed the number of live
    /// nodes. Algorithms size their per-node tables with it.
    fn node_bound(&self) -> usize;

    /// Iterates the identifiers of live nodes in increasing index order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward adjacency.
pub trait Successors: GraphBase {
    /// Iterates the direct successors of `node`, in edge insertion order.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward adjacency.
pub trait Predecessors: GraphBase {
    /// Iterates the direct predecessors of `node`, in edge insertion order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a single designated entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// The entry node.
    fn entry(&self) -> NodeId;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EdgeListGraph {
        bound: usize,
        edges: Vec<(usize, usize)>,
    }

    impl GraphBase for EdgeListGraph {
        fn node_bound(&self) -> usize {
            self.bound
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.bound).map(NodeId::new)
        }
    }

    impl Successors for EdgeListGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(src, _)| *src == node.index())
                .map(|(_, dst)| NodeId::new(*dst))
        }
    }

    impl Predecessors for EdgeListGraph {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(_, dst)| *dst == node.index())
                .map(|(src, _)| NodeId::new(*src))
        }
    }

    impl RootedGraph for EdgeListGraph {
        fn entry(&self) -> NodeId {
            NodeId::new(0)
        }
    }

    #[test]
    fn test_trait_adjacency() {
        let graph = EdgeListGraph {
            bound: 3,
            edges: vec![(0, 1), (0, 2), (1, 2)],
        };
        assert_eq!(graph.node_ids().count(), 3);
        assert_eq!(
            graph.successors(NodeId::new(0)).collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert_eq!(graph.predecessors(NodeId::new(2)).count(), 2);
        assert_eq!(graph.entry(), NodeId::new(0));
    }
}
