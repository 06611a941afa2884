//! Depth-first orderings.
//!
//! All traversals here are iterative, use an explicit visited table indexed by
//! node id, and follow successors in edge insertion order. For a fixed graph
//! the produced order is therefore always the same, which keeps dataflow
//! results and printed IR reproducible across runs.
//!
//! - [`postorder`] - Post-order of the nodes reachable from a start node
//! - [`reverse_postorder`] - Its reverse (preferred for forward problems)
//! - [`postorder_all`] - Post-order that also covers nodes not reachable from the start

use crate::utils::graph::{NodeId, Successors};

#[derive(Clone, Copy)]
enum Visit {
    Enter,
    Exit,
}

fn postorder_from<G: Successors>(
    graph: &G,
    start: NodeId,
    visited: &mut [bool],
    out: &mut Vec<NodeId>,
) {
    let mut stack = vec![(start, Visit::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            Visit::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, Visit::Exit));

                // Reverse push so the first successor is explored first
                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, Visit::Enter));
                    }
                }
            }
            Visit::Exit => out.push(node),
        }
    }
}

/// Computes the post-order of nodes reachable from `start`.
///
/// A node appears after all of its DFS descendants.
///
/// # Examples
///
/// ```rust
/// use irscope::utils::graph::{algorithms::postorder, DirectedGraph};
///
/// let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
/// let a = graph.add_node(());
/// let b = graph.add_node(());
/// let c = graph.add_node(());
/// graph.add_edge(a, b, ())?;
/// graph.add_edge(b, c, ())?;
///
/// assert_eq!(postorder(&graph, a), vec![c, b, a]);
/// # Ok::<(), irscope::Error>(())
/// ```
#[must_use]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let bound = graph.node_bound();
    if start.index() >= bound {
        return Vec::new();
    }

    let mut visited = vec![false; bound];
    let mut result = Vec::with_capacity(bound);
    postorder_from(graph, start, &mut visited, &mut result);
    result
}

/// Computes the reverse post-order of nodes reachable from `start`.
///
/// In an acyclic region every node precedes its successors, which is the
/// iteration order that makes forward dataflow converge fastest.
#[must_use]
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

/// Computes a post-order that covers every live node.
///
/// Nodes reachable from `start` come first. Any node left unvisited (for
/// example a rescue block only reachable through a removed exception edge)
/// then seeds another DFS, in increasing id order, until every live node has
/// been emitted exactly once.
#[must_use]
pub fn postorder_all<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let bound = graph.node_bound();
    let mut visited = vec![false; bound];
    let mut result = Vec::with_capacity(bound);

    if start.index() < bound {
        postorder_from(graph, start, &mut visited, &mut result);
    }
    let remaining: Vec<NodeId> = graph.node_ids().collect();
    for node in remaining {
        if !visited[node.index()] {
            postorder_from(graph, node, &mut visited, &mut result);
        }
    }
    result
}
