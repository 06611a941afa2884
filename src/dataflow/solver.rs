//! Worklist-based dataflow solver.
//!
//! # Algorithm
//!
//! 1. Show every block to the problem so it can register its facts; stop if
//!    the problem reports itself empty
//! 2. Build and initialize one node per block
//! 3. Seed the worklist with every block, in reverse postorder for forward
//!    problems and postorder for backward ones
//! 4. Pop a block, recompute its IN (forward) or OUT (backward) as the meet
//!    over its neighbours, apply the transfer function and, if the result
//!    changed, enqueue every neighbour that is not already pending
//! 5. Stop when the worklist is empty and call the finalize hook
//!
//! The boundary fact is pinned at ENTRY (forward) or EXIT (backward). A dirty
//! [`BitSet`] indexed by block id tracks pending blocks.

use std::collections::VecDeque;

use log::debug;

use crate::{
    cfg::Cfg,
    dataflow::{DataFlowProblem, DataFlowSolution, Direction, FlowGraphNode},
    ir::BlockId,
    utils::{graph::GraphBase, BitSet},
    Error, Result,
};

/// Default ceiling on node visits before giving up.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Computes meet-over-paths solutions.
#[derive(Debug, Clone, Copy)]
pub struct DataFlowSolver {
    max_iterations: usize,
}

impl Default for DataFlowSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFlowSolver {
    /// Creates a solver with the default iteration ceiling.
    #[must_use]
    pub const fn new() -> Self {
        DataFlowSolver {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Creates a solver that fails after `max_iterations` node visits.
    #[must_use]
    pub const fn with_max_iterations(max_iterations: usize) -> Self {
        DataFlowSolver { max_iterations }
    }

    /// The iteration ceiling.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Solves `problem` over `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for bidirectional problems and
    /// [`Error::NonConvergent`] if the iteration ceiling is exceeded.
    pub fn compute_mop_solution<P: DataFlowProblem>(
        &self,
        problem: &mut P,
        cfg: &Cfg,
    ) -> Result<DataFlowSolution<P::Fact>> {
        let direction = problem.direction();
        if direction == Direction::Bidirectional {
            return Err(Error::NotSupported(format!(
                "bidirectional dataflow problem {}",
                problem.name()
            )));
        }

        for block in cfg.blocks() {
            problem.build_data_flow_vars(block);
        }
        if problem.is_empty() {
            debug!("{}: empty problem, skipped", problem.name());
            return Ok(DataFlowSolution::empty(problem.name()));
        }

        let bound = cfg.node_bound();
        let initial = problem.initial();
        let mut nodes: Vec<Option<FlowGraphNode<P::Fact>>> = (0..bound).map(|_| None).collect();
        for block in cfg.blocks() {
            let mut node = problem.build_flow_graph_node(block);
            node.init(&initial);
            nodes[block.id().index()] = Some(node);
        }

        let boundary = problem.boundary();
        let order = match direction {
            Direction::Forward => {
                if let Some(node) = nodes[cfg.entry().index()].as_mut() {
                    node.set_input(boundary.clone());
                }
                cfg.reverse_postorder()
            }
            _ => {
                if let Some(node) = nodes[cfg.exit().index()].as_mut() {
                    node.set_output(boundary.clone());
                }
                cfg.postorder()
            }
        };

        let mut worklist: VecDeque<BlockId> = order.into_iter().collect();
        let mut dirty = BitSet::new(bound);
        for id in &worklist {
            dirty.insert(id.index());
        }

        let mut iterations = 0;
        while let Some(id) = worklist.pop_front() {
            dirty.remove(id.index());
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(Error::NonConvergent {
                    problem: problem.name(),
                    iterations,
                });
            }
            let Some(block) = cfg.block(id) else {
                continue;
            };

            let changed = match direction {
                Direction::Forward => {
                    let input = if id == cfg.entry() {
                        boundary.clone()
                    } else {
                        let mut acc = initial.clone();
                        for (pred, ty) in cfg.incoming(id) {
                            if let Some(from) = nodes[pred.index()].as_ref() {
                                problem.meet(&mut acc, from, ty);
                            }
                        }
                        acc
                    };
                    let output = problem.transfer(block, &input);
                    update(&mut nodes[id.index()], input, output, |n| n.output().clone())
                }
                _ => {
                    let output = if id == cfg.exit() {
                        boundary.clone()
                    } else {
                        let mut acc = initial.clone();
                        for (succ, ty) in cfg.outgoing(id) {
                            if let Some(from) = nodes[succ.index()].as_ref() {
                                problem.meet(&mut acc, from, ty);
                            }
                        }
                        acc
                    };
                    let input = problem.transfer(block, &output);
                    update(&mut nodes[id.index()], input, output, |n| n.input().clone())
                }
            };

            if changed {
                let neighbours: Vec<BlockId> = match direction {
                    Direction::Forward => cfg.outgoing(id).map(|(dst, _)| dst).collect(),
                    _ => cfg.incoming(id).map(|(src, _)| src).collect(),
                };
                for next in neighbours {
                    if dirty.insert(next.index()) {
                        worklist.push_back(next);
                    }
                }
            }
        }

        debug!(
            "{}: fixed point after {} iterations over {} blocks",
            problem.name(),
            iterations,
            cfg.block_count()
        );

        let solved: Vec<FlowGraphNode<P::Fact>> = nodes.iter().flatten().cloned().collect();
        problem.finalize(cfg, &solved);
        Ok(DataFlowSolution::new(problem.name(), nodes, iterations))
    }
}

/// Stores new facts and reports whether the propagated side changed.
fn update<F: Clone + PartialEq>(
    slot: &mut Option<FlowGraphNode<F>>,
    input: F,
    output: F,
    propagated: impl Fn(&FlowGraphNode<F>) -> F,
) -> bool {
    let Some(node) = slot.as_mut() else {
        return false;
    };
    let before = propagated(node);
    node.set_input(input);
    node.set_output(output);
    propagated(node) != before
}
