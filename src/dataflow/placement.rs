//! Placement of binding loads and stores.
//!
//! Locals that a closure or an escaped binding can observe live in a heap
//! binding as well as in their local slot. The interpreter works on the slot,
//! so the two copies have to be synchronized explicitly:
//!
//! - [`BindingStorePlacement`] tracks slots written since the last store
//!   ("dirty") and inserts `StoreLocalVar` before anything that can hand
//!   control to foreign code or leave the scope.
//! - [`BindingLoadPlacement`] tracks slots known to match the binding
//!   ("available") and inserts `LoadLocalVar` before a use of a slot that a
//!   closure call may have changed.
//!
//! Dirty slots are flushed before every instruction that can raise, at every
//! scope exit, and at the end of any block that flows into a merge point.
//! Dirty state therefore never merges with "binding is authoritative" state,
//! which keeps every load placed on demand correct on all incoming paths.

use rustc_hash::FxHashSet;

use crate::{
    cfg::{Cfg, EdgeType},
    dataflow::{DataFlowProblem, DataFlowSolution, DataFlowVars, Direction, FlowGraphNode},
    ir::{BasicBlock, BlockId, Instr, IrScope, ScopeFlags, Variable, SCOPE_CAPTURING_METHODS},
    utils::BitSet,
};

/// Cache key of the store placement problem.
pub const STORE_PLACEMENT: &str = "BindingStorePlacement";

/// Cache key of the load placement problem.
pub const LOAD_PLACEMENT: &str = "BindingLoadPlacement";

/// Locals of `scope` that are backed by a heap binding, sorted.
///
/// These are the locals nested closures capture, the locals borrowed from
/// enclosing scopes, and every local when the binding may be observed by
/// `eval` or an escaped closure.
#[must_use]
pub fn binding_variables(scope: &IrScope) -> Vec<Variable> {
    let mut vars: FxHashSet<Variable> = scope.captured_locals();
    vars.extend(scope.parent_locals());
    if scope
        .flags()
        .intersects(ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::USES_EVAL)
    {
        for instr in scope.all_instrs() {
            let defined = instr.result().into_iter().cloned();
            for var in instr.used_variables().into_iter().chain(defined) {
                if var.is_local() {
                    vars.insert(var);
                }
            }
        }
    }
    let mut vars: Vec<Variable> = vars.into_iter().collect();
    vars.sort();
    vars
}

fn registry(vars: &[Variable]) -> DataFlowVars {
    let mut registry = DataFlowVars::new();
    for var in vars {
        registry.register(var);
    }
    registry
}

fn flushes_before(instr: &Instr) -> bool {
    instr.can_raise_exception() || instr.is_scope_exit()
}

fn captures_binding(instr: &Instr) -> bool {
    matches!(instr, Instr::Call(call)
        if call.closure.is_some() || SCOPE_CAPTURING_METHODS.contains(&call.method.name.as_str()))
}

/// Index at which end-of-block code goes: before a trailing jump or branch.
fn end_position(block: &[Instr]) -> usize {
    match block.last() {
        Some(last) if last.transfers_control() => block.len() - 1,
        _ => block.len(),
    }
}

fn stores_for(vars: &DataFlowVars, dirty: &BitSet) -> Vec<Instr> {
    vars.variables_in(dirty)
        .into_iter()
        .map(|local| Instr::StoreLocalVar { local })
        .collect()
}

/// Forward "dirty binding slot" analysis with union as meet.
#[derive(Debug, Clone)]
pub struct BindingStorePlacement {
    vars: DataFlowVars,
    flush_at_end: FxHashSet<BlockId>,
}

impl BindingStorePlacement {
    /// Prepares the problem for `scope`, whose CFG must already be built.
    #[must_use]
    pub fn new(scope: &IrScope) -> Self {
        let vars = registry(&binding_variables(scope));
        let mut flush_at_end = FxHashSet::default();
        if let Some(cfg) = scope.cfg() {
            for block in cfg.blocks() {
                let merges = cfg.outgoing(block.id()).any(|(succ, ty)| {
                    !ty.is_exceptional() && (succ == cfg.exit() || cfg.in_degree(succ) > 1)
                });
                if merges {
                    flush_at_end.insert(block.id());
                }
            }
        }
        BindingStorePlacement { vars, flush_at_end }
    }

    fn step(&self, instr: &Instr, dirty: &mut BitSet) {
        if flushes_before(instr) {
            dirty.clear();
        }
        match instr {
            Instr::StoreLocalVar { local } => {
                if let Some(i) = self.vars.index_of(local) {
                    dirty.remove(i);
                }
            }
            Instr::LoadLocalVar { .. } => {}
            _ => {
                if let Some(i) = instr.result().and_then(|r| self.vars.index_of(r)) {
                    dirty.insert(i);
                }
            }
        }
    }

    /// Inserts the stores the solution calls for. Returns how many were added.
    pub fn add_stores(&self, cfg: &mut Cfg, solution: &DataFlowSolution<BitSet>) -> usize {
        let mut added = 0;
        for id in cfg.block_ids() {
            let Some(mut dirty) = solution.input(id).cloned() else {
                continue;
            };
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };
            let old = std::mem::take(block.instrs_mut());
            let flush_at_end = self.flush_at_end.contains(&id);
            let end = end_position(&old);
            let len = old.len();
            let mut out = Vec::with_capacity(len);
            for (index, instr) in old.into_iter().enumerate() {
                if (index == end && flush_at_end) || flushes_before(&instr) {
                    let stores = stores_for(&self.vars, &dirty);
                    added += stores.len();
                    out.extend(stores);
                    dirty.clear();
                }
                self.step(&instr, &mut dirty);
                out.push(instr);
            }
            if end == len && flush_at_end {
                let stores = stores_for(&self.vars, &dirty);
                added += stores.len();
                out.extend(stores);
            }
            *block.instrs_mut() = out;
        }
        added
    }
}

impl DataFlowProblem for BindingStorePlacement {
    type Fact = BitSet;

    fn name(&self) -> &'static str {
        STORE_PLACEMENT
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn build_data_flow_vars(&mut self, _block: &BasicBlock) {}

    fn initial(&self) -> BitSet {
        BitSet::new(self.vars.len())
    }

    fn boundary(&self) -> BitSet {
        self.initial()
    }

    fn meet(&self, acc: &mut BitSet, from: &FlowGraphNode<BitSet>, edge: EdgeType) {
        // Raising instructions flush first, so nothing is dirty in a handler.
        if !edge.is_exceptional() {
            acc.union_with(from.output());
        }
    }

    fn transfer(&self, block: &BasicBlock, input: &BitSet) -> BitSet {
        let mut dirty = input.clone();
        for instr in block.instrs() {
            self.step(instr, &mut dirty);
        }
        if self.flush_at_end.contains(&block.id()) {
            dirty.clear();
        }
        dirty
    }
}

/// Forward "slot matches binding" analysis with intersection as meet.
#[derive(Debug, Clone)]
pub struct BindingLoadPlacement {
    vars: DataFlowVars,
    own_locals: BitSet,
    any_call_kills: bool,
}

impl BindingLoadPlacement {
    /// Prepares the problem for `scope`.
    #[must_use]
    pub fn new(scope: &IrScope) -> Self {
        let binding = binding_variables(scope);
        let vars = registry(&binding);
        let own_locals = vars.set_of(binding.iter().filter(|v| v.depth() == Some(0)));
        BindingLoadPlacement {
            vars,
            own_locals,
            any_call_kills: scope.flags().contains(ScopeFlags::BINDING_HAS_ESCAPED),
        }
    }

    fn kills(&self, instr: &Instr) -> bool {
        captures_binding(instr) || (self.any_call_kills && matches!(instr, Instr::Call(_)))
    }

    /// Slots `instr` reads that are not available, in slot order.
    fn missing(&self, instr: &Instr, available: &BitSet) -> Vec<usize> {
        let mut missing: Vec<usize> = instr
            .used_variables()
            .iter()
            .filter_map(|v| self.vars.index_of(v))
            .filter(|i| !available.contains(*i))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    fn step(&self, instr: &Instr, available: &mut BitSet) {
        for i in self.missing(instr, available) {
            available.insert(i);
        }
        if self.kills(instr) {
            available.clear();
        }
        if let Some(i) = instr.result().and_then(|r| self.vars.index_of(r)) {
            available.insert(i);
        }
    }

    /// Inserts the loads the solution calls for. Returns how many were added.
    pub fn add_loads(&self, cfg: &mut Cfg, solution: &DataFlowSolution<BitSet>) -> usize {
        let mut added = 0;
        for id in cfg.block_ids() {
            let Some(mut available) = solution.input(id).cloned() else {
                continue;
            };
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };
            let old = std::mem::take(block.instrs_mut());
            let mut out = Vec::with_capacity(old.len());
            for instr in old {
                for i in self.missing(&instr, &available) {
                    if let Some(local) = self.vars.variable_at(i) {
                        out.push(Instr::LoadLocalVar {
                            local: local.clone(),
                        });
                        added += 1;
                    }
                }
                self.step(&instr, &mut available);
                out.push(instr);
            }
            *block.instrs_mut() = out;
        }
        added
    }
}

impl DataFlowProblem for BindingLoadPlacement {
    type Fact = BitSet;

    fn name(&self) -> &'static str {
        LOAD_PLACEMENT
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn build_data_flow_vars(&mut self, _block: &BasicBlock) {}

    fn initial(&self) -> BitSet {
        BitSet::full(self.vars.len())
    }

    fn boundary(&self) -> BitSet {
        self.own_locals.clone()
    }

    fn meet(&self, acc: &mut BitSet, from: &FlowGraphNode<BitSet>, edge: EdgeType) {
        if edge.is_exceptional() {
            acc.clear();
        } else {
            acc.intersect_with(from.output());
        }
    }

    fn transfer(&self, block: &BasicBlock, input: &BitSet) -> BitSet {
        let mut available = input.clone();
        for instr in block.instrs() {
            self.step(instr, &mut available);
        }
        available
    }
}
