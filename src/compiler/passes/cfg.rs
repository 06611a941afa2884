//! Structural passes: CFG construction, dominators and linearization.

use log::debug;

use crate::{
    cfg::{linearize, InterpreterContext},
    compiler::{events::EventKind, CompilationContext, CompilerPass},
    dataflow::{DataFlowSolver, LiveVariables, LIVENESS_PROBLEM},
    ir::IrScope,
    utils::graph::algorithms::compute_dominators_rooted,
    Result,
};

/// Builds the CFG from the flat instruction list.
///
/// A no-op on scopes that already have one.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildCfgPass;

impl CompilerPass for BuildCfgPass {
    fn name(&self) -> &'static str {
        "BuildCfg"
    }

    fn is_pre_order(&self) -> bool {
        true
    }

    fn is_safe(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Builds the control flow graph from the instruction list"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        if !scope.build_cfg()? {
            return Ok(false);
        }
        if let Some(cfg) = scope.cfg() {
            ctx.events()
                .record(EventKind::CfgBuilt)
                .scope(scope.id())
                .pass(self.name())
                .message(format!(
                    "{} blocks, {} edges",
                    cfg.block_count(),
                    cfg.edge_count()
                ));
        }
        Ok(true)
    }
}

/// Computes and caches the dominator tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DominatorTreePass;

impl CompilerPass for DominatorTreePass {
    fn name(&self) -> &'static str {
        "DominatorTree"
    }

    fn description(&self) -> &'static str {
        "Computes the dominator tree of the CFG"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        let tree = compute_dominators_rooted(scope.require_cfg(self.name())?);
        scope.set_dominators(tree);
        ctx.events()
            .record(EventKind::AnalysisComputed)
            .scope(scope.id())
            .pass(self.name())
            .message("dominator tree");
        Ok(false)
    }
}

/// Orders blocks for the interpreter and builds its instruction list.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearizeCfgPass;

impl CompilerPass for LinearizeCfgPass {
    fn name(&self) -> &'static str {
        "LinearizeCfg"
    }

    fn is_pre_order(&self) -> bool {
        true
    }

    fn is_safe(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Cleans up the CFG and flattens it into interpreter order"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        let changed = linearize_with(scope, &ctx.solver())?;
        let count = scope.interpreter_context().map_or(0, InterpreterContext::len);
        ctx.events()
            .record(EventKind::ScopeLinearized)
            .scope(scope.id())
            .pass(self.name())
            .message(format!("{count} instructions"));
        Ok(changed)
    }
}

/// Linearizes `scope`, building its CFG first if needed.
///
/// Dead instructions are swept, the CFG is optimized, and the block order
/// and interpreter instruction list are stored on the scope. A liveness
/// solution cached before the call is recomputed for the final graph.
///
/// # Errors
///
/// Returns an error if the CFG cannot be built or rewired, or if liveness
/// fails to converge.
pub fn linearize_scope(scope: &mut IrScope) -> Result<()> {
    linearize_with(scope, &DataFlowSolver::new()).map(|_| ())
}

fn linearize_with(scope: &mut IrScope, solver: &DataFlowSolver) -> Result<bool> {
    let had_liveness = scope
        .data_flow_solution::<LiveVariables>(LIVENESS_PROBLEM)
        .is_some();
    let mut changed = scope.build_cfg()?;
    changed |= scope.sweep_dead_instructions() > 0;

    let (cfg, alloc) = scope
        .cfg_and_allocator_mut()
        .ok_or_else(|| malformed_error!("scope has no CFG after building it"))?;
    changed |= cfg.optimize()?;
    let blocks_before = cfg.block_count();
    let order = linearize(cfg, alloc)?;
    changed |= cfg.block_count() != blocks_before;

    scope.invalidate_analyses();
    if had_liveness {
        let liveness = LiveVariables::compute(scope, solver)?;
        scope.set_data_flow_solution(LIVENESS_PROBLEM, liveness);
    }

    let cfg = scope.require_cfg("LinearizeCfg")?;
    let interpreter = InterpreterContext::build(cfg, &order, scope.dead_instructions());
    debug!(
        "{}: {} blocks linearized into {} instructions",
        scope.name(),
        order.len(),
        interpreter.len()
    );
    scope.set_linearization(order, interpreter);
    Ok(changed)
}
