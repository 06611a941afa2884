//! Dead code elimination.
//!
//! Marks side-effect-free definitions whose result is not live afterwards.
//! Nothing is deleted here: marks go to the scope's
//! [`DeadInstructions`](crate::ir::DeadInstructions) table, linearization
//! leaves them out, and any pass that rewrites blocks sweeps them first.
//!
//! Each block is walked backward from its cached live-out set. A marked
//! instruction contributes no uses, so a chain of definitions feeding only
//! each other dies in one run as long as it stays inside the block.

use crate::{
    compiler::{
        events::{EventKind, EventLog},
        passes::LiveVariableAnalysisPass,
        CompilationContext, CompilerPass,
    },
    dataflow::{LiveVariables, LIVENESS_PROBLEM},
    ir::{BlockId, IrScope},
    Result,
};

/// Marks unused pure definitions dead.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadCodeEliminationPass;

impl DeadCodeEliminationPass {
    fn find_dead(scope: &IrScope) -> Vec<(BlockId, usize)> {
        let (Some(cfg), Some(liveness)) = (
            scope.cfg(),
            scope.data_flow_solution::<LiveVariables>(LIVENESS_PROBLEM),
        ) else {
            return Vec::new();
        };
        let dead = scope.dead_instructions();

        let mut marks = Vec::new();
        for block in cfg.blocks() {
            let id = block.id();
            let Some((live_out, pinned)) = liveness.exit_state(id) else {
                continue;
            };
            let mut live = live_out.clone();
            for (index, instr) in block.instrs().iter().enumerate().rev() {
                if dead.is_dead(id, index) {
                    continue;
                }
                let unused = instr
                    .result()
                    .and_then(|r| liveness.vars().index_of(r))
                    .is_some_and(|slot| !live.contains(slot));
                if unused && !instr.has_side_effects() {
                    marks.push((id, index));
                    continue;
                }
                liveness.problem().step_backward(instr, &mut live, pinned);
            }
        }
        marks
    }
}

impl CompilerPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "DeadCodeElimination"
    }

    fn description(&self) -> &'static str {
        "Marks side-effect-free instructions with unused results as dead"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        scope.require_cfg(self.name())?;
        LiveVariableAnalysisPass::ensure(scope, ctx)?;

        let marks = Self::find_dead(scope);
        let changes = EventLog::new();
        for (block, index) in marks {
            let text = scope
                .cfg()
                .and_then(|cfg| cfg.block(block))
                .and_then(|b| b.instrs().get(index))
                .map(ToString::to_string)
                .unwrap_or_default();
            if scope.dead_instructions_mut().mark(block, index) {
                changes
                    .record(EventKind::InstructionRemoved)
                    .at(scope.id(), index)
                    .pass(self.name())
                    .message(format!("{block}: {text}"));
            }
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events().merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::CompilerConfig,
        ir::{CallInstr, Instr, Operand, ScopeId, ScopeKind, Variable},
    };

    fn scope_of(instrs: Vec<Instr>) -> IrScope {
        let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "m");
        for instr in instrs {
            scope.add_instr(instr);
        }
        scope.compute_scope_flags();
        scope.build_cfg().unwrap();
        scope
    }

    fn body(scope: &IrScope) -> BlockId {
        let cfg = scope.cfg().unwrap();
        cfg.fall_through_successor(cfg.entry()).unwrap()
    }

    #[test]
    fn test_overwritten_store_is_dead() {
        let a = Variable::local("a");
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut scope = scope_of(vec![
            Instr::copy(a.clone(), Operand::Fixnum(1)),
            Instr::copy(a.clone(), Operand::Fixnum(2)),
            Instr::Return { value: a.into() },
        ]);

        assert!(DeadCodeEliminationPass.run(&mut scope, &ctx).unwrap());
        let block = body(&scope);
        assert!(scope.dead_instructions().is_dead(block, 0));
        assert!(!scope.dead_instructions().is_dead(block, 1));
        assert_eq!(scope.dead_instructions().count(), 1);
        assert_eq!(ctx.events().count_kind(EventKind::InstructionRemoved), 1);

        // Marks are stable: a second run finds nothing new
        assert!(!DeadCodeEliminationPass.run(&mut scope, &ctx).unwrap());
    }

    #[test]
    fn test_used_definition_survives() {
        let (a, b) = (Variable::local("a"), Variable::local("b"));
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut scope = scope_of(vec![
            Instr::copy(a.clone(), Operand::Fixnum(1)),
            Instr::Call(CallInstr::new(
                Some(b.clone()),
                a.into(),
                "+",
                vec![Operand::Fixnum(1)],
            )),
            Instr::Return { value: b.into() },
        ]);
        assert!(!DeadCodeEliminationPass.run(&mut scope, &ctx).unwrap());
        assert!(scope.dead_instructions().is_empty());
    }

    #[test]
    fn test_calls_are_never_dead() {
        let t = Variable::Temp(0);
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut scope = scope_of(vec![
            Instr::Call(CallInstr::new(
                Some(t),
                Operand::Variable(Variable::SelfValue),
                "puts",
                vec![Operand::Fixnum(1)],
            )),
            Instr::Return {
                value: Operand::Nil,
            },
        ]);
        assert!(!DeadCodeEliminationPass.run(&mut scope, &ctx).unwrap());
    }

    #[test]
    fn test_copy_chain_dies_together() {
        let (t0, t1) = (Variable::Temp(0), Variable::Temp(1));
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut scope = scope_of(vec![
            Instr::copy(t0.clone(), Operand::Fixnum(1)),
            Instr::copy(t1, Operand::Variable(t0)),
            Instr::Return {
                value: Operand::Nil,
            },
        ]);
        assert!(DeadCodeEliminationPass.run(&mut scope, &ctx).unwrap());
        assert_eq!(scope.dead_instructions().count(), 2);
    }
}
