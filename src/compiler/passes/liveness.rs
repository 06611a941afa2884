//! Live variable analysis as a pipeline step.

use crate::{
    compiler::{events::EventKind, CompilationContext, CompilerPass},
    dataflow::{LiveVariables, LIVENESS_PROBLEM},
    ir::IrScope,
    Result,
};

/// Solves liveness and caches it on the scope under `"LVP"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveVariableAnalysisPass;

impl LiveVariableAnalysisPass {
    /// Returns the cached liveness of `scope`, computing it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope has no CFG or the solver does not
    /// converge.
    pub fn ensure(scope: &mut IrScope, ctx: &CompilationContext) -> Result<()> {
        if scope
            .data_flow_solution::<LiveVariables>(LIVENESS_PROBLEM)
            .is_some()
        {
            return Ok(());
        }
        let liveness = LiveVariables::compute(scope, &ctx.solver())?;
        ctx.events()
            .record(EventKind::AnalysisComputed)
            .scope(scope.id())
            .pass("LiveVariableAnalysis")
            .message(format!(
                "liveness over {} variables in {} iterations",
                liveness.vars().len(),
                liveness.iterations()
            ));
        scope.set_data_flow_solution(LIVENESS_PROBLEM, liveness);
        Ok(())
    }
}

impl CompilerPass for LiveVariableAnalysisPass {
    fn name(&self) -> &'static str {
        "LiveVariableAnalysis"
    }

    fn description(&self) -> &'static str {
        "Computes live variables and caches the solution"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        scope.require_cfg(self.name())?;
        Self::ensure(scope, ctx)?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::CompilerConfig,
        ir::{Instr, Operand, ScopeId, ScopeKind, Variable},
    };

    #[test]
    fn test_caches_solution_once() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "m");
        scope.add_instr(Instr::copy(Variable::local("a"), Operand::Fixnum(1)));
        scope.add_instr(Instr::Return {
            value: Variable::local("a").into(),
        });
        scope.compute_scope_flags();
        assert!(LiveVariableAnalysisPass.run(&mut scope, &ctx).is_err());

        scope.build_cfg().unwrap();
        assert!(!LiveVariableAnalysisPass.run(&mut scope, &ctx).unwrap());
        assert!(!LiveVariableAnalysisPass.run(&mut scope, &ctx).unwrap());
        assert!(scope
            .data_flow_solution::<LiveVariables>(LIVENESS_PROBLEM)
            .is_some());
        assert_eq!(ctx.events().count_kind(EventKind::AnalysisComputed), 1);
    }
}
