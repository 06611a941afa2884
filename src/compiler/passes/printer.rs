//! IR dump at the end of the pipeline.

use log::info;

use crate::{
    compiler::{CompilationContext, CompilerPass},
    ir::IrScope,
    Result,
};

/// Logs each scope's instructions at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrPrinterPass;

impl CompilerPass for IrPrinterPass {
    fn name(&self) -> &'static str {
        "IrPrinter"
    }

    fn is_safe(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Logs the instructions of every scope"
    }

    fn run(&self, scope: &mut IrScope, _ctx: &CompilationContext) -> Result<bool> {
        info!(
            "{} {} ({}):\n{}",
            scope.kind(),
            scope.name(),
            scope.id(),
            scope.to_string_instrs()
        );
        Ok(false)
    }
}
