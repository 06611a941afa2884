//! Binding load and store placement.

use log::debug;

use crate::{
    compiler::{events::EventKind, CompilationContext, CompilerPass},
    dataflow::{BindingLoadPlacement, BindingStorePlacement},
    ir::IrScope,
    Result,
};

/// Synchronizes binding-backed locals with the heap binding.
///
/// Stores are placed first, then loads, each from its own dataflow solution.
/// Dead instructions are swept beforehand since both rewrites shift
/// instruction indices.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddLocalVarLoadStorePass;

impl CompilerPass for AddLocalVarLoadStorePass {
    fn name(&self) -> &'static str {
        "AddLocalVarLoadStore"
    }

    fn description(&self) -> &'static str {
        "Inserts binding stores before foreign code and loads after it"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        scope.require_cfg(self.name())?;
        scope.sweep_dead_instructions();
        let solver = ctx.solver();

        let mut stores = BindingStorePlacement::new(scope);
        let solution = solver.compute_mop_solution(&mut stores, scope.require_cfg(self.name())?)?;
        let added_stores = stores.add_stores(scope.require_cfg_mut(self.name())?, &solution);

        let mut loads = BindingLoadPlacement::new(scope);
        let solution = solver.compute_mop_solution(&mut loads, scope.require_cfg(self.name())?)?;
        let added_loads = loads.add_loads(scope.require_cfg_mut(self.name())?, &solution);

        if added_stores + added_loads == 0 {
            return Ok(false);
        }
        debug!(
            "{}: {} binding stores, {} binding loads",
            scope.name(),
            added_stores,
            added_loads
        );
        scope.invalidate_analyses();
        if added_stores > 0 {
            ctx.events()
                .record(EventKind::StoreInserted)
                .scope(scope.id())
                .pass(self.name())
                .message(format!("{added_stores} binding stores"));
        }
        if added_loads > 0 {
            ctx.events()
                .record(EventKind::LoadInserted)
                .scope(scope.id())
                .pass(self.name())
                .message(format!("{added_loads} binding loads"));
        }
        Ok(true)
    }
}
