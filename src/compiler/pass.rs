//! The pass interface.

use crate::{compiler::CompilationContext, ir::IrScope, Result};

/// A compiler pass over one scope.
///
/// Passes are stateless and thread-safe (`Send + Sync`): the scheduler may
/// run the same pass on sibling scopes from several threads. Everything a pass
/// wants to hand to a later pass goes on the scope (its CFG, the analysis
/// cache, the dead-instruction table) and everything it wants to report goes
/// to [`CompilationContext::events`].
///
/// # Pipeline Integration
///
/// The [`PassScheduler`](super::PassScheduler) walks the scope tree once per
/// pass. A pre-order pass sees a scope before its nested scopes, a post-order
/// pass after them. Scopes flagged unsafe for optimization (they register
/// `END { }` blocks) only see passes that report [`CompilerPass::is_safe`].
pub trait CompilerPass: Send + Sync {
    /// Unique name for logging and events.
    fn name(&self) -> &'static str;

    /// Does this pass run on a scope before its nested scopes?
    fn is_pre_order(&self) -> bool {
        false
    }

    /// May this pass run on scopes that are unsafe for optimization?
    fn is_safe(&self) -> bool {
        false
    }

    /// Short description for listings.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass on `scope` only; nested scopes are the scheduler's job.
    ///
    /// Returns `true` if the scope changed.
    ///
    /// # Arguments
    ///
    /// * `scope` - The scope to process.
    /// * `ctx` - Shared compilation state.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is malformed or a required analysis
    /// cannot be computed. The error aborts compilation of the scope tree.
    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool>;
}
