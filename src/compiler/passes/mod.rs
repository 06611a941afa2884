//! Built-in compiler passes.
//!
//! | Pass | Order | Safe | Effect |
//! |------|-------|------|--------|
//! | [`BuildCfgPass`] | pre | yes | flat list to CFG |
//! | [`DominatorTreePass`] | post | no | caches the dominator tree |
//! | [`LiveVariableAnalysisPass`] | post | no | caches liveness as `"LVP"` |
//! | [`DeadCodeEliminationPass`] | post | no | marks unused pure definitions |
//! | [`AddLocalVarLoadStorePass`] | post | no | binding stores and loads |
//! | [`AddCallProtocolPass`] | post | no | frame and binding push/pop |
//! | [`InlinePass`] | post | no | splices one call to a registered body |
//! | [`LocalOptimizationPass`] | post | no | simplification and guarded folding |
//! | [`LinearizeCfgPass`] | pre | yes | block order and interpreter list |
//! | [`IrPrinterPass`] | post | yes | logs the scope |

mod cfg;
mod dce;
mod inline;
mod liveness;
mod localopt;
mod placement;
mod printer;
mod protocol;

pub use cfg::{linearize_scope, BuildCfgPass, DominatorTreePass, LinearizeCfgPass};
pub use dce::DeadCodeEliminationPass;
pub use inline::InlinePass;
pub use liveness::LiveVariableAnalysisPass;
pub use localopt::LocalOptimizationPass;
pub use placement::AddLocalVarLoadStorePass;
pub use printer::IrPrinterPass;
pub use protocol::AddCallProtocolPass;

use crate::compiler::{CompilerConfig, CompilerPass, PassKind};

/// Instantiates the pass for `kind`.
///
/// The inline pass takes its target from `config`; without one it never
/// changes anything.
#[must_use]
pub fn create_pass(kind: PassKind, config: &CompilerConfig) -> Box<dyn CompilerPass> {
    match kind {
        PassKind::BuildCfg => Box::new(BuildCfgPass),
        PassKind::DominatorTree => Box::new(DominatorTreePass),
        PassKind::LiveVariableAnalysis => Box::new(LiveVariableAnalysisPass),
        PassKind::DeadCodeElimination => Box::new(DeadCodeEliminationPass),
        PassKind::AddLocalVarLoadStore => Box::new(AddLocalVarLoadStorePass),
        PassKind::AddCallProtocol => Box::new(AddCallProtocolPass),
        PassKind::Inline => Box::new(InlinePass::new(
            config.inline_target.clone().unwrap_or_default(),
        )),
        PassKind::LocalOptimization => Box::new(LocalOptimizationPass),
        PassKind::LinearizeCfg => Box::new(LinearizeCfgPass),
        PassKind::IrPrinter => Box::new(IrPrinterPass),
    }
}
