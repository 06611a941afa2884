//! Pipeline configuration.
//!
//! A [`CompilerConfig`] selects the passes [`CompilationContext`] runs and the
//! knobs they share. Presets cover the usual consumers:
//!
//! | Preset | Passes |
//! |--------|--------|
//! | [`interpreter`](CompilerConfig::interpreter) | full pipeline |
//! | [`jit`](CompilerConfig::jit) | full pipeline without dead code elimination |
//! | [`safe`](CompilerConfig::safe) | CFG build and linearization |
//! | [`disabled`](CompilerConfig::disabled) | nothing |
//!
//! [`CompilationContext`]: super::CompilationContext

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::dataflow::DEFAULT_MAX_ITERATIONS;

/// The passes the pipeline knows how to run, in reference order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum PassKind {
    /// Flat instruction list to CFG
    BuildCfg,
    /// Dominator tree of the CFG
    DominatorTree,
    /// Live variable analysis, cached as `"LVP"`
    LiveVariableAnalysis,
    /// Marks unused side-effect-free definitions dead
    DeadCodeElimination,
    /// Binding store and load placement
    AddLocalVarLoadStore,
    /// Frame and binding push/pop placement
    AddCallProtocol,
    /// Single-shot inlining of the configured target
    Inline,
    /// Value-map simplification and guarded constant folding
    LocalOptimization,
    /// Block order and interpreter instruction list
    LinearizeCfg,
    /// Logs the scope dump
    IrPrinter,
}

impl PassKind {
    /// Returns `true` if the pass runs on a scope before its nested scopes.
    #[must_use]
    pub fn is_pre_order(self) -> bool {
        matches!(self, PassKind::BuildCfg | PassKind::LinearizeCfg)
    }

    /// Returns `true` if the pass may run on scopes that cannot be optimized.
    #[must_use]
    pub fn is_safe(self) -> bool {
        matches!(
            self,
            PassKind::BuildCfg | PassKind::LinearizeCfg | PassKind::IrPrinter
        )
    }
}

/// Configuration for a [`CompilationContext`](super::CompilationContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Base pass list, in execution order.
    pub passes: Vec<PassKind>,

    /// Method name the inline pass looks for; `None` disables inlining.
    pub inline_target: Option<String>,

    /// Node-visit ceiling handed to the dataflow solver (default: 100 000).
    pub max_iterations: usize,

    /// Compile sibling scopes on the rayon pool (default: false).
    pub parallel: bool,

    /// Log every scope after the pipeline at `info` level (default: false).
    pub print_ir: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            passes: vec![
                PassKind::BuildCfg,
                PassKind::DominatorTree,
                PassKind::LiveVariableAnalysis,
                PassKind::DeadCodeElimination,
                PassKind::AddLocalVarLoadStore,
                PassKind::AddCallProtocol,
                PassKind::LocalOptimization,
                PassKind::LinearizeCfg,
            ],
            inline_target: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            parallel: false,
            print_ir: false,
        }
    }
}

impl CompilerConfig {
    /// Same as [`CompilerConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The full pipeline, for scopes headed to the interpreter.
    #[must_use]
    pub fn interpreter() -> Self {
        Self::default()
    }

    /// The pipeline used ahead of the JIT.
    ///
    /// Dead code elimination is left out; the JIT runs its own after
    /// specialization.
    #[must_use]
    pub fn jit() -> Self {
        let mut config = Self::default();
        config.passes.retain(|p| *p != PassKind::DeadCodeElimination);
        config
    }

    /// Only the passes every scope supports.
    #[must_use]
    pub fn safe() -> Self {
        Self {
            passes: vec![PassKind::BuildCfg, PassKind::LinearizeCfg],
            ..Self::default()
        }
    }

    /// Runs nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            passes: Vec::new(),
            ..Self::default()
        }
    }

    /// Looks a preset up by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" | "interpreter" => Some(Self::interpreter()),
            "jit" => Some(Self::jit()),
            "safe" => Some(Self::safe()),
            "disabled" => Some(Self::disabled()),
            _ => None,
        }
    }

    /// Enables inlining of calls to `method`.
    #[must_use]
    pub fn with_inline_target(mut self, method: impl Into<String>) -> Self {
        self.inline_target = Some(method.into());
        self
    }

    /// Sets the dataflow iteration ceiling.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enables or disables parallel sibling compilation.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables the IR printer.
    #[must_use]
    pub fn with_print_ir(mut self, print_ir: bool) -> Self {
        self.print_ir = print_ir;
        self
    }

    /// The passes that actually run.
    ///
    /// With an inline target the inline pass goes right before local
    /// optimization, or before linearization when local optimization is not
    /// configured. The printer, when enabled, goes last.
    #[must_use]
    pub fn pipeline(&self) -> Vec<PassKind> {
        let mut passes = self.passes.clone();
        if self.inline_target.is_some() && !passes.contains(&PassKind::Inline) {
            let at = passes
                .iter()
                .position(|p| *p == PassKind::LocalOptimization)
                .or_else(|| passes.iter().position(|p| *p == PassKind::LinearizeCfg))
                .unwrap_or(passes.len());
            passes.insert(at, PassKind::Inline);
        }
        if self.print_ir && !passes.contains(&PassKind::IrPrinter) {
            passes.push(PassKind::IrPrinter);
        }
        passes
    }

    /// The passes that run on scopes unsafe for optimization.
    #[must_use]
    pub fn safe_pipeline(&self) -> Vec<PassKind> {
        self.pipeline().into_iter().filter(|p| p.is_safe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let full = CompilerConfig::interpreter();
        assert_eq!(full, CompilerConfig::default());
        assert_eq!(full.passes.first(), Some(&PassKind::BuildCfg));
        assert_eq!(full.passes.last(), Some(&PassKind::LinearizeCfg));
        assert!(full.passes.contains(&PassKind::DeadCodeElimination));

        let jit = CompilerConfig::jit();
        assert!(!jit.passes.contains(&PassKind::DeadCodeElimination));
        assert_eq!(jit.passes.len(), full.passes.len() - 1);

        assert_eq!(
            CompilerConfig::safe().pipeline(),
            vec![PassKind::BuildCfg, PassKind::LinearizeCfg]
        );
        assert!(CompilerConfig::disabled().pipeline().is_empty());
        assert!(CompilerConfig::preset("jit").is_some());
        assert!(CompilerConfig::preset("turbo").is_none());
    }

    #[test]
    fn test_inline_target_placement() {
        let pipeline = CompilerConfig::default()
            .with_inline_target("helper")
            .pipeline();
        let inline = pipeline.iter().position(|p| *p == PassKind::Inline).unwrap();
        assert_eq!(pipeline[inline + 1], PassKind::LocalOptimization);

        let safe = CompilerConfig::safe().with_inline_target("helper").pipeline();
        assert_eq!(
            safe,
            vec![PassKind::BuildCfg, PassKind::Inline, PassKind::LinearizeCfg]
        );
    }

    #[test]
    fn test_safe_pipeline_filters() {
        let config = CompilerConfig::default().with_print_ir(true);
        assert_eq!(
            config.safe_pipeline(),
            vec![
                PassKind::BuildCfg,
                PassKind::LinearizeCfg,
                PassKind::IrPrinter
            ]
        );
    }

    #[test]
    fn test_pass_kind_names() {
        use std::str::FromStr;
        assert_eq!(PassKind::AddCallProtocol.to_string(), "AddCallProtocol");
        assert_eq!(PassKind::from_str("LinearizeCfg").unwrap(), PassKind::LinearizeCfg);
        assert!(PassKind::BuildCfg.is_pre_order());
        assert!(!PassKind::LocalOptimization.is_pre_order());
    }
}
