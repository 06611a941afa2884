//! Pass scheduler for running the pipeline over a scope tree.
//!
//! The [`PassScheduler`] owns an ordered list of passes and runs each of them
//! over a whole scope tree before moving to the next one. Within one pass the
//! tree is walked depth-first, pre-order or post-order as the pass asks.
//!
//! [`PassScheduler::run_parallel`] compiles sibling subtrees on the rayon
//! pool. Subtrees are disjoint `&mut IrScope` borrows and
//! [`CompilationContext`] is `Sync`, so the result is the same as a
//! sequential run apart from the order of logged events.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    compiler::{
        create_pass, events::EventKind, CompilationContext, CompilerConfig, CompilerPass,
    },
    ir::IrScope,
    Result,
};

/// Runs an ordered list of passes over scope trees.
#[derive(Default)]
pub struct PassScheduler {
    passes: Vec<Box<dyn CompilerPass>>,
}

impl PassScheduler {
    /// Creates a scheduler with no passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler for `config`'s pipeline.
    #[must_use]
    pub fn from_config(config: &CompilerConfig) -> Self {
        PassScheduler {
            passes: config
                .pipeline()
                .into_iter()
                .map(|kind| create_pass(kind, config))
                .collect(),
        }
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, pass: Box<dyn CompilerPass>) {
        self.passes.push(pass);
    }

    /// Number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if there are no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Names of the passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every pass over the tree rooted at `root`, one scope at a time.
    ///
    /// Returns `true` if any pass changed any scope.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first pass failure.
    pub fn run(&self, root: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            changed |= Self::walk(pass.as_ref(), root, ctx, false)?;
        }
        Ok(changed)
    }

    /// Like [`PassScheduler::run`], compiling sibling scopes in parallel.
    ///
    /// # Errors
    ///
    /// Returns a pass failure; with several failing siblings which one is
    /// returned is unspecified.
    pub fn run_parallel(&self, root: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            changed |= Self::walk(pass.as_ref(), root, ctx, true)?;
        }
        Ok(changed)
    }

    fn walk(
        pass: &dyn CompilerPass,
        scope: &mut IrScope,
        ctx: &CompilationContext,
        parallel: bool,
    ) -> Result<bool> {
        let mut changed = false;
        if pass.is_pre_order() {
            changed |= Self::run_on_scope(pass, scope, ctx)?;
        }

        if parallel && scope.nested().len() > 1 {
            let any_changed = AtomicBool::new(false);
            scope
                .nested_mut()
                .par_iter_mut()
                .try_for_each(|child| -> Result<()> {
                    if Self::walk(pass, child, ctx, true)? {
                        any_changed.store(true, Ordering::Relaxed);
                    }
                    Ok(())
                })?;
            changed |= any_changed.load(Ordering::Relaxed);
        } else {
            for child in scope.nested_mut() {
                changed |= Self::walk(pass, child, ctx, parallel)?;
            }
        }

        if !pass.is_pre_order() {
            changed |= Self::run_on_scope(pass, scope, ctx)?;
        }
        Ok(changed)
    }

    fn run_on_scope(
        pass: &dyn CompilerPass,
        scope: &mut IrScope,
        ctx: &CompilationContext,
    ) -> Result<bool> {
        if scope.is_unsafe_for_optimization() && !pass.is_safe() {
            debug!("{}: skipping unsafe scope {}", pass.name(), scope.name());
            ctx.events()
                .record(EventKind::ScopeSkipped)
                .scope(scope.id())
                .pass(pass.name())
                .message(format!("{} not run on {}", pass.name(), scope.name()));
            return Ok(false);
        }

        trace!("{}: running on {}", pass.name(), scope.name());
        let changed = pass.run(scope, ctx)?;
        ctx.events()
            .record(EventKind::PassCompleted)
            .scope(scope.id())
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        Ok(changed)
    }
}
