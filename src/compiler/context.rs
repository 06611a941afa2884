//! Shared state for one compilation.
//!
//! The [`CompilationContext`] holds everything passes share across scopes:
//! the configuration, the method resolver used for guarded folding, the
//! callee bodies available to the inliner with the version counter guarding
//! code inlined from each, and the [`EventLog`]. All of it is
//! accessed through `&self`, so one context serves every thread of a
//! parallel run.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;

use crate::{
    compiler::{
        events::{EventKind, EventLog},
        CompilerConfig, CoreMethodTable, MethodResolver, PassScheduler, VersionedCell,
    },
    dataflow::DataFlowSolver,
    ir::{IrScope, ScopeKind, VersionToken},
    Result,
};

/// A registered callee body.
struct RegisteredMethod {
    body: Arc<IrScope>,
    version: VersionedCell,
}

/// Shared state for compiling scope trees.
pub struct CompilationContext {
    config: CompilerConfig,
    resolver: Arc<dyn MethodResolver>,
    scheduler: PassScheduler,
    safe_scheduler: PassScheduler,

    /// Callee bodies by method name, with a built CFG.
    methods: DashMap<String, RegisteredMethod>,

    /// Accumulated events from every pass.
    events: EventLog,
}

impl CompilationContext {
    /// Creates a context resolving methods through a fresh [`CoreMethodTable`].
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_resolver(config, Arc::new(CoreMethodTable::new()))
    }

    /// Creates a context with a caller-supplied resolver.
    #[must_use]
    pub fn with_resolver(config: CompilerConfig, resolver: Arc<dyn MethodResolver>) -> Self {
        let scheduler = PassScheduler::from_config(&config);
        let mut safe_config = config.clone();
        safe_config.passes.retain(|p| p.is_safe());
        safe_config.inline_target = None;
        let safe_scheduler = PassScheduler::from_config(&safe_config);
        CompilationContext {
            config,
            resolver,
            scheduler,
            safe_scheduler,
            methods: DashMap::new(),
            events: EventLog::new(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The method resolver.
    #[must_use]
    pub fn resolver(&self) -> &dyn MethodResolver {
        self.resolver.as_ref()
    }

    /// A solver honoring the configured iteration ceiling.
    #[must_use]
    pub fn solver(&self) -> DataFlowSolver {
        DataFlowSolver::with_max_iterations(self.config.max_iterations)
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The scheduler for the configured pipeline.
    #[must_use]
    pub fn scheduler(&self) -> &PassScheduler {
        &self.scheduler
    }

    // ── Callee bodies ───────────────────────────────────────────────────

    /// Makes `scope` available to the inliner under its name.
    ///
    /// The body is copied and given a CFG if it has none. Register bodies
    /// before compiling them: a body that already went through call protocol
    /// placement carries frame instructions that do not belong in a host.
    ///
    /// Registering a name again counts as a redefinition: the body is
    /// replaced and the method's version moves on, so guards in front of
    /// code inlined from the old body fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the body's CFG cannot be built.
    pub fn register_method(&self, scope: &IrScope) -> Result<()> {
        let mut body = scope.clone();
        if !body.flags_computed() {
            body.compute_scope_flags();
        }
        body.build_cfg()?;
        match self.methods.entry(body.name().to_string()) {
            Entry::Occupied(mut entry) => {
                let version = entry.get().version.invalidate();
                debug!("redefined method body {}, now {version}", entry.key());
                entry.get_mut().body = Arc::new(body);
            }
            Entry::Vacant(entry) => {
                debug!("registered method body {}", entry.key());
                entry.insert(RegisteredMethod {
                    body: Arc::new(body),
                    version: VersionedCell::new(),
                });
            }
        }
        Ok(())
    }

    /// Registers every method scope in the tree rooted at `root`.
    ///
    /// Returns the number of bodies registered.
    ///
    /// # Errors
    ///
    /// Returns the first CFG construction failure.
    pub fn register_methods_from(&self, root: &IrScope) -> Result<usize> {
        let mut count = 0;
        if root.kind() == ScopeKind::Method {
            self.register_method(root)?;
            count += 1;
        }
        for child in root.nested() {
            count += self.register_methods_from(child)?;
        }
        Ok(count)
    }

    /// The registered body of `name`.
    #[must_use]
    pub fn method_body(&self, name: &str) -> Option<Arc<IrScope>> {
        self.methods.get(name).map(|entry| Arc::clone(&entry.body))
    }

    /// Current version of the registered body of `name`.
    #[must_use]
    pub fn method_version(&self, name: &str) -> Option<VersionToken> {
        self.methods.get(name).map(|entry| entry.version.current())
    }

    /// Moves the version of `name` on without replacing its body.
    ///
    /// Returns the new version, or `None` if no body is registered.
    pub fn invalidate_method(&self, name: &str) -> Option<VersionToken> {
        let version = self.methods.get(name)?.version.invalidate();
        debug!("invalidated method body {name}, now {version}");
        Some(version)
    }

    /// Number of registered bodies.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    // ── Compilation ─────────────────────────────────────────────────────

    /// Runs the configured pipeline over the tree rooted at `scope`.
    ///
    /// Scope flags are computed first if needed. A root that registers
    /// `END { }` blocks gets only the safe passes for the whole tree; other
    /// unsafe scopes are skipped pass by pass.
    ///
    /// # Errors
    ///
    /// Returns the first pass failure.
    pub fn compile(&self, scope: &mut IrScope) -> Result<bool> {
        if !scope.flags_computed() {
            scope.compute_scope_flags();
        }
        let scheduler = if scope.is_unsafe_for_optimization() {
            debug!("{} has END blocks, using safe pass list", scope.name());
            self.events
                .record(EventKind::Info)
                .scope(scope.id())
                .message(format!("{} compiled with the safe pass list", scope.name()));
            &self.safe_scheduler
        } else {
            &self.scheduler
        };

        debug!(
            "compiling {} ({} scopes) with [{}]",
            scope.name(),
            scope.scope_count(),
            scheduler.pass_names().join(", ")
        );
        if self.config.parallel {
            scheduler.run_parallel(scope, self)
        } else {
            scheduler.run(scope, self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instr, Operand, ScopeId};

    fn method(name: &str) -> IrScope {
        let mut scope = IrScope::new(ScopeId(7), ScopeKind::Method, name);
        scope.add_instr(Instr::Return {
            value: Operand::Fixnum(1),
        });
        scope
    }

    #[test]
    fn test_register_builds_cfg() {
        let ctx = CompilationContext::new(CompilerConfig::default());
        let source = method("one");
        ctx.register_method(&source).unwrap();
        assert!(!source.has_cfg());
        let body = ctx.method_body("one").unwrap();
        assert!(body.has_cfg());
        assert!(ctx.method_body("two").is_none());
    }

    #[test]
    fn test_reregistering_moves_the_version() {
        let ctx = CompilationContext::new(CompilerConfig::default());
        ctx.register_method(&method("one")).unwrap();
        assert_eq!(ctx.method_version("one"), Some(VersionToken(0)));

        let mut redefined = IrScope::new(ScopeId(9), ScopeKind::Method, "one");
        redefined.add_instr(Instr::Return {
            value: Operand::Fixnum(2),
        });
        ctx.register_method(&redefined).unwrap();
        assert_eq!(ctx.method_version("one"), Some(VersionToken(1)));
        assert_eq!(ctx.method_body("one").unwrap().id(), ScopeId(9));
        assert_eq!(ctx.method_count(), 1);

        assert_eq!(ctx.invalidate_method("one"), Some(VersionToken(2)));
        assert_eq!(ctx.invalidate_method("two"), None);
        assert_eq!(ctx.method_version("two"), None);
    }

    #[test]
    fn test_register_methods_from_tree() {
        let ctx = CompilationContext::new(CompilerConfig::default());
        let mut root = IrScope::new(ScopeId(0), ScopeKind::Script, "main");
        root.add_nested(method("a"));
        root.add_nested(IrScope::new(ScopeId(8), ScopeKind::Closure, "_CLOSURE_8"));
        assert_eq!(ctx.register_methods_from(&root).unwrap(), 1);
        assert_eq!(ctx.method_count(), 1);
    }

    #[test]
    fn test_solver_uses_configured_ceiling() {
        let ctx = CompilationContext::new(CompilerConfig::default().with_max_iterations(5));
        assert_eq!(ctx.solver().max_iterations(), 5);
    }

    #[test]
    fn test_compile_with_end_blocks_uses_safe_list() {
        let ctx = CompilationContext::new(CompilerConfig::default());
        let mut script = IrScope::new(ScopeId(0), ScopeKind::Script, "main");
        script.add_instr(Instr::RecordEndBlock {
            closure: ScopeId(1),
        });
        script.add_instr(Instr::Return {
            value: Operand::Nil,
        });
        ctx.compile(&mut script).unwrap();

        assert!(script.has_cfg());
        assert!(script.interpreter_context().is_some());
        assert!(script.dominators().is_none());
        assert!(ctx.events().has(EventKind::Info));
    }
}
