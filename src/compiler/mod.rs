//! The compilation pipeline.
//!
//! Everything between a freshly built scope tree and the flat instruction
//! list the interpreter runs:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compilation Pipeline                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerConfig            Pass list, inline target, limits      │
//! │                                                                  │
//! │  CompilationContext        Shared state for one compilation      │
//! │    ├─ MethodResolver       (core method lookup and versions)     │
//! │    ├─ Method bodies        (inline candidates by name)           │
//! │    └─ EventLog             (what each pass changed)              │
//! │                                                                  │
//! │  PassScheduler             One tree walk per pass                │
//! │    ├─ pre-order passes      scope, then nested scopes            │
//! │    ├─ post-order passes     nested scopes, then scope            │
//! │    └─ unsafe scopes         safe passes only                     │
//! │                                                                  │
//! │  CompilerPass trait        Interface for all passes              │
//! │                                                                  │
//! │  Passes                                                          │
//! │    ├─ Structure: CFG build, dominators, linearization            │
//! │    ├─ Analysis:  live variables                                  │
//! │    ├─ Cleanup:   dead code elimination                           │
//! │    ├─ Runtime:   binding load/store, frame push/pop              │
//! │    └─ Optimize:  inlining, local optimization                    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use irscope::{ast::Node, compiler::CompilationContext, CompilerConfig, IrBuilder};
//!
//! let ast = Node::LocalAsgn {
//!     name: "a".into(),
//!     value: Box::new(Node::Fixnum { value: 1 }),
//! };
//! let mut scope = IrBuilder::new().build_root(&ast)?;
//! let ctx = CompilationContext::new(CompilerConfig::interpreter());
//! ctx.compile(&mut scope)?;
//! assert!(scope.interpreter_context().is_some());
//! # Ok::<(), irscope::Error>(())
//! ```

mod config;
mod context;
mod events;
mod pass;
mod passes;
mod resolver;
mod scheduler;

pub use config::{CompilerConfig, PassKind};
pub use context::CompilationContext;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use pass::CompilerPass;
pub use passes::{
    create_pass, linearize_scope, AddCallProtocolPass, AddLocalVarLoadStorePass,
    BuildCfgPass, DeadCodeEliminationPass, DominatorTreePass, InlinePass, IrPrinterPass,
    LinearizeCfgPass, LiveVariableAnalysisPass, LocalOptimizationPass,
};
pub use resolver::{
    core_method_names, core_receiver_kinds, CoreMethodTable, Folder, MethodResolver,
    ResolvedMethod, VersionedCell,
};
pub use scheduler::PassScheduler;
