//! # irscope Prelude
//!
//! The types most programs touch when lowering and compiling a scope tree.
//!
//! ```rust
//! use irscope::prelude::*;
//!
//! let mut scope = IrBuilder::new().build_root(&Node::int(1))?;
//! CompilationContext::new(CompilerConfig::safe()).compile(&mut scope)?;
//! assert!(scope.has_cfg());
//! # Ok::<(), irscope::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all irscope operations
pub use crate::Error;

/// The result type used throughout irscope
pub use crate::Result;

// ================================================================================================
// Front End
// ================================================================================================

/// Typed syntax tree
pub use crate::ast::{Node, OptionalParam};

/// AST lowering
pub use crate::IrBuilder;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Instructions and their operands
pub use crate::ir::{CallInstr, Instr, Label, MethAddr, Operand, ValueKind, Variable};

/// Scopes and blocks
pub use crate::ir::{BasicBlock, BlockId, IrScope, ScopeFlags, ScopeId, ScopeKind};

/// Control-flow graphs
pub use crate::cfg::{Cfg, EdgeType, InterpreterContext};

// ================================================================================================
// Analyses and Pipeline
// ================================================================================================

/// Dataflow solver and liveness
pub use crate::dataflow::{DataFlowSolver, LiveVariables, LIVENESS_PROBLEM};

/// Compilation
pub use crate::compiler::{
    CompilationContext, CompilerConfig, CompilerPass, EventKind, EventLog, MethodResolver,
    PassKind,
};
