//! JSON dumps for debugging.
//!
//! ASTs round-trip through JSON. Scopes only dump: the output mirrors what
//! [`IrScope::to_string_instrs`] prints, in a form tools can diff or load into
//! other viewers. Loading a scope back is not supported.

use std::{fs, path::Path};

use serde::Serialize;

use crate::{
    ast::Node,
    cfg::{Cfg, EdgeType},
    ir::{Instr, IrScope, ScopeFlags, ScopeKind},
    Error, Result,
};

/// Serializable view of one CFG edge.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeDump {
    /// Target block index
    pub to: usize,
    /// Edge kind
    pub kind: EdgeType,
}

/// Serializable view of one basic block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDump {
    /// Block index
    pub id: usize,
    /// Block label
    pub label: String,
    /// Starts with `receive_exception`
    pub rescue_entry: bool,
    /// Rescue handler block index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescuer: Option<usize>,
    /// Instructions, with dead ones left out
    pub instrs: Vec<Instr>,
    /// Outgoing edges
    pub successors: Vec<EdgeDump>,
}

/// Serializable view of a scope and its nested scopes.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeDump {
    /// Scope id
    pub id: u32,
    /// Scope kind
    pub kind: ScopeKind,
    /// Scope name
    pub name: String,
    /// First source line
    pub line: u32,
    /// Scope flags
    pub flags: ScopeFlags,
    /// Flat instruction list, present until the CFG is built
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instrs: Vec<Instr>,
    /// CFG blocks, once built
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockDump>,
    /// Nested scopes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<ScopeDump>,
}

fn dump_blocks(scope: &IrScope, cfg: &Cfg) -> Vec<BlockDump> {
    let dead = scope.dead_instructions();
    cfg.blocks()
        .map(|block| {
            let id = block.id();
            BlockDump {
                id: id.index(),
                label: block.label().to_string(),
                rescue_entry: block.is_rescue_entry(),
                rescuer: cfg.rescuer_for(id).map(|r| r.index()),
                instrs: block
                    .instrs()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !dead.is_dead(id, *i))
                    .map(|(_, instr)| instr.clone())
                    .collect(),
                successors: cfg
                    .outgoing(id)
                    .map(|(to, kind)| EdgeDump {
                        to: to.index(),
                        kind,
                    })
                    .collect(),
            }
        })
        .collect()
}

impl ScopeDump {
    /// Captures `scope` and its subtree.
    #[must_use]
    pub fn of(scope: &IrScope) -> Self {
        let (instrs, blocks) = match scope.cfg() {
            Some(cfg) => (Vec::new(), dump_blocks(scope, cfg)),
            None => (scope.instrs().to_vec(), Vec::new()),
        };
        ScopeDump {
            id: scope.id().0,
            kind: scope.kind(),
            name: scope.name().to_string(),
            line: scope.line(),
            flags: scope.flags(),
            instrs,
            blocks,
            nested: scope.nested().iter().map(ScopeDump::of).collect(),
        }
    }
}

/// Parses an AST from JSON text.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if `json` is not a valid AST.
pub fn ast_from_json(json: &str) -> Result<Node> {
    Ok(serde_json::from_str(json)?)
}

/// Renders an AST as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn ast_to_json(node: &Node) -> Result<String> {
    Ok(serde_json::to_string_pretty(node)?)
}

/// Reads an AST from a JSON file.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the file cannot be read or parsed.
pub fn load_ast(path: &Path) -> Result<Node> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))?;
    ast_from_json(&text)
}

/// Renders a scope tree as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails.
pub fn scope_to_json(scope: &IrScope) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ScopeDump::of(scope))?)
}
