//! Compilation units and their per-scope state.
//!
//! An [`IrScope`] is a method, closure, module body or script. It starts life
//! as a flat instruction list produced by the builder; the CFG builder pass
//! replaces the list with a [`Cfg`], after which every other pass works on
//! blocks. Each scope owns its nested scopes, so the whole program is a tree
//! with a single owner at every level and sibling subtrees can be compiled on
//! different threads.
//!
//! Besides the IR itself a scope carries everything passes hand to each other:
//!
//! - [`ScopeFlags`] summarizing features that restrict optimization
//! - a keyed cache of dataflow solutions (liveness is stored under `"LVP"`)
//! - the dominator tree, once computed
//! - [`DeadInstructions`], the side table dead code elimination fills in
//! - the final block linearization and the interpreter-ready instruction list

use std::{any::Any, fmt};

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    cfg::{Cfg, InterpreterContext},
    ir::{BlockId, Instr, Label, Variable},
    utils::{graph::algorithms::DominatorTree, BitSet},
    Error, Result,
};

/// Methods whose callers must materialize a frame.
pub const FRAME_AWARE_METHODS: &[&str] = &[
    "eval",
    "module_eval",
    "class_eval",
    "instance_eval",
    "binding",
    "public",
    "private",
    "protected",
    "module_function",
    "block_given?",
    "iterator?",
];

/// Methods that can observe or capture the caller's local variable binding.
pub const SCOPE_CAPTURING_METHODS: &[&str] = &[
    "eval",
    "module_eval",
    "class_eval",
    "instance_eval",
    "module_exec",
    "class_exec",
    "instance_exec",
    "binding",
    "local_variables",
];

/// Methods that read or write the last-match / last-line globals.
pub const BACKREF_METHODS: &[&str] = &["=~", "match", "sub", "gsub", "scan", "gets"];

/// Program-wide identifier of a scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of compilation unit a scope is.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum ScopeKind {
    /// Top-level file body
    Script,
    /// Class or module body
    Module,
    /// Method body
    Method,
    /// Block, lambda or `END { }` body
    Closure,
}

impl ScopeKind {
    /// Returns `true` for closures.
    #[must_use]
    pub fn is_closure(self) -> bool {
        self == ScopeKind::Closure
    }
}

bitflags! {
    /// Features of a scope that restrict what passes may do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ScopeFlags: u32 {
        /// Contains a `break` out of a closure
        const HAS_BREAK_INSTRS = 0x0001;
        /// Contains a non-local return
        const HAS_NONLOCAL_RETURNS = 0x0002;
        /// A nested closure may break into this scope
        const CAN_RECEIVE_BREAKS = 0x0004;
        /// A nested closure may return through this scope
        const CAN_RECEIVE_NONLOCAL_RETURNS = 0x0008;
        /// Registers `END { }` blocks; only safe passes may run
        const HAS_END_BLOCKS = 0x0010;
        /// Contains a loop
        const HAS_LOOPS = 0x0020;
        /// Calls `eval` or a relative
        const USES_EVAL = 0x0040;
        /// Touches the last-match or last-line globals
        const USES_BACKREF_OR_LASTLINE = 0x0080;
        /// Needs a materialized call frame
        const REQUIRES_FRAME = 0x0100;
        /// The local variable binding may be observed from outside
        const BINDING_HAS_ESCAPED = 0x0200;
        /// Binds its block argument
        const RECEIVES_CLOSURE_ARG = 0x0400;
    }
}

/// Flags set while building that instruction scanning cannot rediscover.
const BUILDER_FLAGS: ScopeFlags = ScopeFlags::HAS_LOOPS;

/// Allocator for scope-unique temporaries, labels and inlining prefixes.
#[derive(Debug, Clone, Default)]
pub struct ScopeAllocator {
    temps: u32,
    labels: u32,
    inline_sites: u32,
}

impl ScopeAllocator {
    /// Fresh temporary variable.
    pub fn new_temp(&mut self) -> Variable {
        let var = Variable::Temp(self.temps);
        self.temps += 1;
        var
    }

    /// Fresh label.
    pub fn new_label(&mut self) -> Label {
        let label = Label::new(format!("L{}", self.labels));
        self.labels += 1;
        label
    }

    /// Fresh prefix for variables renamed by one inlining operation.
    pub fn new_inline_prefix(&mut self) -> u32 {
        let prefix = self.inline_sites;
        self.inline_sites += 1;
        prefix
    }

    /// Skips past every temporary and `L<n>` label `instr` mentions.
    pub fn reserve(&mut self, instr: &Instr) {
        for var in instr.result().into_iter().chain(instr.used_variables().iter()) {
            if let Variable::Temp(n) = var {
                self.temps = self.temps.max(n + 1);
            }
        }
        let mut labels: Vec<&Label> = instr.branch_target().into_iter().collect();
        match instr {
            Instr::Label(label) => labels.push(label),
            Instr::ExceptionRegionStart {
                begin,
                end,
                rescue,
                ensure,
            } => labels.extend([begin, end, rescue].into_iter().chain(ensure.as_ref())),
            _ => {}
        }
        for label in labels {
            if let Some(n) = label.name().strip_prefix('L').and_then(|n| n.parse::<u32>().ok()) {
                self.labels = self.labels.max(n + 1);
            }
        }
    }

    /// Number of temporaries handed out so far.
    #[must_use]
    pub fn temp_count(&self) -> u32 {
        self.temps
    }
}

/// Instructions proven dead, recorded per block by instruction index.
///
/// Marking never changes a block; consumers either skip marked entries or
/// call [`IrScope::sweep_dead_instructions`] to delete them before mutating.
#[derive(Debug, Clone, Default)]
pub struct DeadInstructions {
    blocks: FxHashMap<BlockId, BitSet>,
}

impl DeadInstructions {
    /// Marks instruction `index` of `block` as dead.
    pub fn mark(&mut self, block: BlockId, index: usize) -> bool {
        let set = self.blocks.entry(block).or_default();
        set.grow(index + 1);
        set.insert(index)
    }

    /// Returns `true` if the instruction was marked dead.
    #[must_use]
    pub fn is_dead(&self, block: BlockId, index: usize) -> bool {
        self.blocks.get(&block).is_some_and(|set| set.contains(index))
    }

    /// Dead set of one block.
    #[must_use]
    pub fn for_block(&self, block: BlockId) -> Option<&BitSet> {
        self.blocks.get(&block)
    }

    /// Total number of dead instructions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.blocks.values().map(BitSet::count).sum()
    }

    /// Returns `true` if nothing is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Forgets every mark.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    fn take(&mut self) -> FxHashMap<BlockId, BitSet> {
        std::mem::take(&mut self.blocks)
    }
}

/// A compilation unit.
pub struct IrScope {
    id: ScopeId,
    kind: ScopeKind,
    name: String,
    line: u32,
    required_args: u32,
    instrs: Vec<Instr>,
    cfg: Option<Cfg>,
    nested: Vec<IrScope>,
    flags: ScopeFlags,
    flags_computed: bool,
    alloc: ScopeAllocator,
    dominators: Option<DominatorTree>,
    dead: DeadInstructions,
    linearization: Option<Vec<BlockId>>,
    interpreter: Option<InterpreterContext>,
    solutions: FxHashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl IrScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(id: ScopeId, kind: ScopeKind, name: impl Into<String>) -> Self {
        IrScope {
            id,
            kind,
            name: name.into(),
            line: 0,
            required_args: 0,
            instrs: Vec::new(),
            cfg: None,
            nested: Vec::new(),
            flags: ScopeFlags::empty(),
            flags_computed: false,
            alloc: ScopeAllocator::default(),
            dominators: None,
            dead: DeadInstructions::default(),
            linearization: None,
            interpreter: None,
            solutions: FxHashMap::default(),
        }
    }

    /// Scope id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Scope kind.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Scope name; methods use their method name, closures a synthetic one.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First source line.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Sets the first source line.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// Number of required positional parameters.
    #[must_use]
    pub fn required_args(&self) -> u32 {
        self.required_args
    }

    /// Sets the number of required positional parameters.
    pub fn set_required_args(&mut self, count: u32) {
        self.required_args = count;
    }

    // ── Instructions and CFG ────────────────────────────────────────────

    /// The flat instruction list; empty once the CFG has been built.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Appends to the flat instruction list.
    pub fn add_instr(&mut self, instr: Instr) {
        self.alloc.reserve(&instr);
        self.instrs.push(instr);
    }

    /// Iterates every instruction, from the CFG if built or the flat list otherwise.
    pub fn all_instrs(&self) -> Box<dyn Iterator<Item = &Instr> + '_> {
        match &self.cfg {
            Some(cfg) => Box::new(cfg.blocks().flat_map(|b| b.instrs().iter())),
            None => Box::new(self.instrs.iter()),
        }
    }

    /// Returns `true` once the CFG has been built.
    #[must_use]
    pub fn has_cfg(&self) -> bool {
        self.cfg.is_some()
    }

    /// The CFG, if built.
    #[must_use]
    pub fn cfg(&self) -> Option<&Cfg> {
        self.cfg.as_ref()
    }

    /// Mutable CFG, if built.
    pub fn cfg_mut(&mut self) -> Option<&mut Cfg> {
        self.cfg.as_mut()
    }

    /// The CFG, or [`Error::MissingDependency`] naming `pass`.
    ///
    /// # Errors
    ///
    /// Returns an error if the CFG has not been built yet.
    pub fn require_cfg(&self, pass: &'static str) -> Result<&Cfg> {
        self.cfg.as_ref().ok_or(Error::MissingDependency {
            pass,
            requires: "a built CFG",
        })
    }

    /// Mutable variant of [`IrScope::require_cfg`].
    ///
    /// # Errors
    ///
    /// Returns an error if the CFG has not been built yet.
    pub fn require_cfg_mut(&mut self, pass: &'static str) -> Result<&mut Cfg> {
        self.cfg.as_mut().ok_or(Error::MissingDependency {
            pass,
            requires: "a built CFG",
        })
    }

    /// Builds the CFG from the flat instruction list. A no-op if already built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a branch targets a label with no block.
    pub fn build_cfg(&mut self) -> Result<bool> {
        if self.cfg.is_some() {
            return Ok(false);
        }
        let instrs = std::mem::take(&mut self.instrs);
        match Cfg::build(instrs.clone(), &mut self.alloc) {
            Ok(cfg) => {
                self.cfg = Some(cfg);
                self.invalidate_analyses();
                Ok(true)
            }
            Err(e) => {
                self.instrs = instrs;
                Err(e)
            }
        }
    }

    /// Installs a CFG built elsewhere, discarding cached analyses.
    pub fn set_cfg(&mut self, cfg: Cfg) {
        self.instrs.clear();
        self.cfg = Some(cfg);
        self.invalidate_analyses();
    }

    /// Split borrow of the CFG and the name allocator.
    pub fn cfg_and_allocator_mut(&mut self) -> Option<(&mut Cfg, &mut ScopeAllocator)> {
        self.cfg.as_mut().map(|cfg| (cfg, &mut self.alloc))
    }

    /// The name allocator.
    pub fn allocator_mut(&mut self) -> &mut ScopeAllocator {
        &mut self.alloc
    }

    /// Fresh temporary.
    pub fn new_temp(&mut self) -> Variable {
        self.alloc.new_temp()
    }

    /// Fresh label.
    pub fn new_label(&mut self) -> Label {
        self.alloc.new_label()
    }

    // ── Scope tree ──────────────────────────────────────────────────────

    /// Directly nested scopes, in creation order.
    #[must_use]
    pub fn nested(&self) -> &[IrScope] {
        &self.nested
    }

    /// Mutable nested scopes.
    pub fn nested_mut(&mut self) -> &mut [IrScope] {
        &mut self.nested
    }

    /// Adds a nested scope.
    pub fn add_nested(&mut self, scope: IrScope) {
        self.nested.push(scope);
    }

    /// Finds a scope by id in this subtree.
    #[must_use]
    pub fn find(&self, id: ScopeId) -> Option<&IrScope> {
        if self.id == id {
            return Some(self);
        }
        self.nested.iter().find_map(|s| s.find(id))
    }

    /// Number of scopes in this subtree, this one included.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        1 + self.nested.iter().map(IrScope::scope_count).sum::<usize>()
    }

    // ── Flags ───────────────────────────────────────────────────────────

    /// Current flags.
    #[must_use]
    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    /// Sets a flag.
    pub fn set_flag(&mut self, flag: ScopeFlags) {
        self.flags |= flag;
    }

    /// Returns `true` once [`IrScope::compute_scope_flags`] has run.
    #[must_use]
    pub fn flags_computed(&self) -> bool {
        self.flags_computed
    }

    /// Recomputes the flags of this subtree from its instructions.
    ///
    /// Nested closures are computed first because several flags propagate
    /// outward: a closure that breaks makes its parent able to receive breaks,
    /// and `END { }` registration anywhere taints the enclosing scope.
    pub fn compute_scope_flags(&mut self) {
        for child in &mut self.nested {
            child.compute_scope_flags();
        }

        let mut flags = self.flags & BUILDER_FLAGS;
        for instr in self.all_instrs() {
            match instr {
                Instr::Call(call) => {
                    let name = call.method.name.as_str();
                    if FRAME_AWARE_METHODS.contains(&name) {
                        flags |= ScopeFlags::REQUIRES_FRAME;
                        if name.contains("eval") {
                            flags |= ScopeFlags::USES_EVAL;
                        }
                    }
                    if SCOPE_CAPTURING_METHODS.contains(&name) {
                        flags |= ScopeFlags::BINDING_HAS_ESCAPED;
                    }
                    if BACKREF_METHODS.contains(&name) {
                        flags |= ScopeFlags::USES_BACKREF_OR_LASTLINE | ScopeFlags::REQUIRES_FRAME;
                    }
                }
                Instr::BuildClosure { .. } => flags |= ScopeFlags::BINDING_HAS_ESCAPED,
                Instr::NonlocalReturn { .. } => flags |= ScopeFlags::HAS_NONLOCAL_RETURNS,
                Instr::Break { .. } => flags |= ScopeFlags::HAS_BREAK_INSTRS,
                Instr::RecordEndBlock { .. } => flags |= ScopeFlags::HAS_END_BLOCKS,
                Instr::ReceiveClosure { .. } => flags |= ScopeFlags::RECEIVES_CLOSURE_ARG,
                _ => {}
            }
        }

        for child in self.nested.iter().filter(|c| c.kind.is_closure()) {
            let cf = child.flags;
            if cf.intersects(ScopeFlags::HAS_BREAK_INSTRS | ScopeFlags::CAN_RECEIVE_BREAKS) {
                flags |= ScopeFlags::CAN_RECEIVE_BREAKS;
            }
            if cf.intersects(
                ScopeFlags::HAS_NONLOCAL_RETURNS | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS,
            ) {
                flags |= ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS;
            }
            if cf.contains(ScopeFlags::USES_EVAL) {
                flags |= ScopeFlags::CAN_RECEIVE_BREAKS
                    | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS
                    | ScopeFlags::BINDING_HAS_ESCAPED;
            }
            if cf.contains(ScopeFlags::HAS_END_BLOCKS) {
                flags |= ScopeFlags::HAS_END_BLOCKS;
            }
        }

        self.flags = flags;
        self.flags_computed = true;
    }

    /// Returns `true` if only the safe pass subset may run on this scope.
    #[must_use]
    pub fn is_unsafe_for_optimization(&self) -> bool {
        self.flags.contains(ScopeFlags::HAS_END_BLOCKS)
    }

    /// Returns `true` if a call frame must be pushed on entry.
    #[must_use]
    pub fn requires_frame(&self) -> bool {
        self.flags.intersects(
            ScopeFlags::REQUIRES_FRAME
                | ScopeFlags::USES_EVAL
                | ScopeFlags::USES_BACKREF_OR_LASTLINE
                | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS,
        )
    }

    /// Returns `true` if locals must live in a heap binding.
    #[must_use]
    pub fn requires_binding(&self) -> bool {
        self.flags
            .intersects(ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::USES_EVAL)
            || !self.captured_locals().is_empty()
    }

    // ── Variable capture ────────────────────────────────────────────────

    /// This scope's own locals that some nested closure reads or writes.
    #[must_use]
    pub fn captured_locals(&self) -> FxHashSet<Variable> {
        let mut out = FxHashSet::default();
        for child in self.nested.iter().filter(|c| c.kind.is_closure()) {
            child.collect_uplevel_locals(1, &mut out);
        }
        out
    }

    /// Locals of this scope referenced by the nested closure `closure`,
    /// sorted for stable output.
    #[must_use]
    pub fn closure_captures(&self, closure: ScopeId) -> Vec<Variable> {
        let mut out = FxHashSet::default();
        if let Some(child) = self
            .nested
            .iter()
            .find(|c| c.id == closure && c.kind.is_closure())
        {
            child.collect_uplevel_locals(1, &mut out);
        }
        let mut vars: Vec<Variable> = out.into_iter().collect();
        vars.sort();
        vars
    }

    /// Locals this scope reads or writes in enclosing scopes (depth > 0).
    #[must_use]
    pub fn parent_locals(&self) -> FxHashSet<Variable> {
        let mut out = FxHashSet::default();
        for instr in self.all_instrs() {
            let defined = instr.result().into_iter().cloned();
            for var in instr.used_variables().into_iter().chain(defined) {
                if var.is_captured_from_parent() {
                    out.insert(var);
                }
            }
        }
        out
    }

    fn collect_uplevel_locals(&self, level: u32, out: &mut FxHashSet<Variable>) {
        for instr in self.all_instrs() {
            let defined = instr.result().into_iter().cloned();
            for var in instr.used_variables().into_iter().chain(defined) {
                if let Variable::Local { name, depth } = var {
                    if depth == level {
                        out.insert(Variable::local(name));
                    }
                }
            }
        }
        for child in self.nested.iter().filter(|c| c.kind.is_closure()) {
            child.collect_uplevel_locals(level + 1, out);
        }
    }

    // ── Cached analyses ─────────────────────────────────────────────────

    /// Dominator tree, if computed and still valid.
    #[must_use]
    pub fn dominators(&self) -> Option<&DominatorTree> {
        self.dominators.as_ref()
    }

    /// Stores the dominator tree.
    pub fn set_dominators(&mut self, tree: DominatorTree) {
        self.dominators = Some(tree);
    }

    /// Cached dataflow result registered under `name`.
    #[must_use]
    pub fn data_flow_solution<T: Any>(&self, name: &str) -> Option<&T> {
        self.solutions.get(name).and_then(|s| s.downcast_ref::<T>())
    }

    /// Caches a dataflow result under `name`, replacing any previous one.
    pub fn set_data_flow_solution<T: Any + Send + Sync>(&mut self, name: &'static str, value: T) {
        self.solutions.insert(name, Box::new(value));
    }

    /// Drops every cached dataflow result.
    pub fn reset_data_flow_solutions(&mut self) {
        self.solutions.clear();
    }

    /// Instructions marked dead by dead code elimination.
    #[must_use]
    pub fn dead_instructions(&self) -> &DeadInstructions {
        &self.dead
    }

    /// Mutable dead-instruction table.
    pub fn dead_instructions_mut(&mut self) -> &mut DeadInstructions {
        &mut self.dead
    }

    /// Deletes every instruction marked dead and clears the marks.
    ///
    /// Returns the number of instructions removed. Cached analyses are
    /// invalidated when anything was removed.
    pub fn sweep_dead_instructions(&mut self) -> usize {
        let marks = self.dead.take();
        let Some(cfg) = self.cfg.as_mut() else {
            return 0;
        };
        let mut removed = 0;
        for (block, dead) in marks {
            let Some(bb) = cfg.block_mut(block) else {
                continue;
            };
            let mut index = 0;
            bb.instrs_mut().retain(|_| {
                let keep = !dead.contains(index);
                index += 1;
                keep
            });
            removed += dead.count();
        }
        if removed > 0 {
            self.invalidate_analyses();
        }
        removed
    }

    /// Block order chosen by linearization.
    #[must_use]
    pub fn linearization(&self) -> Option<&[BlockId]> {
        self.linearization.as_deref()
    }

    /// Stores the block order and the derived interpreter instruction list.
    pub fn set_linearization(&mut self, order: Vec<BlockId>, interpreter: InterpreterContext) {
        self.linearization = Some(order);
        self.interpreter = Some(interpreter);
    }

    /// The interpreter-ready instruction list, once linearized.
    #[must_use]
    pub fn interpreter_context(&self) -> Option<&InterpreterContext> {
        self.interpreter.as_ref()
    }

    /// Drops every result derived from the current CFG shape.
    pub fn invalidate_analyses(&mut self) {
        self.dominators = None;
        self.solutions.clear();
        self.linearization = None;
        self.interpreter = None;
    }

    // ── Output ──────────────────────────────────────────────────────────

    /// Ensures the scope has been compiled and linearized, then returns the
    /// interpreter instruction list.
    ///
    /// # Errors
    ///
    /// Propagates any pass failure.
    pub fn prepare_for_interpretation(
        &mut self,
        ctx: &crate::compiler::CompilationContext,
    ) -> Result<&InterpreterContext> {
        if self.interpreter.is_none() {
            ctx.compile(self)?;
        }
        if self.interpreter.is_none() {
            crate::compiler::linearize_scope(self)?;
        }
        self.interpreter
            .as_ref()
            .ok_or_else(|| malformed_error!("scope {} has no linearization", self.name))
    }

    /// Human-readable dump of this scope's instructions.
    #[must_use]
    pub fn to_string_instrs(&self) -> String {
        let mut out = format!("{} {} [id: {}]\n", self.kind, self.name, self.id);
        match &self.cfg {
            Some(cfg) => out.push_str(&cfg.to_string_instrs()),
            None => {
                for instr in &self.instrs {
                    match instr {
                        Instr::Label(_) => out.push_str(&format!("{instr}\n")),
                        _ => out.push_str(&format!("  {instr}\n")),
                    }
                }
            }
        }
        out
    }
}

impl Clone for IrScope {
    /// Clones the IR and structural results; cached dataflow solutions are
    /// not carried over.
    fn clone(&self) -> Self {
        IrScope {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            line: self.line,
            required_args: self.required_args,
            instrs: self.instrs.clone(),
            cfg: self.cfg.clone(),
            nested: self.nested.clone(),
            flags: self.flags,
            flags_computed: self.flags_computed,
            alloc: self.alloc.clone(),
            dominators: self.dominators.clone(),
            dead: self.dead.clone(),
            linearization: self.linearization.clone(),
            interpreter: self.interpreter.clone(),
            solutions: FxHashMap::default(),
        }
    }
}

impl fmt::Debug for IrScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrScope")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("has_cfg", &self.cfg.is_some())
            .field("nested", &self.nested.len())
            .finish_non_exhaustive()
    }
}
