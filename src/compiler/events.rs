//! Change tracking for the pass pipeline.
//!
//! Passes report what they did through an [`EventLog`] shared by every scope
//! of one compilation. The log is append-only and can be written from several
//! threads at once, so siblings compiled by
//! [`PassScheduler::run_parallel`](super::PassScheduler::run_parallel) report
//! into the same log.
//!
//! # Example
//!
//! ```rust
//! use irscope::{compiler::{EventKind, EventLog}, ir::ScopeId};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .at(ScopeId(3), 2)
//!     .pass("LocalOptimization")
//!     .message("1 + 2 => 3");
//! log.info("pipeline finished");
//!
//! assert_eq!(log.transformation_count(), 1);
//! assert_eq!(log.summary(), "1 constant folded");
//! ```

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::ir::ScopeId;

/// Categories of events passes report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EventKind {
    /// A flat instruction list was turned into a CFG.
    CfgBuilt,
    /// A block was removed or merged into its predecessor.
    BlockRemoved,
    /// An instruction was marked dead or deleted.
    InstructionRemoved,
    /// A `StoreLocalVar` was inserted.
    StoreInserted,
    /// A `LoadLocalVar` was inserted.
    LoadInserted,
    /// A frame or binding push/pop was inserted.
    FrameInstrInserted,
    /// A call was replaced by its folded constant.
    ConstantFolded,
    /// A method version guard was inserted.
    GuardInserted,
    /// An operand was replaced by a cheaper equivalent.
    CopyPropagated,
    /// A call site was replaced by the callee body.
    MethodInlined,
    /// A block order and interpreter instruction list were produced.
    ScopeLinearized,
    /// A dataflow problem or the dominator tree was solved and cached.
    AnalysisComputed,

    /// A pass started on a scope.
    PassStarted,
    /// A pass finished on a scope.
    PassCompleted,
    /// A scope was skipped by an optimizing pass.
    ScopeSkipped,

    /// Informational message.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// Something failed.
    Error,
}

impl EventKind {
    /// Human-readable description of this kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::CfgBuilt => "cfg built",
            Self::BlockRemoved => "block removed",
            Self::InstructionRemoved => "instruction removed",
            Self::StoreInserted => "store inserted",
            Self::LoadInserted => "load inserted",
            Self::FrameInstrInserted => "frame instruction inserted",
            Self::ConstantFolded => "constant folded",
            Self::GuardInserted => "guard inserted",
            Self::CopyPropagated => "copy propagated",
            Self::MethodInlined => "method inlined",
            Self::ScopeLinearized => "scope linearized",
            Self::AnalysisComputed => "analysis computed",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::ScopeSkipped => "scope skipped",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns `true` if this kind describes a change to the IR.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::BlockRemoved
                | Self::InstructionRemoved
                | Self::StoreInserted
                | Self::LoadInserted
                | Self::FrameInstrInserted
                | Self::ConstantFolded
                | Self::GuardInserted
                | Self::CopyPropagated
                | Self::MethodInlined
        )
    }

    /// Returns `true` for info, warning and error.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// The scope it happened in.
    pub scope: Option<ScopeId>,
    /// Block id or instruction position within the scope.
    pub location: Option<usize>,
    /// Human-readable detail.
    pub message: String,
    /// Reporting pass.
    pub pass: Option<&'static str>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Event {
            kind,
            scope: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(scope) = self.scope {
            write!(f, " scope {scope}")?;
        }
        if let Some(pass) = self.pass {
            write!(f, " ({pass})")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Fluent builder returned by [`EventLog::record`].
///
/// The event is appended when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    scope: Option<ScopeId>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        EventBuilder {
            log,
            kind,
            scope: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets scope and location.
    #[must_use]
    pub fn at(mut self, scope: ScopeId, location: usize) -> Self {
        self.scope = Some(scope);
        self.location = Some(location);
        self
    }

    /// Sets only the scope.
    #[must_use]
    pub fn scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Sets only the location.
    #[must_use]
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the message; defaults to the kind's description.
    #[must_use]
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Sets the reporting pass.
    #[must_use]
    pub fn pass(mut self, pass: &'static str) -> Self {
        self.pass = Some(pass);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());
        self.log.events.push(Event {
            kind: self.kind,
            scope: self.scope,
            location: self.location,
            message,
            pass: self.pass,
        });
    }
}

/// Append-only, thread-safe collection of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let log = EventLog::new();
        log.merge(self);
        log
    }
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        EventLog {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns `true` if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of every event in `other`.
    pub fn merge(&self, other: &EventLog) {
        for event in other.iter() {
            self.events.push(event.clone());
        }
    }

    /// Returns `true` if an event of `kind` exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Returns `true` if an event of any of `kinds` exists.
    #[must_use]
    pub fn has_any(&self, kinds: &[EventKind]) -> bool {
        self.iter().any(|e| kinds.contains(&e.kind))
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.filter_kind(kind).count()
    }

    /// All events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Events of one kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Events reported for one scope.
    pub fn filter_scope(&self, scope: ScopeId) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.scope == Some(scope))
    }

    /// Transformation events.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Diagnostic events.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Errors.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Event counts grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> FxHashMap<EventKind, usize> {
        let mut counts = FxHashMap::default();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.transformations().count()
    }

    /// Number of distinct scopes that reported anything.
    #[must_use]
    pub fn scopes_affected(&self) -> usize {
        self.iter()
            .filter_map(|e| e.scope)
            .collect::<FxHashSet<_>>()
            .len()
    }

    /// One-line summary of the transformations, e.g. `"2 constant folded, 1 method inlined"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }
        let mut counts: Vec<(EventKind, usize)> = self
            .count_by_kind()
            .into_iter()
            .filter(|(kind, _)| kind.is_transformation())
            .collect();
        if counts.is_empty() {
            return format!("{} events", self.len());
        }
        counts.sort();
        counts
            .into_iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_message_to_description() {
        let log = EventLog::new();
        log.record(EventKind::CfgBuilt).scope(ScopeId(1));

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "cfg built");
        assert_eq!(event.scope, Some(ScopeId(1)));
        assert_eq!(event.location, None);
        assert_eq!(event.to_string(), "[cfg built] scope 1 cfg built");
    }

    #[test]
    fn test_queries() {
        let log = EventLog::new();
        log.record(EventKind::StoreInserted).at(ScopeId(0), 4);
        log.record(EventKind::StoreInserted).at(ScopeId(0), 7);
        log.record(EventKind::MethodInlined).at(ScopeId(2), 1);
        log.warn("odd");

        assert_eq!(log.len(), 4);
        assert_eq!(log.count_kind(EventKind::StoreInserted), 2);
        assert!(log.has_any(&[EventKind::LoadInserted, EventKind::MethodInlined]));
        assert!(!log.has(EventKind::Error));
        assert_eq!(log.filter_scope(ScopeId(0)).count(), 2);
        assert_eq!(log.scopes_affected(), 2);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.diagnostics().count(), 1);
        assert_eq!(log.summary(), "2 store inserted, 1 method inlined");
    }

    #[test]
    fn test_summary_without_transformations() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.record(EventKind::PassStarted);
        assert_eq!(log.summary(), "1 events");
    }

    #[test]
    fn test_clone_and_merge() {
        let a = EventLog::new();
        a.record(EventKind::ConstantFolded);
        let b = a.clone();
        b.record(EventKind::GuardInserted);
        a.merge(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.count_kind(EventKind::ConstantFolded), 2);
    }

    #[test]
    fn test_concurrent_recording() {
        use rayon::prelude::*;

        let log = EventLog::new();
        (0..64u32).into_par_iter().for_each(|i| {
            log.record(EventKind::InstructionRemoved).at(ScopeId(i), 0);
        });
        assert_eq!(log.len(), 64);
        assert_eq!(log.scopes_affected(), 64);
    }
}
