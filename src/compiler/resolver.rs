//! Method lookup for the optimizer.
//!
//! The object model is not part of this crate. Passes that want to know what
//! a call does ask a [`MethodResolver`]; the answer carries the method's
//! current [`VersionToken`] and, for methods whose result can be computed at
//! compile time, a [`Folder`].
//!
//! [`CoreMethodTable`] is the built-in resolver. It knows fixnum and float
//! arithmetic and comparisons, and keeps one [`VersionedCell`] per method so
//! that redefining a core method invalidates every guard emitted against the
//! old definition.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::debug;
use strum::IntoEnumIterator;

use crate::ir::{MethAddr, Operand, ValueKind, VersionToken};

/// Computes the result of a call from a constant receiver and arguments.
pub type Folder = fn(&Operand, &[Operand]) -> Option<Operand>;

/// What a resolver knows about one method.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// The method, with the receiver kind it was resolved against
    pub handle: MethAddr,
    /// Version at lookup time
    pub version: VersionToken,
    /// Compile-time evaluator, if the method is pure on constants
    pub folder: Option<Folder>,
}

/// Resolves `(receiver kind, method name)` to a method.
pub trait MethodResolver: Send + Sync {
    /// Looks up `name` on receivers of `receiver_kind`.
    fn resolve(&self, receiver_kind: ValueKind, name: &str) -> Option<ResolvedMethod>;

    /// Current version of `handle`, used to check a guard.
    fn current_version(&self, handle: &MethAddr) -> Option<VersionToken>;
}

/// A version counter that only moves forward.
#[derive(Debug, Default)]
pub struct VersionedCell {
    version: AtomicU64,
}

impl VersionedCell {
    /// Creates a cell at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current version.
    #[must_use]
    pub fn current(&self) -> VersionToken {
        VersionToken(self.version.load(Ordering::Acquire))
    }

    /// Bumps the version; guards holding an older token fail from now on.
    pub fn invalidate(&self) -> VersionToken {
        VersionToken(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Returns `true` if `token` is still the current version.
    #[must_use]
    pub fn is_current(&self, token: VersionToken) -> bool {
        self.current() == token
    }
}

#[derive(Debug)]
struct CoreMethod {
    cell: VersionedCell,
    folder: Option<Folder>,
}

/// Fixnum and float arithmetic and comparisons.
///
/// Entries are keyed by receiver kind and name. All methods are thread-safe;
/// the table can be shared by every thread compiling scopes.
#[derive(Debug)]
pub struct CoreMethodTable {
    methods: DashMap<(ValueKind, String), CoreMethod>,
}

impl Default for CoreMethodTable {
    fn default() -> Self {
        Self::new()
    }
}

const ARITHMETIC: &[&str] = &["+", "-", "*", "/", "%"];
const COMPARISON: &[&str] = &["<", "<=", ">", ">=", "=="];

impl CoreMethodTable {
    /// Creates the table with every core numeric method registered.
    #[must_use]
    pub fn new() -> Self {
        let table = CoreMethodTable {
            methods: DashMap::new(),
        };
        for kind in [ValueKind::Fixnum, ValueKind::Float] {
            for name in ARITHMETIC.iter().chain(COMPARISON) {
                table.methods.insert(
                    (kind, (*name).to_string()),
                    CoreMethod {
                        cell: VersionedCell::new(),
                        folder: Some(folder_for(name)),
                    },
                );
            }
        }
        table
    }

    /// Creates an empty table, for resolvers that know nothing.
    #[must_use]
    pub fn empty() -> Self {
        CoreMethodTable {
            methods: DashMap::new(),
        }
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Invalidates `name` on `kind` without changing its behavior.
    ///
    /// Returns the new version, or `None` if the method is unknown.
    pub fn invalidate(&self, kind: ValueKind, name: &str) -> Option<VersionToken> {
        self.methods
            .get(&(kind, name.to_string()))
            .map(|m| m.cell.invalidate())
    }

    /// Replaces `name` on `kind`, as a user redefinition would.
    ///
    /// The version is bumped and the folder replaced. A redefinition with no
    /// folder stops further folding of the method.
    pub fn redefine(&self, kind: ValueKind, name: &str, folder: Option<Folder>) -> VersionToken {
        let mut entry = self
            .methods
            .entry((kind, name.to_string()))
            .or_insert_with(|| CoreMethod {
                cell: VersionedCell::new(),
                folder: None,
            });
        entry.folder = folder;
        let version = entry.cell.invalidate();
        debug!("redefined {kind}#{name}, now {version}");
        version
    }
}

impl MethodResolver for CoreMethodTable {
    fn resolve(&self, receiver_kind: ValueKind, name: &str) -> Option<ResolvedMethod> {
        let entry = self.methods.get(&(receiver_kind, name.to_string()))?;
        Some(ResolvedMethod {
            handle: MethAddr::new(name).with_hint(receiver_kind),
            version: entry.cell.current(),
            folder: entry.folder,
        })
    }

    fn current_version(&self, handle: &MethAddr) -> Option<VersionToken> {
        let kind = handle.receiver_hint?;
        self.methods
            .get(&(kind, handle.name.clone()))
            .map(|m| m.cell.current())
    }
}

/// Every core method name the table registers per numeric kind.
pub fn core_method_names() -> impl Iterator<Item = &'static str> {
    ARITHMETIC.iter().chain(COMPARISON).copied()
}

/// Numeric kinds the table covers.
pub fn core_receiver_kinds() -> impl Iterator<Item = ValueKind> {
    ValueKind::iter().filter(|k| matches!(k, ValueKind::Fixnum | ValueKind::Float))
}

// ── Folders ──────────────────────────────────────────────────────────────

fn folder_for(name: &str) -> Folder {
    match name {
        "+" => fold_add,
        "-" => fold_sub,
        "*" => fold_mul,
        "/" => fold_div,
        "%" => fold_mod,
        "<" => fold_lt,
        "<=" => fold_le,
        ">" => fold_gt,
        ">=" => fold_ge,
        _ => fold_eq,
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn numbers(recv: &Operand, args: &[Operand]) -> Option<(Num, Num)> {
    let num = |op: &Operand| match op {
        Operand::Fixnum(v) => Some(Num::Int(*v)),
        Operand::Float(v) => Some(Num::Float(*v)),
        _ => None,
    };
    match args {
        [arg] => Some((num(recv)?, num(arg)?)),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(n: &Num) -> f64 {
    match n {
        Num::Int(v) => *v as f64,
        Num::Float(v) => *v,
    }
}

fn arith(
    recv: &Operand,
    args: &[Operand],
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Option<Operand> {
    match numbers(recv, args)? {
        (Num::Int(a), Num::Int(b)) => int(a, b).map(Operand::Fixnum),
        (a, b) => Some(Operand::Float(float(as_float(&a), as_float(&b)))),
    }
}

fn compare(
    recv: &Operand,
    args: &[Operand],
    float: fn(f64, f64) -> bool,
    int: fn(i64, i64) -> bool,
) -> Option<Operand> {
    match numbers(recv, args)? {
        (Num::Int(a), Num::Int(b)) => Some(Operand::Boolean(int(a, b))),
        (a, b) => Some(Operand::Boolean(float(as_float(&a), as_float(&b)))),
    }
}

fn fold_add(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    arith(recv, args, i64::checked_add, |a, b| a + b)
}

fn fold_sub(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    arith(recv, args, i64::checked_sub, |a, b| a - b)
}

fn fold_mul(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    arith(recv, args, i64::checked_mul, |a, b| a * b)
}

/// Integer division rounds toward negative infinity; division by zero raises
/// at run time and is not folded.
fn fold_div(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    arith(
        recv,
        args,
        |a, b| {
            let q = a.checked_div(b)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q.checked_sub(1)
            } else {
                Some(q)
            }
        },
        |a, b| a / b,
    )
}

/// The result takes the sign of the divisor.
fn fold_mod(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    arith(
        recv,
        args,
        |a, b| {
            let r = a.checked_rem(b)?;
            if r != 0 && ((r < 0) != (b < 0)) {
                Some(r + b)
            } else {
                Some(r)
            }
        },
        |a, b| {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        },
    )
}

fn fold_lt(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    compare(recv, args, |a, b| a < b, |a, b| a < b)
}

fn fold_le(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    compare(recv, args, |a, b| a <= b, |a, b| a <= b)
}

fn fold_gt(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    compare(recv, args, |a, b| a > b, |a, b| a > b)
}

fn fold_ge(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    compare(recv, args, |a, b| a >= b, |a, b| a >= b)
}

#[allow(clippy::float_cmp)]
fn fold_eq(recv: &Operand, args: &[Operand]) -> Option<Operand> {
    compare(recv, args, |a, b| a == b, |a, b| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(kind: ValueKind, name: &str, recv: Operand, arg: Operand) -> Option<Operand> {
        let table = CoreMethodTable::new();
        let resolved = table.resolve(kind, name)?;
        (resolved.folder?)(&recv, &[arg])
    }

    #[test]
    fn test_fixnum_arithmetic() {
        use Operand::Fixnum;
        let k = ValueKind::Fixnum;
        assert_eq!(fold(k, "+", Fixnum(1), Fixnum(2)), Some(Fixnum(3)));
        assert_eq!(fold(k, "-", Fixnum(1), Fixnum(2)), Some(Fixnum(-1)));
        assert_eq!(fold(k, "*", Fixnum(6), Fixnum(7)), Some(Fixnum(42)));
        assert_eq!(fold(k, "/", Fixnum(-7), Fixnum(2)), Some(Fixnum(-4)));
        assert_eq!(fold(k, "%", Fixnum(-7), Fixnum(3)), Some(Fixnum(2)));
        assert_eq!(fold(k, "%", Fixnum(7), Fixnum(-3)), Some(Fixnum(-2)));
    }

    #[test]
    fn test_unfoldable_cases() {
        use Operand::Fixnum;
        let k = ValueKind::Fixnum;
        assert_eq!(fold(k, "/", Fixnum(1), Fixnum(0)), None);
        assert_eq!(fold(k, "+", Fixnum(i64::MAX), Fixnum(1)), None);
        assert_eq!(fold(k, "+", Fixnum(1), Operand::Str("a".into())), None);
        assert!(CoreMethodTable::new().resolve(ValueKind::Str, "+").is_none());
    }

    #[test]
    fn test_mixed_and_comparisons() {
        assert_eq!(
            fold(ValueKind::Fixnum, "+", Operand::Fixnum(1), Operand::Float(0.5)),
            Some(Operand::Float(1.5))
        );
        assert_eq!(
            fold(ValueKind::Float, "<", Operand::Float(1.0), Operand::Fixnum(2)),
            Some(Operand::Boolean(true))
        );
        assert_eq!(
            fold(ValueKind::Fixnum, "==", Operand::Fixnum(2), Operand::Fixnum(3)),
            Some(Operand::Boolean(false))
        );
    }

    #[test]
    fn test_versions() {
        let table = CoreMethodTable::new();
        assert_eq!(table.len(), 20);
        let before = table.resolve(ValueKind::Fixnum, "+").unwrap();
        assert_eq!(before.version, VersionToken(0));
        assert_eq!(before.handle.to_string(), "Fixnum#+");

        let after = table.redefine(ValueKind::Fixnum, "+", None);
        assert_eq!(after, VersionToken(1));
        assert_eq!(table.current_version(&before.handle), Some(after));
        assert!(table.resolve(ValueKind::Fixnum, "+").unwrap().folder.is_none());

        // Other methods are untouched.
        assert_eq!(
            table.resolve(ValueKind::Fixnum, "-").unwrap().version,
            VersionToken(0)
        );
        assert_eq!(table.invalidate(ValueKind::Str, "+"), None);
    }

    #[test]
    fn test_versioned_cell() {
        let cell = VersionedCell::new();
        let token = cell.current();
        assert!(cell.is_current(token));
        cell.invalidate();
        assert!(!cell.is_current(token));
        assert_eq!(core_method_names().count(), 10);
        assert_eq!(core_receiver_kinds().count(), 2);
    }
}
