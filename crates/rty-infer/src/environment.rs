//! Per-block typing environments and flow-sensitive knowledge.
//!
//! An environment maps locals to types. Alongside it, each block records
//! *knowledge*: which locals hold the result of a type test (`nil?`,
//! `is_a?`, literal equality), so a conditional exit on such a local refines
//! the subject variable along the two outgoing edges. Refinements apply only
//! on the edges; the merge at a join point sees the unrefined join.

use rty_core::types::{approximate_subtract, join, meet};
use rty_core::{GlobalState, Type};
use rty_cfg::LocalRef;
use rustc_hash::FxHashMap;

/// What a test local, when truthy, says about a subject local.
#[derive(Clone, Debug)]
pub(crate) enum TestKind {
    /// The subject itself was the condition: truthiness.
    Truthy,
    /// `subject.nil?`
    NilCheck,
    /// `subject.is_a?(ty)` / `kind_of?`
    IsA(Type),
    /// `subject == <literal>`
    LiteralEq(Type),
}

#[derive(Clone, Debug)]
pub(crate) struct Test {
    pub subject: LocalRef,
    pub kind: TestKind,
    /// Produced by `!`: polarity is flipped.
    pub negated: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Environment {
    types: FxHashMap<LocalRef, Type>,
}

impl Environment {
    pub fn get(&self, local: LocalRef) -> Type {
        self.types.get(&local).cloned().unwrap_or(Type::Untyped)
    }

    pub fn set(&mut self, local: LocalRef, ty: Type) {
        self.types.insert(local, ty);
    }

    /// Merge another environment in, joining types per local. In SSA every
    /// read is dominated by its write, so a local present on only one side
    /// is carried over unchanged.
    pub fn merge_from(&mut self, gs: &GlobalState, other: &Environment) {
        for (&local, ty) in &other.types {
            match self.types.get(&local) {
                Some(existing) => {
                    let joined = join(gs, existing, ty);
                    self.types.insert(local, joined);
                }
                None => {
                    self.types.insert(local, ty.clone());
                }
            }
        }
    }

    /// Apply one test outcome to the subject variable.
    pub fn refine(&mut self, gs: &GlobalState, test: &Test, branch_taken: bool) {
        let positive = branch_taken != test.negated;
        let current = self.get(test.subject);
        if current.is_untyped() {
            // Nothing to refine; untyped swallows every test.
            return;
        }
        let refined = match (&test.kind, positive) {
            (TestKind::Truthy, true) => approximate_subtract(gs, &current, &Type::falsy()),
            (TestKind::Truthy, false) => meet(gs, &current, &Type::falsy()),
            (TestKind::NilCheck, true) => meet(gs, &current, &Type::nil_class()),
            (TestKind::NilCheck, false) => {
                approximate_subtract(gs, &current, &Type::nil_class())
            }
            (TestKind::IsA(ty), true) => meet(gs, &current, ty),
            (TestKind::IsA(ty), false) => approximate_subtract(gs, &current, ty),
            (TestKind::LiteralEq(ty), true) => meet(gs, &current, ty),
            (TestKind::LiteralEq(ty), false) => approximate_subtract(gs, &current, ty),
        };
        self.types.insert(test.subject, refined);
    }
}
