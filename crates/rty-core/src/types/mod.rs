//! The type lattice.
//!
//! `Type` is a sealed sum over every shape the checker can reason about.
//! Equality is structural. `Or`/`And` are kept in canonical form by their
//! `make` constructors (flattened, deduplicated, sorted, folded with no
//! composite on the right spine) so the subtype relation never needs to
//! re-normalize.
//!
//! `untyped` is the gradual escape hatch: it is deliberately both a subtype
//! and a supertype of everything, and failure paths in inference produce it
//! so one error does not cascade. Do not "fix" this.

mod constraint;
mod instantiate;
mod join_meet;
mod printer;
mod subtyping;

pub use constraint::TypeConstraint;

use crate::global_state::GlobalState;
use crate::names::NameRef;
use crate::symbols::{wk_sym, SymbolRef};
use serde::{Deserialize, Serialize};

/// Bit pattern of an `f64` literal, so literal types stay `Eq + Hash + Ord`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FloatBits(pub u64);

impl FloatBits {
    pub fn from_f64(v: f64) -> Self {
        FloatBits(v.to_bits())
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// The value of a literal type. Strings and symbols are interned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(FloatBits),
    String(NameRef),
    Symbol(NameRef),
}

impl Literal {
    /// The class this literal widens to.
    pub fn underlying_class(self) -> SymbolRef {
        match self {
            Literal::Integer(_) => wk_sym::INTEGER,
            Literal::Float(_) => wk_sym::FLOAT,
            Literal::String(_) => wk_sym::STRING,
            Literal::Symbol(_) => wk_sym::SYMBOL,
        }
    }
}

/// A type. See the module docs for canonical-form rules.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    /// `T.untyped`: compatible with everything in both directions.
    Untyped,
    /// `T.anything`: the top of the static lattice.
    Top,
    /// `T.noreturn`: the bottom of the static lattice.
    Bottom,
    /// An instance of a class or module.
    Class(SymbolRef),
    /// A generic class applied to type arguments, aligned with the class's
    /// type members.
    Applied { class: SymbolRef, args: Vec<Type> },
    /// A singleton value type; proxies its underlying class.
    LiteralType(Literal),
    /// Fixed-length heterogeneous array; proxies `Array[join of elems]`.
    Tuple(Vec<Type>),
    /// Fixed-key hash; keys and values are parallel, key-sorted. Proxies
    /// `Hash[K join, V join]`.
    Shape { keys: Vec<Literal>, values: Vec<Type> },
    /// Union. Canonical: see `Type::any`.
    Or(Box<Type>, Box<Type>),
    /// Intersection. Canonical: see `Type::all`.
    And(Box<Type>, Box<Type>),
    /// `T.self_type` in a signature; replaced at dispatch time.
    SelfTypeParam,
    /// A type variable: a type member of a generic class or a type argument
    /// of a generic method, identified by its symbol.
    TypeVar(SymbolRef),
    /// The type of a type literal in expression position (`Integer` as a
    /// value has type `Meta(Class(Integer))`).
    Meta(Box<Type>),
    /// A named alias; dereference through the symbol's `result_type`.
    Alias(SymbolRef),
}

impl Type {
    // Constructors for the distinguished constants, named after the facade
    // the rest of the pipeline uses.

    #[inline]
    pub fn untyped() -> Type {
        Type::Untyped
    }

    #[inline]
    pub fn top() -> Type {
        Type::Top
    }

    #[inline]
    pub fn bottom() -> Type {
        Type::Bottom
    }

    #[inline]
    pub fn nil_class() -> Type {
        Type::Class(wk_sym::NIL_CLASS)
    }

    #[inline]
    pub fn true_class() -> Type {
        Type::Class(wk_sym::TRUE_CLASS)
    }

    #[inline]
    pub fn false_class() -> Type {
        Type::Class(wk_sym::FALSE_CLASS)
    }

    /// `T::Boolean` is sugar for `TrueClass | FalseClass`.
    pub fn boolean() -> Type {
        Type::any(Type::true_class(), Type::false_class())
    }

    pub fn falsy() -> Type {
        Type::any(Type::nil_class(), Type::false_class())
    }

    pub fn nilable(t: Type) -> Type {
        Type::any(Type::nil_class(), t)
    }

    /// Canonical union constructor: flattens nested unions, drops duplicates,
    /// absorbs `untyped`/`top`, erases `bottom`, sorts, and left-folds so no
    /// `Or` ever appears on the right spine.
    pub fn any(a: Type, b: Type) -> Type {
        let mut members = Vec::new();
        collect_or(a, &mut members);
        collect_or(b, &mut members);
        if members.iter().any(|t| matches!(t, Type::Untyped)) {
            return Type::Untyped;
        }
        if members.iter().any(|t| matches!(t, Type::Top)) {
            return Type::Top;
        }
        members.retain(|t| !matches!(t, Type::Bottom));
        members.sort();
        members.dedup();
        match members.len() {
            0 => Type::Bottom,
            _ => fold_composite(members, |l, r| Type::Or(Box::new(l), Box::new(r))),
        }
    }

    /// Canonical intersection constructor, dual to `any`.
    pub fn all(a: Type, b: Type) -> Type {
        let mut members = Vec::new();
        collect_and(a, &mut members);
        collect_and(b, &mut members);
        if members.iter().any(|t| matches!(t, Type::Untyped)) {
            return Type::Untyped;
        }
        if members.iter().any(|t| matches!(t, Type::Bottom)) {
            return Type::Bottom;
        }
        members.retain(|t| !matches!(t, Type::Top));
        members.sort();
        members.dedup();
        match members.len() {
            0 => Type::Top,
            _ => fold_composite(members, |l, r| Type::And(Box::new(l), Box::new(r))),
        }
    }

    /// A shape from unsorted key/value pairs; keys are sorted into canonical
    /// order with their values carried along.
    pub fn shape(mut pairs: Vec<(Literal, Type)>) -> Type {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let (keys, values) = pairs.into_iter().unzip();
        Type::Shape { keys, values }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, Type::Untyped)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Type::Bottom)
    }

    /// Whether this shape proxies a coarser underlying type.
    pub fn is_proxy(&self) -> bool {
        matches!(
            self,
            Type::LiteralType(_) | Type::Tuple(_) | Type::Shape { .. }
        )
    }

    /// The coarser type a proxy widens to. Literals widen to their class,
    /// tuples to `Array[join of elements]`, shapes to `Hash[joined keys,
    /// joined values]`.
    pub fn underlying(&self, gs: &GlobalState) -> Option<Type> {
        match self {
            Type::LiteralType(lit) => Some(Type::Class(lit.underlying_class())),
            Type::Tuple(elems) => {
                let elem = elems
                    .iter()
                    .cloned()
                    .reduce(|a, b| join_meet::join(gs, &a, &b))
                    .unwrap_or(Type::Bottom);
                Some(Type::Applied {
                    class: wk_sym::ARRAY,
                    args: vec![elem],
                })
            }
            Type::Shape { keys, values } => {
                let key = keys
                    .iter()
                    .map(|k| Type::LiteralType(*k))
                    .reduce(|a, b| join_meet::join(gs, &a, &b))
                    .unwrap_or(Type::Bottom);
                let value = values
                    .iter()
                    .cloned()
                    .reduce(|a, b| join_meet::join(gs, &a, &b))
                    .unwrap_or(Type::Bottom);
                Some(Type::Applied {
                    class: wk_sym::HASH,
                    args: vec![key, value],
                })
            }
            _ => None,
        }
    }

    /// Iterate the members of a canonical union (or yield `self` once).
    pub fn or_components(&self) -> Vec<&Type> {
        let mut out = Vec::new();
        fn walk<'t>(t: &'t Type, out: &mut Vec<&'t Type>) {
            match t {
                Type::Or(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Iterate the members of a canonical intersection (or yield `self`
    /// once).
    pub fn and_components(&self) -> Vec<&Type> {
        let mut out = Vec::new();
        fn walk<'t>(t: &'t Type, out: &mut Vec<&'t Type>) {
            match t {
                Type::And(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Follow alias symbols to the type they name. Cycle-safe: gives up and
    /// returns `untyped` after a bounded number of hops.
    pub fn dealias(&self, gs: &GlobalState) -> Type {
        let mut current = self.clone();
        for _ in 0..64 {
            match current {
                Type::Alias(sym) => match gs.symbol_data(sym).result_type.clone() {
                    Some(t) => current = t,
                    None => return Type::Untyped,
                },
                other => return other,
            }
        }
        Type::Untyped
    }
}

fn collect_or(t: Type, out: &mut Vec<Type>) {
    match t {
        Type::Or(l, r) => {
            collect_or(*l, out);
            collect_or(*r, out);
        }
        other => out.push(other),
    }
}

fn collect_and(t: Type, out: &mut Vec<Type>) {
    match t {
        Type::And(l, r) => {
            collect_and(*l, out);
            collect_and(*r, out);
        }
        other => out.push(other),
    }
}

/// Left-fold sorted members so composites only ever appear on the left spine.
fn fold_composite(members: Vec<Type>, make: impl Fn(Type, Type) -> Type) -> Type {
    let mut iter = members.into_iter();
    let first = iter.next().expect("fold_composite on empty member list");
    iter.fold(first, make)
}

// Re-export the operator entry points at the module root; this is the
// surface the rest of the pipeline calls.
pub use instantiate::{instantiate, replace_self_type, result_type_as_seen_from};
pub use join_meet::{approximate_subtract, join, meet};
pub use printer::{show, show_widened};
pub use subtyping::{is_subtype, is_subtype_under};

#[cfg(test)]
#[path = "../tests/types_basic.rs"]
mod tests;
