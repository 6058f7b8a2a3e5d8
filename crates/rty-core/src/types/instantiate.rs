//! Structural substitution over types: constraint instantiation, self-type
//! replacement, and re-expressing inherited types in a subclass's
//! type-argument coordinates.

use super::{Type, TypeConstraint};
use crate::global_state::GlobalState;
use crate::symbols::SymbolRef;

/// Substitute solved type variables by their solutions; unsolved variables
/// stay intact. Idempotent on fully-solved inputs.
pub fn instantiate(gs: &GlobalState, t: &Type, constraint: &TypeConstraint) -> Type {
    map_type(t, &mut |leaf| match leaf {
        Type::TypeVar(var) => constraint.solution_for(*var).cloned(),
        _ => None,
    })
    .unwrap_or_else(|| t.clone())
    .renormalized(gs)
}

/// Replace the `T.self_type` marker with the receiver's type.
pub fn replace_self_type(gs: &GlobalState, t: &Type, self_type: &Type) -> Type {
    map_type(t, &mut |leaf| match leaf {
        Type::SelfTypeParam => Some(self_type.clone()),
        _ => None,
    })
    .unwrap_or_else(|| t.clone())
    .renormalized(gs)
}

/// Re-express a type declared on `owner` (a generic class) in the coordinate
/// system of a receiver applied to `targs`: every `TypeVar` naming one of
/// `owner`'s type members is replaced by the aligned argument.
pub fn result_type_as_seen_from(
    gs: &GlobalState,
    t: &Type,
    owner: SymbolRef,
    targs: &[Type],
) -> Type {
    let members = &gs.symbol_data(owner).type_members;
    if members.is_empty() || targs.is_empty() {
        return t.clone();
    }
    map_type(t, &mut |leaf| match leaf {
        Type::TypeVar(var) => members
            .iter()
            .position(|m| m == var)
            .and_then(|i| targs.get(i))
            .cloned(),
        _ => None,
    })
    .unwrap_or_else(|| t.clone())
    .renormalized(gs)
}

impl Type {
    /// Substitution can break `Or`/`And` canonical form (a variable replaced
    /// by a union, say); rebuild composites through their constructors.
    fn renormalized(self, gs: &GlobalState) -> Type {
        match self {
            Type::Or(l, r) => Type::any(l.renormalized(gs), r.renormalized(gs)),
            Type::And(l, r) => Type::all(l.renormalized(gs), r.renormalized(gs)),
            Type::Applied { class, args } => Type::Applied {
                class,
                args: args.into_iter().map(|a| a.renormalized(gs)).collect(),
            },
            Type::Tuple(elems) => {
                Type::Tuple(elems.into_iter().map(|e| e.renormalized(gs)).collect())
            }
            Type::Shape { keys, values } => Type::Shape {
                keys,
                values: values.into_iter().map(|v| v.renormalized(gs)).collect(),
            },
            Type::Meta(w) => Type::Meta(Box::new(w.renormalized(gs))),
            other => other,
        }
    }
}

/// Bottom-up map: `f` is offered every node; `Some` replaces the node
/// (children already rewritten). Returns `None` when nothing changed, so
/// untouched types are not re-allocated.
fn map_type(t: &Type, f: &mut impl FnMut(&Type) -> Option<Type>) -> Option<Type> {
    let rebuilt = match t {
        Type::Or(l, r) => {
            let ml = map_type(l, f);
            let mr = map_type(r, f);
            if ml.is_none() && mr.is_none() {
                None
            } else {
                Some(Type::Or(
                    Box::new(ml.unwrap_or_else(|| (**l).clone())),
                    Box::new(mr.unwrap_or_else(|| (**r).clone())),
                ))
            }
        }
        Type::And(l, r) => {
            let ml = map_type(l, f);
            let mr = map_type(r, f);
            if ml.is_none() && mr.is_none() {
                None
            } else {
                Some(Type::And(
                    Box::new(ml.unwrap_or_else(|| (**l).clone())),
                    Box::new(mr.unwrap_or_else(|| (**r).clone())),
                ))
            }
        }
        Type::Applied { class, args } => {
            map_vec(args, f).map(|args| Type::Applied { class: *class, args })
        }
        Type::Tuple(elems) => map_vec(elems, f).map(Type::Tuple),
        Type::Shape { keys, values } => map_vec(values, f).map(|values| Type::Shape {
            keys: keys.clone(),
            values,
        }),
        Type::Meta(w) => map_type(w, f).map(|w| Type::Meta(Box::new(w))),
        _ => None,
    };
    let candidate = rebuilt.as_ref().unwrap_or(t);
    match f(candidate) {
        Some(replacement) => Some(replacement),
        None => rebuilt,
    }
}

fn map_vec(items: &[Type], f: &mut impl FnMut(&Type) -> Option<Type>) -> Option<Vec<Type>> {
    let mut changed = false;
    let mapped: Vec<Type> = items
        .iter()
        .map(|item| match map_type(item, f) {
            Some(new) => {
                changed = true;
                new
            }
            None => item.clone(),
        })
        .collect();
    changed.then_some(mapped)
}
