//! Least upper bound (`join`) and greatest lower bound (`meet`).
//!
//! Both are commutative, associative and idempotent, absorb `untyped`, and
//! short-circuit when one side already fits the other. Class pairs that share
//! an ancestor below `Object` collapse to their nearest common superclass;
//! unrelated classes stay as a normalized union so nilable and refinement
//! reasoning keeps its precision. (Collapsing *everything* to `Object` would
//! satisfy the lattice laws but erase exactly the distinctions flow-sensitive
//! checks rely on.)

use super::subtyping::{is_subtype, symbol_is_module};
use super::Type;
use crate::global_state::GlobalState;
use crate::symbols::{wk_sym, SymbolRef};

/// Least upper bound.
pub fn join(gs: &GlobalState, a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    if a.is_untyped() || b.is_untyped() {
        return Type::Untyped;
    }
    if is_subtype(gs, a, b) {
        return b.clone();
    }
    if is_subtype(gs, b, a) {
        return a.clone();
    }

    // Unions merge member-wise: each incoming member gets one collapse
    // attempt against every accumulated member (components of a canonical
    // union are never unions themselves, so these joins terminate).
    if matches!(a, Type::Or(_, _)) || matches!(b, Type::Or(_, _)) {
        let mut members: Vec<Type> = a.or_components().into_iter().cloned().collect();
        for incoming in b.or_components() {
            insert_joined(gs, &mut members, incoming);
        }
        return members
            .into_iter()
            .reduce(Type::any)
            .unwrap_or(Type::Bottom);
    }

    match (a, b) {
        (Type::Class(ca), Type::Class(cb)) => {
            if let Some(lca) = nearest_common_superclass(gs, *ca, *cb) {
                return Type::Class(lca);
            }
            Type::any(a.clone(), b.clone())
        }
        (Type::Tuple(ea), Type::Tuple(eb)) if ea.len() == eb.len() => Type::Tuple(
            ea.iter()
                .zip(eb.iter())
                .map(|(x, y)| join(gs, x, y))
                .collect(),
        ),
        (
            Type::Shape { keys: ka, values: va },
            Type::Shape { keys: kb, values: vb },
        ) if ka == kb => Type::Shape {
            keys: ka.clone(),
            values: va
                .iter()
                .zip(vb.iter())
                .map(|(x, y)| join(gs, x, y))
                .collect(),
        },
        (Type::Applied { class: ca, args: aa }, Type::Applied { class: cb, args: ab })
            if ca == cb && aa.len() == ab.len() =>
        {
            Type::Applied {
                class: *ca,
                args: aa
                    .iter()
                    .zip(ab.iter())
                    .map(|(x, y)| join(gs, x, y))
                    .collect(),
            }
        }
        _ => {
            // Mismatched proxies widen and retry once.
            if a.is_proxy() || b.is_proxy() {
                let wa = a.underlying(gs).unwrap_or_else(|| a.clone());
                let wb = b.underlying(gs).unwrap_or_else(|| b.clone());
                if &wa != a || &wb != b {
                    return join(gs, &wa, &wb);
                }
            }
            Type::any(a.clone(), b.clone())
        }
    }
}

/// Greatest lower bound.
pub fn meet(gs: &GlobalState, a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    if a.is_untyped() || b.is_untyped() {
        return Type::Untyped;
    }
    if is_subtype(gs, a, b) {
        return a.clone();
    }
    if is_subtype(gs, b, a) {
        return b.clone();
    }

    // Meet distributes over union: glb(A|B, C) = glb(A,C) | glb(B,C).
    if matches!(a, Type::Or(_, _)) {
        return a
            .or_components()
            .into_iter()
            .map(|m| meet(gs, m, b))
            .reduce(|x, y| join(gs, &x, &y))
            .unwrap_or(Type::Bottom);
    }
    if matches!(b, Type::Or(_, _)) {
        return meet(gs, b, a);
    }

    match (a, b) {
        (Type::Class(ca), Type::Class(cb)) => {
            // A value can inhabit a class and a module simultaneously; two
            // unrelated proper classes have no common inhabitant.
            let ma = symbol_is_module(gs.symbol_data(*ca));
            let mb = symbol_is_module(gs.symbol_data(*cb));
            if ma || mb {
                Type::all(a.clone(), b.clone())
            } else {
                Type::Bottom
            }
        }
        (Type::Tuple(ea), Type::Tuple(eb)) => {
            if ea.len() != eb.len() {
                return Type::Bottom;
            }
            let elems: Vec<Type> = ea
                .iter()
                .zip(eb.iter())
                .map(|(x, y)| meet(gs, x, y))
                .collect();
            if elems.iter().any(Type::is_bottom) {
                Type::Bottom
            } else {
                Type::Tuple(elems)
            }
        }
        (
            Type::Shape { keys: ka, values: va },
            Type::Shape { keys: kb, values: vb },
        ) => {
            if ka != kb {
                return Type::Bottom;
            }
            let values: Vec<Type> = va
                .iter()
                .zip(vb.iter())
                .map(|(x, y)| meet(gs, x, y))
                .collect();
            if values.iter().any(Type::is_bottom) {
                Type::Bottom
            } else {
                Type::Shape {
                    keys: ka.clone(),
                    values,
                }
            }
        }
        (Type::LiteralType(_), Type::LiteralType(_)) => Type::Bottom,
        _ => Type::all(a.clone(), b.clone()),
    }
}

/// Walk `a`'s superclass chain for the first class `b` also derives from,
/// ignoring the trivial answers at `Object` and above.
fn nearest_common_superclass(
    gs: &GlobalState,
    a: SymbolRef,
    b: SymbolRef,
) -> Option<SymbolRef> {
    let mut cursor = Some(a);
    while let Some(current) = cursor {
        if current == wk_sym::OBJECT || current == wk_sym::BASIC_OBJECT {
            return None;
        }
        if gs.derives_from(b, current) {
            return Some(current);
        }
        cursor = gs.symbol_data(current).superclass;
    }
    None
}

/// Fold one union member into the accumulated set: absorbed when the join
/// with an existing member collapses to a single type, appended otherwise.
fn insert_joined(gs: &GlobalState, members: &mut Vec<Type>, incoming: &Type) {
    for existing in members.iter_mut() {
        let joined = join(gs, existing, incoming);
        if !matches!(joined, Type::Or(_, _)) {
            *existing = joined;
            return;
        }
    }
    members.push(incoming.clone());
}

/// Remove from `from` every union member that fits `what`. Used by
/// flow-sensitive refinement on negative branches.
pub fn approximate_subtract(gs: &GlobalState, from: &Type, what: &Type) -> Type {
    if is_subtype(gs, from, what) {
        return Type::Bottom;
    }
    if let Type::Or(_, _) = from {
        let kept: Vec<Type> = from
            .or_components()
            .into_iter()
            .filter(|m| !is_subtype(gs, m, what))
            .cloned()
            .collect();
        return kept
            .into_iter()
            .reduce(|a, b| Type::any(a, b))
            .unwrap_or(Type::Bottom);
    }
    from.clone()
}
