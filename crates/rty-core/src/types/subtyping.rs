//! The subtype decision procedure.
//!
//! Total over canonical types. Rules are tried in a fixed priority order;
//! composites distribute before nominal rules so the relation stays
//! decidable without re-normalization:
//!
//! 1. `untyped` on either side
//! 2. `top` / `bottom`
//! 3. structural equality
//! 4. literal vs its underlying class, literal vs literal
//! 5. applied generics: derivation plus per-parameter variance
//! 6. union on the left: every member must fit
//! 7. union on the right: some member must accept
//! 8. intersection on the left: some member suffices
//! 9. intersection on the right: every member must accept
//! 10. proxies compare through their underlying type
//! 11. tuples element-wise, shapes key-set + value-wise
//! 12. classes via the frozen linearization
//!
//! When a `TypeConstraint` is supplied, type variables it owns are not
//! compared but *bounded*: a variable on the left records an upper bound, on
//! the right a lower bound, and the check succeeds. A frozen (absent)
//! constraint only accepts identical variables.

use super::{Type, TypeConstraint};
use crate::global_state::GlobalState;
use crate::symbols::{Symbol, Variance};

/// `l <: r` with no constraint in scope.
pub fn is_subtype(gs: &GlobalState, l: &Type, r: &Type) -> bool {
    is_subtype_under(gs, &mut None, l, r)
}

/// `l <: r`, recording bounds on constrained type variables.
pub fn is_subtype_under(
    gs: &GlobalState,
    constr: &mut Option<&mut TypeConstraint>,
    l: &Type,
    r: &Type,
) -> bool {
    // Rule 1: untyped is compatible in both directions.
    if l.is_untyped() || r.is_untyped() {
        return true;
    }

    // Rule 2: top and bottom.
    if matches!(r, Type::Top) || matches!(l, Type::Bottom) {
        return true;
    }
    if matches!(l, Type::Top) {
        return matches!(r, Type::Top);
    }
    if matches!(r, Type::Bottom) {
        return matches!(l, Type::Bottom);
    }

    // Rule 3: structural equality.
    if l == r {
        return true;
    }

    // Aliases are transparent.
    if matches!(l, Type::Alias(_)) || matches!(r, Type::Alias(_)) {
        return is_subtype_under(gs, constr, &l.dealias(gs), &r.dealias(gs));
    }

    // Constrained type variables: record a bound instead of comparing.
    if let Type::TypeVar(v) = l {
        if let Some(c) = constr.as_deref_mut() {
            if c.owns(*v) {
                c.record_upper_bound(*v, r.clone());
                return true;
            }
        }
    }
    if let Type::TypeVar(v) = r {
        if let Some(c) = constr.as_deref_mut() {
            if c.owns(*v) {
                c.record_lower_bound(*v, l.clone());
                return true;
            }
        }
    }

    match (l, r) {
        // Rule 4: literals.
        (Type::LiteralType(a), Type::LiteralType(b)) => a == b,
        (Type::LiteralType(lit), Type::Class(cls)) => {
            gs.derives_from(lit.underlying_class(), *cls)
        }

        // Rule 6: union on the left distributes first.
        (Type::Or(a, b), _) => {
            is_subtype_under(gs, constr, a, r) && is_subtype_under(gs, constr, b, r)
        }
        // Rule 9 before 7/8: intersection on the right must accept fully.
        (_, Type::And(a, b)) => {
            is_subtype_under(gs, constr, l, a) && is_subtype_under(gs, constr, l, b)
        }
        // Rule 8: intersection on the left needs one member to suffice.
        (Type::And(a, b), _) => {
            is_subtype_under(gs, constr, a, r) || is_subtype_under(gs, constr, b, r)
        }
        // Rule 7: union on the right needs one member to accept.
        (_, Type::Or(a, b)) => {
            is_subtype_under(gs, constr, l, a) || is_subtype_under(gs, constr, l, b)
        }

        // Rule 5: applied generics.
        (
            Type::Applied { class: lc, args: la },
            Type::Applied { class: rc, args: ra },
        ) => applied_subtype(gs, constr, *lc, la, *rc, ra),
        // Erasure at the boundary: an applied class fits its bare class, and
        // a bare class fits an application of an ancestor (its arguments are
        // unknown, i.e. untyped).
        (Type::Applied { class: lc, .. }, Type::Class(rc)) => gs.derives_from(*lc, *rc),
        (Type::Class(lc), Type::Applied { class: rc, .. }) => gs.derives_from(*lc, *rc),

        // Rule 11: tuples and shapes, pointwise and covariant.
        (Type::Tuple(la), Type::Tuple(ra)) => {
            la.len() == ra.len()
                && la
                    .iter()
                    .zip(ra.iter())
                    .all(|(a, b)| is_subtype_under(gs, constr, a, b))
        }
        (
            Type::Shape { keys: lk, values: lv },
            Type::Shape { keys: rk, values: rv },
        ) => {
            lk == rk
                && lv
                    .iter()
                    .zip(rv.iter())
                    .all(|(a, b)| is_subtype_under(gs, constr, a, b))
        }

        // Rule 10: remaining proxies widen to their underlying type.
        (proxy, _) if proxy.is_proxy() => {
            let under = proxy.underlying(gs).expect("proxy has underlying");
            is_subtype_under(gs, constr, &under, r)
        }

        // Rule 12: plain classes via the linearization.
        (Type::Class(lc), Type::Class(rc)) => gs.derives_from(*lc, *rc),

        // Metatypes compare only by their wrapped type.
        (Type::Meta(a), Type::Meta(b)) => is_subtype_under(gs, constr, a, b),

        // Self-type markers and unconstrained variables only matched by the
        // equality rule above.
        _ => false,
    }
}

/// Applied-vs-applied comparison: the source class must derive the target
/// class; when they are the *same* generic class the arguments compare
/// per-parameter under the declared variance. Distinct generic classes are
/// compared by erasure (our hierarchy has no generic inheritance).
fn applied_subtype(
    gs: &GlobalState,
    constr: &mut Option<&mut TypeConstraint>,
    lc: crate::symbols::SymbolRef,
    la: &[Type],
    rc: crate::symbols::SymbolRef,
    ra: &[Type],
) -> bool {
    if !gs.derives_from(lc, rc) {
        return false;
    }
    if lc != rc {
        return true;
    }
    if la.len() != ra.len() {
        return false;
    }
    let members = &gs.symbol_data(lc).type_members;
    la.iter().zip(ra.iter()).enumerate().all(|(i, (a, b))| {
        let variance = members
            .get(i)
            .map(|&m| gs.symbol_data(m).variance())
            .unwrap_or(Variance::Invariant);
        match variance {
            Variance::Covariant => is_subtype_under(gs, constr, a, b),
            Variance::Contravariant => is_subtype_under(gs, constr, b, a),
            Variance::Invariant => {
                is_subtype_under(gs, constr, a, b) && is_subtype_under(gs, constr, b, a)
            }
        }
    })
}

/// Convenience used by dispatch and diagnostics code.
pub(crate) fn symbol_is_module(sym: &Symbol) -> bool {
    sym.has_flag(crate::symbols::symbol_flags::MODULE)
}
