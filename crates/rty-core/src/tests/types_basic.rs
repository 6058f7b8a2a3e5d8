use super::*;
use crate::global_state::GlobalState;
use crate::symbols::wk_sym;
use crate::types::{is_subtype, join, meet, show};

fn int() -> Type {
    Type::Class(wk_sym::INTEGER)
}

fn string() -> Type {
    Type::Class(wk_sym::STRING)
}

fn float() -> Type {
    Type::Class(wk_sym::FLOAT)
}

/// A small population of normalized types for property checks.
fn sample_types(gs: &GlobalState) -> Vec<Type> {
    let _ = gs;
    vec![
        Type::Untyped,
        Type::Top,
        Type::Bottom,
        int(),
        string(),
        float(),
        Type::nil_class(),
        Type::boolean(),
        Type::nilable(int()),
        Type::any(int(), string()),
        Type::all(Type::Class(wk_sym::COMPARABLE), int()),
        Type::LiteralType(Literal::Integer(42)),
        Type::LiteralType(Literal::Integer(7)),
        Type::Tuple(vec![int(), string()]),
        Type::shape(vec![
            (Literal::Symbol(crate::names::wk::KEY), int()),
        ]),
        Type::Applied {
            class: wk_sym::ARRAY,
            args: vec![int()],
        },
    ]
}

#[test]
fn union_constructor_normalizes() {
    // Flattening, dedup, absorption.
    let a = Type::any(int(), Type::any(string(), int()));
    let b = Type::any(string(), int());
    assert_eq!(a, b);
    assert_eq!(Type::any(int(), Type::Untyped), Type::Untyped);
    assert_eq!(Type::any(int(), Type::Bottom), int());
    assert_eq!(Type::any(int(), Type::Top), Type::Top);
    assert_eq!(Type::any(int(), int()), int());
}

#[test]
fn union_right_spine_has_no_composites() {
    let t = Type::any(Type::any(int(), string()), Type::nil_class());
    fn check(t: &Type) {
        if let Type::Or(_, r) = t {
            assert!(!matches!(**r, Type::Or(_, _)), "Or on right spine");
        }
    }
    check(&t);
    for m in t.or_components() {
        check(m);
    }
    assert_eq!(t.or_components().len(), 3);
}

#[test]
fn intersection_constructor_normalizes() {
    let comparable = Type::Class(wk_sym::COMPARABLE);
    assert_eq!(Type::all(int(), Type::Untyped), Type::Untyped);
    assert_eq!(Type::all(int(), Type::Bottom), Type::Bottom);
    assert_eq!(Type::all(int(), Type::Top), int());
    assert_eq!(
        Type::all(comparable.clone(), int()),
        Type::all(int(), comparable)
    );
}

#[test]
fn subtype_is_reflexive_on_sampled_population() {
    let gs = GlobalState::new();
    for t in sample_types(&gs) {
        assert!(is_subtype(&gs, &t, &t), "not reflexive: {}", show(&gs, &t));
    }
}

#[test]
fn subtype_is_transitive_on_sampled_population() {
    let gs = GlobalState::new();
    // `untyped` is excluded: it relates to everything in both directions, so
    // chains through it prove nothing about the static lattice.
    let pop: Vec<Type> = sample_types(&gs)
        .into_iter()
        .filter(|t| !t.is_untyped())
        .collect();
    for a in &pop {
        for b in &pop {
            for c in &pop {
                if is_subtype(&gs, a, b) && is_subtype(&gs, b, c) {
                    assert!(
                        is_subtype(&gs, a, c),
                        "transitivity broken: {} <: {} <: {}",
                        show(&gs, a),
                        show(&gs, b),
                        show(&gs, c)
                    );
                }
            }
        }
    }
}

#[test]
fn untyped_is_absorbed_both_ways() {
    let gs = GlobalState::new();
    for t in sample_types(&gs) {
        assert!(is_subtype(&gs, &Type::Untyped, &t));
        assert!(is_subtype(&gs, &t, &Type::Untyped));
        assert_eq!(join(&gs, &Type::Untyped, &t), Type::Untyped);
        assert_eq!(meet(&gs, &Type::Untyped, &t), Type::Untyped);
    }
}

#[test]
fn join_is_an_upper_bound_meet_a_lower_bound() {
    let gs = GlobalState::new();
    let pop = sample_types(&gs);
    for a in &pop {
        for b in &pop {
            let j = join(&gs, a, b);
            assert!(
                is_subtype(&gs, a, &j) && is_subtype(&gs, b, &j),
                "join({}, {}) = {} is not an upper bound",
                show(&gs, a),
                show(&gs, b),
                show(&gs, &j)
            );
            let m = meet(&gs, a, b);
            assert!(
                is_subtype(&gs, &m, a) && is_subtype(&gs, &m, b),
                "meet({}, {}) = {} is not a lower bound",
                show(&gs, a),
                show(&gs, b),
                show(&gs, &m)
            );
        }
    }
}

#[test]
fn join_and_meet_are_commutative_and_idempotent() {
    let gs = GlobalState::new();
    let pop = sample_types(&gs);
    for a in &pop {
        assert_eq!(join(&gs, a, a), *a);
        assert_eq!(meet(&gs, a, a), *a);
        for b in &pop {
            assert_eq!(join(&gs, a, b), join(&gs, b, a));
            assert_eq!(meet(&gs, a, b), meet(&gs, b, a));
        }
    }
}

#[test]
fn literals_are_subtypes_of_their_class_only() {
    let gs = GlobalState::new();
    let one = Type::LiteralType(Literal::Integer(1));
    let two = Type::LiteralType(Literal::Integer(2));
    assert!(is_subtype(&gs, &one, &int()));
    assert!(is_subtype(&gs, &one, &one));
    assert!(!is_subtype(&gs, &one, &two));
    assert!(!is_subtype(&gs, &int(), &one));
    assert!(!is_subtype(&gs, &one, &string()));
}

#[test]
fn tuples_compare_pointwise() {
    let gs = GlobalState::new();
    let specific = Type::Tuple(vec![Type::LiteralType(Literal::Integer(1)), string()]);
    let general = Type::Tuple(vec![int(), string()]);
    let shorter = Type::Tuple(vec![int()]);
    assert!(is_subtype(&gs, &specific, &general));
    assert!(!is_subtype(&gs, &general, &specific));
    assert!(!is_subtype(&gs, &shorter, &general));
    // A tuple widens to Array through its underlying type.
    let array = Type::Class(wk_sym::ARRAY);
    assert!(is_subtype(&gs, &general, &array));
}

#[test]
fn shapes_need_matching_key_sets() {
    let gs = GlobalState::new();
    let k = Literal::Symbol(crate::names::wk::KEY);
    let v = Literal::Symbol(crate::names::wk::VALUE);
    let a = Type::shape(vec![(k, Type::LiteralType(Literal::Integer(1)))]);
    let b = Type::shape(vec![(k, int())]);
    let c = Type::shape(vec![(v, int())]);
    assert!(is_subtype(&gs, &a, &b));
    assert!(!is_subtype(&gs, &b, &a));
    assert!(!is_subtype(&gs, &b, &c));
}

#[test]
fn applied_generics_respect_covariance() {
    let gs = GlobalState::new();
    let array_of = |t: Type| Type::Applied {
        class: wk_sym::ARRAY,
        args: vec![t],
    };
    // Array's Elem is covariant in the bootstrap hierarchy.
    assert!(is_subtype(&gs, &array_of(int()), &array_of(Type::nilable(int()))));
    assert!(!is_subtype(&gs, &array_of(string()), &array_of(int())));
    assert!(is_subtype(&gs, &array_of(int()), &Type::Class(wk_sym::ARRAY)));
}

#[test]
fn show_renders_common_shapes() {
    let gs = GlobalState::new();
    assert_eq!(show(&gs, &int()), "Integer");
    assert_eq!(show(&gs, &Type::nilable(int())), "T.nilable(Integer)");
    assert_eq!(show(&gs, &Type::boolean()), "T::Boolean");
    assert_eq!(show(&gs, &Type::Untyped), "T.untyped");
    assert_eq!(
        show(&gs, &Type::Applied { class: wk_sym::ARRAY, args: vec![int()] }),
        "Array[Integer]"
    );
}
