use super::*;
use crate::global_state::GlobalState;

#[test]
fn interning_is_idempotent() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_names(|gs| {
        let a = gs.enter_name_utf8("foo");
        let b = gs.enter_name_utf8("foo");
        let c = gs.enter_name_utf8("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(gs.name_data(a).utf8(), "foo");
        assert_eq!(gs.name_data(c).utf8(), "bar");
    });
}

#[test]
fn well_known_names_hold_their_ids() {
    let gs = GlobalState::new();
    assert_eq!(gs.name_data(wk::OBJECT).utf8(), "Object");
    assert_eq!(gs.name_data(wk::INTEGER).utf8(), "Integer");
    assert_eq!(gs.name_data(wk::NIL_P).utf8(), "nil?");
    assert_eq!(gs.name_data(wk::PLUS).utf8(), "+");
    assert_eq!(gs.name_data(wk::ATTACHED_CLASS).utf8(), "attached_class");
}

#[test]
fn constant_names_wrap_and_dedup() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_names(|gs| {
        let inner = gs.enter_name_utf8("Widget");
        let c1 = gs.enter_name_constant(inner);
        let c2 = gs.enter_name_constant(inner);
        assert_eq!(c1, c2);
        match gs.name_data(c1) {
            NameData::Constant(i) => assert_eq!(*i, inner),
            other => panic!("expected constant name, got {other:?}"),
        }
    });
}

#[test]
fn unique_names_always_append() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_names(|gs| {
        let orig = gs.enter_name_utf8("tmp");
        let u1 = gs.fresh_name_unique(UniqueNameKind::Cfg, orig, 1);
        let u2 = gs.fresh_name_unique(UniqueNameKind::Cfg, orig, 2);
        assert_ne!(u1, u2);
        assert!(gs.name_data(u1).is_unique());
    });
}

#[test]
#[should_panic(expected = "name table is frozen")]
fn entering_fresh_name_while_frozen_panics() {
    let mut gs = GlobalState::new();
    gs.enter_name_utf8("this-name-is-definitely-new");
}

#[test]
fn frozen_table_still_answers_lookups() {
    let mut gs = GlobalState::new();
    let name = gs.with_unfrozen_names(|gs| gs.enter_name_utf8("cached"));
    // A second intern of an existing name is a lookup, not a write.
    let again = gs.enter_name_utf8("cached");
    assert_eq!(name, again);
}
