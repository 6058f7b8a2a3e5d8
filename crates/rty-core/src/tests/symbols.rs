use super::*;
use crate::global_state::GlobalState;
use crate::loc::Loc;
use crate::names::wk;
use crate::files::FileRef;

#[test]
fn root_owns_itself() {
    let gs = GlobalState::new();
    let root = gs.symbol_data(wk_sym::ROOT);
    assert_eq!(wk_sym::ROOT.id(), 0);
    assert_eq!(root.owner, wk_sym::ROOT);
}

#[test]
fn builtin_hierarchy_is_wired() {
    let gs = GlobalState::new();
    assert_eq!(
        gs.symbol_data(wk_sym::INTEGER).superclass,
        Some(wk_sym::NUMERIC)
    );
    assert_eq!(
        gs.symbol_data(wk_sym::OBJECT).superclass,
        Some(wk_sym::BASIC_OBJECT)
    );
    assert!(gs.derives_from(wk_sym::INTEGER, wk_sym::OBJECT));
    assert!(gs.derives_from(wk_sym::INTEGER, wk_sym::COMPARABLE));
    assert!(gs.derives_from(wk_sym::STRING, wk_sym::KERNEL));
    assert!(!gs.derives_from(wk_sym::STRING, wk_sym::NUMERIC));
}

#[test]
fn linearization_starts_with_self_and_is_frozen() {
    let gs = GlobalState::new();
    let lin = gs.linearization_of(wk_sym::INTEGER);
    assert_eq!(lin.first(), Some(&wk_sym::INTEGER));
    assert!(gs.symbol_data(wk_sym::INTEGER).resolved_ancestors.is_some());
    // Most-specific first: Integer before Numeric before Object.
    let int_pos = lin.iter().position(|&s| s == wk_sym::INTEGER).unwrap();
    let num_pos = lin.iter().position(|&s| s == wk_sym::NUMERIC).unwrap();
    let obj_pos = lin.iter().position(|&s| s == wk_sym::OBJECT).unwrap();
    assert!(int_pos < num_pos && num_pos < obj_pos);
}

#[test]
fn entering_a_class_twice_reopens_it() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_tables(|gs| {
        let file = gs.enter_file("a.rb", "class A; end\nclass A; end\n".into(), crate::files::SourceType::Normal);
        let name = gs.enter_name_utf8("A");
        let first = gs.enter_class_symbol(Loc::new(file, 0, 12), wk_sym::ROOT, name);
        let second = gs.enter_class_symbol(Loc::new(file, 13, 25), wk_sym::ROOT, name);
        assert_eq!(first, second);
        assert_eq!(gs.symbol_data(first).locs.len(), 2);
    });
}

#[test]
fn method_owns_its_arguments() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_tables(|gs| {
        let m_name = gs.enter_name_utf8("compute");
        let a_name = gs.enter_name_utf8("x");
        let no_loc = Loc::none(FileRef(0));
        let method = gs.enter_method_symbol(no_loc, wk_sym::OBJECT, m_name);
        let arg = gs.enter_method_argument_symbol(no_loc, method, a_name);
        assert_eq!(gs.symbol_data(arg).owner, method);
        assert_eq!(gs.symbol_data(method).arguments, vec![arg]);
        assert!(gs.symbol_data(arg).has_flag(symbol_flags::METHOD_ARGUMENT));
    });
}

#[test]
fn bootstrap_methods_are_reachable_through_members() {
    let gs = GlobalState::new();
    let plus = gs.symbol_data(wk_sym::INTEGER).members.get(&wk::PLUS);
    let plus = *plus.expect("Integer#+ bootstrapped");
    let data = gs.symbol_data(plus);
    assert!(data.is_method());
    assert_eq!(data.arguments.len(), 1);
    assert_eq!(data.result_type, Some(crate::types::Type::Class(wk_sym::INTEGER)));
}

#[test]
fn full_names_nest_through_owners() {
    let mut gs = GlobalState::new();
    let inner = gs.with_unfrozen_tables(|gs| {
        let outer_name = gs.enter_name_utf8("Outer");
        let inner_name = gs.enter_name_utf8("Inner");
        let no_loc = Loc::none(FileRef(0));
        let outer = gs.enter_module_symbol(no_loc, wk_sym::ROOT, outer_name);
        gs.enter_class_symbol(no_loc, outer, inner_name)
    });
    assert_eq!(gs.symbol_full_name(inner), "Outer::Inner");
}
