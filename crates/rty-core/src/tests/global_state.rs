use super::*;
use crate::files::SourceType;
use crate::names::wk;

#[test]
fn new_state_passes_sanity_check() {
    let gs = GlobalState::new();
    gs.sanity_check();
    assert!(gs.symbols_used() >= wk_sym::WELL_KNOWN_COUNT);
}

#[test]
fn deep_copy_preserves_ids() {
    let mut gs = GlobalState::new();
    let (name, file) = gs.with_unfrozen_tables(|gs| {
        let name = gs.enter_name_utf8("deep_copy_probe");
        let file = gs.enter_file("probe.rb", "# typed: true\n".into(), SourceType::Normal);
        (name, file)
    });
    let copy = gs.deep_copy();
    copy.sanity_check();
    assert_eq!(copy.names_used(), gs.names_used());
    assert_eq!(copy.symbols_used(), gs.symbols_used());
    assert_eq!(copy.name_data(name), gs.name_data(name));
    assert_eq!(copy.file_data(file).path(), gs.file_data(file).path());
    // Interning the same content again resolves to the same id in both.
    let mut copy = copy;
    let again = copy.enter_name_utf8("deep_copy_probe");
    assert_eq!(again, name);
}

#[test]
fn copies_are_independent() {
    let gs = GlobalState::new();
    let mut copy = gs.deep_copy();
    let fresh = copy.with_unfrozen_names(|c| c.enter_name_utf8("only_in_copy"));
    assert_eq!(fresh.id(), gs.names_used());
    // The original never learns about the copy's names.
    assert_eq!(gs.names_used() + 1, copy.names_used());
}

#[test]
fn unfreeze_scopes_restore_on_exit() {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_names(|gs| {
        gs.enter_name_utf8("inside_scope");
    });
    // Table is frozen again: new content panics, existing resolves.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        gs.enter_name_utf8("outside_scope")
    }));
    assert!(result.is_err());
}

#[test]
fn enter_file_replaces_contents_in_place() {
    let mut gs = GlobalState::new();
    let (first, second) = gs.with_unfrozen_files(|gs| {
        let first = gs.enter_file("a.rb", "# typed: false\n".into(), SourceType::Normal);
        let second = gs.enter_file("a.rb", "# typed: strict\n".into(), SourceType::Normal);
        (first, second)
    });
    assert_eq!(first, second);
    assert_eq!(
        gs.file_data(first).strictness,
        Some(crate::files::StrictnessLevel::Strict)
    );
}

#[test]
fn derives_from_is_reflexive() {
    let gs = GlobalState::new();
    for sym in [wk_sym::OBJECT, wk_sym::INTEGER, wk_sym::KERNEL] {
        assert!(gs.derives_from(sym, sym));
    }
}

#[test]
fn symbol_lookup_by_member_name() {
    let gs = GlobalState::new();
    let object = gs.symbol_data(wk_sym::ROOT).members.get(&wk::OBJECT);
    assert_eq!(object, Some(&wk_sym::OBJECT));
}
