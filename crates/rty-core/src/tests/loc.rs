use super::*;
use crate::files::{FileRef, SourceType};
use crate::global_state::GlobalState;

#[test]
fn pack_roundtrip() {
    let loc = Loc::new(FileRef(7), 10, 42);
    assert_eq!(loc.file(), FileRef(7));
    assert_eq!(loc.begin(), 10);
    assert_eq!(loc.end(), 42);
    assert!(loc.exists());
}

#[test]
fn none_does_not_exist() {
    let loc = Loc::none(FileRef(3));
    assert!(!loc.exists());
    assert_eq!(loc.file(), FileRef(3));
}

#[test]
fn join_is_interval_union() {
    let a = Loc::new(FileRef(1), 5, 10);
    let b = Loc::new(FileRef(1), 8, 20);
    let joined = a.join(b);
    assert_eq!(joined.begin(), 5);
    assert_eq!(joined.end(), 20);
}

#[test]
fn join_with_none_yields_other_side() {
    let a = Loc::new(FileRef(1), 5, 10);
    assert_eq!(a.join(Loc::none(FileRef(1))), a);
    assert_eq!(Loc::none(FileRef(1)).join(a), a);
}

#[test]
fn contains_requires_same_file() {
    let outer = Loc::new(FileRef(1), 0, 100);
    let inner = Loc::new(FileRef(1), 10, 20);
    let elsewhere = Loc::new(FileRef(2), 10, 20);
    assert!(outer.contains(inner));
    assert!(!outer.contains(elsewhere));
}

#[test]
fn position_against_file_contents() {
    let mut gs = GlobalState::new();
    let file = gs.with_unfrozen_files(|gs| {
        gs.enter_file("a.rb", "ab\ncdef\ng".to_string(), SourceType::Normal)
    });
    let loc = Loc::new(file, 4, 6);
    let (begin, end) = loc.position(&gs).unwrap();
    assert_eq!((begin.line, begin.column), (2, 2));
    assert_eq!((end.line, end.column), (2, 4));
    assert_eq!(loc.source(&gs), Some("de"));
}
