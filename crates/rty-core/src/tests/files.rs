use super::*;
use crate::global_state::GlobalState;
use crate::loc::LocDetail;

#[test]
fn typed_sigil_is_parsed_from_leading_comments() {
    let file = File::new(
        "a.rb".into(),
        "# frozen_string_literal: true\n# typed: strict\nclass A; end\n".into(),
        SourceType::Normal,
    );
    assert_eq!(file.strictness, Some(StrictnessLevel::Strict));
}

#[test]
fn sigil_after_code_is_ignored() {
    let file = File::new(
        "a.rb".into(),
        "class A; end\n# typed: strict\n".into(),
        SourceType::Normal,
    );
    assert_eq!(file.strictness, None);
    assert_eq!(file.min_error_level(), StrictnessLevel::False);
}

#[test]
fn strictness_levels_are_ordered() {
    assert!(StrictnessLevel::Ignore < StrictnessLevel::False);
    assert!(StrictnessLevel::False < StrictnessLevel::True);
    assert!(StrictnessLevel::True < StrictnessLevel::Strict);
    assert!(StrictnessLevel::Strict < StrictnessLevel::Strong);
}

#[test]
fn offset_position_roundtrip() {
    let file = File::new("a.rb".into(), "one\ntwo\nthree\n".into(), SourceType::Normal);
    for offset in [0u32, 3, 4, 7, 8, 13] {
        let pos = file.offset_to_pos(offset);
        assert_eq!(file.pos_to_offset(pos), Some(offset), "offset {offset}");
    }
    assert_eq!(
        file.offset_to_pos(4),
        LocDetail { line: 2, column: 1 }
    );
}

#[test]
fn tombstoned_file_keeps_its_id_but_leaves_live_set() {
    let mut gs = GlobalState::new();
    let (a, b) = gs.with_unfrozen_files(|gs| {
        let a = gs.enter_file("a.rb", "# typed: true\n".into(), SourceType::Normal);
        let b = gs.enter_file("b.rb", "# typed: true\n".into(), SourceType::Normal);
        (a, b)
    });
    gs.with_unfrozen_files(|gs| gs.tombstone_file(a));
    let live: Vec<_> = gs.live_files().collect();
    assert!(!live.contains(&a));
    assert!(live.contains(&b));
    assert!(gs.file_data(a).is_tombstoned());
    assert_eq!(gs.file_by_path("a.rb"), Some(a));
}
