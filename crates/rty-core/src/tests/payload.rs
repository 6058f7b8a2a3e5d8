use super::*;
use crate::files::SourceType;
use crate::global_state::GlobalState;
use crate::loc::Loc;
use crate::symbols::wk_sym;

fn populated_state() -> GlobalState {
    let mut gs = GlobalState::new();
    gs.with_unfrozen_tables(|gs| {
        let file = gs.enter_file("app.rb", "# typed: strict\nclass App; end\n".into(), SourceType::Normal);
        let name = gs.enter_name_utf8("App");
        gs.enter_class_symbol(Loc::new(file, 16, 30), wk_sym::ROOT, name);
    });
    gs
}

#[test]
fn roundtrip_preserves_tables() {
    let gs = populated_state();
    let bytes = serialize(&gs);
    let restored = deserialize(&bytes).expect("roundtrip");
    assert_eq!(restored.names_used(), gs.names_used());
    assert_eq!(restored.symbols_used(), gs.symbols_used());
    assert_eq!(restored.files_used(), gs.files_used());

    // Dedup indexes were rebuilt: interning existing content is a lookup.
    let mut restored = restored;
    let app = restored.enter_name_utf8("App");
    assert_eq!(restored.name_data(app).utf8(), "App");
    assert_eq!(
        restored.file_by_path("app.rb"),
        gs.file_by_path("app.rb")
    );
}

#[test]
fn version_mismatch_is_rejected() {
    let gs = populated_state();
    let mut bytes = serialize(&gs);
    // Corrupt the version field; the image is JSON so this is a text edit.
    let text = String::from_utf8(std::mem::take(&mut bytes)).unwrap();
    let bumped = text.replacen("\"version\":4", "\"version\":999", 1);
    assert_ne!(text, bumped, "version field not found to corrupt");
    match deserialize(bumped.as_bytes()) {
        Err(PayloadError::VersionMismatch { found, .. }) => assert_eq!(found, 999),
        other => panic!("expected version mismatch, got {other:?}"),
    }
}

#[test]
fn garbage_is_malformed() {
    assert!(matches!(
        deserialize(b"not a payload"),
        Err(PayloadError::Malformed(_))
    ));
}
