use super::*;
use crate::files::{FileRef, SourceType, StrictnessLevel};
use crate::global_state::GlobalState;
use crate::loc::Loc;

fn enter(gs: &mut GlobalState, path: &str, sigil: &str) -> FileRef {
    gs.with_unfrozen_files(|gs| {
        gs.enter_file(path, format!("# typed: {sigil}\nx = 1\n"), SourceType::Normal)
    })
}

#[test]
fn drain_sorts_per_file_and_position() {
    let mut gs = GlobalState::new();
    let a = enter(&mut gs, "a.rb", "true");
    let b = enter(&mut gs, "b.rb", "true");
    gs.report_error(Loc::new(b, 5, 6), infer::METHOD_DOES_NOT_EXIST, "m1".into());
    gs.report_error(Loc::new(a, 9, 12), infer::METHOD_DOES_NOT_EXIST, "m2".into());
    gs.report_error(Loc::new(a, 1, 2), infer::ARGUMENT_TYPE_MISMATCH, "m3".into());

    let drained = gs.drain_errors();
    let order: Vec<&str> = drained.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(order, vec!["m3", "m2", "m1"]);
    assert!(gs.errors.is_empty());
}

#[test]
fn strictness_suppresses_below_floor() {
    let mut gs = GlobalState::new();
    let lax = enter(&mut gs, "lax.rb", "false");
    let strict = enter(&mut gs, "strict.rb", "strict");
    // Inference errors have a `true` floor: dropped for the lax file.
    gs.report_error(Loc::new(lax, 0, 1), infer::METHOD_DOES_NOT_EXIST, "lax".into());
    gs.report_error(Loc::new(strict, 0, 1), infer::METHOD_DOES_NOT_EXIST, "strict".into());
    // Parse errors have a `false` floor: kept for both.
    gs.report_error(Loc::new(lax, 2, 3), parser::SYNTAX_ERROR, "parse".into());

    let drained = gs.drain_errors();
    let messages: Vec<&str> = drained.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["parse", "strict"]);
}

#[test]
fn ignore_files_report_nothing() {
    let mut gs = GlobalState::new();
    let ignored = enter(&mut gs, "ignored.rb", "ignore");
    gs.report_error(Loc::new(ignored, 0, 1), parser::SYNTAX_ERROR, "nope".into());
    assert!(gs.drain_errors().is_empty());
}

#[test]
fn discard_for_files_drops_only_those_files() {
    let mut gs = GlobalState::new();
    let a = enter(&mut gs, "a.rb", "strict");
    let b = enter(&mut gs, "b.rb", "strict");
    gs.report_error(Loc::new(a, 0, 1), infer::RETURN_TYPE_MISMATCH, "a".into());
    gs.report_error(Loc::new(b, 0, 1), infer::RETURN_TYPE_MISMATCH, "b".into());
    gs.errors.discard_for_files(&[a]);
    let drained = gs.drain_errors();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].message, "b");
}

#[test]
fn drain_applies_level_of_the_diagnostics_own_file() {
    let mut gs = GlobalState::new();
    let strong = enter(&mut gs, "strong.rb", "strong");
    gs.report_error(
        Loc::new(strong, 0, 1),
        resolver::SIG_REQUIRED,
        "needs sig".into(),
    );
    assert_eq!(gs.drain_errors().len(), 1);

    let level = gs.file_data(strong).min_error_level();
    assert_eq!(level, StrictnessLevel::Strong);
}
