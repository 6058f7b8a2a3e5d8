use super::*;
use std::io::Write;

fn batch(sources: &[(&str, &str)]) -> (GlobalState, Vec<Diagnostic>) {
    let sources: Vec<(String, String)> = sources
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();
    typecheck_batch(&sources, None, None)
}

#[test]
fn clean_project_has_no_diagnostics() {
    let (_, diags) = batch(&[(
        "calc.rb",
        "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x * 2\n  end\nend\n",
    )]);
    assert!(diags.is_empty(), "unexpected: {diags:?}");
}

#[test]
fn diagnostics_sort_per_file_and_position() {
    let (_, diags) = batch(&[
        (
            "b.rb",
            "# typed: true\nclass B\n  sig { returns(Integer) }\n  def f\n    1 + 'x'\n  end\nend\n",
        ),
        (
            "a.rb",
            "# typed: true\nclass A\n  sig { returns(String) }\n  def g\n    42\n  end\nend\n",
        ),
    ]);
    assert_eq!(diags.len(), 2);
    // Files entered in argument order, so b.rb's diagnostic sorts first.
    assert!(diags[0].message.contains("expected `Integer`, got `String`"));
    assert!(diags[1].message.contains("expected `String`, got `Integer`"));
}

#[test]
fn stop_after_parser_skips_type_errors() {
    let source = "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    1 + 'x'\n  end\nend\n";
    let (_, diags) = typecheck_batch(
        &[("a.rb".to_string(), source.to_string())],
        Some(Phase::Parser),
        None,
    );
    assert!(diags.is_empty(), "parser phase found: {diags:?}");

    let (_, diags) = typecheck_batch(
        &[("a.rb".to_string(), source.to_string())],
        None,
        None,
    );
    assert_eq!(diags.len(), 1);
}

#[test]
fn stop_after_resolver_reports_resolution_errors_only() {
    let source = "# typed: true\nclass A < Missing\n  sig { returns(Integer) }\n  def f\n    1 + 'x'\n  end\nend\n";
    let (_, diags) = typecheck_batch(
        &[("a.rb".to_string(), source.to_string())],
        Some(Phase::Resolver),
        None,
    );
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("Missing"));
}

#[test]
fn inline_expression_typechecks() {
    let options = Options {
        paths: vec![],
        stop_after: None,
        max_threads: None,
        disable_watchman: false,
        expr: Some("1 + 1".to_string()),
        lsp: false,
        print: None,
        store_payload: None,
    };
    assert_eq!(run(&options), Ok(0));

    let options = Options {
        expr: Some("1 + 'x'".to_string()),
        ..options
    };
    assert_eq!(run(&options), Ok(1));
}

#[test]
fn missing_file_is_an_early_return() {
    let options = Options {
        paths: vec!["definitely/not/here.rb".into()],
        stop_after: None,
        max_threads: None,
        disable_watchman: false,
        expr: None,
        lsp: false,
        print: None,
        store_payload: None,
    };
    assert_eq!(run(&options), Err(EarlyReturn(66)));
}

#[test]
fn no_inputs_is_a_usage_error() {
    let options = Options {
        paths: vec![],
        stop_after: None,
        max_threads: None,
        disable_watchman: false,
        expr: None,
        lsp: false,
        print: None,
        store_payload: None,
    };
    assert_eq!(run(&options), Err(EarlyReturn(64)));
}

#[test]
fn directory_arguments_walk_for_ruby_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.rb");
    writeln!(
        std::fs::File::create(&good).unwrap(),
        "# typed: true\nclass A\n  sig {{ returns(Integer) }}\n  def f\n    1\n  end\nend"
    )
    .unwrap();
    let ignored = dir.path().join("notes.txt");
    writeln!(std::fs::File::create(&ignored).unwrap(), "not ruby").unwrap();

    let options = Options {
        paths: vec![dir.path().to_path_buf()],
        stop_after: None,
        max_threads: None,
        disable_watchman: false,
        expr: None,
        lsp: false,
        print: None,
        store_payload: None,
    };
    assert_eq!(run(&options), Ok(0));
}

#[test]
fn payload_roundtrips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.rb");
    std::fs::write(
        &source,
        "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    1\n  end\nend\n",
    )
    .unwrap();
    let payload_path = dir.path().join("state.payload");

    let options = Options {
        paths: vec![source],
        stop_after: None,
        max_threads: None,
        disable_watchman: false,
        expr: None,
        lsp: false,
        print: None,
        store_payload: Some(payload_path.clone()),
    };
    assert_eq!(run(&options), Ok(0));

    let bytes = std::fs::read(&payload_path).unwrap();
    let restored = rty_core::payload::deserialize(&bytes).expect("payload readable");
    restored.sanity_check();
    assert!(restored.files_used() >= 1);
}
