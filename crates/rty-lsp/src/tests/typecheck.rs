use super::*;

const FILE_A_V1: &str = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x * 2\n  end\nend\n";
// Body-only change: same signature, different expression.
const FILE_A_V2: &str = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x + x\n  end\nend\n";
// Body change that introduces a type error.
const FILE_A_BAD: &str = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x * 'two'\n  end\nend\n";
// Structural change: a second method appears.
const FILE_A_STRUCTURAL: &str = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x + x\n  end\n  sig { returns(Integer) }\n  def zero\n    0\n  end\nend\n";
// A second file with a persistent diagnostic.
const FILE_B: &str = "# typed: true\nclass Broken\n  sig { returns(Integer) }\n  def nope\n    1 + 'oops'\n  end\nend\n";

fn edit(uri: &str, text: &str) -> (String, Option<String>) {
    (uri.to_string(), Some(text.to_string()))
}

#[test]
fn first_run_takes_the_slow_path() {
    let mut coordinator = Coordinator::new();
    let (run, published) = coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    assert!(!run.took_fast_path);
    assert_eq!(published.len(), 1);
    assert!(published[0].1.is_empty(), "clean file publishes no diagnostics");
}

#[test]
fn body_edit_takes_the_fast_path_and_reinfers_one_method() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1), edit("b.rb", FILE_B)]);

    let (run, published) = coordinator.apply_edit(&[edit("a.rb", FILE_A_V2)]);
    assert!(run.took_fast_path, "body-only edit must stay on the fast path");
    assert_eq!(run.methods_retypechecked, 1);
    assert_eq!(run.updated_files, vec!["a.rb".to_string()]);
    // Only the edited file republishes.
    assert!(published.iter().all(|(uri, _)| uri == "a.rb"));
    // The other file's diagnostics are untouched.
    let b_diags = coordinator.files["b.rb"].diagnostics();
    assert_eq!(b_diags.len(), 1);
    assert!(b_diags[0].message.contains("expected `Integer`, got `String`"));
}

#[test]
fn fast_path_picks_up_new_errors_and_clears_fixed_ones() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);

    let (run, published) = coordinator.apply_edit(&[edit("a.rb", FILE_A_BAD)]);
    assert!(run.took_fast_path);
    let diags = &published.iter().find(|(u, _)| u == "a.rb").unwrap().1;
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("expected `Integer`, got `String`"));

    let (run, published) = coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    assert!(run.took_fast_path);
    let diags = &published.iter().find(|(u, _)| u == "a.rb").unwrap().1;
    assert!(diags.is_empty(), "fixed error must clear: {diags:?}");
}

#[test]
fn structural_edit_forces_the_slow_path() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1), edit("b.rb", FILE_B)]);

    let (run, _) = coordinator.apply_edit(&[edit("a.rb", FILE_A_STRUCTURAL)]);
    assert!(!run.took_fast_path, "new method is a structural change");
    // The world re-ran; b.rb was re-typechecked and keeps its diagnostic.
    let b_diags = coordinator.files["b.rb"].diagnostics();
    assert_eq!(b_diags.len(), 1);
}

#[test]
fn unknown_file_edit_forces_the_slow_path() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    let (run, _) = coordinator.apply_edit(&[edit("new.rb", FILE_B)]);
    assert!(!run.took_fast_path);
    assert_eq!(coordinator.files.len(), 2);
}

#[test]
fn whitespace_only_motion_reinfers_nothing() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    // A leading comment shifts every loc but no fingerprint.
    let shifted = format!("# moved\n{FILE_A_V1}");
    let (run, _) = coordinator.apply_edit(&[edit("a.rb", &shifted)]);
    assert!(run.took_fast_path);
    assert_eq!(run.methods_retypechecked, 0);
}

#[test]
fn noop_edit_is_skipped_entirely() {
    let mut coordinator = Coordinator::new();
    coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    let (run, published) = coordinator.apply_edit(&[edit("a.rb", FILE_A_V1)]);
    assert!(!run.took_fast_path);
    assert!(run.updated_files.is_empty());
    assert!(published.is_empty());
}

#[test]
fn cross_file_dispatch_survives_the_slow_path_merge() {
    // Two files parsed by separate workers; the substitution must keep the
    // cross-file class reference intact.
    let lib = "# typed: true\nclass Greeter\n  sig { returns(String) }\n  def hello\n    'hi'\n  end\nend\n";
    let app = "# typed: true\nclass App\n  sig { params(g: Greeter).returns(String) }\n  def run(g)\n    g.hello\n  end\nend\n";
    let mut coordinator = Coordinator::new();
    let (_, published) = coordinator.apply_edit(&[edit("lib.rb", lib), edit("app.rb", app)]);
    for (uri, diags) in &published {
        assert!(diags.is_empty(), "{uri} has diagnostics: {diags:?}");
    }
}
