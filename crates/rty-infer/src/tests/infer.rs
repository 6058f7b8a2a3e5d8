use crate::infer_cfg;
use rty_core::{Diagnostic, GlobalState, SourceType};
use rty_parser::ast::ParsedFile;

/// Run the full pipeline over one source file and drain its diagnostics.
fn check(source: &str) -> (GlobalState, Vec<Diagnostic>) {
    let mut gs = GlobalState::new();
    let file = gs.with_unfrozen_files(|gs| {
        gs.enter_file("test.rb", source.to_string(), SourceType::Normal)
    });
    let mut parsed = vec![rty_parser::parse_file(&mut gs, file)];
    rty_resolver::run(&mut gs, &mut parsed);
    infer_all(&mut gs, &parsed[0]);
    let errors = gs.drain_errors();
    (gs, errors)
}

fn infer_all(gs: &mut GlobalState, file: &ParsedFile) {
    fn class_methods(gs: &mut GlobalState, def: &rty_parser::ast::ClassDef) {
        for method in &def.methods {
            if let Some(mut cfg) = rty_cfg::build_for_method(gs, method) {
                infer_cfg(gs, &mut cfg);
            }
        }
        for nested in &def.nested {
            class_methods(gs, nested);
        }
    }
    for def in &file.defs {
        class_methods(gs, def);
    }
    for method in &file.toplevel_methods {
        if let Some(mut cfg) = rty_cfg::build_for_method(gs, method) {
            infer_cfg(gs, &mut cfg);
        }
    }
}

fn assert_clean(source: &str) {
    let (_, errors) = check(source);
    assert!(errors.is_empty(), "expected no diagnostics, got {errors:?}");
}

fn assert_one_error(source: &str, needle: &str) -> Diagnostic {
    let (_, errors) = check(source);
    assert_eq!(errors.len(), 1, "expected one diagnostic, got {errors:?}");
    assert!(
        errors[0].message.contains(needle),
        "message `{}` does not contain `{needle}`",
        errors[0].message
    );
    errors[0].clone()
}

// =============================================================================
// Arithmetic and argument checking
// =============================================================================

#[test]
fn integer_plus_string_reports_at_the_argument() {
    let source = "# typed: strict\nclass A\n  sig { returns(Integer) }\n  def f\n    1 + 'hello'\n  end\nend\n";
    let (gs, errors) = check(source);
    assert_eq!(errors.len(), 1, "got {errors:?}");
    let err = &errors[0];
    assert_eq!(err.message, "expected `Integer`, got `String`");
    // The span points at the string literal.
    assert_eq!(err.loc.source(&gs), Some("'hello'"));
}

#[test]
fn integer_plus_integer_is_clean() {
    assert_clean(
        "# typed: strict\nclass A\n  sig { returns(Integer) }\n  def f\n    1 + 2\n  end\nend\n",
    );
}

#[test]
fn wrong_arity_is_reported() {
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: Integer).returns(Integer) }\n  def f(x)\n    x\n  end\n  sig { returns(Integer) }\n  def g\n    f(1, 2)\n  end\nend\n",
        "wrong number of arguments",
    );
}

#[test]
fn method_does_not_exist() {
    assert_one_error(
        "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    1.frobnicate\n  end\nend\n",
        "method `frobnicate` does not exist on `Integer`",
    );
}

#[test]
fn keyword_arguments_check_by_name() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: Integer, y: String).returns(String) }\n  def f(x, y: 'd')\n    y\n  end\n  sig { returns(String) }\n  def g\n    f(1, y: 'v')\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: Integer, y: String).returns(String) }\n  def f(x, y: 'd')\n    y\n  end\n  sig { returns(String) }\n  def g\n    f(1, y: 2)\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

// =============================================================================
// Return types
// =============================================================================

#[test]
fn return_type_mismatch() {
    let err = assert_one_error(
        "# typed: strict\nclass A\n  sig { returns(String) }\n  def f\n    return 42\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
    assert_eq!(err.code, rty_core::errors::infer::RETURN_TYPE_MISMATCH.code);
}

#[test]
fn implicit_return_value_is_checked_too() {
    assert_one_error(
        "# typed: strict\nclass A\n  sig { returns(String) }\n  def f\n    42\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

#[test]
fn void_method_accepts_any_result() {
    assert_clean(
        "# typed: true\nclass A\n  sig { void }\n  def f\n    42\n  end\nend\n",
    );
}

#[test]
fn branches_join_for_the_result() {
    // Both branches return Integer: fine.
    assert_clean(
        "# typed: true\nclass A\n  sig { params(c: T::Boolean).returns(Integer) }\n  def f(c)\n    if c\n      1\n    else\n      2\n    end\n  end\nend\n",
    );
    // One branch yields a String: the joined result does not fit.
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(c: T::Boolean).returns(Integer) }\n  def f(c)\n    if c\n      1\n    else\n      'two'\n    end\n  end\nend\n",
        "expected `Integer`, got",
    );
}

// =============================================================================
// Flow-sensitive refinements
// =============================================================================

#[test]
fn nil_check_refines_both_branches() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(Integer) }\n  def f(x)\n    if x.nil?\n      0\n    else\n      x + 1\n    end\n  end\nend\n",
    );
}

#[test]
fn truthiness_refines_nilable() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(Integer) }\n  def f(x)\n    if x\n      x + 1\n    else\n      0\n    end\n  end\nend\n",
    );
}

#[test]
fn is_a_refines_union() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.any(Integer, String)).returns(Integer) }\n  def f(x)\n    if x.is_a?(Integer)\n      x + 1\n    else\n      x.length\n    end\n  end\nend\n",
    );
}

#[test]
fn refinement_does_not_outlive_the_merge() {
    // After the merge, x is back to the union: `+ 1` on the String side
    // wants a String argument.
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: T.any(Integer, String)).returns(Integer) }\n  def f(x)\n    if x.is_a?(Integer)\n      y = 0\n    end\n    x + 1\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

#[test]
fn unrefined_nilable_use_errors() {
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(Integer) }\n  def f(x)\n    x + 1\n  end\nend\n",
        "method `+` does not exist on `NilClass`",
    );
}

#[test]
fn t_must_strips_nil() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(Integer) }\n  def f(x)\n    T.must(x) + 1\n  end\nend\n",
    );
}

#[test]
fn safe_navigation_is_nilable() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(T.nilable(String)) }\n  def f(x)\n    x&.to_s\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: T.nilable(Integer)).returns(String) }\n  def f(x)\n    x&.to_s\n  end\nend\n",
        "expected `String`, got `T.nilable(String)`",
    );
}

// =============================================================================
// Exhaustiveness (T.absurd)
// =============================================================================

#[test]
fn absurd_accepts_fully_handled_case() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.any(Integer, String)).returns(Integer) }\n  def f(x)\n    case x\n    when Integer\n      1\n    when String\n      2\n    else\n      T.absurd(x)\n    end\n  end\nend\n",
    );
}

#[test]
fn absurd_reports_unhandled_component() {
    let err = assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: T.any(Integer, String, Float)).returns(Integer) }\n  def f(x)\n    case x\n    when Integer\n      1\n    when String\n      2\n    else\n      T.absurd(x)\n    end\n  end\nend\n",
        "Float",
    );
    assert_eq!(err.code, rty_core::errors::infer::NOT_EXHAUSTIVE.code);
}

// =============================================================================
// Casts
// =============================================================================

#[test]
fn t_let_checks_the_ascription() {
    assert_clean(
        "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    x = T.let(1, Integer)\n    x\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    x = T.let('s', Integer)\n    x\n  end\nend\n",
        "expected `Integer`, got `String`",
    );
}

#[test]
fn t_cast_allows_downcasts_but_not_disjoint_casts() {
    assert_clean(
        "# typed: true\nclass Animal\nend\nclass Dog < Animal\nend\nclass A\n  sig { params(x: Animal).returns(Dog) }\n  def f(x)\n    T.cast(x, Dog)\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(x: Integer).returns(String) }\n  def f(x)\n    T.cast(x, String)\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

#[test]
fn t_unsafe_goes_to_untyped() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: Integer).returns(String) }\n  def f(x)\n    T.unsafe(x)\n  end\nend\n",
    );
}

// =============================================================================
// User classes, fields, dispatch through the hierarchy
// =============================================================================

#[test]
fn user_class_hierarchy_dispatch() {
    assert_clean(
        "# typed: true\nclass Animal\n  sig { returns(String) }\n  def name\n    'animal'\n  end\nend\nclass Dog < Animal\nend\nclass A\n  sig { params(d: Dog).returns(String) }\n  def f(d)\n    d.name\n  end\nend\n",
    );
}

#[test]
fn subclass_flows_to_superclass_parameter() {
    assert_clean(
        "# typed: true\nclass Animal\nend\nclass Dog < Animal\nend\nclass A\n  sig { params(a: Animal).returns(Animal) }\n  def id(a)\n    a\n  end\n  sig { params(d: Dog).returns(Animal) }\n  def f(d)\n    id(d)\n  end\nend\n",
    );
}

#[test]
fn constructor_dispatch_through_new() {
    assert_clean(
        "# typed: true\nclass Dog\n  sig { returns(String) }\n  def bark\n    'woof'\n  end\nend\nclass A\n  sig { returns(String) }\n  def f\n    Dog.new.bark\n  end\nend\n",
    );
}

#[test]
fn field_reads_use_declared_type() {
    assert_clean(
        "# typed: true\nclass Counter\n  sig { void }\n  def initialize\n    @count = T.let(0, Integer)\n  end\n  sig { returns(Integer) }\n  def count\n    @count\n  end\nend\n",
    );
}

#[test]
fn field_write_against_declared_type() {
    assert_one_error(
        "# typed: true\nclass Counter\n  sig { void }\n  def initialize\n    @count = T.let(0, Integer)\n  end\n  sig { void }\n  def clobber\n    @count = 'zero'\n  end\nend\n",
        "expected `Integer`, got `String`",
    );
}

#[test]
fn private_methods_need_implicit_receiver() {
    // Callable bare (implicit self)…
    assert_clean(
        "# typed: true\nclass A\n  private\n  sig { returns(Integer) }\n  def helper\n    1\n  end\n  sig { returns(Integer) }\n  def f\n    helper\n  end\nend\n",
    );
    // …but not through an explicit receiver.
    assert_one_error(
        "# typed: true\nclass A\n  private\n  sig { returns(Integer) }\n  def helper\n    1\n  end\nend\nclass B\n  sig { params(a: A).returns(Integer) }\n  def f(a)\n    a.helper\n  end\nend\n",
        "non-private call to private method `helper`",
    );
}

// =============================================================================
// Generics
// =============================================================================

#[test]
fn generic_identity_instantiates_per_call_site() {
    assert_clean(
        "# typed: true\nclass A\n  sig { type_parameters(:U).params(x: T.type_parameter(:U)).returns(T.type_parameter(:U)) }\n  def id(x)\n    x\n  end\n  sig { returns(Integer) }\n  def f\n    id(1) + 1\n  end\n  sig { returns(String) }\n  def g\n    id('s') + ''\n  end\nend\n",
    );
}

#[test]
fn array_element_types_flow_through_methods() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(xs: T::Array[Integer]).returns(Integer) }\n  def f(xs)\n    T.must(xs.first) + 1\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(xs: T::Array[String]).returns(Integer) }\n  def f(xs)\n    T.must(xs.first) + 1\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

#[test]
fn array_push_checks_element_type() {
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(xs: T::Array[Integer]).void }\n  def f(xs)\n    xs.push('nope')\n  end\nend\n",
        "expected `Integer`, got `String`",
    );
}

#[test]
fn each_block_parameter_gets_element_type() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(xs: T::Array[Integer]).returns(Integer) }\n  def f(xs)\n    total = 0\n    xs.each do |x|\n      total = total + x\n    end\n    total\n  end\nend\n",
    );
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(xs: T::Array[String]).void }\n  def f(xs)\n    xs.each do |x|\n      x + 1\n    end\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

// =============================================================================
// Loops
// =============================================================================

#[test]
fn loop_counter_stays_integer() {
    assert_clean(
        "# typed: true\nclass A\n  sig { returns(Integer) }\n  def f\n    i = 0\n    while i < 10\n      i = i + 1\n    end\n    i\n  end\nend\n",
    );
}

#[test]
fn loop_widening_to_union_is_reported_at_use() {
    assert_one_error(
        "# typed: true\nclass A\n  sig { params(c: T::Boolean).returns(Integer) }\n  def f(c)\n    x = 0\n    while c\n      x = 's'\n    end\n    x + 1\n  end\nend\n",
        "expected `String`, got `Integer`",
    );
}

// =============================================================================
// Untyped stays quiet
// =============================================================================

#[test]
fn untyped_receiver_never_errors() {
    assert_clean(
        "# typed: true\nclass A\n  sig { params(x: T.untyped).returns(Integer) }\n  def f(x)\n    x.whatever(1, 2).more\n  end\nend\n",
    );
}

#[test]
fn unsigged_methods_infer_without_noise() {
    assert_clean(
        "# typed: true\nclass A\n  def f(x)\n    x + 1\n  end\nend\n",
    );
}
