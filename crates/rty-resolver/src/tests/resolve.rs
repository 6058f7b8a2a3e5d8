use rty_core::{symbol_flags, wk_sym, GlobalState, SourceType, Type};
use rty_parser::ast::ParsedFile;

fn resolve_sources(sources: &[(&str, &str)]) -> (GlobalState, Vec<ParsedFile>) {
    let mut gs = GlobalState::new();
    let mut parsed = Vec::new();
    for (path, source) in sources {
        let file = gs.with_unfrozen_files(|gs| {
            gs.enter_file(path, source.to_string(), SourceType::Normal)
        });
        parsed.push(rty_parser::parse_file(&mut gs, file));
    }
    crate::run(&mut gs, &mut parsed);
    (gs, parsed)
}

fn resolve_one(source: &str) -> (GlobalState, Vec<ParsedFile>) {
    resolve_sources(&[("test.rb", source)])
}

fn class_by_name(gs: &GlobalState, name: &str) -> rty_core::SymbolRef {
    let name = gs.lookup_name_utf8(name).expect("name interned");
    *gs.symbol_data(wk_sym::ROOT)
        .members
        .get(&name)
        .expect("class entered")
}

#[test]
fn enters_classes_and_wires_superclasses() {
    let (mut gs, _) = resolve_one("# typed: true\nclass Bar\nend\nclass Foo < Bar\nend\n");
    assert!(gs.drain_errors().is_empty());
    let bar = class_by_name(&gs, "Bar");
    let foo = class_by_name(&gs, "Foo");
    assert_eq!(gs.symbol_data(foo).superclass, Some(bar));
    assert_eq!(gs.symbol_data(bar).superclass, Some(wk_sym::OBJECT));
    assert!(gs.derives_from(foo, bar));
    assert!(!gs.derives_from(bar, foo));
    assert!(gs.symbol_data(foo).resolved_ancestors.is_some());
}

#[test]
fn subtype_and_lattice_on_user_hierarchy() {
    // Scenario: two siblings under one superclass.
    let (mut gs, _) = resolve_one(
        "# typed: true\nclass Bar\nend\nclass Foo1 < Bar\nend\nclass Foo2 < Bar\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let bar = Type::Class(class_by_name(&gs, "Bar"));
    let foo1 = Type::Class(class_by_name(&gs, "Foo1"));
    let foo2 = Type::Class(class_by_name(&gs, "Foo2"));
    assert!(rty_core::types::is_subtype(&gs, &foo1, &bar));
    assert!(!rty_core::types::is_subtype(&gs, &bar, &foo1));
    assert_eq!(rty_core::types::join(&gs, &foo1, &foo2), bar);
    assert_eq!(rty_core::types::meet(&gs, &foo1, &foo2), Type::Bottom);
}

#[test]
fn cross_file_superclass_resolution() {
    let (mut gs, _) = resolve_sources(&[
        ("base.rb", "# typed: true\nclass Base\nend\n"),
        ("derived.rb", "# typed: true\nclass Derived < Base\nend\n"),
    ]);
    assert!(gs.drain_errors().is_empty());
    let base = class_by_name(&gs, "Base");
    let derived = class_by_name(&gs, "Derived");
    assert!(gs.derives_from(derived, base));
}

#[test]
fn unresolved_superclass_reports_and_defaults_to_object() {
    let (mut gs, _) = resolve_one("# typed: true\nclass Foo < Missing\nend\n");
    let errors = gs.drain_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Missing"));
    let foo = class_by_name(&gs, "Foo");
    assert_eq!(gs.symbol_data(foo).superclass, Some(wk_sym::OBJECT));
}

#[test]
fn cyclic_ancestry_is_reported_and_broken() {
    let (mut gs, _) = resolve_one("# typed: true\nclass A < B\nend\nclass B < A\nend\n");
    let errors = gs.drain_errors();
    assert!(
        errors.iter().any(|e| e.message.contains("circular")),
        "expected cycle error, got {errors:?}"
    );
    // Both classes still usable afterwards.
    let a = class_by_name(&gs, "A");
    assert!(gs.symbol_data(a).resolved_ancestors.is_some());
}

#[test]
fn sig_lowers_onto_method_and_argument_symbols() {
    let (mut gs, _) = resolve_one(
        "# typed: strict\nclass A\n  sig { params(x: Integer).returns(String) }\n  def m(x)\n    x.to_s\n  end\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let a = class_by_name(&gs, "A");
    let m_name = gs.lookup_name_utf8("m").unwrap();
    let method = *gs.symbol_data(a).members.get(&m_name).unwrap();
    let method_data = gs.symbol_data(method);
    assert_eq!(
        method_data.result_type,
        Some(Type::Class(wk_sym::STRING))
    );
    let arg = method_data.arguments[0];
    assert_eq!(
        gs.symbol_data(arg).result_type,
        Some(Type::Class(wk_sym::INTEGER))
    );
}

#[test]
fn void_sig_sets_flag() {
    let (mut gs, _) = resolve_one(
        "# typed: true\nclass A\n  sig { void }\n  def go\n  end\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let a = class_by_name(&gs, "A");
    let go = *gs
        .symbol_data(a)
        .members
        .get(&gs.lookup_name_utf8("go").unwrap())
        .unwrap();
    assert!(gs.symbol_data(go).is_void_method());
}

#[test]
fn missing_sig_reported_only_at_strict() {
    let (mut gs_strict, _) =
        resolve_one("# typed: strict\nclass A\n  def m\n  end\nend\n");
    let errors = gs_strict.drain_errors();
    assert!(errors.iter().any(|e| e.message.contains("does not have a `sig`")));

    let (mut gs_true, _) = resolve_one("# typed: true\nclass A\n  def m\n  end\nend\n");
    assert!(gs_true.drain_errors().is_empty());
}

#[test]
fn sig_param_name_mismatch_is_malformed() {
    let (mut gs, _) = resolve_one(
        "# typed: true\nclass A\n  sig { params(y: Integer).returns(Integer) }\n  def m(x)\n    1\n  end\nend\n",
    );
    let errors = gs.drain_errors();
    assert!(errors.iter().any(|e| e.message.contains("not a parameter")));
    assert!(errors.iter().any(|e| e.message.contains("type not specified")));
}

#[test]
fn generic_sig_creates_type_arguments() {
    let (mut gs, _) = resolve_one(
        "# typed: true\nclass A\n  sig { type_parameters(:U).params(x: T.type_parameter(:U)).returns(T.type_parameter(:U)) }\n  def id(x)\n    x\n  end\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let a = class_by_name(&gs, "A");
    let id = *gs
        .symbol_data(a)
        .members
        .get(&gs.lookup_name_utf8("id").unwrap())
        .unwrap();
    let data = gs.symbol_data(id);
    assert_eq!(data.type_members.len(), 1);
    let tv = data.type_members[0];
    assert!(gs.symbol_data(tv).has_flag(symbol_flags::TYPE_ARGUMENT));
    assert_eq!(data.result_type, Some(Type::TypeVar(tv)));
}

#[test]
fn nested_classes_and_constant_scoping() {
    let (mut gs, _) = resolve_one(
        "# typed: true\nmodule Outer\n  class Inner\nend\n  class User < Inner\nend\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let outer = class_by_name(&gs, "Outer");
    let inner = *gs
        .symbol_data(outer)
        .members
        .get(&gs.lookup_name_utf8("Inner").unwrap())
        .unwrap();
    let user = *gs
        .symbol_data(outer)
        .members
        .get(&gs.lookup_name_utf8("User").unwrap())
        .unwrap();
    assert_eq!(gs.symbol_data(user).superclass, Some(inner));
}

#[test]
fn instance_variable_with_t_let_declares_field_type() {
    let (mut gs, _) = resolve_one(
        "# typed: true\nclass A\n  sig { void }\n  def initialize\n    @count = T.let(0, Integer)\n  end\nend\n",
    );
    assert!(gs.drain_errors().is_empty());
    let a = class_by_name(&gs, "A");
    let field = *gs
        .symbol_data(a)
        .members
        .get(&gs.lookup_name_utf8("count").unwrap())
        .unwrap();
    assert!(gs.symbol_data(field).has_flag(symbol_flags::FIELD));
    assert_eq!(
        gs.symbol_data(field).result_type,
        Some(Type::Class(wk_sym::INTEGER))
    );
}

#[test]
fn static_field_gets_literal_type() {
    let (mut gs, _) =
        resolve_one("# typed: true\nclass A\n  MAX = 10\nend\n");
    assert!(gs.drain_errors().is_empty());
    let a = class_by_name(&gs, "A");
    let max = *gs
        .symbol_data(a)
        .members
        .get(&gs.lookup_name_utf8("MAX").unwrap())
        .unwrap();
    assert!(gs.symbol_data(max).has_flag(symbol_flags::STATIC_FIELD));
    assert_eq!(
        gs.symbol_data(max).result_type,
        Some(Type::LiteralType(rty_core::types::Literal::Integer(10)))
    );
}
