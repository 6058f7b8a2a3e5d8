use crate::ast::*;
use crate::parse_file;
use rty_core::{GlobalState, SourceType};

fn parse(source: &str) -> (GlobalState, ParsedFile) {
    let mut gs = GlobalState::new();
    let file = gs.with_unfrozen_files(|gs| gs.enter_file("test.rb", source.to_string(), SourceType::Normal));
    let parsed = parse_file(&mut gs, file);
    (gs, parsed)
}

fn parse_clean(source: &str) -> (GlobalState, ParsedFile) {
    let (mut gs, parsed) = parse(source);
    let errors = gs.drain_errors();
    assert!(errors.is_empty(), "parse errors: {errors:?}");
    (gs, parsed)
}

#[test]
fn parses_class_with_superclass() {
    let (gs, parsed) = parse_clean("# typed: true\nclass Foo < Bar\nend\n");
    assert_eq!(parsed.defs.len(), 1);
    let def = &parsed.defs[0];
    assert!(!def.is_module);
    assert_eq!(gs.name_str(def.path[0]), "Foo");
    let superclass = def.superclass.as_ref().unwrap();
    assert_eq!(gs.name_str(superclass.path[0]), "Bar");
}

#[test]
fn parses_sig_and_attaches_to_method() {
    let (gs, parsed) = parse_clean(
        "# typed: strict\nclass A\n  sig { params(x: Integer).returns(String) }\n  def m(x)\n    x.to_s\n  end\nend\n",
    );
    let method = &parsed.defs[0].methods[0];
    assert_eq!(gs.name_str(method.name), "m");
    let sig = method.sig.as_ref().expect("sig attached");
    assert_eq!(sig.params.len(), 1);
    assert!(matches!(sig.params[0].1, TypeExpr::Constant(_)));
    assert!(sig.returns.is_some());
    assert!(!sig.is_void);
}

#[test]
fn sig_builders_set_flags() {
    let (_, parsed) = parse_clean(
        "# typed: true\nclass A\n  sig { abstract.override.params(x: T.untyped).void }\n  def m(x)\n  end\nend\n",
    );
    let sig = parsed.defs[0].methods[0].sig.as_ref().unwrap();
    assert!(sig.is_abstract);
    assert!(sig.is_override);
    assert!(sig.is_void);
    assert!(matches!(sig.params[0].1, TypeExpr::Untyped));
}

#[test]
fn operator_becomes_send() {
    let (gs, parsed) = parse_clean("# typed: true\ndef f(a, b)\n  a + b\nend\n");
    let body = &parsed.toplevel_methods[0].body;
    match body {
        Expr::Send { name, args, .. } => {
            assert_eq!(gs.name_str(*name), "+");
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected send, got {other:?}"),
    }
}

#[test]
fn and_desugars_to_conditional_over_temp() {
    let (_, parsed) = parse_clean("# typed: true\ndef f(a, b)\n  a && b\nend\n");
    let body = &parsed.toplevel_methods[0].body;
    match body {
        Expr::Seq { stmts, .. } => {
            assert!(matches!(stmts[0], Expr::Assign { .. }));
            assert!(matches!(stmts[1], Expr::If { .. }));
        }
        other => panic!("expected seq, got {other:?}"),
    }
}

#[test]
fn case_desugars_to_is_a_chain() {
    let (gs, parsed) = parse_clean(
        "# typed: true\ndef f(x)\n  case x\n  when Integer\n    1\n  when String\n    2\n  else\n    T.absurd(x)\n  end\nend\n",
    );
    let body = &parsed.toplevel_methods[0].body;
    let Expr::Seq { stmts, .. } = body else {
        panic!("expected seq, got {body:?}");
    };
    let Expr::If { cond, else_, .. } = &stmts[1] else {
        panic!("expected if-chain");
    };
    match cond.as_ref() {
        Expr::Send { name, .. } => assert_eq!(gs.name_str(*name), "is_a?"),
        other => panic!("expected is_a? test, got {other:?}"),
    }
    // The innermost else holds the absurd call.
    let Expr::If { else_: inner, .. } = else_.as_ref() else {
        panic!("expected nested if");
    };
    assert!(matches!(inner.as_ref(), Expr::Absurd { .. }));
}

#[test]
fn t_let_parses_to_cast() {
    let (_, parsed) = parse_clean("# typed: true\ndef f\n  x = T.let(1, Integer)\n  x\nend\n");
    let Expr::Seq { stmts, .. } = &parsed.toplevel_methods[0].body else {
        panic!()
    };
    let Expr::Assign { value, .. } = &stmts[0] else {
        panic!()
    };
    match value.as_ref() {
        Expr::Cast { kind, type_expr, .. } => {
            assert_eq!(*kind, CastKind::Let);
            assert!(type_expr.is_some());
        }
        other => panic!("expected cast, got {other:?}"),
    }
}

#[test]
fn bare_ident_is_local_after_assignment_self_send_before() {
    let (_, parsed) = parse_clean("# typed: true\ndef f\n  y = helper\n  y\nend\n");
    let Expr::Seq { stmts, .. } = &parsed.toplevel_methods[0].body else {
        panic!()
    };
    let Expr::Assign { value, .. } = &stmts[0] else {
        panic!()
    };
    // `helper` was not assigned: a send to self with private access.
    match value.as_ref() {
        Expr::Send { is_private_ok, .. } => assert!(is_private_ok),
        other => panic!("expected send, got {other:?}"),
    }
    // `y` was assigned: a local read.
    assert!(matches!(stmts[1], Expr::Local { .. }));
}

#[test]
fn keyword_arguments_in_defs_and_sends() {
    let (gs, parsed) = parse_clean(
        "# typed: true\ndef f(a, b: 2)\n  g(a, b: 3)\nend\n",
    );
    let def = &parsed.toplevel_methods[0];
    assert_eq!(def.params[1].kind, ParamKind::KeywordOptional);
    let Expr::Send { kwargs, args, .. } = &def.body else {
        panic!()
    };
    assert_eq!(args.len(), 1);
    assert_eq!(gs.name_str(kwargs[0].0), "b");
}

#[test]
fn begin_rescue_ensure() {
    let (_, parsed) = parse_clean(
        "# typed: true\ndef f\n  begin\n    1\n  rescue StandardError => e\n    2\n  ensure\n    3\n  end\nend\n",
    );
    match &parsed.toplevel_methods[0].body {
        Expr::Rescue {
            handler, ensure, ..
        } => {
            let (binder, _) = handler.as_ref().unwrap();
            assert!(binder.is_some());
            assert!(ensure.is_some());
        }
        other => panic!("expected rescue, got {other:?}"),
    }
}

#[test]
fn do_block_with_params() {
    let (gs, parsed) = parse_clean("# typed: true\ndef f(xs)\n  xs.each do |x|\n    x\n  end\nend\n");
    let Expr::Send { block, .. } = &parsed.toplevel_methods[0].body else {
        panic!()
    };
    let block = block.as_ref().unwrap();
    assert_eq!(block.params.len(), 1);
    assert_eq!(gs.name_str(block.params[0].0), "x");
    assert!(matches!(block.body, Expr::Local { .. }));
}

#[test]
fn syntax_error_recovers_and_keeps_later_definitions() {
    let (mut gs, parsed) = parse(
        "# typed: true\nclass A\n  def ok\n    1 +\n  end\nend\nclass B\nend\n",
    );
    let errors = gs.drain_errors();
    assert!(!errors.is_empty(), "expected a syntax error");
    // The second class still parses.
    assert_eq!(parsed.defs.len(), 2);
}

#[test]
fn safe_navigation_sets_flag() {
    let (_, parsed) = parse_clean("# typed: true\ndef f(x)\n  x&.to_s\nend\n");
    match &parsed.toplevel_methods[0].body {
        Expr::Send { is_safe, .. } => assert!(is_safe),
        other => panic!("expected send, got {other:?}"),
    }
}

#[test]
fn generic_sig_type_syntax() {
    let (_, parsed) = parse_clean(
        "# typed: true\nclass A\n  sig { type_parameters(:U).params(x: T.type_parameter(:U)).returns(T.type_parameter(:U)) }\n  def id(x)\n    x\n  end\n  sig { params(xs: T::Array[Integer]).returns(T.nilable(Integer)) }\n  def first_of(xs)\n    xs.first\n  end\nend\n",
    );
    let id_sig = parsed.defs[0].methods[0].sig.as_ref().unwrap();
    assert_eq!(id_sig.type_params.len(), 1);
    assert!(matches!(id_sig.params[0].1, TypeExpr::TypeParameter(_)));
    let arr_sig = parsed.defs[0].methods[1].sig.as_ref().unwrap();
    assert!(matches!(arr_sig.params[0].1, TypeExpr::Applied { .. }));
    assert!(matches!(arr_sig.returns, Some(TypeExpr::Nilable(_))));
}
