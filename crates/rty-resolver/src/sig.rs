//! Lowering of `sig { … }` builder chains onto method symbols.
//!
//! The output contract: parameter types land on the method's argument
//! symbols, the return type (or void marker) on the method symbol, and the
//! modifier builders become symbol flags. Type parameters become type
//! argument symbols owned by the method, referenced from the signature as
//! type variables.

use crate::resolve::{render_path, resolve_constant_in_scope};
use rty_core::errors::resolver as errors;
use rty_core::types::Literal;
use rty_core::{symbol_flags, GlobalState, Loc, SymbolRef, Type};
use rty_parser::ast::{MethodDef, SigDecl, TypeExpr};

pub(crate) fn lower_sig(
    gs: &mut GlobalState,
    scope: &[SymbolRef],
    method: SymbolRef,
    decl: &SigDecl,
    def: &MethodDef,
) {
    // Type parameters first; the rest of the sig may reference them.
    for &tp_name in &decl.type_params {
        gs.enter_type_argument(decl.loc, method, tp_name);
    }

    let mut flags = 0u32;
    if decl.is_abstract {
        flags |= symbol_flags::ABSTRACT;
    }
    if decl.is_override {
        flags |= symbol_flags::OVERRIDE;
    }
    if decl.is_overridable {
        flags |= symbol_flags::OVERRIDABLE;
    }
    if decl.is_final {
        flags |= symbol_flags::FINAL;
    }
    if decl.is_void {
        flags |= symbol_flags::VOID_METHOD;
    }
    if flags != 0 {
        gs.symbol_data_mut(method).flags |= flags;
    }

    // Match sig params to declared parameters by name.
    let arg_syms = gs.symbol_data(method).arguments.clone();
    for (param_name, type_expr) in &decl.params {
        let arg = arg_syms
            .iter()
            .copied()
            .find(|&a| gs.symbol_data(a).name == *param_name);
        match arg {
            Some(arg) => {
                let ty = resolve_type_expr(gs, scope, Some(method), decl.loc, type_expr);
                gs.symbol_data_mut(arg).result_type = Some(ty);
            }
            None => {
                gs.report_error(
                    decl.loc,
                    errors::INVALID_SIG_BUILDER,
                    format!(
                        "malformed sig: `{}` is not a parameter of `{}`",
                        gs.name_str(*param_name),
                        gs.name_str(def.name)
                    ),
                );
            }
        }
    }
    // Declared parameters the sig does not mention.
    for &arg in &arg_syms {
        if gs.symbol_data(arg).result_type.is_none() {
            let name = gs.symbol_data(arg).name;
            gs.report_error(
                decl.loc,
                errors::INVALID_SIG_BUILDER,
                format!(
                    "malformed sig: type not specified for parameter `{}`",
                    gs.name_str(name)
                ),
            );
        }
    }

    let return_type = match (&decl.returns, decl.is_void) {
        (Some(_), true) => {
            gs.report_error(
                decl.loc,
                errors::INVALID_SIG_BUILDER,
                "malformed sig: `returns` conflicts with `void`".to_string(),
            );
            Type::Untyped
        }
        (Some(type_expr), false) => {
            resolve_type_expr(gs, scope, Some(method), decl.loc, type_expr)
        }
        (None, true) => Type::nil_class(),
        (None, false) => {
            if decl.is_abstract {
                Type::Untyped
            } else {
                gs.report_error(
                    decl.loc,
                    errors::INVALID_SIG_BUILDER,
                    "malformed sig: no `returns` or `void`".to_string(),
                );
                Type::Untyped
            }
        }
    };
    gs.symbol_data_mut(method).result_type = Some(return_type);
}

/// Resolve surface type syntax to a `Type`. Unresolvable pieces degrade to
/// `untyped` after reporting, so one bad sig does not cascade.
pub(crate) fn resolve_type_expr(
    gs: &mut GlobalState,
    scope: &[SymbolRef],
    method: Option<SymbolRef>,
    loc: Loc,
    type_expr: &TypeExpr,
) -> Type {
    match type_expr {
        TypeExpr::Untyped => Type::Untyped,
        TypeExpr::NoReturn => Type::Bottom,
        TypeExpr::Anything => Type::Top,
        TypeExpr::Boolean => Type::boolean(),
        TypeExpr::SelfType | TypeExpr::AttachedClass => Type::SelfTypeParam,
        TypeExpr::Nilable(inner) => {
            Type::nilable(resolve_type_expr(gs, scope, method, loc, inner))
        }
        TypeExpr::AnyOf(members) => members
            .iter()
            .map(|m| resolve_type_expr(gs, scope, method, loc, m))
            .reduce(Type::any)
            .unwrap_or(Type::Untyped),
        TypeExpr::AllOf(members) => members
            .iter()
            .map(|m| resolve_type_expr(gs, scope, method, loc, m))
            .reduce(Type::all)
            .unwrap_or(Type::Untyped),
        TypeExpr::Tuple(elems) => Type::Tuple(
            elems
                .iter()
                .map(|e| resolve_type_expr(gs, scope, method, loc, e))
                .collect(),
        ),
        TypeExpr::Shape(pairs) => Type::shape(
            pairs
                .iter()
                .map(|(key, value)| {
                    (
                        Literal::Symbol(*key),
                        resolve_type_expr(gs, scope, method, loc, value),
                    )
                })
                .collect(),
        ),
        TypeExpr::TypeParameter(name) => {
            let tp = method.and_then(|m| {
                gs.symbol_data(m)
                    .type_members
                    .iter()
                    .copied()
                    .find(|&tm| gs.symbol_data(tm).name == *name)
            });
            match tp {
                Some(tp) => Type::TypeVar(tp),
                None => {
                    gs.report_error(
                        loc,
                        errors::INVALID_SIG_BUILDER,
                        format!(
                            "`T.type_parameter(:{})` was not declared with `type_parameters`",
                            gs.name_str(*name)
                        ),
                    );
                    Type::Untyped
                }
            }
        }
        TypeExpr::Constant(path) => match resolve_constant_in_scope(gs, scope, &path.path) {
            Some(sym) if gs.symbol_data(sym).is_class_or_module() => {
                if gs.symbol_data(sym).type_members.is_empty() {
                    Type::Class(sym)
                } else {
                    // A bare generic stands for the class with unknown
                    // arguments.
                    let args = vec![Type::Untyped; gs.symbol_data(sym).type_members.len()];
                    Type::Applied { class: sym, args }
                }
            }
            Some(sym) => Type::Alias(sym),
            None => {
                gs.report_error(
                    path.loc,
                    errors::UNRESOLVED_CONSTANT,
                    format!(
                        "unable to resolve constant `{}` in signature",
                        render_path(gs, &path.path)
                    ),
                );
                Type::Untyped
            }
        },
        TypeExpr::Applied { base, args } => {
            match resolve_constant_in_scope(gs, scope, &base.path) {
                Some(sym) if gs.symbol_data(sym).is_class_or_module() => {
                    let expected = gs.symbol_data(sym).type_members.len();
                    if expected != args.len() {
                        gs.report_error(
                            base.loc,
                            errors::INVALID_SIG_BUILDER,
                            format!(
                                "`{}` expects {} type argument(s), got {}",
                                gs.symbol_full_name(sym),
                                expected,
                                args.len()
                            ),
                        );
                        return Type::Untyped;
                    }
                    let args = args
                        .iter()
                        .map(|a| resolve_type_expr(gs, scope, method, loc, a))
                        .collect();
                    Type::Applied { class: sym, args }
                }
                _ => {
                    gs.report_error(
                        base.loc,
                        errors::UNRESOLVED_CONSTANT,
                        format!(
                            "unable to resolve generic `{}` in signature",
                            render_path(gs, &base.path)
                        ),
                    );
                    Type::Untyped
                }
            }
        }
    }
}
