//! Phase 2: ancestry, linearization, and in-place reference resolution.

use crate::sig;
use rty_core::errors::resolver as errors;
use rty_core::names::wk;
use rty_core::{symbol_flags, wk_sym, GlobalState, NameRef, SymbolRef, Type};
use rty_parser::ast::{ClassDef, ConstantPath, Expr, MethodDef, ParsedFile};
use rustc_hash::FxHashSet;

/// Resolve a constant path against a lexical scope stack (innermost last).
/// Walks outward through the enclosing scopes, then the root.
pub fn resolve_constant_in_scope(
    gs: &GlobalState,
    scope: &[SymbolRef],
    path: &[NameRef],
) -> Option<SymbolRef> {
    // `T::Array` and friends name the builtin generics.
    if path.len() == 2 && path[0] == wk::T_MODULE {
        if path[1] == wk::ARRAY {
            return Some(wk_sym::ARRAY);
        }
        if path[1] == wk::HASH {
            return Some(wk_sym::HASH);
        }
    }

    let first = *path.first()?;
    let mut base: Option<SymbolRef> = None;
    for &scope_sym in scope.iter().rev() {
        // Look through the scope symbol and its ancestors.
        for ancestor in gs.linearization_of(scope_sym) {
            if let Some(&found) = gs.symbol_data(ancestor).members.get(&first) {
                base = Some(found);
                break;
            }
        }
        if base.is_some() {
            break;
        }
    }
    if base.is_none() {
        base = gs.symbol_data(wk_sym::ROOT).members.get(&first).copied();
    }
    let mut current = base?;
    for &segment in &path[1..] {
        current = *gs.symbol_data(current).members.get(&segment)?;
    }
    Some(current)
}

pub(crate) fn resolve_ancestry(gs: &mut GlobalState, file: &mut ParsedFile) {
    for def in &mut file.defs {
        resolve_class_ancestry(gs, &[wk_sym::ROOT], def);
    }
}

fn resolve_class_ancestry(gs: &mut GlobalState, scope: &[SymbolRef], def: &mut ClassDef) {
    let Some(sym) = def.resolved else { return };
    let mut inner_scope = scope.to_vec();
    inner_scope.push(sym);

    if !def.is_module {
        // The superclass path is resolved (and reported) on every pass so
        // incremental re-resolves keep the diagnostic; the symbol itself is
        // only wired once.
        let superclass = match &mut def.superclass {
            Some(path) => {
                let resolved = resolve_constant_in_scope(gs, scope, &path.path);
                path.resolved = resolved;
                match resolved {
                    Some(sup) if gs.symbol_data(sup).has_flag(symbol_flags::CLASS) => sup,
                    Some(sup) => {
                        gs.report_error(
                            path.loc,
                            errors::REDEFINITION_MISMATCH,
                            format!(
                                "superclass `{}` is not a class",
                                gs.symbol_full_name(sup)
                            ),
                        );
                        wk_sym::OBJECT
                    }
                    None => {
                        gs.report_error(
                            path.loc,
                            errors::UNRESOLVED_CONSTANT,
                            format!(
                                "unable to resolve constant `{}`",
                                render_path(gs, &path.path)
                            ),
                        );
                        wk_sym::OBJECT
                    }
                }
            }
            None => wk_sym::OBJECT,
        };
        if gs.symbol_data(sym).superclass.is_none() {
            if creates_cycle(gs, sym, superclass) {
                gs.report_error(
                    def.name_loc,
                    errors::CYCLIC_ANCESTRY,
                    format!(
                        "circular dependency: `{}` is already an ancestor of its superclass",
                        gs.symbol_full_name(sym)
                    ),
                );
                gs.symbol_data_mut(sym).superclass = Some(wk_sym::OBJECT);
            } else {
                gs.symbol_data_mut(sym).superclass = Some(superclass);
            }
        }
    }

    for nested in &mut def.nested {
        resolve_class_ancestry(gs, &inner_scope, nested);
    }
}

fn creates_cycle(gs: &GlobalState, class: SymbolRef, superclass: SymbolRef) -> bool {
    let mut seen = FxHashSet::default();
    let mut cursor = Some(superclass);
    while let Some(current) = cursor {
        if current == class {
            return true;
        }
        if !seen.insert(current) {
            return false;
        }
        cursor = gs.symbol_data(current).superclass;
    }
    false
}

/// Compute and freeze `resolved_ancestors` for every class entered by this
/// batch. Dispatch relies on the list never changing afterwards.
pub(crate) fn finalize_linearizations(gs: &mut GlobalState, files: &[ParsedFile]) {
    fn visit(gs: &mut GlobalState, def: &ClassDef) {
        if let Some(sym) = def.resolved {
            let mut lin = Vec::new();
            gs.linearize_into(sym, &mut lin);
            gs.symbol_data_mut(sym).resolved_ancestors = Some(lin);
        }
        for nested in &def.nested {
            visit(gs, nested);
        }
    }
    for file in files {
        for def in &file.defs {
            visit(gs, def);
        }
    }
}

pub(crate) fn resolve_sigs_and_bodies(gs: &mut GlobalState, file: &mut ParsedFile) {
    for def in &mut file.defs {
        resolve_class_contents(gs, &[wk_sym::ROOT], def);
    }
    for method in &mut file.toplevel_methods {
        resolve_method(gs, &[wk_sym::ROOT], wk_sym::OBJECT, method);
    }
}

fn resolve_class_contents(gs: &mut GlobalState, scope: &[SymbolRef], def: &mut ClassDef) {
    let Some(sym) = def.resolved else { return };
    let mut inner_scope = scope.to_vec();
    inner_scope.push(sym);

    for field in &mut def.static_fields {
        resolve_expr(gs, &inner_scope, sym, None, &mut field.value);
        // A literal initializer gives the constant a precise type.
        if let Some(&field_sym) = gs.symbol_data(sym).members.get(&field.name) {
            if gs.symbol_data(field_sym).result_type.is_none() {
                let ty = literal_type_of(&field.value).unwrap_or(Type::Untyped);
                gs.symbol_data_mut(field_sym).result_type = Some(ty);
            }
        }
    }
    for method in &mut def.methods {
        resolve_method(gs, &inner_scope, sym, method);
    }
    for nested in &mut def.nested {
        resolve_class_contents(gs, &inner_scope, nested);
    }
}

fn resolve_method(
    gs: &mut GlobalState,
    scope: &[SymbolRef],
    owner: SymbolRef,
    def: &mut MethodDef,
) {
    let Some(method) = def.resolved else { return };

    match &def.sig {
        Some(decl) => sig::lower_sig(gs, scope, method, decl, def),
        None => {
            // Strict files require signatures; the floor on this error class
            // keeps it silent below `# typed: strict`.
            gs.report_error(
                def.name_loc,
                errors::SIG_REQUIRED,
                format!(
                    "method `{}` does not have a `sig`",
                    gs.name_str(def.name)
                ),
            );
        }
    }

    // Default argument values and the body proper.
    for param in &mut def.params {
        if let Some(default) = &mut param.default {
            resolve_expr(gs, scope, owner, Some(method), default);
        }
    }
    resolve_expr(gs, scope, owner, Some(method), &mut def.body);
}

/// Walk an expression, resolving constant references and cast target types,
/// and entering field symbols for instance variables.
fn resolve_expr(
    gs: &mut GlobalState,
    scope: &[SymbolRef],
    owner: SymbolRef,
    method: Option<SymbolRef>,
    expr: &mut Expr,
) {
    match expr {
        Expr::Seq { stmts, .. } => {
            for stmt in stmts {
                resolve_expr(gs, scope, owner, method, stmt);
            }
        }
        Expr::Assign { value, .. } => resolve_expr(gs, scope, owner, method, value),
        Expr::FieldAssign { loc, name, value } => {
            resolve_expr(gs, scope, owner, method, value);
            let field = gs.enter_field_symbol(*loc, owner, *name);
            // `@x = T.let(…, X)` declares the field's type.
            if let Expr::Cast {
                resolved_type: Some(ty),
                ..
            } = value.as_ref()
            {
                if gs.symbol_data(field).result_type.is_none() {
                    gs.symbol_data_mut(field).result_type = Some(ty.clone());
                }
            }
        }
        Expr::FieldRef { loc, name } => {
            gs.enter_field_symbol(*loc, owner, *name);
        }
        Expr::Constant(path) => {
            resolve_path(gs, scope, path);
        }
        Expr::Send {
            recv, args, kwargs, block, ..
        } => {
            resolve_expr(gs, scope, owner, method, recv);
            for arg in args {
                resolve_expr(gs, scope, owner, method, arg);
            }
            for (_, arg) in kwargs {
                resolve_expr(gs, scope, owner, method, arg);
            }
            if let Some(block) = block {
                resolve_expr(gs, scope, owner, method, &mut block.body);
            }
        }
        Expr::If { cond, then_, else_, .. } => {
            resolve_expr(gs, scope, owner, method, cond);
            resolve_expr(gs, scope, owner, method, then_);
            resolve_expr(gs, scope, owner, method, else_);
        }
        Expr::While { cond, body, .. } => {
            resolve_expr(gs, scope, owner, method, cond);
            resolve_expr(gs, scope, owner, method, body);
        }
        Expr::Return { value, .. } => {
            if let Some(value) = value {
                resolve_expr(gs, scope, owner, method, value);
            }
        }
        Expr::Rescue {
            body,
            handler,
            ensure,
            ..
        } => {
            resolve_expr(gs, scope, owner, method, body);
            if let Some((_, handler_body)) = handler {
                resolve_expr(gs, scope, owner, method, handler_body);
            }
            if let Some(ensure) = ensure {
                resolve_expr(gs, scope, owner, method, ensure);
            }
        }
        Expr::Cast {
            loc,
            value,
            type_expr,
            resolved_type,
            ..
        } => {
            resolve_expr(gs, scope, owner, method, value);
            if let Some(type_expr) = type_expr {
                *resolved_type =
                    Some(sig::resolve_type_expr(gs, scope, method, *loc, type_expr));
            }
        }
        Expr::Absurd { value, .. } => resolve_expr(gs, scope, owner, method, value),
        Expr::Lit { .. } | Expr::Local { .. } | Expr::SelfRef { .. } => {}
    }
}

pub(crate) fn resolve_path(
    gs: &mut GlobalState,
    scope: &[SymbolRef],
    path: &mut ConstantPath,
) -> Option<SymbolRef> {
    match resolve_constant_in_scope(gs, scope, &path.path) {
        Some(sym) => {
            path.resolved = Some(sym);
            Some(sym)
        }
        None => {
            gs.report_error(
                path.loc,
                errors::UNRESOLVED_CONSTANT,
                format!("unable to resolve constant `{}`", render_path(gs, &path.path)),
            );
            None
        }
    }
}

pub(crate) fn render_path(gs: &GlobalState, path: &[NameRef]) -> String {
    path.iter()
        .map(|&n| gs.name_str(n))
        .collect::<Vec<_>>()
        .join("::")
}

fn literal_type_of(expr: &Expr) -> Option<Type> {
    use rty_core::types::{FloatBits, Literal};
    use rty_parser::ast::LitValue;
    match expr {
        Expr::Lit { value, .. } => match value {
            LitValue::Int(v) => Some(Type::LiteralType(Literal::Integer(*v))),
            LitValue::Float(v) => {
                Some(Type::LiteralType(Literal::Float(FloatBits::from_f64(*v))))
            }
            LitValue::Str(name) => Some(Type::LiteralType(Literal::String(*name))),
            LitValue::Sym(name) => Some(Type::LiteralType(Literal::Symbol(*name))),
            LitValue::True => Some(Type::true_class()),
            LitValue::False => Some(Type::false_class()),
            LitValue::Nil => Some(Type::nil_class()),
        },
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/resolve.rs"]
mod tests;
