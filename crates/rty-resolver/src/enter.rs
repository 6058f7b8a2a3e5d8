//! Phase 1: enter definitions into the symbol table.

use rty_core::errors::resolver as errors;
use rty_core::{symbol_flags, wk_sym, GlobalState, SymbolRef};
use rty_parser::ast::{ClassDef, MethodDef, ParamKind, ParsedFile};
use tracing::trace;

pub(crate) fn enter_definitions(gs: &mut GlobalState, file: &mut ParsedFile) {
    for def in &mut file.defs {
        enter_class(gs, wk_sym::ROOT, def);
    }
    for method in &mut file.toplevel_methods {
        enter_method(gs, wk_sym::OBJECT, method);
    }
}

fn enter_class(gs: &mut GlobalState, owner: SymbolRef, def: &mut ClassDef) {
    // `class A::B` enters (or reuses) module stubs for the path prefix.
    let mut current = owner;
    for &segment in &def.path[..def.path.len() - 1] {
        current = gs.enter_module_symbol(def.name_loc, current, segment);
    }
    let name = *def.path.last().expect("definition path is never empty");
    let sym = if def.is_module {
        gs.enter_module_symbol(def.name_loc, current, name)
    } else {
        gs.enter_class_symbol(def.name_loc, current, name)
    };
    if gs.symbol_data(sym).is_class_or_module() {
        def.resolved = Some(sym);
    } else {
        gs.report_error(
            def.name_loc,
            errors::REDEFINITION_MISMATCH,
            format!(
                "`{}` was previously defined as a different kind of symbol",
                gs.symbol_full_name(sym)
            ),
        );
        return;
    }
    trace!(sym = sym.id(), "entered class");

    for field in &def.static_fields {
        gs.enter_static_field_symbol(field.loc, sym, field.name);
    }
    for method in &mut def.methods {
        enter_method(gs, sym, method);
    }
    for nested in &mut def.nested {
        enter_class(gs, sym, nested);
    }
}

fn enter_method(gs: &mut GlobalState, owner: SymbolRef, def: &mut MethodDef) {
    let existing = gs.symbol_data(owner).members.get(&def.name).copied();
    let method = gs.enter_method_symbol(def.name_loc, owner, def.name);
    if !gs.symbol_data(method).is_method() {
        gs.report_error(
            def.name_loc,
            errors::REDEFINITION_MISMATCH,
            format!(
                "`{}` was previously defined as a non-method",
                gs.symbol_full_name(method)
            ),
        );
        return;
    }
    def.resolved = Some(method);
    if def.is_private {
        gs.symbol_data_mut(method).flags |= symbol_flags::PRIVATE;
    }

    if existing.is_some() {
        // Redefinition. Same arity silently replaces (the last definition
        // wins, matching runtime semantics); a different arity is reported
        // and the original argument list is kept.
        if gs.symbol_data(method).arguments.len() != def.params.len() {
            gs.report_error(
                def.name_loc,
                errors::REDEFINITION_MISMATCH,
                format!(
                    "`{}` redefined with a different number of parameters",
                    gs.symbol_full_name(method)
                ),
            );
        }
        return;
    }

    for param in &def.params {
        let arg = gs.enter_method_argument_symbol(param.loc, method, param.name);
        let extra = match param.kind {
            ParamKind::Required => 0,
            ParamKind::Optional => symbol_flags::ARG_OPTIONAL,
            ParamKind::Keyword => symbol_flags::ARG_KEYWORD,
            ParamKind::KeywordOptional => {
                symbol_flags::ARG_KEYWORD | symbol_flags::ARG_OPTIONAL
            }
        };
        if extra != 0 {
            gs.symbol_data_mut(arg).flags |= extra;
        }
    }
}
