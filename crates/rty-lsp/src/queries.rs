//! Read-only queries against the most recently committed state.
//!
//! Hover, definition, references, completion, signature help and the symbol
//! listings all run over the cached inferred CFGs and parsed trees; they
//! never mutate the global state and never outlive their own request.

use crate::protocol::{Location, Position, Range};
use crate::typecheck::Coordinator;
use rty_core::types::show;
use rty_core::{GlobalState, Loc, LocDetail, SymbolRef, Type};
use rty_cfg::instructions::Instruction;
use rty_cfg::Cfg;
use serde_json::{json, Value};

pub(crate) fn loc_to_range(gs: &GlobalState, loc: Loc) -> Option<Range> {
    let (begin, end) = loc.position(gs)?;
    Some(Range {
        start: Position {
            line: begin.line - 1,
            character: begin.column - 1,
        },
        end: Position {
            line: end.line - 1,
            character: end.column - 1,
        },
    })
}

fn position_to_offset(gs: &GlobalState, uri: &str, position: Position) -> Option<u32> {
    let file = gs.file_by_path(uri)?;
    gs.file_data(file).pos_to_offset(LocDetail {
        line: position.line + 1,
        column: position.character + 1,
    })
}

/// The narrowest binding whose loc covers the offset, across a file's CFGs.
fn binding_at<'c>(
    cfgs: &'c [Cfg],
    offset: u32,
) -> Option<(&'c Cfg, &'c rty_cfg::instructions::Binding)> {
    let mut best: Option<(&Cfg, &rty_cfg::instructions::Binding)> = None;
    for cfg in cfgs {
        for block in &cfg.blocks {
            for binding in &block.exprs {
                if !binding.loc.exists() || !binding.loc.contains_offset(offset) {
                    continue;
                }
                let width = binding.loc.end() - binding.loc.begin();
                let better = match best {
                    Some((_, current)) => width < current.loc.end() - current.loc.begin(),
                    None => true,
                };
                if better {
                    best = Some((cfg, binding));
                }
            }
        }
    }
    best
}

/// The innermost send whose method-name span covers the offset.
fn send_at<'c>(
    cfgs: &'c [Cfg],
    offset: u32,
) -> Option<&'c rty_cfg::instructions::Send> {
    for cfg in cfgs {
        for block in &cfg.blocks {
            for binding in &block.exprs {
                if let Instruction::Send(send) = &binding.value {
                    if send.fun_loc.exists() && send.fun_loc.contains_offset(offset) {
                        return Some(send);
                    }
                }
            }
        }
    }
    None
}

fn render_method_signature(gs: &GlobalState, method: SymbolRef) -> String {
    let data = gs.symbol_data(method);
    let params: Vec<String> = data
        .arguments
        .iter()
        .map(|&arg| {
            let arg_data = gs.symbol_data(arg);
            let ty = arg_data
                .result_type
                .as_ref()
                .map(|t| show(gs, t))
                .unwrap_or_else(|| "T.untyped".to_string());
            format!("{}: {}", gs.name_str(arg_data.name), ty)
        })
        .collect();
    let result = data
        .result_type
        .as_ref()
        .map(|t| show(gs, t))
        .unwrap_or_else(|| "T.untyped".to_string());
    format!(
        "def {}({}) -> {}",
        gs.name_str(data.name),
        params.join(", "),
        result
    )
}

// =============================================================================
// Individual queries
// =============================================================================

pub(crate) fn hover(coordinator: &Coordinator, uri: &str, position: Position) -> Value {
    let gs = &coordinator.gs;
    let Some(record) = coordinator.files.get(uri) else {
        return Value::Null;
    };
    let Some(offset) = position_to_offset(gs, uri, position) else {
        return Value::Null;
    };

    // A send name hovers as the resolved method's signature.
    if let Some(send) = send_at(&record.cfgs, offset) {
        if let Some(recv_ty) = &send.recv.ty {
            if let Some(method) = rty_infer::resolve_send_target(gs, recv_ty, send.fun) {
                let contents = render_method_signature(gs, method);
                return json!({
                    "contents": { "kind": "markdown", "value": format!("```ruby\n{contents}\n```") },
                    "range": loc_to_range(gs, send.fun_loc),
                });
            }
        }
    }

    let Some((_, binding)) = binding_at(&record.cfgs, offset) else {
        return Value::Null;
    };
    let ty = binding.bind_type.clone().unwrap_or(Type::Untyped);
    json!({
        "contents": { "kind": "markdown", "value": format!("```ruby\n{}\n```", show(gs, &ty)) },
        "range": loc_to_range(gs, binding.loc),
    })
}

/// Resolve the symbol a position refers to: a send target or an aliased
/// constant/field.
fn target_symbol_at(coordinator: &Coordinator, uri: &str, offset: u32) -> Option<SymbolRef> {
    let gs = &coordinator.gs;
    let record = coordinator.files.get(uri)?;
    if let Some(send) = send_at(&record.cfgs, offset) {
        let recv_ty = send.recv.ty.as_ref()?;
        return rty_infer::resolve_send_target(gs, recv_ty, send.fun);
    }
    if let Some((_, binding)) = binding_at(&record.cfgs, offset) {
        if let Instruction::Alias(sym) = binding.value {
            return Some(sym);
        }
    }
    None
}

pub(crate) fn definition(coordinator: &Coordinator, uri: &str, position: Position) -> Value {
    let gs = &coordinator.gs;
    let Some(offset) = position_to_offset(gs, uri, position) else {
        return Value::Null;
    };
    let Some(target) = target_symbol_at(coordinator, uri, offset) else {
        return Value::Null;
    };
    let locations: Vec<Location> = gs
        .symbol_data(target)
        .locs
        .iter()
        .filter_map(|&loc| symbol_loc_to_location(gs, loc))
        .collect();
    serde_json::to_value(locations).unwrap_or(Value::Null)
}

fn symbol_loc_to_location(gs: &GlobalState, loc: Loc) -> Option<Location> {
    if !loc.exists() {
        return None;
    }
    Some(Location {
        uri: gs.file_data(loc.file()).path().to_string(),
        range: loc_to_range(gs, loc)?,
    })
}

pub(crate) fn references(coordinator: &Coordinator, uri: &str, position: Position) -> Value {
    let gs = &coordinator.gs;
    let Some(offset) = position_to_offset(gs, uri, position) else {
        return Value::Null;
    };
    let Some(target) = target_symbol_at(coordinator, uri, offset) else {
        return Value::Null;
    };

    let mut locations: Vec<Location> = Vec::new();
    for record in coordinator.files.values() {
        for cfg in &record.cfgs {
            for block in &cfg.blocks {
                for binding in &block.exprs {
                    let hit = match &binding.value {
                        Instruction::Send(send) => send
                            .recv
                            .ty
                            .as_ref()
                            .and_then(|t| rty_infer::resolve_send_target(gs, t, send.fun))
                            == Some(target),
                        Instruction::Alias(sym) => *sym == target,
                        _ => false,
                    };
                    if hit {
                        let loc = match &binding.value {
                            Instruction::Send(send) => send.fun_loc,
                            _ => binding.loc,
                        };
                        if let Some(location) = symbol_loc_to_location(gs, loc) {
                            locations.push(location);
                        }
                    }
                }
            }
        }
    }
    for &loc in &gs.symbol_data(target).locs {
        if let Some(location) = symbol_loc_to_location(gs, loc) {
            locations.push(location);
        }
    }
    locations.sort_by(|a, b| {
        (a.uri.as_str(), a.range.start.line, a.range.start.character).cmp(&(
            b.uri.as_str(),
            b.range.start.line,
            b.range.start.character,
        ))
    });
    locations.dedup_by(|a, b| a.uri == b.uri && a.range == b.range);
    serde_json::to_value(locations).unwrap_or(Value::Null)
}

pub(crate) fn completion(coordinator: &Coordinator, uri: &str, position: Position) -> Value {
    let gs = &coordinator.gs;
    let Some(record) = coordinator.files.get(uri) else {
        return json!({ "isIncomplete": false, "items": [] });
    };
    let Some(offset) = position_to_offset(gs, uri, position) else {
        return json!({ "isIncomplete": false, "items": [] });
    };

    // Complete members of the receiver at the cursor's send, walking the
    // receiver's full linearization.
    let receiver_ty = send_at(&record.cfgs, offset)
        .or_else(|| send_at(&record.cfgs, offset.saturating_sub(1)))
        .and_then(|send| send.recv.ty.clone());
    let Some(receiver_ty) = receiver_ty else {
        return json!({ "isIncomplete": false, "items": [] });
    };

    let mut items: Vec<Value> = Vec::new();
    let mut seen = rustc_hash::FxHashSet::default();
    if let Some(class) = rty_infer::receiver_class_of(gs, &receiver_ty) {
        for ancestor in gs.linearization_of(class) {
            let mut members: Vec<_> = gs.symbol_data(ancestor).members.iter().collect();
            members.sort_by_key(|(name, _)| name.id());
            for (&name, &member) in members {
                if !gs.symbol_data(member).is_method() || !seen.insert(name) {
                    continue;
                }
                items.push(json!({
                    "label": gs.name_str(name),
                    "kind": 2,
                    "detail": render_method_signature(gs, member),
                }));
            }
        }
    }
    items.sort_by(|a, b| {
        a.get("label")
            .and_then(Value::as_str)
            .cmp(&b.get("label").and_then(Value::as_str))
    });
    json!({ "isIncomplete": false, "items": items })
}

pub(crate) fn signature_help(
    coordinator: &Coordinator,
    uri: &str,
    position: Position,
) -> Value {
    let gs = &coordinator.gs;
    let Some(record) = coordinator.files.get(uri) else {
        return Value::Null;
    };
    let Some(offset) = position_to_offset(gs, uri, position) else {
        return Value::Null;
    };
    // The enclosing call: the narrowest send whose whole span covers the
    // cursor.
    let mut enclosing: Option<&rty_cfg::instructions::Send> = None;
    let mut enclosing_loc: Option<Loc> = None;
    for cfg in &record.cfgs {
        for block in &cfg.blocks {
            for binding in &block.exprs {
                if let Instruction::Send(send) = &binding.value {
                    if binding.loc.exists() && binding.loc.contains_offset(offset) {
                        let better = match enclosing_loc {
                            Some(current) => {
                                binding.loc.end() - binding.loc.begin()
                                    < current.end() - current.begin()
                            }
                            None => true,
                        };
                        if better {
                            enclosing = Some(send);
                            enclosing_loc = Some(binding.loc);
                        }
                    }
                }
            }
        }
    }
    let Some(send) = enclosing else {
        return Value::Null;
    };
    let Some(method) = send
        .recv
        .ty
        .as_ref()
        .and_then(|t| rty_infer::resolve_send_target(gs, t, send.fun))
    else {
        return Value::Null;
    };
    let data = gs.symbol_data(method);
    let parameters: Vec<Value> = data
        .arguments
        .iter()
        .map(|&arg| {
            let arg_data = gs.symbol_data(arg);
            json!({ "label": gs.name_str(arg_data.name) })
        })
        .collect();
    json!({
        "signatures": [{
            "label": render_method_signature(gs, method),
            "parameters": parameters,
        }],
        "activeSignature": 0,
        "activeParameter": send.args.len().saturating_sub(1),
    })
}

pub(crate) fn document_symbols(coordinator: &Coordinator, uri: &str) -> Value {
    let gs = &coordinator.gs;
    let Some(record) = coordinator.files.get(uri) else {
        return json!([]);
    };

    fn class_symbol(gs: &GlobalState, def: &rty_parser::ast::ClassDef) -> Option<Value> {
        let mut children: Vec<Value> = Vec::new();
        for method in &def.methods {
            let range = loc_to_range(gs, method.loc)?;
            let selection = loc_to_range(gs, method.name_loc)?;
            children.push(json!({
                "name": gs.name_str(method.name),
                "kind": 6,
                "range": range,
                "selectionRange": selection,
            }));
        }
        for nested in &def.nested {
            if let Some(child) = class_symbol(gs, nested) {
                children.push(child);
            }
        }
        let name: Vec<String> = def.path.iter().map(|&n| gs.name_str(n)).collect();
        Some(json!({
            "name": name.join("::"),
            "kind": if def.is_module { 2 } else { 5 },
            "range": loc_to_range(gs, def.loc)?,
            "selectionRange": loc_to_range(gs, def.name_loc)?,
            "children": children,
        }))
    }

    let symbols: Vec<Value> = record
        .parsed
        .defs
        .iter()
        .filter_map(|def| class_symbol(gs, def))
        .collect();
    serde_json::to_value(symbols).unwrap_or(Value::Null)
}

pub(crate) fn workspace_symbols(coordinator: &Coordinator, query: &str) -> Value {
    let gs = &coordinator.gs;
    let needle = query.to_lowercase();
    let mut out: Vec<Value> = Vec::new();

    fn visit(
        gs: &GlobalState,
        uri: &str,
        def: &rty_parser::ast::ClassDef,
        needle: &str,
        out: &mut Vec<Value>,
    ) {
        let name: Vec<String> = def.path.iter().map(|&n| gs.name_str(n)).collect();
        let name = name.join("::");
        if name.to_lowercase().contains(needle) {
            if let Some(range) = loc_to_range(gs, def.name_loc) {
                out.push(json!({
                    "name": name,
                    "kind": if def.is_module { 2 } else { 5 },
                    "location": { "uri": uri, "range": range },
                }));
            }
        }
        for method in &def.methods {
            let method_name = gs.name_str(method.name);
            if method_name.to_lowercase().contains(needle) {
                if let Some(range) = loc_to_range(gs, method.name_loc) {
                    out.push(json!({
                        "name": method_name,
                        "kind": 6,
                        "location": { "uri": uri, "range": range },
                    }));
                }
            }
        }
        for nested in &def.nested {
            visit(gs, uri, nested, needle, out);
        }
    }

    let mut uris: Vec<&String> = coordinator.files.keys().collect();
    uris.sort();
    for uri in uris {
        for def in &coordinator.files[uri].parsed.defs {
            visit(gs, uri, def, &needle, &mut out);
        }
    }
    serde_json::to_value(out).unwrap_or(Value::Null)
}

pub(crate) fn code_actions() -> Value {
    // Quick fixes are not offered yet; an empty list is the valid response.
    json!([])
}
