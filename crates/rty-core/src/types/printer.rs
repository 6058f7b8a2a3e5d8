//! Rendering types for diagnostics and hover output.

use super::{Literal, Type};
use crate::global_state::GlobalState;

/// Rendering for mismatch messages: a literal reads as its class (`String`,
/// not `String("hello")`), which is what the user wrote.
pub fn show_widened(gs: &GlobalState, t: &Type) -> String {
    match t {
        Type::LiteralType(lit) => show(gs, &Type::Class(lit.underlying_class())),
        other => show(gs, other),
    }
}

/// User-facing rendering: `Integer`, `T.nilable(String)`, `[A, B]`, …
pub fn show(gs: &GlobalState, t: &Type) -> String {
    match t {
        Type::Untyped => "T.untyped".to_string(),
        Type::Top => "T.anything".to_string(),
        Type::Bottom => "T.noreturn".to_string(),
        Type::Class(sym) => gs.symbol_full_name(*sym),
        Type::Applied { class, args } => {
            let args: Vec<String> = args.iter().map(|a| show(gs, a)).collect();
            format!("{}[{}]", gs.symbol_full_name(*class), args.join(", "))
        }
        Type::LiteralType(lit) => show_literal(gs, lit),
        Type::Tuple(elems) => {
            let elems: Vec<String> = elems.iter().map(|e| show(gs, e)).collect();
            format!("[{}]", elems.join(", "))
        }
        Type::Shape { keys, values } => {
            let pairs: Vec<String> = keys
                .iter()
                .zip(values.iter())
                .map(|(k, v)| format!("{} => {}", show_literal(gs, k), show(gs, v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        Type::Or(_, _) => {
            let members = t.or_components();
            // `T.nilable` reads better than a two-way `T.any` with nil.
            if members.len() == 2 {
                if let Some(other) = nilable_partner(&members) {
                    return format!("T.nilable({})", show(gs, other));
                }
            }
            if *t == Type::boolean() {
                return "T::Boolean".to_string();
            }
            let members: Vec<String> = members.into_iter().map(|m| show(gs, m)).collect();
            format!("T.any({})", members.join(", "))
        }
        Type::And(_, _) => {
            let members: Vec<String> = t
                .and_components()
                .into_iter()
                .map(|m| show(gs, m))
                .collect();
            format!("T.all({})", members.join(", "))
        }
        Type::SelfTypeParam => "T.self_type".to_string(),
        Type::TypeVar(sym) => format!(
            "T.type_parameter(:{})",
            gs.name_str(gs.symbol_data(*sym).name)
        ),
        Type::Meta(w) => format!("T.class_of({})", show(gs, w)),
        Type::Alias(sym) => gs.symbol_full_name(*sym),
    }
}

fn show_literal(gs: &GlobalState, lit: &Literal) -> String {
    match lit {
        Literal::Integer(v) => format!("Integer({v})"),
        Literal::Float(bits) => format!("Float({})", bits.as_f64()),
        Literal::String(name) => format!("String(\"{}\")", gs.name_str(*name)),
        Literal::Symbol(name) => format!("Symbol(:{})", gs.name_str(*name)),
    }
}

fn nilable_partner<'t>(members: &[&'t Type]) -> Option<&'t Type> {
    let nil = Type::nil_class();
    match members {
        [a, b] if **a == nil => Some(*b),
        [a, b] if **b == nil => Some(*a),
        _ => None,
    }
}
