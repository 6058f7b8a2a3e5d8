//! Method dispatch: locate the callee, bind type parameters, check
//! arguments, compute the return type.
//!
//! Lookup walks the receiver class's frozen linearization in order and takes
//! the first method definition. Union receivers dispatch component-wise and
//! join their results; intersection receivers try components until one
//! succeeds. Generic callees allocate one fresh constraint per call site,
//! accumulate bounds during argument checking, then solve. Failure paths
//! deliberately produce `untyped` so one bad call does not cascade.

use crate::environment::{Test, TestKind};
use rty_core::errors::infer as errors;
use rty_core::names::wk;
use rty_core::types::{
    approximate_subtract, instantiate, is_subtype, is_subtype_under, join, replace_self_type,
    result_type_as_seen_from, show, show_widened,
};
use rty_core::{symbol_flags, wk_sym, GlobalState, Loc, NameRef, SymbolRef, Type, TypeConstraint};
use rty_cfg::instructions::Send;
use rty_cfg::LocalRef;
use tracing::trace;

/// Information recorded for a block-carrying send, consumed by the
/// `LoadYieldParams` and `SolveConstraint` instructions of its region.
#[derive(Clone, Debug, Default)]
pub(crate) struct LinkInfo {
    pub yield_param: Option<Type>,
    pub result: Option<Type>,
}

pub(crate) struct DispatchOutcome {
    pub result: Type,
    /// Method the send resolved to (unique receiver shape only); used by
    /// go-to-definition.
    pub resolved: Option<SymbolRef>,
    /// Knowledge this send contributes, for flow-sensitive refinement.
    pub test: Option<Test>,
    pub link_info: Option<LinkInfo>,
}

pub(crate) struct DispatchCtx<'a> {
    pub gs: &'a mut GlobalState,
    /// Final pass: report diagnostics. Fixed-point passes stay silent.
    pub emit: bool,
}

impl<'a> DispatchCtx<'a> {
    fn error(&mut self, loc: Loc, what: rty_core::ErrorClass, message: String) {
        if self.emit {
            self.gs.report_error(loc, what, message);
        }
    }
}

/// Type one send against the receiver and argument types the caller read
/// from the environment.
pub(crate) fn dispatch_send(
    ctx: &mut DispatchCtx<'_>,
    send: &Send,
    recv_ty: &Type,
    arg_types: &[Type],
    kwarg_types: &[(NameRef, Type)],
    recv_root: LocalRef,
    loc: Loc,
) -> DispatchOutcome {
    let mut outcome = dispatch_on(ctx, send, recv_ty, arg_types, kwarg_types, loc);

    // Safe-send already handled by the caller (receiver stripped of nil);
    // here we only attach refinement knowledge.
    outcome.test = refinement_test(send, recv_root, arg_types);
    outcome
}

fn dispatch_on(
    ctx: &mut DispatchCtx<'_>,
    send: &Send,
    recv_ty: &Type,
    arg_types: &[Type],
    kwarg_types: &[(NameRef, Type)],
    loc: Loc,
) -> DispatchOutcome {
    match recv_ty {
        Type::Untyped => DispatchOutcome {
            result: Type::Untyped,
            resolved: None,
            test: None,
            link_info: send.link.map(|_| LinkInfo::default()),
        },
        Type::Bottom => DispatchOutcome {
            result: Type::Bottom,
            resolved: None,
            test: None,
            link_info: None,
        },
        // Abstract receivers (an uninstantiated type variable, a self-type
        // marker): nothing nominal to look methods up on; stay quiet.
        Type::TypeVar(_) | Type::SelfTypeParam => DispatchOutcome {
            result: Type::Untyped,
            resolved: None,
            test: None,
            link_info: send.link.map(|_| LinkInfo::default()),
        },
        Type::Or(_, _) => {
            // Component-wise dispatch; results join.
            let mut result: Option<Type> = None;
            let mut link_info = None;
            for component in recv_ty.or_components() {
                let sub =
                    dispatch_on(ctx, send, component, arg_types, kwarg_types, loc);
                result = Some(match result {
                    Some(acc) => join(ctx.gs, &acc, &sub.result),
                    None => sub.result,
                });
                if sub.link_info.is_some() {
                    link_info = sub.link_info;
                }
            }
            DispatchOutcome {
                result: result.unwrap_or(Type::Untyped),
                resolved: None,
                test: None,
                link_info,
            }
        }
        Type::And(_, _) => {
            // Try components in order until one has the method.
            let components: Vec<Type> = recv_ty.and_components().into_iter().cloned().collect();
            for component in &components {
                if lookup_method(ctx.gs, component, send.fun).is_some() {
                    return dispatch_on(ctx, send, component, arg_types, kwarg_types, loc);
                }
            }
            // None succeeded: report against the first for a stable message.
            match components.first() {
                Some(first) => dispatch_on(ctx, send, first, arg_types, kwarg_types, loc),
                None => DispatchOutcome {
                    result: Type::Untyped,
                    resolved: None,
                    test: None,
                    link_info: None,
                },
            }
        }
        Type::Meta(inner) if send.fun == wk::NEW => {
            // `C.new` checks `C#initialize` and produces an instance.
            let instance = (**inner).clone();
            let outcome = match lookup_method(ctx.gs, &instance, wk::INITIALIZE) {
                Some(init) => {
                    check_call(ctx, send, &instance, init, arg_types, kwarg_types, loc);
                    Some(init)
                }
                None => None,
            };
            DispatchOutcome {
                result: instance,
                resolved: outcome,
                test: None,
                link_info: None,
            }
        }
        _ => {
            let callee = lookup_method(ctx.gs, recv_ty, send.fun);
            let Some(callee) = callee else {
                ctx.error(
                    send.fun_loc,
                    errors::METHOD_DOES_NOT_EXIST,
                    format!(
                        "method `{}` does not exist on `{}`",
                        ctx.gs.name_str(send.fun),
                        show(ctx.gs, recv_ty)
                    ),
                );
                return DispatchOutcome {
                    result: Type::Untyped,
                    resolved: None,
                    test: None,
                    link_info: send.link.map(|_| LinkInfo::default()),
                };
            };

            if ctx.gs.symbol_data(callee).is_private() && !send.is_private_ok {
                ctx.error(
                    send.fun_loc,
                    errors::PRIVATE_METHOD_CALL,
                    format!(
                        "non-private call to private method `{}`",
                        ctx.gs.name_str(send.fun)
                    ),
                );
            }

            let result = check_call(ctx, send, recv_ty, callee, arg_types, kwarg_types, loc);
            let link_info = send
                .link
                .map(|_| yield_info(ctx.gs, recv_ty, callee, &result));
            DispatchOutcome {
                result,
                resolved: Some(callee),
                test: None,
                link_info,
            }
        }
    }
}

/// Walk the receiver's linearization for the first definition of `name`.
pub(crate) fn lookup_method(gs: &GlobalState, recv: &Type, name: NameRef) -> Option<SymbolRef> {
    let class = receiver_class(gs, recv)?;
    for ancestor in gs.linearization_of(class) {
        if let Some(&member) = gs.symbol_data(ancestor).members.get(&name) {
            if gs.symbol_data(member).is_method() {
                return Some(member);
            }
        }
    }
    None
}

/// The class whose linearization answers method lookup for a type.
pub(crate) fn receiver_class(gs: &GlobalState, recv: &Type) -> Option<SymbolRef> {
    match recv {
        Type::Class(sym) => Some(*sym),
        Type::Applied { class, .. } => Some(*class),
        Type::LiteralType(lit) => Some(lit.underlying_class()),
        Type::Tuple(_) => Some(wk_sym::ARRAY),
        Type::Shape { .. } => Some(wk_sym::HASH),
        Type::Alias(_) => receiver_class(gs, &recv.dealias(gs)),
        _ => None,
    }
}

/// Arity and argument-type checking plus return-type computation for a
/// located callee.
fn check_call(
    ctx: &mut DispatchCtx<'_>,
    send: &Send,
    recv_ty: &Type,
    callee: SymbolRef,
    arg_types: &[Type],
    kwarg_types: &[(NameRef, Type)],
    loc: Loc,
) -> Type {
    let gs_args = ctx.gs.symbol_data(callee).arguments.clone();
    let positional: Vec<SymbolRef> = gs_args
        .iter()
        .copied()
        .filter(|&a| {
            ctx.gs.symbol_data(a).flags
                & (symbol_flags::ARG_KEYWORD | symbol_flags::ARG_BLOCK)
                == 0
        })
        .collect();
    let keywords: Vec<SymbolRef> = gs_args
        .iter()
        .copied()
        .filter(|&a| ctx.gs.symbol_data(a).has_flag(symbol_flags::ARG_KEYWORD))
        .collect();

    let required = positional
        .iter()
        .filter(|&&a| !ctx.gs.symbol_data(a).has_flag(symbol_flags::ARG_OPTIONAL))
        .count();
    if arg_types.len() < required || arg_types.len() > positional.len() {
        ctx.error(
            loc,
            errors::ARGUMENT_COUNT_MISMATCH,
            format!(
                "wrong number of arguments for `{}`: expected {}, got {}",
                ctx.gs.name_str(send.fun),
                if required == positional.len() {
                    required.to_string()
                } else {
                    format!("{required}..{}", positional.len())
                },
                arg_types.len()
            ),
        );
    }

    // Fresh constraint per call site for generic callees.
    let type_args = ctx.gs.symbol_data(callee).type_members.clone();
    let mut constraint = TypeConstraint::new(type_args);
    let owner = ctx.gs.symbol_data(callee).owner;
    let receiver_args = applied_args(recv_ty);

    for (i, arg_ty) in arg_types.iter().enumerate() {
        let Some(&param) = positional.get(i) else { break };
        let declared = parameter_type(ctx.gs, param, owner, &receiver_args, recv_ty);
        check_arg(
            ctx,
            &mut constraint,
            arg_ty,
            &declared,
            send.args.get(i).map(|site| site.loc).unwrap_or(loc),
        );
    }

    // Keyword arguments match by name.
    for (kw_name, kw_ty) in kwarg_types {
        let param = keywords
            .iter()
            .copied()
            .find(|&k| ctx.gs.symbol_data(k).name == *kw_name);
        match param {
            Some(param) => {
                let declared = parameter_type(ctx.gs, param, owner, &receiver_args, recv_ty);
                let kw_loc = send
                    .kwargs
                    .iter()
                    .find(|(n, _)| n == kw_name)
                    .map(|(_, site)| site.loc)
                    .unwrap_or(loc);
                check_arg(ctx, &mut constraint, kw_ty, &declared, kw_loc);
            }
            None => {
                ctx.error(
                    loc,
                    errors::ARGUMENT_COUNT_MISMATCH,
                    format!(
                        "unknown keyword argument `{}` for `{}`",
                        ctx.gs.name_str(*kw_name),
                        ctx.gs.name_str(send.fun)
                    ),
                );
            }
        }
    }
    for &kw in &keywords {
        let kw_data = ctx.gs.symbol_data(kw);
        if !kw_data.has_flag(symbol_flags::ARG_OPTIONAL)
            && !kwarg_types.iter().any(|(n, _)| *n == kw_data.name)
        {
            let name = ctx.gs.name_str(kw_data.name);
            ctx.error(
                loc,
                errors::ARGUMENT_COUNT_MISMATCH,
                format!(
                    "missing required keyword argument `{}` for `{}`",
                    name,
                    ctx.gs.name_str(send.fun)
                ),
            );
        }
    }

    if !constraint.is_empty() && !constraint.solve(ctx.gs) {
        ctx.error(
            loc,
            errors::ARGUMENT_TYPE_MISMATCH,
            format!(
                "could not find a valid instantiation of the type parameters of `{}`",
                ctx.gs.name_str(send.fun)
            ),
        );
    }

    let declared_result = ctx
        .gs
        .symbol_data(callee)
        .result_type
        .clone()
        .unwrap_or(Type::Untyped);
    let mut result = result_type_as_seen_from(ctx.gs, &declared_result, owner, &receiver_args);
    if !constraint.is_empty() {
        result = instantiate(ctx.gs, &result, &constraint);
    }
    result = replace_self_type(ctx.gs, &result, recv_ty);
    trace!(
        fun = %ctx.gs.name_str(send.fun),
        result = %show(ctx.gs, &result),
        "dispatched"
    );
    result
}

fn check_arg(
    ctx: &mut DispatchCtx<'_>,
    constraint: &mut TypeConstraint,
    arg_ty: &Type,
    declared: &Type,
    loc: Loc,
) {
    let ok = if constraint.is_empty() {
        is_subtype(ctx.gs, arg_ty, declared)
    } else {
        let mut slot: Option<&mut TypeConstraint> = Some(constraint);
        is_subtype_under(ctx.gs, &mut slot, arg_ty, declared)
    };
    if !ok {
        ctx.error(
            loc,
            errors::ARGUMENT_TYPE_MISMATCH,
            format!(
                "expected `{}`, got `{}`",
                show(ctx.gs, declared),
                show_widened(ctx.gs, arg_ty)
            ),
        );
    }
}

/// Declared parameter type, re-expressed for the receiver: generic-class
/// members substituted by the receiver's type arguments, self-type markers
/// by the receiver itself.
fn parameter_type(
    gs: &GlobalState,
    param: SymbolRef,
    owner: SymbolRef,
    receiver_args: &[Type],
    recv_ty: &Type,
) -> Type {
    let declared = gs
        .symbol_data(param)
        .result_type
        .clone()
        .unwrap_or(Type::Untyped);
    let seen = result_type_as_seen_from(gs, &declared, owner, receiver_args);
    replace_self_type(gs, &seen, recv_ty)
}

fn applied_args(recv_ty: &Type) -> Vec<Type> {
    match recv_ty {
        Type::Applied { args, .. } => args.clone(),
        _ => Vec::new(),
    }
}

/// Yield-parameter typing for the builtin block-taking methods. User-defined
/// yielders are outside the signature subset and yield untyped.
fn yield_info(gs: &GlobalState, recv_ty: &Type, callee: SymbolRef, result: &Type) -> LinkInfo {
    let owner = gs.symbol_data(callee).owner;
    let name = gs.symbol_data(callee).name;
    let yield_param = if owner == wk_sym::ARRAY && name == wk::EACH {
        let elem = Type::TypeVar(wk_sym::ARRAY_ELEM);
        Some(result_type_as_seen_from(
            gs,
            &elem,
            wk_sym::ARRAY,
            &applied_args(recv_ty),
        ))
    } else if owner == wk_sym::INTEGER && name == wk::TIMES {
        Some(Type::Class(wk_sym::INTEGER))
    } else {
        None
    };
    LinkInfo {
        yield_param,
        result: Some(result.clone()),
    }
}

/// Knowledge contributed by predicate sends, consumed by edge refinement.
fn refinement_test(send: &Send, recv_root: LocalRef, arg_types: &[Type]) -> Option<Test> {
    if send.fun == wk::NIL_P && send.args.is_empty() {
        return Some(Test {
            subject: recv_root,
            kind: TestKind::NilCheck,
            negated: false,
        });
    }
    if (send.fun == wk::IS_A_P || send.fun == wk::KIND_OF_P) && arg_types.len() == 1 {
        if let Type::Meta(inner) = &arg_types[0] {
            return Some(Test {
                subject: recv_root,
                kind: TestKind::IsA((**inner).clone()),
                negated: false,
            });
        }
        return None;
    }
    if send.fun == wk::EQ_EQ && arg_types.len() == 1 {
        let lit = &arg_types[0];
        let is_singleton = matches!(
            lit,
            Type::LiteralType(_)
        ) || *lit == Type::nil_class()
            || *lit == Type::true_class()
            || *lit == Type::false_class();
        if is_singleton {
            return Some(Test {
                subject: recv_root,
                kind: TestKind::LiteralEq(lit.clone()),
                negated: false,
            });
        }
        return None;
    }
    None
}

/// Strip nil for `&.` dispatch; the caller re-attaches nil to the result
/// when the receiver admitted it.
pub(crate) fn strip_nil(gs: &GlobalState, ty: &Type) -> (Type, bool) {
    let nil = Type::nil_class();
    if is_subtype(gs, ty, &nil) {
        return (Type::Bottom, true);
    }
    let stripped = approximate_subtract(gs, ty, &nil);
    let had_nil = &stripped != ty;
    (stripped, had_nil)
}
