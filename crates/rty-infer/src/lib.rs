//! Forward dataflow type inference over control-flow graphs.
//!
//! Each block has an entry environment: the per-local join of its
//! predecessors' exit environments, refined along conditional edges by the
//! knowledge recorded for the branch variable. Blocks are iterated in
//! reverse post-order to a fixed point (the per-method lattice is finite:
//! only types mentioned by the method and their joins appear), then a final
//! emitting pass writes types into the graph and reports diagnostics. Errors
//! are only reported in the final pass so re-iteration never duplicates
//! them.

mod dispatch;
mod environment;

use dispatch::{dispatch_send, strip_nil, DispatchCtx, LinkInfo};
use environment::{Environment, Test, TestKind};
use rty_core::errors::infer as errors;
use rty_core::names::wk;
use rty_core::types::{approximate_subtract, is_subtype, show};
use rty_core::{GlobalState, Loc, SymbolRef, Type};
use rty_cfg::instructions::{CastKind, Instruction};
use rty_cfg::{BlockId, BlockLinkId, Cfg, LocalRef, ENTRY_BLOCK, EXIT_BLOCK};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

/// Iteration safety margin over the theoretical bound.
const MAX_PASSES_PER_BLOCK: usize = 20;

/// Infer types for one method's CFG, filling binding and use-site types in
/// place and reporting diagnostics into the global state.
pub fn infer_cfg(gs: &mut GlobalState, cfg: &mut Cfg) {
    let method = cfg.method;
    let owner = gs.symbol_data(method).owner;
    let self_type = Type::Class(owner);
    let declared_return = gs.symbol_data(method).result_type.clone();
    let is_void = gs.symbol_data(method).is_void_method();

    let mut state = Inference {
        aliases: FxHashMap::default(),
        knowledge: FxHashMap::default(),
        link_infos: FxHashMap::default(),
        block_envs: vec![None; cfg.blocks.len()],
        self_type,
        declared_return,
        is_void,
    };

    let rpo = cfg.reverse_postorder();
    let preds = cfg.predecessors();

    // Fixed point, silently.
    let max_rounds = MAX_PASSES_PER_BLOCK * cfg.blocks.len().max(1);
    let mut rounds = 0;
    loop {
        let mut changed = false;
        for &bid in &rpo {
            if bid == EXIT_BLOCK {
                continue;
            }
            let entry = state.entry_env(gs, cfg, bid, &preds);
            let result = state.process_block(gs, cfg, bid, entry, false);
            let slot = &mut state.block_envs[bid.0 as usize];
            if slot.as_ref() != Some(&result) {
                *slot = Some(result);
                changed = true;
            }
        }
        rounds += 1;
        if !changed {
            break;
        }
        if rounds >= max_rounds {
            warn!(
                method = %gs.symbol_full_name(method),
                rounds, "inference did not converge; giving up at the bound"
            );
            break;
        }
    }
    trace!(method = %gs.symbol_full_name(method), rounds, "inference converged");

    // Final emitting pass: diagnostics plus type annotations on the graph.
    for &bid in &rpo {
        if bid == EXIT_BLOCK {
            continue;
        }
        let entry = state.entry_env(gs, cfg, bid, &preds);
        let result = state.process_block(gs, cfg, bid, entry, true);
        state.block_envs[bid.0 as usize] = Some(result);
        state.annotate_block(gs, cfg, bid);
    }
}

struct Inference {
    /// Copy chains: `Ident` target to source, CFG-wide (locals are SSA).
    aliases: FxHashMap<LocalRef, LocalRef>,
    /// Test results by the local holding them, CFG-wide.
    knowledge: FxHashMap<LocalRef, Test>,
    link_infos: FxHashMap<BlockLinkId, LinkInfo>,
    block_envs: Vec<Option<Environment>>,
    self_type: Type,
    declared_return: Option<Type>,
    is_void: bool,
}

impl Inference {
    fn root(&self, local: LocalRef) -> LocalRef {
        let mut current = local;
        let mut hops = 0;
        while let Some(&next) = self.aliases.get(&current) {
            current = next;
            hops += 1;
            if hops > 64 {
                break;
            }
        }
        current
    }

    /// Join predecessors' exit environments, refining along conditional
    /// edges. Unprocessed predecessors (back edges on the first pass) are
    /// skipped; later rounds pick them up.
    fn entry_env(
        &self,
        gs: &GlobalState,
        cfg: &Cfg,
        bid: BlockId,
        preds: &FxHashMap<BlockId, Vec<BlockId>>,
    ) -> Environment {
        let mut entry = Environment::default();
        if bid == ENTRY_BLOCK {
            return entry;
        }
        let Some(pred_ids) = preds.get(&bid) else {
            return entry;
        };
        for &pred in pred_ids {
            let Some(pred_env) = &self.block_envs[pred.0 as usize] else {
                continue;
            };
            let mut env = pred_env.clone();
            let exit = &cfg.block(pred).exit;
            if let Some(cond) = &exit.cond {
                if exit.then_ != exit.else_ {
                    let root = self.root(cond.variable);
                    let test = self.knowledge.get(&root).cloned().unwrap_or(Test {
                        subject: root,
                        kind: TestKind::Truthy,
                        negated: false,
                    });
                    // Both edges may lead here; refine only when the branch
                    // is determined.
                    if exit.then_ == bid && exit.else_ != bid {
                        env.refine(gs, &test, true);
                    } else if exit.else_ == bid && exit.then_ != bid {
                        env.refine(gs, &test, false);
                    }
                }
            }
            entry.merge_from(gs, &env);
        }
        entry
    }

    fn process_block(
        &mut self,
        gs: &mut GlobalState,
        cfg: &Cfg,
        bid: BlockId,
        entry: Environment,
        emit: bool,
    ) -> Environment {
        let mut env = entry;
        let exprs = cfg.block(bid).exprs.clone();
        for binding in &exprs {
            let ty =
                self.transfer(gs, &mut env, binding.bind, binding.loc, &binding.value, emit);
            env.set(binding.bind, ty);
        }
        env
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer(
        &mut self,
        gs: &mut GlobalState,
        env: &mut Environment,
        bind: LocalRef,
        loc: Loc,
        instr: &Instruction,
        emit: bool,
    ) -> Type {
        match instr {
            Instruction::Ident(source) => {
                self.aliases.insert(bind, self.root(*source));
                env.get(*source)
            }
            Instruction::Literal(ty) => ty.clone(),
            Instruction::Alias(sym) => self.alias_type(gs, *sym),
            Instruction::LoadSelf { .. } => self.self_type.clone(),
            Instruction::LoadArg { method, index } => {
                let arg = gs.symbol_data(*method).arguments.get(*index).copied();
                match arg.and_then(|a| gs.symbol_data(a).result_type.clone()) {
                    Some(declared) => rty_core::types::replace_self_type(
                        gs,
                        &declared,
                        &self.self_type,
                    ),
                    None => Type::Untyped,
                }
            }
            Instruction::LoadYieldParams { link } => self
                .link_infos
                .get(link)
                .and_then(|info| info.yield_param.clone())
                .unwrap_or(Type::Untyped),
            Instruction::SolveConstraint { send, link } => self
                .link_infos
                .get(link)
                .and_then(|info| info.result.clone())
                .unwrap_or_else(|| env.get(*send)),
            Instruction::Send(send) => self.transfer_send(gs, env, bind, loc, send, emit),
            Instruction::Cast { value, ty, kind } => {
                let value_ty = env.get(value.variable);
                match kind {
                    CastKind::Let | CastKind::Cast => {
                        let target = ty.clone().unwrap_or(Type::Untyped);
                        // `T.let` ascribes: the value must fit. `T.cast` is a
                        // checked downcast: only impossible casts (no
                        // overlap at all) are reported.
                        let bad = match kind {
                            CastKind::Let => !is_subtype(gs, &value_ty, &target),
                            _ => {
                                rty_core::types::meet(gs, &value_ty, &target).is_bottom()
                                    && !value_ty.is_bottom()
                            }
                        };
                        if emit && !target.is_untyped() && bad {
                            gs.report_error(
                                value.loc,
                                errors::CAST_TYPE_MISMATCH,
                                format!(
                                    "expected `{}`, got `{}`",
                                    show(gs, &target),
                                    rty_core::types::show_widened(gs, &value_ty)
                                ),
                            );
                        }
                        target
                    }
                    CastKind::Must => {
                        let stripped =
                            approximate_subtract(gs, &value_ty, &Type::nil_class());
                        if stripped.is_bottom() {
                            Type::Untyped
                        } else {
                            stripped
                        }
                    }
                    CastKind::Unsafe => Type::Untyped,
                }
            }
            Instruction::Return(site) => {
                let got = env.get(site.variable);
                if emit && !self.is_void {
                    if let Some(declared) = &self.declared_return {
                        if !declared.is_untyped() && !is_subtype(gs, &got, declared) {
                            gs.report_error(
                                site.loc,
                                errors::RETURN_TYPE_MISMATCH,
                                format!(
                                    "expected `{}`, got `{}`",
                                    show(gs, declared),
                                    rty_core::types::show_widened(gs, &got)
                                ),
                            );
                        }
                    }
                }
                Type::Bottom
            }
            Instruction::BlockReturn { what, .. } => {
                let _ = env.get(what.variable);
                Type::Untyped
            }
            Instruction::TAbsurd(site) => {
                let got = env.get(site.variable);
                if emit && !got.is_bottom() {
                    gs.report_error(
                        site.loc,
                        errors::NOT_EXHAUSTIVE,
                        format!(
                            "control flow could reach `T.absurd` because the type `{}` was not handled",
                            show(gs, &got)
                        ),
                    );
                }
                Type::Bottom
            }
            Instruction::Unanalyzable => Type::Untyped,
            Instruction::NotSupported(reason) => {
                if emit {
                    gs.report_error(
                        loc,
                        rty_core::errors::cfg::UNSUPPORTED_NODE,
                        format!("unsupported construct: {reason}"),
                    );
                }
                Type::Untyped
            }
        }
    }

    fn transfer_send(
        &mut self,
        gs: &mut GlobalState,
        env: &mut Environment,
        bind: LocalRef,
        loc: Loc,
        send: &rty_cfg::instructions::Send,
        emit: bool,
    ) -> Type {
        let recv_ty = env.get(send.recv.variable);
        let arg_types: Vec<Type> = send.args.iter().map(|a| env.get(a.variable)).collect();
        let kwarg_types: Vec<_> = send
            .kwargs
            .iter()
            .map(|(name, site)| (*name, env.get(site.variable)))
            .collect();
        let recv_root = self.root(send.recv.variable);

        let (effective_recv, recv_had_nil) = if send.is_safe {
            strip_nil(gs, &recv_ty)
        } else {
            (recv_ty.clone(), false)
        };

        let mut ctx = DispatchCtx { gs, emit };
        let outcome = dispatch_send(
            &mut ctx,
            send,
            &effective_recv,
            &arg_types,
            &kwarg_types,
            recv_root,
            loc,
        );

        if let Some(test) = outcome.test {
            self.knowledge.insert(bind, test);
        } else if send.fun == wk::BANG && send.args.is_empty() {
            // `!x` inverts whatever is known about x.
            let inverted = match self.knowledge.get(&recv_root) {
                Some(test) => Test {
                    subject: test.subject,
                    kind: test.kind.clone(),
                    negated: !test.negated,
                },
                None => Test {
                    subject: recv_root,
                    kind: TestKind::Truthy,
                    negated: true,
                },
            };
            self.knowledge.insert(bind, inverted);
        }

        if let (Some(link), Some(info)) = (send.link, outcome.link_info) {
            self.link_infos.insert(link, info);
        }

        if send.is_safe && recv_had_nil {
            return Type::nilable(outcome.result);
        }
        outcome.result
    }

    fn alias_type(&self, gs: &GlobalState, sym: SymbolRef) -> Type {
        let data = gs.symbol_data(sym);
        if data.is_class_or_module() {
            // A constant in expression position: the type-level view of the
            // class.
            if data.type_members.is_empty() {
                Type::Meta(Box::new(Type::Class(sym)))
            } else {
                let args = vec![Type::Untyped; data.type_members.len()];
                Type::Meta(Box::new(Type::Applied { class: sym, args }))
            }
        } else {
            data.result_type.clone().unwrap_or(Type::Untyped)
        }
    }

    /// Re-run the transfer with the converged entry env recorded as
    /// annotations: binding types and use-site types, read by hover and
    /// diagnostics.
    fn annotate_block(&mut self, gs: &mut GlobalState, cfg: &mut Cfg, bid: BlockId) {
        // Rebuild the env up to each instruction.
        let preds = cfg.predecessors();
        let mut env = self.entry_env(gs, cfg, bid, &preds);
        for i in 0..cfg.block(bid).exprs.len() {
            let (bind, loc, instr) = {
                let b = &cfg.block(bid).exprs[i];
                (b.bind, b.loc, b.value.clone())
            };
            let ty = self.transfer(gs, &mut env, bind, loc, &instr, false);
            env.set(bind, ty.clone());
            let block = cfg.block_mut(bid);
            let binding = &mut block.exprs[i];
            binding.bind_type = Some(ty);
            match &mut binding.value {
                Instruction::Send(send) => {
                    send.recv.ty = Some(env.get(send.recv.variable));
                    for site in &mut send.args {
                        site.ty = Some(env.get(site.variable));
                    }
                    for (_, site) in &mut send.kwargs {
                        site.ty = Some(env.get(site.variable));
                    }
                }
                Instruction::Return(site)
                | Instruction::TAbsurd(site)
                | Instruction::BlockReturn { what: site, .. } => {
                    site.ty = Some(env.get(site.variable));
                }
                Instruction::Cast { value, .. } => {
                    value.ty = Some(env.get(value.variable));
                }
                _ => {}
            }
        }
        let block = cfg.block_mut(bid);
        if let Some(cond) = &mut block.exit.cond {
            let ty = env.get(cond.variable);
            cond.ty = Some(ty);
        }
    }
}

/// Resolve the method a send dispatches to, for editor queries. Walks the
/// same lookup path as inference.
pub fn resolve_send_target(
    gs: &GlobalState,
    recv_ty: &Type,
    fun: rty_core::NameRef,
) -> Option<SymbolRef> {
    dispatch::lookup_method(gs, recv_ty, fun)
}

/// The class whose members answer lookups for a receiver type; used by
/// completion to enumerate the linearization.
pub fn receiver_class_of(gs: &GlobalState, recv: &Type) -> Option<SymbolRef> {
    dispatch::receiver_class(gs, recv)
}

#[cfg(test)]
#[path = "tests/infer.rs"]
mod tests;
