//! Lowering desugared method bodies into CFGs.
//!
//! Structured constructs translate by the usual schemes: sequences are
//! straight-line, `if` forks and re-joins, `while` gets a header with a back
//! edge, a `begin/rescue` region forks to its handler on an unanalyzable
//! condition, block-carrying sends become a loop-shaped region between the
//! send and its solve instruction. Assignments always mint a fresh local
//! version; join points merge differing versions with explicit copies in each
//! predecessor, and a variable assigned on only some paths is completed with
//! a `nil` literal on the others.
//!
//! Code after a total jump lands in a fresh unreachable block; it is still
//! lowered (so its sub-expressions keep their diagnostics), reported as
//! unreachable, and pruned before the graph is returned.

use crate::instructions::{Binding, CastKind, Instruction, Send, VariableUseSite};
use crate::{
    BasicBlock, BlockExit, BlockId, BlockLink, BlockLinkId, Cfg, LocalData, LocalRef,
    ENTRY_BLOCK, EXIT_BLOCK,
};
use rty_core::errors::cfg as errors;
use rty_core::names::wk;
use rty_core::types::Literal;
use rty_core::{symbol_flags, GlobalState, Loc, NameRef, SymbolRef, Type};
use rty_parser::ast::{BlockArg, Expr, LitValue, MethodDef};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

type Env = FxHashMap<NameRef, LocalRef>;

/// Build the CFG for a resolved method definition. Returns `None` when the
/// resolver could not produce a method symbol for it.
pub fn build_for_method(gs: &mut GlobalState, def: &MethodDef) -> Option<Cfg> {
    let method = def.resolved?;
    let owner = gs.symbol_data(method).owner;
    let mut cfg = Cfg {
        method,
        loc: def.loc,
        blocks: Vec::new(),
        links: Vec::new(),
        locals: Vec::new(),
    };
    cfg.blocks.push(BasicBlock {
        id: ENTRY_BLOCK,
        exprs: Vec::new(),
        exit: BlockExit::direct(EXIT_BLOCK, def.loc),
    });
    cfg.blocks.push(BasicBlock {
        id: EXIT_BLOCK,
        exprs: Vec::new(),
        exit: BlockExit::direct(EXIT_BLOCK, def.loc),
    });

    let mut builder = Builder {
        gs,
        cfg,
        owner,
        method,
        current: ENTRY_BLOCK,
        env: Env::default(),
        versions: FxHashMap::default(),
    };

    // Arguments first: one LoadArg per declared parameter, then default
    // values (lowered so their expressions are checked).
    let args = builder.gs.symbol_data(method).arguments.clone();
    for (index, (&arg_sym, param)) in args.iter().zip(def.params.iter()).enumerate() {
        let name = builder.gs.symbol_data(arg_sym).name;
        let local = builder.fresh_version(name);
        builder.emit(local, param.loc, Instruction::LoadArg { method, index });
        builder.env.insert(name, local);
    }
    for param in &def.params {
        if let Some(default) = &param.default {
            // The default's value is evaluated for its own diagnostics; the
            // parameter keeps its declared type.
            let _ = builder.walk(default);
        }
    }

    let result = builder.walk(&def.body);
    let loc = def.body.loc();
    let ret_site = VariableUseSite::new(result, loc);
    let ret_local = builder.temp();
    builder.emit(ret_local, loc, Instruction::Return(ret_site));
    builder.seal(BlockExit::direct(EXIT_BLOCK, loc));

    let mut cfg = builder.cfg;
    prune_unreachable(gs, &mut cfg);
    cfg.sanity_check();
    trace!(
        method = %gs.symbol_full_name(method),
        blocks = cfg.blocks.len(),
        "built cfg"
    );
    Some(cfg)
}

struct Builder<'gs> {
    gs: &'gs mut GlobalState,
    cfg: Cfg,
    owner: SymbolRef,
    method: SymbolRef,
    current: BlockId,
    env: Env,
    versions: FxHashMap<NameRef, u32>,
}

impl<'gs> Builder<'gs> {
    // =========================================================================
    // Graph plumbing
    // =========================================================================

    fn fresh_version(&mut self, name: NameRef) -> LocalRef {
        let version = self.versions.entry(name).or_insert(0);
        *version += 1;
        let v = *version;
        self.cfg.push_local(LocalData { name, version: v })
    }

    fn temp(&mut self) -> LocalRef {
        self.fresh_version(wk::TEMP)
    }

    fn new_block(&mut self, loc: Loc) -> BlockId {
        let id = BlockId(self.cfg.blocks.len() as u32);
        self.cfg.blocks.push(BasicBlock {
            id,
            exprs: Vec::new(),
            exit: BlockExit::direct(EXIT_BLOCK, loc),
        });
        id
    }

    fn emit(&mut self, bind: LocalRef, loc: Loc, value: Instruction) {
        self.emit_in(self.current, bind, loc, value);
    }

    fn emit_in(&mut self, block: BlockId, bind: LocalRef, loc: Loc, value: Instruction) {
        self.cfg
            .block_mut(block)
            .exprs
            .push(Binding::new(bind, loc, value));
    }

    fn seal(&mut self, exit: BlockExit) {
        self.cfg.block_mut(self.current).exit = exit;
    }

    fn literal(&mut self, loc: Loc, ty: Type) -> LocalRef {
        let tmp = self.temp();
        self.emit(tmp, loc, Instruction::Literal(ty));
        tmp
    }

    // =========================================================================
    // Expression lowering
    // =========================================================================

    fn walk(&mut self, expr: &Expr) -> LocalRef {
        match expr {
            Expr::Seq { stmts, loc } => {
                let mut last = None;
                for stmt in stmts {
                    last = Some(self.walk(stmt));
                }
                last.unwrap_or_else(|| self.literal(*loc, Type::nil_class()))
            }
            Expr::Lit { loc, value } => {
                let ty = lit_type(value);
                self.literal(*loc, ty)
            }
            Expr::Local { loc, name } => match self.env.get(name) {
                Some(&local) => local,
                None => {
                    let rendered = self.gs.name_str(*name);
                    self.gs.report_error(
                        *loc,
                        errors::UNDECLARED_VARIABLE,
                        format!("use of undeclared variable `{rendered}`"),
                    );
                    self.literal(*loc, Type::Untyped)
                }
            },
            Expr::Assign { loc, name, value } => {
                let v = self.walk(value);
                let target = self.fresh_version(*name);
                self.emit(target, *loc, Instruction::Ident(v));
                self.env.insert(*name, target);
                target
            }
            Expr::FieldRef { loc, name } => {
                let tmp = self.temp();
                match self.field_symbol(*name) {
                    Some(field) => self.emit(tmp, *loc, Instruction::Alias(field)),
                    None => self.emit(tmp, *loc, Instruction::Literal(Type::Untyped)),
                }
                tmp
            }
            Expr::FieldAssign { loc, name, value } => {
                let v = self.walk(value);
                let declared = self
                    .field_symbol(*name)
                    .and_then(|f| self.gs.symbol_data(f).result_type.clone());
                match declared {
                    // The write is checked against the declared field type.
                    Some(ty) => {
                        let tmp = self.temp();
                        self.emit(
                            tmp,
                            *loc,
                            Instruction::Cast {
                                value: VariableUseSite::new(v, *loc),
                                ty: Some(ty),
                                kind: CastKind::Let,
                            },
                        );
                        tmp
                    }
                    None => v,
                }
            }
            Expr::SelfRef { loc } => {
                let tmp = self.temp();
                self.emit(tmp, *loc, Instruction::LoadSelf { link: None });
                tmp
            }
            Expr::Constant(path) => {
                let tmp = self.temp();
                match path.resolved {
                    Some(sym) => self.emit(tmp, path.loc, Instruction::Alias(sym)),
                    // The resolver already reported; keep the pipeline going.
                    None => self.emit(tmp, path.loc, Instruction::Literal(Type::Untyped)),
                }
                tmp
            }
            Expr::Send {
                loc,
                recv,
                name,
                name_loc,
                args,
                kwargs,
                block,
                is_safe,
                is_private_ok,
            } => self.walk_send(
                *loc,
                recv,
                *name,
                *name_loc,
                args,
                kwargs,
                block.as_deref(),
                *is_safe,
                *is_private_ok,
            ),
            Expr::If {
                loc,
                cond,
                then_,
                else_,
            } => self.walk_if(*loc, cond, then_, else_),
            Expr::While { loc, cond, body } => self.walk_while(*loc, cond, body),
            Expr::Return { loc, value } => {
                let v = match value {
                    Some(value) => self.walk(value),
                    None => self.literal(*loc, Type::nil_class()),
                };
                if self.gs.symbol_data(self.method).is_void_method() && value.is_some() {
                    self.gs.report_error(
                        *loc,
                        errors::RETURN_IN_VOID,
                        "returned value will be ignored: method is declared `void`"
                            .to_string(),
                    );
                }
                let tmp = self.temp();
                self.emit(tmp, *loc, Instruction::Return(VariableUseSite::new(v, *loc)));
                self.seal(BlockExit::direct(EXIT_BLOCK, *loc));
                // Anything after this is unreachable; keep lowering into a
                // fresh block so it is still visited, then prune.
                let dead = self.new_block(*loc);
                self.current = dead;
                self.literal(*loc, Type::Untyped)
            }
            Expr::Rescue {
                loc,
                body,
                handler,
                ensure,
            } => self.walk_rescue(*loc, body, handler, ensure),
            Expr::Cast {
                loc,
                value,
                kind,
                resolved_type,
                ..
            } => {
                let v = self.walk(value);
                let tmp = self.temp();
                self.emit(
                    tmp,
                    *loc,
                    Instruction::Cast {
                        value: VariableUseSite::new(v, value.loc()),
                        ty: resolved_type.clone(),
                        kind: *kind,
                    },
                );
                tmp
            }
            Expr::Absurd { loc, value } => {
                let v = self.walk(value);
                let tmp = self.temp();
                self.emit(
                    tmp,
                    *loc,
                    Instruction::TAbsurd(VariableUseSite::new(v, value.loc())),
                );
                tmp
            }
        }
    }

    fn field_symbol(&self, name: NameRef) -> Option<SymbolRef> {
        self.gs
            .symbol_data(self.owner)
            .members
            .get(&name)
            .copied()
            .filter(|&s| self.gs.symbol_data(s).has_flag(symbol_flags::FIELD))
    }

    // =========================================================================
    // Sends and blocks
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn walk_send(
        &mut self,
        loc: Loc,
        recv: &Expr,
        name: NameRef,
        name_loc: Loc,
        args: &[Expr],
        kwargs: &[(NameRef, Expr)],
        block: Option<&BlockArg>,
        is_safe: bool,
        is_private_ok: bool,
    ) -> LocalRef {
        let recv_local = self.walk(recv);
        let arg_sites: Vec<VariableUseSite> = args
            .iter()
            .map(|arg| {
                let local = self.walk(arg);
                VariableUseSite::new(local, arg.loc())
            })
            .collect();
        let kwarg_sites: Vec<(NameRef, VariableUseSite)> = kwargs
            .iter()
            .map(|(kw_name, arg)| {
                let local = self.walk(arg);
                (*kw_name, VariableUseSite::new(local, arg.loc()))
            })
            .collect();

        let link = block.map(|_| {
            let id = BlockLinkId(self.cfg.links.len() as u32);
            self.cfg.links.push(BlockLink { fun: name });
            id
        });

        let send_tmp = self.temp();
        self.emit(
            send_tmp,
            loc,
            Instruction::Send(Send {
                recv: VariableUseSite::new(recv_local, recv.loc()),
                fun: name,
                fun_loc: name_loc,
                args: arg_sites,
                kwargs: kwarg_sites,
                is_private_ok,
                is_safe,
                link,
            }),
        );

        match (block, link) {
            (Some(block), Some(link)) => self.walk_block_region(loc, send_tmp, link, block),
            _ => send_tmp,
        }
    }

    /// The block region is a loop between the send and its solve: the block
    /// may run zero or more times, decided by conditions the checker cannot
    /// see (hence `Unanalyzable`).
    fn walk_block_region(
        &mut self,
        loc: Loc,
        send_tmp: LocalRef,
        link: BlockLinkId,
        block: &BlockArg,
    ) -> LocalRef {
        let assigned = assigned_names(&block.body);
        let (header, after) = self.open_loop(loc, &assigned);

        // Whether (and how often) the block runs is the callee's business:
        // fork to the body or past the whole region on an unanalyzable
        // condition.
        let enter_cond = self.temp();
        self.emit(enter_cond, loc, Instruction::Unanalyzable);
        let body_begin = self.new_block(block.loc);
        self.seal(BlockExit {
            cond: Some(VariableUseSite::new(enter_cond, loc)),
            then_: body_begin,
            else_: after,
            loc,
        });
        self.current = body_begin;

        // Block entry: bind parameters, shadowing any outer locals.
        let shadowed: Vec<(NameRef, Option<LocalRef>)> = block
            .params
            .iter()
            .map(|(name, _)| (*name, self.env.get(name).copied()))
            .collect();
        match block.params.len() {
            0 => {}
            1 => {
                let (name, param_loc) = block.params[0];
                let local = self.fresh_version(name);
                self.emit(local, param_loc, Instruction::LoadYieldParams { link });
                self.env.insert(name, local);
            }
            _ => {
                let rendered = self.gs.name_str(self.cfg.links[link.0 as usize].fun);
                let tmp = self.temp();
                self.emit(
                    tmp,
                    block.loc,
                    Instruction::NotSupported(format!(
                        "destructuring block parameters of `{rendered}`"
                    )),
                );
                for (name, param_loc) in &block.params {
                    let local = self.fresh_version(*name);
                    self.emit(local, *param_loc, Instruction::Literal(Type::Untyped));
                    self.env.insert(*name, local);
                }
            }
        }

        let result = self.walk(&block.body);
        let ret_tmp = self.temp();
        self.emit(
            ret_tmp,
            block.body.loc(),
            Instruction::BlockReturn {
                link,
                what: VariableUseSite::new(result, block.body.loc()),
            },
        );
        self.close_loop(loc, header, after, &assigned);

        // Outer locals shadowed by block parameters come back into scope.
        for (name, previous) in shadowed {
            match previous {
                Some(local) => {
                    self.env.insert(name, local);
                }
                None => {
                    self.env.remove(&name);
                }
            }
        }

        let solved = self.temp();
        self.emit(
            solved,
            loc,
            Instruction::SolveConstraint {
                send: send_tmp,
                link,
            },
        );
        solved
    }

    // =========================================================================
    // Structured control flow
    // =========================================================================

    fn walk_if(&mut self, loc: Loc, cond: &Expr, then_: &Expr, else_: &Expr) -> LocalRef {
        let cond_local = self.walk(cond);
        let then_block = self.new_block(then_.loc());
        let else_block = self.new_block(else_.loc());
        self.seal(BlockExit {
            cond: Some(VariableUseSite::new(cond_local, cond.loc())),
            then_: then_block,
            else_: else_block,
            loc,
        });
        let entry_env = self.env.clone();

        self.current = then_block;
        let then_result = self.walk(then_);
        let then_tail = self.current;
        let then_env = std::mem::replace(&mut self.env, entry_env.clone());

        self.current = else_block;
        let else_result = self.walk(else_);
        let else_tail = self.current;
        let else_env = std::mem::take(&mut self.env);

        let merge = self.new_block(loc);
        self.cfg.block_mut(then_tail).exit = BlockExit::direct(merge, loc);
        self.cfg.block_mut(else_tail).exit = BlockExit::direct(merge, loc);

        // Merge environments: a variable differing between branches (or
        // present on only one) gets a merge local written in each
        // predecessor; a missing side contributes nil.
        let mut merged_env = Env::default();
        let mut names: Vec<NameRef> = then_env.keys().chain(else_env.keys()).copied().collect();
        names.sort();
        names.dedup();
        for name in names {
            match (then_env.get(&name), else_env.get(&name)) {
                (Some(&a), Some(&b)) if a == b => {
                    merged_env.insert(name, a);
                }
                (a, b) => {
                    let merged = self.fresh_version(name);
                    self.write_merge_copy(then_tail, merged, loc, a.copied());
                    self.write_merge_copy(else_tail, merged, loc, b.copied());
                    merged_env.insert(name, merged);
                }
            }
        }
        self.env = merged_env;

        // The if's value joins the branch results.
        let result = self.temp();
        self.emit_in(then_tail, result, then_.loc(), Instruction::Ident(then_result));
        self.emit_in(else_tail, result, else_.loc(), Instruction::Ident(else_result));
        self.current = merge;
        result
    }

    fn write_merge_copy(
        &mut self,
        block: BlockId,
        merged: LocalRef,
        loc: Loc,
        source: Option<LocalRef>,
    ) {
        match source {
            Some(source) => self.emit_in(block, merged, loc, Instruction::Ident(source)),
            // Assigned on the other path only: this path contributes nil.
            None => self.emit_in(block, merged, loc, Instruction::Literal(Type::nil_class())),
        }
    }

    fn walk_while(&mut self, loc: Loc, cond: &Expr, body: &Expr) -> LocalRef {
        let mut assigned = assigned_names(body);
        assigned.extend(assigned_names(cond));
        let (header, after) = self.open_loop(loc, &assigned);

        let cond_local = self.walk(cond);
        let body_block = self.new_block(body.loc());
        self.seal(BlockExit {
            cond: Some(VariableUseSite::new(cond_local, cond.loc())),
            then_: body_block,
            else_: after,
            loc,
        });
        // The condition may span several blocks (short-circuits); the loop
        // header for the back edge is still the first one.
        self.current = body_block;
        let _ = self.walk(body);
        self.close_loop(loc, header, after, &assigned);

        self.literal(loc, Type::nil_class())
    }

    /// Open a loop-shaped region: seed merge locals for every variable the
    /// region assigns (nil when not yet defined), seal the current block into
    /// the new header, and position the builder at the header. Returns
    /// `(header, after)`; the caller lowers the header/body and then calls
    /// `close_loop`.
    fn open_loop(&mut self, loc: Loc, assigned: &[NameRef]) -> (BlockId, BlockId) {
        let header = self.new_block(loc);
        let after = self.new_block(loc);
        let preheader = self.current;
        for &name in assigned {
            let merged = self.fresh_version(name);
            let source = self.env.get(&name).copied();
            self.write_merge_copy(preheader, merged, loc, source);
            self.env.insert(name, merged);
        }
        self.seal(BlockExit::direct(header, loc));
        self.current = header;
        (header, after)
    }

    /// Close a loop-shaped region: write the back-edge merge copies for
    /// variables the body actually reassigned, seal the tail back to the
    /// header, and continue at `after` with the header's environment.
    fn close_loop(&mut self, loc: Loc, header: BlockId, after: BlockId, assigned: &[NameRef]) {
        let tail = self.current;
        for &name in assigned {
            // Header env holds the merge local; walk set env to the body's
            // latest version.
            let latest = self.env.get(&name).copied();
            let merged = self.header_version(header, name);
            if let (Some(latest), Some(merged)) = (latest, merged) {
                if latest != merged {
                    self.emit_in(tail, merged, loc, Instruction::Ident(latest));
                }
                self.env.insert(name, merged);
            }
        }
        self.cfg.block_mut(tail).exit = BlockExit::direct(header, loc);
        self.current = after;
    }

    /// The merge local created for `name` by `open_loop`: the highest
    /// version written in the preheader copies. Tracked by convention: the
    /// merge local is whatever the env maps the name to at header entry,
    /// which `close_loop` recovers from the preheader's copy targets.
    fn header_version(&self, header: BlockId, name: NameRef) -> Option<LocalRef> {
        // Find the copy targeting this name among the header's predecessors'
        // trailing merge writes.
        let preds = self.cfg.predecessors();
        let preds = preds.get(&header)?;
        for &pred in preds {
            for binding in self.cfg.block(pred).exprs.iter().rev() {
                let data = self.cfg.local_data(binding.bind);
                if data.name == name {
                    return Some(binding.bind);
                }
            }
        }
        None
    }

    fn walk_rescue(
        &mut self,
        loc: Loc,
        body: &Expr,
        handler: &Option<(Option<NameRef>, Box<Expr>)>,
        ensure: &Option<Box<Expr>>,
    ) -> LocalRef {
        let result = match handler {
            Some((binder, handler_body)) => {
                // Whether the region raises is not statically analyzable:
                // fork to the handler on an unanalyzable condition at entry,
                // and again after the body (a raise at the end of the
                // region).
                let entry_cond = self.temp();
                self.emit(entry_cond, loc, Instruction::Unanalyzable);
                let body_block = self.new_block(body.loc());
                let handler_block = self.new_block(handler_body.loc());
                self.seal(BlockExit {
                    cond: Some(VariableUseSite::new(entry_cond, loc)),
                    then_: body_block,
                    else_: handler_block,
                    loc,
                });
                let entry_env = self.env.clone();

                self.current = body_block;
                let body_result = self.walk(body);
                let body_tail = self.current;
                let body_env = std::mem::replace(&mut self.env, entry_env.clone());

                // Body end can still raise into the handler.
                let raise_cond = self.temp();
                self.emit_in(body_tail, raise_cond, loc, Instruction::Unanalyzable);

                self.current = handler_block;
                if let Some(binder) = binder {
                    // The exception value itself is untyped (exception
                    // classes are not modeled).
                    let local = self.fresh_version(*binder);
                    self.emit(local, handler_body.loc(), Instruction::Literal(Type::Untyped));
                    self.env.insert(*binder, local);
                }
                // Variables the body assigns may or may not have been written
                // when the handler runs; they enter it as untyped.
                for name in assigned_names(body) {
                    if !self.env.contains_key(&name) {
                        let local = self.fresh_version(name);
                        self.emit(
                            local,
                            handler_body.loc(),
                            Instruction::Literal(Type::Untyped),
                        );
                        self.env.insert(name, local);
                    }
                }
                let handler_result = self.walk(handler_body);
                let handler_tail = self.current;
                let handler_env = std::mem::take(&mut self.env);

                let merge = self.new_block(loc);
                self.cfg.block_mut(body_tail).exit = BlockExit {
                    cond: Some(VariableUseSite::new(raise_cond, loc)),
                    then_: merge,
                    else_: handler_block,
                    loc,
                };
                self.cfg.block_mut(handler_tail).exit = BlockExit::direct(merge, loc);

                // Handler entry sees the entry env; merge joins body and
                // handler outcomes like an if.
                let mut merged_env = Env::default();
                let mut names: Vec<NameRef> =
                    body_env.keys().chain(handler_env.keys()).copied().collect();
                names.sort();
                names.dedup();
                for name in names {
                    match (body_env.get(&name), handler_env.get(&name)) {
                        (Some(&a), Some(&b)) if a == b => {
                            merged_env.insert(name, a);
                        }
                        (a, b) => {
                            let merged = self.fresh_version(name);
                            self.write_merge_copy(body_tail, merged, loc, a.copied());
                            self.write_merge_copy(handler_tail, merged, loc, b.copied());
                            merged_env.insert(name, merged);
                        }
                    }
                }
                self.env = merged_env;

                let result = self.temp();
                self.emit_in(body_tail, result, body.loc(), Instruction::Ident(body_result));
                self.emit_in(
                    handler_tail,
                    result,
                    handler_body.loc(),
                    Instruction::Ident(handler_result),
                );
                self.current = merge;
                result
            }
            None => self.walk(body),
        };

        if let Some(ensure) = ensure {
            // The finalizer runs on the joined path; its value is discarded.
            let _ = self.walk(ensure);
        }
        result
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn lit_type(value: &LitValue) -> Type {
    use rty_core::types::FloatBits;
    match value {
        LitValue::Int(v) => Type::LiteralType(Literal::Integer(*v)),
        LitValue::Float(v) => Type::LiteralType(Literal::Float(FloatBits::from_f64(*v))),
        LitValue::Str(name) => Type::LiteralType(Literal::String(*name)),
        LitValue::Sym(name) => Type::LiteralType(Literal::Symbol(*name)),
        LitValue::True => Type::true_class(),
        LitValue::False => Type::false_class(),
        LitValue::Nil => Type::nil_class(),
    }
}

/// Local variables assigned anywhere inside an expression, for loop-region
/// merge seeding.
fn assigned_names(expr: &Expr) -> Vec<NameRef> {
    let mut out = FxHashSet::default();
    fn visit(expr: &Expr, out: &mut FxHashSet<NameRef>) {
        match expr {
            Expr::Assign { name, value, .. } => {
                out.insert(*name);
                visit(value, out);
            }
            Expr::Seq { stmts, .. } => {
                for stmt in stmts {
                    visit(stmt, out);
                }
            }
            Expr::FieldAssign { value, .. } => visit(value, out),
            Expr::Send {
                recv, args, kwargs, block, ..
            } => {
                visit(recv, out);
                for arg in args {
                    visit(arg, out);
                }
                for (_, arg) in kwargs {
                    visit(arg, out);
                }
                if let Some(block) = block {
                    visit(&block.body, out);
                }
            }
            Expr::If {
                cond, then_, else_, ..
            } => {
                visit(cond, out);
                visit(then_, out);
                visit(else_, out);
            }
            Expr::While { cond, body, .. } => {
                visit(cond, out);
                visit(body, out);
            }
            Expr::Return { value, .. } => {
                if let Some(value) = value {
                    visit(value, out);
                }
            }
            Expr::Rescue {
                body,
                handler,
                ensure,
                ..
            } => {
                visit(body, out);
                if let Some((binder, handler_body)) = handler {
                    if let Some(binder) = binder {
                        out.insert(*binder);
                    }
                    visit(handler_body, out);
                }
                if let Some(ensure) = ensure {
                    visit(ensure, out);
                }
            }
            Expr::Cast { value, .. } | Expr::Absurd { value, .. } => visit(value, out),
            Expr::Lit { .. }
            | Expr::Local { .. }
            | Expr::FieldRef { .. }
            | Expr::SelfRef { .. }
            | Expr::Constant(_) => {}
        }
    }
    visit(expr, &mut out);
    let mut names: Vec<NameRef> = out.into_iter().collect();
    names.sort();
    names
}

/// Drop blocks unreachable from the entry, reporting their code as
/// unreachable, and remap block ids.
fn prune_unreachable(gs: &mut GlobalState, cfg: &mut Cfg) {
    let mut reachable = vec![false; cfg.blocks.len()];
    let mut stack = vec![ENTRY_BLOCK];
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut reachable[id.0 as usize], true) {
            continue;
        }
        if id != EXIT_BLOCK {
            for succ in cfg.block(id).successors() {
                stack.push(succ);
            }
        }
    }
    reachable[EXIT_BLOCK.0 as usize] = true;

    if reachable.iter().all(|&r| r) {
        return;
    }

    for (i, block) in cfg.blocks.iter().enumerate() {
        if !reachable[i] {
            if let Some(binding) = block.exprs.first() {
                if binding.loc.exists() {
                    gs.report_error(
                        binding.loc,
                        errors::UNREACHABLE_CODE,
                        "this code is unreachable".to_string(),
                    );
                }
            }
        }
    }

    let mut remap: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut kept = Vec::new();
    for (i, block) in cfg.blocks.drain(..).enumerate() {
        if reachable[i] {
            let new_id = BlockId(kept.len() as u32);
            remap.insert(block.id, new_id);
            kept.push(block);
        }
    }
    for block in &mut kept {
        block.id = remap[&block.id];
        block.exit.then_ = remap[&block.exit.then_];
        block.exit.else_ = remap[&block.exit.else_];
    }
    cfg.blocks = kept;
}
