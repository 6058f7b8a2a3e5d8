//! Per-method control-flow graphs in static single assignment form.
//!
//! A [`Cfg`] is a vector of basic blocks, each an ordered list of
//! three-address [`instructions::Binding`]s plus one exit (conditional on a
//! local, direct, or the graph's sink). Block 0 is the unique entry, block 1
//! the unique exit. Every local is a fresh `(name, version)` pair assigned
//! exactly once, except merge locals, which are written once in each
//! predecessor of their join point (the explicit-copy encoding of phi).

pub mod builder;
pub mod instructions;

pub use builder::build_for_method;

use instructions::{Binding, VariableUseSite};
use rty_core::{GlobalState, Loc, NameRef, SymbolRef};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

pub const ENTRY_BLOCK: BlockId = BlockId(0);
pub const EXIT_BLOCK: BlockId = BlockId(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalRef(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockLinkId(pub u32);

/// Naming data for one local: the source-level name (or a minted temp name)
/// plus an SSA version.
#[derive(Clone, Debug)]
pub struct LocalData {
    pub name: NameRef,
    pub version: u32,
}

/// A block-carrying send's link between the send, its block region and the
/// solve instruction after it.
#[derive(Clone, Debug)]
pub struct BlockLink {
    /// Method the block was passed to.
    pub fun: NameRef,
}

#[derive(Clone, Debug)]
pub struct BlockExit {
    /// `None` means an unconditional transfer (then == else).
    pub cond: Option<VariableUseSite>,
    pub then_: BlockId,
    pub else_: BlockId,
    pub loc: Loc,
}

impl BlockExit {
    pub fn direct(to: BlockId, loc: Loc) -> Self {
        BlockExit {
            cond: None,
            then_: to,
            else_: to,
            loc,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub exprs: Vec<Binding>,
    pub exit: BlockExit,
}

impl BasicBlock {
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        let second = (self.exit.then_ != self.exit.else_).then_some(self.exit.else_);
        std::iter::once(self.exit.then_).chain(second)
    }
}

#[derive(Clone, Debug)]
pub struct Cfg {
    pub method: SymbolRef,
    pub loc: Loc,
    pub blocks: Vec<BasicBlock>,
    pub links: Vec<BlockLink>,
    locals: Vec<LocalData>,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn local_data(&self, local: LocalRef) -> &LocalData {
        &self.locals[local.0 as usize]
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Predecessor lists, computed on demand.
    pub fn predecessors(&self) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in &self.blocks {
            if block.id == EXIT_BLOCK {
                continue;
            }
            for succ in block.successors() {
                preds.entry(succ).or_default().push(block.id);
            }
        }
        preds
    }

    /// Blocks in reverse post-order from the entry; the iteration order of
    /// the forward dataflow pass.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        fn visit(cfg: &Cfg, id: BlockId, visited: &mut [bool], order: &mut Vec<BlockId>) {
            if std::mem::replace(&mut visited[id.0 as usize], true) {
                return;
            }
            if id != EXIT_BLOCK {
                for succ in cfg.block(id).successors() {
                    visit(cfg, succ, visited, order);
                }
            }
            order.push(id);
        }
        visit(self, ENTRY_BLOCK, &mut visited, &mut order);
        order.reverse();
        order
    }

    /// Structural invariants: one entry, one exit, all blocks reachable,
    /// every local assigned exactly once (merge locals once per predecessor
    /// of a single join point).
    pub fn sanity_check(&self) {
        assert!(self.blocks.len() >= 2, "cfg must have entry and exit");
        assert_eq!(self.blocks[0].id, ENTRY_BLOCK);
        assert_eq!(self.blocks[1].id, EXIT_BLOCK);

        let rpo = self.reverse_postorder();
        assert_eq!(
            rpo.len(),
            self.blocks.len(),
            "unreachable blocks survived pruning"
        );

        // Exactly-once assignment, with the phi exception: multiple writes
        // must come from distinct blocks.
        let mut writes: FxHashMap<LocalRef, Vec<BlockId>> = FxHashMap::default();
        for block in &self.blocks {
            for binding in &block.exprs {
                writes.entry(binding.bind).or_default().push(block.id);
            }
        }
        for (local, blocks) in &writes {
            if blocks.len() > 1 {
                let mut uniq = blocks.clone();
                uniq.sort();
                uniq.dedup();
                assert_eq!(
                    uniq.len(),
                    blocks.len(),
                    "local {:?} assigned twice within one block",
                    local
                );
            }
        }
    }

    /// Human-readable dump for debugging and tests.
    pub fn show(&self, gs: &GlobalState) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "cfg for {}", gs.symbol_full_name(self.method));
        for block in &self.blocks {
            let _ = writeln!(out, "bb{}:", block.id.0);
            for binding in &block.exprs {
                let data = self.local_data(binding.bind);
                let _ = writeln!(
                    out,
                    "  {}${} = {:?}",
                    gs.name_str(data.name),
                    data.version,
                    binding.value
                );
            }
            match &block.exit.cond {
                Some(cond) => {
                    let data = self.local_data(cond.variable);
                    let _ = writeln!(
                        out,
                        "  cond {}${} -> bb{}, bb{}",
                        gs.name_str(data.name),
                        data.version,
                        block.exit.then_.0,
                        block.exit.else_.0
                    );
                }
                None if block.id == EXIT_BLOCK => {
                    let _ = writeln!(out, "  <exit>");
                }
                None => {
                    let _ = writeln!(out, "  -> bb{}", block.exit.then_.0);
                }
            }
        }
        out
    }

    pub(crate) fn push_local(&mut self, data: LocalData) -> LocalRef {
        let id = LocalRef(self.locals.len() as u32);
        self.locals.push(data);
        id
    }
}

#[cfg(test)]
#[path = "tests/cfg.rs"]
mod tests;
