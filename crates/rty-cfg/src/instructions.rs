//! Three-address instructions.
//!
//! Every instruction is the right-hand side of a binding `local = instr`.
//! Use sites carry an optional type slot that inference fills in place, so
//! later queries (hover, diagnostics) can read concrete types off the graph.

use crate::{BlockLinkId, LocalRef};
use rty_core::{Loc, NameRef, SymbolRef, Type};
pub use rty_parser::ast::CastKind;

/// A read of a local, with the loc of the reading expression and the type
/// inference assigned to it.
#[derive(Clone, Debug)]
pub struct VariableUseSite {
    pub variable: LocalRef,
    pub loc: Loc,
    pub ty: Option<Type>,
}

impl VariableUseSite {
    pub fn new(variable: LocalRef, loc: Loc) -> Self {
        VariableUseSite {
            variable,
            loc,
            ty: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Send {
    pub recv: VariableUseSite,
    pub fun: NameRef,
    /// Loc of the method name alone, for precise diagnostics and hover.
    pub fun_loc: Loc,
    pub args: Vec<VariableUseSite>,
    pub kwargs: Vec<(NameRef, VariableUseSite)>,
    /// Private methods are callable: the receiver was the implicit self.
    pub is_private_ok: bool,
    /// `&.` send: dispatch on the non-nil part, result is nilable.
    pub is_safe: bool,
    /// Set when the send carries a block; the block's region is wired to
    /// this link.
    pub link: Option<BlockLinkId>,
}

#[derive(Clone, Debug)]
pub enum Instruction {
    /// Copy of another local.
    Ident(LocalRef),
    /// Read of a symbol: constant, static field or instance field.
    Alias(SymbolRef),
    /// A value of a statically known type.
    Literal(Type),
    Send(Send),
    /// Method return; control continues at the exit block.
    Return(VariableUseSite),
    /// Value produced by a block body for its send's link.
    BlockReturn {
        link: BlockLinkId,
        what: VariableUseSite,
    },
    /// The enclosing `self`.
    LoadSelf { link: Option<BlockLinkId> },
    /// Declared type of the method's i-th argument.
    LoadArg { method: SymbolRef, index: usize },
    /// The parameter value a block receives from its yielder.
    LoadYieldParams { link: BlockLinkId },
    /// Completes a block-carrying send once the block region is typed.
    SolveConstraint {
        send: LocalRef,
        link: BlockLinkId,
    },
    Cast {
        value: VariableUseSite,
        ty: Option<Type>,
        kind: CastKind,
    },
    /// `T.absurd`: an error unless the value's type is bottom.
    TAbsurd(VariableUseSite),
    /// Present for completeness of the lowering; typed as untyped.
    Unanalyzable,
    /// A construct the lowering does not handle; reported once.
    NotSupported(String),
}

/// One `local = instruction` entry of a basic block.
#[derive(Clone, Debug)]
pub struct Binding {
    pub bind: LocalRef,
    pub loc: Loc,
    pub value: Instruction,
    /// Type inference assigned to `bind` at this program point.
    pub bind_type: Option<Type>,
}

impl Binding {
    pub fn new(bind: LocalRef, loc: Loc, value: Instruction) -> Self {
        Binding {
            bind,
            loc,
            value,
            bind_type: None,
        }
    }
}
