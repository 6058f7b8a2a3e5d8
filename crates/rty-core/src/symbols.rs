//! The symbol table.
//!
//! A symbol is any named entity resolution can point at: classes and modules,
//! methods and their arguments, fields, static fields, type members of
//! generic classes and type arguments of generic methods. Symbols are
//! interned into the global state and referred to by `SymbolRef`.
//!
//! Invariants:
//! - the root symbol has id 0 and owns itself
//! - method symbols own their argument symbols
//! - a class's linearization (`resolved_ancestors`) is computed once by the
//!   resolver and frozen for dispatch afterwards

use crate::loc::Loc;
use crate::names::NameRef;
use crate::types::Type;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index into the global state's symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolRef(pub u32);

impl SymbolRef {
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(id: u32) -> Self {
        SymbolRef(id)
    }

    /// Shorthand for `gs.symbol_data(self)`.
    #[inline]
    pub fn data(self, gs: &crate::global_state::GlobalState) -> &Symbol {
        gs.symbol_data(self)
    }
}

/// Symbol flag bits. Low bits say what the symbol *is*, high bits carry
/// modifiers. Argument-only and type-member-only bits overlap nothing.
pub mod symbol_flags {
    pub const CLASS: u32 = 1 << 0;
    pub const MODULE: u32 = 1 << 1;
    pub const METHOD: u32 = 1 << 2;
    pub const FIELD: u32 = 1 << 3;
    pub const STATIC_FIELD: u32 = 1 << 4;
    pub const TYPE_MEMBER: u32 = 1 << 5;
    pub const TYPE_ARGUMENT: u32 = 1 << 6;
    pub const METHOD_ARGUMENT: u32 = 1 << 7;

    pub const ABSTRACT: u32 = 1 << 8;
    pub const FINAL: u32 = 1 << 9;
    pub const PRIVATE: u32 = 1 << 10;
    pub const PROTECTED: u32 = 1 << 11;
    pub const OVERRIDE: u32 = 1 << 12;
    pub const OVERRIDABLE: u32 = 1 << 13;
    /// Method declared `void`; its return value is usable only for control
    /// flow.
    pub const VOID_METHOD: u32 = 1 << 14;

    pub const ARG_OPTIONAL: u32 = 1 << 16;
    pub const ARG_KEYWORD: u32 = 1 << 17;
    pub const ARG_BLOCK: u32 = 1 << 18;
    pub const ARG_REPEATED: u32 = 1 << 19;

    pub const COVARIANT: u32 = 1 << 20;
    pub const CONTRAVARIANT: u32 = 1 << 21;
}

/// Declared variance of a type member or type argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// One entry of the symbol table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Symbol {
    pub owner: SymbolRef,
    pub name: NameRef,
    pub flags: u32,
    /// All definition sites; more than one when a class is reopened.
    pub locs: Vec<Loc>,
    pub superclass: Option<SymbolRef>,
    pub mixins: Vec<SymbolRef>,
    /// Generic parameters: type members on classes, type arguments on
    /// methods.
    pub type_members: Vec<SymbolRef>,
    /// Argument symbols, owned by this method, in declaration order.
    pub arguments: Vec<SymbolRef>,
    /// Direct members by name.
    pub members: FxHashMap<NameRef, SymbolRef>,
    /// Declared type: result type of methods, type of arguments and fields,
    /// aliased type of type aliases, bound of type members.
    pub result_type: Option<Type>,
    /// Frozen linearization, most- to least-specific, starting with `self`.
    /// `None` until the resolver finalizes ancestors.
    pub resolved_ancestors: Option<Vec<SymbolRef>>,
}

impl Symbol {
    pub(crate) fn new(owner: SymbolRef, name: NameRef, flags: u32, loc: Loc) -> Self {
        let locs = if loc.exists() { vec![loc] } else { Vec::new() };
        Symbol {
            owner,
            name,
            flags,
            locs,
            superclass: None,
            mixins: Vec::new(),
            type_members: Vec::new(),
            arguments: Vec::new(),
            members: FxHashMap::default(),
            result_type: None,
            resolved_ancestors: None,
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn is_class_or_module(&self) -> bool {
        self.has_flag(symbol_flags::CLASS | symbol_flags::MODULE)
    }

    pub fn is_method(&self) -> bool {
        self.has_flag(symbol_flags::METHOD)
    }

    pub fn is_private(&self) -> bool {
        self.has_flag(symbol_flags::PRIVATE)
    }

    pub fn is_void_method(&self) -> bool {
        self.has_flag(symbol_flags::VOID_METHOD)
    }

    pub fn variance(&self) -> Variance {
        if self.has_flag(symbol_flags::COVARIANT) {
            Variance::Covariant
        } else if self.has_flag(symbol_flags::CONTRAVARIANT) {
            Variance::Contravariant
        } else {
            Variance::Invariant
        }
    }

    /// The loc to report for this symbol; the first recorded definition.
    pub fn loc(&self) -> Loc {
        self.locs
            .first()
            .copied()
            .unwrap_or_else(|| Loc::none(crate::files::FileRef::from_raw(0)))
    }

    pub fn add_loc(&mut self, loc: Loc) {
        if loc.exists() && !self.locs.contains(&loc) {
            self.locs.push(loc);
        }
    }

    /// Count of required positional arguments (not optional, keyword, block
    /// or repeated).
    pub fn required_arg_count(&self, gs: &crate::global_state::GlobalState) -> usize {
        use symbol_flags::*;
        self.arguments
            .iter()
            .filter(|&&arg| {
                let f = gs.symbol_data(arg).flags;
                f & (ARG_OPTIONAL | ARG_KEYWORD | ARG_BLOCK | ARG_REPEATED) == 0
            })
            .count()
    }
}

/// Compile-time ids for symbols registered by `GlobalState::new`, in
/// registration order. The bootstrap asserts each landed on its constant.
pub mod wk_sym {
    use super::SymbolRef;

    pub const ROOT: SymbolRef = SymbolRef(0);
    pub const BASIC_OBJECT: SymbolRef = SymbolRef(1);
    pub const OBJECT: SymbolRef = SymbolRef(2);
    pub const KERNEL: SymbolRef = SymbolRef(3);
    pub const COMPARABLE: SymbolRef = SymbolRef(4);
    pub const NUMERIC: SymbolRef = SymbolRef(5);
    pub const INTEGER: SymbolRef = SymbolRef(6);
    pub const FLOAT: SymbolRef = SymbolRef(7);
    pub const STRING: SymbolRef = SymbolRef(8);
    pub const SYMBOL: SymbolRef = SymbolRef(9);
    pub const NIL_CLASS: SymbolRef = SymbolRef(10);
    pub const TRUE_CLASS: SymbolRef = SymbolRef(11);
    pub const FALSE_CLASS: SymbolRef = SymbolRef(12);
    pub const ARRAY: SymbolRef = SymbolRef(13);
    pub const HASH: SymbolRef = SymbolRef(14);
    pub const T_MODULE: SymbolRef = SymbolRef(15);
    pub const ARRAY_ELEM: SymbolRef = SymbolRef(16);
    pub const HASH_K: SymbolRef = SymbolRef(17);
    pub const HASH_V: SymbolRef = SymbolRef(18);

    /// One past the last well-known class-level symbol; bootstrap methods
    /// start here.
    pub const WELL_KNOWN_COUNT: u32 = 19;
}

#[cfg(test)]
#[path = "tests/symbols.rs"]
mod tests;
