//! Core state for the rty type checker.
//!
//! This crate owns the interned global state (names, symbols, files, error
//! buffer), source locations, the type lattice with its operators, payload
//! snapshots and global-state substitution. Everything downstream — parser,
//! resolver, CFG, inference, editor services — speaks in the integer ids
//! defined here.

pub mod errors;
pub mod files;
pub mod global_state;
pub mod loc;
pub mod names;
pub mod payload;
pub mod substitution;
pub mod symbols;
pub mod types;

pub use errors::{Diagnostic, ErrorClass, Severity};
pub use files::{File, FileRef, SourceType, StrictnessLevel};
pub use global_state::GlobalState;
pub use loc::{Loc, LocDetail, LOC_SENTINEL};
pub use names::{NameData, NameRef, UniqueNameKind};
pub use substitution::GlobalSubstitution;
pub use symbols::{symbol_flags, wk_sym, Symbol, SymbolRef, Variance};
pub use types::{Type, TypeConstraint};
