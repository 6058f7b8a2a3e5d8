//! Resolution: from parsed trees to a populated symbol table.
//!
//! Runs in two phases over every parsed file:
//!
//! 1. **enter** — walk definitions and intern class/module, method, argument
//!    and static-field symbols (reopening classes merges locs);
//! 2. **resolve** — wire superclasses (cycle-checked), freeze each class's
//!    linearization, lower `sig` declarations onto method symbols, resolve
//!    constant references and cast targets inside method bodies, and enter
//!    field symbols for instance variables.
//!
//! Both phases mutate the trees in place, filling the `resolved` slots the
//! CFG builder and the editor queries read.

mod enter;
mod resolve;
mod sig;

pub use resolve::resolve_constant_in_scope;

use rty_core::GlobalState;
use rty_parser::ast::ParsedFile;
use tracing::debug;

/// Run both resolver phases over a batch of parsed files. The batch must
/// contain every file being (re)introduced, so cross-file references land.
pub fn run(gs: &mut GlobalState, files: &mut [ParsedFile]) {
    gs.with_unfrozen_tables(|gs| {
        for file in files.iter_mut() {
            enter::enter_definitions(gs, file);
        }
        for file in files.iter_mut() {
            resolve::resolve_ancestry(gs, file);
        }
        resolve::finalize_linearizations(gs, files);
        for file in files.iter_mut() {
            resolve::resolve_sigs_and_bodies(gs, file);
        }
    });
    debug!(symbols = gs.symbols_used(), "resolution finished");
}
