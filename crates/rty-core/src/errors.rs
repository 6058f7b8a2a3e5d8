//! Diagnostics and the per-state error buffer.
//!
//! Errors are buffered in the owning `GlobalState` as they are produced and
//! drained at phase boundaries. Draining sorts per file and applies the
//! file's strictness level: a diagnostic is dropped when its class's floor is
//! above the file's declared level.

use crate::files::StrictnessLevel;
use crate::loc::Loc;
use serde::{Deserialize, Serialize};

/// A stable error class: numeric code plus the minimum strictness at which
/// files report it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorClass {
    pub code: u16,
    pub floor: StrictnessLevel,
}

const fn class(code: u16, floor: StrictnessLevel) -> ErrorClass {
    ErrorClass { code, floor }
}

/// Parser errors: 2xxx.
pub mod parser {
    use super::*;
    pub const SYNTAX_ERROR: ErrorClass = class(2001, StrictnessLevel::False);
}

/// Resolver errors: 5xxx.
pub mod resolver {
    use super::*;
    pub const UNRESOLVED_CONSTANT: ErrorClass = class(5001, StrictnessLevel::False);
    pub const REDEFINITION_MISMATCH: ErrorClass = class(5002, StrictnessLevel::False);
    pub const SIG_WITHOUT_METHOD: ErrorClass = class(5008, StrictnessLevel::False);
    pub const INVALID_SIG_BUILDER: ErrorClass = class(5009, StrictnessLevel::False);
    pub const CYCLIC_ANCESTRY: ErrorClass = class(5014, StrictnessLevel::False);
    pub const SIG_REQUIRED: ErrorClass = class(5021, StrictnessLevel::Strict);
}

/// CFG construction errors: 6xxx.
pub mod cfg {
    use super::*;
    pub const UNDECLARED_VARIABLE: ErrorClass = class(6002, StrictnessLevel::True);
    pub const UNREACHABLE_CODE: ErrorClass = class(6004, StrictnessLevel::True);
    pub const RETURN_IN_VOID: ErrorClass = class(6005, StrictnessLevel::True);
    pub const UNSUPPORTED_NODE: ErrorClass = class(6007, StrictnessLevel::False);
}

/// Inference errors: 7xxx.
pub mod infer {
    use super::*;
    pub const METHOD_DOES_NOT_EXIST: ErrorClass = class(7003, StrictnessLevel::True);
    pub const ARGUMENT_COUNT_MISMATCH: ErrorClass = class(7004, StrictnessLevel::True);
    pub const ARGUMENT_TYPE_MISMATCH: ErrorClass = class(7002, StrictnessLevel::True);
    pub const RETURN_TYPE_MISMATCH: ErrorClass = class(7005, StrictnessLevel::True);
    pub const CAST_TYPE_MISMATCH: ErrorClass = class(7007, StrictnessLevel::True);
    pub const NOT_EXHAUSTIVE: ErrorClass = class(7026, StrictnessLevel::True);
    pub const PRIVATE_METHOD_CALL: ErrorClass = class(7031, StrictnessLevel::True);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// One reported diagnostic. Ordering is (file, begin, end, code) so a drained
/// batch sorts deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub loc: Loc,
    pub code: u16,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(loc: Loc, what: ErrorClass, message: String) -> Self {
        Diagnostic {
            loc,
            code: what.code,
            severity: Severity::Error,
            message,
        }
    }

    fn sort_key(&self) -> (u16, u32, u32, u16) {
        (
            self.loc.file().id(),
            self.loc.begin(),
            self.loc.end(),
            self.code,
        )
    }
}

/// Buffer of not-yet-drained diagnostics, owned by a `GlobalState`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorQueue {
    buffered: Vec<(Diagnostic, ErrorClassFloor)>,
}

/// The floor travels with the buffered diagnostic so draining can filter
/// without a code→class lookup table.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct ErrorClassFloor(StrictnessLevel);

impl ErrorQueue {
    pub fn push(&mut self, what: ErrorClass, diag: Diagnostic) {
        self.buffered.push((diag, ErrorClassFloor(what.floor)));
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    /// Drain everything buffered, dropping diagnostics suppressed by their
    /// file's strictness and sorting the survivors per file.
    pub fn drain(
        &mut self,
        file_level: impl Fn(crate::files::FileRef) -> StrictnessLevel,
    ) -> Vec<Diagnostic> {
        let mut out: Vec<Diagnostic> = self
            .buffered
            .drain(..)
            .filter(|(diag, floor)| {
                let level = file_level(diag.loc.file());
                level != StrictnessLevel::Ignore && level >= floor.0
            })
            .map(|(diag, _)| diag)
            .collect();
        out.sort_by_key(Diagnostic::sort_key);
        out
    }

    /// Drop buffered diagnostics for the given files only. Used when a run is
    /// cancelled mid-phase: finished files keep their results, unfinished
    /// files' partial errors are discarded.
    pub fn discard_for_files(&mut self, files: &[crate::files::FileRef]) {
        self.buffered
            .retain(|(diag, _)| !files.contains(&diag.loc.file()));
    }

    /// Move everything buffered in `other` into this queue, floors intact.
    /// Used when worker-local states are joined into the commit state.
    pub fn absorb(&mut self, other: &mut ErrorQueue) {
        self.buffered.append(&mut other.buffered);
    }
}

#[cfg(test)]
#[path = "tests/errors.rs"]
mod tests;
