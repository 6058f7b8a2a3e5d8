//! Source locations.
//!
//! A `Loc` is a `(file, begin, end)` triple packed into a single `u64`:
//! 16 bits of file id and 24 bits for each byte offset. The all-ones offset
//! pair is the "no location" sentinel. Locs are cheap to copy and hash and
//! every diagnostic carries one.

use crate::files::FileRef;
use crate::global_state::GlobalState;
use serde::{Deserialize, Serialize};

const POS_BITS: u32 = 24;
const POS_MASK: u64 = (1 << POS_BITS) - 1;

/// Largest representable byte offset; doubles as the "absent" sentinel.
pub const LOC_SENTINEL: u32 = POS_MASK as u32;

/// A range of bytes within one file, or the `none` sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Loc(u64);

impl Default for Loc {
    fn default() -> Self {
        Loc::none(FileRef::from_raw(0))
    }
}

/// A 1-based line/column pair, derived from a `Loc` against file contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocDetail {
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub fn new(file: FileRef, begin: u32, end: u32) -> Self {
        debug_assert!(begin <= end, "loc begin {begin} > end {end}");
        debug_assert!(end <= LOC_SENTINEL);
        Loc((u64::from(file.id()) << (2 * POS_BITS))
            | (u64::from(begin) << POS_BITS)
            | u64::from(end))
    }

    /// The "no location" value for the given file (or no file at all).
    pub fn none(file: FileRef) -> Self {
        Loc((u64::from(file.id()) << (2 * POS_BITS)) | (POS_MASK << POS_BITS) | POS_MASK)
    }

    #[inline]
    pub fn file(self) -> FileRef {
        FileRef::from_raw((self.0 >> (2 * POS_BITS)) as u16)
    }

    #[inline]
    pub fn begin(self) -> u32 {
        ((self.0 >> POS_BITS) & POS_MASK) as u32
    }

    #[inline]
    pub fn end(self) -> u32 {
        (self.0 & POS_MASK) as u32
    }

    #[inline]
    pub fn exists(self) -> bool {
        self.begin() != LOC_SENTINEL && self.end() != LOC_SENTINEL
    }

    /// Interval union. Both locations must be in the same file; a nonexistent
    /// side yields the other.
    pub fn join(self, other: Loc) -> Loc {
        if !self.exists() {
            return other;
        }
        if !other.exists() {
            return self;
        }
        assert_eq!(self.file(), other.file(), "joining locs across files");
        Loc::new(
            self.file(),
            self.begin().min(other.begin()),
            self.end().max(other.end()),
        )
    }

    pub fn contains(self, other: Loc) -> bool {
        self.exists()
            && other.exists()
            && self.file() == other.file()
            && self.begin() <= other.begin()
            && other.end() <= self.end()
    }

    pub fn contains_offset(self, offset: u32) -> bool {
        self.exists() && self.begin() <= offset && offset < self.end().max(self.begin() + 1)
    }

    /// Zero-length loc at this loc's begin.
    pub fn copy_with_zero_length(self) -> Loc {
        if !self.exists() {
            return self;
        }
        Loc::new(self.file(), self.begin(), self.begin())
    }

    /// Line/column pair for both endpoints, against the file's contents.
    pub fn position(self, gs: &GlobalState) -> Option<(LocDetail, LocDetail)> {
        if !self.exists() {
            return None;
        }
        let file = gs.file_data(self.file());
        Some((
            file.offset_to_pos(self.begin()),
            file.offset_to_pos(self.end()),
        ))
    }

    /// The source text this loc covers.
    pub fn source<'gs>(self, gs: &'gs GlobalState) -> Option<&'gs str> {
        if !self.exists() {
            return None;
        }
        let file = gs.file_data(self.file());
        file.source().get(self.begin() as usize..self.end() as usize)
    }

    pub fn file_pos_to_string(self, gs: &GlobalState) -> String {
        let path = gs.file_data(self.file()).path();
        match self.position(gs) {
            Some((begin, _)) => format!("{}:{}:{}", path, begin.line, begin.column),
            None => format!("{path}:??"),
        }
    }
}

impl std::fmt::Debug for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exists() {
            write!(f, "Loc(file={}, {}..{})", self.file().id(), self.begin(), self.end())
        } else {
            write!(f, "Loc(file={}, none)", self.file().id())
        }
    }
}

#[cfg(test)]
#[path = "tests/loc.rs"]
mod tests;
