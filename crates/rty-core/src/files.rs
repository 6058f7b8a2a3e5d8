//! The file table.
//!
//! Files are interned by path. A file that is removed from the workspace is
//! tombstoned: its id stays allocated (locs may still reference it) but it
//! leaves the set of live files.

use crate::loc::LocDetail;
use serde::{Deserialize, Serialize};

/// Index into the global state's file table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRef(pub u16);

impl FileRef {
    #[inline]
    pub const fn id(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_raw(id: u16) -> Self {
        FileRef(id)
    }
}

/// Where a file's contents came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Registered but not yet read from disk.
    NotYetRead,
    /// An ordinary workspace file.
    Normal,
    /// Restored from a serialized payload snapshot.
    Payload,
    /// Part of the synthetic standard library.
    Stdlib,
    /// Deleted; the id remains allocated.
    TombStone,
}

/// Per-file diagnostic strictness, from the `# typed:` sigil.
///
/// Ordering matters: a diagnostic is emitted only when the file's level is at
/// or above the diagnostic's floor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrictnessLevel {
    /// Do not even report parse errors.
    Ignore,
    False,
    True,
    Strict,
    Strong,
}

impl StrictnessLevel {
    pub fn from_sigil(text: &str) -> Option<StrictnessLevel> {
        match text {
            "ignore" => Some(StrictnessLevel::Ignore),
            "false" => Some(StrictnessLevel::False),
            "true" => Some(StrictnessLevel::True),
            "strict" => Some(StrictnessLevel::Strict),
            "strong" => Some(StrictnessLevel::Strong),
            _ => None,
        }
    }
}

/// One entry of the file table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    path: String,
    source: String,
    pub source_type: SourceType,
    /// Declared `# typed:` level; `None` means no sigil was found.
    pub strictness: Option<StrictnessLevel>,
    /// Byte offsets of line starts, for offset/position conversion.
    line_starts: Vec<u32>,
}

impl File {
    pub fn new(path: String, source: String, source_type: SourceType) -> Self {
        let strictness = parse_typed_sigil(&source);
        let line_starts = compute_line_starts(&source);
        File {
            path,
            source,
            source_type,
            strictness,
            line_starts,
        }
    }

    pub fn tombstone(path: String) -> Self {
        File {
            path,
            source: String::new(),
            source_type: SourceType::TombStone,
            strictness: None,
            line_starts: vec![0],
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Effective strictness: files without a sigil default to `false`.
    pub fn min_error_level(&self) -> StrictnessLevel {
        self.strictness.unwrap_or(StrictnessLevel::False)
    }

    pub fn is_tombstoned(&self) -> bool {
        self.source_type == SourceType::TombStone
    }

    /// Convert a byte offset to a 1-based line/column pair.
    pub fn offset_to_pos(&self, offset: u32) -> LocDetail {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        LocDetail {
            line: line_idx as u32 + 1,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// Convert a 1-based line/column pair back to a byte offset.
    pub fn pos_to_offset(&self, pos: LocDetail) -> Option<u32> {
        let line_start = *self.line_starts.get(pos.line.checked_sub(1)? as usize)?;
        let offset = line_start + pos.column.checked_sub(1)?;
        (offset as usize <= self.source.len()).then_some(offset)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

fn compute_line_starts(source: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}

/// Scan leading comment lines for a `# typed:` sigil.
fn parse_typed_sigil(source: &str) -> Option<StrictnessLevel> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            // Sigils are only honored in the leading comment block.
            return None;
        }
        if let Some(rest) = trimmed.strip_prefix("# typed:") {
            return StrictnessLevel::from_sigil(rest.trim());
        }
    }
    None
}

#[cfg(test)]
#[path = "tests/files.rs"]
mod tests;
