//! Payload snapshots.
//!
//! A payload is an opaque serialized image of the global state's three
//! tables. The format is versioned; only round-trip compatibility within one
//! version is promised. Deserializing rebuilds the dedup indexes, which are
//! derived data and not part of the image.

use crate::files::File;
use crate::global_state::GlobalState;
use crate::names::NameData;
use crate::symbols::Symbol;
use serde::{Deserialize, Serialize};

const PAYLOAD_VERSION: u32 = 4;

#[derive(Debug)]
pub enum PayloadError {
    VersionMismatch { found: u32, expected: u32 },
    Malformed(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::VersionMismatch { found, expected } => {
                write!(f, "payload version {found}, this build reads {expected}")
            }
            PayloadError::Malformed(msg) => write!(f, "malformed payload: {msg}"),
        }
    }
}

impl std::error::Error for PayloadError {}

#[derive(Serialize, Deserialize)]
struct PayloadImage {
    version: u32,
    names: Vec<NameData>,
    symbols: Vec<Symbol>,
    files: Vec<File>,
}

/// Serialize the state's tables into a single byte stream.
pub fn serialize(gs: &GlobalState) -> Vec<u8> {
    gs.sanity_check();
    let image = PayloadImage {
        version: PAYLOAD_VERSION,
        names: gs.raw_names().to_vec(),
        symbols: gs.raw_symbols().to_vec(),
        files: gs.raw_files().to_vec(),
    };
    serde_json::to_vec(&image).expect("payload serialization cannot fail")
}

/// Rebuild a global state from a payload produced by `serialize`.
pub fn deserialize(bytes: &[u8]) -> Result<GlobalState, PayloadError> {
    let image: PayloadImage =
        serde_json::from_slice(bytes).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    if image.version != PAYLOAD_VERSION {
        return Err(PayloadError::VersionMismatch {
            found: image.version,
            expected: PAYLOAD_VERSION,
        });
    }
    let gs = GlobalState::from_payload_tables(image.names, image.symbols, image.files)
        .map_err(PayloadError::Malformed)?;
    gs.sanity_check();
    Ok(gs)
}

#[cfg(test)]
#[path = "tests/payload.rs"]
mod tests;
