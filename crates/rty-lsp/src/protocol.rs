//! JSON-RPC message types and the Content-Length framing codec.
//!
//! Frames are `Content-Length: N\r\n\r\n<N bytes of UTF-8 JSON>`. The codec
//! is transport-agnostic: the reader thread drives `read_message` over stdin
//! (or any `BufRead`), the main loop writes responses through
//! `MessageWriter`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const REQUEST_CANCELLED: i64 = -32800;

/// A decoded incoming message: request (has an id) or notification.
#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl IncomingMessage {
    pub fn is_request(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Serialize)]
struct OutgoingResponse<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

#[derive(Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

#[derive(Serialize)]
struct OutgoingNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

/// Read one framed message. `Ok(None)` is a clean end of stream.
pub fn read_message(input: &mut impl BufRead) -> io::Result<Option<IncomingMessage>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = input.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
        // Other headers (Content-Type) are tolerated and ignored.
    }
    let len = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "frame without Content-Length")
    })?;
    let mut body = vec![0u8; len];
    input.read_exact(&mut body)?;
    let message: IncomingMessage = serde_json::from_slice(&body)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(message))
}

/// Frame-writing half, owned by the main loop.
pub struct MessageWriter<W: Write> {
    out: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(out: W) -> Self {
        MessageWriter { out }
    }

    fn write_frame(&mut self, body: &[u8]) -> io::Result<()> {
        write!(self.out, "Content-Length: {}\r\n\r\n", body.len())?;
        self.out.write_all(body)?;
        self.out.flush()
    }

    pub fn respond(&mut self, id: &Value, result: Value) -> io::Result<()> {
        let body = serde_json::to_vec(&OutgoingResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        })?;
        self.write_frame(&body)
    }

    pub fn respond_error(&mut self, id: &Value, code: i64, message: String) -> io::Result<()> {
        let body = serde_json::to_vec(&OutgoingResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ResponseError { code, message }),
        })?;
        self.write_frame(&body)
    }

    pub fn notify(&mut self, method: &str, params: Value) -> io::Result<()> {
        let body = serde_json::to_vec(&OutgoingNotification {
            jsonrpc: "2.0",
            method,
            params,
        })?;
        self.write_frame(&body)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// =============================================================================
// Common protocol payloads
// =============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    /// Zero-based, per the editor protocol.
    pub line: u32,
    pub character: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextDocumentPositionParams {
    #[serde(rename = "textDocument")]
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

#[derive(Serialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LspDiagnostic {
    pub range: Range,
    pub severity: u8,
    pub code: u16,
    pub source: &'static str,
    pub message: String,
}

#[cfg(test)]
#[path = "tests/protocol.rs"]
mod tests;
