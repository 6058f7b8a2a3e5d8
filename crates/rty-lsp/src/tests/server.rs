//! End-to-end server sessions over in-memory transports.

use crate::{run_server, ServerOptions};
use serde_json::{json, Value};
use std::io::Cursor;

fn frame_into(bytes: &mut Vec<u8>, value: Value) {
    let body = serde_json::to_vec(&value).unwrap();
    bytes.extend(format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes());
    bytes.extend(body);
}

/// Split framed server output back into JSON values.
fn parse_frames(mut bytes: &[u8]) -> Vec<Value> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let text = std::str::from_utf8(bytes).unwrap();
        let header_end = text.find("\r\n\r\n").expect("frame header");
        let len: usize = text[..header_end]
            .strip_prefix("Content-Length: ")
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let body_start = header_end + 4;
        let body = &bytes[body_start..body_start + len];
        out.push(serde_json::from_slice(body).unwrap());
        bytes = &bytes[body_start + len..];
    }
    out
}

const SOURCE: &str = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x + x\n  end\nend\n";

fn session(messages: Vec<Value>) -> (i32, Vec<Value>) {
    let mut input = Vec::new();
    for message in messages {
        frame_into(&mut input, message);
    }
    let mut output = Vec::new();
    let code = run_server(
        Cursor::new(input),
        &mut output,
        ServerOptions::default(),
    )
    .expect("server io");
    (code, parse_frames(&output))
}

fn response_for<'v>(frames: &'v [Value], id: u64) -> &'v Value {
    frames
        .iter()
        .find(|f| f.get("id") == Some(&json!(id)))
        .unwrap_or_else(|| panic!("no response for id {id} in {frames:?}"))
}

fn notifications<'v>(frames: &'v [Value], method: &str) -> Vec<&'v Value> {
    frames
        .iter()
        .filter(|f| f.get("method").and_then(Value::as_str) == Some(method))
        .collect()
}

#[test]
fn initialize_open_hover_shutdown() {
    let (code, frames) = session(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "initialized", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
               "params": {"textDocument": {"uri": "calc.rb", "text": SOURCE}}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "textDocument/hover",
               "params": {"textDocument": {"uri": "calc.rb"},
                          "position": {"line": 4, "character": 4}}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "shutdown", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "exit", "params": {}}),
    ]);
    assert_eq!(code, 0);

    let init = response_for(&frames, 1);
    assert!(init.pointer("/result/capabilities/hoverProvider").is_some());

    // Diagnostics published for the opened file (none: the file is clean).
    let published = notifications(&frames, "textDocument/publishDiagnostics");
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].pointer("/params/uri").and_then(Value::as_str),
        Some("calc.rb")
    );
    assert_eq!(
        published[0]
            .pointer("/params/diagnostics")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(0)
    );

    // Operation markers opened and closed.
    let operations = notifications(&frames, "rty/showOperation");
    assert_eq!(operations.len(), 2);

    // Hover over `x + x` reports Integer.
    let hover = response_for(&frames, 2);
    let contents = hover
        .pointer("/result/contents/value")
        .and_then(Value::as_str)
        .unwrap_or_default();
    assert!(contents.contains("Integer"), "hover said: {contents}");
}

#[test]
fn diagnostics_flow_for_broken_code() {
    let broken = "# typed: true\nclass Calc\n  sig { params(x: Integer).returns(Integer) }\n  def double(x)\n    x + 'two'\n  end\nend\n";
    let (_, frames) = session(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
               "params": {"textDocument": {"uri": "calc.rb", "text": broken}}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "exit", "params": {}}),
    ]);
    let published = notifications(&frames, "textDocument/publishDiagnostics");
    assert_eq!(published.len(), 1);
    let diags = published[0]
        .pointer("/params/diagnostics")
        .and_then(Value::as_array)
        .unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(
        diags[0].get("message").and_then(Value::as_str),
        Some("expected `Integer`, got `String`")
    );
}

#[test]
fn unknown_method_gets_method_not_found() {
    let (_, frames) = session(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "textDocument/rename", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "shutdown", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "exit", "params": {}}),
    ]);
    let reply = response_for(&frames, 2);
    assert_eq!(
        reply.pointer("/error/code").and_then(Value::as_i64),
        Some(crate::protocol::METHOD_NOT_FOUND)
    );
}

#[test]
fn invalid_params_do_not_disturb_the_server() {
    let (code, frames) = session(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "textDocument/hover", "params": {"bogus": 1}}),
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
               "params": {"textDocument": {"uri": "a.rb", "text": "# typed: true\n"}}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "shutdown", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "exit", "params": {}}),
    ]);
    assert_eq!(code, 0);
    let reply = response_for(&frames, 2);
    assert_eq!(
        reply.pointer("/error/code").and_then(Value::as_i64),
        Some(crate::protocol::INVALID_PARAMS)
    );
    // The edit after the bad request still typechecks and publishes.
    assert_eq!(
        notifications(&frames, "textDocument/publishDiagnostics").len(),
        1
    );
}

#[test]
fn definition_and_document_symbols() {
    let source = "# typed: true\nclass Greeter\n  sig { returns(String) }\n  def hello\n    'hi'\n  end\nend\nclass App\n  sig { params(g: Greeter).returns(String) }\n  def run(g)\n    g.hello\n  end\nend\n";
    let (_, frames) = session(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
               "params": {"textDocument": {"uri": "app.rb", "text": source}}}),
        // `g.hello` is on line 10 (0-based), `hello` starts at character 6.
        json!({"jsonrpc": "2.0", "id": 2, "method": "textDocument/definition",
               "params": {"textDocument": {"uri": "app.rb"},
                          "position": {"line": 10, "character": 7}}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "textDocument/documentSymbol",
               "params": {"textDocument": {"uri": "app.rb"}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "shutdown", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "exit", "params": {}}),
    ]);

    let definition = response_for(&frames, 2);
    let locations = definition
        .pointer("/result")
        .and_then(Value::as_array)
        .expect("definition locations");
    assert_eq!(locations.len(), 1);
    // Points into the `hello` definition near the top of the file.
    let line = locations[0]
        .pointer("/range/start/line")
        .and_then(Value::as_u64)
        .unwrap();
    assert!(line <= 4, "definition points at line {line}");

    let symbols = response_for(&frames, 3);
    let names: Vec<&str> = symbols
        .pointer("/result")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .filter_map(|s| s.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["Greeter", "App"]);
}
