use super::*;
use std::io::Cursor;

fn frame(body: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

#[test]
fn reads_a_framed_message() {
    let bytes = frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
    let mut input = Cursor::new(bytes);
    let message = read_message(&mut input).unwrap().unwrap();
    assert!(message.is_request());
    assert_eq!(message.method, "initialize");
    assert_eq!(message.id, Some(serde_json::json!(1)));
}

#[test]
fn reads_notifications_without_id() {
    let bytes = frame(r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#);
    let mut input = Cursor::new(bytes);
    let message = read_message(&mut input).unwrap().unwrap();
    assert!(!message.is_request());
}

#[test]
fn eof_is_a_clean_none() {
    let mut input = Cursor::new(Vec::<u8>::new());
    assert!(read_message(&mut input).unwrap().is_none());
}

#[test]
fn missing_content_length_is_an_error() {
    let mut input = Cursor::new(b"X-Whatever: 3\r\n\r\nabc".to_vec());
    assert!(read_message(&mut input).is_err());
}

#[test]
fn tolerates_extra_headers() {
    let body = r#"{"jsonrpc":"2.0","method":"x","params":null}"#;
    let bytes = format!(
        "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc\r\n\r\n{}",
        body.len(),
        body
    );
    let mut input = Cursor::new(bytes.into_bytes());
    let message = read_message(&mut input).unwrap().unwrap();
    assert_eq!(message.method, "x");
}

#[test]
fn writer_emits_parseable_frames() {
    let mut writer = MessageWriter::new(Vec::new());
    writer
        .respond(&serde_json::json!(7), serde_json::json!({"ok": true}))
        .unwrap();
    writer
        .notify("window/showMessage", serde_json::json!({"message": "hi"}))
        .unwrap();
    let bytes = writer.into_inner();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("Content-Length: "));
    assert!(text.contains(r#""id":7"#));
    assert!(text.contains("window/showMessage"));
}

#[test]
fn two_messages_back_to_back() {
    let mut bytes = frame(r#"{"jsonrpc":"2.0","method":"a","params":{}}"#);
    bytes.extend(frame(r#"{"jsonrpc":"2.0","method":"b","params":{}}"#));
    let mut input = Cursor::new(bytes);
    assert_eq!(read_message(&mut input).unwrap().unwrap().method, "a");
    assert_eq!(read_message(&mut input).unwrap().unwrap().method, "b");
    assert!(read_message(&mut input).unwrap().is_none());
}
