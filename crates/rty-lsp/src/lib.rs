//! The editor service: a single-threaded cooperative loop that owns the
//! global state, plus a sidecar reader thread feeding the request queue.
//!
//! The main thread is the only writer to the state. It blocks in exactly one
//! place (the queue's condition variable), services merged edit batches
//! through the [`typecheck::Coordinator`], answers queries against the last
//! committed state, and publishes diagnostics. Slow-path work is bracketed
//! by operation notifications so the editor can show progress; the closing
//! notification is sent on every exit path.

pub mod protocol;
pub mod queries;
pub mod queue;
pub mod typecheck;

use once_cell::sync::Lazy;
use protocol::{IncomingMessage, MessageWriter, Position, TextDocumentPositionParams};
use queue::{Dequeued, MessageQueue};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};
use typecheck::Coordinator;

/// Server configuration from the driver.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    /// Worker pool cap for the slow path; `None` leaves rayon's default.
    pub max_threads: Option<usize>,
}

/// Run the server over arbitrary transports until the client disconnects or
/// sends `exit`. Returns the process exit code.
pub fn run_server(
    input: impl BufRead + Send + 'static,
    output: impl Write,
    options: ServerOptions,
) -> io::Result<i32> {
    if let Some(threads) = options.max_threads {
        // Build errors only when a global pool already exists, which is fine.
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global();
    }

    let queue = Arc::new(MessageQueue::new());
    let reader_queue = Arc::clone(&queue);
    let reader = std::thread::spawn(move || {
        let mut input = input;
        loop {
            match protocol::read_message(&mut input) {
                Ok(Some(message)) => reader_queue.push(message),
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "reader thread stopping");
                    break;
                }
            }
        }
        // Stream end or decode failure both raise the terminate flag.
        reader_queue.terminate();
    });

    let mut server = Server {
        coordinator: Coordinator::new(),
        writer: MessageWriter::new(output),
        shutdown_requested: false,
    };
    let code = server.serve(&queue)?;
    queue.terminate();
    let _ = reader.join();
    Ok(code)
}

/// The `initialize` result, shared across sessions.
static SERVER_CAPABILITIES: Lazy<Value> = Lazy::new(|| {
    json!({
        "capabilities": {
            "textDocumentSync": { "openClose": true, "change": 1 },
            "hoverProvider": true,
            "definitionProvider": true,
            "referencesProvider": true,
            "completionProvider": { "triggerCharacters": ["."] },
            "signatureHelpProvider": { "triggerCharacters": ["(", ","] },
            "documentSymbolProvider": true,
            "workspaceSymbolProvider": true,
            "codeActionProvider": true,
        },
        "serverInfo": { "name": "rty", "version": env!("CARGO_PKG_VERSION") },
    })
});

struct Server<W: Write> {
    coordinator: Coordinator,
    writer: MessageWriter<W>,
    shutdown_requested: bool,
}

impl<W: Write> Server<W> {
    fn serve(&mut self, queue: &MessageQueue) -> io::Result<i32> {
        loop {
            match queue.pop_blocking() {
                Dequeued::Terminated => return Ok(0),
                Dequeued::Edits(edit) => self.handle_edits(edit)?,
                Dequeued::Message { message, cancelled } => {
                    if cancelled {
                        if let Some(id) = &message.id {
                            self.writer.respond_error(
                                id,
                                protocol::REQUEST_CANCELLED,
                                "request was cancelled".to_string(),
                            )?;
                        }
                        continue;
                    }
                    if message.method == "exit" {
                        let code = if self.shutdown_requested { 0 } else { 1 };
                        return Ok(code);
                    }
                    self.handle_message(message)?;
                }
            }
        }
    }

    fn handle_edits(&mut self, edit: queue::WorkspaceEdit) -> io::Result<()> {
        info!(
            files = edit.files.len(),
            opens = edit.counts.opens,
            changes = edit.counts.changes,
            "processing edit batch"
        );
        // Operation markers bracket the work; the end marker must go out on
        // every path, so the run result is captured first.
        self.writer.notify(
            "rty/showOperation",
            json!({ "operationName": "typechecking", "status": "start" }),
        )?;
        let (run, published) = self.coordinator.apply_edit(&edit.files);
        let outcome = (|| -> io::Result<()> {
            for (uri, diagnostics) in published {
                let lsp_diags: Vec<protocol::LspDiagnostic> = diagnostics
                    .iter()
                    .filter_map(|diag| {
                        Some(protocol::LspDiagnostic {
                            range: queries::loc_to_range(&self.coordinator.gs, diag.loc)?,
                            severity: match diag.severity {
                                rty_core::Severity::Error => 1,
                                rty_core::Severity::Warning => 2,
                                rty_core::Severity::Information => 3,
                                rty_core::Severity::Hint => 4,
                            },
                            code: diag.code,
                            source: "rty",
                            message: diag.message.clone(),
                        })
                    })
                    .collect();
                self.writer.notify(
                    "textDocument/publishDiagnostics",
                    serde_json::to_value(protocol::PublishDiagnosticsParams {
                        uri,
                        diagnostics: lsp_diags,
                    })?,
                )?;
            }
            debug!(
                fast = run.took_fast_path,
                methods = run.methods_retypechecked,
                "typecheck run finished"
            );
            Ok(())
        })();
        self.writer.notify(
            "rty/showOperation",
            json!({ "operationName": "typechecking", "status": "end" }),
        )?;
        outcome
    }

    fn handle_message(&mut self, message: IncomingMessage) -> io::Result<()> {
        let Some(id) = message.id.clone() else {
            // Notifications with no handler are ignored by protocol.
            return Ok(());
        };
        match message.method.as_str() {
            "initialize" => self.writer.respond(&id, SERVER_CAPABILITIES.clone()),
            "shutdown" => {
                self.shutdown_requested = true;
                self.writer.respond(&id, Value::Null)
            }
            "textDocument/hover" => self.positional(&id, &message.params, queries::hover),
            "textDocument/definition" => {
                self.positional(&id, &message.params, queries::definition)
            }
            "textDocument/references" => {
                self.positional(&id, &message.params, queries::references)
            }
            "textDocument/completion" => {
                self.positional(&id, &message.params, queries::completion)
            }
            "textDocument/signatureHelp" => {
                self.positional(&id, &message.params, queries::signature_help)
            }
            "textDocument/documentSymbol" => {
                let uri = message
                    .params
                    .pointer("/textDocument/uri")
                    .and_then(Value::as_str);
                match uri {
                    Some(uri) => {
                        let result = queries::document_symbols(&self.coordinator, uri);
                        self.writer.respond(&id, result)
                    }
                    None => self.invalid_params(&id),
                }
            }
            "workspace/symbol" => {
                let query = message
                    .params
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let result = queries::workspace_symbols(&self.coordinator, query);
                self.writer.respond(&id, result)
            }
            "textDocument/codeAction" => self.writer.respond(&id, queries::code_actions()),
            other => {
                debug!(method = other, "unknown request method");
                self.writer.respond_error(
                    &id,
                    protocol::METHOD_NOT_FOUND,
                    format!("method `{other}` is not supported"),
                )
            }
        }
    }

    fn positional(
        &mut self,
        id: &Value,
        params: &Value,
        query: impl Fn(&Coordinator, &str, Position) -> Value,
    ) -> io::Result<()> {
        match serde_json::from_value::<TextDocumentPositionParams>(params.clone()) {
            Ok(params) => {
                let result = query(
                    &self.coordinator,
                    &params.text_document.uri,
                    params.position,
                );
                self.writer.respond(id, result)
            }
            Err(_) => self.invalid_params(id),
        }
    }

    fn invalid_params(&mut self, id: &Value) -> io::Result<()> {
        self.writer
            .respond_error(id, protocol::INVALID_PARAMS, "invalid parameters".to_string())
    }
}

#[cfg(test)]
#[path = "tests/server.rs"]
mod server_tests;
