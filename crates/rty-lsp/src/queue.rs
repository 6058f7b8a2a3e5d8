//! The shared request queue.
//!
//! One reader thread enqueues decoded messages; the main thread blocks on
//! the condition variable `(terminate ∨ (¬paused ∧ nonempty))` and drains.
//! Cancellation requests are satisfied at enqueue time by marking the target
//! request; cancellations that arrive after their target started are
//! silently dropped. Popping merges a leading run of edit messages —
//! possibly separated only by delayable non-edits — into one
//! `WorkspaceEdit` with final per-file contents.

use crate::protocol::IncomingMessage;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Methods that mutate the workspace; candidates for merging.
fn is_edit(method: &str) -> bool {
    matches!(
        method,
        "textDocument/didOpen"
            | "textDocument/didChange"
            | "textDocument/didClose"
            | "rty/watchmanFileChange"
    )
}

/// Messages that observe no state and may be reordered past edits.
fn is_delayable(method: &str) -> bool {
    matches!(
        method,
        "initialized" | "workspace/didChangeConfiguration" | "$/setTrace"
    )
}

/// Running totals per edit kind, part of the merged edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditCounts {
    pub opens: u32,
    pub changes: u32,
    pub closes: u32,
    pub watchman: u32,
}

/// A coalesced batch of edits: the final contents per file.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceEdit {
    /// `None` marks a close (the file stays checkable with its last known
    /// contents; the slot records that the editor no longer owns it).
    pub files: Vec<(String, Option<String>)>,
    pub counts: EditCounts,
}

impl WorkspaceEdit {
    fn absorb(&mut self, method: &str, params: &serde_json::Value) {
        let uri = params
            .pointer("/textDocument/uri")
            .or_else(|| params.pointer("/uri"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        match method {
            "textDocument/didOpen" => {
                self.counts.opens += 1;
                let text = params
                    .pointer("/textDocument/text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.set(uri, Some(text));
            }
            "textDocument/didChange" => {
                self.counts.changes += 1;
                // Full-sync: the last content change wins.
                let text = params
                    .pointer("/contentChanges")
                    .and_then(|v| v.as_array())
                    .and_then(|a| a.last())
                    .and_then(|c| c.get("text"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.set(uri, Some(text));
            }
            "textDocument/didClose" => {
                self.counts.closes += 1;
                self.set(uri, None);
            }
            "rty/watchmanFileChange" => {
                self.counts.watchman += 1;
                let text = params
                    .pointer("/text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.set(uri, Some(text));
            }
            _ => {}
        }
    }

    fn set(&mut self, uri: String, contents: Option<String>) {
        if let Some(slot) = self.files.iter_mut().find(|(u, _)| *u == uri) {
            slot.1 = contents;
        } else {
            self.files.push((uri, contents));
        }
    }
}

/// What the main loop receives from the queue.
#[derive(Debug)]
pub enum Dequeued {
    /// A coalesced edit batch.
    Edits(WorkspaceEdit),
    /// A single non-edit message; `cancelled` requests get an error reply
    /// without running.
    Message {
        message: IncomingMessage,
        cancelled: bool,
    },
    /// Terminate flag was raised and the queue is drained.
    Terminated,
}

struct QueueInner {
    messages: VecDeque<(IncomingMessage, bool)>,
    terminate: bool,
    paused: bool,
    counters: FxHashMap<&'static str, u64>,
}

pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl Default for MessageQueue {
    fn default() -> Self {
        MessageQueue::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue {
            inner: Mutex::new(QueueInner {
                messages: VecDeque::new(),
                terminate: false,
                paused: false,
                counters: FxHashMap::default(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Enqueue one decoded message. `$/cancelRequest` is consumed here:
    /// it marks its queued target instead of being queued itself.
    pub fn push(&self, message: IncomingMessage) {
        let mut inner = self.inner.lock().unwrap();
        if message.method == "$/cancelRequest" {
            let target = message.params.get("id").cloned();
            let mut hit = false;
            if let Some(target) = target {
                for (queued, cancelled) in inner.messages.iter_mut() {
                    if queued.id.as_ref() == Some(&target) {
                        *cancelled = true;
                        hit = true;
                        break;
                    }
                }
            }
            let key = if hit { "cancel.hit" } else { "cancel.late" };
            *inner.counters.entry(key).or_insert(0) += 1;
            drop(inner);
            self.cond.notify_one();
            return;
        }
        *inner.counters.entry("messages.enqueued").or_insert(0) += 1;
        inner.messages.push_back((message, false));
        drop(inner);
        self.cond.notify_one();
    }

    /// Merge a batch of counter samples under the queue mutex (worker
    /// threads batch locally and drain here).
    pub fn merge_counters(&self, samples: &[(&'static str, u64)]) {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in samples {
            *inner.counters.entry(key).or_insert(0) += value;
        }
    }

    pub fn counter(&self, key: &str) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.counters.get(key).copied().unwrap_or(0)
    }

    pub fn terminate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.terminate = true;
        drop(inner);
        self.cond.notify_all();
    }

    pub fn set_paused(&self, paused: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.paused = paused;
        drop(inner);
        self.cond.notify_all();
    }

    /// Block until there is work, merging leading edits. This is the main
    /// thread's only blocking point.
    pub fn pop_blocking(&self) -> Dequeued {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.terminate && inner.messages.is_empty() {
                return Dequeued::Terminated;
            }
            if !inner.paused && !inner.messages.is_empty() {
                break;
            }
            if inner.terminate {
                return Dequeued::Terminated;
            }
            inner = self.cond.wait(inner).unwrap();
        }

        // Merge a leading run of edits, hopping over delayable messages.
        let front_is_edit = inner
            .messages
            .front()
            .is_some_and(|(m, _)| is_edit(&m.method));
        if front_is_edit {
            let mut edit = WorkspaceEdit::default();
            let mut kept: VecDeque<(IncomingMessage, bool)> = VecDeque::new();
            while let Some((message, cancelled)) = inner.messages.pop_front() {
                if is_edit(&message.method) {
                    edit.absorb(&message.method, &message.params);
                } else if is_delayable(&message.method) {
                    kept.push_back((message, cancelled));
                } else {
                    inner.messages.push_front((message, cancelled));
                    break;
                }
            }
            // Delayable messages run after the merged edit, in order.
            while let Some(entry) = kept.pop_back() {
                inner.messages.push_front(entry);
            }
            return Dequeued::Edits(edit);
        }

        let (message, cancelled) = inner.messages.pop_front().expect("checked non-empty");
        Dequeued::Message { message, cancelled }
    }
}

#[cfg(test)]
#[path = "tests/queue.rs"]
mod tests;
