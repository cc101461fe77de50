//! Typed lifecycle event stream.
//!
//! The execution engine emits one [`EventKind`] per lifecycle transition. A UI
//! collaborator (out of scope here) and `tracing` are two different
//! consumers of the same lifecycle facts, not two sources of truth — both
//! subscribe through the same [`EventEmitter`] trait, so the engine itself
//! never special-cases either one.

use serde::Serialize;
use serde_json::Value;

use crate::context::ActionKey;

/// One lifecycle transition for a single node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    MarkRunning { key: ActionKey },
    MarkDone { key: ActionKey, returns: std::collections::HashMap<String, Value> },
    MarkFailed { key: ActionKey, reason: String },
    MarkRestored { key: ActionKey },
    UpdateOutputSizes { key: ActionKey, stdout_bytes: u64, stderr_bytes: u64 },
}

impl EventKind {
    pub fn key(&self) -> &ActionKey {
        match self {
            EventKind::MarkRunning { key }
            | EventKind::MarkDone { key, .. }
            | EventKind::MarkFailed { key, .. }
            | EventKind::MarkRestored { key }
            | EventKind::UpdateOutputSizes { key, .. } => key,
        }
    }
}

/// Receiver of lifecycle events. Implementations must not block the engine —
/// a UI emitter should hand events off to a channel rather than render inline.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: EventKind);
}

/// Discards every event. The default when no collaborator has subscribed.
#[derive(Debug, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: EventKind) {}
}

/// Forwards every event to `tracing`, for operators watching engine logs
/// rather than a UI.
#[derive(Debug, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: EventKind) {
        match event {
            EventKind::MarkRunning { key } => {
                tracing::info!(action = %key.label(), "running");
            }
            EventKind::MarkDone { key, returns } => {
                tracing::info!(action = %key.label(), return_count = returns.len(), "done");
            }
            EventKind::MarkFailed { key, reason } => {
                tracing::error!(action = %key.label(), %reason, "failed");
            }
            EventKind::MarkRestored { key } => {
                tracing::info!(action = %key.label(), "restored");
            }
            EventKind::UpdateOutputSizes { key, stdout_bytes, stderr_bytes } => {
                tracing::debug!(action = %key.label(), stdout_bytes, stderr_bytes, "output sizes updated");
            }
        }
    }
}

/// Broadcasts to every registered emitter, so a run can feed both the UI
/// channel and `tracing` without the engine knowing either exists.
#[derive(Default)]
pub struct EventBus {
    emitters: Vec<Box<dyn EventEmitter>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, emitter: Box<dyn EventEmitter>) {
        self.emitters.push(emitter);
    }

    pub fn emit(&self, event: EventKind) {
        for emitter in &self.emitters {
            emitter.emit(event.clone());
        }
    }
}
