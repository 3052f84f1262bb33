// ─── Progress Reporting ───
// The engine only emits events; rendering belongs to the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Identifier handed out by a sink when a task is registered.
pub type TaskId = u64;

/// Receiver of transfer progress events.
///
/// Events for one task arrive in order (register, advance..., complete) but
/// interleave freely across concurrent tasks.
pub trait ProgressSink: Send + Sync {
    fn register(&self, name: &str, total_bytes: u64) -> TaskId;
    fn advance(&self, task: TaskId, delta_bytes: u64);
    fn complete(&self, task: TaskId);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopProgress {
    next_id: AtomicU64,
}

impl ProgressSink for NoopProgress {
    fn register(&self, _name: &str, _total_bytes: u64) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn advance(&self, _task: TaskId, _delta_bytes: u64) {}

    fn complete(&self, _task: TaskId) {}
}

/// Reports progress through `tracing` at debug level.
#[derive(Debug, Default)]
pub struct LogProgress {
    next_id: AtomicU64,
}

impl ProgressSink for LogProgress {
    fn register(&self, name: &str, total_bytes: u64) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] {} ({} bytes)", id, name, total_bytes);
        id
    }

    fn advance(&self, _task: TaskId, _delta_bytes: u64) {}

    fn complete(&self, task: TaskId) {
        debug!("[{}] finished", task);
    }
}
