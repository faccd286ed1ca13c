use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Lifecycle events pushed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskQueued,
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    ScanProgress,
    ScanCompleted,
    ScanFailed,
    MacroStarted,
    MacroProgress,
    MacroCompleted,
    MacroFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskQueued => "task_queued",
            EventKind::TaskStarted => "task_started",
            EventKind::TaskProgress => "task_progress",
            EventKind::TaskCompleted => "task_completed",
            EventKind::TaskFailed => "task_failed",
            EventKind::ScanProgress => "scan_progress",
            EventKind::ScanCompleted => "scan_completed",
            EventKind::ScanFailed => "scan_failed",
            EventKind::MacroStarted => "macro_started",
            EventKind::MacroProgress => "macro_progress",
            EventKind::MacroCompleted => "macro_completed",
            EventKind::MacroFailed => "macro_failed",
        }
    }
}

/// Transport-side sink for progress events (WebSocket fan-out, UI bridge...).
///
/// Called from worker threads, possibly several at once.
pub trait ProgressListener: Send + Sync {
    fn emit(&self, event: &str, payload: &Value) -> Result<()>;
}

/// Best-effort fan-out to an optional listener. Listener errors and panics are
/// swallowed so they never reach the worker that emitted the event.
#[derive(Clone, Default)]
pub struct Broadcaster {
    listener: Option<Arc<dyn ProgressListener>>,
}

impl Broadcaster {
    pub fn new(listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit<T: Serialize>(&self, kind: EventKind, payload: &T) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                debug!("dropping {} event, payload not serializable: {err}", kind.as_str());
                return;
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.emit(kind.as_str(), &value)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("listener rejected {} event: {err}", kind.as_str()),
            Err(_) => debug!("listener panicked on {} event", kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub event: String,
    pub payload: Value,
}

/// Listener backed by a `tokio::sync::broadcast` channel; each transport
/// connection subscribes and forwards what it receives.
#[derive(Clone)]
pub struct ChannelListener {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressListener for ChannelListener {
    fn emit(&self, event: &str, payload: &Value) -> Result<()> {
        self.tx
            .send(ProgressEvent {
                event: event.to_string(),
                payload: payload.clone(),
            })
            .map(|_| ())
            .map_err(|_| anyhow!("no subscribers for {event}"))
    }
}
