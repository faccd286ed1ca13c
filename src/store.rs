//! Persistence port. Runners write through [`ScanStore`] only; the schema
//! lives with whichever adapter implements it ([`crate::db::Database`] for
//! SQLite, [`MemoryStore`] for tests and embedding).

use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::full_scan::FullScanData;

/// Outcome of one scan task, written when the task finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub job_id: String,
    pub serial: String,
    pub task_type: String,
    pub status: String,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub result: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of one macro replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroRun {
    pub job_id: String,
    pub serial: String,
    pub filename: String,
    pub status: String,
    pub ops_completed: u64,
    pub ops_total: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Parsed full-scan document for one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub emulator_index: u32,
    pub serial: String,
    pub emulator_name: String,
    pub scan_type: String,
    pub scan_status: String,
    pub data: FullScanData,
    pub duration_ms: u64,
    pub raw_ocr_text: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn save_task_run(&self, run: &TaskRun) -> Result<i64>;
    async fn save_macro_run(&self, run: &MacroRun) -> Result<i64>;
    async fn save_scan_snapshot(&self, snapshot: &ScanSnapshot) -> Result<i64>;
}

/// Keeps everything in memory; row ids are 1-based insertion positions.
#[derive(Default)]
pub struct MemoryStore {
    task_runs: Mutex<Vec<TaskRun>>,
    macro_runs: Mutex<Vec<MacroRun>>,
    snapshots: Mutex<Vec<ScanSnapshot>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn push<T>(rows: &Mutex<Vec<T>>, row: T) -> i64 {
    let mut rows = locked(rows);
    rows.push(row);
    rows.len() as i64
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_runs(&self) -> Vec<TaskRun> {
        locked(&self.task_runs).clone()
    }

    pub fn macro_runs(&self) -> Vec<MacroRun> {
        locked(&self.macro_runs).clone()
    }

    pub fn snapshots(&self) -> Vec<ScanSnapshot> {
        locked(&self.snapshots).clone()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn save_task_run(&self, run: &TaskRun) -> Result<i64> {
        Ok(push(&self.task_runs, run.clone()))
    }

    async fn save_macro_run(&self, run: &MacroRun) -> Result<i64> {
        Ok(push(&self.macro_runs, run.clone()))
    }

    async fn save_scan_snapshot(&self, snapshot: &ScanSnapshot) -> Result<i64> {
        Ok(push(&self.snapshots, snapshot.clone()))
    }
}
