use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    extract::Extractor,
    task::{handler_for, ScanResult, TaskKind},
};
use crate::{
    device::{Navigator, ScreenCapture},
    error::JobError,
    events::EventKind,
    jobs::{
        worker::{run_guarded, spawn_worker},
        DeviceLease, JobContext, JobKey, JobRecord, JobRegistry, JobStatus,
    },
    store::TaskRun,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub task_type: TaskKind,
    pub step: String,
}

pub type ScanRecord = JobRecord<ScanProgress, ScanResult>;
pub type ScanRegistry = JobRegistry<ScanProgress, ScanResult>;

/// Terminal scan records, oldest first, capped at a fixed length.
#[derive(Clone)]
pub struct ScanHistory {
    limit: usize,
    entries: Arc<Mutex<VecDeque<ScanRecord>>>,
}

impl ScanHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<ScanRecord>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, record: ScanRecord) {
        let mut entries = self.entries();
        entries.push_back(record);
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    /// The newest `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ScanRecord> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize)]
struct TaskEvent<'a> {
    task_id: &'a str,
    serial: &'a str,
    #[serde(rename = "type")]
    task_type: &'a str,
}

#[derive(Serialize)]
struct TaskProgressEvent<'a> {
    task_id: &'a str,
    serial: &'a str,
    status: JobStatus,
    step: &'a str,
}

#[derive(Serialize)]
struct TaskCompletedEvent<'a> {
    task_id: &'a str,
    serial: &'a str,
    #[serde(rename = "type")]
    task_type: &'a str,
    duration_ms: u64,
    result: &'a ScanResult,
}

#[derive(Serialize)]
struct TaskFailedEvent<'a> {
    task_id: &'a str,
    serial: &'a str,
    #[serde(rename = "type")]
    task_type: &'a str,
    error: String,
}

struct ScanJob {
    key: JobKey,
    job_id: String,
    kind: TaskKind,
    lease: DeviceLease,
}

/// Single-screen scan tasks: navigate, capture, extract, validate, go back.
#[derive(Clone)]
pub struct ScanRunner {
    ctx: JobContext,
    navigator: Arc<dyn Navigator>,
    capture: Arc<dyn ScreenCapture>,
    extractor: Arc<dyn Extractor>,
    registry: ScanRegistry,
    history: ScanHistory,
}

impl ScanRunner {
    pub fn new(
        ctx: JobContext,
        navigator: Arc<dyn Navigator>,
        capture: Arc<dyn ScreenCapture>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let history = ScanHistory::new(ctx.settings.scan_history_limit);
        Self {
            ctx,
            navigator,
            capture,
            extractor,
            registry: ScanRegistry::new(),
            history,
        }
    }

    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    pub fn history(&self) -> &ScanHistory {
        &self.history
    }

    /// Returns the task id. An unknown kind is rejected outright; a busy device
    /// yields a task that is already `Failed` (recorded in history only).
    pub fn submit(&self, serial: &str, task_type: &str) -> Result<String, JobError> {
        let kind: TaskKind = task_type.parse()?;
        let key = JobKey::scan(serial);
        let job_id = Uuid::new_v4().to_string();

        self.ctx.events.emit(
            EventKind::TaskQueued,
            &TaskEvent {
                task_id: &job_id,
                serial,
                task_type: kind.as_str(),
            },
        );

        let progress = ScanProgress {
            task_type: kind,
            step: "queued".into(),
        };
        let lease = match self.ctx.locks.lease(serial, kind.as_str()) {
            Ok(lease) => lease,
            Err(busy) => {
                log_warn!("scan {} on {} rejected: {}", kind, serial, busy);
                let mut record = JobRecord::new(key, job_id.clone(), progress);
                record.fail(&busy);
                self.history.push(record);
                self.emit_failed(&job_id, serial, kind, &busy);
                return Ok(job_id);
            }
        };

        self.registry
            .put(JobRecord::new(key.clone(), job_id.clone(), progress));
        let job = ScanJob {
            key: key.clone(),
            job_id: job_id.clone(),
            kind,
            lease,
        };

        let runner = self.clone();
        if let Err(err) = spawn_worker(format!("scan-{serial}"), move || runner.run(job)) {
            self.registry.remove(&key);
            return Err(JobError::from_anyhow(&err));
        }

        log_info!("scan {} queued on {} as {}", kind, serial, job_id);
        Ok(job_id)
    }

    fn run(&self, job: ScanJob) {
        let ScanJob {
            key,
            job_id,
            kind,
            lease,
        } = job;
        let serial = key.serial.clone();
        let started_at = Utc::now();

        let result = run_guarded(|| self.execute(&key, &job_id, kind));

        if let Some(screen) = kind.screen() {
            if let Err(err) = self.navigator.go_back(&serial, screen) {
                log_warn!("going back from {} on {} failed: {err:#}", screen.as_str(), serial);
            }
        }

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let mut run_row = TaskRun {
            job_id: job_id.clone(),
            serial: serial.clone(),
            task_type: kind.as_str().to_string(),
            status: String::new(),
            error: None,
            duration_ms,
            result: None,
            started_at,
            finished_at,
        };

        match result {
            Ok(scan) => {
                run_row.status = "completed".into();
                run_row.result = serde_json::to_value(&scan).ok();
                self.persist(run_row);
                let live = self.finish(&key, &job_id, |rec| rec.complete(scan.clone()));
                drop(lease);
                if !live {
                    log_warn!("scan {} on {} finished after it was stopped", kind, serial);
                    return;
                }
                log_info!(
                    "scan {} on {} completed in {}ms (valid={}, reliable={})",
                    kind,
                    serial,
                    duration_ms,
                    scan.validation.is_valid,
                    scan.validation.is_reliable
                );
                self.ctx.events.emit(
                    EventKind::TaskCompleted,
                    &TaskCompletedEvent {
                        task_id: &job_id,
                        serial: &serial,
                        task_type: kind.as_str(),
                        duration_ms,
                        result: &scan,
                    },
                );
            }
            Err(err) => {
                log_error!("scan {} on {} failed: {err:?}", kind, serial);
                let job_err = JobError::from_anyhow(&err);
                run_row.status = "failed".into();
                run_row.error = Some(job_err.to_string());
                self.persist(run_row);
                let live = self.finish(&key, &job_id, |rec| rec.fail(&job_err));
                drop(lease);
                if live {
                    self.emit_failed(&job_id, &serial, kind, &job_err);
                }
            }
        }
    }

    /// Apply the terminal transition and copy the record into history.
    /// `false` when the record was removed by a stop request meanwhile.
    fn finish(
        &self,
        key: &JobKey,
        job_id: &str,
        apply: impl FnOnce(&mut ScanRecord) -> bool,
    ) -> bool {
        let finished = self.registry.update(key, job_id, |rec| {
            apply(rec);
            rec.progress.step = rec.status.as_str().to_string();
            rec.clone()
        });
        match finished {
            Some(record) => {
                self.history.push(record);
                true
            }
            None => false,
        }
    }

    /// A stop request does not interrupt the pipeline; it only removes the
    /// record, after which transitions stop broadcasting.
    fn execute(&self, key: &JobKey, job_id: &str, kind: TaskKind) -> Result<ScanResult> {
        let serial = key.serial.as_str();

        self.ctx.events.emit(
            EventKind::TaskStarted,
            &TaskEvent {
                task_id: job_id,
                serial,
                task_type: kind.as_str(),
            },
        );

        self.transition(key, job_id, JobStatus::Navigating, "navigating to game screen");
        if let Some(screen) = kind.screen() {
            // Navigation and capture failures are reported alike.
            self.navigator
                .navigate_to(serial, screen)
                .map_err(|err| JobError::CaptureFailure(format!("{err:#}")))?;
        }

        self.transition(key, job_id, JobStatus::Capturing, "capturing screenshot");
        let artifact = self
            .capture
            .capture(serial)
            .map_err(|err| JobError::CaptureFailure(format!("{err:#}")))?
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| JobError::CaptureFailure("no screenshot produced".into()))?;

        self.transition(key, job_id, JobStatus::Processing, "processing OCR");
        let frame = image::load_from_memory(&artifact)
            .map_err(|err| JobError::DecodeFailure(err.to_string()))?;
        let result = handler_for(kind)(self.extractor.as_ref(), &frame)?;

        self.transition(key, job_id, JobStatus::Validating, "validating");
        if !result.validation.is_reliable || !result.validation.is_valid {
            log_warn!(
                "scan {} on {} flagged: {}",
                kind,
                serial,
                result.validation.errors.join("; ")
            );
        }
        Ok(result)
    }

    fn transition(&self, key: &JobKey, job_id: &str, status: JobStatus, step: &str) {
        let live = self.registry.update(key, job_id, |rec| {
            rec.advance(status);
            rec.progress.step = step.to_string();
        });
        if live.is_none() {
            log::debug!("{key} no longer registered, not reporting {}", status.as_str());
            return;
        }
        log::debug!("{key} -> {}", status.as_str());
        self.ctx.events.emit(
            EventKind::TaskProgress,
            &TaskProgressEvent {
                task_id: job_id,
                serial: &key.serial,
                status,
                step,
            },
        );
    }

    fn emit_failed(&self, job_id: &str, serial: &str, kind: TaskKind, err: &JobError) {
        self.ctx.events.emit(
            EventKind::TaskFailed,
            &TaskFailedEvent {
                task_id: job_id,
                serial,
                task_type: kind.as_str(),
                error: err.to_string(),
            },
        );
    }

    fn persist(&self, run: TaskRun) {
        let store = Arc::clone(&self.ctx.store);
        self.ctx
            .bridge
            .run_or_log("saving task run", async move { store.save_task_run(&run).await });
    }
}
