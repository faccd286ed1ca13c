use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    record::OperationRecord,
    transform::{classify, CoordinateTransform, Gesture},
};
use crate::{
    device::DeviceInput,
    error::JobError,
    events::EventKind,
    jobs::{
        worker::{run_guarded, sleep_unless_cancelled, spawn_worker},
        DeviceLease, JobContext, JobKey, JobRecord, JobRegistry, JobStatus,
    },
    store::MacroRun,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MacroProgress {
    pub filename: String,
    pub total_ops: usize,
    pub completed_ops: usize,
    pub current_loop: u32,
    pub total_loops: u32,
    pub duration_ms: u64,
}

/// What a finished replay did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MacroOutcome {
    pub loops_completed: u32,
    pub taps: u64,
    pub swipes: u64,
    pub elapsed_ms: u64,
}

impl MacroOutcome {
    pub fn gestures(&self) -> u64 {
        self.taps + self.swipes
    }
}

pub type MacroRegistry = JobRegistry<MacroProgress, MacroOutcome>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MacroSubmission {
    pub accepted: bool,
    pub serial: String,
    pub total_ops: usize,
    pub duration_ms: u64,
    pub loop_times: u32,
}

#[derive(Serialize)]
struct MacroStartedEvent<'a> {
    serial: &'a str,
    filename: &'a str,
    total_ops: usize,
    duration_ms: u64,
    loop_times: u32,
}

#[derive(Serialize)]
struct MacroProgressEvent<'a> {
    serial: &'a str,
    filename: &'a str,
    completed: usize,
    total: usize,
    current_loop: u32,
}

#[derive(Serialize)]
struct MacroCompletedEvent<'a> {
    serial: &'a str,
    filename: &'a str,
    elapsed_ms: u64,
    outcome: &'a MacroOutcome,
}

#[derive(Serialize)]
struct MacroFailedEvent<'a> {
    serial: &'a str,
    filename: &'a str,
    error: String,
}

struct MacroJob {
    key: JobKey,
    job_id: String,
    filename: String,
    record: OperationRecord,
    token: CancellationToken,
    lease: DeviceLease,
}

/// Replays recorded touch logs on devices, one OS thread per replay.
#[derive(Clone)]
pub struct MacroRunner {
    ctx: JobContext,
    input: Arc<dyn DeviceInput>,
    registry: MacroRegistry,
}

impl MacroRunner {
    pub fn new(ctx: JobContext, input: Arc<dyn DeviceInput>) -> Self {
        Self {
            ctx,
            input,
            registry: MacroRegistry::new(),
        }
    }

    pub fn registry(&self) -> &MacroRegistry {
        &self.registry
    }

    /// Validate, lock the device and start replaying in the background.
    pub fn submit(
        &self,
        index: u32,
        record_path: &Path,
        record_name: &str,
    ) -> Result<MacroSubmission, JobError> {
        let key = JobKey::replay(index, record_name);
        if !record_path.exists() {
            return Err(JobError::NotFound(format!(
                "record file {}",
                record_path.display()
            )));
        }
        if self.registry.is_active(&key) {
            return Err(JobError::Busy {
                device: key.serial.clone(),
                holder: key.kind.to_string(),
            });
        }

        let record = OperationRecord::load(record_path).map_err(|err| JobError::from_anyhow(&err))?;
        let lease = self.ctx.locks.lease(&key.serial, &key.kind.to_string())?;

        let job_id = Uuid::new_v4().to_string();
        let progress = MacroProgress {
            filename: record_name.to_string(),
            total_ops: record.actionable_count(),
            completed_ops: 0,
            current_loop: 0,
            total_loops: record.info.loop_times,
            duration_ms: record.info.total_duration_ms,
        };
        let submission = MacroSubmission {
            accepted: true,
            serial: key.serial.clone(),
            total_ops: progress.total_ops,
            duration_ms: progress.duration_ms,
            loop_times: progress.total_loops,
        };

        if !self
            .registry
            .put_if_idle(JobRecord::new(key.clone(), job_id.clone(), progress))
        {
            return Err(JobError::Busy {
                device: key.serial.clone(),
                holder: key.kind.to_string(),
            });
        }

        let token = self.ctx.cancellations.issue(&key, &job_id);
        let job = MacroJob {
            key: key.clone(),
            job_id,
            filename: record_name.to_string(),
            record,
            token,
            lease,
        };

        let runner = self.clone();
        if let Err(err) = spawn_worker(format!("macro-{}", key.serial), move || runner.run(job)) {
            self.registry.remove(&key);
            self.ctx.cancellations.cancel(&key);
            return Err(JobError::from_anyhow(&err));
        }

        log_info!(
            "macro {} accepted on {}: {} ops x {} loops",
            record_name,
            submission.serial,
            submission.total_ops,
            submission.loop_times
        );
        Ok(submission)
    }

    fn run(&self, job: MacroJob) {
        let MacroJob {
            key,
            job_id,
            filename,
            record,
            token,
            lease,
        } = job;
        let serial = key.serial.clone();
        let started_at = Utc::now();

        let result = run_guarded(|| self.replay(&key, &job_id, &filename, &record, &token));

        let completed_ops = self
            .registry
            .get(&key)
            .filter(|rec| rec.job_id == job_id)
            .map(|rec| rec.progress.completed_ops)
            .unwrap_or(0);
        let mut run_row = MacroRun {
            job_id: job_id.clone(),
            serial: serial.clone(),
            filename: filename.clone(),
            status: String::new(),
            ops_completed: completed_ops as u64,
            ops_total: record.actionable_count() as u64,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };

        match result {
            Ok(Some(outcome)) => {
                run_row.status = "completed".into();
                self.persist(run_row);
                self.registry
                    .update(&key, &job_id, |rec| rec.complete(outcome.clone()));
                drop(lease);
                log_info!(
                    "macro {} on {} completed: {} gestures in {}ms",
                    filename,
                    serial,
                    outcome.gestures(),
                    outcome.elapsed_ms
                );
                self.ctx.events.emit(
                    EventKind::MacroCompleted,
                    &MacroCompletedEvent {
                        serial: &serial,
                        filename: &filename,
                        elapsed_ms: outcome.elapsed_ms,
                        outcome: &outcome,
                    },
                );
            }
            Ok(None) => {
                run_row.status = "stopped".into();
                self.persist(run_row);
                drop(lease);
                log_warn!("macro {} on {} stopped before finishing", filename, serial);
            }
            Err(err) => {
                log_error!("macro {} on {} failed: {err:?}", filename, serial);
                let job_err = JobError::from_anyhow(&err);
                run_row.status = "failed".into();
                run_row.error = Some(job_err.to_string());
                self.persist(run_row);
                self.registry.update(&key, &job_id, |rec| rec.fail(&job_err));
                drop(lease);
                self.ctx.events.emit(
                    EventKind::MacroFailed,
                    &MacroFailedEvent {
                        serial: &serial,
                        filename: &filename,
                        error: job_err.to_string(),
                    },
                );
            }
        }

        self.ctx.cancellations.retire(&key, &job_id);
    }

    /// `Ok(None)` when a stop request cut the replay short.
    fn replay(
        &self,
        key: &JobKey,
        job_id: &str,
        filename: &str,
        record: &OperationRecord,
        token: &CancellationToken,
    ) -> Result<Option<MacroOutcome>> {
        let started = Instant::now();
        let serial = key.serial.as_str();
        let settings = &self.ctx.settings;

        let target = self.input.resolution(serial)?;
        let transform = CoordinateTransform::new(record.resolution(), target);
        log_info!(
            "macro {} on {}: record {}x{} -> target {}x{}",
            filename,
            serial,
            record.info.record_width,
            record.info.record_height,
            target.0,
            target.1
        );

        let total_ops = record.actionable_count();
        self.registry.update(key, job_id, |rec| {
            rec.advance(JobStatus::Running);
        });
        self.ctx.events.emit(
            EventKind::MacroStarted,
            &MacroStartedEvent {
                serial,
                filename,
                total_ops,
                duration_ms: record.info.total_duration_ms,
                loop_times: record.info.loop_times,
            },
        );

        let throttle = settings.progress_throttle();
        let mut last_emit: Option<Instant> = None;
        let mut outcome = MacroOutcome::default();

        for loop_idx in 1..=record.info.loop_times {
            if token.is_cancelled() {
                return Ok(None);
            }
            self.registry.update(key, job_id, |rec| {
                rec.progress.current_loop = loop_idx;
                rec.progress.completed_ops = 0;
            });

            let mut prev_timing = 0u64;
            let mut completed = 0usize;
            let mut anchor: Option<((i32, i32), u64)> = None;

            for op in &record.operations {
                let delay = Duration::from_millis(op.timing_ms.saturating_sub(prev_timing));
                if !sleep_unless_cancelled(token, delay) {
                    return Ok(None);
                }
                prev_timing = op.timing_ms;

                let Some(point) = op.points.first() else {
                    continue;
                };
                let position = transform.to_device(point.x, point.y);
                if point.is_down() {
                    anchor = Some((position, op.timing_ms));
                    continue;
                }
                if !point.is_up() {
                    continue;
                }
                let Some((anchor_pos, anchor_ms)) = anchor.take() else {
                    continue;
                };

                let gesture = classify(
                    anchor_pos,
                    anchor_ms,
                    position,
                    op.timing_ms,
                    settings.swipe_threshold_px,
                    settings.min_swipe_ms,
                );
                self.perform(serial, gesture)?;
                match gesture {
                    Gesture::Tap { .. } => outcome.taps += 1,
                    Gesture::Swipe { .. } => outcome.swipes += 1,
                }

                completed += 1;
                self.registry.update(key, job_id, |rec| {
                    rec.progress.completed_ops = completed;
                });

                let is_last = completed == total_ops;
                let due = last_emit.map_or(true, |at| at.elapsed() >= throttle);
                if is_last || due {
                    self.ctx.events.emit(
                        EventKind::MacroProgress,
                        &MacroProgressEvent {
                            serial,
                            filename,
                            completed,
                            total: total_ops,
                            current_loop: loop_idx,
                        },
                    );
                    last_emit = Some(Instant::now());
                }
            }
            outcome.loops_completed = loop_idx;
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(Some(outcome))
    }

    fn perform(&self, serial: &str, gesture: Gesture) -> Result<()> {
        match gesture {
            Gesture::Tap { x, y } => {
                log::debug!("tap ({x},{y}) on {serial}");
                self.input.tap(serial, x, y)
            }
            Gesture::Swipe {
                from,
                to,
                duration_ms,
            } => {
                log::debug!("swipe {from:?} -> {to:?} {duration_ms}ms on {serial}");
                self.input.swipe(serial, from, to, duration_ms)
            }
        }
    }

    fn persist(&self, run: MacroRun) {
        let store = Arc::clone(&self.ctx.store);
        self.ctx.bridge.run_or_log("saving macro run", async move {
            store.save_macro_run(&run).await
        });
    }
}
