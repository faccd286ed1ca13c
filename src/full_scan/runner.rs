use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Utc;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    combine::{combine, encode_png},
    parse::{parse_scan_text, FullScanData},
    phases::{regions_for, COMBINE_ORDER, PHASES},
};
use crate::{
    device::{Navigator, Screen, ScreenCapture},
    error::JobError,
    events::EventKind,
    jobs::{
        worker::{run_guarded, spawn_worker},
        DeviceLease, JobContext, JobKey, JobRecord, JobRegistry, JobStatus,
    },
    ocr::OcrService,
    store::ScanSnapshot,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const COMBINED_ARTIFACT: &str = "COMBINED_OCR.png";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullScanProgress {
    pub emulator_index: u32,
    pub emulator_name: String,
    pub step: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullScanOutcome {
    pub elapsed_ms: u64,
    pub data: FullScanData,
    pub artifact: PathBuf,
    pub raw_text: String,
}

pub type FullScanRegistry = JobRegistry<FullScanProgress, FullScanOutcome>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullScanSubmission {
    pub accepted: bool,
    pub emulator_index: u32,
    pub serial: String,
}

#[derive(Serialize)]
struct ScanProgressEvent<'a> {
    emulator_index: u32,
    serial: &'a str,
    step: &'a str,
    detail: &'a str,
}

#[derive(Serialize)]
struct ScanCompletedEvent<'a> {
    emulator_index: u32,
    serial: &'a str,
    elapsed_ms: u64,
    data: &'a FullScanData,
}

#[derive(Serialize)]
struct ScanFailedEvent<'a> {
    emulator_index: u32,
    serial: &'a str,
    error: String,
}

struct FullScanJob {
    key: JobKey,
    job_id: String,
    index: u32,
    name: String,
    lease: DeviceLease,
}

/// Tours the five data screens of one device, stacks the interesting crops
/// into one artifact and reads it with a single OCR call.
#[derive(Clone)]
pub struct FullScanRunner {
    ctx: JobContext,
    navigator: Arc<dyn Navigator>,
    capture: Arc<dyn ScreenCapture>,
    ocr: Arc<dyn OcrService>,
    registry: FullScanRegistry,
}

impl FullScanRunner {
    pub fn new(
        ctx: JobContext,
        navigator: Arc<dyn Navigator>,
        capture: Arc<dyn ScreenCapture>,
        ocr: Arc<dyn OcrService>,
    ) -> Self {
        Self {
            ctx,
            navigator,
            capture,
            ocr,
            registry: FullScanRegistry::new(),
        }
    }

    pub fn registry(&self) -> &FullScanRegistry {
        &self.registry
    }

    pub fn submit(&self, index: u32, name: &str) -> Result<FullScanSubmission, JobError> {
        let key = JobKey::full_scan(index);
        let busy = || JobError::Busy {
            device: key.serial.clone(),
            holder: key.kind.to_string(),
        };
        if self.registry.is_active(&key) {
            return Err(busy());
        }
        let lease = self.ctx.locks.lease(&key.serial, &key.kind.to_string())?;

        let job_id = Uuid::new_v4().to_string();
        let progress = FullScanProgress {
            emulator_index: index,
            emulator_name: name.to_string(),
            step: "starting".into(),
        };
        if !self
            .registry
            .put_if_idle(JobRecord::new(key.clone(), job_id.clone(), progress))
        {
            return Err(busy());
        }

        let job = FullScanJob {
            key: key.clone(),
            job_id,
            index,
            name: name.to_string(),
            lease,
        };

        let runner = self.clone();
        let thread_name = format!("full-scan-{}", key.serial);
        if let Err(err) = spawn_worker(thread_name, move || runner.run(job)) {
            self.registry.remove(&key);
            return Err(JobError::from_anyhow(&err));
        }

        log_info!("full scan accepted for #{} ({})", index, key.serial);
        Ok(FullScanSubmission {
            accepted: true,
            emulator_index: index,
            serial: key.serial.clone(),
        })
    }

    fn run(&self, job: FullScanJob) {
        let FullScanJob {
            key,
            job_id,
            index,
            name,
            lease,
        } = job;
        let serial = key.serial.clone();

        let result = run_guarded(|| self.execute(&key, &job_id, index));

        match result {
            Ok(outcome) => {
                self.persist(ScanSnapshot {
                    emulator_index: index,
                    serial: serial.clone(),
                    emulator_name: name.clone(),
                    scan_type: "full".into(),
                    scan_status: "completed".into(),
                    data: outcome.data.clone(),
                    duration_ms: outcome.elapsed_ms,
                    raw_ocr_text: outcome.raw_text.clone(),
                    created_at: Utc::now(),
                });
                let recorded = self.registry.update(&key, &job_id, |rec| {
                    rec.progress.step = "done".into();
                    rec.complete(outcome.clone())
                });
                if recorded.is_none() {
                    log_warn!(
                        "full scan #{} on {} finished after its record was removed",
                        index,
                        serial
                    );
                }
                drop(lease);
                log_info!(
                    "full scan #{} ({}) completed in {}ms",
                    index,
                    name,
                    outcome.elapsed_ms
                );
                self.ctx.events.emit(
                    EventKind::ScanCompleted,
                    &ScanCompletedEvent {
                        emulator_index: index,
                        serial: &serial,
                        elapsed_ms: outcome.elapsed_ms,
                        data: &outcome.data,
                    },
                );
            }
            Err(err) => {
                log_error!("full scan #{} on {} failed: {err:?}", index, serial);
                let job_err = JobError::from_anyhow(&err);
                self.registry.update(&key, &job_id, |rec| {
                    rec.progress.step = "error".into();
                    rec.fail(&job_err)
                });
                drop(lease);
                self.ctx.events.emit(
                    EventKind::ScanFailed,
                    &ScanFailedEvent {
                        emulator_index: index,
                        serial: &serial,
                        error: job_err.to_string(),
                    },
                );
            }
        }
    }

    fn execute(
        &self,
        key: &JobKey,
        job_id: &str,
        index: u32,
    ) -> Result<FullScanOutcome> {
        let started = Instant::now();
        let serial = key.serial.as_str();
        let settle = Duration::from_millis(self.ctx.settings.phase_settle_ms);
        let device_dir = self
            .ctx
            .settings
            .work_dir
            .join(serial.replace([':', '.'], "_"));
        fs::create_dir_all(&device_dir)
            .with_context(|| format!("failed to create {}", device_dir.display()))?;

        self.step(
            key,
            job_id,
            index,
            Some(JobStatus::Running),
            "capturing",
            "navigating and capturing screenshots",
        );

        let total = PHASES.len();
        let mut crops: Vec<(Screen, DynamicImage)> = Vec::new();
        for (i, phase) in PHASES.iter().enumerate() {
            let screen = phase.screen;
            let label = format!("capturing ({}/{})", i + 1, total);
            let detail = format!("phase: {}", screen.as_str());
            self.step(key, job_id, index, Some(JobStatus::Capturing), &label, &detail);
            log_info!("full scan phase {}/{}: {} on {}", i + 1, total, screen.as_str(), serial);

            self.navigator.navigate_to(serial, screen)?;
            match self.grab(serial, screen, &device_dir) {
                Some(frame) => {
                    for region in regions_for(screen) {
                        match region.crop(&frame) {
                            Some(crop) => {
                                let name = format!("{}_{}.png", screen.as_str(), region.name);
                                save_png(&crop, &device_dir.join(name));
                                crops.push((screen, crop));
                            }
                            None => log_warn!(
                                "region {} does not fit the {} screenshot of {}",
                                region.name,
                                screen.as_str(),
                                serial
                            ),
                        }
                    }
                }
                None => log_warn!("no {} screenshot from {}, skipping phase", screen.as_str(), serial),
            }
            self.navigator.go_back(serial, screen)?;

            if !settle.is_zero() {
                thread::sleep(settle);
            }
        }

        if crops.is_empty() {
            return Err(JobError::CaptureFailure(format!("no images captured for {serial}")).into());
        }

        let ordered: Vec<DynamicImage> = COMBINE_ORDER
            .iter()
            .flat_map(|screen| {
                crops
                    .iter()
                    .filter(move |(s, _)| s == screen)
                    .map(|(_, crop)| crop.clone())
            })
            .collect();
        let combined = combine(&ordered)
            .ok_or_else(|| JobError::CaptureFailure("combined artifact is empty".into()))?;
        let png = encode_png(&combined)?;
        let artifact = device_dir.join(COMBINED_ARTIFACT);
        fs::write(&artifact, &png)
            .with_context(|| format!("failed to write {}", artifact.display()))?;

        self.step(
            key,
            job_id,
            index,
            Some(JobStatus::Processing),
            "ocr_processing",
            "running OCR on combined artifact",
        );
        let raw_text = self
            .ocr
            .recognize(&png)
            .map_err(|err| JobError::ExtractionFailure(format!("OCR failed: {err:#}")))?;
        if raw_text.trim().is_empty() {
            return Err(JobError::ExtractionFailure("OCR returned no text".into()).into());
        }

        self.step(key, job_id, index, None, "parsing", "parsing OCR results");
        let data = parse_scan_text(&raw_text);

        self.step(key, job_id, index, None, "saving", "saving to database");
        Ok(FullScanOutcome {
            elapsed_ms: started.elapsed().as_millis() as u64,
            data,
            artifact,
            raw_text,
        })
    }

    /// Capture and decode one screenshot, keeping a copy on disk. Any failure
    /// only skips the phase.
    fn grab(&self, serial: &str, screen: Screen, dir: &Path) -> Option<DynamicImage> {
        let bytes = match self.capture.capture(serial) {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(err) => {
                log_warn!("capture of {} on {} failed: {err:#}", screen.as_str(), serial);
                return None;
            }
        };
        let path = dir.join(format!("{}_full.png", screen.as_str()));
        if let Err(err) = fs::write(&path, &bytes) {
            log::debug!("could not keep {}: {err}", path.display());
        }
        match image::load_from_memory(&bytes) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log_warn!("undecodable {} screenshot from {}: {err}", screen.as_str(), serial);
                None
            }
        }
    }

    fn step(
        &self,
        key: &JobKey,
        job_id: &str,
        index: u32,
        status: Option<JobStatus>,
        step: &str,
        detail: &str,
    ) {
        self.registry.update(key, job_id, |rec| {
            if let Some(status) = status {
                rec.advance(status);
            }
            rec.progress.step = step.to_string();
        });
        self.ctx.events.emit(
            EventKind::ScanProgress,
            &ScanProgressEvent {
                emulator_index: index,
                serial: &key.serial,
                step,
                detail,
            },
        );
    }

    fn persist(&self, snapshot: ScanSnapshot) {
        let store = Arc::clone(&self.ctx.store);
        self.ctx.bridge.run_or_log("saving scan snapshot", async move {
            store.save_scan_snapshot(&snapshot).await
        });
    }
}

fn save_png(image: &DynamicImage, path: &Path) {
    if let Err(err) = image.save(path) {
        log::debug!("could not save {}: {err}", path.display());
    }
}
