use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    bridge::AsyncBridge,
    device::{AdbClient, DeviceInput, Navigator, ScreenCapture, ScriptedNavigator},
    error::JobError,
    events::Broadcaster,
    full_scan::{FullScanOutcome, FullScanProgress, FullScanRunner, FullScanSubmission},
    jobs::{DeviceLocks, JobContext, JobKey, JobKind, JobRecord},
    macros::{MacroOutcome, MacroProgress, MacroRunner, MacroSubmission},
    ocr::OcrService,
    scan::{Extractor, OcrExtractor, ScanRecord, ScanRunner},
    settings::EngineSettings,
    store::ScanStore,
};

/// Everything the runners call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub input: Arc<dyn DeviceInput>,
    pub capture: Arc<dyn ScreenCapture>,
    pub navigator: Arc<dyn Navigator>,
    pub extractor: Arc<dyn Extractor>,
    pub ocr: Arc<dyn OcrService>,
}

impl Collaborators {
    /// ADB for input and capture, scripted navigation from `settings`, and
    /// region OCR for single-screen extraction.
    pub fn adb(settings: &EngineSettings, ocr: Arc<dyn OcrService>) -> Self {
        let adb = Arc::new(AdbClient::new(
            settings.adb_path.clone(),
            settings.fallback_resolution,
        ));
        let navigator = ScriptedNavigator::new(
            adb.clone(),
            settings.navigation.clone(),
            settings.exit_backs.clone(),
            Duration::from_millis(settings.back_settle_ms),
        );
        Self {
            input: adb.clone(),
            capture: adb,
            navigator: Arc::new(navigator),
            extractor: Arc::new(OcrExtractor::new(ocr.clone())),
            ocr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldLock {
    pub device: String,
    pub holder: String,
}

/// Read-only view of every registry, for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub scans: Vec<ScanRecord>,
    pub scan_history: Vec<ScanRecord>,
    pub full_scans: Vec<JobRecord<FullScanProgress, FullScanOutcome>>,
    pub macros: Vec<JobRecord<MacroProgress, MacroOutcome>>,
    pub locks: Vec<HeldLock>,
}

/// Entry point for submitting, stopping and inspecting jobs.
///
/// All three job kinds share one set of device locks, so a device runs at
/// most one job of any kind at a time.
#[derive(Clone)]
pub struct Engine {
    ctx: JobContext,
    scans: ScanRunner,
    full_scans: FullScanRunner,
    macros: MacroRunner,
}

impl Engine {
    /// Persistence goes through the tokio runtime this is called on, or
    /// through a private one per write when there is none.
    pub fn new(
        settings: EngineSettings,
        collaborators: Collaborators,
        store: Arc<dyn ScanStore>,
        events: Broadcaster,
    ) -> Self {
        let bridge = AsyncBridge::from_current(settings.persist_timeout());
        Self::with_bridge(settings, collaborators, store, events, bridge)
    }

    pub fn with_bridge(
        settings: EngineSettings,
        collaborators: Collaborators,
        store: Arc<dyn ScanStore>,
        events: Broadcaster,
        bridge: AsyncBridge,
    ) -> Self {
        let ctx = JobContext::new(events, bridge, store, settings);
        let Collaborators {
            input,
            capture,
            navigator,
            extractor,
            ocr,
        } = collaborators;

        Self {
            scans: ScanRunner::new(ctx.clone(), navigator.clone(), capture.clone(), extractor),
            full_scans: FullScanRunner::new(ctx.clone(), navigator, capture, ocr),
            macros: MacroRunner::new(ctx.clone(), input),
            ctx,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.ctx.settings
    }

    pub fn locks(&self) -> &DeviceLocks {
        &self.ctx.locks
    }

    pub fn submit_scan(&self, serial: &str, task_type: &str) -> Result<String, JobError> {
        self.scans.submit(serial, task_type)
    }

    pub fn submit_full_scan(&self, index: u32, name: &str) -> Result<FullScanSubmission, JobError> {
        self.full_scans.submit(index, name)
    }

    pub fn submit_macro(
        &self,
        index: u32,
        record_path: &Path,
        record_name: &str,
    ) -> Result<MacroSubmission, JobError> {
        self.macros.submit(index, record_path, record_name)
    }

    /// Drop the record for `key`. A macro replay is also signalled to wind
    /// down; scans and full scans run to completion without a record. Every
    /// worker still releases its device lock on the way out.
    pub fn stop(&self, key: &JobKey) -> Result<(), JobError> {
        let removed = match &key.kind {
            JobKind::Scan => self.scans.registry().remove(key).is_some(),
            JobKind::FullScan => self.full_scans.registry().remove(key).is_some(),
            JobKind::Macro(_) => {
                let removed = self.macros.registry().remove(key).is_some();
                if removed {
                    self.ctx.cancellations.cancel(key);
                }
                removed
            }
        };
        if !removed {
            return Err(JobError::NotFound(format!("no job for {key}")));
        }
        log::info!("stop requested for {key}");
        Ok(())
    }

    pub fn scan_history(&self, limit: usize) -> Vec<ScanRecord> {
        self.scans.history().recent(limit)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            scans: self.scans.registry().list_all(),
            scan_history: self.scans.history().recent(usize::MAX),
            full_scans: self.full_scans.registry().list_all(),
            macros: self.macros.registry().list_all(),
            locks: self
                .ctx
                .locks
                .held()
                .into_iter()
                .map(|(device, holder)| HeldLock { device, holder })
                .collect(),
        }
    }
}
