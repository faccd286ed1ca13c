use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    device::{NavStep, Screen},
    full_scan::default_exit_backs,
};

/// Engine tunables. Every field has a default so a partial (or missing)
/// settings file still yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub adb_path: PathBuf,
    /// Screenshots, crops and combined artifacts are written under here.
    pub work_dir: PathBuf,
    pub persist_timeout_ms: u64,
    pub scan_history_limit: usize,
    /// Pause after leaving a full-scan phase, letting the UI settle.
    pub phase_settle_ms: u64,
    /// Pause after each back press.
    pub back_settle_ms: u64,
    pub progress_throttle_ms: u64,
    pub min_swipe_ms: u64,
    pub swipe_threshold_px: i32,
    pub fallback_resolution: (u32, u32),
    pub navigation: HashMap<Screen, Vec<NavStep>>,
    /// Back presses needed to leave a screen after a scan task. Screens a
    /// settings file leaves out keep their default count.
    #[serde(deserialize_with = "exit_backs_over_defaults")]
    pub exit_backs: HashMap<Screen, u32>,
}

fn exit_backs_over_defaults<'de, D>(deserializer: D) -> Result<HashMap<Screen, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<Screen, u32>::deserialize(deserializer)?;
    let mut merged = default_exit_backs();
    merged.extend(overrides);
    Ok(merged)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            work_dir: PathBuf::from("data/scan_captures"),
            persist_timeout_ms: 10_000,
            scan_history_limit: 200,
            phase_settle_ms: 2_000,
            back_settle_ms: 1_500,
            progress_throttle_ms: 1_000,
            min_swipe_ms: 50,
            swipe_threshold_px: 10,
            fallback_resolution: (960, 540),
            navigation: HashMap::new(),
            exit_backs: default_exit_backs(),
        }
    }
}

impl EngineSettings {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }

    /// Apply `EMUPOOL_ADB_PATH` / `EMUPOOL_WORK_DIR` if set.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("EMUPOOL_ADB_PATH") {
            if !path.trim().is_empty() {
                self.adb_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("EMUPOOL_WORK_DIR") {
            if !dir.trim().is_empty() {
                self.work_dir = PathBuf::from(dir);
            }
        }
    }

    /// Settings with no waits, for driving runners against fakes.
    pub fn without_delays() -> Self {
        Self {
            phase_settle_ms: 0,
            back_settle_ms: 0,
            progress_throttle_ms: 0,
            ..Self::default()
        }
    }
}

/// JSON-file backed settings, shared read-mostly between runners.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Malformed settings in {}", path.display()))?
        } else {
            EngineSettings::default()
        };
        data.apply_env();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn current(&self) -> EngineSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let mut data: EngineSettings = serde_json::from_str(&contents)?;
        data.apply_env();
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
