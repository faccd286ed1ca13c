//! Per-device job engine for a pool of Android emulators.
//!
//! Three job kinds run against a device: single-screen scan tasks, the
//! five-screen full scan, and macro replay of recorded touch logs. A device
//! runs at most one job at a time; a second submission is rejected, never
//! queued. Progress is pushed to an optional [`events::ProgressListener`] and
//! results are written through the [`store::ScanStore`] port.

pub mod bridge;
pub mod db;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod full_scan;
pub mod jobs;
pub mod macros;
pub mod ocr;
pub mod scan;
pub mod settings;
pub mod store;
pub mod utils;

pub use bridge::AsyncBridge;
pub use engine::{Collaborators, Engine, EngineStatus, HeldLock};
pub use error::JobError;
pub use events::{Broadcaster, ChannelListener, EventKind, ProgressEvent, ProgressListener};
pub use jobs::{JobKey, JobKind, JobRecord, JobStatus};
pub use settings::{EngineSettings, SettingsStore};
pub use store::{MemoryStore, ScanStore};
pub use utils::init_logging;
