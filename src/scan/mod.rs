//! Single-screen scan tasks: navigate, capture, extract, validate.

pub mod extract;
pub mod runner;
pub mod task;
pub mod validate;

pub use extract::{Extractor, OcrExtractor, ProfileData, Resources};
pub use runner::{ScanHistory, ScanProgress, ScanRecord, ScanRegistry, ScanRunner};
pub use task::{handler_for, ScanData, ScanResult, TaskKind};
pub use validate::Validation;
