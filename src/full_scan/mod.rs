//! Five-screen capture tour feeding one OCR pass.

pub mod combine;
pub mod parse;
pub mod phases;
pub mod runner;

pub use parse::{parse_scan_text, parse_value, FullScanData};
pub use phases::{default_exit_backs, CropRegion, Phase, COMBINE_ORDER, PHASES};
pub use runner::{FullScanOutcome, FullScanProgress, FullScanRegistry, FullScanRunner, FullScanSubmission};
