//! Replay of recorded touch logs.

pub mod record;
pub mod runner;
pub mod transform;

pub use record::{OperationRecord, RecordInfo, RecordedOperation, TouchPoint};
pub use runner::{MacroOutcome, MacroProgress, MacroRegistry, MacroRunner, MacroSubmission};
pub use transform::{classify, CoordinateTransform, Gesture, COORD_SCALE};
