pub mod cancel;
pub mod context;
pub mod key;
pub mod lock;
pub mod registry;
pub mod status;
pub mod worker;

pub use cancel::Cancellations;
pub use context::JobContext;
pub use key::{index_for_serial, serial_for_index, JobKey, JobKind};
pub use lock::{DeviceLease, DeviceLocks};
pub use registry::JobRegistry;
pub use status::{JobRecord, JobStatus};
