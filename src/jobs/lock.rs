use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;

use crate::error::JobError;

/// Exclusive per-device locks. A device is either free or held by exactly one
/// named holder; there is no waiting, a second caller is simply refused.
#[derive(Clone, Default)]
pub struct DeviceLocks {
    held: Arc<Mutex<HashMap<String, String>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Take the lock for `device` iff nobody holds it.
    pub fn try_acquire(&self, device: &str, holder: &str) -> bool {
        let mut table = self.table();
        if table.contains_key(device) {
            return false;
        }
        table.insert(device.to_string(), holder.to_string());
        debug!("device {device} locked by {holder}");
        true
    }

    /// Idempotent; releasing a free device is a no-op.
    pub fn release(&self, device: &str) {
        if let Some(holder) = self.table().remove(device) {
            debug!("device {device} released by {holder}");
        }
    }

    pub fn holder(&self, device: &str) -> Option<String> {
        self.table().get(device).cloned()
    }

    pub fn is_held(&self, device: &str) -> bool {
        self.table().contains_key(device)
    }

    /// Snapshot of `(device, holder)` pairs, sorted by device.
    pub fn held(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .table()
            .iter()
            .map(|(device, holder)| (device.clone(), holder.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Acquire and wrap the lock in a guard that releases it on drop, so every
    /// exit path of a worker (including a panic unwinding through it) frees
    /// the device.
    pub fn lease(&self, device: &str, holder: &str) -> Result<DeviceLease, JobError> {
        if self.try_acquire(device, holder) {
            return Ok(DeviceLease {
                locks: self.clone(),
                device: device.to_string(),
            });
        }
        Err(JobError::Busy {
            device: device.to_string(),
            holder: self.holder(device).unwrap_or_default(),
        })
    }
}

pub struct DeviceLease {
    locks: DeviceLocks,
    device: String,
}

impl DeviceLease {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.locks.release(&self.device);
    }
}
