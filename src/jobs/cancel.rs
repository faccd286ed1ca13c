use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio_util::sync::CancellationToken;

use super::key::JobKey;

/// Cancellation tokens of live workers, keyed like the registry.
#[derive(Clone, Default)]
pub struct Cancellations {
    tokens: Arc<Mutex<HashMap<JobKey, (String, CancellationToken)>>>,
}

impl Cancellations {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<JobKey, (String, CancellationToken)>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Issue a fresh token for `job_id` occupying `key`.
    pub fn issue(&self, key: &JobKey, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.table()
            .insert(key.clone(), (job_id.to_string(), token.clone()));
        token
    }

    /// Trip the token for `key`, if a worker still owns one.
    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.table().remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once its worker is done, unless a newer job took the key.
    pub fn retire(&self, key: &JobKey, job_id: &str) {
        let mut table = self.table();
        if table.get(key).map(|(owner, _)| owner == job_id).unwrap_or(false) {
            table.remove(key);
        }
    }
}
