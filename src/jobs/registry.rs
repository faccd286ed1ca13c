use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{key::JobKey, status::JobRecord};

/// Concurrently shared job status table, one per job kind.
///
/// Records are only written by the worker that owns them (through
/// [`JobRegistry::update`]) and by `stop`, which deletes them. Terminal records
/// stay until the next submission for the same key replaces them.
pub struct JobRegistry<P, R> {
    records: Arc<Mutex<HashMap<JobKey, JobRecord<P, R>>>>,
}

impl<P, R> Clone for JobRegistry<P, R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<P, R> Default for JobRegistry<P, R> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<P: Clone, R: Clone> JobRegistry<P, R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<JobKey, JobRecord<P, R>>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert or overwrite the record for its key.
    pub fn put(&self, record: JobRecord<P, R>) {
        self.table().insert(record.key.clone(), record);
    }

    /// Insert unless an active record already occupies the key.
    pub fn put_if_idle(&self, record: JobRecord<P, R>) -> bool {
        let mut table = self.table();
        if let Some(existing) = table.get(&record.key) {
            if existing.status.is_active() {
                return false;
            }
        }
        table.insert(record.key.clone(), record);
        true
    }

    pub fn get(&self, key: &JobKey) -> Option<JobRecord<P, R>> {
        self.table().get(key).cloned()
    }

    pub fn remove(&self, key: &JobKey) -> Option<JobRecord<P, R>> {
        self.table().remove(key)
    }

    pub fn is_active(&self, key: &JobKey) -> bool {
        self.table()
            .get(key)
            .map(|record| record.status.is_active())
            .unwrap_or(false)
    }

    /// Mutate the record for `key` only if it still belongs to `job_id`.
    ///
    /// Returns `None` when the slot was deleted by a stop request or taken
    /// over by a newer job, so a stale worker never writes into it.
    pub fn update<T>(
        &self,
        key: &JobKey,
        job_id: &str,
        mutate: impl FnOnce(&mut JobRecord<P, R>) -> T,
    ) -> Option<T> {
        let mut table = self.table();
        let record = table.get_mut(key)?;
        if record.job_id != job_id {
            return None;
        }
        Some(mutate(record))
    }

    /// Snapshot of every record, ordered by key.
    pub fn list_all(&self) -> Vec<JobRecord<P, R>> {
        let mut records: Vec<_> = self.table().values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::status::JobStatus;

    type Registry = JobRegistry<u32, String>;

    fn record(serial: &str, job_id: &str) -> JobRecord<u32, String> {
        JobRecord::new(JobKey::scan(serial), job_id, 0)
    }

    #[test]
    fn put_get_remove() {
        let registry = Registry::new();
        registry.put(record("emulator-5554", "a"));
        assert_eq!(registry.get(&JobKey::scan("emulator-5554")).unwrap().job_id, "a");
        assert!(registry.remove(&JobKey::scan("emulator-5554")).is_some());
        assert!(registry.remove(&JobKey::scan("emulator-5554")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn put_if_idle_refuses_active_slot_but_replaces_terminal_one() {
        let registry = Registry::new();
        assert!(registry.put_if_idle(record("emulator-5554", "a")));
        assert!(!registry.put_if_idle(record("emulator-5554", "b")));

        let key = JobKey::scan("emulator-5554");
        registry.update(&key, "a", |rec| rec.complete("done".into()));
        assert!(registry.put_if_idle(record("emulator-5554", "b")));
        assert_eq!(registry.get(&key).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn update_ignores_removed_or_foreign_slots() {
        let registry = Registry::new();
        let key = JobKey::scan("emulator-5554");
        registry.put(record("emulator-5554", "a"));

        assert_eq!(registry.update(&key, "b", |rec| rec.progress = 9), None);
        assert_eq!(registry.update(&key, "a", |rec| rec.progress = 3), Some(()));
        assert_eq!(registry.get(&key).unwrap().progress, 3);

        registry.remove(&key);
        assert_eq!(registry.update(&key, "a", |rec| rec.progress = 4), None);
        assert!(registry.get(&key).is_none());
    }

    #[test]
    fn list_all_is_sorted_snapshot() {
        let registry = Registry::new();
        registry.put(record("emulator-5558", "c"));
        registry.put(record("emulator-5554", "a"));
        let serials: Vec<_> = registry
            .list_all()
            .into_iter()
            .map(|rec| rec.key.serial)
            .collect();
        assert_eq!(serials, vec!["emulator-5554", "emulator-5558"]);
    }
}
