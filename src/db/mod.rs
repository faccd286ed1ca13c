//! SQLite adapter behind the [`ScanStore`] port.

mod connection;
mod helpers;
mod migrations;
mod repositories;

use anyhow::Result;
use async_trait::async_trait;

pub use connection::Database;

use crate::store::{MacroRun, ScanSnapshot, ScanStore, TaskRun};

#[async_trait]
impl ScanStore for Database {
    async fn save_task_run(&self, run: &TaskRun) -> Result<i64> {
        self.insert_task_run(run).await
    }

    async fn save_macro_run(&self, run: &MacroRun) -> Result<i64> {
        self.insert_macro_run(run).await
    }

    async fn save_scan_snapshot(&self, snapshot: &ScanSnapshot) -> Result<i64> {
        self.insert_scan_snapshot(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{full_scan::FullScanData, scan::Resources};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("data").join("emupool.db")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn task_runs_round_trip_newest_first() {
        let (_dir, db) = open();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        for (i, status) in ["completed", "failed"].iter().enumerate() {
            let run = TaskRun {
                job_id: format!("job-{i}"),
                serial: "emulator-5556".into(),
                task_type: "resources".into(),
                status: status.to_string(),
                error: (i == 1).then(|| "screenshot capture failed: no frame".to_string()),
                duration_ms: 1_200,
                result: (i == 0).then(|| json!({ "data": { "kind": "resources", "gold": 5 } })),
                started_at: start + Duration::seconds(i as i64),
                finished_at: start + Duration::seconds(i as i64 + 1),
            };
            db.save_task_run(&run).await.unwrap();
        }

        let runs = db.recent_task_runs("emulator-5556", 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].job_id, "job-1");
        assert_eq!(runs[0].error.as_deref(), Some("screenshot capture failed: no frame"));
        assert_eq!(runs[1].result.as_ref().unwrap()["data"]["gold"], 5);
        assert!(db.recent_task_runs("emulator-9999", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn macro_runs_are_stored_per_device() {
        let (_dir, db) = open();
        let now = Utc::now();
        let run = MacroRun {
            job_id: "m1".into(),
            serial: "emulator-5554".into(),
            filename: "farm.record".into(),
            status: "stopped".into(),
            ops_completed: 3,
            ops_total: 9,
            error: None,
            started_at: now,
            finished_at: now,
        };
        db.save_macro_run(&run).await.unwrap();

        let stored = db.recent_macro_runs("emulator-5554", 5).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].ops_completed, 3);
        assert_eq!(stored[0].status, "stopped");
    }

    #[tokio::test]
    async fn snapshot_keeps_resources_and_emulator_name() {
        let (_dir, db) = open();
        let snapshot = ScanSnapshot {
            emulator_index: 1,
            serial: "emulator-5556".into(),
            emulator_name: "farm-2".into(),
            scan_type: "full".into(),
            scan_status: "completed".into(),
            data: FullScanData {
                lord_name: "Goten".into(),
                power: 14_837_914,
                hall_level: 23,
                market_level: 21,
                pet_token: 13_572,
                resources: Resources { gold: 589_700_000, wood: 2, ore: 3, mana: 4 },
            },
            duration_ms: 61_000,
            raw_ocr_text: "Gold\n1\n589.7M".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        };
        let id = db.save_scan_snapshot(&snapshot).await.unwrap();
        assert!(id > 0);

        let loaded = db.latest_scan_snapshot("emulator-5556").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(db.latest_scan_snapshot("emulator-5554").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emupool.db");
        {
            let db = Database::new(path.clone()).unwrap();
            let now = Utc::now();
            db.save_macro_run(&MacroRun {
                job_id: "m1".into(),
                serial: "emulator-5554".into(),
                filename: "a.record".into(),
                status: "completed".into(),
                ops_completed: 1,
                ops_total: 1,
                error: None,
                started_at: now,
                finished_at: now,
            })
            .await
            .unwrap();
        }
        let db = Database::new(path).unwrap();
        assert_eq!(db.recent_macro_runs("emulator-5554", 5).await.unwrap().len(), 1);
    }
}
