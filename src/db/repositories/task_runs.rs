use anyhow::{Context, Result};
use rusqlite::{params, Row};

use super::emulators::ensure_emulator;
use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, to_i64, to_u64},
    },
    store::TaskRun,
};

fn row_to_task_run(row: &Row) -> Result<TaskRun> {
    let result_json: Option<String> = row.get("result_json")?;
    let started_at: String = row.get("started_at")?;
    let finished_at: String = row.get("finished_at")?;

    Ok(TaskRun {
        job_id: row.get("job_id")?,
        serial: row.get("serial")?,
        task_type: row.get("task_type")?,
        status: row.get("status")?,
        error: row.get("error")?,
        duration_ms: to_u64(row.get("duration_ms")?, "duration_ms")?,
        result: result_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("failed to parse result_json")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        finished_at: parse_datetime(&finished_at, "finished_at")?,
    })
}

impl Database {
    pub async fn insert_task_run(&self, run: &TaskRun) -> Result<i64> {
        let run = run.clone();
        self.execute(move |conn| {
            let emulator_id = ensure_emulator(conn, &run.serial, "")?;
            let result_json = run.result.as_ref().map(serde_json::to_string).transpose()?;
            conn.execute(
                "INSERT INTO task_runs (job_id, emulator_id, task_type, status, error, duration_ms, result_json, started_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.job_id,
                    emulator_id,
                    run.task_type,
                    run.status,
                    run.error,
                    to_i64(run.duration_ms)?,
                    result_json,
                    run.started_at.to_rfc3339(),
                    run.finished_at.to_rfc3339(),
                ],
            )
            .context("failed to insert task run")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first.
    pub async fn recent_task_runs(&self, serial: &str, limit: u32) -> Result<Vec<TaskRun>> {
        let serial = serial.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.job_id AS job_id, e.serial AS serial, t.task_type AS task_type, t.status AS status, t.error AS error, t.duration_ms AS duration_ms,
                        t.result_json AS result_json, t.started_at AS started_at, t.finished_at AS finished_at
                 FROM task_runs t
                 JOIN emulators e ON e.id = t.emulator_id
                 WHERE e.serial = ?1
                 ORDER BY t.started_at DESC, t.id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![serial, limit])?;
            let mut runs = Vec::new();
            while let Some(row) = rows.next()? {
                runs.push(row_to_task_run(row)?);
            }
            Ok(runs)
        })
        .await
    }
}
