use anyhow::{Context, Result};
use rusqlite::{params, Row};

use super::emulators::ensure_emulator;
use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, to_i64, to_u64},
    },
    store::MacroRun,
};

fn row_to_macro_run(row: &Row) -> Result<MacroRun> {
    let started_at: String = row.get("started_at")?;
    let finished_at: String = row.get("finished_at")?;

    Ok(MacroRun {
        job_id: row.get("job_id")?,
        serial: row.get("serial")?,
        filename: row.get("filename")?,
        status: row.get("status")?,
        ops_completed: to_u64(row.get("ops_completed")?, "ops_completed")?,
        ops_total: to_u64(row.get("ops_total")?, "ops_total")?,
        error: row.get("error")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        finished_at: parse_datetime(&finished_at, "finished_at")?,
    })
}

impl Database {
    pub async fn insert_macro_run(&self, run: &MacroRun) -> Result<i64> {
        let run = run.clone();
        self.execute(move |conn| {
            let emulator_id = ensure_emulator(conn, &run.serial, "")?;
            conn.execute(
                "INSERT INTO macro_runs (job_id, emulator_id, filename, status, ops_completed, ops_total, error, started_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.job_id,
                    emulator_id,
                    run.filename,
                    run.status,
                    to_i64(run.ops_completed)?,
                    to_i64(run.ops_total)?,
                    run.error,
                    run.started_at.to_rfc3339(),
                    run.finished_at.to_rfc3339(),
                ],
            )
            .context("failed to insert macro run")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first.
    pub async fn recent_macro_runs(&self, serial: &str, limit: u32) -> Result<Vec<MacroRun>> {
        let serial = serial.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.job_id AS job_id, e.serial AS serial, m.filename AS filename, m.status AS status, m.ops_completed AS ops_completed, m.ops_total AS ops_total,
                        m.error AS error, m.started_at AS started_at, m.finished_at AS finished_at
                 FROM macro_runs m
                 JOIN emulators e ON e.id = m.emulator_id
                 WHERE e.serial = ?1
                 ORDER BY m.started_at DESC, m.id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![serial, limit])?;
            let mut runs = Vec::new();
            while let Some(row) = rows.next()? {
                runs.push(row_to_macro_run(row)?);
            }
            Ok(runs)
        })
        .await
    }
}
