use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::emulators::ensure_emulator;
use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, to_i64, to_u64},
    },
    full_scan::FullScanData,
    scan::Resources,
    store::ScanSnapshot,
};

impl Database {
    /// Snapshot row plus one `scan_resources` row per resource, atomically.
    pub async fn insert_scan_snapshot(&self, snapshot: &ScanSnapshot) -> Result<i64> {
        let snapshot = snapshot.clone();
        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to open snapshot transaction")?;
            let emulator_id = ensure_emulator(&tx, &snapshot.serial, &snapshot.emulator_name)?;
            let data = &snapshot.data;

            tx.execute(
                "INSERT INTO scan_snapshots (emulator_id, scan_type, lord_name, power, hall_level, market_level, pet_token, scan_status, duration_ms, raw_ocr_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    emulator_id,
                    snapshot.scan_type,
                    data.lord_name,
                    to_i64(data.power)?,
                    data.hall_level,
                    data.market_level,
                    to_i64(data.pet_token)?,
                    snapshot.scan_status,
                    to_i64(snapshot.duration_ms)?,
                    snapshot.raw_ocr_text,
                    snapshot.created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert scan snapshot")?;
            let snapshot_id = tx.last_insert_rowid();

            for (name, total) in data.resources.iter() {
                tx.execute(
                    "INSERT INTO scan_resources (snapshot_id, resource_type, total_value)
                     VALUES (?1, ?2, ?3)",
                    params![snapshot_id, name, to_i64(total)?],
                )
                .with_context(|| format!("failed to insert {name} for snapshot {snapshot_id}"))?;
            }

            tx.commit().context("failed to commit scan snapshot")?;
            Ok(snapshot_id)
        })
        .await
    }

    pub async fn latest_scan_snapshot(&self, serial: &str) -> Result<Option<ScanSnapshot>> {
        let serial = serial.to_string();
        self.execute(move |conn| {
            let row = conn
                .query_row(
                    "SELECT s.id, e.emu_index, e.serial, e.name, s.scan_type, s.scan_status,
                            s.lord_name, s.power, s.hall_level, s.market_level, s.pet_token,
                            s.duration_ms, s.raw_ocr_text, s.created_at
                     FROM scan_snapshots s
                     JOIN emulators e ON e.id = s.emulator_id
                     WHERE e.serial = ?1
                     ORDER BY s.created_at DESC, s.id DESC
                     LIMIT 1",
                    params![serial],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<u32>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, i64>(7)?,
                            row.get::<_, u32>(8)?,
                            row.get::<_, u32>(9)?,
                            row.get::<_, i64>(10)?,
                            row.get::<_, i64>(11)?,
                            row.get::<_, String>(12)?,
                            row.get::<_, String>(13)?,
                        ))
                    },
                )
                .optional()
                .context("failed to load latest snapshot")?;

            let Some((
                id,
                emu_index,
                serial,
                emulator_name,
                scan_type,
                scan_status,
                lord_name,
                power,
                hall_level,
                market_level,
                pet_token,
                duration_ms,
                raw_ocr_text,
                created_at,
            )) = row
            else {
                return Ok(None);
            };

            let mut resources = Resources::default();
            let mut stmt = conn.prepare(
                "SELECT resource_type, total_value FROM scan_resources WHERE snapshot_id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let total = to_u64(row.get(1)?, "total_value")?;
                match name.as_str() {
                    "gold" => resources.gold = total,
                    "wood" => resources.wood = total,
                    "ore" => resources.ore = total,
                    "mana" => resources.mana = total,
                    other => log::debug!("ignoring unknown resource type {other}"),
                }
            }

            Ok(Some(ScanSnapshot {
                emulator_index: emu_index.unwrap_or_default(),
                serial,
                emulator_name,
                scan_type,
                scan_status,
                data: FullScanData {
                    lord_name,
                    power: to_u64(power, "power")?,
                    hall_level,
                    market_level,
                    pet_token: to_u64(pet_token, "pet_token")?,
                    resources,
                },
                duration_ms: to_u64(duration_ms, "duration_ms")?,
                raw_ocr_text,
                created_at: parse_datetime(&created_at, "created_at")?,
            }))
        })
        .await
    }
}
