use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::jobs::index_for_serial;

/// Row id for `serial`, inserting the emulator on first sight. A non-empty
/// `name` overwrites the stored one.
pub(crate) fn ensure_emulator(conn: &Connection, serial: &str, name: &str) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM emulators WHERE serial = ?1",
            params![serial],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up emulator")?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE emulators
                 SET last_seen_at = ?1,
                     name = CASE WHEN ?2 = '' THEN name ELSE ?2 END
                 WHERE id = ?3",
                params![now, name, id],
            )
            .context("failed to touch emulator")?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO emulators (emu_index, serial, name, last_seen_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![index_for_serial(serial), serial, name, now],
            )
            .context("failed to insert emulator")?;
            Ok(conn.last_insert_rowid())
        }
    }
}
