//! Device message store extractor (iMessage-style SQLite backup).
//!
//! Reads the `message` table joined against `handle`, tolerating the
//! schema drift between store generations: optional columns are
//! substituted with defaults when the store predates them.

use super::{DeviceBackupRow, Extractor, RawRecord, RecordStream};
use crate::errors::{EngineError, EngineResult};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Default)]
pub struct DeviceBackupExtractor;

impl DeviceBackupExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_sqlite(path: &Path) -> bool {
        let mut buffer = [0u8; 16];
        if let Ok(mut file) = File::open(path) {
            if file.read_exact(&mut buffer).is_ok() {
                return &buffer == SQLITE_MAGIC;
            }
        }
        false
    }

    fn message_columns(conn: &Connection, artifact: &Path) -> EngineResult<HashSet<String>> {
        let mut stmt = conn
            .prepare("PRAGMA table_info(message)")
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect::<HashSet<_>>();
        Ok(names)
    }
}

impl Extractor for DeviceBackupExtractor {
    fn extract(&self, artifact: &Path) -> EngineResult<RecordStream> {
        if !Self::is_sqlite(artifact) {
            return Err(EngineError::extraction(
                artifact,
                "not a SQLite database (bad magic)",
            ));
        }

        let conn = Connection::open_with_flags(artifact, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;

        let columns = Self::message_columns(&conn, artifact)?;
        for required in ["guid", "text", "date", "is_from_me", "handle_id"] {
            if !columns.contains(required) {
                return Err(EngineError::extraction(
                    artifact,
                    format!("message table is missing required column '{}'", required),
                ));
            }
        }

        // Substitute defaults for columns the store generation lacks.
        let select = |name: &str, default: &str| -> String {
            if columns.contains(name) {
                format!("m.{}", name)
            } else {
                default.to_string()
            }
        };
        let sql = format!(
            "SELECT m.guid, m.text, m.date, m.is_from_me, h.id, {service}, {thread}, \
             {deleted}, {audio} \
             FROM message m LEFT JOIN handle h ON m.handle_id = h.ROWID \
             ORDER BY m.date ASC",
            service = select("service", "NULL"),
            thread = select("cache_roomnames", "NULL"),
            deleted = select("is_deleted", "0"),
            audio = select("is_audio_message", "0"),
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DeviceBackupRow {
                    guid: row.get(0)?,
                    text: row.get(1)?,
                    date_ticks: row.get(2)?,
                    is_from_me: row.get::<_, i64>(3)? != 0,
                    handle: row.get(4)?,
                    service: row.get(5)?,
                    thread: row.get(6)?,
                    is_deleted: row.get::<_, i64>(7)? != 0,
                    is_audio: row.get::<_, i64>(8)? != 0,
                })
            })
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;

        log::debug!(
            "device backup {:?}: {} message rows",
            artifact.file_name().unwrap_or_default(),
            rows.len()
        );

        Ok(Box::new(rows.into_iter().map(RawRecord::DeviceBackup)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a minimal iMessage-style store for tests.
    pub(crate) fn build_fixture(dir: &Path, rows: &[(&str, &str, i64, bool, &str)]) -> std::path::PathBuf {
        let db_path = dir.join("sms.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
             CREATE TABLE message (
                 ROWID INTEGER PRIMARY KEY,
                 guid TEXT, text TEXT, date INTEGER,
                 is_from_me INTEGER, handle_id INTEGER,
                 service TEXT, cache_roomnames TEXT,
                 is_deleted INTEGER DEFAULT 0,
                 is_audio_message INTEGER DEFAULT 0
             );",
        )
        .unwrap();
        for (i, (guid, text, ticks, from_me, handle)) in rows.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO handle (ROWID, id) VALUES (?1, ?2)",
                rusqlite::params![i as i64 + 1, handle],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO message (guid, text, date, is_from_me, handle_id, service)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'iMessage')",
                rusqlite::params![guid, text, ticks, *from_me as i64, i as i64 + 1],
            )
            .unwrap();
        }
        db_path
    }

    #[test]
    fn test_rejects_non_sqlite_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.db");
        std::fs::write(&path, b"definitely not sqlite").unwrap();

        let err = DeviceBackupExtractor::new()
            .extract(&path)
            .err()
            .expect("extraction should fail");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_rejects_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE message (ROWID INTEGER PRIMARY KEY, body TEXT);")
            .unwrap();
        drop(conn);

        let err = DeviceBackupExtractor::new()
            .extract(&path)
            .err()
            .expect("extraction should fail");
        assert!(err.to_string().contains("missing required column"));
    }

    #[test]
    fn test_extracts_rows_with_direction_flag() {
        let dir = TempDir::new().unwrap();
        let path = build_fixture(
            dir.path(),
            &[
                ("g1", "see you soon", 700_000_000, true, "+15551234"),
                ("g2", "on my way", 700_000_060, false, "+15551234"),
            ],
        );

        let records: Vec<_> = DeviceBackupExtractor::new().extract(&path).unwrap().collect();
        assert_eq!(records.len(), 2);
        match &records[0] {
            RawRecord::DeviceBackup(row) => {
                assert_eq!(row.guid, "g1");
                assert!(row.is_from_me);
                assert_eq!(row.handle.as_deref(), Some("+15551234"));
                assert_eq!(row.date_ticks, 700_000_000);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
