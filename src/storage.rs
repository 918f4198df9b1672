//! Evidence store - rusqlite persistence for sources, items, findings
//! and reports.
//!
//! One database per case workspace. Items and findings cascade with
//! their source; findings and reports are regenerated in full on each
//! analysis run, never patched.

use crate::errors::{EngineError, EngineResult};
use crate::models::{
    AnalysisReport, AnomalyFinding, ForensicItem, ForensicSource, ItemType, Severity, SourceStatus,
    SourceType,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    name TEXT NOT NULL,
    source_type TEXT NOT NULL,
    artifact_path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    uploader_id TEXT NOT NULL,
    items_extracted INTEGER NOT NULL DEFAULT 0,
    records_skipped INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    item_type TEXT NOT NULL,
    external_id TEXT NOT NULL,
    thread_id TEXT,
    timestamp TEXT NOT NULL,
    sender TEXT NOT NULL,
    recipients TEXT NOT NULL,
    subject TEXT,
    content TEXT NOT NULL,
    content_type TEXT NOT NULL,
    attachments TEXT NOT NULL,
    headers TEXT NOT NULL,
    sentiment REAL NOT NULL,
    language TEXT NOT NULL,
    keywords TEXT NOT NULL,
    entities TEXT NOT NULL,
    relevance REAL NOT NULL,
    is_deleted INTEGER NOT NULL,
    is_encrypted INTEGER NOT NULL,
    is_flagged INTEGER NOT NULL,
    is_suspicious INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_id, timestamp);
CREATE TABLE IF NOT EXISTS findings (
    id INTEGER PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    severity TEXT NOT NULL,
    item_ids TEXT NOT NULL,
    metric REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS reports (
    source_id TEXT PRIMARY KEY REFERENCES sources(id) ON DELETE CASCADE,
    report TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Parse a JSON column inside a row-mapping closure, surfacing the
/// failure as a rusqlite conversion error.
fn json_col<T: serde::de::DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_utc(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub struct EvidenceStore {
    conn: Mutex<Connection>,
}

impl EvidenceStore {
    /// Open (or create) the evidence database at the given path.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register one uploaded artifact: size and integrity hash are
    /// computed here, once, and never recomputed. Status starts Pending.
    pub fn create_source(
        &self,
        case_id: &str,
        name: &str,
        source_type: SourceType,
        artifact_path: &Path,
        uploader_id: &str,
    ) -> EngineResult<ForensicSource> {
        let metadata = std::fs::metadata(artifact_path)
            .map_err(|e| EngineError::io(e, Some(artifact_path.to_path_buf())))?;

        let mut file = std::fs::File::open(artifact_path)
            .map_err(|e| EngineError::io(e, Some(artifact_path.to_path_buf())))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)
            .map_err(|e| EngineError::io(e, Some(artifact_path.to_path_buf())))?;

        let source = ForensicSource {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            name: name.to_string(),
            source_type,
            artifact_path: artifact_path.to_path_buf(),
            file_size: metadata.len(),
            sha256: hex::encode(hasher.finalize()),
            status: SourceStatus::Pending,
            progress: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            uploader_id: uploader_id.to_string(),
            items_extracted: 0,
            records_skipped: 0,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sources (id, case_id, name, source_type, artifact_path, file_size,
                 sha256, status, progress, created_at, uploader_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                source.id,
                source.case_id,
                source.name,
                source.source_type.to_string(),
                source.artifact_path.to_string_lossy(),
                source.file_size,
                source.sha256,
                source.status.to_string(),
                source.progress,
                source.created_at.to_rfc3339(),
                source.uploader_id,
            ],
        )?;

        log::info!(
            "registered source {} ({}, {} bytes, sha256 {})",
            source.id,
            source.source_type,
            source.file_size,
            &source.sha256[..12.min(source.sha256.len())]
        );
        Ok(source)
    }

    pub fn get_source(&self, id: &str) -> EngineResult<ForensicSource> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, case_id, name, source_type, artifact_path, file_size, sha256,
                    status, progress, error, created_at, completed_at, uploader_id,
                    items_extracted, records_skipped
             FROM sources WHERE id = ?1",
        )?;
        let source = stmt
            .query_row(params![id], |row| {
                Ok(ForensicSource {
                    id: row.get(0)?,
                    case_id: row.get(1)?,
                    name: row.get(2)?,
                    source_type: json_col(3, format!("\"{}\"", row.get::<_, String>(3)?))?,
                    artifact_path: std::path::PathBuf::from(row.get::<_, String>(4)?),
                    file_size: row.get(5)?,
                    sha256: row.get(6)?,
                    status: json_col(7, format!("\"{}\"", row.get::<_, String>(7)?))?,
                    progress: row.get(8)?,
                    error: row.get(9)?,
                    created_at: parse_utc(10, row.get::<_, String>(10)?)?,
                    completed_at: match row.get::<_, Option<String>>(11)? {
                        Some(raw) => Some(parse_utc(11, raw)?),
                        None => None,
                    },
                    uploader_id: row.get(12)?,
                    items_extracted: row.get(13)?,
                    records_skipped: row.get(14)?,
                })
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => EngineError::SourceNotFound(id.to_string()),
                other => EngineError::Persistence(other),
            })?;
        Ok(source)
    }

    /// Advance the source state machine. Terminal states record the
    /// completion timestamp; a failure preserves the underlying message.
    pub fn update_status(
        &self,
        id: &str,
        status: SourceStatus,
        error: Option<&str>,
    ) -> EngineResult<()> {
        let completed_at = match status {
            SourceStatus::Completed | SourceStatus::Failed => Some(Utc::now().to_rfc3339()),
            _ => None,
        };
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sources SET status = ?2, error = ?3, completed_at = ?4 WHERE id = ?1",
            params![id, status.to_string(), error, completed_at],
        )?;
        if changed == 0 {
            return Err(EngineError::SourceNotFound(id.to_string()));
        }
        log::debug!("source {} -> {}", id, status);
        Ok(())
    }

    pub fn update_progress(
        &self,
        id: &str,
        progress: u8,
        items_extracted: u64,
        records_skipped: u64,
    ) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sources SET progress = ?2, items_extracted = ?3, records_skipped = ?4
             WHERE id = ?1",
            params![id, progress.min(100), items_extracted, records_skipped],
        )?;
        Ok(())
    }

    /// Read-only status boundary: status, progress and error message.
    pub fn source_status(&self, id: &str) -> EngineResult<(SourceStatus, u8, Option<String>)> {
        let source = self.get_source(id)?;
        Ok((source.status, source.progress, source.error))
    }

    /// Drop all items of one source. Called when a run re-enters
    /// Processing so items committed by an aborted run are replaced
    /// wholesale, never appended to.
    pub fn delete_items(&self, source_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM items WHERE source_id = ?1", params![source_id])?;
        Ok(())
    }

    /// Bulk-insert one batch of items inside a transaction.
    pub fn insert_items(&self, items: &[ForensicItem]) -> EngineResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (id, source_id, item_type, external_id, thread_id, timestamp,
                     sender, recipients, subject, content, content_type, attachments, headers,
                     sentiment, language, keywords, entities, relevance,
                     is_deleted, is_encrypted, is_flagged, is_suspicious)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21, ?22)",
            )?;
            for item in items {
                stmt.execute(params![
                    item.id,
                    item.source_id,
                    item.item_type.to_string(),
                    item.external_id,
                    item.thread_id,
                    item.timestamp.to_rfc3339(),
                    item.sender,
                    serde_json::to_string(&item.recipients)?,
                    item.subject,
                    item.content,
                    item.content_type,
                    serde_json::to_string(&item.attachments)?,
                    serde_json::to_string(&item.headers)?,
                    item.sentiment,
                    item.language,
                    serde_json::to_string(&item.keywords)?,
                    serde_json::to_string(&item.entities)?,
                    item.relevance,
                    item.is_deleted,
                    item.is_encrypted,
                    item.is_flagged,
                    item.is_suspicious,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All items of one source, ascending by timestamp (id tie-break).
    pub fn load_items(&self, source_id: &str) -> EngineResult<Vec<ForensicItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_id, item_type, external_id, thread_id, timestamp, sender,
                    recipients, subject, content, content_type, attachments, headers,
                    sentiment, language, keywords, entities, relevance,
                    is_deleted, is_encrypted, is_flagged, is_suspicious
             FROM items WHERE source_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let items = stmt
            .query_map(params![source_id], |row| {
                Ok(ForensicItem {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    item_type: json_col::<ItemType>(2, format!("\"{}\"", row.get::<_, String>(2)?))?,
                    external_id: row.get(3)?,
                    thread_id: row.get(4)?,
                    timestamp: parse_utc(5, row.get::<_, String>(5)?)?,
                    sender: row.get(6)?,
                    recipients: json_col(7, row.get::<_, String>(7)?)?,
                    subject: row.get(8)?,
                    content: row.get(9)?,
                    content_type: row.get(10)?,
                    attachments: json_col(11, row.get::<_, String>(11)?)?,
                    headers: json_col(12, row.get::<_, String>(12)?)?,
                    sentiment: row.get(13)?,
                    language: row.get(14)?,
                    keywords: json_col(15, row.get::<_, String>(15)?)?,
                    entities: json_col(16, row.get::<_, String>(16)?)?,
                    relevance: row.get(17)?,
                    is_deleted: row.get(18)?,
                    is_encrypted: row.get(19)?,
                    is_flagged: row.get(20)?,
                    is_suspicious: row.get(21)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Replace the findings of one source. Findings are regenerated in
    /// full on each run, never patched incrementally.
    pub fn save_findings(&self, source_id: &str, findings: &[AnomalyFinding]) -> EngineResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM findings WHERE source_id = ?1", params![source_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO findings (source_id, kind, title, description, severity, item_ids, metric)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for finding in findings {
                stmt.execute(params![
                    source_id,
                    finding.kind,
                    finding.title,
                    finding.description,
                    finding.severity.to_string(),
                    serde_json::to_string(&finding.item_ids)?,
                    finding.metric,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_findings(&self, source_id: &str) -> EngineResult<Vec<AnomalyFinding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT kind, title, description, severity, item_ids, metric
             FROM findings WHERE source_id = ?1 ORDER BY id ASC",
        )?;
        let findings = stmt
            .query_map(params![source_id], |row| {
                Ok(AnomalyFinding {
                    kind: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    severity: json_col::<Severity>(3, format!("\"{}\"", row.get::<_, String>(3)?))?,
                    item_ids: json_col(4, row.get::<_, String>(4)?)?,
                    metric: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(findings)
    }

    /// Materialize the report. One row per source, replaced on re-analysis.
    pub fn save_report(&self, report: &AnalysisReport) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO reports (source_id, report, created_at) VALUES (?1, ?2, ?3)",
            params![
                report.source_id,
                serde_json::to_string(report)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Output boundary: the report, only once the source is Completed.
    pub fn load_report(&self, source_id: &str) -> EngineResult<AnalysisReport> {
        let source = self.get_source(source_id)?;
        if source.status != SourceStatus::Completed {
            return Err(EngineError::ReportUnavailable {
                id: source_id.to_string(),
                status: source.status.to_string(),
            });
        }
        let conn = self.conn.lock().unwrap();
        let raw: String = conn.query_row(
            "SELECT report FROM reports WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Deleting a source cascades to its items, findings and report.
    pub fn delete_source(&self, id: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Sources stuck in Processing (e.g. after a crash mid-run). There
    /// is no self-healing; these need external remediation.
    pub fn stale_processing_sources(&self) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM sources WHERE status = 'processing'")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
