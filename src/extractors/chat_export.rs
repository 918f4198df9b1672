//! Chat application export extractor (JSON lines).
//!
//! One JSON object per line with timestamp, direction flag and peer
//! JID/handle. Blank lines are skipped; a line that is not valid JSON
//! is a schema mismatch and fails the whole extraction.

use super::{ChatRow, Extractor, RawRecord, RecordStream};
use crate::errors::{EngineError, EngineResult};
use std::path::Path;

#[derive(Default)]
pub struct ChatExportExtractor;

impl ChatExportExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ChatExportExtractor {
    fn extract(&self, artifact: &Path) -> EngineResult<RecordStream> {
        let raw = std::fs::read_to_string(artifact)
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;

        let mut rows = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: ChatRow = serde_json::from_str(line).map_err(|e| {
                EngineError::extraction(
                    artifact,
                    format!("line {} is not a chat export row: {}", lineno + 1, e),
                )
            })?;
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(EngineError::extraction(artifact, "chat export contains no rows"));
        }

        log::debug!(
            "chat export {:?}: {} rows",
            artifact.file_name().unwrap_or_default(),
            rows.len()
        );

        Ok(Box::new(rows.into_iter().map(RawRecord::ChatExport)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parses_json_lines() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"{{"id":"c1","timestamp":"2024-03-04T10:00:00Z","from_me":true,"peer":"kim@s.whatsapp.net","text":"running late"}}"#
        )
        .unwrap();
        writeln!(f).unwrap();
        writeln!(
            f,
            r#"{{"id":"c2","timestamp":1709546460,"direction":"in","peer":"kim@s.whatsapp.net","text":"ok","encrypted":true}}"#
        )
        .unwrap();

        let records: Vec<_> = ChatExportExtractor::new().extract(f.path()).unwrap().collect();
        assert_eq!(records.len(), 2);
        let RawRecord::ChatExport(row) = &records[1] else {
            panic!("wrong variant");
        };
        assert_eq!(row.direction.as_deref(), Some("in"));
        assert!(row.encrypted);
    }

    #[test]
    fn test_bad_line_is_schema_mismatch() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "timestamp,peer,text").unwrap();
        let err = ChatExportExtractor::new()
            .extract(f.path())
            .err()
            .expect("extraction should fail");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_empty_export_fails() {
        let f = NamedTempFile::new().unwrap();
        assert!(ChatExportExtractor::new().extract(f.path()).is_err());
    }
}
