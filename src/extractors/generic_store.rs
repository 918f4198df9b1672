//! Generic JSON store extractor.
//!
//! Fallback for sources already exported into a near-canonical shape:
//! a single JSON document holding an array of records (either at the
//! top level or under a `records` key).

use super::{Extractor, GenericRecord, RawRecord, RecordStream};
use crate::errors::{EngineError, EngineResult};
use std::path::Path;

#[derive(Default)]
pub struct GenericStoreExtractor;

impl GenericStoreExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for GenericStoreExtractor {
    fn extract(&self, artifact: &Path) -> EngineResult<RecordStream> {
        let raw = std::fs::read_to_string(artifact)
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| EngineError::extraction(artifact, format!("invalid JSON: {}", e)))?;

        let array = match &value {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(map) => match map.get("records") {
                Some(serde_json::Value::Array(items)) => items.clone(),
                _ => {
                    return Err(EngineError::extraction(
                        artifact,
                        "expected a JSON array of records (or a 'records' key)",
                    ))
                }
            },
            _ => {
                return Err(EngineError::extraction(
                    artifact,
                    "expected a JSON array of records",
                ))
            }
        };

        let records = array
            .into_iter()
            .map(serde_json::from_value::<GenericRecord>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::extraction(artifact, format!("bad record: {}", e)))?;

        log::debug!(
            "generic store {:?}: {} records",
            artifact.file_name().unwrap_or_default(),
            records.len()
        );

        Ok(Box::new(records.into_iter().map(RawRecord::GenericStore)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_top_level_array() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"[{{"external_id":"r1","timestamp":"2024-03-04T10:00:00Z","sender":"ops@x","recipients":["lead@x"],"content":"shipment cleared customs"}}]"#
        )
        .unwrap();
        let records: Vec<_> = GenericStoreExtractor::new().extract(f.path()).unwrap().collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_records_key_wrapper() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"records":[{{"external_id":"r1","timestamp":1709546400,"sender":"a","recipients":["b"],"content":"ok","deleted":true}}]}}"#
        )
        .unwrap();
        let records: Vec<_> = GenericStoreExtractor::new().extract(f.path()).unwrap().collect();
        let RawRecord::GenericStore(rec) = &records[0] else {
            panic!("wrong variant");
        };
        assert!(rec.deleted);
    }

    #[test]
    fn test_non_array_fails() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"sender":"a"}}"#).unwrap();
        assert!(GenericStoreExtractor::new().extract(f.path()).is_err());
    }
}
