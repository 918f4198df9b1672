//! Format Extractors - per source-type readers
//!
//! Each extractor turns one evidence artifact into a sequence of raw,
//! source-native records. Supported formats:
//! - Device message stores (iMessage-style SQLite backups)
//! - mbox email archives with RFC-822 headers
//! - JSON-lines chat application exports
//! - Generic JSON record stores
//!
//! Extractors are strictly read-only: they never mutate the artifact.

pub mod chat_export;
pub mod device_backup;
pub mod email_archive;
pub mod generic_store;

pub use chat_export::ChatExportExtractor;
pub use device_backup::DeviceBackupExtractor;
pub use email_archive::EmailArchiveExtractor;
pub use generic_store::GenericStoreExtractor;

use crate::errors::EngineResult;
use crate::models::SourceType;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Attachment fields as the source exposes them, before mime fallback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttachment {
    pub name: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One row of a device message store.
#[derive(Debug, Clone)]
pub struct DeviceBackupRow {
    /// Source-native message guid.
    pub guid: String,
    pub text: Option<String>,
    /// Raw ticks since the 2001-01-01T00:00:00Z platform epoch
    /// (seconds on older stores, nanoseconds on modern ones).
    pub date_ticks: i64,
    /// True when the device owner authored the message.
    pub is_from_me: bool,
    /// Peer address/handle.
    pub handle: Option<String>,
    /// Transport service, e.g. "iMessage" or "SMS".
    pub service: Option<String>,
    /// Native conversation grouping key.
    pub thread: Option<String>,
    pub is_deleted: bool,
    pub is_audio: bool,
}

/// One RFC-822 message from an mbox archive.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    /// Unfolded headers in wire order.
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub attachments: Vec<RawAttachment>,
}

impl EmailRecord {
    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers with the given name, case-insensitive.
    pub fn headers_named(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// One row of a JSON-lines chat export.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRow {
    #[serde(default)]
    pub id: Option<String>,
    /// RFC 3339 string or unix seconds.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub from_me: Option<bool>,
    /// "in" / "out" fallback when `from_me` is absent.
    #[serde(default)]
    pub direction: Option<String>,
    /// Peer JID / handle.
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    /// "message" (default) or "call".
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

/// One record of a generic JSON store, already near-canonical.
#[derive(Debug, Clone, Deserialize)]
pub struct GenericRecord {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

/// A source-native record, tagged by the format it came from.
#[derive(Debug, Clone)]
pub enum RawRecord {
    DeviceBackup(DeviceBackupRow),
    EmailArchive(EmailRecord),
    ChatExport(ChatRow),
    GenericStore(GenericRecord),
}

impl RawRecord {
    /// Source-native identifier where the format exposes one.
    pub fn external_id(&self) -> Option<String> {
        match self {
            RawRecord::DeviceBackup(r) => Some(r.guid.clone()),
            RawRecord::EmailArchive(r) => r.header("Message-ID").map(|s| s.to_string()),
            RawRecord::ChatExport(r) => r.id.clone(),
            RawRecord::GenericStore(r) => r.external_id.clone(),
        }
    }
}

/// Lazy sequence of raw records produced by one extractor.
pub type RecordStream = Box<dyn Iterator<Item = RawRecord> + Send>;

/// Shared capability interface over all format readers.
pub trait Extractor: Send + Sync {
    /// Open the artifact and yield its raw records. Fails with a fatal
    /// extraction error when the artifact cannot be opened or its
    /// internal schema does not match the declared source type.
    fn extract(&self, artifact: &Path) -> EngineResult<RecordStream>;
}

/// Closed dispatch from the declared source type to its extractor.
pub fn for_source_type(source_type: SourceType) -> Box<dyn Extractor> {
    match source_type {
        SourceType::DeviceBackup => Box::new(DeviceBackupExtractor::new()),
        SourceType::EmailArchive => Box::new(EmailArchiveExtractor::new()),
        SourceType::ChatExport => Box::new(ChatExportExtractor::new()),
        SourceType::GenericStore => Box::new(GenericStoreExtractor::new()),
    }
}
