//! Canonical data model for the analysis engine.
//!
//! Three persisted entities (`ForensicSource`, `ForensicItem`,
//! `AnomalyFinding`) plus the derived `CommunicationNetwork` and the
//! aggregate `AnalysisReport` consumed by external renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Serialize through serde so the wire name and the display name agree.
macro_rules! fmt_via_serde {
    () => {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
            write!(f, "{}", s.trim_matches('"'))
        }
    };
}

/// Declared type of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Device message store (iMessage-style SQLite backup)
    DeviceBackup,
    /// mbox email archive with RFC-822 headers
    EmailArchive,
    /// JSON-lines chat application export
    ChatExport,
    /// Generic JSON record store in near-canonical shape
    GenericStore,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::DeviceBackup => "device_backup",
            SourceType::EmailArchive => "email_archive",
            SourceType::ChatExport => "chat_export",
            SourceType::GenericStore => "generic_store",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle state of a source run. Transitions are monotonic:
/// Pending -> Processing -> Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for SourceStatus {
    fmt_via_serde!();
}

/// One uploaded artifact under analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicSource {
    pub id: String,
    pub case_id: String,
    pub name: String,
    pub source_type: SourceType,
    pub artifact_path: PathBuf,
    pub file_size: u64,
    /// SHA-256 of the artifact, computed once at ingestion.
    pub sha256: String,
    pub status: SourceStatus,
    /// 0-100
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub uploader_id: String,
    pub items_extracted: u64,
    /// Records dropped by normalization failures (non-fatal).
    pub records_skipped: u64,
}

/// Canonical type of one communication record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Email,
    Sms,
    ChatIm,
    ChatProprietary,
    CallLog,
}

impl std::fmt::Display for ItemType {
    fmt_via_serde!();
}

/// One attachment carried by an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

/// One extracted named entity with its character span in the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Reserved participant sentinel for the device/account owner.
pub const SELF_PARTICIPANT: &str = "self";

/// One canonical, normalized communication unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicItem {
    pub id: String,
    pub source_id: String,
    pub item_type: ItemType,
    /// Source-native identifier, kept for traceability.
    pub external_id: String,
    pub thread_id: Option<String>,
    /// Always UTC, regardless of the source epoch.
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    /// Never empty; together with sender forms the participant set.
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub content: String,
    pub content_type: String,
    pub attachments: Vec<AttachmentDescriptor>,
    /// Source-specific technical fields; always carries at least the
    /// source-native message id.
    pub headers: BTreeMap<String, String>,
    /// Polarity in [-1.0, 1.0].
    pub sentiment: f64,
    pub language: String,
    /// Case-folded, deduplicated, capped to 20 by first appearance.
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
    /// Heuristic relevance in [0.1, 1.0].
    pub relevance: f64,
    pub is_deleted: bool,
    pub is_encrypted: bool,
    pub is_flagged: bool,
    pub is_suspicious: bool,
}

impl ForensicItem {
    /// `{sender} ∪ recipients`; cardinality is always >= 2.
    pub fn participants(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.recipients.iter().cloned().collect();
        set.insert(self.sender.clone());
        set
    }

    /// Short human-readable line for timeline projections.
    pub fn summary(&self) -> String {
        if let Some(subject) = &self.subject {
            if !subject.trim().is_empty() {
                return subject.trim().to_string();
            }
        }
        let trimmed = self.content.trim();
        if trimmed.chars().count() > 80 {
            let cut: String = trimmed.chars().take(77).collect();
            format!("{}...", cut)
        } else {
            trimmed.to_string()
        }
    }
}

/// Severity of one anomaly finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Warning,
}

impl Severity {
    /// Ordering rank for insight lists (most urgent first).
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 4,
            Severity::Warning => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }
}

impl std::fmt::Display for Severity {
    fmt_via_serde!();
}

/// One detected anomalous pattern with supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFinding {
    /// Stable machine tag, e.g. `deletion_pattern`.
    pub kind: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Item ids this finding is based on, for cross-referencing.
    pub item_ids: Vec<String>,
    /// Detection rationale / metric value behind the trigger.
    pub metric: f64,
}

/// One participant node with its centrality metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
}

/// One undirected weighted edge. `a < b` lexicographically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub a: String,
    pub b: String,
    /// Exact count of items connecting the pair.
    pub weight: u64,
}

/// Weighted communication graph, recomputed per analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationNetwork {
    /// Sorted by node id.
    pub nodes: Vec<NetworkNode>,
    /// Sorted by (a, b).
    pub edges: Vec<NetworkEdge>,
    pub density: f64,
    pub average_clustering: f64,
}

/// Volume of one contact in the top-contacts list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactVolume {
    pub participant: String,
    pub items: u64,
}

/// Bucketed positive/negative/neutral counts over all items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    /// sentiment > 0.3
    pub positive: u64,
    /// sentiment < -0.3
    pub negative: u64,
    pub neutral: u64,
    pub mean: f64,
}

/// Aggregate communication statistics for one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationStats {
    pub by_type: BTreeMap<String, u64>,
    pub by_hour: Vec<u64>,
    pub by_weekday: Vec<u64>,
    /// Keyed "YYYY-MM".
    pub by_month: BTreeMap<String, u64>,
    /// Descending by volume, capped to 20.
    pub top_contacts: Vec<ContactVolume>,
    pub sentiment: SentimentSummary,
}

/// One day of the sentiment time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentPoint {
    /// "YYYY-MM-DD" (UTC)
    pub day: String,
    pub mean_sentiment: f64,
    pub items: u64,
}

/// One chronological timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
    pub item_type: ItemType,
    pub sender: String,
    pub summary: String,
}

/// One entry of the ordered insights list: an informational observation
/// or a rendered anomaly finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub label: String,
    pub detail: String,
    /// Present for anomaly-backed insights, absent for observations.
    pub severity: Option<Severity>,
}

/// Min/max timestamps over the item set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregate analysis output scoped to one source. Immutable once
/// composed; regenerated in full on re-analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source_id: String,
    pub total_items: u64,
    pub date_range: Option<DateRange>,
    pub stats: CommunicationStats,
    pub sentiment_series: Vec<SentimentPoint>,
    pub network: CommunicationNetwork,
    /// Ascending by timestamp.
    pub timeline: Vec<TimelineEntry>,
    pub findings: Vec<AnomalyFinding>,
    /// Observations first, then findings ordered by severity rank.
    pub insights: Vec<Insight>,
}
