//! Run orchestrator - drives one source through the analysis pipeline.
//!
//! State machine per source: Pending -> Processing -> Completed or
//! Failed. A Failed source may be re-run, which clears the recorded
//! error and re-enters Processing; Completed and Processing sources
//! reject new runs. Extraction and persistence errors abort the run,
//! per-record normalization errors only skip the record.

use crate::detectors;
use crate::enrichment::EnrichmentEngine;
use crate::errors::{EngineError, EngineResult};
use crate::extractors;
use crate::models::{AnalysisReport, ForensicItem, ForensicSource, SourceStatus};
use crate::normalizer;
use crate::storage::EvidenceStore;
use crate::{network, report};
use indicatif::ProgressBar;
use std::sync::Arc;

/// Items persisted per transaction.
const PERSIST_BATCH: usize = 100;

pub struct Orchestrator {
    store: Arc<EvidenceStore>,
    enrichment: Arc<EnrichmentEngine>,
}

impl Orchestrator {
    pub fn new(store: Arc<EvidenceStore>) -> Self {
        Self {
            store,
            enrichment: Arc::new(EnrichmentEngine::new()),
        }
    }

    /// Process one source end to end and return its report. The report
    /// is also persisted, so later reads go through the store.
    pub async fn run(
        &self,
        source_id: &str,
        bar: Option<&ProgressBar>,
    ) -> EngineResult<AnalysisReport> {
        let source = self.store.get_source(source_id)?;
        match source.status {
            SourceStatus::Pending => {}
            SourceStatus::Failed => {
                log::info!("re-running failed source {}", source.id);
            }
            other => {
                return Err(EngineError::InvalidState {
                    id: source.id,
                    status: other.to_string(),
                });
            }
        }

        // Entering Processing clears any previous error and progress,
        // and drops items left behind by an earlier aborted run.
        self.store.update_status(&source.id, SourceStatus::Processing, None)?;
        self.store.update_progress(&source.id, 0, 0, 0)?;
        self.store.delete_items(&source.id)?;

        match self.process(&source, bar) {
            Ok(report) => {
                self.store.update_status(&source.id, SourceStatus::Completed, None)?;
                log::info!(
                    "source {} completed: {} items, {} findings",
                    source.id,
                    report.total_items,
                    report.findings.len()
                );
                Ok(report)
            }
            Err(err) => {
                let message = err.to_string();
                log::error!("source {} failed: {}", source.id, message);
                if let Err(persist_err) =
                    self.store.update_status(&source.id, SourceStatus::Failed, Some(&message))
                {
                    log::error!(
                        "could not record failure for {}: {}",
                        source.id,
                        persist_err
                    );
                }
                Err(err)
            }
        }
    }

    fn process(
        &self,
        source: &ForensicSource,
        bar: Option<&ProgressBar>,
    ) -> EngineResult<AnalysisReport> {
        let extractor = extractors::for_source_type(source.source_type);
        let records = extractor.extract(&source.artifact_path)?;

        let mut extracted: u64 = 0;
        let mut skipped: u64 = 0;
        let mut batches: u8 = 0;
        let mut batch: Vec<ForensicItem> = Vec::with_capacity(PERSIST_BATCH);
        let mut items: Vec<ForensicItem> = Vec::new();

        for record in records {
            let external_id = record.external_id();
            match normalizer::normalize(record, source.source_type, &source.id) {
                Ok(mut item) => {
                    let enriched = self.enrichment.enrich(&item.content);
                    item.sentiment = enriched.sentiment;
                    item.language = enriched.language;
                    item.keywords = enriched.keywords;
                    item.entities = enriched.entities;
                    item.relevance = enriched.relevance;
                    item.is_suspicious = detectors::matches_watchlist(&item.content);

                    extracted += 1;
                    batch.push(item);
                    if batch.len() >= PERSIST_BATCH {
                        self.store.insert_items(&batch)?;
                        items.append(&mut batch);
                        batches = batches.saturating_add(1);
                        // Record count is unknown up front; creep toward
                        // the post-extraction checkpoint.
                        let progress = (5 + 5 * batches as u64).min(65) as u8;
                        self.store.update_progress(&source.id, progress, extracted, skipped)?;
                    }
                }
                Err(err) if !err.is_fatal() => {
                    skipped += 1;
                    log::warn!("skipping record {:?}: {}", external_id, err);
                }
                Err(err) => return Err(err),
            }
            if let Some(bar) = bar {
                bar.inc(1);
            }
        }
        if !batch.is_empty() {
            self.store.insert_items(&batch)?;
            items.append(&mut batch);
        }
        self.store.update_progress(&source.id, 70, extracted, skipped)?;
        log::debug!(
            "source {}: extracted {} items, skipped {} records",
            source.id,
            extracted,
            skipped
        );

        let network = network::build(&items);
        let findings = detectors::run_all(&items);
        self.store.save_findings(&source.id, &findings)?;
        self.store.update_progress(&source.id, 90, extracted, skipped)?;

        let report = report::compose(&source.id, &items, network, findings);
        self.store.save_report(&report)?;
        self.store.update_progress(&source.id, 100, extracted, skipped)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use std::io::{Seek, Write};
    use tempfile::{NamedTempFile, TempDir};

    const THREE_MESSAGE_MBOX: &str = "\
From alice@example.com Mon Mar  4 10:00:00 2024
From: alice@example.com
To: bob@example.com
Subject: Site visit schedule
Message-ID: <r1@example.com>
Date: Mon, 4 Mar 2024 10:00:00 +0000

The schedule for the site visit is settled for Thursday morning.

From bob@example.com Mon Mar  4 11:00:00 2024
From: bob@example.com
To: alice@example.com
Subject: Re: Site visit schedule
Message-ID: <r2@example.com>
In-Reply-To: <r1@example.com>
Date: Mon, 4 Mar 2024 11:00:00 +0000

Thursday morning works on this end as well.

From alice@example.com Mon Mar  4 12:00:00 2024
From: alice@example.com
To: bob@example.com
Subject: Re: Site visit schedule
Message-ID: <r3@example.com>
In-Reply-To: <r2@example.com>
Date: Mon, 4 Mar 2024 12:00:00 +0000

Noted, the visitor passes will be ready at the front desk.
";

    fn mbox_source(store: &EvidenceStore, content: &str) -> (crate::models::ForensicSource, NamedTempFile) {
        let mut artifact = NamedTempFile::new().unwrap();
        artifact.write_all(content.as_bytes()).unwrap();
        let source = store
            .create_source("case-1", "mail export", SourceType::EmailArchive, artifact.path(), "ex-1")
            .unwrap();
        (source, artifact)
    }

    #[tokio::test]
    async fn test_email_archive_end_to_end() {
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let (source, _artifact) = mbox_source(&store, THREE_MESSAGE_MBOX);

        let orchestrator = Orchestrator::new(Arc::clone(&store));
        let report = orchestrator.run(&source.id, None).await.unwrap();

        assert_eq!(report.total_items, 3);
        assert_eq!(report.network.nodes.len(), 2);
        assert_eq!(report.network.edges.len(), 1);
        assert_eq!(report.network.edges[0].weight, 3);
        assert!(report.findings.is_empty());

        let loaded = store.get_source(&source.id).unwrap();
        assert_eq!(loaded.status, SourceStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert_eq!(loaded.items_extracted, 3);
        assert_eq!(loaded.records_skipped, 0);
        assert!(loaded.completed_at.is_some());

        // The persisted report is byte-identical to the returned one.
        let stored = store.load_report(&source.id).unwrap();
        assert_eq!(
            serde_json::to_string(&stored).unwrap(),
            serde_json::to_string(&report).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rerun_produces_identical_report() {
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let (source, _artifact) = mbox_source(&store, THREE_MESSAGE_MBOX);
        let orchestrator = Orchestrator::new(Arc::clone(&store));

        let first = orchestrator.run(&source.id, None).await.unwrap();
        // Force the state machine back so a second run is allowed.
        store.update_status(&source.id, SourceStatus::Failed, Some("interrupted")).unwrap();
        let second = orchestrator.run(&source.id, None).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // Items of the first run are replaced, not appended to.
        assert_eq!(store.load_items(&source.id).unwrap().len(), 3);
        assert_eq!(store.get_source(&source.id).unwrap().items_extracted, 3);
    }

    #[tokio::test]
    async fn test_bad_artifact_fails_source() {
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let (source, _artifact) = mbox_source(&store, "this is not an mbox file\n");
        let orchestrator = Orchestrator::new(Arc::clone(&store));

        let err = orchestrator.run(&source.id, None).await.unwrap_err();
        assert!(err.is_fatal());

        let loaded = store.get_source(&source.id).unwrap();
        assert_eq!(loaded.status, SourceStatus::Failed);
        assert!(loaded.error.is_some());
        assert!(loaded.completed_at.is_some());
        assert!(matches!(
            store.load_report(&source.id),
            Err(EngineError::ReportUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_source_can_be_rerun_after_fix() {
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let (source, mut artifact) = mbox_source(&store, "garbage contents\n");
        let orchestrator = Orchestrator::new(Arc::clone(&store));

        assert!(orchestrator.run(&source.id, None).await.is_err());
        assert_eq!(store.get_source(&source.id).unwrap().status, SourceStatus::Failed);

        // Replace the artifact with valid content and re-run.
        artifact.rewind().unwrap();
        artifact.as_file().set_len(0).unwrap();
        artifact.write_all(THREE_MESSAGE_MBOX.as_bytes()).unwrap();
        artifact.flush().unwrap();

        let report = orchestrator.run(&source.id, None).await.unwrap();
        assert_eq!(report.total_items, 3);
        let loaded = store.get_source(&source.id).unwrap();
        assert_eq!(loaded.status, SourceStatus::Completed);
        assert!(loaded.error.is_none());
    }

    #[tokio::test]
    async fn test_completed_source_rejects_new_run() {
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let (source, _artifact) = mbox_source(&store, THREE_MESSAGE_MBOX);
        let orchestrator = Orchestrator::new(Arc::clone(&store));

        orchestrator.run(&source.id, None).await.unwrap();
        assert!(matches!(
            orchestrator.run(&source.id, None).await,
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmappable_records_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        // Third row has no handle and cannot be attributed to a peer.
        let path = crate::extractors::device_backup::tests::build_fixture(
            dir.path(),
            &[
                ("g1", "the shipment arrives thursday", 700_000_000, true, "+15551234"),
                ("g2", "understood, will be there", 700_000_100, false, "+15551234"),
                ("g3", "orphaned row with no peer", 700_000_200, false, ""),
            ],
        );
        let store = Arc::new(EvidenceStore::open_in_memory().unwrap());
        let source = store
            .create_source("case-2", "phone", SourceType::DeviceBackup, &path, "ex-1")
            .unwrap();

        let orchestrator = Orchestrator::new(Arc::clone(&store));
        let report = orchestrator.run(&source.id, None).await.unwrap();

        assert_eq!(report.total_items, 2);
        let loaded = store.get_source(&source.id).unwrap();
        assert_eq!(loaded.status, SourceStatus::Completed);
        assert_eq!(loaded.items_extracted, 2);
        assert_eq!(loaded.records_skipped, 1);
    }
}
