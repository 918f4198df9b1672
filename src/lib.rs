//! Forensic Communication Analysis Engine
//!
//! Ingests communication artifacts (device message stores, mbox email
//! archives, chat exports, generic JSON stores), normalizes them into a
//! canonical item shape, enriches each item, and derives a
//! per-source analysis report: communication network, anomaly findings,
//! statistics and timeline.

pub mod cli;
pub mod detectors;
pub mod enrichment;
pub mod errors;
pub mod extractors;
pub mod models;
pub mod network;
pub mod normalizer;
pub mod orchestrator;
pub mod report;
pub mod storage;

pub use errors::{EngineError, EngineResult};
pub use orchestrator::Orchestrator;
pub use storage::EvidenceStore;
