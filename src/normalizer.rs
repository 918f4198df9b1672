//! Canonical Normalizer - deterministic RawRecord -> ForensicItem mapping.
//!
//! Pure per-record logic: epoch conversion, direction resolution,
//! participant extraction and header preservation. A record that cannot
//! be mapped raises a normalization error; the orchestrator skips it.

use crate::errors::{EngineError, EngineResult};
use crate::extractors::{ChatRow, DeviceBackupRow, EmailRecord, GenericRecord, RawAttachment, RawRecord};
use crate::models::{
    AttachmentDescriptor, ForensicItem, ItemType, SourceType, SELF_PARTICIPANT,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Device stores count ticks from 2001-01-01T00:00:00Z, not the unix epoch.
fn platform_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()
}

/// Raw tick values past this magnitude are nanosecond ticks; anything
/// smaller is whole seconds (legacy stores).
const NANOSECOND_TICK_THRESHOLD: i64 = 1_000_000_000_000;

/// Convert a raw device tick counter to UTC.
pub fn device_epoch_to_utc(ticks: i64) -> DateTime<Utc> {
    let seconds = if ticks.abs() >= NANOSECOND_TICK_THRESHOLD {
        ticks / 1_000_000_000
    } else {
        ticks
    };
    platform_epoch() + chrono::Duration::seconds(seconds)
}

/// Map one raw record into the canonical item shape.
pub fn normalize(record: RawRecord, source_type: SourceType, source_id: &str) -> EngineResult<ForensicItem> {
    match (record, source_type) {
        (RawRecord::DeviceBackup(row), SourceType::DeviceBackup) => device_row(row, source_id),
        (RawRecord::EmailArchive(rec), SourceType::EmailArchive) => email_record(rec, source_id),
        (RawRecord::ChatExport(row), SourceType::ChatExport) => chat_row(row, source_id),
        (RawRecord::GenericStore(rec), SourceType::GenericStore) => generic_record(rec, source_id),
        (record, declared) => Err(EngineError::normalization(
            record.external_id(),
            format!("record does not belong to declared source type {}", declared),
        )),
    }
}

fn blank_item(source_id: &str, item_type: ItemType) -> ForensicItem {
    ForensicItem {
        id: uuid::Uuid::new_v4().to_string(),
        source_id: source_id.to_string(),
        item_type,
        external_id: String::new(),
        thread_id: None,
        timestamp: Utc::now(),
        sender: String::new(),
        recipients: Vec::new(),
        subject: None,
        content: String::new(),
        content_type: "text/plain".to_string(),
        attachments: Vec::new(),
        headers: BTreeMap::new(),
        sentiment: 0.0,
        language: "en".to_string(),
        keywords: Vec::new(),
        entities: Vec::new(),
        relevance: 0.1,
        is_deleted: false,
        is_encrypted: false,
        is_flagged: false,
        is_suspicious: false,
    }
}

fn device_row(row: DeviceBackupRow, source_id: &str) -> EngineResult<ForensicItem> {
    let peer = row
        .handle
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            EngineError::normalization(Some(row.guid.clone()), "message row has no peer handle")
        })?
        .to_string();

    let item_type = match row.service.as_deref() {
        Some(s) if s.eq_ignore_ascii_case("sms") => ItemType::Sms,
        _ => ItemType::ChatIm,
    };

    let mut item = blank_item(source_id, item_type);
    item.external_id = row.guid.clone();
    item.timestamp = device_epoch_to_utc(row.date_ticks);
    item.thread_id = row.thread.filter(|t| !t.is_empty());
    item.content = row.text.unwrap_or_default();
    item.is_deleted = row.is_deleted;
    if row.is_audio {
        item.content_type = "audio/amr".to_string();
    }

    // Owner-authored: sender is the reserved sentinel.
    if row.is_from_me {
        item.sender = SELF_PARTICIPANT.to_string();
        item.recipients = vec![peer];
    } else {
        item.sender = peer;
        item.recipients = vec![SELF_PARTICIPANT.to_string()];
    }

    item.headers.insert("message-id".to_string(), row.guid);
    if let Some(service) = row.service {
        item.headers.insert("service".to_string(), service);
    }
    Ok(item)
}

fn email_record(rec: EmailRecord, source_id: &str) -> EngineResult<ForensicItem> {
    let message_id = rec
        .header("Message-ID")
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::normalization(None, "email has no Message-ID header"))?;

    let sender = rec
        .header("From")
        .and_then(mailbox)
        .ok_or_else(|| {
            EngineError::normalization(Some(message_id.clone()), "email has no From address")
        })?;

    let mut recipients = Vec::new();
    for field in ["To", "Cc"] {
        if let Some(value) = rec.header(field) {
            for addr in value.split(',').filter_map(mailbox) {
                if addr != sender && !recipients.contains(&addr) {
                    recipients.push(addr);
                }
            }
        }
    }
    if recipients.is_empty() {
        return Err(EngineError::normalization(
            Some(message_id),
            "email has no recipients",
        ));
    }

    let timestamp = rec
        .header("Date")
        .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| {
            EngineError::normalization(Some(message_id.clone()), "email has no parseable Date")
        })?;

    let mut item = blank_item(source_id, ItemType::Email);
    item.external_id = message_id.clone();
    item.timestamp = timestamp;
    item.sender = sender;
    item.recipients = recipients;
    item.subject = rec.header("Subject").map(|s| s.to_string());
    item.content = rec.body.trim().to_string();
    item.content_type = rec
        .header("Content-Type")
        .map(|ct| ct.split(';').next().unwrap_or("text/plain").trim().to_string())
        .unwrap_or_else(|| "text/plain".to_string());
    // Thread identity follows the reference chain root when present.
    item.thread_id = rec
        .headers_named("References")
        .first()
        .and_then(|refs| refs.split_whitespace().next())
        .or(rec.header("In-Reply-To"))
        .map(|s| s.to_string());
    item.attachments = rec.attachments.iter().map(attachment).collect();

    item.headers.insert("message-id".to_string(), message_id);
    if let Some(reply) = rec.header("In-Reply-To") {
        item.headers.insert("in-reply-to".to_string(), reply.to_string());
    }
    let references = rec.headers_named("References").join(" ");
    if !references.is_empty() {
        item.headers.insert("references".to_string(), references);
    }
    Ok(item)
}

fn chat_row(row: ChatRow, source_id: &str) -> EngineResult<ForensicItem> {
    let timestamp = row
        .timestamp
        .as_ref()
        .and_then(flexible_timestamp)
        .ok_or_else(|| {
            EngineError::normalization(row.id.clone(), "chat row has no parseable timestamp")
        })?;

    let peer = row
        .peer
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| EngineError::normalization(row.id.clone(), "chat row has no peer"))?
        .to_string();

    let from_me = match (row.from_me, row.direction.as_deref()) {
        (Some(flag), _) => flag,
        (None, Some(dir)) => dir.eq_ignore_ascii_case("out"),
        (None, None) => {
            return Err(EngineError::normalization(
                row.id,
                "chat row has neither from_me nor direction",
            ))
        }
    };

    let item_type = match row.kind.as_deref() {
        Some(k) if k.eq_ignore_ascii_case("call") => ItemType::CallLog,
        _ => ItemType::ChatProprietary,
    };

    let external_id = row
        .id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", timestamp.timestamp(), peer));

    let mut item = blank_item(source_id, item_type);
    item.external_id = external_id.clone();
    item.timestamp = timestamp;
    item.thread_id = row.chat_id;
    item.content = row.text.unwrap_or_default();
    item.is_deleted = row.deleted;
    item.is_encrypted = row.encrypted;
    item.attachments = row.attachments.iter().map(attachment).collect();

    if from_me {
        item.sender = SELF_PARTICIPANT.to_string();
        item.recipients = vec![peer];
    } else {
        item.sender = peer;
        item.recipients = vec![SELF_PARTICIPANT.to_string()];
    }

    item.headers.insert("message-id".to_string(), external_id);
    Ok(item)
}

fn generic_record(rec: GenericRecord, source_id: &str) -> EngineResult<ForensicItem> {
    let timestamp = rec
        .timestamp
        .as_ref()
        .and_then(flexible_timestamp)
        .ok_or_else(|| {
            EngineError::normalization(rec.external_id.clone(), "record has no parseable timestamp")
        })?;

    let sender = rec
        .sender
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::normalization(rec.external_id.clone(), "record has no sender"))?
        .to_string();

    let mut recipients: Vec<String> = Vec::new();
    for r in &rec.recipients {
        let r = r.trim();
        if !r.is_empty() && r != sender && !recipients.iter().any(|x| x == r) {
            recipients.push(r.to_string());
        }
    }
    if recipients.is_empty() {
        return Err(EngineError::normalization(
            rec.external_id,
            "record has no recipients",
        ));
    }

    let item_type = match rec.item_type.as_deref() {
        Some("email") => ItemType::Email,
        Some("sms") => ItemType::Sms,
        Some("chat_im") => ItemType::ChatIm,
        Some("call_log") => ItemType::CallLog,
        _ => ItemType::ChatProprietary,
    };

    let external_id = rec
        .external_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", timestamp.timestamp(), sender));

    let mut item = blank_item(source_id, item_type);
    item.external_id = external_id.clone();
    item.timestamp = timestamp;
    item.thread_id = rec.thread_id;
    item.sender = sender;
    item.recipients = recipients;
    item.subject = rec.subject;
    item.content = rec.content.unwrap_or_default();
    item.is_deleted = rec.deleted;
    item.is_encrypted = rec.encrypted;
    item.is_flagged = rec.flagged;
    item.attachments = rec.attachments.iter().map(attachment).collect();

    item.headers = rec.headers;
    item.headers
        .entry("message-id".to_string())
        .or_insert(external_id);
    Ok(item)
}

/// RFC 3339 string or unix seconds (integer or float).
fn flexible_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            Utc.timestamp_opt(secs as i64, 0).single()
        }
        _ => None,
    }
}

/// Pull the bare address out of `Name <addr@host>` style mailboxes.
fn mailbox(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let addr = match (value.find('<'), value.find('>')) {
        (Some(open), Some(close)) if close > open => &value[open + 1..close],
        _ => value,
    };
    let addr = addr.trim().to_ascii_lowercase();
    if addr.is_empty() {
        None
    } else {
        Some(addr)
    }
}

fn attachment(raw: &RawAttachment) -> AttachmentDescriptor {
    let mime = raw.mime.clone().unwrap_or_else(|| {
        mime_guess::from_path(&raw.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    AttachmentDescriptor {
        name: raw.name.clone(),
        mime,
        size: raw.size.unwrap_or(0),
    }
}
