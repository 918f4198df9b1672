//! Email archive extractor (mbox with RFC-822 headers).
//!
//! Splits the archive on `From ` separator lines, unfolds headers, and
//! walks MIME multipart bodies far enough to recover the text part and
//! attachment descriptors. Full MIME tree decoding is out of scope.

use super::{EmailRecord, Extractor, RawAttachment, RawRecord, RecordStream};
use crate::errors::{EngineError, EngineResult};
use std::path::Path;

#[derive(Default)]
pub struct EmailArchiveExtractor;

impl EmailArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Split raw mbox text into per-message chunks. A separator is a
    /// line starting with `From ` at the top of the file or right
    /// after a blank line.
    fn split_messages(raw: &str) -> Vec<&str> {
        let mut messages = Vec::new();
        let mut start = None;
        let mut prev_blank = true;
        let mut offset = 0;

        for line in raw.split_inclusive('\n') {
            if prev_blank && line.starts_with("From ") {
                if let Some(s) = start {
                    messages.push(&raw[s..offset]);
                }
                start = Some(offset);
            }
            prev_blank = line.trim_end_matches(['\r', '\n']).is_empty();
            offset += line.len();
        }
        if let Some(s) = start {
            messages.push(&raw[s..]);
        }
        messages
    }

    /// Parse one message chunk: unfolded headers, then the body after
    /// the first blank line. The leading `From ` envelope line is
    /// dropped (its metadata is repeated in the real headers).
    fn parse_message(chunk: &str) -> EmailRecord {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body_start = chunk.len();
        let mut offset = 0;
        let mut first = true;

        for line in chunk.split_inclusive('\n') {
            let trimmed = line.trim_end_matches(['\r', '\n']);
            offset += line.len();
            if first {
                first = false;
                if trimmed.starts_with("From ") {
                    continue;
                }
            }
            if trimmed.is_empty() {
                body_start = offset;
                break;
            }
            if (line.starts_with(' ') || line.starts_with('\t')) && !headers.is_empty() {
                // Folded continuation line
                let last = headers.last_mut().unwrap();
                last.1.push(' ');
                last.1.push_str(trimmed.trim_start());
            } else if let Some((name, value)) = trimmed.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let body = chunk[body_start..].to_string();
        let mut record = EmailRecord {
            headers,
            body,
            attachments: Vec::new(),
        };
        Self::walk_multipart(&mut record);
        record
    }

    /// Recover the text part and attachment descriptors from a
    /// `multipart/*` body. Non-multipart bodies pass through unchanged.
    fn walk_multipart(record: &mut EmailRecord) {
        let content_type = match record.header("Content-Type") {
            Some(ct) if ct.to_ascii_lowercase().contains("multipart") => ct.to_string(),
            _ => return,
        };
        let boundary = match Self::mime_param(&content_type, "boundary") {
            Some(b) => b,
            None => return,
        };

        let marker = format!("--{}", boundary);
        let body = std::mem::take(&mut record.body);
        let mut text_body = String::new();

        for part in body.split(&marker).skip(1) {
            let part = part.trim_start_matches(['\r', '\n']);
            if part.starts_with("--") {
                break; // closing delimiter
            }
            let (part_headers, part_body) = match part.split_once("\n\n") {
                Some(split) => split,
                None => match part.split_once("\r\n\r\n") {
                    Some(split) => split,
                    None => continue,
                },
            };

            let header_of = |name: &str| -> Option<String> {
                part_headers
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with(&name.to_ascii_lowercase()))
                    .and_then(|l| l.split_once(':').map(|(_, v)| v.trim().to_string()))
            };

            let disposition = header_of("Content-Disposition").unwrap_or_default();
            let part_type = header_of("Content-Type").unwrap_or_default();

            if disposition.to_ascii_lowercase().contains("attachment") {
                let name = Self::mime_param(&disposition, "filename")
                    .or_else(|| Self::mime_param(&part_type, "name"))
                    .unwrap_or_else(|| "attachment".to_string());
                let mime = if part_type.is_empty() {
                    None
                } else {
                    Some(part_type.split(';').next().unwrap_or("").trim().to_string())
                };
                record.attachments.push(RawAttachment {
                    name,
                    mime,
                    size: Some(part_body.trim_end().len() as u64),
                });
            } else if text_body.is_empty()
                && (part_type.is_empty() || part_type.to_ascii_lowercase().starts_with("text/plain"))
            {
                text_body = part_body.trim_end().to_string();
            }
        }

        record.body = if text_body.is_empty() { body } else { text_body };
    }

    /// Extract one `key=value` parameter from a MIME header value,
    /// with or without quotes.
    fn mime_param(header_value: &str, key: &str) -> Option<String> {
        for piece in header_value.split(';') {
            let piece = piece.trim();
            if let Some((k, v)) = piece.split_once('=') {
                if k.trim().eq_ignore_ascii_case(key) {
                    return Some(v.trim().trim_matches('"').to_string());
                }
            }
        }
        None
    }
}

impl Extractor for EmailArchiveExtractor {
    fn extract(&self, artifact: &Path) -> EngineResult<RecordStream> {
        let bytes = std::fs::read(artifact)
            .map_err(|e| EngineError::extraction(artifact, e.to_string()))?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        if !raw.starts_with("From ") {
            return Err(EngineError::extraction(
                artifact,
                "not an mbox archive (missing 'From ' separator)",
            ));
        }

        let records: Vec<RawRecord> = Self::split_messages(&raw)
            .into_iter()
            .map(Self::parse_message)
            .map(RawRecord::EmailArchive)
            .collect();

        log::debug!(
            "email archive {:?}: {} messages",
            artifact.file_name().unwrap_or_default(),
            records.len()
        );

        Ok(Box::new(records.into_iter()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) const SIMPLE_MBOX: &str = "\
From alice@example.com Mon Mar  4 10:00:00 2024
From: alice@example.com
To: bob@example.com
Subject: Budget review
Message-ID: <m1@example.com>
Date: Mon, 4 Mar 2024 10:00:00 +0000

Numbers for the quarterly budget are attached below.

From bob@example.com Mon Mar  4 11:00:00 2024
From: bob@example.com
To: alice@example.com
Subject: Re: Budget review
Message-ID: <m2@example.com>
In-Reply-To: <m1@example.com>
References: <m1@example.com>
Date: Mon, 4 Mar 2024 11:00:00 +0000

Looks fine to me, thanks for putting these together.
";

    #[test]
    fn test_splits_and_parses_messages() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(SIMPLE_MBOX.as_bytes()).unwrap();

        let records: Vec<_> = EmailArchiveExtractor::new().extract(f.path()).unwrap().collect();
        assert_eq!(records.len(), 2);

        let RawRecord::EmailArchive(first) = &records[0] else {
            panic!("wrong record variant");
        };
        assert_eq!(first.header("Subject"), Some("Budget review"));
        assert_eq!(first.header("Message-ID"), Some("<m1@example.com>"));
        assert!(first.body.contains("quarterly budget"));

        let RawRecord::EmailArchive(second) = &records[1] else {
            panic!("wrong record variant");
        };
        assert_eq!(second.header("In-Reply-To"), Some("<m1@example.com>"));
    }

    #[test]
    fn test_header_unfolding() {
        let chunk = "From x Mon Jan 1 00:00:00 2024\nSubject: a very\n long subject\n\nbody\n";
        let rec = EmailArchiveExtractor::parse_message(chunk);
        assert_eq!(rec.header("Subject"), Some("a very long subject"));
    }

    #[test]
    fn test_multipart_attachment_descriptors() {
        let chunk = concat!(
            "From x Mon Jan 1 00:00:00 2024\n",
            "From: a@x\n",
            "To: b@x\n",
            "Content-Type: multipart/mixed; boundary=\"SEP\"\n",
            "\n",
            "--SEP\n",
            "Content-Type: text/plain\n",
            "\n",
            "Please find the contract attached.\n",
            "--SEP\n",
            "Content-Type: application/pdf; name=\"contract.pdf\"\n",
            "Content-Disposition: attachment; filename=\"contract.pdf\"\n",
            "\n",
            "%PDF-1.4 fake bytes\n",
            "--SEP--\n",
        );
        let rec = EmailArchiveExtractor::parse_message(chunk);
        assert_eq!(rec.body.trim(), "Please find the contract attached.");
        assert_eq!(rec.attachments.len(), 1);
        assert_eq!(rec.attachments[0].name, "contract.pdf");
        assert_eq!(rec.attachments[0].mime.as_deref(), Some("application/pdf"));
        assert!(rec.attachments[0].size.unwrap() > 0);
    }

    #[test]
    fn test_rejects_non_mbox() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"<html>not an mbox</html>").unwrap();
        let err = EmailArchiveExtractor::new()
            .extract(f.path())
            .err()
            .expect("extraction should fail");
        assert!(err.is_fatal());
    }
}
