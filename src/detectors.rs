//! Pattern/Anomaly Detector
//!
//! Independent, stateless rules evaluated once over a source's full
//! item set. Detectors are additive: several findings may co-occur and
//! nothing is deduplicated across detector kinds. Thresholds live in
//! [`thresholds`] and are the current contract, tunable by design.

use crate::models::{AnomalyFinding, ForensicItem, Severity};
use chrono::Timelike;
use std::collections::BTreeMap;

/// Heuristic constants, kept in one place so retuning is a one-file change.
pub mod thresholds {
    /// Deletion rate past which the finding text calls out a high rate.
    pub const DELETION_HIGH_RATE: f64 = 0.10;
    /// Sentiment below this counts as a negative item.
    pub const NEGATIVE_SENTIMENT_CUTOFF: f64 = -0.3;
    /// Share of negative items that triggers the concentration finding.
    pub const NEGATIVE_SHARE: f64 = 0.20;
    /// Share of late-night items that triggers the activity finding.
    pub const LATE_NIGHT_SHARE: f64 = 0.30;
    /// Minimum run length for rapid-fire messaging.
    pub const RAPID_FIRE_RUN: usize = 5;
    /// Maximum seconds between consecutive rapid-fire items.
    pub const RAPID_FIRE_GAP_SECS: i64 = 60;
    /// Days of silence that count as a communication gap.
    pub const GAP_DAYS: i64 = 7;
    /// Standard deviations above the mean that make a volume spike.
    pub const SPIKE_SIGMA: f64 = 2.0;
    /// Content length (chars) at or under which a message is short.
    pub const SHORT_MESSAGE_LEN: usize = 10;
    /// Share of short messages that triggers the finding.
    pub const SHORT_MESSAGE_SHARE: f64 = 0.40;
    /// Items sent with zero received for the one-way finding.
    pub const ONE_WAY_MIN_SENT: usize = 5;
    /// Minimum scored items for the negative-participant finding.
    pub const NEGATIVE_PARTICIPANT_MIN: usize = 5;
    /// Mean sentiment below which a participant is consistently negative.
    pub const NEGATIVE_PARTICIPANT_MEAN: f64 = -0.5;
    /// Own late-night share for the per-participant finding.
    pub const LATE_NIGHT_PARTICIPANT_SHARE: f64 = 0.50;
    /// Minimum items for the per-participant late-night finding.
    pub const LATE_NIGHT_PARTICIPANT_MIN: usize = 10;
}

/// Fixed watch-list of evasion phrases (lowercase).
pub const SUSPICIOUS_PHRASES: &[&str] = &[
    "delete",
    "off the record",
    "no paper trail",
    "burner",
    "untraceable",
    "wipe the phone",
    "destroy the evidence",
    "don't tell anyone",
    "keep this between us",
    "cash only",
];

/// True when the content matches any watch-list phrase.
pub fn matches_watchlist(content: &str) -> bool {
    let folded = content.to_lowercase();
    SUSPICIOUS_PHRASES.iter().any(|p| folded.contains(p))
}

fn is_late_night(item: &ForensicItem) -> bool {
    let hour = item.timestamp.hour();
    hour >= 23 || hour <= 5
}

/// Run every detector over the full item set. Order is fixed so the
/// output is stable for an unchanged item set.
pub fn run_all(items: &[ForensicItem]) -> Vec<AnomalyFinding> {
    let mut sorted: Vec<&ForensicItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    let mut findings = Vec::new();
    findings.extend(deletion_pattern(items));
    findings.extend(negative_sentiment(items));
    findings.extend(late_night_activity(items));
    findings.extend(rapid_fire(&sorted));
    findings.extend(communication_gaps(&sorted));
    findings.extend(volume_spike(&sorted));
    findings.extend(suspicious_keywords(items));
    findings.extend(encrypted_content(items));
    findings.extend(short_messages(items));
    findings.extend(one_way_participants(items));
    findings.extend(negative_participants(items));
    findings.extend(late_night_participants(items));
    findings
}

/// Any deleted item triggers; the text flags rates above 10% separately.
fn deletion_pattern(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    let deleted: Vec<String> = items
        .iter()
        .filter(|i| i.is_deleted)
        .map(|i| i.id.clone())
        .collect();
    if deleted.is_empty() {
        return None;
    }
    let rate = deleted.len() as f64 / items.len() as f64;
    let framing = if rate > thresholds::DELETION_HIGH_RATE {
        ", deletion rate exceeds 10% of the item set"
    } else {
        ""
    };
    Some(AnomalyFinding {
        kind: "deletion_pattern".into(),
        title: "Deleted communications detected".into(),
        description: format!(
            "{} of {} items ({:.1}%) are marked deleted{}",
            deleted.len(),
            items.len(),
            rate * 100.0,
            framing
        ),
        severity: Severity::High,
        item_ids: deleted,
        metric: rate,
    })
}

fn negative_sentiment(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    if items.is_empty() {
        return None;
    }
    let negative: Vec<String> = items
        .iter()
        .filter(|i| i.sentiment < thresholds::NEGATIVE_SENTIMENT_CUTOFF)
        .map(|i| i.id.clone())
        .collect();
    let share = negative.len() as f64 / items.len() as f64;
    if share <= thresholds::NEGATIVE_SHARE {
        return None;
    }
    Some(AnomalyFinding {
        kind: "negative_sentiment".into(),
        title: "Concentration of negative sentiment".into(),
        description: format!(
            "{:.1}% of items carry sentiment below {}",
            share * 100.0,
            thresholds::NEGATIVE_SENTIMENT_CUTOFF
        ),
        severity: Severity::Warning,
        item_ids: negative,
        metric: share,
    })
}

fn late_night_activity(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    if items.is_empty() {
        return None;
    }
    let late: Vec<String> = items
        .iter()
        .filter(|i| is_late_night(i))
        .map(|i| i.id.clone())
        .collect();
    let share = late.len() as f64 / items.len() as f64;
    if share <= thresholds::LATE_NIGHT_SHARE {
        return None;
    }
    Some(AnomalyFinding {
        kind: "late_night_activity".into(),
        title: "Unusual late-night activity".into(),
        description: format!(
            "{:.1}% of items fall between 23:00 and 05:59",
            share * 100.0
        ),
        severity: Severity::Medium,
        item_ids: late,
        metric: share,
    })
}

/// Runs of 5+ consecutive items each within 60 seconds of the previous.
fn rapid_fire(sorted: &[&ForensicItem]) -> Option<AnomalyFinding> {
    let mut run: Vec<&ForensicItem> = Vec::new();
    let mut affected: Vec<String> = Vec::new();
    let mut runs = 0u64;

    let flush = |run: &mut Vec<&ForensicItem>, affected: &mut Vec<String>, runs: &mut u64| {
        if run.len() >= thresholds::RAPID_FIRE_RUN {
            *runs += 1;
            affected.extend(run.iter().map(|i| i.id.clone()));
        }
        run.clear();
    };

    for window in sorted.windows(2) {
        let gap = (window[1].timestamp - window[0].timestamp).num_seconds();
        if gap <= thresholds::RAPID_FIRE_GAP_SECS {
            if run.is_empty() {
                run.push(window[0]);
            }
            run.push(window[1]);
        } else {
            flush(&mut run, &mut affected, &mut runs);
        }
    }
    flush(&mut run, &mut affected, &mut runs);

    if runs == 0 {
        return None;
    }
    Some(AnomalyFinding {
        kind: "rapid_fire".into(),
        title: "Rapid-fire messaging bursts".into(),
        description: format!(
            "{} burst(s) of {}+ messages each sent within {}s of the previous",
            runs,
            thresholds::RAPID_FIRE_RUN,
            thresholds::RAPID_FIRE_GAP_SECS
        ),
        severity: Severity::Medium,
        item_ids: affected,
        metric: runs as f64,
    })
}

/// Consecutive items more than 7 days apart. Compared as durations, so
/// a gap of 7 days and some hours still counts.
fn communication_gaps(sorted: &[&ForensicItem]) -> Option<AnomalyFinding> {
    let threshold = chrono::Duration::days(thresholds::GAP_DAYS);
    let mut affected = Vec::new();
    let mut max_gap = chrono::Duration::zero();
    for window in sorted.windows(2) {
        let gap = window[1].timestamp - window[0].timestamp;
        if gap > threshold {
            affected.push(window[0].id.clone());
            affected.push(window[1].id.clone());
            max_gap = max_gap.max(gap);
        }
    }
    if affected.is_empty() {
        return None;
    }
    let gap_days = max_gap.num_minutes() as f64 / (24.0 * 60.0);
    Some(AnomalyFinding {
        kind: "communication_gap".into(),
        title: "Extended communication gaps".into(),
        description: format!(
            "silence of up to {:.1} days between consecutive items",
            gap_days
        ),
        severity: Severity::Low,
        item_ids: affected,
        metric: gap_days,
    })
}

/// A day whose item count exceeds mean + 2 sigma across days.
fn volume_spike(sorted: &[&ForensicItem]) -> Option<AnomalyFinding> {
    let mut per_day: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in sorted {
        per_day
            .entry(item.timestamp.format("%Y-%m-%d").to_string())
            .or_default()
            .push(item.id.clone());
    }
    if per_day.len() < 2 {
        return None;
    }

    let counts: Vec<f64> = per_day.values().map(|v| v.len() as f64).collect();
    let mean = counts.iter().sum::<f64>() / counts.len() as f64;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
    let cutoff = mean + thresholds::SPIKE_SIGMA * variance.sqrt();

    let mut affected = Vec::new();
    let mut peak = 0f64;
    let mut spike_days = Vec::new();
    for (day, ids) in &per_day {
        if ids.len() as f64 > cutoff {
            affected.extend(ids.iter().cloned());
            peak = peak.max(ids.len() as f64);
            spike_days.push(day.clone());
        }
    }
    if affected.is_empty() {
        return None;
    }
    Some(AnomalyFinding {
        kind: "volume_spike".into(),
        title: "Communication volume spike".into(),
        description: format!(
            "{} day(s) exceed the mean daily volume by more than {} standard deviations ({})",
            spike_days.len(),
            thresholds::SPIKE_SIGMA,
            spike_days.join(", ")
        ),
        severity: Severity::Medium,
        item_ids: affected,
        metric: peak,
    })
}

fn suspicious_keywords(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    let hits: Vec<String> = items
        .iter()
        .filter(|i| matches_watchlist(&i.content))
        .map(|i| i.id.clone())
        .collect();
    if hits.is_empty() {
        return None;
    }
    Some(AnomalyFinding {
        kind: "suspicious_keyword".into(),
        title: "Evasion phrases in content".into(),
        description: format!("{} item(s) match the evasion phrase watch-list", hits.len()),
        severity: Severity::High,
        metric: hits.len() as f64,
        item_ids: hits,
    })
}

fn encrypted_content(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    let encrypted: Vec<String> = items
        .iter()
        .filter(|i| i.is_encrypted)
        .map(|i| i.id.clone())
        .collect();
    if encrypted.is_empty() {
        return None;
    }
    Some(AnomalyFinding {
        kind: "encrypted_content".into(),
        title: "Encrypted communications present".into(),
        description: format!("{} item(s) are marked encrypted", encrypted.len()),
        severity: Severity::Medium,
        metric: encrypted.len() as f64,
        item_ids: encrypted,
    })
}

fn short_messages(items: &[ForensicItem]) -> Option<AnomalyFinding> {
    if items.is_empty() {
        return None;
    }
    let short: Vec<String> = items
        .iter()
        .filter(|i| i.content.trim().chars().count() <= thresholds::SHORT_MESSAGE_LEN)
        .map(|i| i.id.clone())
        .collect();
    let share = short.len() as f64 / items.len() as f64;
    if share <= thresholds::SHORT_MESSAGE_SHARE {
        return None;
    }
    Some(AnomalyFinding {
        kind: "short_messages".into(),
        title: "Unusually short messages".into(),
        description: format!(
            "{:.1}% of items are {} characters or fewer",
            share * 100.0,
            thresholds::SHORT_MESSAGE_LEN
        ),
        severity: Severity::Medium,
        item_ids: short,
        metric: share,
    })
}

/// Per-participant send/receive tallies used by the participant detectors.
fn participant_tallies(
    items: &[ForensicItem],
) -> BTreeMap<String, (Vec<usize>, usize)> {
    // value = (indexes of items sent, received count)
    let mut tallies: BTreeMap<String, (Vec<usize>, usize)> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        tallies.entry(item.sender.clone()).or_default().0.push(idx);
        for r in &item.recipients {
            tallies.entry(r.clone()).or_default().1 += 1;
        }
    }
    tallies
}

fn one_way_participants(items: &[ForensicItem]) -> Vec<AnomalyFinding> {
    participant_tallies(items)
        .into_iter()
        .filter(|(_, (sent, received))| {
            sent.len() >= thresholds::ONE_WAY_MIN_SENT && *received == 0
        })
        .map(|(participant, (sent, _))| AnomalyFinding {
            kind: "one_way_participant".into(),
            title: format!("One-way communication from {}", participant),
            description: format!(
                "{} sent {} item(s) and never received any",
                participant,
                sent.len()
            ),
            severity: Severity::Medium,
            metric: sent.len() as f64,
            item_ids: sent.iter().map(|&i| items[i].id.clone()).collect(),
        })
        .collect()
}

fn negative_participants(items: &[ForensicItem]) -> Vec<AnomalyFinding> {
    participant_tallies(items)
        .into_iter()
        .filter_map(|(participant, (sent, _))| {
            if sent.len() < thresholds::NEGATIVE_PARTICIPANT_MIN {
                return None;
            }
            let mean = sent.iter().map(|&i| items[i].sentiment).sum::<f64>() / sent.len() as f64;
            if mean >= thresholds::NEGATIVE_PARTICIPANT_MEAN {
                return None;
            }
            Some(AnomalyFinding {
                kind: "negative_participant".into(),
                title: format!("Consistently negative tone from {}", participant),
                description: format!(
                    "mean sentiment {:.2} across {} item(s) sent by {}",
                    mean,
                    sent.len(),
                    participant
                ),
                severity: Severity::Medium,
                metric: mean,
                item_ids: sent.iter().map(|&i| items[i].id.clone()).collect(),
            })
        })
        .collect()
}

fn late_night_participants(items: &[ForensicItem]) -> Vec<AnomalyFinding> {
    participant_tallies(items)
        .into_iter()
        .filter_map(|(participant, (sent, _))| {
            if sent.len() < thresholds::LATE_NIGHT_PARTICIPANT_MIN {
                return None;
            }
            let late: Vec<usize> = sent
                .iter()
                .copied()
                .filter(|&i| is_late_night(&items[i]))
                .collect();
            let share = late.len() as f64 / sent.len() as f64;
            if share <= thresholds::LATE_NIGHT_PARTICIPANT_SHARE {
                return None;
            }
            Some(AnomalyFinding {
                kind: "late_night_participant".into(),
                title: format!("Excessive late-night activity by {}", participant),
                description: format!(
                    "{:.0}% of the {} item(s) sent by {} fall in the late-night window",
                    share * 100.0,
                    sent.len(),
                    participant
                ),
                severity: Severity::Low,
                metric: share,
                item_ids: late.iter().map(|&i| items[i].id.clone()).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemType, SELF_PARTICIPANT};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn item(n: usize, ts: DateTime<Utc>) -> ForensicItem {
        ForensicItem {
            id: format!("item-{:03}", n),
            source_id: "s1".into(),
            item_type: ItemType::ChatIm,
            external_id: format!("x{}", n),
            thread_id: None,
            timestamp: ts,
            sender: "alice@x".into(),
            recipients: vec!["bob@x".into()],
            subject: None,
            content: "nothing remarkable here today".into(),
            content_type: "text/plain".into(),
            attachments: vec![],
            headers: Default::default(),
            sentiment: 0.0,
            language: "en".into(),
            keywords: vec![],
            entities: vec![],
            relevance: 0.1,
            is_deleted: false,
            is_encrypted: false,
            is_flagged: false,
            is_suspicious: false,
        }
    }

    /// N items spread one hour apart, daytime hours only.
    fn baseline(n: usize) -> Vec<ForensicItem> {
        (0..n)
            .map(|i| {
                let day = i / 8;
                let hour_slot = i % 8; // 09:00..16:00
                let ts = Utc
                    .with_ymd_and_hms(2024, 3, 4, 9 + hour_slot as u32, 0, 0)
                    .unwrap()
                    + Duration::days(day as i64 % 5);
                item(i, ts)
            })
            .collect()
    }

    #[test]
    fn test_deletion_detector_ids_and_severity() {
        let mut items = baseline(100);
        for it in items.iter_mut().take(15) {
            it.is_deleted = true;
        }
        let finding = deletion_pattern(&items).unwrap();
        assert_eq!(finding.kind, "deletion_pattern");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.item_ids.len(), 15);
        assert!((finding.metric - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_deletion_rate_framing_boundary() {
        // 9%: triggers (any deleted item does) but without the
        // high-rate framing.
        let mut items = baseline(100);
        for it in items.iter_mut().take(9) {
            it.is_deleted = true;
        }
        let below = deletion_pattern(&items).unwrap();
        assert!(!below.description.contains("exceeds 10%"));

        // 11%: same trigger, high-rate framing present.
        let mut items = baseline(100);
        for it in items.iter_mut().take(11) {
            it.is_deleted = true;
        }
        let above = deletion_pattern(&items).unwrap();
        assert!(above.description.contains("exceeds 10%"));
        assert_eq!(above.severity, Severity::High);
    }

    #[test]
    fn test_no_deletion_no_finding() {
        assert!(deletion_pattern(&baseline(20)).is_none());
    }

    #[test]
    fn test_sentiment_distribution_preserved() {
        let mut items = baseline(10);
        // 3 positive, 4 negative, 3 neutral
        for it in items.iter_mut().take(3) {
            it.sentiment = 0.6;
        }
        for it in items.iter_mut().skip(3).take(4) {
            it.sentiment = -0.6;
        }
        let positive = items.iter().filter(|i| i.sentiment > 0.3).count();
        let negative = items.iter().filter(|i| i.sentiment < -0.3).count();
        assert_eq!((positive, negative), (3, 4));

        // 40% negative > 20% threshold
        let finding = negative_sentiment(&items).unwrap();
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.item_ids.len(), 4);
    }

    #[test]
    fn test_negative_sentiment_threshold_boundary() {
        let mut items = baseline(10);
        for it in items.iter_mut().take(2) {
            it.sentiment = -0.9; // exactly 20%
        }
        assert!(negative_sentiment(&items).is_none());
        items[2].sentiment = -0.9; // 30%
        assert!(negative_sentiment(&items).is_some());
    }

    #[test]
    fn test_late_night_boundary_30_percent() {
        // 100 items, exactly 30 late-night: no finding.
        let mut items = baseline(100);
        for (i, it) in items.iter_mut().enumerate().take(30) {
            it.timestamp = Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap()
                + Duration::minutes(i as i64);
        }
        assert!(late_night_activity(&items).is_none());

        // 31 late-night: finding.
        let mut items = baseline(100);
        for (i, it) in items.iter_mut().enumerate().take(31) {
            it.timestamp = Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap()
                + Duration::minutes(i as i64);
        }
        let finding = late_night_activity(&items).unwrap();
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.item_ids.len(), 31);
    }

    #[test]
    fn test_late_night_window_edges() {
        let mut a = item(0, Utc.with_ymd_and_hms(2024, 3, 4, 23, 0, 0).unwrap());
        assert!(is_late_night(&a));
        a.timestamp = Utc.with_ymd_and_hms(2024, 3, 4, 5, 59, 0).unwrap();
        assert!(is_late_night(&a));
        a.timestamp = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        assert!(!is_late_night(&a));
        a.timestamp = Utc.with_ymd_and_hms(2024, 3, 4, 22, 59, 0).unwrap();
        assert!(!is_late_night(&a));
    }

    #[test]
    fn test_rapid_fire_run_detection() {
        // 6 items 30s apart, then a quiet hour, then 3 more.
        let mut items: Vec<ForensicItem> = (0..6)
            .map(|i| item(i, base_time() + Duration::seconds(30 * i as i64)))
            .collect();
        items.extend((6..9).map(|i| item(i, base_time() + Duration::hours(2) + Duration::minutes(10 * i as i64))));

        let sorted: Vec<&ForensicItem> = items.iter().collect();
        let finding = rapid_fire(&sorted).unwrap();
        assert_eq!(finding.metric, 1.0);
        assert_eq!(finding.item_ids.len(), 6);
    }

    #[test]
    fn test_rapid_fire_four_is_not_a_run() {
        let items: Vec<ForensicItem> = (0..4)
            .map(|i| item(i, base_time() + Duration::seconds(30 * i as i64)))
            .collect();
        let sorted: Vec<&ForensicItem> = items.iter().collect();
        assert!(rapid_fire(&sorted).is_none());
    }

    #[test]
    fn test_communication_gap() {
        let items = vec![
            item(0, base_time()),
            item(1, base_time() + Duration::days(10)),
            item(2, base_time() + Duration::days(11)),
        ];
        let sorted: Vec<&ForensicItem> = items.iter().collect();
        let finding = communication_gaps(&sorted).unwrap();
        assert_eq!(finding.severity, Severity::Low);
        assert_eq!(finding.item_ids, vec!["item-000", "item-001"]);
        assert_eq!(finding.metric, 10.0);
    }

    #[test]
    fn test_communication_gap_sub_day_boundary() {
        // 7 days 12 hours is more than 7 days apart and must flag.
        let items = vec![
            item(0, base_time()),
            item(1, base_time() + Duration::days(7) + Duration::hours(12)),
        ];
        let sorted: Vec<&ForensicItem> = items.iter().collect();
        let finding = communication_gaps(&sorted).unwrap();
        assert!((finding.metric - 7.5).abs() < 1e-9);

        // Exactly 7 days is not "more than".
        let items = vec![item(0, base_time()), item(1, base_time() + Duration::days(7))];
        let sorted: Vec<&ForensicItem> = items.iter().collect();
        assert!(communication_gaps(&sorted).is_none());
    }

    #[test]
    fn test_volume_spike() {
        // 10 quiet days of 2 items, one day with 30.
        let mut items = Vec::new();
        let mut n = 0;
        for day in 0..10 {
            for _ in 0..2 {
                items.push(item(n, base_time() + Duration::days(day) + Duration::minutes(n as i64)));
                n += 1;
            }
        }
        for _ in 0..30 {
            items.push(item(n, base_time() + Duration::days(20) + Duration::minutes(n as i64)));
            n += 1;
        }
        let sorted: Vec<&ForensicItem> = items.iter().collect();
        let finding = volume_spike(&sorted).unwrap();
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.metric, 30.0);
        assert_eq!(finding.item_ids.len(), 30);
    }

    #[test]
    fn test_suspicious_keyword_watchlist() {
        let mut items = baseline(3);
        items[1].content = "make sure you DELETE this thread".into();
        items[2].content = "keep it off the record please".into();
        let finding = suspicious_keywords(&items).unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.item_ids.len(), 2);
    }

    #[test]
    fn test_encrypted_content() {
        let mut items = baseline(5);
        items[0].is_encrypted = true;
        let finding = encrypted_content(&items).unwrap();
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.item_ids, vec!["item-000"]);
    }

    #[test]
    fn test_short_messages_share() {
        let mut items = baseline(10);
        for it in items.iter_mut().take(5) {
            it.content = "ok".into();
        }
        let finding = short_messages(&items).unwrap();
        assert!((finding.metric - 0.5).abs() < 1e-9);

        // Exactly 40% does not trigger.
        let mut items = baseline(10);
        for it in items.iter_mut().take(4) {
            it.content = "ok".into();
        }
        assert!(short_messages(&items).is_none());
    }

    #[test]
    fn test_one_way_participant() {
        // alice sends 5, never appears as recipient.
        let items = baseline(5);
        let findings = one_way_participants(&items);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].title.contains("alice@x"));
        assert_eq!(findings[0].item_ids.len(), 5);

        // One reply to alice clears it.
        let mut items = baseline(5);
        let mut reply = item(99, base_time());
        reply.sender = "bob@x".into();
        reply.recipients = vec!["alice@x".into()];
        items.push(reply);
        assert!(one_way_participants(&items).is_empty());
    }

    #[test]
    fn test_negative_participant() {
        let mut items = baseline(6);
        for it in items.iter_mut() {
            it.sentiment = -0.7;
        }
        let findings = negative_participants(&items);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(findings[0].metric < -0.5);
    }

    #[test]
    fn test_late_night_participant_own_ratio() {
        // 12 items from self, 7 late-night (58%).
        let mut items: Vec<ForensicItem> = (0..12)
            .map(|i| {
                let mut it = item(i, base_time() + Duration::minutes(i as i64));
                it.sender = SELF_PARTICIPANT.into();
                it.recipients = vec!["peer".into()];
                it
            })
            .collect();
        for it in items.iter_mut().take(7) {
            it.timestamp = Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap();
        }
        let findings = late_night_participants(&items);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].title.contains(SELF_PARTICIPANT));
        assert_eq!(findings[0].item_ids.len(), 7);
    }

    #[test]
    fn test_detectors_are_additive() {
        let mut items = baseline(10);
        items[0].is_deleted = true;
        items[1].is_encrypted = true;
        items[2].content = "no paper trail".into();
        let findings = run_all(&items);
        let kinds: Vec<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert!(kinds.contains(&"deletion_pattern"));
        assert!(kinds.contains(&"encrypted_content"));
        assert!(kinds.contains(&"suspicious_keyword"));
    }

    #[test]
    fn test_run_all_deterministic() {
        let mut items = baseline(30);
        items[3].is_deleted = true;
        let a = serde_json::to_string(&run_all(&items)).unwrap();
        let b = serde_json::to_string(&run_all(&items)).unwrap();
        assert_eq!(a, b);
    }
}
