//! Analysis Report Aggregator
//!
//! Pure composition: shapes the item set, network data and detector
//! findings into one immutable `AnalysisReport`. No new computation
//! beyond counting, sorting and capping; output is byte-stable for an
//! unchanged item set.

use crate::models::{
    AnalysisReport, AnomalyFinding, CommunicationNetwork, CommunicationStats, ContactVolume,
    DateRange, ForensicItem, Insight, SentimentPoint, SentimentSummary, TimelineEntry,
};
use chrono::{Datelike, Timelike};
use std::collections::BTreeMap;

/// Top contacts are capped to this many entries.
const TOP_CONTACTS_CAP: usize = 20;

/// Compose the final report for one source.
pub fn compose(
    source_id: &str,
    items: &[ForensicItem],
    network: CommunicationNetwork,
    findings: Vec<AnomalyFinding>,
) -> AnalysisReport {
    let mut sorted: Vec<&ForensicItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    let stats = statistics(items);
    let date_range = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => Some(DateRange {
            start: first.timestamp,
            end: last.timestamp,
        }),
        _ => None,
    };

    let timeline = sorted
        .iter()
        .map(|item| TimelineEntry {
            item_id: item.id.clone(),
            timestamp: item.timestamp,
            item_type: item.item_type,
            sender: item.sender.clone(),
            summary: item.summary(),
        })
        .collect();

    let insights = build_insights(&stats, items.len() as u64, &findings);

    AnalysisReport {
        source_id: source_id.to_string(),
        total_items: items.len() as u64,
        date_range,
        sentiment_series: sentiment_series(&sorted),
        stats,
        network,
        timeline,
        findings,
        insights,
    }
}

/// Counts by type, hour-of-day, day-of-week and month, plus the capped
/// top-contacts list and the sentiment bucket summary.
pub fn statistics(items: &[ForensicItem]) -> CommunicationStats {
    let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_hour = vec![0u64; 24];
    let mut by_weekday = vec![0u64; 7];
    let mut by_month: BTreeMap<String, u64> = BTreeMap::new();
    let mut contact_volume: BTreeMap<String, u64> = BTreeMap::new();
    let mut sentiment = SentimentSummary::default();
    let mut sentiment_total = 0.0;

    for item in items {
        *by_type.entry(item.item_type.to_string()).or_insert(0) += 1;
        by_hour[item.timestamp.hour() as usize] += 1;
        by_weekday[item.timestamp.weekday().num_days_from_monday() as usize] += 1;
        *by_month
            .entry(item.timestamp.format("%Y-%m").to_string())
            .or_insert(0) += 1;
        for participant in item.participants() {
            *contact_volume.entry(participant).or_insert(0) += 1;
        }

        sentiment_total += item.sentiment;
        if item.sentiment > 0.3 {
            sentiment.positive += 1;
        } else if item.sentiment < -0.3 {
            sentiment.negative += 1;
        } else {
            sentiment.neutral += 1;
        }
    }
    if !items.is_empty() {
        sentiment.mean = sentiment_total / items.len() as f64;
    }

    let mut top_contacts: Vec<ContactVolume> = contact_volume
        .into_iter()
        .map(|(participant, items)| ContactVolume { participant, items })
        .collect();
    // Descending by volume, participant id as the tie-break.
    top_contacts.sort_by(|a, b| b.items.cmp(&a.items).then(a.participant.cmp(&b.participant)));
    top_contacts.truncate(TOP_CONTACTS_CAP);

    CommunicationStats {
        by_type,
        by_hour,
        by_weekday,
        by_month,
        top_contacts,
        sentiment,
    }
}

/// Mean sentiment per UTC day, ascending.
fn sentiment_series(sorted: &[&ForensicItem]) -> Vec<SentimentPoint> {
    let mut per_day: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for item in sorted {
        let entry = per_day
            .entry(item.timestamp.format("%Y-%m-%d").to_string())
            .or_insert((0.0, 0));
        entry.0 += item.sentiment;
        entry.1 += 1;
    }
    per_day
        .into_iter()
        .map(|(day, (total, count))| SentimentPoint {
            day,
            mean_sentiment: total / count as f64,
            items: count,
        })
        .collect()
}

/// Informational observations first, then findings ordered most urgent
/// first (severity rank, then kind for stability).
fn build_insights(
    stats: &CommunicationStats,
    total: u64,
    findings: &[AnomalyFinding],
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some((kind, count)) = stats
        .by_type
        .iter()
        .max_by_key(|(k, v)| (**v, std::cmp::Reverse((*k).clone())))
    {
        insights.push(Insight {
            label: "dominant_type".into(),
            detail: format!("{} of {} items are {}", count, total, kind),
            severity: None,
        });
    }
    if let Some(busiest) = (0..24).max_by_key(|&h| (stats.by_hour[h], std::cmp::Reverse(h))) {
        if stats.by_hour[busiest] > 0 {
            insights.push(Insight {
                label: "busiest_hour".into(),
                detail: format!(
                    "most activity falls in the {:02}:00 hour ({} items)",
                    busiest, stats.by_hour[busiest]
                ),
                severity: None,
            });
        }
    }
    if let Some(top) = stats.top_contacts.first() {
        insights.push(Insight {
            label: "top_contact".into(),
            detail: format!("{} appears on {} item(s)", top.participant, top.items),
            severity: None,
        });
    }
    if total > 0 {
        let lean = if stats.sentiment.mean > 0.1 {
            "positive"
        } else if stats.sentiment.mean < -0.1 {
            "negative"
        } else {
            "neutral"
        };
        insights.push(Insight {
            label: "sentiment_lean".into(),
            detail: format!("overall sentiment is {} (mean {:.2})", lean, stats.sentiment.mean),
            severity: None,
        });
    }

    let mut ordered: Vec<&AnomalyFinding> = findings.iter().collect();
    ordered.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then(a.kind.cmp(&b.kind))
    });
    for finding in ordered {
        insights.push(Insight {
            label: finding.kind.clone(),
            detail: format!("{}: {}", finding.title, finding.description),
            severity: Some(finding.severity),
        });
    }
    insights
}
