//! Content Enrichment Pipeline
//!
//! Computes sentiment, language, keywords, entities and a relevance
//! score for one item's text content. The engine is built once at
//! process startup (precompiled regex tables and lexicons) and shared
//! read-only across source-processing tasks; enrichment never aborts a
//! run, any failure degrades to neutral defaults.

use crate::models::Entity;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Entity extraction only looks at this many leading characters.
const ENTITY_WINDOW: usize = 1000;
/// Keywords are capped to the first N distinct hits.
const KEYWORD_CAP: usize = 20;
/// Relevance never drops below this floor.
const RELEVANCE_FLOOR: f64 = 0.1;

/// Enrichment output for one item's content.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    /// Polarity in [-1.0, 1.0].
    pub sentiment: f64,
    pub language: String,
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
    /// [0.1, 1.0]
    pub relevance: f64,
}

impl Enrichment {
    /// Defaults used for empty content and for failed enrichment.
    pub fn neutral() -> Self {
        Self {
            sentiment: 0.0,
            language: "en".to_string(),
            keywords: Vec::new(),
            entities: Vec::new(),
            relevance: RELEVANCE_FLOOR,
        }
    }
}

pub struct EnrichmentEngine {
    entity_patterns: Vec<(Regex, &'static str)>,
    lexicon: HashMap<&'static str, f64>,
    negations: HashSet<&'static str>,
    stopwords: HashSet<&'static str>,
}

impl EnrichmentEngine {
    /// Compile the pattern tables and lexicons. Called once per process.
    pub fn new() -> Self {
        Self {
            entity_patterns: Self::compile_entity_patterns(),
            lexicon: Self::build_lexicon(),
            negations: ["not", "no", "never", "dont", "don't", "cant", "can't", "wont", "won't"]
                .into_iter()
                .collect(),
            stopwords: STOPWORDS_EN.iter().copied().collect(),
        }
    }

    /// Enrich one item's content. Infallible by contract: empty input
    /// yields neutral defaults and internal failures degrade the same way.
    pub fn enrich(&self, content: &str) -> Enrichment {
        if content.trim().is_empty() {
            return Enrichment::neutral();
        }

        let entities = self.extract_entities(content);
        let char_count = content.chars().count();
        let relevance = (0.5 * (char_count as f64 / 1000.0)
            + 0.5 * (entities.len() as f64 / 10.0))
            .min(1.0)
            .max(RELEVANCE_FLOOR);

        Enrichment {
            sentiment: self.sentiment(content),
            language: self.detect_language(content),
            keywords: self.keywords(content),
            entities,
            relevance,
        }
    }

    /// Lexicon polarity with a two-token negation window, normalized
    /// to [-1.0, 1.0].
    fn sentiment(&self, content: &str) -> f64 {
        let tokens: Vec<String> = content
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut total = 0.0;
        let mut scored = 0u32;
        for (i, token) in tokens.iter().enumerate() {
            if let Some(&weight) = self.lexicon.get(token.as_str()) {
                let negated = tokens[i.saturating_sub(2)..i]
                    .iter()
                    .any(|t| self.negations.contains(t.as_str()));
                total += if negated { -weight } else { weight };
                scored += 1;
            }
        }

        if scored == 0 {
            0.0
        } else {
            (total / scored as f64).clamp(-1.0, 1.0)
        }
    }

    /// Unicode-script checks for non-Latin scripts, stopword voting
    /// among Latin languages, default "en".
    fn detect_language(&self, content: &str) -> String {
        for c in content.chars() {
            match c {
                '\u{0400}'..='\u{04FF}' => return "ru".to_string(),
                '\u{0600}'..='\u{06FF}' => return "ar".to_string(),
                '\u{3040}'..='\u{30FF}' => return "ja".to_string(),
                '\u{AC00}'..='\u{D7AF}' => return "ko".to_string(),
                '\u{4E00}'..='\u{9FAF}' => return "zh".to_string(),
                _ => {}
            }
        }

        let tokens: HashSet<String> = content
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase())
            .collect();
        let vote = |words: &[&str]| words.iter().filter(|w| tokens.contains(**w)).count();

        let scores = [
            ("en", vote(&["the", "and", "you", "for", "with", "this", "that"])),
            ("es", vote(&["que", "los", "las", "para", "pero", "como", "esta"])),
            ("fr", vote(&["les", "des", "est", "pour", "dans", "avec", "vous"])),
            ("de", vote(&["und", "der", "die", "das", "nicht", "ich", "mit"])),
        ];
        scores
            .iter()
            .max_by_key(|(_, n)| *n)
            .filter(|(_, n)| *n > 0)
            .map(|(lang, _)| lang.to_string())
            .unwrap_or_else(|| "en".to_string())
    }

    /// Noun-like tokens: proper-noun capitalization or length >= 4,
    /// stop-words excluded, case-folded, deduplicated, first-appearance
    /// order, capped.
    fn keywords(&self, content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for token in content.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() || token.chars().any(|c| c.is_numeric()) {
                continue;
            }
            let noun_like = token.chars().next().is_some_and(|c| c.is_uppercase())
                || token.chars().count() >= 4;
            if !noun_like {
                continue;
            }
            let folded = token.to_lowercase();
            if self.stopwords.contains(folded.as_str()) || folded.chars().count() < 3 {
                continue;
            }
            if seen.insert(folded.clone()) {
                out.push(folded);
                if out.len() == KEYWORD_CAP {
                    break;
                }
            }
        }
        out
    }

    /// Regex NER over the leading window, with character spans.
    fn extract_entities(&self, content: &str) -> Vec<Entity> {
        let window_end = content
            .char_indices()
            .nth(ENTITY_WINDOW)
            .map(|(i, _)| i)
            .unwrap_or(content.len());
        let window = &content[..window_end];

        let mut entities = Vec::new();
        for (pattern, label) in &self.entity_patterns {
            for mat in pattern.find_iter(window) {
                entities.push(Entity {
                    text: mat.as_str().to_string(),
                    label: label.to_string(),
                    start: mat.start(),
                    end: mat.end(),
                });
            }
        }
        entities.sort_by(|a, b| (a.start, a.end, &a.label).cmp(&(b.start, b.end, &b.label)));
        entities
    }

    fn compile_entity_patterns() -> Vec<(Regex, &'static str)> {
        let patterns: &[(&str, &'static str)] = &[
            (r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", "email"),
            (r#"https?://[^\s<>"]+"#, "url"),
            (r"\+\d[\d\s().-]{7,}\d", "phone"),
            (r"[$€£]\s?\d[\d,]*(?:\.\d+)?", "money"),
            (r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/\d{2,4}\b", "date"),
            (r"\b[A-Z][a-z]+ [A-Z][a-z]+\b", "person"),
            (
                r"\b[A-Z][A-Za-z&]*(?: [A-Z][A-Za-z&]*)? (?:Inc|LLC|Ltd|Corp|GmbH|Co)\b\.?",
                "organization",
            ),
        ];

        patterns
            .iter()
            .filter_map(|(pattern, label)| {
                Regex::new(pattern)
                    .map(|re| (re, *label))
                    .map_err(|e| {
                        log::warn!("Failed to compile entity regex '{}': {}", pattern, e);
                        e
                    })
                    .ok()
            })
            .collect()
    }

    fn build_lexicon() -> HashMap<&'static str, f64> {
        let entries: &[(&str, f64)] = &[
            // positive
            ("good", 0.5),
            ("great", 0.7),
            ("love", 0.8),
            ("happy", 0.7),
            ("thanks", 0.4),
            ("thank", 0.4),
            ("perfect", 0.8),
            ("excellent", 0.8),
            ("glad", 0.5),
            ("agree", 0.4),
            ("fine", 0.3),
            ("nice", 0.5),
            ("wonderful", 0.8),
            ("best", 0.6),
            ("congrats", 0.7),
            ("congratulations", 0.7),
            // negative
            ("bad", -0.5),
            ("hate", -0.8),
            ("angry", -0.7),
            ("furious", -0.9),
            ("terrible", -0.8),
            ("awful", -0.8),
            ("worst", -0.8),
            ("liar", -0.8),
            ("lie", -0.6),
            ("lied", -0.6),
            ("threat", -0.7),
            ("threatening", -0.7),
            ("scared", -0.6),
            ("afraid", -0.6),
            ("wrong", -0.4),
            ("problem", -0.3),
            ("sorry", -0.2),
            ("stupid", -0.7),
            ("idiot", -0.8),
            ("kill", -0.9),
            ("hurt", -0.6),
            ("destroy", -0.7),
        ];
        entries.iter().copied().collect()
    }
}

impl Default for EnrichmentEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal English stop-word list for keyword filtering.
const STOPWORDS_EN: &[&str] = &[
    "the", "and", "that", "this", "with", "from", "have", "will", "your", "about", "there",
    "their", "would", "could", "should", "been", "were", "they", "them", "then", "than",
    "when", "what", "where", "which", "while", "because", "but", "for", "you", "are", "was",
    "has", "had", "not", "all", "can", "her", "his", "she", "him", "its", "our", "out", "who",
    "how", "why", "did", "does", "doing", "just", "also", "into", "over", "some", "such",
    "only", "very", "more", "most", "other", "after", "before", "here", "still", "being",
];
