//! Relevance and freshness scoring.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::domain_of;
use crate::config::{AUTHORITY_DOMAINS, STOP_WORDS, TIME_SENSITIVE_MARKERS};
use crate::search::{clamp_unit, SearchResult};

const TITLE_WEIGHT: f64 = 0.5;
const CONTENT_WEIGHT: f64 = 0.3;
const QUERY_WEIGHT: f64 = 0.2;

/// Freshness of a hit without a publication date.
pub const NEUTRAL_FRESHNESS: f64 = 0.5;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));

/// Lower-cased content words with stop-words removed.
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Fraction of `query_terms` present in `text`.
fn overlap(query_terms: &HashSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let shared = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
    shared as f64 / query_terms.len() as f64
}

/// Whether the URL belongs to a reference, academic or government domain.
pub fn is_authoritative(url: &str) -> bool {
    let Some(domain) = domain_of(url) else {
        return false;
    };
    AUTHORITY_DOMAINS.iter().any(|entry| {
        if entry.starts_with('.') {
            domain.ends_with(entry)
        } else {
            domain == *entry || domain.ends_with(&format!(".{entry}"))
        }
    })
}

/// Weighted term overlap of the user query with title, content and the
/// producing search query, plus the authority bonus; clamped to [0, 1].
pub fn relevance(
    result: &SearchResult,
    query_terms: &HashSet<String>,
    authority_bonus: f64,
) -> f64 {
    let mut score = TITLE_WEIGHT * overlap(query_terms, &result.title)
        + CONTENT_WEIGHT * overlap(query_terms, &result.content)
        + QUERY_WEIGHT * overlap(query_terms, &result.search_query);
    if is_authoritative(&result.url) {
        score += authority_bonus;
    }
    clamp_unit(score)
}

/// Time-sensitive queries mention recency or an explicit year.
pub fn is_time_sensitive(query: &str) -> bool {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let joined = words.join(" ");

    let marker_hit = TIME_SENSITIVE_MARKERS.iter().any(|marker| {
        if marker.contains(' ') {
            format!(" {joined} ").contains(&format!(" {marker} "))
        } else {
            words.contains(marker)
        }
    });
    marker_hit || YEAR.is_match(&lowered)
}

/// `0.5^(age_days / half_life_days)`; future dates count as brand new.
pub fn freshness(
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> f64 {
    let Some(published_at) = published_at else {
        return NEUTRAL_FRESHNESS;
    };
    let age_days = (now - published_at).num_seconds().max(0) as f64 / 86_400.0;
    0.5_f64.powf(age_days / half_life_days)
}

/// `(1 - weight)·relevance + weight·freshness`.
pub fn blend(relevance: f64, freshness: f64, weight: f64) -> f64 {
    clamp_unit((1.0 - weight) * relevance + weight * freshness)
}
