use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{canonicalize_url, source_id};

/// One normalized piece of evidence returned by a search provider.
///
/// Identity is the canonical URL (and the `source_id` derived from it):
/// the same page found by two queries or two providers is one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// URL exactly as the provider returned it
    pub url: String,
    pub canonical_url: String,
    /// Hex digest of the canonical URL
    pub source_id: String,
    /// Snippet or extracted page content
    pub content: String,
    /// Name of the provider that produced this hit
    pub provider: String,
    /// Relevance in [0, 1]; provider-assigned until the aggregator rescores it
    pub score: f64,
    pub published_at: Option<DateTime<Utc>>,
    /// The search query that surfaced this hit
    #[serde(default)]
    pub search_query: String,
    /// Provider-specific payload, kept for debugging and export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl SearchResult {
    /// Creates a result and derives its canonical identity.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let canonical_url = canonicalize_url(&url);
        let source_id = source_id(&canonical_url);
        Self {
            title: title.into(),
            url,
            canonical_url,
            source_id,
            content: content.into(),
            provider: provider.into(),
            score: 0.0,
            published_at: None,
            search_query: String::new(),
            raw: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = clamp_unit(score);
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Length of the content body in characters.
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Clamps to [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Parses the date formats search APIs commonly return.
pub(crate) fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
