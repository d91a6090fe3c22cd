//! Exact and near-duplicate removal.
//!
//! Both passes work on a total canonical ordering (longest content first,
//! then score, URL and the remaining fields) so the surviving representative
//! does not depend on the order hits arrived in.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use similar::TextDiff;

use crate::config::{FINGERPRINT_CHARS, SIMILARITY_CHARS};
use crate::llm::truncate_chars;
use crate::search::SearchResult;

/// Canonical order: longer content, then higher score, then canonical URL.
///
/// Remaining fields break ties so two distinct hits never compare equal.
pub(crate) fn canonical_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.content_len()
        .cmp(&a.content_len())
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.canonical_url.cmp(&b.canonical_url))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.provider.cmp(&b.provider))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.search_query.cmp(&b.search_query))
}

/// Keeps one hit per canonical URL, preferring the longer content body.
pub fn dedup_exact(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut best: HashMap<String, SearchResult> = HashMap::new();
    for result in results {
        match best.get(&result.canonical_url) {
            Some(kept) if canonical_order(kept, &result) != Ordering::Greater => {}
            _ => {
                best.insert(result.canonical_url.clone(), result);
            }
        }
    }

    let mut kept: Vec<_> = best.into_values().collect();
    kept.sort_by(canonical_order);
    kept
}

/// Drops hits whose text matches an already kept hit.
///
/// A hit is a duplicate when its fingerprint equals a kept one, or when the
/// word-level similarity ratio against a kept hit reaches `threshold`.
pub fn dedup_near(mut results: Vec<SearchResult>, threshold: f64) -> Vec<SearchResult> {
    results.sort_by(canonical_order);

    let mut fingerprints = HashSet::new();
    let mut kept: Vec<(SearchResult, String)> = Vec::with_capacity(results.len());

    for result in results {
        let text = comparable_text(&result);
        if text.is_empty() {
            kept.push((result, text));
            continue;
        }

        if !fingerprints.insert(fingerprint(&text)) {
            continue;
        }

        let sample = truncate_chars(&text, SIMILARITY_CHARS);
        let duplicate = kept.iter().any(|(_, other)| {
            !other.is_empty()
                && text_similarity(sample, truncate_chars(other, SIMILARITY_CHARS)) >= threshold
        });
        if !duplicate {
            kept.push((result, text));
        }
    }

    kept.into_iter().map(|(result, _)| result).collect()
}

/// Lower-cased alphanumeric words joined by single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the normalized text prefix.
pub fn fingerprint(normalized: &str) -> String {
    let digest = Sha256::digest(truncate_chars(normalized, FINGERPRINT_CHARS).as_bytes());
    hex::encode(&digest[..8])
}

/// Word-level similarity ratio in [0, 1].
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let old: Vec<&str> = a.split_whitespace().collect();
    let new: Vec<&str> = b.split_whitespace().collect();
    if old.is_empty() && new.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_slices(&old, &new).ratio())
}

fn comparable_text(result: &SearchResult) -> String {
    if result.content.trim().is_empty() {
        normalize_text(&result.title)
    } else {
        normalize_text(&result.content)
    }
}
