use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dedup::{dedup_exact, dedup_near};
use super::scoring::{blend, freshness, is_time_sensitive, relevance, terms};
use crate::config::AggregatorConfig;
use crate::llm::truncate_chars;
use crate::search::SearchResult;

/// One entry of the numbered source list handed to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based marker number, as in `[3]`
    pub index: usize,
    pub title: String,
    pub url: String,
    pub source_id: String,
}

/// Rendered evidence plus the citation list it refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBlock {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl EvidenceBlock {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// `[n] Title (url)` lines.
    pub fn citation_list(&self) -> String {
        self.citations
            .iter()
            .map(|c| format!("[{}] {} ({})", c.index, c.title, c.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Deduplicated, scored and tiered evidence for one writer invocation.
///
/// Every hit carries its final score in `score`. Tiers are sorted best
/// first, so scores never increase from `primary` to `additional`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedResultSet {
    pub primary: Vec<SearchResult>,
    pub supporting: Vec<SearchResult>,
    pub additional: Vec<SearchResult>,
    pub total_before: usize,
    pub total_after: usize,
    pub duplicates_removed: usize,
    pub time_sensitive: bool,
}

impl AggregatedResultSet {
    pub fn is_empty(&self) -> bool {
        self.total_after == 0
    }

    /// All kept hits, tier by tier.
    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.primary
            .iter()
            .chain(self.supporting.iter())
            .chain(self.additional.iter())
    }

    /// Renders at most `max_items` hits per tier, each trimmed to `max_chars`.
    pub fn format_evidence(&self, max_items: usize, max_chars: usize) -> EvidenceBlock {
        let mut block = EvidenceBlock::default();
        let mut sections = Vec::new();

        for (heading, tier) in [
            ("Primary evidence", &self.primary),
            ("Supporting evidence", &self.supporting),
            ("Additional evidence", &self.additional),
        ] {
            if tier.is_empty() {
                continue;
            }
            let mut section = format!("## {heading}\n");
            for hit in tier.iter().take(max_items) {
                let index = block.citations.len() + 1;
                section.push_str(&format!("\n[{index}] {}\nURL: {}\n", hit.title, hit.url));
                if let Some(published) = hit.published_at {
                    section.push_str(&format!("Published: {}\n", published.format("%Y-%m-%d")));
                }
                let body = truncate_chars(hit.content.trim(), max_chars);
                if !body.is_empty() {
                    section.push_str(body);
                    section.push('\n');
                }
                block.citations.push(Citation {
                    index,
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                    source_id: hit.source_id.clone(),
                });
            }
            sections.push(section);
        }

        block.text = sections.join("\n");
        block
    }
}

/// Turns the run's raw hits into an [`AggregatedResultSet`].
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    config: AggregatorConfig,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn aggregate(&self, hits: &[SearchResult], query: &str) -> AggregatedResultSet {
        self.aggregate_at(hits, query, Utc::now())
    }

    /// Same as [`aggregate`](Self::aggregate) with an explicit clock.
    pub fn aggregate_at(
        &self,
        hits: &[SearchResult],
        query: &str,
        now: DateTime<Utc>,
    ) -> AggregatedResultSet {
        let total_before = hits.len();
        let unique = dedup_exact(hits.to_vec());
        let mut kept = dedup_near(unique, self.config.similarity_threshold);

        let query_terms = terms(query);
        let time_sensitive = is_time_sensitive(query);
        for hit in &mut kept {
            let rel = relevance(hit, &query_terms, self.config.authority_bonus);
            hit.score = if time_sensitive {
                let fresh = freshness(hit.published_at, now, self.config.freshness_half_life_days);
                blend(rel, fresh, self.config.freshness_weight)
            } else {
                rel
            };
        }

        kept.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.canonical_url.cmp(&b.canonical_url))
        });

        let total_after = kept.len();
        let mut set = AggregatedResultSet {
            total_before,
            total_after,
            duplicates_removed: total_before - total_after,
            time_sensitive,
            ..Default::default()
        };
        for hit in kept {
            if hit.score >= self.config.primary_threshold {
                set.primary.push(hit);
            } else if hit.score >= self.config.supporting_threshold {
                set.supporting.push(hit);
            } else {
                set.additional.push(hit);
            }
        }

        debug!(
            total_before,
            total_after,
            primary = set.primary.len(),
            supporting = set.supporting.len(),
            time_sensitive,
            "Aggregated evidence"
        );
        set
    }
}
