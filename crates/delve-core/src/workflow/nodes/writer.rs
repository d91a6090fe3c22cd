use std::collections::HashMap;

use tracing::info;

use crate::aggregate::{AggregatedResultSet, EvidenceBlock};
use crate::llm::truncate_chars;
use crate::search::SearchResult;
use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{build_writer_prompt, WRITER_SYSTEM_PROMPT};
use crate::workflow::state::{EvidenceSummary, StateUpdate, WorkflowState};

const DIGEST_CHARS: usize = 240;

/// Drafts the report from a freshly aggregated view of every hit so far.
pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let aggregator = &ctx.services.aggregator;
    let limits = aggregator.config();
    let set = aggregator.aggregate(&state.hits, &state.input);
    let evidence = set.format_evidence(limits.max_items_per_tier, limits.max_chars_per_item);

    info!(
        run_id = %ctx.run_id,
        hits = set.total_before,
        kept = set.total_after,
        cited = evidence.citations.len(),
        "Aggregated evidence"
    );

    let mut update = StateUpdate {
        evidence: Some(EvidenceSummary::from(&set)),
        citations: Some(evidence.citations.clone()),
        ..Default::default()
    };

    let prompt = build_writer_prompt(&state.question_with_context(), &evidence);
    let draft = match ctx.llm_text(WRITER_SYSTEM_PROMPT, &prompt).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => digest_report(&state.input, &set, &evidence),
        Err(err) => match err.into_run_error(NodeId::Writer) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                digest_report(&state.input, &set, &evidence)
            }
        },
    };

    update.draft = Some(draft);
    update
}

/// Templated report listing the cited evidence, for when the model fails.
pub(crate) fn digest_report(
    question: &str,
    set: &AggregatedResultSet,
    evidence: &EvidenceBlock,
) -> String {
    let mut report = format!("# {}\n\n", question.trim());

    if evidence.is_empty() {
        report.push_str(
            "No usable evidence was found for this question; the search providers \
             returned nothing that could be cited.\n",
        );
        return report;
    }

    let by_source: HashMap<&str, &SearchResult> =
        set.iter().map(|hit| (hit.source_id.as_str(), hit)).collect();

    report.push_str(
        "Automated synthesis was unavailable. The strongest sources found are summarized below.\n\n",
    );
    report.push_str("## Key findings\n\n");
    for citation in &evidence.citations {
        let summary = by_source
            .get(citation.source_id.as_str())
            .map(|hit| first_sentence(&hit.content))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| citation.title.clone());
        report.push_str(&format!("- {}: {} [{}]\n", citation.title, summary, citation.index));
    }

    report.push_str("\n## Sources\n\n");
    report.push_str(&evidence.citation_list());
    report.push('\n');
    report
}

fn first_sentence(content: &str) -> String {
    let content = content.trim();
    let end = content
        .char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && content[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(content.len());
    let sentence = &content[..end];
    let trimmed = truncate_chars(sentence, DIGEST_CHARS);
    // Drop the final period so the marker sits inside the sentence
    trimmed.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::workflow::citations::analyze;

    #[test]
    fn test_digest_report_cites_every_finding() {
        let hits = vec![
            SearchResult::new(
                "Chip market report",
                "https://example.com/chips",
                "The AI chip market reached 53 billion dollars in 2024. More text follows.",
                "searxng",
            ),
            SearchResult::new(
                "GPU shipments",
                "https://example.org/gpus",
                "Shipments grew 40% year over year.",
                "searxng",
            ),
        ];
        let set = ResultAggregator::default().aggregate(&hits, "AI chip market 2024");
        let evidence = set.format_evidence(5, 500);
        let report = digest_report("AI chip market 2024", &set, &evidence);

        assert!(report.contains("53 billion dollars in 2024 ["));
        assert!(report.contains("## Sources"));
        assert_eq!(analyze(&report, evidence.citations.len()).coverage(), 1.0);
    }

    #[test]
    fn test_digest_report_without_evidence() {
        let set = AggregatedResultSet::default();
        let report = digest_report("q", &set, &EvidenceBlock::default());
        assert!(report.contains("No usable evidence"));
        assert_eq!(analyze(&report, 0).coverage(), 1.0);
    }

    #[test]
    fn test_first_sentence() {
        assert_eq!(
            first_sentence("Revenue rose 3.5% in Q2. Then fell."),
            "Revenue rose 3.5% in Q2"
        );
        assert_eq!(first_sentence("no punctuation"), "no punctuation");
    }
}
