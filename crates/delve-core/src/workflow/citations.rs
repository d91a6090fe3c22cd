//! Local citation checks behind the evaluator's citation gate.
//!
//! A claim is a sentence that states a number or reports a finding. It is
//! cited when it carries a `[n]` / `[^n]` marker, a Markdown link, or an
//! inline `(Source: ...)` note.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::state::Verdict;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^?(\d+)\]").expect("valid regex"));

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\([^)\s]+\)").expect("valid regex"));

static SOURCE_NOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*source:[^)]*\)").expect("valid regex"));

static LIST_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]?\s*\[\^?\d+\]:?\s").expect("valid regex"));

const EVIDENCE_PHRASES: &[&str] = &[
    "according to",
    "reported",
    "reports that",
    "study",
    "studies",
    "survey",
    "research shows",
    "found that",
    "estimated",
    "estimates",
    "data shows",
    "data show",
    "percent",
    "announced",
    "revealed",
    "analysts",
];

/// Claim and marker counts for one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationReport {
    pub claims: usize,
    pub cited_claims: usize,
    pub markers: usize,
    /// Markers that point into the citation list
    pub valid_markers: usize,
}

impl CitationReport {
    /// Share of claims carrying a citation; 1.0 for a report without claims.
    pub fn coverage(&self) -> f64 {
        if self.claims == 0 {
            1.0
        } else {
            self.cited_claims as f64 / self.claims as f64
        }
    }

    /// Share of numeric markers that resolve; 1.0 when there are none.
    pub fn accuracy(&self) -> f64 {
        if self.markers == 0 {
            1.0
        } else {
            self.valid_markers as f64 / self.markers as f64
        }
    }
}

/// Counts claims and citation markers in `report`.
///
/// `citation_count` is the length of the numbered source list the writer
/// was given. Headings and the trailing source list are not claims.
pub fn analyze(report: &str, citation_count: usize) -> CitationReport {
    let mut result = CitationReport::default();
    let mut in_sources = false;

    for line in report.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim().to_lowercase();
            in_sources = heading.starts_with("sources") || heading.starts_with("references");
            continue;
        }
        if in_sources || LIST_ENTRY.is_match(trimmed) {
            continue;
        }

        for sentence in sentences(trimmed) {
            for capture in MARKER.captures_iter(&sentence) {
                result.markers += 1;
                let valid = capture[1]
                    .parse::<usize>()
                    .map(|n| n >= 1 && n <= citation_count)
                    .unwrap_or(false);
                if valid {
                    result.valid_markers += 1;
                }
            }
            if is_claim(&sentence) {
                result.claims += 1;
                if is_cited(&sentence) {
                    result.cited_claims += 1;
                }
            }
        }
    }

    result
}

/// Downgrades a pass to a revision when too few claims are cited.
pub fn apply_citation_gate(verdict: Verdict, coverage: f64, floor: f64) -> Verdict {
    if verdict == Verdict::Pass && coverage < floor {
        Verdict::Revise
    } else {
        verdict
    }
}

fn is_cited(sentence: &str) -> bool {
    MARKER.is_match(sentence) || LINK.is_match(sentence) || SOURCE_NOTE.is_match(sentence)
}

fn is_claim(sentence: &str) -> bool {
    let stripped = MARKER.replace_all(sentence, "");
    let stripped = LINK.replace_all(&stripped, "");
    if stripped.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let lower = stripped.to_lowercase();
    EVIDENCE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Splits a line at sentence punctuation followed by whitespace.
/// A fragment holding only markers belongs to the sentence before it.
fn sentences(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary =
            matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace());
        if boundary {
            push_sentence(&mut out, &current);
            current.clear();
        }
    }
    push_sentence(&mut out, &current);
    out
}

fn push_sentence(out: &mut Vec<String>, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    let markers_only = MARKER
        .replace_all(fragment, "")
        .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == ',')
        .is_empty();
    if markers_only {
        if let Some(last) = out.last_mut() {
            last.push(' ');
            last.push_str(fragment);
            return;
        }
    }
    out.push(fragment.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cited_and_uncited_claims() {
        let report = "# Market\n\nNvidia held 80% of the market in 2024 [1]. \
                      Revenue grew 120% year over year. The outlook is mixed.";
        let analysis = analyze(report, 2);
        assert_eq!(analysis.claims, 2);
        assert_eq!(analysis.cited_claims, 1);
        assert!((analysis.coverage() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_marker_attaches_to_previous_sentence() {
        let analysis = analyze("Shipments reached 3.5 million units. [2]", 2);
        assert_eq!(analysis.claims, 1);
        assert_eq!(analysis.cited_claims, 1);
    }

    #[test]
    fn test_sources_section_is_ignored() {
        let report = "Growth was 10% [1].\n\n## Sources\n\n[1] Report 2024 (https://a.com)\n[7] Other";
        let analysis = analyze(report, 1);
        assert_eq!(analysis.claims, 1);
        assert_eq!(analysis.markers, 1);
        assert_eq!(analysis.accuracy(), 1.0);
    }

    #[test]
    fn test_out_of_range_markers_lower_accuracy() {
        let analysis = analyze("Sales hit 5 million [1]. Margins were 30% [9].", 2);
        assert_eq!(analysis.markers, 2);
        assert_eq!(analysis.valid_markers, 1);
        assert!((analysis.accuracy() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_other_citation_styles() {
        let report = "According to analysts, demand is rising (Source: IDC). \
                      A survey found strong adoption [IDC](https://idc.com).";
        let analysis = analyze(report, 0);
        assert_eq!(analysis.claims, 2);
        assert_eq!(analysis.cited_claims, 2);
    }

    #[test]
    fn test_no_claims_means_full_coverage() {
        let analysis = analyze("This report has no factual claims at all.", 0);
        assert_eq!(analysis.coverage(), 1.0);
    }

    #[test]
    fn test_gate_only_downgrades_pass() {
        assert_eq!(apply_citation_gate(Verdict::Pass, 0.5, 0.7), Verdict::Revise);
        assert_eq!(apply_citation_gate(Verdict::Pass, 0.9, 0.7), Verdict::Pass);
        assert_eq!(apply_citation_gate(Verdict::Incomplete, 0.1, 0.7), Verdict::Incomplete);
    }
}
