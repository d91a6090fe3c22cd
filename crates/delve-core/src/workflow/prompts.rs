//! System prompts, JSON shapes and prompt builders for every model-backed node.

use crate::aggregate::EvidenceBlock;

/// System prompt for the router.
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You route research questions to the cheapest workflow that can answer them well.

Routes:
- "direct": general knowledge, definitions, or arithmetic; no search needed
- "web": a quick factual lookup that one or two searches settle
- "agent": an exploratory question where each search informs the next
- "deep": a broad question needing a multi-query plan, synthesis and review
- "clarify": the question is too vague or ambiguous to research as written

Report your confidence between 0 and 1."#;

pub const ROUTER_SCHEMA: &str = r#"{
  "route": "deep | agent | web | direct | clarify",
  "confidence": 0.8,
  "reason": "One sentence"
}"#;

/// System prompt for the ambiguity check.
pub const CLARIFY_SYSTEM_PROMPT: &str = r#"You decide whether a research question can be researched as written.

Ask for clarification only when different reasonable readings would lead to different research. If clarification is needed, write one short question for the user."#;

pub const CLARIFY_SCHEMA: &str = r#"{
  "needs_clarification": false,
  "question": "What should the user clarify?"
}"#;

/// System prompt for answers without search.
pub const DIRECT_ANSWER_SYSTEM_PROMPT: &str = r#"You answer questions concisely from general knowledge.

Answer in Markdown. If the answer depends on recent events you cannot know, say so plainly."#;

/// System prompt for query planning.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You plan web searches for a research question.

Write short, specific search engine queries that together cover the question. Each query should target a different aspect; avoid rephrasing the same query."#;

pub const PLANNER_SCHEMA: &str = r#"{
  "queries": ["first search query", "second search query"]
}"#;

/// System prompt for follow-up planning after an evaluation.
pub const REFINE_SYSTEM_PROMPT: &str = r#"You plan follow-up web searches that close gaps in a research report.

Target only the missing topics and open questions you are given. Do not repeat queries that were already run."#;

/// System prompt for the tool-using agent.
pub const TOOL_AGENT_SYSTEM_PROMPT: &str = r#"You research a question by issuing web searches one at a time.

After each search you see what was found so far. Choose "search" with a new query while important aspects are still uncovered, or "finish" once the evidence is sufficient."#;

pub const TOOL_AGENT_SCHEMA: &str = r#"{
  "action": "search | finish",
  "query": "next search query (omit when finishing)"
}"#;

/// System prompt for report drafting.
pub const WRITER_SYSTEM_PROMPT: &str = r#"You write research reports grounded in the evidence provided.

Rules:
1. Use only facts supported by the evidence.
2. Cite every factual claim with the bracketed source number, e.g. [2].
3. Prefer primary evidence; use supporting and additional evidence for context.
4. Mention disagreements between sources.
5. End with a "Sources" section listing the cited sources.

Write in Markdown."#;

/// System prompt for report evaluation.
pub const EVALUATOR_SYSTEM_PROMPT: &str = r#"You review a research report against the question and its evidence.

Score each dimension between 0 and 1:
- coverage: does the report address every part of the question?
- accuracy: are the claims supported by the evidence?
- freshness: is the information current enough for the question?
- coherence: is the report well organized and consistent?

Verdict:
- "pass": the report is ready
- "revise": the report needs rewriting
- "incomplete": important parts of the question lack evidence

List missing topics and search queries that would fill them."#;

pub const EVALUATOR_SCHEMA: &str = r#"{
  "verdict": "pass | revise | incomplete",
  "coverage": 0.8,
  "accuracy": 0.8,
  "freshness": 0.8,
  "coherence": 0.8,
  "missing_topics": ["topic"],
  "follow_up_queries": ["search query"],
  "critique": "What to improve"
}"#;

/// System prompt for the reviser.
pub const REVISER_SYSTEM_PROMPT: &str = r#"You revise a research report according to a reviewer's critique.

Keep every supported claim and its bracketed citation. Add citations to uncited factual claims using the evidence numbers given. Do not invent sources. Output the full revised report in Markdown."#;

pub fn build_router_prompt(question: &str) -> String {
    format!("## Question\n\n{question}\n\nChoose a route.")
}

pub fn build_clarify_prompt(question: &str) -> String {
    format!("## Question\n\n{question}\n\nCan this be researched as written?")
}

pub fn build_plan_prompt(question: &str, max_queries: usize) -> String {
    format!(
        "## Question\n\n{question}\n\nWrite at most {max_queries} search queries."
    )
}

pub fn build_refine_prompt(
    question: &str,
    missing_topics: &[String],
    suggestions: &[String],
    executed: &[String],
    max_queries: usize,
) -> String {
    format!(
        r#"## Question

{question}

## Missing topics

{}

## Suggested follow-ups

{}

## Already searched

{}

Write at most {max_queries} new search queries."#,
        bullet_list(missing_topics),
        bullet_list(suggestions),
        bullet_list(executed),
    )
}

pub fn build_tool_agent_prompt(
    question: &str,
    executed: &[String],
    findings: &[String],
    remaining_calls: u32,
) -> String {
    format!(
        r#"## Question

{question}

## Searches so far

{}

## Findings so far

{}

You have {remaining_calls} searches left."#,
        bullet_list(executed),
        bullet_list(findings),
    )
}

pub fn build_writer_prompt(question: &str, evidence: &EvidenceBlock) -> String {
    format!(
        r#"## Question

{question}

## Evidence

{}

## Citation list

{}

Write the report."#,
        evidence_text(evidence),
        evidence.citation_list(),
    )
}

pub fn build_evaluator_prompt(question: &str, report: &str, evidence: &EvidenceBlock) -> String {
    format!(
        r#"## Question

{question}

## Report

{report}

## Evidence

{}

Evaluate the report."#,
        evidence_text(evidence),
    )
}

pub fn build_reviser_prompt(
    question: &str,
    report: &str,
    critique: &str,
    citation_list: &str,
) -> String {
    format!(
        r#"## Question

{question}

## Current report

{report}

## Critique

{critique}

## Citation list

{citation_list}

Rewrite the report."#
    )
}

fn evidence_text(evidence: &EvidenceBlock) -> &str {
    if evidence.text.is_empty() {
        "(no evidence was found)"
    } else {
        &evidence.text
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
