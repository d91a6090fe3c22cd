use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NodeId;
use crate::aggregate::{AggregatedResultSet, Citation};
use crate::config::WorkflowConfig;
use crate::search::SearchResult;

/// Routing decision made by the `router` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Deep,
    Agent,
    Web,
    Direct,
    Clarify,
}

impl Route {
    /// Parses a model-produced label; `None` when unrecognized.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "deep" | "deep_research" | "research" => Some(Route::Deep),
            "agent" | "agentic" | "tool_agent" => Some(Route::Agent),
            "web" | "web_search" | "search" => Some(Route::Web),
            "direct" | "direct_answer" | "answer" => Some(Route::Direct),
            "clarify" | "clarification" => Some(Route::Clarify),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Deep => "deep",
            Route::Agent => "agent",
            Route::Web => "web",
            Route::Direct => "direct",
            Route::Clarify => "clarify",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much machinery a run uses. Deep and agentic runs are quality-gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Direct,
    Web,
    Agentic,
    #[default]
    Deep,
}

impl RunMode {
    pub fn is_quality_gated(&self) -> bool {
        matches!(self, RunMode::Deep | RunMode::Agentic)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    AwaitingReview,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::AwaitingReview => "awaiting_review",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Revise,
    Incomplete,
}

impl Verdict {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "pass" | "passed" | "accept" => Some(Verdict::Pass),
            "revise" | "revision" => Some(Verdict::Revise),
            "incomplete" => Some(Verdict::Incomplete),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Pass => "pass",
            Verdict::Revise => "revise",
            Verdict::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

/// Per-dimension evaluation scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub coverage: f64,
    pub accuracy: f64,
    pub freshness: f64,
    pub coherence: f64,
    pub citation_coverage: f64,
    pub citation_accuracy: f64,
}

impl DimensionScores {
    /// Every model-scored dimension set to `value`, citations perfect.
    pub fn uniform(value: f64) -> Self {
        Self {
            coverage: value,
            accuracy: value,
            freshness: value,
            coherence: value,
            citation_coverage: 1.0,
            citation_accuracy: 1.0,
        }
    }
}

/// Output of the `evaluator` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub scores: DimensionScores,
    #[serde(default)]
    pub missing_topics: Vec<String>,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
    /// Free-text critique handed to the reviser.
    #[serde(default)]
    pub critique: String,
}

/// Counts describing the evidence behind the current draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub primary: usize,
    pub supporting: usize,
    pub additional: usize,
    pub total_before: usize,
    pub total_after: usize,
    pub duplicates_removed: usize,
}

impl From<&AggregatedResultSet> for EvidenceSummary {
    fn from(set: &AggregatedResultSet) -> Self {
        Self {
            primary: set.primary.len(),
            supporting: set.supporting.len(),
            additional: set.additional.len(),
            total_before: set.total_before,
            total_after: set.total_after,
            duplicates_removed: set.duplicates_removed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LanguageModel,
    Search,
    Timeout,
    Storage,
}

/// One recoverable failure observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub node: NodeId,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl RunError {
    pub fn new(node: NodeId, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            node,
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Wall-clock time spent in one node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub node: NodeId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// The single record threaded through a run.
///
/// Only the engine mutates it, through [`WorkflowState::apply`]. `hits`,
/// `executed_queries`, `errors` and `timings` only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: String,
    pub input: String,
    #[serde(default)]
    pub attachments: Vec<String>,

    pub route: Option<Route>,
    pub route_confidence: f64,
    pub mode: RunMode,
    pub status: RunStatus,
    pub cancel_reason: Option<String>,
    pub clarification: Option<String>,

    /// Query batch for the next fan-out.
    pub plan: Vec<String>,
    pub executed_queries: Vec<String>,
    pub hits: Vec<SearchResult>,

    pub evidence: EvidenceSummary,
    pub citations: Vec<Citation>,
    pub draft: Option<String>,
    pub final_report: Option<String>,
    pub evaluation: Option<Evaluation>,

    pub revision_count: u32,
    pub max_revisions: u32,
    pub tool_calls: u32,
    pub max_tool_calls: u32,

    pub errors: Vec<RunError>,
    pub timings: Vec<PhaseTiming>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(input: impl Into<String>, config: &WorkflowConfig) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            input: input.into(),
            attachments: Vec::new(),
            route: None,
            route_confidence: 0.0,
            mode: RunMode::default(),
            status: RunStatus::Running,
            cancel_reason: None,
            clarification: None,
            plan: Vec::new(),
            executed_queries: Vec::new(),
            hits: Vec::new(),
            evidence: EvidenceSummary::default(),
            citations: Vec::new(),
            draft: None,
            final_report: None,
            evaluation: None,
            revision_count: 0,
            max_revisions: config.max_revisions,
            tool_calls: 0,
            max_tool_calls: config.max_tool_calls,
            errors: Vec::new(),
            timings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Question text plus any attachments, as given to prompts.
    pub fn question_with_context(&self) -> String {
        if self.attachments.is_empty() {
            return self.input.clone();
        }
        format!(
            "{}\n\nAttached context:\n{}",
            self.input,
            self.attachments.join("\n---\n")
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    /// Whether `query` was already dispatched in this run.
    pub fn was_executed(&self, query: &str) -> bool {
        let key = normalize_query(query);
        self.executed_queries.iter().any(|q| normalize_query(q) == key)
    }

    /// The best report available right now.
    pub fn report(&self) -> Option<&str> {
        self.final_report
            .as_deref()
            .or(self.draft.as_deref())
            .or(self.clarification.as_deref())
    }

    /// Merges a node's partial update: scalars overwrite, lists append.
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            route,
            route_confidence,
            mode,
            status,
            cancel_reason,
            clarification,
            plan,
            executed_queries,
            hits,
            evidence,
            citations,
            draft,
            final_report,
            evaluation,
            revision_count,
            tool_calls,
            errors,
            timings,
        } = update;

        if let Some(route) = route {
            self.route = Some(route);
        }
        if let Some(confidence) = route_confidence {
            self.route_confidence = confidence;
        }
        if let Some(mode) = mode {
            self.mode = mode;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if cancel_reason.is_some() {
            self.cancel_reason = cancel_reason;
        }
        if clarification.is_some() {
            self.clarification = clarification;
        }
        if let Some(plan) = plan {
            self.plan = plan;
        }
        if let Some(evidence) = evidence {
            self.evidence = evidence;
        }
        if let Some(citations) = citations {
            self.citations = citations;
        }
        if draft.is_some() {
            self.draft = draft;
        }
        if final_report.is_some() {
            self.final_report = final_report;
        }
        if evaluation.is_some() {
            self.evaluation = evaluation;
        }
        if let Some(count) = revision_count {
            self.revision_count = count;
        }
        if let Some(calls) = tool_calls {
            self.tool_calls = calls;
        }

        self.executed_queries.extend(executed_queries);
        self.hits.extend(hits);
        self.errors.extend(errors);
        self.timings.extend(timings);
        self.updated_at = Utc::now();
    }
}

/// Partial update returned by a node.
///
/// `None` leaves a scalar untouched; list fields are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub route: Option<Route>,
    pub route_confidence: Option<f64>,
    pub mode: Option<RunMode>,
    pub status: Option<RunStatus>,
    pub cancel_reason: Option<String>,
    pub clarification: Option<String>,
    pub plan: Option<Vec<String>>,
    pub executed_queries: Vec<String>,
    pub hits: Vec<SearchResult>,
    pub evidence: Option<EvidenceSummary>,
    pub citations: Option<Vec<Citation>>,
    pub draft: Option<String>,
    pub final_report: Option<String>,
    pub evaluation: Option<Evaluation>,
    pub revision_count: Option<u32>,
    pub tool_calls: Option<u32>,
    pub errors: Vec<RunError>,
    pub timings: Vec<PhaseTiming>,
}

impl StateUpdate {
    /// Terminal cancelled update carrying `reason`.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Cancelled),
            cancel_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Marks this update as the run's terminal cancellation, keeping
    /// whatever partial results it already carries.
    pub fn mark_cancelled(&mut self, reason: impl Into<String>) {
        self.status = Some(RunStatus::Cancelled);
        self.cancel_reason = Some(reason.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Some(RunStatus::Cancelled)
    }

    /// Concatenates the list fields of `other` onto `self`, in order.
    pub fn merge_lists(&mut self, other: StateUpdate) {
        self.executed_queries.extend(other.executed_queries);
        self.hits.extend(other.hits);
        self.errors.extend(other.errors);
        self.timings.extend(other.timings);
    }

    /// The update that turns `before` into `after`.
    ///
    /// Used by sub-pipelines that run several steps on a private copy.
    pub fn between(before: &WorkflowState, after: WorkflowState) -> Self {
        fn tail<T>(items: Vec<T>, skip: usize) -> Vec<T> {
            items.into_iter().skip(skip).collect()
        }

        Self {
            route: after.route,
            route_confidence: Some(after.route_confidence),
            mode: Some(after.mode),
            status: Some(after.status),
            cancel_reason: after.cancel_reason,
            clarification: after.clarification,
            plan: Some(after.plan),
            executed_queries: tail(after.executed_queries, before.executed_queries.len()),
            hits: tail(after.hits, before.hits.len()),
            evidence: Some(after.evidence),
            citations: Some(after.citations),
            draft: after.draft,
            final_report: after.final_report,
            evaluation: after.evaluation,
            revision_count: Some(after.revision_count),
            tool_calls: Some(after.tool_calls),
            errors: tail(after.errors, before.errors.len()),
            timings: tail(after.timings, before.timings.len()),
        }
    }
}

/// Case- and whitespace-insensitive query key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized exact-match dedup, first occurrence wins, empties dropped.
pub fn dedup_queries(queries: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    queries
        .into_iter()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty() && seen.insert(normalize_query(q)))
        .collect()
}
