//! Node identities and the transition functions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{Route, RunStatus, Verdict, WorkflowState};
use crate::config::WorkflowConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Router,
    Clarify,
    DirectAnswer,
    ToolAgent,
    Planner,
    WebPlan,
    RefinePlan,
    ParallelSearch,
    Writer,
    Evaluator,
    Reviser,
    HumanReview,
    DeepResearch,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Router => "router",
            NodeId::Clarify => "clarify",
            NodeId::DirectAnswer => "direct_answer",
            NodeId::ToolAgent => "tool_agent",
            NodeId::Planner => "planner",
            NodeId::WebPlan => "web_plan",
            NodeId::RefinePlan => "refine_plan",
            NodeId::ParallelSearch => "parallel_search",
            NodeId::Writer => "writer",
            NodeId::Evaluator => "evaluator",
            NodeId::Reviser => "reviser",
            NodeId::HumanReview => "human_review",
            NodeId::DeepResearch => "deep_research",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine does after a node finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(NodeId),
    /// Persist and wait for a review decision.
    Suspend,
    /// The run is over.
    Done,
}

/// Routing label for the run; unset means `clarify`.
pub fn route_decision(state: &WorkflowState) -> Route {
    state.route.unwrap_or(Route::Clarify)
}

pub fn after_clarify(state: &WorkflowState) -> NodeId {
    if state.clarification.is_some() {
        NodeId::HumanReview
    } else {
        NodeId::Planner
    }
}

pub fn after_writer(state: &WorkflowState) -> NodeId {
    if state.mode.is_quality_gated() {
        NodeId::Evaluator
    } else {
        NodeId::HumanReview
    }
}

/// The revision gate.
///
/// The budget check comes first, so a run reaches `human_review` within
/// `max_revisions + 1` evaluations whatever the verdicts are.
pub fn after_evaluator(state: &WorkflowState, coverage_floor: f64) -> NodeId {
    if state.revision_count >= state.max_revisions {
        return NodeId::HumanReview;
    }
    let Some(evaluation) = &state.evaluation else {
        return NodeId::HumanReview;
    };
    match evaluation.verdict {
        Verdict::Incomplete => NodeId::RefinePlan,
        Verdict::Pass => NodeId::HumanReview,
        Verdict::Revise => {
            let thin = evaluation.scores.coverage < coverage_floor;
            if thin || !evaluation.missing_topics.is_empty() {
                NodeId::RefinePlan
            } else {
                NodeId::Reviser
            }
        }
    }
}

/// Full transition table.
pub fn next_node(node: NodeId, state: &WorkflowState, config: &WorkflowConfig) -> Transition {
    use NodeId::*;

    let next = match node {
        Router => match route_decision(state) {
            Route::Deep if config.deep_subpipeline => DeepResearch,
            Route::Deep => Planner,
            Route::Agent => ToolAgent,
            Route::Web => WebPlan,
            Route::Direct => DirectAnswer,
            Route::Clarify => Clarify,
        },
        Clarify => after_clarify(state),
        DirectAnswer | DeepResearch => HumanReview,
        Planner | WebPlan | RefinePlan => ParallelSearch,
        ToolAgent | ParallelSearch => Writer,
        Writer => after_writer(state),
        Evaluator => after_evaluator(state, config.coverage_floor),
        Reviser => Evaluator,
        HumanReview => {
            return if state.status == RunStatus::AwaitingReview {
                Transition::Suspend
            } else {
                Transition::Done
            };
        }
    };
    Transition::Next(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{DimensionScores, Evaluation, RunMode};

    fn state_with(verdict: Verdict, coverage: f64, missing: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::new("q", &WorkflowConfig::default());
        state.evaluation = Some(Evaluation {
            verdict,
            scores: DimensionScores {
                coverage,
                ..DimensionScores::uniform(0.9)
            },
            missing_topics: missing.iter().map(|s| s.to_string()).collect(),
            follow_up_queries: vec![],
            critique: String::new(),
        });
        state
    }

    #[test]
    fn test_unset_route_means_clarify() {
        let state = WorkflowState::new("q", &WorkflowConfig::default());
        assert_eq!(route_decision(&state), Route::Clarify);
        assert_eq!(
            next_node(NodeId::Router, &state, &WorkflowConfig::default()),
            Transition::Next(NodeId::Clarify)
        );
    }

    #[test]
    fn test_deep_route_target_follows_config() {
        let mut state = WorkflowState::new("q", &WorkflowConfig::default());
        state.route = Some(Route::Deep);
        let mut config = WorkflowConfig::default();
        assert_eq!(next_node(NodeId::Router, &state, &config), Transition::Next(NodeId::Planner));
        config.deep_subpipeline = true;
        assert_eq!(
            next_node(NodeId::Router, &state, &config),
            Transition::Next(NodeId::DeepResearch)
        );
    }

    #[test]
    fn test_gate_priority_order() {
        let mut exhausted = state_with(Verdict::Incomplete, 0.1, &["x"]);
        exhausted.revision_count = exhausted.max_revisions;
        assert_eq!(after_evaluator(&exhausted, 0.6), NodeId::HumanReview);

        let cases: [(Verdict, f64, &[&str], NodeId); 5] = [
            (Verdict::Incomplete, 0.9, &[], NodeId::RefinePlan),
            (Verdict::Pass, 0.1, &["x"], NodeId::HumanReview),
            (Verdict::Revise, 0.5, &[], NodeId::RefinePlan),
            (Verdict::Revise, 0.9, &["gap"], NodeId::RefinePlan),
            (Verdict::Revise, 0.9, &[], NodeId::Reviser),
        ];
        for (verdict, coverage, missing, expected) in cases {
            let state = state_with(verdict, coverage, missing);
            assert_eq!(after_evaluator(&state, 0.6), expected, "{verdict:?} {coverage}");
        }
    }

    #[test]
    fn test_after_writer_depends_on_mode() {
        let mut state = WorkflowState::new("q", &WorkflowConfig::default());
        state.mode = RunMode::Web;
        assert_eq!(after_writer(&state), NodeId::HumanReview);
        state.mode = RunMode::Agentic;
        assert_eq!(after_writer(&state), NodeId::Evaluator);
    }

    #[test]
    fn test_human_review_suspends_only_when_awaiting() {
        let config = WorkflowConfig::default();
        let mut state = WorkflowState::new("q", &config);
        state.status = RunStatus::AwaitingReview;
        assert_eq!(next_node(NodeId::HumanReview, &state, &config), Transition::Suspend);
        state.status = RunStatus::Completed;
        assert_eq!(next_node(NodeId::HumanReview, &state, &config), Transition::Done);
    }
}
