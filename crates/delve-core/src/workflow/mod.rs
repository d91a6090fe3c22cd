//! The research workflow: state, transitions, nodes and the engine.
//!
//! ```text
//! router        → direct_answer | clarify | web_plan | tool_agent | planner | deep_research
//! clarify       → human_review (asked a question) | planner
//! planner, web_plan, refine_plan → parallel_search → writer
//! tool_agent    → writer
//! writer        → evaluator (deep, agentic) | human_review
//! evaluator     → human_review | reviser | refine_plan
//! reviser       → evaluator
//! direct_answer, deep_research → human_review
//! ```

mod checkpoint;
pub mod citations;
mod context;
mod engine;
mod error;
mod events;
pub mod node;
mod nodes;
pub mod prompts;
mod services;
mod state;

pub use checkpoint::{Checkpoint, ReviewDecision};
pub use context::CancelHandle;
pub use engine::{RunOutcome, WorkflowEngine};
pub use error::WorkflowError;
pub use events::{EventSink, WorkflowEvent};
pub use node::{next_node, NodeId, Transition};
pub use services::ResearchServices;
pub use state::{
    dedup_queries, normalize_query, DimensionScores, ErrorKind, Evaluation, EvidenceSummary,
    PhaseTiming, Route, RunError, RunMode, RunStatus, StateUpdate, Verdict, WorkflowState,
};
