//! Deep research orchestration.
//!
//! A question goes through a routed workflow: plan queries, fan them out to
//! search providers behind retries and circuit breakers, aggregate the
//! evidence, draft a cited report and revise it until an evaluator passes
//! it or the revision budget runs out.

pub mod aggregate;
pub mod config;
pub mod llm;
pub mod search;
pub mod storage;
pub mod workflow;

pub use aggregate::{AggregatedResultSet, ResultAggregator};
pub use config::Config;
pub use search::{QueryCache, SearchOrchestrator, SearchProvider, SearchResult, SearchStrategy};
pub use storage::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use workflow::{
    CancelHandle, Checkpoint, ResearchServices, ReviewDecision, RunOutcome, WorkflowEngine,
    WorkflowError, WorkflowEvent, WorkflowState,
};
