mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    evaluator_reply, planner_reply, router_reply, services, services_with_provider_timeout,
    FakeProvider, Role, ScriptedLlm, Step, CITED_REPORT, UNCITED_REPORT,
};
use delve_core::config::{Config, ExecutionMode};
use delve_core::search::SearchProvider;
use delve_core::storage::{CheckpointStore, MemoryCheckpointStore};
use delve_core::workflow::{
    CancelHandle, Checkpoint, ErrorKind, NodeId, ReviewDecision, Route, RunOutcome, RunStatus,
    Verdict, WorkflowEngine, WorkflowError, WorkflowEvent, WorkflowState,
};

const QUESTION: &str = "AI chip market 2024";

fn trace(state: &WorkflowState) -> Vec<NodeId> {
    state.timings.iter().map(|t| t.node).collect()
}

fn engine(
    llm: &Arc<ScriptedLlm>,
    providers: Vec<Arc<dyn SearchProvider>>,
    config: &Config,
) -> WorkflowEngine {
    WorkflowEngine::new(services(llm.clone(), providers, config))
}

fn deep_llm() -> ScriptedLlm {
    ScriptedLlm::new()
        .on(Role::Router, router_reply("deep", 0.9))
        .on(Role::Planner, planner_reply(&["ai chip market size 2024", "ai accelerator vendors"]))
        .on(Role::Writer, CITED_REPORT)
}

fn completed(outcome: RunOutcome) -> WorkflowState {
    match outcome {
        RunOutcome::Completed(state) => state,
        other => panic!("expected a completed run, got {:?}", other.state().status),
    }
}

#[tokio::test]
async fn test_deep_run_produces_cited_report() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let provider = FakeProvider::answering("p1", 3);
    let config = Config::default();

    let engine = engine(&llm, vec![provider.clone()], &config);
    let state = completed(engine.run(QUESTION).await.unwrap());

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.route, Some(Route::Deep));
    assert_eq!(state.final_report.as_deref(), Some(CITED_REPORT));
    assert_eq!(state.executed_queries.len(), 2);
    assert!(!state.citations.is_empty());
    assert!(state.errors.is_empty());
    assert_eq!(state.evaluation.as_ref().map(|e| e.verdict), Some(Verdict::Pass));
    assert_eq!(
        trace(&state),
        vec![
            NodeId::Router,
            NodeId::Planner,
            NodeId::ParallelSearch,
            NodeId::Writer,
            NodeId::Evaluator,
            NodeId::HumanReview,
        ]
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_revision_budget_forces_stop() {
    let llm = Arc::new(
        deep_llm()
            .on(Role::Evaluator, evaluator_reply("revise", 0.9, &[], &[]))
            .on(Role::Reviser, CITED_REPORT),
    );
    let mut config = Config::default();
    config.workflow.max_revisions = 2;

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    let nodes = trace(&state);
    let writer = nodes.iter().position(|n| *n == NodeId::Writer).unwrap();
    assert_eq!(
        nodes[writer..],
        [
            NodeId::Writer,
            NodeId::Evaluator,
            NodeId::Reviser,
            NodeId::Evaluator,
            NodeId::Reviser,
            NodeId::Evaluator,
            NodeId::HumanReview,
        ]
    );
    assert_eq!(state.revision_count, 2);
    assert_eq!(llm.calls(Role::Reviser), 2);
    assert_eq!(llm.calls(Role::Evaluator), 3);
    assert_eq!(state.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_revision_loop_terminates_for_any_budget() {
    for max_revisions in 0..4 {
        let llm = Arc::new(
            deep_llm()
                .on(Role::Evaluator, evaluator_reply("incomplete", 0.2, &["gaps"], &[]))
                .on(Role::Refine, planner_reply(&["more"]))
                .on(Role::Reviser, CITED_REPORT),
        );
        let mut config = Config::default();
        config.workflow.max_revisions = max_revisions;

        let state = completed(
            engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
                .run(QUESTION)
                .await
                .unwrap(),
        );

        assert!(llm.calls(Role::Evaluator) <= max_revisions as usize + 1);
        assert_eq!(state.revision_count, max_revisions);
    }
}

#[tokio::test]
async fn test_citation_gate_blocks_uncited_pass() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("deep", 0.9))
            .on(Role::Planner, planner_reply(&["ai chip market size 2024"]))
            .on(Role::Writer, UNCITED_REPORT)
            .on(Role::Evaluator, evaluator_reply("pass", 0.95, &[], &[]))
            .on(Role::Reviser, CITED_REPORT),
    );
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    // First verdict was downgraded, so one revision happened
    assert_eq!(llm.calls(Role::Reviser), 1);
    assert_eq!(state.revision_count, 1);
    assert_eq!(state.final_report.as_deref(), Some(CITED_REPORT));
    let evaluation = state.evaluation.unwrap();
    assert_eq!(evaluation.verdict, Verdict::Pass);
    assert_eq!(evaluation.scores.citation_coverage, 1.0);
}

#[tokio::test]
async fn test_incomplete_verdict_searches_follow_ups() {
    let llm = Arc::new(
        deep_llm()
            .on(
                Role::Evaluator,
                evaluator_reply("incomplete", 0.4, &["pricing"], &["ai chip pricing 2024"]),
            )
            .on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[]))
            .on(Role::Refine, planner_reply(&["ai chip pricing 2024", "ai chip market size 2024"])),
    );
    let provider = FakeProvider::answering("p1", 2);
    let config = Config::default();

    let engine = engine(&llm, vec![provider.clone()], &config);
    let state = completed(engine.run(QUESTION).await.unwrap());

    assert_eq!(state.revision_count, 1);
    assert!(state.executed_queries.iter().any(|q| q == "ai chip pricing 2024"));
    // Already-run queries are not searched again
    let repeats = provider
        .queries()
        .iter()
        .filter(|q| q.as_str() == "ai chip market size 2024")
        .count();
    assert_eq!(repeats, 1);
    assert!(trace(&state).contains(&NodeId::RefinePlan));
}

#[tokio::test]
async fn test_model_outage_still_completes() {
    let llm = Arc::new(ScriptedLlm::new());
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 3)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.route, Some(Route::Deep));
    assert_eq!(state.executed_queries, vec![QUESTION.to_string()]);
    let report = state.final_report.unwrap();
    assert!(report.contains("## Key findings"));
    assert!(report.contains("[1]"));

    let failed: Vec<NodeId> = state
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::LanguageModel)
        .map(|e| e.node)
        .collect();
    assert_eq!(failed, vec![NodeId::Router, NodeId::Planner, NodeId::Writer, NodeId::Evaluator]);
}

#[tokio::test]
async fn test_low_confidence_asks_for_clarification() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("deep", 0.1))
            .on(
                Role::Clarify,
                r#"{"needs_clarification": true, "question": "Which region do you mean?"}"#,
            ),
    );
    let provider = FakeProvider::answering("p1", 2);
    let config = Config::default();

    let engine = engine(&llm, vec![provider.clone()], &config);
    let state = completed(engine.run("chips").await.unwrap());

    assert_eq!(state.route, Some(Route::Clarify));
    assert_eq!(state.final_report.as_deref(), Some("Which region do you mean?"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_clarify_can_continue_as_research() {
    let llm = Arc::new(
        deep_llm()
            .on(Role::Router, router_reply("clarify", 0.9))
            .on(Role::Clarify, r#"{"needs_clarification": false}"#)
            .on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])),
    );
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(trace(&state)[..3], [NodeId::Router, NodeId::Clarify, NodeId::Planner]);
    assert_eq!(state.final_report.as_deref(), Some(CITED_REPORT));
}

#[tokio::test]
async fn test_direct_route_skips_search() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("direct", 0.9))
            .on(Role::Direct, "A transistor is a semiconductor switch."),
    );
    let provider = FakeProvider::answering("p1", 2);
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![provider.clone()], &config)
            .run("What is a transistor?")
            .await
            .unwrap(),
    );

    assert_eq!(state.final_report.as_deref(), Some("A transistor is a semiconductor switch."));
    assert_eq!(provider.calls(), 0);
    assert!(state.evaluation.is_none());
}

#[tokio::test]
async fn test_web_route_is_not_quality_gated() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("web", 0.9))
            .on(Role::Planner, planner_reply(&["a", "b", "c"]))
            .on(Role::Writer, CITED_REPORT),
    );
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(state.executed_queries.len(), config.workflow.web_max_queries);
    assert_eq!(llm.calls(Role::Evaluator), 0);
    assert_eq!(
        trace(&state),
        vec![
            NodeId::Router,
            NodeId::WebPlan,
            NodeId::ParallelSearch,
            NodeId::Writer,
            NodeId::HumanReview,
        ]
    );
}

#[tokio::test]
async fn test_agent_respects_tool_budget() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("agent", 0.9))
            .on(Role::ToolAgent, r#"{"action": "search", "query": "first"}"#)
            .on(Role::ToolAgent, r#"{"action": "search", "query": "second"}"#)
            .on(Role::ToolAgent, r#"{"action": "search", "query": "third"}"#)
            .on(Role::Writer, CITED_REPORT)
            .on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])),
    );
    let mut config = Config::default();
    config.workflow.max_tool_calls = 2;

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(state.tool_calls, 2);
    assert_eq!(state.executed_queries, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(llm.calls(Role::Evaluator), 1);
}

#[tokio::test]
async fn test_empty_searches_are_recorded() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let config = Config::default();

    let state = completed(
        engine(&llm, vec![FakeProvider::new("p1", vec![Step::Empty])], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    let search_errors = state
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Search && e.node == NodeId::ParallelSearch)
        .count();
    assert_eq!(search_errors, 2);
    assert!(state.hits.is_empty());
    assert_eq!(state.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_review_suspends_and_resumes() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let mut config = Config::default();
    config.workflow.review_enabled = true;
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine =
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config).with_store(store.clone());

    let checkpoint = match engine.run(QUESTION).await.unwrap() {
        RunOutcome::Suspended(checkpoint) => checkpoint,
        other => panic!("expected suspension, got {:?}", other.state().status),
    };
    assert_eq!(checkpoint.next, Some(NodeId::HumanReview));
    assert_eq!(checkpoint.state.draft.as_deref(), Some(CITED_REPORT));

    let run_id = checkpoint.run_id().to_string();
    assert_eq!(store.current_run_id().unwrap().as_deref(), Some(run_id.as_str()));
    assert_eq!(store.load(&run_id).unwrap().state.status, RunStatus::AwaitingReview);

    let state = completed(
        engine
            .resume(&run_id, ReviewDecision::Edit("edited report".into()))
            .await
            .unwrap(),
    );
    assert_eq!(state.final_report.as_deref(), Some("edited report"));
    assert_eq!(store.load(&run_id).unwrap().state.status, RunStatus::Completed);

    let again = engine.resume(&run_id, ReviewDecision::Approve).await;
    assert!(matches!(again, Err(WorkflowError::NotSuspended { .. })));
}

#[tokio::test]
async fn test_resume_without_store_fails() {
    let llm = Arc::new(ScriptedLlm::new());
    let engine = engine(&llm, vec![], &Config::default());
    let result = engine.resume("some-run", ReviewDecision::Approve).await;
    assert!(matches!(result, Err(WorkflowError::NoStore)));
}

#[tokio::test]
async fn test_storeless_suspension_resumes_from_checkpoint() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let mut config = Config::default();
    config.workflow.review_enabled = true;
    let engine = engine(&llm, vec![FakeProvider::answering("p1", 2)], &config);

    let checkpoint = match engine.run(QUESTION).await.unwrap() {
        RunOutcome::Suspended(checkpoint) => checkpoint,
        other => panic!("expected suspension, got {:?}", other.state().status),
    };
    let run_id = checkpoint.run_id().to_string();
    let by_id = engine.resume(&run_id, ReviewDecision::Approve).await;
    assert!(matches!(by_id, Err(WorkflowError::NoStore)));

    let state = completed(
        engine
            .resume_checkpoint(checkpoint, ReviewDecision::Approve)
            .await
            .unwrap(),
    );
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.final_report.as_deref(), Some(CITED_REPORT));

    let finished = Checkpoint::new(state, None);
    let again = engine.resume_checkpoint(finished, ReviewDecision::Approve).await;
    assert!(matches!(again, Err(WorkflowError::NotSuspended { .. })));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let llm = Arc::new(deep_llm());
    let engine = engine(&llm, vec![FakeProvider::answering("p1", 2)], &Config::default());
    let cancel = CancelHandle::new();
    cancel.cancel("stop");

    let outcome = engine.run_with(engine.new_state(QUESTION), &cancel).await.unwrap();

    let RunOutcome::Cancelled(state) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(state.cancel_reason.as_deref(), Some("stop"));
    assert!(llm.sequence().is_empty());
}

#[tokio::test]
async fn test_cancellation_interrupts_search() {
    let llm = Arc::new(deep_llm());
    let slow = FakeProvider::new("slow", vec![Step::Hang]);
    let engine = engine(&llm, vec![slow], &Config::default());
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel("user abort");
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run_with(engine.new_state(QUESTION), &cancel),
    )
    .await
    .expect("cancellation should end the run promptly")
    .unwrap();

    let RunOutcome::Cancelled(state) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(state.cancel_reason.as_deref(), Some("user abort"));
    assert!(state.final_report.is_none());
    assert_eq!(llm.calls(Role::Writer), 0);
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let engine = engine(&llm, vec![FakeProvider::answering("p1", 2)], &Config::default())
        .with_events(sender);

    let state = completed(engine.run(QUESTION).await.unwrap());
    drop(engine);

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }

    assert!(matches!(
        events.first(),
        Some(WorkflowEvent::NodeStarted { node: NodeId::Router, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::Completed { run_id }) if *run_id == state.run_id
    ));
    let searches = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::SearchCompleted { .. }))
        .count();
    assert_eq!(searches, 2);
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::VerdictProduced { verdict: Verdict::Pass, .. })));
}

#[tokio::test]
async fn test_deep_subpipeline_runs_as_one_node() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let mut config = Config::default();
    config.workflow.deep_subpipeline = true;

    let state = completed(
        engine(&llm, vec![FakeProvider::answering("p1", 2)], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(
        trace(&state),
        vec![
            NodeId::Router,
            NodeId::Planner,
            NodeId::ParallelSearch,
            NodeId::Writer,
            NodeId::Evaluator,
            NodeId::DeepResearch,
            NodeId::HumanReview,
        ]
    );
    assert_eq!(state.final_report.as_deref(), Some(CITED_REPORT));
    assert_eq!(state.executed_queries.len(), 2);
}

#[tokio::test]
async fn test_sequential_fan_out_waits_without_timing_out() {
    let queries: Vec<String> = (0..10).map(|i| format!("chip topic {i}")).collect();
    let queries: Vec<&str> = queries.iter().map(String::as_str).collect();
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("deep", 0.9))
            .on(Role::Planner, planner_reply(&queries))
            .on(Role::Writer, CITED_REPORT)
            .on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])),
    );
    let mut config = Config::default();
    config.workflow.max_queries = 10;
    config.workflow.execution = ExecutionMode::Sequential;
    config.workflow.search_task_timeout_secs = 1;
    // Ten queries in a row take longer than one task's timeout
    let provider = FakeProvider::slow("p1", 2, Duration::from_millis(150));

    let state = completed(
        engine(&llm, vec![provider.clone()], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert!(state.errors.iter().all(|e| e.kind != ErrorKind::Timeout));
    assert_eq!(state.executed_queries.len(), 10);
    assert_eq!(state.hits.len(), 20);
    assert_eq!(provider.calls(), 10);
}

#[tokio::test]
async fn test_timed_out_queries_are_not_marked_executed() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let mut config = Config::default();
    config.workflow.search_task_timeout_secs = 1;
    let provider = FakeProvider::slow("p1", 2, Duration::from_millis(1_500));
    let services = services_with_provider_timeout(
        llm.clone(),
        vec![provider],
        &config,
        Duration::from_secs(5),
    );

    let state = completed(WorkflowEngine::new(services).run(QUESTION).await.unwrap());

    let timeouts = state
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Timeout && e.node == NodeId::ParallelSearch)
        .count();
    assert_eq!(timeouts, 2);
    assert!(state.executed_queries.is_empty());
    assert!(state.hits.is_empty());
}

#[tokio::test]
async fn test_search_profile_restricts_workflow_searches() {
    let llm = Arc::new(deep_llm().on(Role::Evaluator, evaluator_reply("pass", 0.9, &[], &[])));
    let mut config = Config::default();
    config.search.profile = vec!["p2".to_string()];
    let p1 = FakeProvider::answering("p1", 2);
    let p2 = FakeProvider::answering("p2", 2);

    let state = completed(
        engine(&llm, vec![p1.clone(), p2.clone()], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(p1.calls(), 0);
    assert_eq!(p2.calls(), 2);
    assert!(!state.hits.is_empty());
    assert!(state.hits.iter().all(|h| h.provider == "p2"));
}

#[tokio::test]
async fn test_route_profile_replaces_default_profile() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on(Role::Router, router_reply("web", 0.9))
            .on(Role::Planner, planner_reply(&["gpu prices"]))
            .on(Role::Writer, CITED_REPORT),
    );
    let mut config = Config::default();
    config.search.profile = vec!["p2".to_string()];
    config
        .search
        .route_profiles
        .insert("web".to_string(), vec!["p1".to_string()]);
    let p1 = FakeProvider::answering("p1", 2);
    let p2 = FakeProvider::answering("p2", 2);

    completed(
        engine(&llm, vec![p1.clone(), p2.clone()], &config)
            .run(QUESTION)
            .await
            .unwrap(),
    );

    assert_eq!(p1.calls(), 1);
    assert_eq!(p2.calls(), 0);
}
