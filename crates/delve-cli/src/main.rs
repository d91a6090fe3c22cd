use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use delve_core::config::Config;
use delve_core::search::SearchStrategy;
use delve_core::storage::{CheckpointStore, FileCheckpointStore};
use delve_core::workflow::{
    CancelHandle, ResearchServices, ReviewDecision, RunOutcome, WorkflowEngine, WorkflowEvent,
    WorkflowState,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Deep research from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./delve.toml, then ~/.config/delve/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print the report
    Run {
        #[arg(required = true)]
        question: Vec<String>,

        /// Search strategy: fallback, parallel, round-robin or best-first
        #[arg(long)]
        strategy: Option<SearchStrategy>,

        /// Maximum number of revision cycles
        #[arg(long)]
        max_revisions: Option<u32>,

        /// Restrict searches to these providers, in order (repeatable)
        #[arg(long = "provider")]
        providers: Vec<String>,

        /// Stop for review before finalizing the report
        #[arg(long)]
        review: bool,

        /// Files whose contents are attached to the question
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// Finish a run that is awaiting review
    Resume {
        run_id: String,

        /// Replace the report with the contents of this file
        #[arg(long)]
        edit: Option<PathBuf>,
    },
    /// Print the report and status of a stored run
    Show {
        run_id: String,

        /// Print the whole checkpoint as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored runs
    List,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => Config::load().wrap_err("loading config")?,
    };

    match cli.command {
        Commands::Run {
            question,
            strategy,
            max_revisions,
            providers,
            review,
            attachments,
        } => {
            if let Some(strategy) = strategy {
                config.search.strategy = strategy;
            }
            if let Some(max) = max_revisions {
                config.workflow.max_revisions = max;
            }
            if !providers.is_empty() {
                config.search.profile = providers;
                config.search.route_profiles.clear();
            }
            if review {
                config.workflow.review_enabled = true;
            }
            config.validate()?;
            run(config, question.join(" "), attachments).await
        }
        Commands::Resume { run_id, edit } => {
            let decision = match edit {
                Some(path) => ReviewDecision::Edit(
                    std::fs::read_to_string(&path)
                        .wrap_err_with(|| format!("reading {}", path.display()))?,
                ),
                None => ReviewDecision::Approve,
            };
            resume(config, &run_id, decision).await
        }
        Commands::Show { run_id, json } => show(&config, &run_id, json),
        Commands::List => list(&config),
        Commands::Config => {
            print!("{}", config.to_toml_string());
            Ok(())
        }
    }
}

/// Logs go to stderr so the report on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("DELVE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn store_for(config: &Config) -> Arc<dyn CheckpointStore> {
    Arc::new(FileCheckpointStore::with_config(config.storage.clone()))
}

async fn run(config: Config, question: String, attachments: Vec<PathBuf>) -> Result<()> {
    let services = Arc::new(ResearchServices::from_config(&config)?);
    let (sender, receiver) = mpsc::unbounded_channel();
    let engine = WorkflowEngine::new(services)
        .with_store(store_for(&config))
        .with_events(sender);

    let mut state = engine.new_state(&question);
    if !attachments.is_empty() {
        let mut texts = Vec::with_capacity(attachments.len());
        for path in &attachments {
            texts.push(
                std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading attachment {}", path.display()))?,
            );
        }
        state = state.with_attachments(texts);
    }

    let cancel = CancelHandle::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel("interrupted by user");
        }
    });

    let progress = tokio::spawn(render_progress(receiver));
    let outcome = engine.run_with(state, &cancel).await;
    // Dropping the engine closes the event channel and ends the spinner
    drop(engine);
    let _ = progress.await;

    print_outcome(outcome?)
}

async fn resume(config: Config, run_id: &str, decision: ReviewDecision) -> Result<()> {
    let services = Arc::new(ResearchServices::from_config(&config)?);
    let engine = WorkflowEngine::new(services).with_store(store_for(&config));
    print_outcome(engine.resume(run_id, decision).await?)
}

fn show(config: &Config, run_id: &str, json: bool) -> Result<()> {
    let checkpoint = store_for(config).load(run_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }
    print_summary(&checkpoint.state);
    println!("{}", checkpoint.state.report().unwrap_or("(no report)"));
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let store = store_for(config);
    let current = store.current_run_id()?;
    let runs = store.list()?;
    if runs.is_empty() {
        println!("No runs yet. Use 'delve run <question>' to start one.");
        return Ok(());
    }
    for run in runs {
        let marker = if current.as_deref() == Some(run.run_id.as_str()) { "*" } else { " " };
        println!(
            "{marker} {}  {:<15}  {}  {}",
            run.run_id,
            run.status.to_string(),
            run.updated_at.format("%Y-%m-%d %H:%M"),
            run.input
        );
    }
    Ok(())
}

fn print_outcome(outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed(state) => {
            print_summary(&state);
            println!("{}", state.report().unwrap_or_default());
            Ok(())
        }
        RunOutcome::Suspended(checkpoint) => {
            let id = checkpoint.run_id().to_string();
            println!("{}", checkpoint.state.report().unwrap_or_default());
            eprintln!("\nRun {id} is awaiting review.");
            eprintln!("  approve: delve resume {id}");
            eprintln!("  edit:    delve resume {id} --edit <file>");
            Ok(())
        }
        RunOutcome::Cancelled(state) => {
            if let Some(partial) = state.report() {
                println!("{partial}");
            }
            Err(eyre!(
                "run {} cancelled: {}",
                state.run_id,
                state.cancel_reason.as_deref().unwrap_or("unknown reason")
            ))
        }
    }
}

fn print_summary(state: &WorkflowState) {
    let route = state.route.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
    eprintln!(
        "run {}  route {}  status {}  revisions {}  queries {}  sources {}  errors {}",
        state.run_id,
        route,
        state.status,
        state.revision_count,
        state.executed_queries.len(),
        state.citations.len(),
        state.errors.len()
    );
    if let Some(evaluation) = &state.evaluation {
        eprintln!(
            "verdict {}  coverage {:.2}  accuracy {:.2}  citations {:.2}",
            evaluation.verdict,
            evaluation.scores.coverage,
            evaluation.scores.accuracy,
            evaluation.scores.citation_coverage
        );
    }
    eprintln!();
}

async fn render_progress(mut events: UnboundedReceiver<WorkflowEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = events.recv().await {
        match event {
            WorkflowEvent::NodeStarted { node, .. } => spinner.set_message(node.to_string()),
            WorkflowEvent::ToolCall { query, .. } => {
                spinner.set_message(format!("searching: {query}"))
            }
            WorkflowEvent::SearchCompleted { query, hits, .. } => {
                spinner.println(format!("  {hits:>3} hits  {query}"))
            }
            WorkflowEvent::VerdictProduced { verdict, scores, .. } => spinner.println(format!(
                "  verdict {verdict}  coverage {:.2}  citations {:.2}",
                scores.coverage, scores.citation_coverage
            )),
            WorkflowEvent::Error { error, .. } => {
                spinner.println(format!("  ! {}: {}", error.node, error.message))
            }
            WorkflowEvent::CancellationObserved { reason, .. } => {
                spinner.println(format!("  cancelled: {reason}"))
            }
            WorkflowEvent::NodeFinished { .. }
            | WorkflowEvent::Suspended { .. }
            | WorkflowEvent::Completed { .. } => {}
        }
    }
    spinner.finish_and_clear();
}
