use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use solver_race::blob::{BlobStore, LocalBlobStore};
use solver_race::config::{BlockConfig, EvalConfig, ExecutorConfig, SelectionConfig};
use solver_race::eval::{EvalPlan, EvalProgress, FanOutEvaluator, ValidationSummary};
use solver_race::executor::{ExecutorClient, HttpExecutor};
use solver_race::selection::{BlockRound, PoolReport};
use solver_race::shutdown::cancel_on_signal;

#[derive(Parser, Debug)]
#[command(name = "solver-race")]
#[command(version)]
#[command(about = "Run solver jobs on a remote executor and pick the winners")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Evaluate one task solver over a set of problems
    Eval(EvalArgs),

    /// Race all solvers on a block and submit the best pair
    Mine(MineArgs),
}

// =============================================================================
// Shared Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ExecutorArgs {
    /// Executor endpoint jobs are POSTed to
    #[arg(long, default_value = "http://127.0.0.1:8080/exec")]
    endpoint: String,

    /// Executor API key
    #[arg(long, env = "TASKLET_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Seconds to wait before retrying a job the executor had no capacity for
    #[arg(long, default_value = "5")]
    retry_backoff_secs: u64,
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Local directory holding the blob store
    #[arg(long, default_value = ".")]
    store_root: PathBuf,

    /// URI the executor uses for the store root (e.g. gs://bucket)
    #[arg(long)]
    store_uri: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Command Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct EvalArgs {
    #[command(flatten)]
    executor: ExecutorArgs,

    #[command(flatten)]
    store: StoreArgs,

    /// Task solver package name
    #[arg(long)]
    solver: String,

    /// Comma-separated booster purchases (use "" for none)
    #[arg(long)]
    purchase: String,

    /// Maximum number of jobs in flight
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..))]
    limit: u32,

    /// Solver time limit in seconds
    #[arg(long)]
    timeout: u64,

    /// Milliseconds between two job submissions
    #[arg(long, default_value = "200")]
    pacing_ms: u64,

    /// Problem names
    #[arg(required = true)]
    problems: Vec<String>,
}

#[derive(Parser, Debug)]
struct MineArgs {
    #[command(flatten)]
    executor: ExecutorArgs,

    #[command(flatten)]
    store: StoreArgs,

    /// Block number
    #[arg(long)]
    block: u64,

    /// Run the solvers without writing the submission
    #[arg(long)]
    dry_run: bool,

    /// Deadline for the whole round in seconds
    #[arg(long, default_value = "600")]
    deadline_secs: u64,

    /// Maximum number of solver jobs in flight
    #[arg(long, default_value = "64", value_parser = clap::value_parser!(u32).range(1..))]
    max_in_flight: u32,

    /// Do not rerun failed puzzle solvers
    #[arg(long)]
    no_puzzle_retry: bool,
}

// =============================================================================
// Output Types
// =============================================================================

#[derive(Serialize)]
struct EvalJobOutput {
    label: String,
    duration_secs: f64,
    passed: bool,
    improved: bool,
    detail: String,
}

#[derive(Serialize)]
struct EvalOutput {
    jobs: Vec<EvalJobOutput>,
    failed: usize,
    total_duration_secs: f64,
    estimated_cost: f64,
}

#[derive(Serialize)]
struct PoolOutput {
    kind: String,
    winner: Option<String>,
    score: Option<u64>,
    failures: Vec<(String, String)>,
    abandoned: Vec<String>,
    deadline_elapsed: bool,
}

#[derive(Serialize)]
struct MineOutput {
    block: u64,
    puzzle: PoolOutput,
    task: PoolOutput,
    submitted: bool,
}

impl From<&PoolReport> for PoolOutput {
    fn from(report: &PoolReport) -> Self {
        Self {
            kind: report.kind.to_string(),
            winner: report.winner.as_ref().map(|w| w.winner_name.clone()),
            score: report.winner_score,
            failures: report
                .failures
                .iter()
                .map(|f| (f.name.clone(), f.reason.clone()))
                .collect(),
            abandoned: report.abandoned.clone(),
            deadline_elapsed: report.deadline_elapsed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cancel = CancellationToken::new();
    let signals = cancel_on_signal(cancel.clone());

    let result = match args.command {
        Commands::Eval(args) => run_eval(args, &cancel).await,
        Commands::Mine(args) => run_mine(args, &cancel).await,
    };

    signals.abort();
    result
}

fn build_store(args: &StoreArgs) -> Arc<dyn BlobStore> {
    let mut store = LocalBlobStore::new(&args.store_root);
    if let Some(ref uri) = args.store_uri {
        store = store.with_base_uri(uri.clone());
    }
    Arc::new(store)
}

fn build_client(args: &ExecutorArgs) -> Result<ExecutorClient, Box<dyn std::error::Error>> {
    let mut config = ExecutorConfig::new(args.endpoint.clone())
        .with_retry_backoff(Duration::from_secs(args.retry_backoff_secs));
    if let Some(ref key) = args.api_key {
        config = config.with_api_key(key.clone());
    }
    let backoff = config.retry_backoff;
    let executor = HttpExecutor::new(config)?;
    Ok(ExecutorClient::new(Arc::new(executor), backoff))
}

async fn run_eval(
    args: EvalArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let purchases: Vec<String> = args.purchase.split(',').map(str::to_string).collect();
    let plan = EvalPlan::new(
        args.solver,
        args.problems,
        purchases,
        Duration::from_secs(args.timeout),
    )?;

    let store = build_store(&args.store);
    let client = build_client(&args.executor)?;
    let config = EvalConfig::default()
        .with_max_in_flight(args.limit)
        .with_pacing(Duration::from_millis(args.pacing_ms));
    let cost_per_second = config.cost_per_second;
    let evaluator = FanOutEvaluator::new(client, config);

    let jobs = plan.jobs(store.as_ref());
    let descriptors = jobs.iter().map(|j| j.job.clone()).collect();
    let mut last = EvalProgress::default();
    let records = evaluator
        .evaluate_with_progress(descriptors, cancel, |p| {
            eprint!(
                "{}/{} done (\u{ffe5}{:.1})\r",
                p.done,
                p.total,
                p.estimated_cost(cost_per_second)
            );
            last = *p;
        })
        .await;
    eprintln!();

    let mut outputs = Vec::with_capacity(records.len());
    for record in &records {
        let job = &jobs[record.index];
        let output = match record.error {
            Some(ref e) => {
                let e = format!("{}", e);
                tracing::error!(
                    solver = %plan.solver,
                    purchase = %job.purchase,
                    problem = %job.problem,
                    location = %store.uri(&job.output_key),
                    error = %e,
                    "Evaluation failed"
                );
                EvalJobOutput {
                    label: job.label.clone(),
                    duration_secs: record.duration.as_secs_f64(),
                    passed: false,
                    improved: false,
                    detail: e,
                }
            }
            None => match ValidationSummary::load(store.as_ref(), job).await {
                Ok(summary) => {
                    let improved = summary.improved();
                    tracing::info!(
                        solver = %plan.solver,
                        purchase = %job.purchase,
                        problem = %job.problem,
                        duration = ?record.duration,
                        improved,
                        "PASS: {}",
                        summary.text
                    );
                    EvalJobOutput {
                        label: job.label.clone(),
                        duration_secs: record.duration.as_secs_f64(),
                        passed: true,
                        improved,
                        detail: summary.text,
                    }
                }
                Err(e) => {
                    let e = e.to_string();
                    tracing::error!(
                        solver = %plan.solver,
                        purchase = %job.purchase,
                        problem = %job.problem,
                        error = %e,
                        "Validation unavailable"
                    );
                    EvalJobOutput {
                        label: job.label.clone(),
                        duration_secs: record.duration.as_secs_f64(),
                        passed: false,
                        improved: false,
                        detail: e,
                    }
                }
            },
        };
        outputs.push(output);
    }

    let summary = last;
    let failed = outputs.iter().filter(|o| !o.passed).count();
    match args.store.output {
        OutputFormat::Json => {
            let output = EvalOutput {
                jobs: outputs,
                failed,
                total_duration_secs: summary.total_duration.as_secs_f64(),
                estimated_cost: summary.estimated_cost(cost_per_second),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("{:<32} {:>10} {:<6} DETAIL", "JOB", "SECONDS", "PASS");
            println!("{}", "-".repeat(72));
            for job in &outputs {
                println!(
                    "{:<32} {:>10.1} {:<6} {}{}",
                    job.label,
                    job.duration_secs,
                    if job.passed { "yes" } else { "no" },
                    job.detail,
                    if job.improved { " UPDATED!" } else { "" }
                );
            }
            println!(
                "\nFinished in {}s (\u{ffe5}{:.1}), {} failed",
                summary.total_duration.as_secs(),
                summary.estimated_cost(cost_per_second),
                failed
            );
        }
    }
    Ok(())
}

async fn run_mine(
    args: MineArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = build_store(&args.store);
    let client = build_client(&args.executor)?;

    let selection = SelectionConfig {
        deadline: Duration::from_secs(args.deadline_secs),
        retry_puzzle_failures: !args.no_puzzle_retry,
        max_in_flight: args.max_in_flight,
    };
    let round = BlockRound::new(
        store,
        BlockConfig::new(args.block).dry_run(args.dry_run),
    );
    let engine = round.engine(client, selection);

    let report = round.run(&engine, cancel).await?;
    let submitted = match report.decision() {
        Ok(decision) => round.submit(&decision).await?,
        Err(e) => {
            tracing::error!(block = args.block, error = %e, "Round failed");
            false
        }
    };

    match args.store.output {
        OutputFormat::Json => {
            let output = MineOutput {
                block: args.block,
                puzzle: PoolOutput::from(&report.puzzle),
                task: PoolOutput::from(&report.task),
                submitted,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            for pool in [&report.puzzle, &report.task] {
                let winner = pool
                    .winner
                    .as_ref()
                    .map(|w| w.winner_name.as_str())
                    .unwrap_or("-");
                println!("{:<8} winner: {}", pool.kind.to_string(), winner);
                for failure in &pool.failures {
                    println!("         failed: {} ({})", failure.name, failure.reason);
                }
                for name in &pool.abandoned {
                    println!("         abandoned: {}", name);
                }
            }
            println!("submitted: {}", if submitted { "yes" } else { "no" });
        }
    }

    if args.dry_run {
        return Ok(());
    }
    report.decision()?;
    Ok(())
}
