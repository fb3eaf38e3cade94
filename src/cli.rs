use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use promo_refiner::agents::{LlmGenerator, LlmReviewer, ModelClient, OllamaClient};
use promo_refiner::config::WorkflowConfig;
use promo_refiner::errors::ConfigError;
use promo_refiner::orchestrator::pool::{load_requests, run_batch_stream};
use promo_refiner::orchestrator::{FinalResult, Orchestrator};
use promo_refiner::retrieval::customers::JsonCustomerSource;
use promo_refiner::retrieval::index::{HashingEmbedder, VectorIndex};
use promo_refiner::retrieval::RetrievalContext;
use promo_refiner::sink::{FanoutSink, RecordStore, Sink, StructuredLogger};
use promo_refiner::state::RunStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;

const LOCAL_CONFIG: &str = "promo.yaml";

#[derive(Parser)]
#[command(name = "promo")]
#[command(about = "Refine personalized marketing messages with a generator/reviewer loop")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PROMO_GIT_SHA"), ")"))]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Config file (defaults to ./promo.yaml, then the built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one customer/topic pair and print the result as JSON
    Run {
        #[arg(long)]
        customer: String,

        /// Marketing topic (all remaining arguments are joined)
        #[arg(long, num_args = 1.., required = true)]
        topic: Vec<String>,

        /// Print node progress to stderr
        #[arg(long)]
        progress: bool,
    },
    /// Run every request in a JSONL file through the worker pool
    Batch {
        requests: PathBuf,

        /// Overrides orchestrator.workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Read `<customer_id> <topic...>` lines from stdin until exit/quit
    Chat,
    /// Print the effective configuration
    Config {
        /// Validate and exit non-zero on error
        #[arg(long)]
        check: bool,
    },
}

pub async fn dispatch(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Config { check } => show_config(&config, check),
        Command::Run {
            customer,
            topic,
            progress,
        } => {
            let orchestrator = build_orchestrator(config)?;
            run_single(&orchestrator, customer, topic.join(" "), progress).await
        }
        Command::Batch { requests, workers } => {
            let config = with_workers(config, workers)?;
            let workers = config.orchestrator.workers;
            let orchestrator = build_orchestrator(config)?;
            run_batch_file(&orchestrator, &requests, workers).await
        }
        Command::Chat => {
            let orchestrator = build_orchestrator(config)?;
            chat(&orchestrator).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::load(path),
        None if Path::new(LOCAL_CONFIG).exists() => WorkflowConfig::load(Path::new(LOCAL_CONFIG)),
        None => {
            let config = WorkflowConfig::default_config();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Applies the `-w` override and validates it like any other config value.
fn with_workers(
    mut config: WorkflowConfig,
    workers: Option<usize>,
) -> Result<WorkflowConfig, ConfigError> {
    if let Some(workers) = workers {
        config.orchestrator.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn show_config(config: &WorkflowConfig, check: bool) -> Result<i32> {
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", yaml);
    if check {
        eprintln!("[promo] configuration is valid");
    }
    Ok(0)
}

fn build_orchestrator(config: WorkflowConfig) -> Result<Orchestrator> {
    let timeout = config.orchestrator.call_timeout();
    let client: Arc<dyn ModelClient> = Arc::new(OllamaClient::from_config(&config.model, timeout));
    let generator = LlmGenerator::new(
        client.clone(),
        config.model.generator_model.clone(),
        config.model.temperature,
    );
    let reviewer = LlmReviewer::new(
        client,
        config.model.reviewer_model.clone(),
        config.model.temperature,
    );

    let customers = JsonCustomerSource::load(&config.data.customers)?;
    let index = VectorIndex::load_jsonl(
        &config.data.examples,
        HashingEmbedder::default(),
        config.data.min_similarity,
    )?;
    let retrieval = RetrievalContext::new(Arc::new(customers), Arc::new(index));

    let store = RecordStore::from_config(&config.sinks)?;
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if config.sinks.trace {
        let logger = StructuredLogger::new(store.output_dir())?;
        tracing::debug!(path = %logger.path().display(), "Trace sink enabled");
        sinks.push(Arc::new(logger));
    }
    sinks.push(Arc::new(store));

    let orchestrator = Orchestrator::new(
        config,
        retrieval,
        Arc::new(generator),
        Arc::new(reviewer),
        Arc::new(FanoutSink::new(sinks)),
    )?;
    Ok(orchestrator)
}

/// Flips the returned receiver to true on Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("[promo] cancelling, waiting for the current step to stop");
            let _ = tx.send(true);
        }
    });
    rx
}

fn exit_code(result: &FinalResult) -> i32 {
    match result.status {
        RunStatus::Accepted | RunStatus::Exhausted => 0,
        RunStatus::Failed | RunStatus::InProgress => 1,
    }
}

fn report_warnings(result: &FinalResult) {
    for warning in &result.persistence_warnings {
        eprintln!("[promo] {}", warning);
    }
}

async fn run_single(
    orchestrator: &Orchestrator,
    customer: String,
    topic: String,
    progress: bool,
) -> Result<i32> {
    let cancel = cancel_on_ctrl_c();
    let (prepared, mut snapshots) = orchestrator.prepare(customer.into(), topic.into());

    let watcher = progress.then(|| {
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let line = snapshots.borrow_and_update().progress_line();
                eprintln!("{}", line);
            }
        })
    });

    let outcome = orchestrator.drive(prepared, cancel).await;
    // the machine's sender is gone once the run finishes, which ends the watcher
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    let result = outcome?;

    report_warnings(&result);
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );
    Ok(exit_code(&result))
}

async fn run_batch_file(orchestrator: &Orchestrator, path: &Path, workers: usize) -> Result<i32> {
    let requests = load_requests(path)?;
    let total = requests.len();
    let cancel = cancel_on_ctrl_c();
    tracing::info!(runs = total, workers, "Starting batch");

    let mut failures = 0usize;
    let outcomes = run_batch_stream(orchestrator, requests, workers, cancel)?;
    let mut outcomes = std::pin::pin!(outcomes);
    while let Some(outcome) = outcomes.next().await {
        let line = match &outcome.result {
            Ok(result) => {
                report_warnings(result);
                if result.status == RunStatus::Failed {
                    failures += 1;
                }
                serde_json::to_string(&result.summary())?
            }
            Err(error) => {
                failures += 1;
                serde_json::json!({
                    "customer_id": outcome.request.customer_id,
                    "topic": outcome.request.topic,
                    "status": RunStatus::Failed,
                    "error": error.to_string(),
                })
                .to_string()
            }
        };
        println!("{}", line);
    }

    tracing::info!(runs = total, failures, "Batch finished");
    Ok(if failures > 0 { 1 } else { 0 })
}

/// Splits `<customer_id> <topic...>`.
fn parse_chat_line(line: &str) -> Option<(String, String)> {
    let (customer, topic) = line.trim().split_once(char::is_whitespace)?;
    let topic = topic.trim();
    if topic.is_empty() {
        return None;
    }
    Some((customer.to_string(), topic.to_string()))
}

async fn chat(orchestrator: &Orchestrator) -> Result<i32> {
    eprintln!("[promo] enter `<customer_id> <topic>` per line; `exit` or `quit` to stop");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        let Some((customer, topic)) = parse_chat_line(trimmed) else {
            eprintln!("[promo] expected `<customer_id> <topic>`");
            continue;
        };

        let (_tx, cancel) = watch::channel(false);
        match orchestrator
            .run_with_cancel(customer.into(), topic.into(), cancel)
            .await
        {
            Ok(result) => {
                report_warnings(&result);
                match &result.final_draft {
                    Some(draft) => println!(
                        "[{} {}] {}",
                        result.status,
                        result.final_score.map(|s| format!("{:.2}", s)).unwrap_or_default(),
                        draft
                    ),
                    None => println!(
                        "[{}] {}",
                        result.status,
                        result.failure.as_deref().unwrap_or("no output")
                    ),
                }
            }
            Err(error) => println!("[FAILED] {}", error),
        }
    }
    Ok(0)
}
