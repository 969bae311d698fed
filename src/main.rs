mod scan;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use intellimap_core::bootstrap;
use intellimap_core::config::Config;
use intellimap_index::context::chunk_header;
use intellimap_index::types::SnapshotId;
use intellimap_llm::TaskKind;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "intellimap", version, about = "Index a repository and ask questions about it")]
struct Cli {
    /// Config file (default: `INTELLIMAP_CONFIG` or ./intellimap.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Snapshot, chunk and embed every text file under ROOT.
    Index {
        root: PathBuf,
        /// JSON map of relative path to symbol spans.
        #[arg(long)]
        symbols: Option<PathBuf>,
        /// Project name (default: from config).
        #[arg(long)]
        project: Option<String>,
        /// Store chunks without embedding them.
        #[arg(long)]
        no_embed: bool,
    },
    /// Answer a question from the latest (or given) snapshot.
    Ask {
        question: String,
        #[arg(long, default_value = "explain")]
        task: TaskKind,
        #[arg(long)]
        snapshot: Option<i64>,
        #[arg(long)]
        project: Option<String>,
    },
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();
    let config_path = bootstrap::resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;

    match cli.command {
        Command::Index {
            root,
            symbols,
            project,
            no_embed,
        } => run_index(&config, &root, symbols, project, no_embed).await,
        Command::Ask {
            question,
            task,
            snapshot,
            project,
        } => run_ask(&config, &question, task, snapshot, project).await,
    }
}

async fn run_index(
    config: &Config,
    root: &Path,
    symbols: Option<PathBuf>,
    project: Option<String>,
    no_embed: bool,
) -> anyhow::Result<()> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let hints = match symbols {
        Some(path) => scan::load_symbol_hints(&path)?,
        None => scan::SymbolHints::new(),
    };
    let project = project.unwrap_or_else(|| config.project.name.clone());

    let assistant = bootstrap::build(config).await?;
    let files = scan::scan(root, &hints);
    let meta = serde_json::json!({ "root": root.display().to_string() });
    let report = assistant.ingest(&project, &files, &meta).await?;
    for rejected in &report.rejected {
        tracing::warn!(%rejected, "symbol skipped");
    }

    let mut summary = serde_json::json!({
        "snapshot": report.snapshot_id,
        "manifest_hash": report.manifest_hash,
        "files": report.files,
        "chunks": report.chunks,
        "rejected_symbols": report.rejected.len(),
    });

    if !no_embed {
        let cancel = CancellationToken::new();
        let shutdown = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received shutdown signal, stopping after current chunk");
                    cancel.cancel();
                }
            })
        };

        let mut job = assistant.embed(report.snapshot_id, cancel);
        while let Some(progress) = job.progress.next().await {
            if progress.current == progress.total || progress.current % 50 == 0 {
                tracing::info!(
                    current = progress.current,
                    total = progress.total,
                    percent = %format!("{:.1}", progress.percentage),
                    "embedding"
                );
            }
        }
        let batch = job.finish().await?;
        shutdown.abort();

        for (chunk, reason) in batch.failures() {
            tracing::warn!(%chunk, reason, "chunk not embedded");
        }
        summary["embedded"] = batch.embedded().into();
        summary["failed"] = batch.failures().count().into();
        summary["cancelled"] = batch.cancelled.into();
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_ask(
    config: &Config,
    question: &str,
    task: TaskKind,
    snapshot: Option<i64>,
    project: Option<String>,
) -> anyhow::Result<()> {
    let assistant = bootstrap::build(config).await?;
    let snapshot = match snapshot {
        Some(id) => SnapshotId(id),
        None => {
            let project = project.unwrap_or_else(|| config.project.name.clone());
            assistant
                .latest_snapshot(&project)
                .await?
                .map(|s| s.id)
                .with_context(|| {
                    format!("no snapshot for project {project}, run `intellimap index` first")
                })?
        }
    };

    let answer = assistant.ask(snapshot, task, question).await?;
    println!("{}", answer.response.content);
    if !answer.hits.is_empty() {
        println!("\nSources:");
        for hit in &answer.hits {
            println!("  {} [{:.2}]", chunk_header(hit), hit.score);
        }
    }

    let metrics = assistant.router().metrics();
    tracing::info!(
        provider = %answer.response.provider,
        model = %answer.response.model,
        tokens_in = metrics.tokens_in,
        tokens_out = metrics.tokens_out,
        cost_usd = %format!("{:.6}", metrics.cost),
        "answered"
    );
    Ok(())
}
