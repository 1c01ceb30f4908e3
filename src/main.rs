use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use onboard_core::config::IndexBackend;
use onboard_core::{Answer, Config, Coordinator, IngestReport, LocalSource, RepositorySource};
use onboard_index::VectorStore;
use onboard_index::store::{AnyStore, MemoryStore, QdrantStore};
use onboard_llm::LlmProvider;
use onboard_llm::http::default_client;
use onboard_llm::openai::OpenAiProvider;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(name = "onboard", version, about = "Ask grounded questions about a code repository")]
struct Cli {
    /// Path to the TOML config (default: $ONBOARD_CONFIG or onboard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print answers and reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a repository and answer one question
    Ask { repo: String, question: String },
    /// Index a repository and suggest where a newcomer should start
    Start { repo: String },
    /// Index a repository once, then answer questions read from stdin
    Chat { repo: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    config.validate()?;
    tracing::debug!(path = %config_path.display(), ?config, "configuration loaded");

    let provider = Arc::new(build_provider(&config)?);
    let store = build_store(&config)?;
    tracing::info!(
        model = %config.llm.model,
        embedding_model = %config.llm.embedding_model,
        store = store.name(),
        "starting onboard"
    );

    let source = LocalSource::new(config.ingest.max_file_size);
    let coordinator = Coordinator::new(provider, store, source, &config);
    coordinator
        .verify()
        .await
        .context("embedding provider check failed")?;

    match cli.command {
        Command::Ask { repo, question } => {
            ingest(&coordinator, &repo, cli.json).await?;
            let answer = coordinator.ask(&question).await;
            print_answer(&answer, cli.json)?;
        }
        Command::Start { repo } => {
            ingest(&coordinator, &repo, cli.json).await?;
            let answer = coordinator.where_do_i_start().await;
            print_answer(&answer, cli.json)?;
        }
        Command::Chat { repo } => {
            ingest(&coordinator, &repo, cli.json).await?;
            chat_loop(&coordinator, cli.json).await?;
        }
    }

    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("ONBOARD_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("onboard.toml")
}

fn build_provider(config: &Config) -> anyhow::Result<OpenAiProvider> {
    let api_key = config.api_key()?;
    tracing::debug!(source = api_key.source(), "using provider API key");
    let llm = &config.llm;
    Ok(OpenAiProvider::new(
        api_key.expose().to_owned(),
        llm.base_url.clone(),
        llm.model.clone(),
        llm.max_tokens,
        Some(llm.embedding_model.clone()),
    )
    .with_client(default_client(Duration::from_secs(llm.timeout_secs)))
    .with_temperature(llm.temperature))
}

fn build_store(config: &Config) -> anyhow::Result<AnyStore> {
    match config.index.backend {
        IndexBackend::Memory => Ok(AnyStore::Memory(MemoryStore::new())),
        IndexBackend::Qdrant => {
            let store = QdrantStore::new(
                &config.index.qdrant_url,
                &config.index.collection,
                config.embedding.dimension,
            )
            .with_context(|| format!("failed to connect to Qdrant at {}", config.index.qdrant_url))?;
            Ok(AnyStore::Qdrant(Box::new(store)))
        }
    }
}

async fn ingest<P, S, R>(
    coordinator: &Coordinator<P, S, R>,
    repo: &str,
    json: bool,
) -> anyhow::Result<()>
where
    P: LlmProvider,
    S: VectorStore,
    R: RepositorySource,
{
    let report = coordinator
        .ingest(repo)
        .await
        .with_context(|| format!("failed to index {repo}"))?;
    print_report(&report, json)
}

fn print_report(report: &IngestReport, json: bool) -> anyhow::Result<()> {
    if json {
        eprintln!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    eprintln!(
        "Indexed {} file(s) into {} chunk(s) in {} ms ({} skipped).",
        report.file_count, report.chunk_count, report.duration_ms, report.files_skipped
    );
    for warning in &report.warnings {
        eprintln!("  warning: {}: {}", warning.path, warning.message);
    }
    Ok(())
}

fn print_answer(answer: &Answer, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);
    if answer.is_error() {
        return Ok(());
    }
    println!();
    println!("Confidence: {:.2}", answer.confidence);
    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source.location());
        }
    }
    if !answer.unverified_citations.is_empty() {
        println!(
            "Removed unverified citations: {}",
            answer.unverified_citations.join(", ")
        );
    }
    Ok(())
}

async fn chat_loop<P, S, R>(coordinator: &Coordinator<P, S, R>, json: bool) -> anyhow::Result<()>
where
    P: LlmProvider,
    S: VectorStore,
    R: RepositorySource,
{
    eprintln!("Ask a question, /start for an overview, /status for corpus state, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/status" => {
                let state = coordinator.state();
                match state.snapshot.as_deref() {
                    Some(snapshot) => println!(
                        "{} ({} files, {} chunks, generation {})",
                        state.status, snapshot.file_count, snapshot.chunk_count, snapshot.generation
                    ),
                    None => println!("{}", state.status),
                }
            }
            "/start" => print_answer(&coordinator.where_do_i_start().await, json)?,
            question => print_answer(&coordinator.ask(question).await, json)?,
        }
    }

    Ok(())
}
