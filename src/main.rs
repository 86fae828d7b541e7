//! The docsink daemon: mirrors a directory of documents into a RAG ingest
//! backend, one way, forever (or once, with `--once`).

use clap::{Parser, Subcommand};
use docsink_backend::backend::HttpIngestBackend;
use docsink_backend::BackendHandle;
use docsink_config::Config;
use docsink_engine::{EngineOptions, SyncEngine};
use docsink_ledger::{FailureLog, StateStore};
use docsink_preprocess::{CommandPreprocessor, IdentityPreprocessor, PreprocessorHandle};
use docsink_source::source::LocalDirSource;
use docsink_source::SourceHandle;
use miette::miette;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "docsink", version, about = "One-way sync from a document source into a RAG ingest backend")]
struct Cli {
    /// Path to the configuration file (defaults to the platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the synchronization daemon.
    Run {
        /// Startup reconciliation plus a single poll tick, then exit.
        #[arg(long)]
        once: bool,
    },
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = docsink_config::load(cli.config.as_deref()).map_err(into_report)?;

    match cli.command {
        Command::CheckConfig => {
            println!("configuration OK");
            println!("  source:       {} ({})", config.source.kind, describe_root(&config));
            println!("  extensions:   {}", config.source.allowed_extensions.join(", "));
            println!("  backend:      {}", config.backend.base_url);
            println!("  poll every:   {}ms", config.sync.poll_interval_ms);
            println!("  startup sync: {}", config.sync.startup_sync);
            println!("  state file:   {}", config.state.file_path.display());
            println!("  failure log:  {}", config.failure_log.path.display());
            println!(
                "  preprocessor: {}",
                match config.preprocessor.enabled {
                    true => config.preprocessor.command.as_str(),
                    false => "disabled",
                }
            );
            Ok(())
        },
        Command::Run { once } => run(config, once).await,
    }
}

async fn run(config: Config, once: bool) -> miette::Result<()> {
    let engine = build_engine(&config)?;

    if once {
        let startup = engine.startup_sync().await.map_err(into_report)?;
        let tick = engine.poll_tick().await.map_err(into_report)?;
        tracing::info!(
            uploaded = startup.uploaded + tick.uploaded,
            deleted = startup.deleted + tick.deleted,
            failed = startup.failed + tick.failed,
            "Single-shot sync finished",
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing the current tick");
            let _ = shutdown_tx.send(true);
        }
    });

    engine
        .run(Duration::from_millis(config.sync.poll_interval_ms), shutdown_rx)
        .await
        .map_err(into_report)
}

fn build_engine(config: &Config) -> miette::Result<SyncEngine> {
    // Validation guarantees kind == "local" and a root; other transports
    // plug in here.
    let root = config
        .source
        .root
        .as_ref()
        .ok_or_else(|| miette!("source.root is required"))?;
    let source: SourceHandle = Arc::new(
        LocalDirSource::new("source", root, config.source.allowed_extensions.iter().cloned()).map_err(into_report)?,
    );

    let backend: BackendHandle = Arc::new(
        HttpIngestBackend::new(
            "ingest",
            &config.backend.base_url,
            config.backend.api_token.clone(),
            Duration::from_secs(config.backend.request_timeout_seconds),
        )
        .map_err(into_report)?,
    );

    let preprocessor: PreprocessorHandle = match config.preprocessor.enabled {
        true => Arc::new(
            CommandPreprocessor::new(
                config.preprocessor.command.split_whitespace(),
                Duration::from_secs(config.preprocessor.timeout_seconds),
            )
            .map_err(into_report)?,
        ),
        false => Arc::new(IdentityPreprocessor),
    };

    let options = EngineOptions {
        startup_sync: config.sync.startup_sync.parse().map_err(|e: String| miette!("{e}"))?,
        cleanup_failed_docs: config.sync.cleanup_failed_docs,
    };

    Ok(SyncEngine::new(
        source,
        backend,
        preprocessor,
        StateStore::new(&config.state.file_path),
        FailureLog::new(&config.failure_log.path, config.failure_log.max_size_kb),
        options,
    ))
}

fn describe_root(config: &Config) -> String {
    config
        .source
        .root
        .as_ref()
        .map(|root| root.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string())
}

fn into_report<E: Debug>(err: E) -> miette::Report {
    miette!("{err:?}")
}
