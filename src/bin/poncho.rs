//! poncho command-line runner.
//!
//! Loads `config.yaml`, applies a preset, wires every component and then
//! either answers a single `--query` or runs the preset's session loop.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: tracing filter (default: "info,poncho=debug")
//! - any `${VAR}` referenced from `config.yaml`, e.g. `WB_API_KEY`
//!
//! # Usage
//!
//! ```bash
//! poncho --preset simple-cli
//! poncho --config ./config.yaml --query "show today's feedbacks"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};

use poncho::app::{
    load_config_with_preset, run_line_loop, run_preset, Components, HttpBackends, InitOptions,
    PresetCatalog, RunOutcome,
};
use poncho::config::{ConfigPathFinder, DefaultConfigPathFinder};
use poncho::events::EventKind;

#[derive(Debug, Parser)]
#[command(name = "poncho", version, about = "LLM agent for marketplace sellers")]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preset to lay over the configuration.
    #[arg(short, long, default_value = "simple-cli")]
    preset: String,

    /// Answer a single query and exit.
    #[arg(short, long)]
    query: Option<String>,

    /// Maximum reasoning iterations per query.
    #[arg(long)]
    max_iters: Option<usize>,

    /// Query timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,poncho=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let catalog = PresetCatalog::with_builtins();
    let preset = catalog.get(&cli.preset)?.clone();

    let config_path = DefaultConfigPathFinder::new(cli.config.clone())
        .require_config_path()
        .context("failed to locate config.yaml")?;
    tracing::info!(path = %config_path.display(), preset = %preset.name, "loading configuration");
    let cfg = load_config_with_preset(&config_path, &preset)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let mut opts = InitOptions::from_config(&cfg);
    opts.base_dir = config_path.parent().map(PathBuf::from);
    if let Some(max_iters) = cli.max_iters {
        opts.max_iters = max_iters;
    }

    let components = Arc::new(
        Components::initialize(cfg, opts, &HttpBackends)
            .await
            .context("failed to initialize components")?,
    );

    if let Some(query) = cli.query {
        let result = components
            .execute(&query, Duration::from_secs(cli.timeout))
            .await
            .context("query failed")?;
        println!("{}", result.response);
        if result.todo_stats.total > 0 {
            println!("\n{}", result.todo_summary);
        }
        tracing::info!(duration_ms = result.duration.as_millis() as u64, "done");
        return Ok(());
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = run_preset(components.as_ref(), &preset, stdin, tokio::io::stdout()).await?;
    match outcome {
        RunOutcome::RanToCompletion(summary) => {
            tracing::info!(queries = summary.queries, failures = summary.failures, "session finished");
        }
        RunOutcome::RequiresInteractiveHandoff { mut events, preset } => {
            println!("{}: no terminal UI is bundled, falling back to line mode", preset.name);
            let printer = tokio::spawn(async move {
                let mut stdout = tokio::io::stdout();
                while let Some(event) = events.recv().await {
                    let line = match &event.kind {
                        EventKind::Thinking { .. } | EventKind::Done { .. } => continue,
                        EventKind::ToolCall { tool, args } => format!("  -> {tool} {args}\n"),
                        EventKind::ToolResult { tool, duration, .. } => {
                            format!("  <- {tool} ({} ms)\n", duration.as_millis())
                        }
                        EventKind::Message { content } => format!("  .. {content}\n"),
                        EventKind::Error { message } => format!("  !! {message}\n"),
                    };
                    if stdout.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });

            let stdin = BufReader::new(tokio::io::stdin());
            let summary = run_line_loop(components.as_ref(), &preset, stdin, tokio::io::stdout()).await?;
            tracing::info!(queries = summary.queries, failures = summary.failures, "session finished");
            printer.abort();
        }
    }

    Ok(())
}
