//! Disruptor CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "disruptor")]
#[command(about = "A chat bot that interrupts monologues with cat pictures")]
struct Cli {
    /// Path to config file (defaults to disruptor.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    tracing::info!("starting disruptor");

    let config_path = cli
        .config
        .unwrap_or_else(|| std::path::PathBuf::from("disruptor.toml"));
    let config = disruptor::config::Config::load_from_path(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    tracing::info!(source_type = %config.source.kind, "configuration loaded");

    let transport: Arc<dyn disruptor::transport::TransportDyn> = Arc::new(
        disruptor::transport::webhook::WebhookTransport::new(
            config.webhook.bind.clone(),
            config.webhook.port,
        ),
    );
    let inbound = transport
        .start()
        .await
        .map_err(anyhow::Error::from)
        .context("failed to start transport")?;

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let tasks = disruptor::tasks::BackgroundTasks::new();
    let source_ctx = disruptor::source::SourceContext {
        reupload: Arc::new(disruptor::source::Reuploader::new(
            http.clone(),
            transport.clone(),
            config.user_agent.clone(),
        )),
        http,
        user_agent: config.user_agent.clone(),
        tasks: tasks.clone(),
    };

    let registry = disruptor::source::SourceRegistry::standard();
    let source = registry
        .build(source_ctx, &config.source)
        .await
        .map_err(anyhow::Error::from)
        .context("failed to build source tree")?;

    tracing::info!(source = source.name(), "source tree built");

    let bot = disruptor::bot::DisruptorBot::new(&config, transport.clone(), source);

    tokio::select! {
        _ = bot.run(inbound) => {
            tracing::warn!("event stream closed");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            tracing::info!("shutdown signal received");
        }
    }

    transport
        .shutdown()
        .await
        .map_err(anyhow::Error::from)
        .context("transport shutdown failed")?;
    tasks.wait_idle().await;

    tracing::info!("disruptor stopped");
    Ok(())
}
