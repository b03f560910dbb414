//! alert-engine-worker — consumes logs from the configured bus, evaluates
//! them against the rule set, and dispatches alerts through the configured
//! notifier.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use alert_core::config::{load_dotenv, Config};
use alert_engine::{AlertEngine, LogConsumer};
use alert_notify::{Dispatcher, TemplateRenderer, WebhookNotifier};
use alert_rules::RuleLoader;

/// Alert engine — log-driven rule evaluation and notification dispatch.
#[derive(Parser, Debug)]
#[command(name = "alert-engine-worker", version, about)]
struct Cli {
    /// Path to the rules directory to load and watch.
    #[arg(long, env = "RULES_DIR", default_value = "data/rules")]
    rules_dir: String,

    /// Consume messages in micro-batches rather than one at a time.
    #[arg(long, env = "ENGINE_BATCH_MODE", default_value_t = false)]
    batch_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();
    info!(profile = cfg.profile_label(), "alert engine starting");

    let store = alert_state::build_backend(&cfg.state_store.backend, &cfg.state_store).await?;
    let bus = alert_bus::build_backend(&cfg.bus.backend, &cfg.bus).await?;

    let mut loader = RuleLoader::new(PathBuf::from(&cli.rules_dir), Arc::clone(&store));
    loader.load_all().await?;
    if let Err(e) = loader.watch(tokio::runtime::Handle::current()) {
        warn!(error = %e, "failed to start rules directory watcher, hot-reload disabled");
    }
    let loader = Arc::new(loader);

    let renderer = TemplateRenderer::new();
    renderer.validate_templates(&cfg.notifications)?;

    let notifier = Arc::new(WebhookNotifier::new(
        cfg.notifications.webhook.url.clone(),
        cfg.notifications.webhook.username.clone(),
        cfg.notifications.webhook.icon_emoji.clone(),
        cfg.notifications.webhook.channel.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(notifier, cfg.notifications.clone()));

    let engine = Arc::new(AlertEngine::new(
        Arc::clone(&store),
        Arc::clone(&loader),
        Arc::clone(&dispatcher),
        cfg.alerting.clone(),
    ));
    let consumer = Arc::new(LogConsumer::new(bus, Arc::clone(&engine), cfg.log_processing.clone()));

    let cancel = CancellationToken::new();

    let consumer_handle = {
        let consumer = Arc::clone(&consumer);
        let cancel = cancel.clone();
        let batch_mode = cli.batch_mode;
        tokio::spawn(async move {
            if batch_mode {
                consumer.run_batched(cancel).await;
            } else {
                consumer.run(cancel).await;
            }
        })
    };

    let cleanup_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run_cleanup_loop(cancel).await })
    };

    let batch_flush_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run_batch_flush_loop(cancel).await })
    };

    info!("alert engine running");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl-c handler");
    }
    info!("shutdown signal received");
    cancel.cancel();

    let _ = tokio::join!(consumer_handle, cleanup_handle, batch_flush_handle);
    info!("alert engine exited cleanly");
    Ok(())
}
