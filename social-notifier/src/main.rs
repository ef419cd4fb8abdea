use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use platforms_feed::AdapterFactory;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use social_notifier::api::{ApiServer, ApiServerConfig, AppState};
use social_notifier::cli::{Args, Commands};
use social_notifier::config::NotifierConfig;
use social_notifier::domain::DedupKey;
use social_notifier::logging;
use social_notifier::notification::{Dispatcher, NotificationFormatter};
use social_notifier::scheduler::{PollingScheduler, SchedulerConfig};
use social_notifier::state::DedupState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables before the config reads overrides.
    dotenvy::dotenv().ok();

    let (config, origin) = NotifierConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let _guard = logging::init_logging(&config.logging, args.log_directive())?;
    origin.log(&config);

    match args.command() {
        Commands::Run { once } => run(config, once).await,
        Commands::CheckConfig => check_config(&config),
        Commands::State => print_state(&config).await,
        Commands::Reset { key } => reset(&config, key.as_deref()).await,
    }
}

async fn run(config: NotifierConfig, once: bool) -> anyhow::Result<()> {
    config.validate()?;

    let state = DedupState::load(&config.state_file)
        .await
        .context("Failed to load dedup state")?;
    info!(path = %config.state_file.display(), records = state.len(), "Dedup state loaded");

    let dispatcher = Dispatcher::from_configs(&config.channels, config.request_timeout());
    info!(channels = dispatcher.enabled_count(), "Notification channels ready");

    let cancel = CancellationToken::new();
    let factory = AdapterFactory::new(config.adapter_options());
    let mut scheduler = PollingScheduler::new(
        SchedulerConfig::from(&config),
        state,
        Arc::new(dispatcher),
        cancel.clone(),
    )
    .with_rate_limiter(config.rate_limiter())
    .with_classifier(config.classifier())
    .with_formatter(NotificationFormatter::new(config.max_body_chars));

    for source in config.tracked_sources() {
        match factory.create(source.platform) {
            Ok(adapter) => scheduler.add_source(source, adapter),
            Err(e) => scheduler.add_unavailable_source(source, e.to_string()),
        }
    }

    if once {
        let report = scheduler.run_cycle(chrono::Utc::now()).await;
        info!(?report, "Single cycle finished");
        return Ok(());
    }

    if let Some(dir) = &config.logging.dir {
        logging::start_retention_cleanup(dir.clone(), cancel.clone());
    }

    let api = if config.api.enabled {
        let server = ApiServer::new(
            ApiServerConfig::try_from(&config.api)?,
            AppState::new(scheduler.status()),
            cancel.clone(),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    tokio::spawn(shutdown_signal(cancel.clone()));

    let state = scheduler.run().await;
    info!(records = state.len(), "Shutdown complete");

    cancel.cancel();
    if let Some(api) = api
        && let Err(e) = api.await
    {
        warn!(error = %e, "API task ended abnormally");
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, finishing current work");
    token.cancel();
}

fn check_config(config: &NotifierConfig) -> anyhow::Result<()> {
    config.validate()?;

    println!("Configuration is valid.");
    println!("Poll interval: {}s", config.poll_interval_secs);
    println!("State file: {}", config.state_file.display());
    println!("Tracked accounts:");
    for source in config.tracked_sources() {
        println!("  {} ({})", source.source_id(), source.label());
    }
    println!("Channels:");
    for channel in &config.channels {
        let state = if channel.is_enabled() { "enabled" } else { "disabled" };
        println!("  {} [{state}]", channel.channel_type());
    }
    Ok(())
}

async fn print_state(config: &NotifierConfig) -> anyhow::Result<()> {
    let state = DedupState::load(&config.state_file).await?;
    if state.is_empty() {
        println!("No delivered items recorded in {}", config.state_file.display());
        return Ok(());
    }
    for (key, record) in state.records() {
        let published = record
            .published_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{key}\t{}\tpublished {published}\tchecked {}",
            record.item_id,
            record.last_check.to_rfc3339()
        );
    }
    Ok(())
}

async fn reset(config: &NotifierConfig, key: Option<&str>) -> anyhow::Result<()> {
    let mut state = DedupState::load(&config.state_file).await?;
    match key {
        Some(raw) => {
            let key: DedupKey = raw.parse()?;
            if state.reset(&key).await? {
                println!("Forgot {key}");
            } else {
                println!("No record for {key}");
            }
        }
        None => {
            let removed = state.reset_all().await?;
            println!("Forgot {removed} record(s)");
        }
    }
    Ok(())
}
