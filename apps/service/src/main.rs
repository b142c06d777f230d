//! Headless Uppe monitor service.
//!
//! Reads sites and monitors from the TOML config, runs the engine against a
//! local libsql history database and logs what the engine emits.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use uppe_engine::{
    EngineEvent, EngineSettings, HistoryStore, LibsqlHistory, MonitorKey, NetworkProber, Outcome, Registry, Scheduler,
};

use config::Config;

#[derive(Parser)]
#[command(name = "uppe", version, about = "Headless Uppe monitor service")]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/uppe/config.toml
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule every configured monitor until interrupted (default)
    Run,
    /// Run one check immediately and print the result
    Check { site: String, monitor: String },
    /// Show stored results for a monitor, newest first
    History {
        site: String,
        monitor: String,
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
    /// List the monitor types this build understands
    Types,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("failed to load config")?;

    let level = config.logging.level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    logger::init_with(level, config.logging.format.parse().ok());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check { site, monitor } => check(config, MonitorKey::new(site, monitor)).await,
        Command::History { site, monitor, limit } => history(config, MonitorKey::new(site, monitor), limit).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        Command::Types => {
            for kind in Registry::global().kinds() {
                println!("{kind}");
            }
            Ok(())
        }
    }
}

async fn open_history(config: &Config) -> Result<Arc<LibsqlHistory>> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let history = LibsqlHistory::open(&path.to_string_lossy(), config.database.max_connections)
        .await
        .with_context(|| format!("failed to open history database {}", path.display()))?;
    Ok(Arc::new(history))
}

async fn scheduler(config: &Config, settings: EngineSettings) -> Result<Scheduler> {
    let history = open_history(config).await?;
    let prober = NetworkProber::new(&settings)?;
    Ok(Scheduler::new(settings, Arc::new(prober), history))
}

/// The engine logs its own transitions; this is the subscriber's view of them
fn log_event(event: &EngineEvent) {
    let key = event.key();
    match event {
        EngineEvent::CheckCompleted { result, .. } => debug!(
            site = %key.site,
            monitor = %key.monitor,
            outcome = %result.outcome,
            latency_ms = result.latency_ms,
            "event: check completed"
        ),
        EngineEvent::StatusChanged { old, new, .. } => {
            debug!(site = %key.site, monitor = %key.monitor, %old, %new, "event: status changed")
        }
        EngineEvent::CheckDeferred { reason, .. } => {
            debug!(site = %key.site, monitor = %key.monitor, %reason, "event: check deferred")
        }
        EngineEvent::MonitorRejected { reason, .. } => {
            debug!(site = %key.site, monitor = %key.monitor, %reason, "event: monitor rejected")
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let scheduler = scheduler(&config, config.engine.clone()).await?;

    let mut events = scheduler.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    for site in config.sites.iter().cloned() {
        scheduler.upsert_site(site).await?;
    }
    let retention = scheduler.spawn_retention();

    info!(
        sites = config.sites.len(),
        scheduled = scheduler.scheduled_count(),
        database = %config.database_path().display(),
        "Uppe service running"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Interrupted, shutting down");

    scheduler.shutdown().await;
    if let Err(e) = retention.await {
        warn!("Retention task ended abnormally: {}", e);
    }
    event_log.abort();
    Ok(())
}

async fn check(config: Config, key: MonitorKey) -> Result<()> {
    let Some(site) = config.site(&key.site).cloned() else {
        bail!("site `{}` is not in {}", key.site, config.source.display());
    };

    // One-shot: nothing should tick on its own
    let settings = EngineSettings { monitoring_enabled: false, ..config.engine.clone() };
    let scheduler = scheduler(&config, settings).await?;

    let report = scheduler.upsert_site(site).await?;
    if let Some((_, err)) = report.rejected.iter().find(|(rejected, _)| *rejected == key) {
        bail!("{err}");
    }

    let Some(result) = scheduler.check_now(&key).await? else {
        bail!("check for {key} did not complete");
    };

    println!("{key}: {} in {}ms", result.outcome, result.latency_ms);
    if let Some(kind) = result.error_kind {
        println!("  error: {kind}");
    }
    println!("  {}", result.detail);

    scheduler.shutdown().await;
    if result.outcome != Outcome::Pass {
        std::process::exit(1);
    }
    Ok(())
}

async fn history(config: Config, key: MonitorKey, limit: usize) -> Result<()> {
    let history = open_history(&config).await?;
    let results = history.list(&key, limit).await?;

    if results.is_empty() {
        println!("No results stored for {key}");
        return Ok(());
    }

    for result in results {
        let kind = result.error_kind.map(|k| format!(" [{k}]")).unwrap_or_default();
        println!(
            "{}  {:<5} {:>6}ms{}  {}",
            result.timestamp.format("%Y-%m-%d %H:%M:%S"),
            result.outcome.as_str(),
            result.latency_ms,
            kind,
            result.detail
        );
    }
    Ok(())
}
