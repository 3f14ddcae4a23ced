use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rentwatch::config::Config;
use rentwatch::feed::DaftFeed;
use rentwatch::models::OfferState;
use rentwatch::notifications::{build_channel, Dispatcher, MessageRenderer};
use rentwatch::scheduler::{DailySchedule, ScheduleTrigger, SweepRunner};
use rentwatch::server::{ApiServer, AppState};
use rentwatch::storage::{open_repository, OfferFilter, SharedOfferRepository, SweepLock};
use rentwatch::sweep::{SweepJournal, SweepOrchestrator, SweepReport, SweepTrigger};

#[derive(Parser)]
#[command(
    name = "rentwatch",
    version,
    about = "Watches rental listings and notifies about new offers and price changes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP trigger surface
    Serve {
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Disable the daily schedule; sweeps only run on demand
        #[arg(long, default_value = "false")]
        no_schedule: bool,
    },

    /// Run one sweep over all active partitions and exit
    Sweep {
        /// Log notifications instead of delivering them
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Print the sweep report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List stored offers
    Offers {
        /// Only offers of this partition
        #[arg(short, long)]
        partition: Option<String>,

        /// Only offers in this state (PUBLISHED, PAUSED)
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum number of offers
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Print offers as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = rentwatch::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed, continuing without metrics");
    }

    tracing::info!(partitions = config.partitions.len(), "rentwatch starting");

    match cli.command {
        Commands::Serve { port, no_schedule } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_schedule {
                config.schedule.enabled = false;
            }
            serve(config).await?;
        }

        Commands::Sweep { dry_run, json } => {
            if dry_run {
                config.notifier.dry_run = true;
            }
            sweep_once(config, json).await?;
        }

        Commands::Offers {
            partition,
            state,
            limit,
            json,
        } => {
            list_offers(&config, partition, state, limit, json)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("rentwatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("rentwatch={level},warn"))
        })
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Wire feed, channel, dispatcher and store into an orchestrator
fn build_orchestrator(
    config: &Config,
    store: SharedOfferRepository,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<SweepOrchestrator> {
    let feed = DaftFeed::new(config.feed.clone()).context("Failed to create listing feed")?;
    let channel = build_channel(&config.notifier).context("Failed to create notification channel")?;

    tracing::info!(
        feed = "daft",
        channel = channel.name(),
        batch_size = config.dispatch.batch_size,
        "Sweep pipeline configured"
    );

    let dispatcher = Dispatcher::new(
        channel,
        MessageRenderer::new(config.dispatch.currency.clone()),
        config.dispatch.policy(),
    );

    let journal = match &config.sweep.journal_path {
        Some(path) => SweepJournal::new(path.clone()),
        None => SweepJournal::disabled(),
    };

    let mut orchestrator =
        SweepOrchestrator::new(config.partitions(), store, Arc::new(feed), dispatcher)
            .with_pace(config.sweep.pace())
            .with_journal(journal);

    if let Some(shutdown) = shutdown {
        orchestrator = orchestrator.with_shutdown(shutdown);
    }

    Ok(orchestrator)
}

async fn serve(config: Config) -> Result<()> {
    let store = open_repository(&config.storage)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = build_orchestrator(&config, store, Some(shutdown_rx.clone()))?;
    let mut runner = SweepRunner::new(Arc::new(orchestrator));
    if let Some(path) = config.storage.lock_path() {
        runner = runner.with_lock(path);
    }
    let runner = Arc::new(runner);

    let trigger_handle = if config.schedule.enabled {
        let schedule = DailySchedule::parse(config.schedule.times.as_slice())?;
        let trigger = ScheduleTrigger::new(schedule, Arc::clone(&runner))
            .run_on_start(config.schedule.run_on_start);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { trigger.start(rx).await }))
    } else {
        tracing::info!("Daily schedule disabled");
        None
    };

    let server = ApiServer::new(config.server.clone(), AppState::new(Arc::clone(&runner)));

    let mut server_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server
        .start_with_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    if let Some(handle) = trigger_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Schedule trigger failed"),
            Err(e) => tracing::error!(error = %e, "Schedule trigger task panicked"),
        }
    }

    // Let an in-flight sweep reach its partition boundary
    runner.wait_idle().await;

    tracing::info!("rentwatch stopped");
    Ok(())
}

async fn sweep_once(config: Config, json: bool) -> Result<()> {
    let store = open_repository(&config.storage)?;
    let _lock = match config.storage.lock_path() {
        Some(path) => Some(SweepLock::try_acquire(&path)?.with_context(|| {
            format!(
                "another sweep is running against {}",
                config.storage.sqlite_path.display()
            )
        })?),
        None => None,
    };
    let orchestrator = build_orchestrator(&config, store, None)?;

    let report = orchestrator.run(SweepTrigger::Cli).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.all_failed() {
        anyhow::bail!("every partition failed");
    }
    Ok(())
}

fn print_report(report: &SweepReport) {
    println!(
        "Sweep {} ({}) finished in {}s",
        report.id,
        report.trigger,
        report.duration().num_seconds()
    );
    for entry in &report.partitions {
        match entry.outcome.changes() {
            Some(changes) => {
                let summary = changes.summary();
                println!(
                    "  {:<20} {:<15} new={} changed={} withdrawn={}",
                    entry.partition,
                    entry.outcome.tag(),
                    summary.new,
                    summary.changed,
                    summary.withdrawn
                );
            }
            None => println!("  {:<20} {:<15}", entry.partition, entry.outcome.tag()),
        }
        if let Some(error) = entry.outcome.error() {
            println!("    error: {error}");
        }
    }
    println!(
        "Completed: {}  Failed: {}  Notifications sent: {}",
        report.completed(),
        report.failed(),
        report.notifications_sent()
    );
}

fn list_offers(
    config: &Config,
    partition: Option<String>,
    state: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let store = open_repository(&config.storage)?;

    let mut filter = OfferFilter::default().limit(limit);
    if let Some(partition) = partition {
        filter = filter.partition(partition);
    }
    if let Some(state) = state {
        let state: OfferState = state.parse().map_err(anyhow::Error::msg)?;
        filter = filter.state(state);
    }

    let offers = store.list_offers(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&offers)?);
        return Ok(());
    }

    for offer in &offers {
        println!(
            "{:>10}  {:<12} {:<10} {:>7}  {}",
            offer.id,
            offer.partition,
            offer.state.as_str(),
            offer.price,
            offer.details.title
        );
    }
    println!("{} offers", offers.len());
    Ok(())
}
