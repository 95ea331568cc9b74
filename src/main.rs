//! vigil CLI: run ingestion cycles and inspect stored events and sources.

use clap::{Parser, Subcommand};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use vigil::config::Config;
use vigil::pipeline::{CycleOptions, Orchestrator};
use vigil::store::EventFilter;
use vigil::{Severity, StrategySelection};

/// Exit code for configuration errors.
const EXIT_CONFIG: i32 = 1;
/// Exit code for unrecoverable runtime errors.
const EXIT_RUNTIME: i32 = 2;

#[derive(Parser)]
#[command(name = "vigil", version, about = "OSINT conflict-event ingestion pipeline")]
struct Cli {
    /// Verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion cycle
    Ingest {
        /// Compute everything but skip persistence and alerts
        #[arg(long)]
        dry_run: bool,
        /// Cap the number of articles processed
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Restrict collection strategies: google, rss, newsapi, or all
        #[arg(long, default_value = "all")]
        source: String,
    },
    /// Run cycles continuously
    Monitor {
        /// Minutes between cycle starts
        #[arg(long, default_value_t = 15)]
        interval: u64,
        /// Enable alert delivery
        #[arg(long)]
        alerts: bool,
    },
    /// Query stored events
    Events {
        /// Minimum severity: low, medium, high, critical
        #[arg(long)]
        severity: Option<String>,
        /// Only events from the last N hours
        #[arg(long, value_name = "HOURS")]
        since: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List sources and their health
    Sources {
        /// Reactivate a deactivated source by name
        #[arg(long, value_name = "NAME")]
        reactivate: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "vigil=debug" } else { "vigil=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            return EXIT_CONFIG;
        }
    };

    let orchestrator = match Orchestrator::from_config(config).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("startup failed: {}", err);
            return if err.is_fatal() { EXIT_CONFIG } else { EXIT_RUNTIME };
        }
    };

    match cli.command {
        Command::Ingest {
            dry_run,
            limit,
            source,
        } => {
            let options = CycleOptions {
                dry_run,
                limit,
                selection: StrategySelection::parse(&source),
                ..Default::default()
            };
            match orchestrator.run_cycle(&options).await {
                Ok(stats) => {
                    println!(
                        "cycle complete: {} events ({} round 1, {} round 2), {} groups, {} alerts, coverage boost {:.2}",
                        stats.total_events(),
                        stats.round1.events_extracted,
                        stats.round2.events_extracted,
                        stats.groups,
                        stats.alerts,
                        stats.coverage_boost,
                    );
                    for error in &stats.errors {
                        eprintln!("  warning: {}", error);
                    }
                    0
                }
                Err(err) => {
                    eprintln!("cycle failed: {}", err);
                    EXIT_RUNTIME
                }
            }
        }

        Command::Monitor { interval, alerts } => {
            let period = Duration::from_secs(interval.max(1) * 60);
            tracing::info!(interval_minutes = interval, "monitor mode started");
            loop {
                let options = CycleOptions {
                    alerts_enabled: alerts,
                    deadline: Some(Instant::now() + period),
                    ..Default::default()
                };
                let started = Instant::now();
                match orchestrator.run_cycle(&options).await {
                    Ok(stats) => {
                        tracing::info!(
                            events = stats.total_events(),
                            groups = stats.groups,
                            alerts = stats.alerts,
                            "cycle finished"
                        );
                    }
                    Err(err) => {
                        // A failed cycle never stops the scheduler.
                        tracing::error!("cycle failed: {}", err);
                    }
                }
                let elapsed = started.elapsed();
                if elapsed < period {
                    tokio::time::sleep(period - elapsed).await;
                }
            }
        }

        Command::Events {
            severity,
            since,
            limit,
        } => {
            let filter = EventFilter {
                min_severity: severity.as_deref().map(Severity::parse),
                since: since.map(|hours| chrono::Utc::now() - chrono::Duration::hours(hours)),
                limit: Some(limit),
                ..Default::default()
            };
            match orchestrator.store().query_events(&filter) {
                Ok(events) => {
                    for event in &events {
                        let place = event
                            .location
                            .as_ref()
                            .map(|l| format!("{}, {}", l.name, l.country))
                            .unwrap_or_else(|| "unlocated".to_string());
                        println!(
                            "{}  [{} {}]  {}  ({})",
                            event.timestamp.format("%Y-%m-%d %H:%M"),
                            event.severity,
                            event.escalation_score,
                            event.enhanced_headline,
                            place,
                        );
                    }
                    println!("{} events", events.len());
                    0
                }
                Err(err) => {
                    eprintln!("query failed: {}", err);
                    EXIT_RUNTIME
                }
            }
        }

        Command::Sources { reactivate } => {
            if let Some(name) = reactivate {
                if orchestrator.registry().reactivate(&name).await {
                    if let Some(source) = orchestrator.registry().get(&name).await {
                        if let Err(err) = orchestrator.store().upsert_source(&source) {
                            eprintln!("failed to persist reactivation: {}", err);
                            return EXIT_RUNTIME;
                        }
                    }
                    println!("reactivated {}", name);
                } else {
                    eprintln!("no such source: {}", name);
                    return EXIT_RUNTIME;
                }
            }

            for source in orchestrator.registry().snapshot().await {
                println!(
                    "{:<24} {:<10} health {:.2}  failures {:<3} daily {:<4} {}",
                    source.name,
                    source.kind.to_string(),
                    source.health,
                    source.consecutive_failures,
                    source.daily_access_count,
                    if source.active { "active" } else { "inactive" },
                );
            }
            0
        }
    }
}
