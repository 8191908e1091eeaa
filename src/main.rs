use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slotrace::client::{BridgePage, DirectClient, SchedulerApi, SimulatedClient};
use slotrace::config::Config;
use slotrace::coordinator::{Coordinator, Strategy};
use slotrace::evasion::FingerprintRotator;
use slotrace::models::StrategyKind;
use slotrace::notifications::{Notification, Notifier, Severity, SmsChannel};
use slotrace::status::StatusMachine;

/// Connection attempts before giving up on the browser bridge
const BRIDGE_CONNECT_ATTEMPTS: u32 = 5;

#[derive(Parser)]
#[command(
    name = "slotrace",
    version,
    about = "Appointment-slot watcher that races for scarce bookings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll until a slot is booked or the process is interrupted
    Watch {
        /// Skip the browser-simulated strategy even when a bridge is
        /// configured
        #[arg(long, default_value = "false")]
        direct_only: bool,
    },

    /// Query current availability once and print it
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("slotrace starting");

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Watch { direct_only } => {
            tracing::info!(
                offices = ?config.backend.office_ids,
                service_id = config.backend.service_id,
                direct_only = %direct_only,
                "Starting watch command"
            );
            watch(config, direct_only).await?;
        }

        Commands::Check => {
            tracing::info!(offices = ?config.backend.office_ids, "Starting check command");
            check(config).await?;
        }
    }

    Ok(())
}

async fn watch(config: Config, direct_only: bool) -> Result<()> {
    let applicant = config.applicant().context("Applicant data incomplete")?;

    let status = Arc::new(StatusMachine::new());

    let mut notifier = Notifier::new();
    if let Some(sms) = config.sms() {
        let channel = SmsChannel::new(sms).context("Failed to set up SMS channel")?;
        notifier.add_channel(Box::new(channel));
    }
    let notifier = Arc::new(notifier);
    let forwarder = Arc::clone(&notifier).spawn_status_forwarder(status.subscribe());

    if notifier.is_empty() {
        tracing::info!("No notification channels configured");
    } else {
        notifier
            .broadcast(&Notification::new(
                Severity::Info,
                "Watcher started",
                format!(
                    "watching offices {:?}, service {}",
                    config.backend.office_ids, config.backend.service_id
                ),
            ))
            .await;
    }

    let rotator = Arc::new(FingerprintRotator::new());
    let (min_ms, max_ms) = config.pre_request_delay();

    let direct = DirectClient::with_config(
        &config.backend.base_url,
        Arc::clone(&rotator),
        config.backoff_policy(),
        config.backend.rate_limit_per_sec,
        config.request_timeout(),
    )
    .context("Failed to set up direct client")?
    .with_pre_request_delay(min_ms, max_ms);

    let mut strategies = vec![Strategy {
        kind: StrategyKind::Direct,
        client: Arc::new(direct) as Arc<dyn SchedulerApi>,
        interval: config.direct_interval(),
        initial_offset: std::time::Duration::ZERO,
    }];

    match (&config.backend.browser_bridge_url, direct_only) {
        (Some(bridge_url), false) => {
            // No browser session means no second vantage point at all;
            // bail out rather than silently degrade
            let page = match BridgePage::connect(bridge_url, BRIDGE_CONNECT_ATTEMPTS).await {
                Ok(page) => page,
                Err(e) => {
                    notifier
                        .broadcast(&abort_notification(&format!(
                            "browser bridge unreachable: {e}"
                        )))
                        .await;
                    return Err(e).context("Browser bridge unreachable");
                }
            };

            let simulated = SimulatedClient::with_backoff(
                Arc::new(page),
                &config.backend.base_url,
                Arc::clone(&rotator),
                config.backoff_policy(),
            )
            .context("Failed to set up browser-simulated client")?
            .with_pre_request_delay(min_ms, max_ms);

            strategies.push(Strategy {
                kind: StrategyKind::Browser,
                client: Arc::new(simulated) as Arc<dyn SchedulerApi>,
                interval: config.browser_interval(),
                initial_offset: std::time::Duration::from_secs(config.watch.browser_offset_secs),
            });
        }
        (Some(_), true) => {
            tracing::info!("Browser bridge configured but disabled via --direct-only");
        }
        (None, _) => {
            tracing::info!("No browser bridge configured, running direct strategy only");
        }
    }

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&status),
        config.query_plan(),
        applicant,
    ));

    let signal_handle = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down after current iteration");
                coordinator.trigger_shutdown();
            }
        })
    };

    let booked = Arc::clone(&coordinator).run(strategies).await;
    signal_handle.abort();

    if booked {
        tracing::info!("Watch finished: appointment booked");
    } else {
        tracing::info!("Watch finished without a booking");
        notifier
            .broadcast(&Notification::new(
                Severity::Warning,
                "Watcher stopped",
                "shut down without a booking",
            ))
            .await;
    }

    let transitions = status.history();
    tracing::info!(
        transitions = transitions.len(),
        final_status = transitions
            .last()
            .map(|t| t.current.as_str())
            .unwrap_or("checking"),
        "Run summary"
    );

    // The forwarder ends once every status sender is gone
    drop(coordinator);
    drop(status);
    if let Err(e) = forwarder.await {
        tracing::warn!(error = %e, "Notification forwarder did not stop cleanly");
    }

    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let rotator = Arc::new(FingerprintRotator::new());
    let (min_ms, max_ms) = config.pre_request_delay();

    let client = DirectClient::with_config(
        &config.backend.base_url,
        rotator,
        config.backoff_policy(),
        config.backend.rate_limit_per_sec,
        config.request_timeout(),
    )
    .context("Failed to set up direct client")?
    .with_pre_request_delay(min_ms, max_ms);

    let today = chrono::Local::now().date_naive();
    let mut failures = 0usize;
    let queries = config.query_plan().queries_for(today);

    for query in &queries {
        match client.list_available_days(query).await {
            Ok(days) if days.is_empty() => {
                println!("office {}: no open days", query.office_id);
            }
            Ok(days) => {
                println!("office {}: {} open day(s)", query.office_id, days.len());
                for day in days {
                    println!("  {day}");
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("office {}: query failed: {e}", query.office_id);
            }
        }
    }

    if failures == queries.len() {
        anyhow::bail!("all availability queries failed");
    }
    Ok(())
}

/// Last message out the door when a fatal condition ends the process
fn abort_notification(reason: &str) -> Notification {
    Notification::new(Severity::Critical, "Watcher aborted", reason)
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("slotrace=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("slotrace=info,warn")
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
