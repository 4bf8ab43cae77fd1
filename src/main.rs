use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use push_relay::cli::{Cli, Command};
use push_relay::clock::{Clock, SystemClock};
use push_relay::forward::HttpTransport;
use push_relay::log::{DailyFileLog, EventLog};
use push_relay::relay::{EventOutcome, InboundEvent, Relay};
use push_relay::server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "push_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.relay.into_config().context("invalid configuration")?;

    let transport =
        HttpTransport::new(config.forward_timeout()).context("failed to build HTTP client")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let log = DailyFileLog::new(config.log_dir(), Arc::clone(&clock));
    let relay = Relay::new(config, transport, clock);

    relay.prepare_dirs().with_context(|| {
        format!(
            "failed to create directories under {}",
            relay.config().data_dir().display()
        )
    })?;

    match cli.command {
        Command::Serve { bind } => {
            let report = relay.maintain().context("retention pass failed")?;
            info!(pruned = report.pruned, reclaimed = report.reclaimed, "Startup maintenance done");

            let app = build_router(AppState::new(relay, log));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!("listening on {}", bind);
            axum::serve(listener, app).await.context("server error")?;
        }
        Command::Forward { query, force_queue } => {
            let event = InboundEvent::new(query, force_queue);
            let log = log.with_debug(event.debug_requested());
            let (outcome, report) = relay.handle_event(&event, &log).await;
            match outcome {
                EventOutcome::Delivered => info!(drain = ?report, "Event delivered"),
                EventOutcome::Queued => info!("Event queued"),
                EventOutcome::Empty => info!("No query string, nothing forwarded"),
            }
            log.record("Finish!", false);
        }
        Command::Drain => {
            let report = relay.drain(&log).await.context("drain failed")?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Maintain => {
            let report = relay.maintain().context("retention pass failed")?;
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}
