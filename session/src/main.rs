//! Tally Console - keyboard-wedge scanner front end for a counting session.
//!
//! Reads scanner input from stdin, one code per line, and prints the
//! feedback the engine produces. Lines starting with `:` are commands:
//!
//! - `:select <item-id>` select an item
//! - `:qty <n>` set the selected item's quantity
//! - `:online`, `:degraded`, `:offline` change the simulated network health
//! - `:retry` resubmit failed deltas
//! - `:reset` clear the session
//! - `:status` print the current snapshot
//! - `:quit` exit

use std::sync::Arc;

use tally_engine::{NetworkHealth, Severity};
use tally_session::{
    config::ConfigError, health_channel, load_catalog, Config, MemoryBackend, ScanSession,
    SessionHandle, Signal,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_session=debug,tally_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let catalog_path = config
        .catalog_path
        .clone()
        .ok_or(ConfigError::MissingCatalogPath)?;
    let catalog = load_catalog(&catalog_path)?.into_catalog();

    tracing::info!(
        count_id = %config.settings.count_id,
        items = catalog.len(),
        "Starting Tally Console"
    );

    let backend = Arc::new(MemoryBackend::from_catalog(&catalog));
    let (health_tx, health_rx) = health_channel();
    let (signals_tx, mut signals) = mpsc::unbounded_channel();
    let session = ScanSession::spawn(
        config.settings.clone(),
        catalog,
        Arc::clone(&backend),
        health_rx,
        signals_tx,
    )?;

    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            print_signal(&signal);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !handle_line(&session, &health_tx, &line)? {
            break;
        }
    }

    let last = session.snapshot();
    session.shutdown().await?;
    tracing::info!(
        delta_writes = backend.apply_calls(),
        quantity_writes = backend.set_calls(),
        barcode_writes = backend.assign_calls(),
        "Tally Console stopped"
    );
    if last.has_unsaved() {
        tracing::warn!(
            pending = last.pending_flushes.len(),
            increments = last.unsent_increments,
            "exiting with unsaved scans"
        );
    }
    Ok(())
}

/// Returns `false` when the console should exit.
fn handle_line(
    session: &SessionHandle,
    health: &watch::Sender<NetworkHealth>,
    line: &str,
) -> tally_session::Result<bool> {
    let Some(command) = line.trim().strip_prefix(':') else {
        session.scan(line)?;
        return Ok(true);
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("select"), Some(item_id)) => session.select_item(item_id)?,
        (Some("qty"), Some(qty)) => match qty.parse() {
            Ok(qty) => session.set_qty(qty)?,
            Err(_) => println!("not a quantity: {qty}"),
        },
        (Some("online"), None) => set_health(health, NetworkHealth::Online),
        (Some("degraded"), None) => set_health(health, NetworkHealth::Degraded),
        (Some("offline"), None) => set_health(health, NetworkHealth::Offline),
        (Some("retry"), None) => session.retry_pending()?,
        (Some("reset"), None) => session.reset()?,
        (Some("status"), None) => match session.snapshot().to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize snapshot"),
        },
        (Some("quit"), None) => return Ok(false),
        _ => println!("unknown command: {line}"),
    }
    Ok(true)
}

fn set_health(health: &watch::Sender<NetworkHealth>, value: NetworkHealth) {
    health.send_replace(value);
}

fn print_signal(signal: &Signal) {
    match signal {
        Signal::Toast(feedback) => {
            let marker = match feedback.severity {
                Severity::Info => "i",
                Severity::Success => "+",
                Severity::Warning => "!",
                Severity::Error => "x",
            };
            println!("[{marker}] {}: {}", feedback.title, feedback.description);
        }
        Signal::Vibrate { millis } => tracing::trace!(millis, "vibrate"),
    }
}
