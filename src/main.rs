//! Buffered Sink demo driver
//!
//! Installs the buffering layer next to the regular console formatter, emits
//! a handful of log events one second apart, then shuts down and waits for
//! every buffered entry to be delivered.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BUFFERED_SINK_FLUSH_INTERVAL_SECS`: Seconds between flushes (default: 10)
//! - `BUFFERED_SINK_FLUSH_CAPACITY`: Entries that trigger a flush (default: 10)
//! - `BUFFERED_SINK_MAX_BUFFER_ENTRIES`: Entries kept before evicting (default: 100)
//! - `BUFFERED_SINK_SHUTDOWN_TIMEOUT_SECS`: Give up draining after this long (default: never)
//! - `BUFFERED_SINK_DESTINATION`: `console` or `http` (default: console)
//! - `RUST_LOG`: Logging level filter (default: info)
//!
//! Run with `BUFFERED_SINK_FLUSH_CAPACITY=5 BUFFERED_SINK_FLUSH_INTERVAL_SECS=5`
//! to see one size-triggered batch of five followed by the drain on shutdown.

use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use buffered_sink::config::Config;
use buffered_sink::handler::{BufferingHandler, EntryProducer};
use buffered_sink::layer::BufferingLayer;
use buffered_sink::sink::Destination;

/// Number of demo events to emit
const DEMO_ENTRIES: usize = 7;

/// Pause between demo events
const DEMO_ENTRY_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(None);
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let destination = match Destination::from_config(&config) {
        Ok(destination) => destination,
        Err(e) => {
            init_tracing(None);
            error!(error = %e, "Failed to create destination");
            std::process::exit(1);
        }
    };

    let handler = BufferingHandler::new(config.handler_config(), destination);
    init_tracing(Some(handler.producer()));

    info!(
        destination = %config.destination,
        flush_capacity = config.flush_capacity,
        flush_interval_secs = config.flush_interval.as_secs(),
        max_buffer_entries = config.max_buffer_entries,
        "Configuration loaded"
    );

    run_demo().await;

    info!("Initiating graceful shutdown...");
    match handler.shutdown().await {
        Ok(stats) => {
            info!(
                entries_sent = stats.entries_sent,
                batches_sent = stats.batches_sent,
                failed_sends = stats.failed_sends,
                entries_evicted = stats.entries_evicted,
                "Buffered sink stopped"
            );
        }
        Err(e) => {
            error!(error = %e, "Buffered sink did not drain cleanly");
            std::process::exit(1);
        }
    }
}

/// Initialize tracing: a compact stderr formatter, plus the buffering layer
/// once a handler exists.
fn init_tracing(producer: Option<EntryProducer>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(producer.map(BufferingLayer::new))
        .init();
}

/// Emit the demo events, stopping early on Ctrl+C.
async fn run_demo() {
    for sequence in 0..DEMO_ENTRIES {
        info!(sequence = sequence, "Hello log World");

        tokio::select! {
            _ = tokio::time::sleep(DEMO_ENTRY_INTERVAL) => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown signal received, stopping early");
                break;
            }
        }
    }
}
