//! Queue circuit breaker daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                QUEUE CIRCUIT BREAKER                  │
//!                 │                                                       │
//!   queue         │  ┌──────────┐   ┌──────────────┐   ┌──────────────┐  │
//!   processor ────┼─▶│ routing  │──▶│   breaker    │──▶│    store     │  │
//!                 │  │ (rules)  │   │   engine     │   │ (shared)     │  │
//!                 │  └──────────┘   └──────┬───────┘   └──────▲───────┘  │
//!                 │                        │                  │          │
//!                 │                        ▼                  │          │
//!   queueing      │                ┌──────────────┐   ┌───────┴──────┐  │
//!   engine   ◀────┼────────────────│  queue_lock  │◀──│  scheduler   │  │
//!   (locks)       │                │   gateway    │   │ (leases)     │  │
//!                 │                └──────────────┘   └──────────────┘  │
//!                 │                                                       │
//!                 │  config (watch/reload) · admin API · observability    │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use queue_circuit_breaker::config::loader::load_config;
use queue_circuit_breaker::config::watcher::ConfigWatcher;
use queue_circuit_breaker::lifecycle::signals::wait_for_shutdown_signal;
use queue_circuit_breaker::lifecycle::{CircuitBreakerService, Shutdown};
use queue_circuit_breaker::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "queue-circuit-breaker")]
#[command(about = "Distributed circuit breaker for queued gateway requests", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "breaker.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "queue-circuit-breaker starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let service = CircuitBreakerService::start(config.clone(), shutdown.clone()).await?;

    if config.admin.enabled {
        service.start_admin_server(&config.admin).await?;
    }

    let (watcher, mut updates) = ConfigWatcher::new(&args.config, config.clone());
    let _watcher = if args.no_watch {
        None
    } else {
        match watcher.run() {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        }
    };

    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            Some(new_config) = updates.recv() => {
                service.apply_config(new_config).await;
            }
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    service.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
