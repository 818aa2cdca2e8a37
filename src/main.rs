//! Stratum Mining Client - Main Application
//!
//! Connects to the pool, starts the CPU workers and the rate reporter, and
//! runs until the connection fails or the process is signalled.

use stratum_mining_client::{
    config::Config,
    crypto::hasher_for,
    hashrate::RateAggregator,
    stratum::{SessionState, StratumClient},
    utils::init_logging,
    worker::WorkerPool,
    Error, Result, APP_NAME, APP_VERSION,
};

use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match Config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", APP_NAME, e);
            process::exit(2);
        }
    };

    if config.print_config {
        match config.to_yaml() {
            Ok(yaml) => {
                println!("{}", yaml);
                return;
            }
            Err(e) => {
                eprintln!("{}: {}", APP_NAME, e);
                process::exit(2);
            }
        }
    }

    let _log_guard = match init_logging(config.log_level, config.log_format, config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}: {}", APP_NAME, e);
            process::exit(2);
        }
    };

    info!("Starting {} v{}", APP_NAME, APP_VERSION);

    tokio::select! {
        result = run(config) => match result {
            Ok(()) => {
                info!("Share submitter finished, exiting");
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Mining session ended");
                process::exit(1);
            }
        },
        signal = shutdown_signal() => match signal {
            Ok(name) => {
                info!("Received {}, exiting", name);
                process::exit(0);
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
                process::exit(1);
            }
        },
    }
}

/// Wire the session together and block on the receive loop
async fn run(config: Config) -> Result<()> {
    let state = Arc::new(SessionState::new());
    let hasher = hasher_for(config.algorithm);
    info!(algorithm = hasher.name(), "Using proof-of-work digest");
    let (share_tx, share_rx) = mpsc::unbounded_channel();

    // Workers start first and idle until the handshake and the first job land
    let _workers = WorkerPool::start(
        &config.worker_pool_config()?,
        Arc::clone(&state),
        hasher,
        share_tx,
    )?;

    let cancellation = CancellationToken::new();
    let aggregator = RateAggregator::new(config.hashrate_interval_duration()?, Arc::clone(state.stats()));
    tokio::spawn(aggregator.run(cancellation.clone()));

    let client_config = config.client_config()?;
    let mut client = StratumClient::connect(client_config, Arc::clone(&state)).await?;
    client.handshake().await?;

    let submitter = tokio::spawn(client.submitter().run(share_rx));

    let result = tokio::select! {
        result = client.run() => result,
        joined = submitter => joined
            .map_err(|e| Error::invalid_state(format!("share submitter task failed: {}", e)))
            .and_then(|result| result),
    };

    cancellation.cancel();
    result
}

/// Resolve with the signal name on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
