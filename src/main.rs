//! identd binary: load configuration, start the server, run until Ctrl-C.

use identd::config::Config;
use identd::{ErrorEvent, IdentServer};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        identity = %config.identity,
        port = config.port,
        timeout_ms = config.timeout_ms,
        "Starting identd server"
    );

    let server = IdentServer::with_port(&config.identity, config.port)?;
    server.set_timeout(Duration::from_millis(config.timeout_ms));

    server.subscribe(log_error_event);
    server.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.shutdown();

    Ok(())
}

/// Default observer installed by the binary: log every reported failure.
fn log_error_event(event: &ErrorEvent) {
    match (event.explicit_message(), event.cause()) {
        (Some(message), Some(cause)) => error!(error = %cause, "{message}"),
        (Some(message), None) => error!("{message}"),
        (None, Some(cause)) => error!(error = %cause, "ident failure"),
        (None, None) => error!("ident failure with no details"),
    }
}
