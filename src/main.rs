use statusd::server::{
    error_channel, ListenerRunner, Server, ShutdownCoordinator, SignalSource, TriggerOutcome,
};
use statusd::ServerConfig;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Auxiliary cleanup run when shutdown begins
fn on_shutdown() {
    info!("Running shutdown hook");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        shutdown_timeout = ?config.shutdown_timeout,
        "Starting statusd"
    );

    // Register before serving so no signal is missed
    let mut signals = SignalSource::register()?;

    let server = Arc::new(Server::new(config));
    server.on_shutdown(on_shutdown);

    let (error_tx, error_rx) = error_channel();
    let listener_handle = ListenerRunner::new(server.clone(), error_tx).start();

    let coordinator = ShutdownCoordinator::new(server);
    let coordinator_handle =
        tokio::spawn(coordinator.run(async move { signals.recv().await }, error_rx));

    // Block until the accept loop (including connection draining) finishes
    if let Err(e) = listener_handle.await {
        error!(error = %e, "Listener task panicked");
    }

    let exit = match coordinator_handle.await {
        Ok(Ok(TriggerOutcome::Initiated(outcome))) => {
            info!(outcome = ?outcome, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(Ok(TriggerOutcome::Ignored)) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "Fatal listener error");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Shutdown coordinator panicked");
            ExitCode::FAILURE
        }
    };

    info!("[-] end");
    Ok(exit)
}
