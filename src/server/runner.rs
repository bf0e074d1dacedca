//! Listener runner: drives `Server::serve` on its own task
//!
//! Terminal errors other than the benign `Closed` are published once onto the
//! error channel consumed by the shutdown coordinator. The sender is dropped
//! when the runner finishes, closing the channel.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::ServerError;
use super::http::Server;

/// Capacity of the listener error channel
///
/// At most one value is ever produced; the headroom keeps `try_send` from
/// ever failing on a full channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 100;

/// Create the listener error channel
pub fn error_channel() -> (mpsc::Sender<ServerError>, mpsc::Receiver<ServerError>) {
    mpsc::channel(ERROR_CHANNEL_CAPACITY)
}

pub struct ListenerRunner {
    server: Arc<Server>,
    errors: mpsc::Sender<ServerError>,
}

impl ListenerRunner {
    pub fn new(server: Arc<Server>, errors: mpsc::Sender<ServerError>) -> Self {
        Self { server, errors }
    }

    /// Spawn the runner onto its own task
    ///
    /// Returns immediately; await the handle to wait for the accept loop,
    /// including connection draining, to finish.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve until the server stops, reporting a fatal reason if there is one
    pub async fn run(self) {
        info!("[+] Start server");

        let reason = self.server.serve().await;
        if reason.is_benign() {
            debug!("Listener closed by shutdown");
        } else if let Err(e) = self.errors.try_send(reason) {
            // Only possible if the coordinator is gone
            error!(error = %e, "Failed to report listener error");
        }

        info!("[-] End server");
    }
}
