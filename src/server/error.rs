//! Terminal errors reported by the accept loop

use std::net::SocketAddr;
use thiserror::Error;

/// Why `Server::serve` stopped
///
/// `Closed` is the benign sentinel: the listener was closed on purpose by a
/// shutdown. Every other variant is fatal. Accept errors are retried inside
/// the accept loop and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server closed")]
    Closed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// True for the intentional-close sentinel, false for real failures
    pub fn is_benign(&self) -> bool {
        matches!(self, ServerError::Closed)
    }
}
