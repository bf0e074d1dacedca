//! Shutdown latches and OS signal handling
//!
//! A latch is a one-way `false -> true` flag built on `tokio::sync::watch`:
//! - the controller side flips it (idempotent)
//! - any number of cloned signals can check it or wait for it
//!
//! `Server` uses three latches: stop accepting, force-close, and drained.

use tokio::sync::watch;
use tracing::{debug, info};

/// Receiving half of a shutdown latch
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until the latch is set
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                break;
            }
        }
    }

    /// Check if the latch was set (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sending half of a shutdown latch
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Set the latch
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub fn shutdown(&self) -> bool {
        let flipped = self.sender.send_if_modified(|set| !std::mem::replace(set, true));
        if flipped {
            debug!("Shutdown latch set");
        }
        flipped
    }

    /// Hand out another receiver for this latch
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Create a new latch
///
/// Returns (controller, signal) where:
/// - controller: Used to set the latch
/// - signal: Cloned and passed to whoever needs to observe it
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Registered OS termination signals
///
/// Handlers are installed in `register` so that a registration failure
/// surfaces at startup instead of inside the coordinator task.
#[cfg(unix)]
pub struct SignalSource {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalSource {
    /// Install SIGTERM and SIGINT handlers
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for SIGTERM or SIGINT, returning the signal name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
                "SIGTERM"
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
                "SIGINT"
            }
        }
    }
}

/// Ctrl+C source (Windows)
#[cfg(not(unix))]
pub struct SignalSource {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl SignalSource {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        info!("Received Ctrl+C");
        "CTRL_C"
    }
}
