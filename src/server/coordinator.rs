//! Shutdown coordinator
//!
//! Single point of truth for "should the server stop now". Two independent
//! sources can ask for it:
//! - an OS termination signal
//! - a fatal error from the listener runner
//!
//! Whichever arrives first moves the coordinator from `Running` to
//! `ShuttingDown` and runs the bounded graceful shutdown. Anything arriving
//! after that is ignored.
//!
//! ```text
//! Running ──(signal | fatal error)──▶ ShuttingDown ──(stop returns)──▶ Stopped
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::ServerError;
use super::http::{Server, ShutdownOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Running,
    ShuttingDown,
    Stopped,
}

/// What asked for shutdown
#[derive(Debug)]
pub enum ShutdownTrigger {
    /// OS signal, by name
    Signal(&'static str),
    /// Fatal listener error
    ListenerFailed(ServerError),
    /// Error channel closed without a fatal error
    ListenerClosed,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(name) => write!(f, "signal {}", name),
            ShutdownTrigger::ListenerFailed(_) => write!(f, "listener failure"),
            ShutdownTrigger::ListenerClosed => write!(f, "listener closed"),
        }
    }
}

/// Result of `ShutdownCoordinator::trigger`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This trigger ran the shutdown routine
    Initiated(ShutdownOutcome),
    /// Shutdown was already underway or done
    Ignored,
}

/// Handle to the coordinator; clones share state
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    server: Arc<Server>,
    state: watch::Sender<CoordinatorState>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator for `server`, using the server's configured shutdown bound
    pub fn new(server: Arc<Server>) -> Self {
        let timeout = server.config().shutdown_timeout;
        let (state, _) = watch::channel(CoordinatorState::Running);

        Self {
            inner: Arc::new(Inner {
                server,
                state,
                timeout,
            }),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.borrow()
    }

    /// Wait until a shutdown has run to completion
    pub async fn stopped(&self) {
        let mut state = self.inner.state.subscribe();
        // Sender lives in `inner`, which we hold, so this can't fail
        let _ = state
            .wait_for(|s| *s == CoordinatorState::Stopped)
            .await;
    }

    /// Race `signal` against the listener error channel and shut down once
    ///
    /// Returns after the shutdown routine completes. A fatal listener error
    /// is handed back as `Err` only after shutdown has run, so the caller
    /// can log it and exit abnormally with cleanup already done.
    pub async fn run<S>(
        self,
        signal: S,
        mut errors: mpsc::Receiver<ServerError>,
    ) -> Result<TriggerOutcome, ServerError>
    where
        S: Future<Output = &'static str>,
    {
        let trigger = first_trigger(signal, &mut errors).await;
        let outcome = self.trigger(&trigger).await;

        match trigger {
            ShutdownTrigger::ListenerFailed(e) => Err(e),
            _ => Ok(outcome),
        }
    }

    /// Run the shutdown routine if nobody has yet
    pub async fn trigger(&self, trigger: &ShutdownTrigger) -> TriggerOutcome {
        let began = self.inner.state.send_if_modified(|state| {
            if *state == CoordinatorState::Running {
                *state = CoordinatorState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !began {
            debug!(trigger = %trigger, state = ?self.state(), "Shutdown already initiated, ignoring trigger");
            return TriggerOutcome::Ignored;
        }

        info!(trigger = %trigger, "Initiating graceful shutdown");
        let outcome = self.graceful_shutdown().await;
        self.inner.state.send_replace(CoordinatorState::Stopped);

        TriggerOutcome::Initiated(outcome)
    }

    async fn graceful_shutdown(&self) -> ShutdownOutcome {
        info!("[+] Start shutdown");
        let outcome = self.inner.server.shutdown(self.inner.timeout).await;
        match outcome {
            ShutdownOutcome::TimedOut => {
                warn!(timeout = ?self.inner.timeout, "Connections force-closed after deadline")
            }
            ShutdownOutcome::AlreadyShuttingDown => {
                debug!("Server was already shutting down")
            }
            ShutdownOutcome::Graceful => {}
        }
        info!("[-] End shutdown");
        outcome
    }
}

/// Wait for the first shutdown-worthy event
///
/// Benign listener closes are skipped. A closed channel means the runner
/// finished without a fatal error.
pub async fn first_trigger<S>(
    signal: S,
    errors: &mut mpsc::Receiver<ServerError>,
) -> ShutdownTrigger
where
    S: Future<Output = &'static str>,
{
    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Prefer a pending fatal error so it is never lost behind a signal
            biased;

            received = errors.recv() => match received {
                Some(e) if e.is_benign() => {
                    debug!("Ignoring benign listener close");
                }
                Some(e) => return ShutdownTrigger::ListenerFailed(e),
                None => return ShutdownTrigger::ListenerClosed,
            },
            name = &mut signal => return ShutdownTrigger::Signal(name),
        }
    }
}
