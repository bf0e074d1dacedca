//! Server handle: the listener, its accept loop, and graceful stop
//!
//! `serve` owns the accept loop. `shutdown` may be called from any task, any
//! number of times; only the first call does anything.
//!
//! ```text
//! shutdown()                         serve()
//!   run hooks (registration order)     accept ──▶ spawn connection task
//!   set `stop` ─────────────────────▶  drop listener, close connections
//!   wait `drained` (bounded)   ◀─────  drain JoinSet, set `drained`
//!   on timeout set `force` ─────────▶  abort remaining connections
//! ```

use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::connection::{serve_connection, ConnectionTimeouts};
use super::error::ServerError;
use super::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
use super::status::build_router;
use crate::config::ServerConfig;

type ShutdownHook = Box<dyn FnOnce() + Send + 'static>;

/// Result of a `Server::shutdown` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All connections drained before the deadline
    Graceful,
    /// Deadline hit; remaining connections were force-closed
    TimedOut,
    /// Another call already started shutdown; nothing was done
    AlreadyShuttingDown,
}

/// The running listener
///
/// Shared as `Arc<Server>` between the listener runner and the shutdown
/// coordinator.
pub struct Server {
    config: ServerConfig,
    router: Router,
    hooks: Mutex<Vec<ShutdownHook>>,
    shutting_down: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
    /// Stop accepting and close connections gracefully
    stop: ShutdownController,
    /// Abort whatever is still connected
    force: ShutdownController,
    /// Set once the accept loop has exited and every connection is gone
    drained: Arc<ShutdownController>,
}

impl Server {
    /// Create a server serving the status routes
    pub fn new(config: ServerConfig) -> Self {
        let router = build_router(config.write_timeout);
        Self::with_router(config, router)
    }

    /// Create a server with a custom route table
    ///
    /// The write timeout is only applied by `new`; callers supplying their own
    /// router own that layer.
    pub fn with_router(config: ServerConfig, router: Router) -> Self {
        let (stop, _) = shutdown_channel();
        let (force, _) = shutdown_channel();
        let (drained, _) = shutdown_channel();

        Self {
            config,
            router,
            hooks: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            local_addr: OnceLock::new(),
            stop,
            force,
            drained: Arc::new(drained),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address actually bound, once `serve` has bound the listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Register a callback to run once when shutdown begins
    ///
    /// Hooks run synchronously in registration order, before connections are
    /// closed. Hooks registered after shutdown started never run.
    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Signal that completes once the accept loop has exited and every
    /// connection is gone
    pub fn drained(&self) -> ShutdownSignal {
        self.drained.signal()
    }

    /// Bind and serve until shutdown or a fatal error
    ///
    /// Always returns the reason serving stopped. After a requested shutdown
    /// that is `ServerError::Closed`, returned once every connection has
    /// drained or been force-closed. A bind failure is fatal and is returned
    /// immediately. Accept errors never end serving: per-connection ones are
    /// skipped, the rest (fd exhaustion and the like) are retried with
    /// backoff.
    pub async fn serve(&self) -> ServerError {
        let (reason, connections) = self.accept_loop().await;
        let drain = drain(connections, self.force.signal(), Arc::clone(&self.drained));

        if reason.is_benign() {
            drain.await;
        } else {
            tokio::spawn(drain);
        }
        reason
    }

    async fn accept_loop(&self) -> (ServerError, JoinSet<()>) {
        let mut connections = JoinSet::new();

        if self.stop.is_shutdown() {
            return (ServerError::Closed, connections);
        }

        let addr = self.config.bind_addr;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => return (ServerError::Bind { addr, source }, connections),
        };
        let bound = listener.local_addr().unwrap_or(addr);
        let _ = self.local_addr.set(bound);
        // Log after successful bind - server is actually listening
        info!(
            address = %bound,
            read_timeout = ?self.config.read_timeout,
            write_timeout = ?self.config.write_timeout,
            idle_timeout = ?self.config.idle_timeout,
            "Server listening"
        );

        let timeouts = ConnectionTimeouts {
            read: self.config.read_timeout,
            idle: self.config.idle_timeout,
        };
        let mut stop = self.stop.signal();
        let mut backoff = AcceptBackoff::default();

        loop {
            tokio::select! {
                _ = stop.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        backoff.reset();
                        debug!(peer = %peer, active = connections.len() + 1, "Connection accepted");
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            self.router.clone(),
                            timeouts,
                            self.stop.signal(),
                        ));
                    }
                    Err(e) => {
                        let Some(delay) = backoff.on_error(&e) else {
                            debug!(error = %e, "Peer dropped before accept");
                            continue;
                        };
                        warn!(error = %e, retry_in = ?delay, "Accept failed");
                        tokio::select! {
                            _ = stop.wait() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
                // Reap finished connections so the set doesn't grow unbounded
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // Refuse new connections from here on
        drop(listener);
        debug!(open = connections.len(), "Accept loop stopped");

        (ServerError::Closed, connections)
    }

    /// Stop the server gracefully, bounded by `timeout`
    ///
    /// The first call runs the shutdown hooks, stops the accept loop and waits
    /// for connections to drain. If the deadline passes, remaining
    /// connections are aborted and `TimedOut` is returned. Later calls return
    /// `AlreadyShuttingDown` immediately.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
            return ShutdownOutcome::AlreadyShuttingDown;
        }

        self.run_hooks();
        self.stop.shutdown();

        let mut drained = self.drained.signal();
        match tokio::time::timeout(timeout, drained.wait()).await {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => {
                warn!(timeout = ?timeout, "Graceful shutdown timed out");
                self.force.shutdown();
                ShutdownOutcome::TimedOut
            }
        }
    }

    fn run_hooks(&self) {
        let hooks = std::mem::take(
            &mut *self
                .hooks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        if !hooks.is_empty() {
            debug!(count = hooks.len(), "Running shutdown hooks");
        }
        for hook in hooks {
            hook();
        }
    }
}

/// Retry policy for failed `accept()` calls
///
/// Errors tied to a single peer are retried at once. Anything else is
/// usually resource exhaustion, so the loop backs off from 5ms, doubling up
/// to 1s, until an accept succeeds.
#[derive(Debug, Default)]
pub(crate) struct AcceptBackoff {
    delay: Option<Duration>,
}

impl AcceptBackoff {
    const INITIAL: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_secs(1);

    /// Delay before the next accept, or `None` to retry immediately
    pub(crate) fn on_error(&mut self, error: &std::io::Error) -> Option<Duration> {
        if is_connection_error(error) {
            return None;
        }
        let next = match self.delay {
            Some(delay) => (delay * 2).min(Self::MAX),
            None => Self::INITIAL,
        };
        self.delay = Some(next);
        Some(next)
    }

    pub(crate) fn reset(&mut self) {
        self.delay = None;
    }
}

fn is_connection_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}

/// Wait for connection tasks to finish, aborting them if `force` fires, then
/// set `drained`
async fn drain(
    mut connections: JoinSet<()>,
    mut force: ShutdownSignal,
    drained: Arc<ShutdownController>,
) {
    loop {
        tokio::select! {
            joined = connections.join_next() => {
                if joined.is_none() {
                    debug!("All connections drained");
                    break;
                }
            }
            _ = force.wait() => {
                warn!(remaining = connections.len(), "Force-closing connections");
                connections.abort_all();
                while connections.join_next().await.is_some() {}
                break;
            }
        }
    }
    drained.shutdown();
}
