//! Per-connection HTTP/1 serving
//!
//! Each accepted socket is served on its own task with:
//! - a header-read deadline (`read` timeout, enforced by hyper's timer)
//! - an idle watchdog that gracefully closes keep-alive connections with
//!   no in-flight request for longer than the `idle` timeout
//! - a stop signal that asks the connection to finish its current request
//!   and close

use axum::{body::Body, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::{debug, trace};

use super::shutdown::ShutdownSignal;

/// Timeouts applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimeouts {
    pub read: Duration,
    pub idle: Duration,
}

/// Request activity on one connection
///
/// Tracks the number of requests in flight and when the last one finished.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionActivity {
    inner: Arc<ActivityInner>,
}

#[derive(Debug)]
struct ActivityInner {
    opened: Instant,
    in_flight: AtomicUsize,
    /// Millis since `opened` at which the connection was last active
    last_active_ms: AtomicU64,
}

impl ConnectionActivity {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                opened: Instant::now(),
                in_flight: AtomicUsize::new(0),
                last_active_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Mark a request as started. The returned guard marks it finished on drop.
    pub(crate) fn begin_request(&self) -> RequestGuard {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        RequestGuard {
            activity: self.clone(),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        let millis = u64::try_from(self.inner.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.inner.last_active_ms.fetch_max(millis, Ordering::SeqCst);
    }

    fn last_active(&self) -> Instant {
        self.inner.opened
            + Duration::from_millis(self.inner.last_active_ms.load(Ordering::SeqCst))
    }

    /// Earliest instant at which the connection could be considered idle
    pub(crate) fn idle_deadline(&self, idle: Duration) -> Instant {
        if self.in_flight() > 0 {
            Instant::now() + idle
        } else {
            self.last_active() + idle
        }
    }

    pub(crate) fn is_idle(&self, idle: Duration) -> bool {
        self.in_flight() == 0 && self.last_active().elapsed() >= idle
    }
}

/// Held for the lifetime of one request
#[derive(Debug)]
pub(crate) struct RequestGuard {
    activity: ConnectionActivity,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.touch();
        self.activity.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serve HTTP/1 requests on `stream` until the peer leaves, the connection
/// goes idle, or `stop` fires.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    timeouts: ConnectionTimeouts,
    mut stop: ShutdownSignal,
) {
    let activity = ConnectionActivity::new();

    let service = {
        let activity = activity.clone();
        service_fn(move |request: Request<Incoming>| {
            let router = router.clone();
            let guard = activity.begin_request();
            async move {
                let _guard = guard;
                router.oneshot(request.map(Body::new)).await
            }
        })
    };

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let idle_deadline = activity.idle_deadline(timeouts.idle);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "Connection ended with error");
                }
                break;
            }
            _ = stop.wait(), if !closing => {
                trace!(peer = %peer, in_flight = activity.in_flight(), "Closing connection for shutdown");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = tokio::time::sleep_until(idle_deadline), if !closing => {
                if activity.is_idle(timeouts.idle) {
                    debug!(peer = %peer, "Closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    trace!(peer = %peer, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_guard_tracks_in_flight() {
        let activity = ConnectionActivity::new();
        assert_eq!(activity.in_flight(), 0);

        let first = activity.begin_request();
        assert_eq!(activity.in_flight(), 1);

        drop(first);
        assert_eq!(activity.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_connection_is_never_idle() {
        let activity = ConnectionActivity::new();
        let idle = Duration::from_secs(10);

        let guard = activity.begin_request();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(!activity.is_idle(idle));
        assert!(activity.idle_deadline(idle) > Instant::now());

        drop(guard);
        assert!(!activity.is_idle(idle), "just finished a request");
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_connection_becomes_idle() {
        let activity = ConnectionActivity::new();
        let idle = Duration::from_secs(10);

        drop(activity.begin_request());
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!activity.is_idle(idle));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(activity.is_idle(idle));
        assert!(activity.idle_deadline(idle) <= Instant::now());
    }
}
