//! HTTP server and process lifecycle
//!
//! Provides the status endpoint:
//! - `/v1/status` - 200 `{"status":"ok"}` while serving
//!
//! Also provides coordinated graceful shutdown: SIGTERM/SIGINT and fatal
//! listener errors both funnel into one time-bounded shutdown.

mod connection;
mod coordinator;
mod error;
mod http;
mod runner;
pub mod shutdown;
mod status;

pub use connection::ConnectionTimeouts;
pub use coordinator::{
    first_trigger, CoordinatorState, ShutdownCoordinator, ShutdownTrigger, TriggerOutcome,
};
pub use error::ServerError;
pub use http::{Server, ShutdownOutcome};
pub use runner::{error_channel, ListenerRunner, ERROR_CHANNEL_CAPACITY};
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownSignal, SignalSource};
pub use status::{build_router, respond_ok, Status, STATUS_PATH};

#[cfg(test)]
#[path = "status_test.rs"]
mod status_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "http_test.rs"]
mod http_tests;

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;
