//! statusd - a minimal status service with coordinated graceful shutdown
//!
//! The process runs two cooperating tasks:
//! - a listener runner that owns the accept loop and reports terminal errors
//! - a shutdown coordinator that races OS signals against those errors and
//!   drives a single, time-bounded graceful shutdown

pub mod config;
pub mod server;

pub use config::{ConfigError, ServerConfig};
