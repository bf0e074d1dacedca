//! Server configuration
//!
//! Defaults match the hardcoded skeleton (`0.0.0.0:8080`, read 5s, write 10s,
//! idle 10s). Deployments can override them through `STATUSD_*` environment
//! variables; nothing is read from disk.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address (all interfaces, port 8080)
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Default time allowed to read a request head
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed to produce and write a response
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a keep-alive connection may sit idle
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the graceful-shutdown routine
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_BIND_ADDR: &str = "STATUSD_BIND_ADDR";
pub const ENV_READ_TIMEOUT_SECS: &str = "STATUSD_READ_TIMEOUT_SECS";
pub const ENV_WRITE_TIMEOUT_SECS: &str = "STATUSD_WRITE_TIMEOUT_SECS";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "STATUSD_IDLE_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: expected a socket address")]
    InvalidAddr { var: &'static str, value: String },

    #[error("invalid value {value:?} for {var}: expected a positive number of seconds")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Listener and shutdown settings for a `Server`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Build config from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build config from an arbitrary variable lookup
    ///
    /// Split out from `from_env` so tests don't have to mutate the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddr {
                    var: ENV_BIND_ADDR,
                    value,
                })?;
        }
        if let Some(value) = lookup(ENV_READ_TIMEOUT_SECS) {
            config.read_timeout = parse_secs(ENV_READ_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_WRITE_TIMEOUT_SECS) {
            config.write_timeout = parse_secs(ENV_WRITE_TIMEOUT_SECS, value)?;
        }
        if let Some(value) = lookup(ENV_IDLE_TIMEOUT_SECS) {
            config.idle_timeout = parse_secs(ENV_IDLE_TIMEOUT_SECS, value)?;
        }

        Ok(config)
    }

    /// Override the bind address (tests bind `127.0.0.1:0`)
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout { var, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
