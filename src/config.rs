use std::{net::SocketAddr, time::Duration};

use crate::error::{Error, Result};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const CORS_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Settings for the HTTP server, built once at start-up and shared with
/// every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Upper bound on a single search; the search is cancelled once it
    /// elapses.
    pub request_timeout: Duration,
    pub cors_max_age: Duration,
}

impl ServerConfig {
    pub fn new(bind: SocketAddr, request_timeout_secs: u64) -> Result<Self> {
        if request_timeout_secs == 0 {
            return Err(Error::Config(
                "request timeout must be at least one second".into(),
            ));
        }

        Ok(Self {
            bind,
            request_timeout: Duration::from_secs(request_timeout_secs),
            cors_max_age: CORS_MAX_AGE,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cors_max_age: CORS_MAX_AGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, DEFAULT_BIND.parse().unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let bind = DEFAULT_BIND.parse().unwrap();
        assert!(matches!(ServerConfig::new(bind, 0), Err(Error::Config(_))));
        assert_eq!(
            ServerConfig::new(bind, 3).unwrap().request_timeout,
            Duration::from_secs(3)
        );
    }
}
