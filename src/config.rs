//! Server settings read from the environment.

use std::time::Duration;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_ttl_hours() -> u64 {
    12
}

/// Settings for the `web` binary. Every value has a default.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Registrations CSV loaded at startup, if set.
    pub registrations_csv: Option<String>,
    /// Draw sessions idle for longer than this are dropped.
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            registrations_csv: None,
            session_ttl: Duration::from_secs(default_session_ttl_hours() * 3600),
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT`, `REGISTRATIONS_CSV` and `SESSION_TTL_HOURS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] over any key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(default_host);
        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or_else(default_port);
        let registrations_csv = lookup("REGISTRATIONS_CSV").filter(|p| !p.trim().is_empty());
        let ttl_hours = lookup("SESSION_TTL_HOURS")
            .and_then(|h| h.trim().parse::<u64>().ok())
            .filter(|&h| h > 0)
            .unwrap_or_else(default_session_ttl_hours);
        Self {
            host,
            port,
            registrations_csv,
            session_ttl: Duration::from_secs(ttl_hours * 3600),
        }
    }
}
