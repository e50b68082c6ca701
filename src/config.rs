//! Configuration module for pgtrail.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "pgtrail.db")
    pub db_path: String,
    /// Databases per page in list views (default: 20)
    pub page_size: usize,
    /// History window used when a request gives no start time (default: 30)
    pub default_range_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "pgtrail.db".to_string(),
            page_size: 20,
            default_range_days: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PGTRAIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PGTRAIL_DB_PATH`: Database file path (default: "pgtrail.db")
    /// - `PGTRAIL_PAGE_SIZE`: Page size, at least 1 (default: 20)
    /// - `PGTRAIL_DEFAULT_RANGE_DAYS`: Default history window (default: 30)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "PGTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("PGTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(size) = parse_var::<usize, _>(&lookup, "PGTRAIL_PAGE_SIZE") {
            if size > 0 {
                cfg.page_size = size;
            }
        }

        if let Some(days) = parse_var::<i64, _>(&lookup, "PGTRAIL_DEFAULT_RANGE_DAYS") {
            if days > 0 {
                cfg.default_range_days = days;
            }
        }

        cfg
    }
}

fn parse_var<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
