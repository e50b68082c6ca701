//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation of one database on a monitored server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSample {
    pub timestamp: DateTime<Utc>,
    pub database_name: String,
    pub connections: i64,
    pub size_gb: f64,
}

impl TimelineSample {
    pub fn new(timestamp: DateTime<Utc>, database_name: &str, connections: i64, size_gb: f64) -> Self {
        Self {
            timestamp,
            database_name: database_name.to_string(),
            connections,
            size_gb,
        }
    }
}

/// A roster entry: a database known to exist, or to have existed, on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub name: String,
    /// False once the database has been dropped but still has history.
    pub exists: bool,
    pub creation_time: Option<DateTime<Utc>>,
}

impl DatabaseRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exists: true,
            creation_time: None,
        }
    }
}

/// Timeline row counts for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineStats {
    pub server_id: i64,
    pub databases: i64,
    pub samples: i64,
    pub first_sample: Option<DateTime<Utc>>,
    pub last_sample: Option<DateTime<Utc>>,
}
