//! Per-database projections of a server's raw timeline.

use crate::db::TimelineSample;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One sanitized sample of a single database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub connections: i64,
    pub size_gb: f64,
}

/// Splits a server timeline into chronological per-database series.
///
/// Samples are grouped by database name and stably sorted by timestamp, so
/// the collector's delivery order only matters for samples that share an
/// instant. Negative connection counts and negative or non-finite sizes are
/// coerced to zero.
#[derive(Debug, Default)]
pub struct MetricExtractor {
    series: HashMap<String, Vec<Observation>>,
}

impl MetricExtractor {
    pub fn new(samples: &[TimelineSample]) -> Self {
        let mut series: HashMap<String, Vec<Observation>> = HashMap::new();

        for s in samples {
            series
                .entry(s.database_name.clone())
                .or_default()
                .push(Observation {
                    timestamp: s.timestamp,
                    connections: sanitize_connections(&s.database_name, s.connections),
                    size_gb: sanitize_size(&s.database_name, s.size_gb),
                });
        }

        for observations in series.values_mut() {
            observations.sort_by_key(|o| o.timestamp);
        }

        Self { series }
    }

    /// All observations of a database, oldest first.
    pub fn observations(&self, name: &str) -> &[Observation] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Connection counts of a database, oldest first. Unknown names yield an
    /// empty sequence.
    pub fn connection_sequence(&self, name: &str) -> Vec<i64> {
        self.observations(name).iter().map(|o| o.connections).collect()
    }

    /// Size of the most recent sample with a non-zero size.
    pub fn latest_known_size(&self, name: &str) -> Option<f64> {
        self.observations(name)
            .iter()
            .rev()
            .find(|o| o.size_gb > 0.0)
            .map(|o| o.size_gb)
    }

    /// Size of the oldest sample with a non-zero size.
    pub fn first_known_size(&self, name: &str) -> Option<f64> {
        self.observations(name)
            .iter()
            .find(|o| o.size_gb > 0.0)
            .map(|o| o.size_gb)
    }

    pub fn last_sample_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.observations(name).last().map(|o| o.timestamp)
    }
}

pub(crate) fn sanitize_connections(database: &str, connections: i64) -> i64 {
    if connections < 0 {
        tracing::warn!(
            "MetricExtractor: negative connection count {} for {} coerced to 0",
            connections,
            database
        );
        return 0;
    }
    connections
}

pub(crate) fn sanitize_size(database: &str, size_gb: f64) -> f64 {
    if !size_gb.is_finite() || size_gb < 0.0 {
        tracing::warn!(
            "MetricExtractor: invalid size {} for {} coerced to 0",
            size_gb,
            database
        );
        return 0.0;
    }
    size_gb
}
