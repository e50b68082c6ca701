//! Server-wide trend aggregation for charts.

use crate::db::TimelineSample;

use super::metrics::{sanitize_connections, sanitize_size};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals across every database of a server at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub total_connections: i64,
    pub total_size_gb: f64,
}

/// Collapse all samples sharing an exact timestamp into one point.
///
/// Points come out in ascending timestamp order. There is no bucketing:
/// samples a millisecond apart produce two points.
pub fn aggregate_server_trend(samples: &[TimelineSample]) -> Vec<TrendPoint> {
    let mut totals: BTreeMap<DateTime<Utc>, (i64, f64)> = BTreeMap::new();

    for s in samples {
        let entry = totals.entry(s.timestamp).or_insert((0, 0.0));
        entry.0 = entry.0.saturating_add(sanitize_connections(&s.database_name, s.connections));
        entry.1 += sanitize_size(&s.database_name, s.size_gb);
    }

    totals
        .into_iter()
        .map(|(timestamp, (total_connections, total_size_gb))| TrendPoint {
            timestamp,
            total_connections,
            total_size_gb,
        })
        .collect()
}
