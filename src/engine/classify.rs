//! Activity classification of databases from their connection history.
//!
//! Each database gets exactly one [`Status`]. Rules are checked in a fixed
//! order and the first match wins:
//!
//! 1. no samples for at least `dead_days` days: [`Status::Dead`]
//! 2. the same positive connection count across the stability window and at
//!    least `static_connections_days` days since the last sample:
//!    [`Status::Static`]
//! 3. an average of connections above zero but below
//!    `low_activity_threshold`: [`Status::Warning`]
//! 4. otherwise [`Status::Healthy`]
//!
//! The result depends only on the samples, the criteria and `now`.

use crate::db::{DatabaseRecord, TimelineSample};

use super::criteria::Criteria;
use super::metrics::MetricExtractor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of most recent samples checked for a constant connection count.
pub const STABILITY_WINDOW: usize = 10;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Warning,
    Static,
    Dead,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Warning => "warning",
            Status::Static => "static",
            Status::Dead => "dead",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole days since the last sample. `Never` orders above every day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    Days(i64),
    Never,
}

impl Recency {
    /// Floor of the elapsed days between `last` and `now`.
    pub fn since(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match last {
            Some(last) => {
                Recency::Days((now - last).num_milliseconds().div_euclid(MILLIS_PER_DAY))
            }
            None => Recency::Never,
        }
    }

    pub fn days(self) -> Option<i64> {
        match self {
            Recency::Days(d) => Some(d),
            Recency::Never => None,
        }
    }

    /// True when at least `threshold` days have passed.
    pub fn at_least(self, threshold: i64) -> bool {
        self >= Recency::Days(threshold)
    }
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recency::Days(d) => write!(f, "{}", d),
            Recency::Never => f.write_str("Never"),
        }
    }
}

/// Why a database got its status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Reason {
    None,
    NoActivity { days: Recency },
    ConstantConnections { average: f64, static_days: i64 },
    LowActivity { average: f64 },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::None => Ok(()),
            Reason::NoActivity { days: Recency::Days(d) } => {
                write!(f, "No activity for {} days", d)
            }
            Reason::NoActivity { days: Recency::Never } => f.write_str("No activity recorded"),
            Reason::ConstantConnections { average, static_days } => write!(
                f,
                "Constant connection count ({}) for more than {} days",
                format_count(*average),
                static_days
            ),
            Reason::LowActivity { average } => write!(
                f,
                "Low activity (average {} connections)",
                format_count(*average)
            ),
        }
    }
}

/// Whole numbers print bare, anything else with two decimals.
fn format_count(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Output of the classifier for one connection history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityVerdict {
    pub status: Status,
    pub reason: Reason,
    pub days_since_activity: Recency,
    pub average_connections: f64,
    pub has_unchanged_connections: bool,
}

/// Classify one connection history.
///
/// `connections` must be oldest first; `last_sample` is the timestamp of the
/// newest sample, if any.
pub fn classify_activity(
    connections: &[i64],
    last_sample: Option<DateTime<Utc>>,
    criteria: &Criteria,
    now: DateTime<Utc>,
) -> ActivityVerdict {
    let days_since_activity = Recency::since(last_sample, now);
    let (has_unchanged_connections, average_connections) = stability(connections);

    let (status, reason) = if days_since_activity.at_least(criteria.dead_days) {
        (Status::Dead, Reason::NoActivity { days: days_since_activity })
    } else if has_unchanged_connections
        && days_since_activity.at_least(criteria.static_connections_days)
    {
        (
            Status::Static,
            Reason::ConstantConnections {
                average: average_connections,
                static_days: criteria.static_connections_days,
            },
        )
    } else if average_connections > 0.0 && average_connections < criteria.low_activity_threshold {
        (Status::Warning, Reason::LowActivity { average: average_connections })
    } else {
        (Status::Healthy, Reason::None)
    };

    ActivityVerdict {
        status,
        reason,
        days_since_activity,
        average_connections,
        has_unchanged_connections,
    }
}

/// `(unchanged, average)` over the trailing window of the history.
fn stability(connections: &[i64]) -> (bool, f64) {
    match connections {
        [] => (false, 0.0),
        [only] => (false, *only as f64),
        _ => {
            let window = &connections[connections.len().saturating_sub(STABILITY_WINDOW)..];
            let first = window[0];
            let unchanged = first > 0 && window.iter().all(|&c| c == first);
            let total: i128 = window.iter().map(|&c| i128::from(c)).sum();
            let average = total as f64 / window.len() as f64;
            (unchanged, average)
        }
    }
}

/// A roster entry with its activity verdict and display figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedDatabase {
    #[serde(flatten)]
    pub record: DatabaseRecord,
    pub status: Status,
    pub reason: Reason,
    pub days_since_activity: Recency,
    pub average_connections: f64,
    /// Size of the oldest sample with a non-zero size.
    pub size_gb: f64,
    /// Size of the newest sample with a non-zero size.
    pub latest_size_gb: Option<f64>,
    pub latest_connections: Option<i64>,
    /// Any sample reported more than zero connections.
    pub has_connections: bool,
    pub has_unchanged_connections: bool,
    pub last_activity_time: Option<DateTime<Utc>>,
}

/// Classify every roster entry against the server timeline.
///
/// Samples for names missing from the roster are ignored. The output keeps
/// roster order.
pub fn classify_all(
    roster: &[DatabaseRecord],
    samples: &[TimelineSample],
    criteria: &Criteria,
    now: DateTime<Utc>,
) -> Vec<ClassifiedDatabase> {
    if roster.is_empty() {
        return Vec::new();
    }

    let extractor = MetricExtractor::new(samples);

    roster
        .iter()
        .map(|record| {
            let connections = extractor.connection_sequence(&record.name);
            let last_activity_time = extractor.last_sample_time(&record.name);
            let verdict = classify_activity(&connections, last_activity_time, criteria, now);

            ClassifiedDatabase {
                record: record.clone(),
                status: verdict.status,
                reason: verdict.reason,
                days_since_activity: verdict.days_since_activity,
                average_connections: verdict.average_connections,
                size_gb: extractor.first_known_size(&record.name).unwrap_or(0.0),
                latest_size_gb: extractor.latest_known_size(&record.name),
                latest_connections: connections.last().copied(),
                has_connections: connections.iter().any(|&c| c > 0),
                has_unchanged_connections: verdict.has_unchanged_connections,
                last_activity_time,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn last() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, 30, 0).unwrap()
    }

    fn scenario_criteria() -> Criteria {
        Criteria {
            dead_days: 30,
            static_connections_days: 20,
            low_activity_threshold: 2.0,
        }
    }

    #[test]
    fn test_constant_history_past_dead_days_is_dead() {
        let connections = [5; 11];
        let verdict = classify_activity(
            &connections,
            Some(last()),
            &scenario_criteria(),
            last() + Duration::days(40),
        );

        assert_eq!(verdict.days_since_activity, Recency::Days(40));
        assert_eq!(verdict.status, Status::Dead);
        assert!(verdict.has_unchanged_connections);
        assert_eq!(verdict.reason.to_string(), "No activity for 40 days");
    }

    #[test]
    fn test_constant_history_past_static_days_is_static() {
        let connections = [5; 11];
        let verdict = classify_activity(
            &connections,
            Some(last()),
            &scenario_criteria(),
            last() + Duration::days(25),
        );

        assert_eq!(verdict.days_since_activity, Recency::Days(25));
        assert!(verdict.has_unchanged_connections);
        assert_eq!(verdict.average_connections, 5.0);
        assert_eq!(verdict.status, Status::Static);
        assert_eq!(
            verdict.reason.to_string(),
            "Constant connection count (5) for more than 20 days"
        );
    }

    #[test]
    fn test_zero_day_criteria_are_applied_as_given() {
        let dead_now = Criteria {
            dead_days: 0,
            ..scenario_criteria()
        };
        let verdict = classify_activity(&[50, 60, 45], Some(last()), &dead_now, last());
        assert_eq!(verdict.days_since_activity, Recency::Days(0));
        assert_eq!(verdict.status, Status::Dead);
        assert_eq!(verdict.reason.to_string(), "No activity for 0 days");

        let static_now = Criteria {
            static_connections_days: 0,
            ..scenario_criteria()
        };
        let verdict = classify_activity(&[5, 5, 5], Some(last()), &static_now, last());
        assert_eq!(verdict.days_since_activity, Recency::Days(0));
        assert_eq!(verdict.status, Status::Static);
        assert_eq!(
            verdict.reason.to_string(),
            "Constant connection count (5) for more than 0 days"
        );
    }

    #[test]
    fn test_huge_counts_do_not_overflow_average() {
        let verdict = classify_activity(
            &[i64::MAX, i64::MAX, i64::MAX - 1],
            Some(last()),
            &scenario_criteria(),
            last(),
        );
        assert_eq!(verdict.status, Status::Healthy);
        assert!(verdict.average_connections > 9.0e18);
    }

    #[test]
    fn test_low_average_is_warning() {
        let verdict = classify_activity(
            &[1, 1, 1],
            Some(last()),
            &Criteria::default(),
            last() + Duration::days(1),
        );

        assert_eq!(verdict.average_connections, 1.0);
        assert!(verdict.has_unchanged_connections);
        assert_eq!(verdict.status, Status::Warning);
        assert_eq!(verdict.reason.to_string(), "Low activity (average 1 connections)");
    }

    #[test]
    fn test_busy_database_is_healthy() {
        let verdict = classify_activity(
            &[50, 60, 45],
            Some(last()),
            &Criteria::default(),
            last() + Duration::hours(2),
        );

        assert_eq!(verdict.status, Status::Healthy);
        assert_eq!(verdict.reason, Reason::None);
        assert_eq!(verdict.reason.to_string(), "");
        assert!(!verdict.has_unchanged_connections);
    }

    #[test]
    fn test_no_samples_is_dead_forever() {
        let verdict = classify_activity(&[], None, &Criteria::default(), last());

        assert_eq!(verdict.status, Status::Dead);
        assert_eq!(verdict.days_since_activity, Recency::Never);
        assert_eq!(verdict.average_connections, 0.0);
        assert!(!verdict.has_unchanged_connections);
    }

    #[test]
    fn test_recency_has_priority_over_pattern() {
        let cases: [&[i64]; 4] = [&[0, 0], &[3, 3, 3], &[1, 2, 1], &[100, 200]];
        for connections in cases {
            let verdict = classify_activity(
                connections,
                Some(last()),
                &Criteria::default(),
                last() + Duration::days(30),
            );
            assert_eq!(verdict.status, Status::Dead, "{:?}", connections);
        }
    }

    #[test]
    fn test_single_sample_is_never_unchanged() {
        let verdict = classify_activity(
            &[7],
            Some(last()),
            &scenario_criteria(),
            last() + Duration::days(25),
        );

        assert!(!verdict.has_unchanged_connections);
        assert_eq!(verdict.average_connections, 7.0);
        assert_eq!(verdict.status, Status::Healthy);
    }

    #[test]
    fn test_window_only_covers_last_ten() {
        // Older variation falls outside the window
        let mut connections = vec![1, 9, 4];
        connections.extend([3; 10]);
        let verdict = classify_activity(
            &connections,
            Some(last()),
            &scenario_criteria(),
            last() + Duration::days(21),
        );

        assert!(verdict.has_unchanged_connections);
        assert_eq!(verdict.average_connections, 3.0);
        assert_eq!(verdict.status, Status::Static);
    }

    #[test]
    fn test_all_zero_is_not_unchanged() {
        let verdict = classify_activity(
            &[0, 0, 0, 0],
            Some(last()),
            &scenario_criteria(),
            last() + Duration::days(25),
        );

        assert!(!verdict.has_unchanged_connections);
        assert_eq!(verdict.status, Status::Healthy);
    }

    #[test]
    fn test_recency_floors_partial_days() {
        let now = last() + Duration::days(2) + Duration::hours(23);
        assert_eq!(Recency::since(Some(last()), now), Recency::Days(2));

        let before = last() - Duration::hours(1);
        assert_eq!(Recency::since(Some(last()), before), Recency::Days(-1));
        assert!(Recency::Never.at_least(i64::MAX));
    }

    #[test]
    fn test_fractional_average_in_reason() {
        let verdict = classify_activity(
            &[1, 2, 1],
            Some(last()),
            &Criteria::default(),
            last(),
        );
        assert_eq!(verdict.status, Status::Warning);
        assert_eq!(verdict.reason.to_string(), "Low activity (average 1.33 connections)");
    }

    #[test]
    fn test_classify_all_uses_roster_and_sizes() {
        let t0 = last();
        let samples = vec![
            TimelineSample::new(t0, "orders", 40, 0.0),
            TimelineSample::new(t0 + Duration::hours(1), "orders", 55, 2.0),
            TimelineSample::new(t0 + Duration::hours(2), "orders", 60, 3.5),
            TimelineSample::new(t0, "stray", 1, 1.0),
        ];
        let roster = vec![DatabaseRecord::new("orders"), DatabaseRecord::new("archive")];
        let now = t0 + Duration::days(1);

        let classified = classify_all(&roster, &samples, &Criteria::default(), now);
        assert_eq!(classified.len(), 2);

        let orders = &classified[0];
        assert_eq!(orders.record.name, "orders");
        assert_eq!(orders.status, Status::Healthy);
        assert_eq!(orders.size_gb, 2.0);
        assert_eq!(orders.latest_size_gb, Some(3.5));
        assert_eq!(orders.latest_connections, Some(60));
        assert!(orders.has_connections);
        assert_eq!(orders.last_activity_time, Some(t0 + Duration::hours(2)));

        let archive = &classified[1];
        assert_eq!(archive.status, Status::Dead);
        assert_eq!(archive.days_since_activity, Recency::Never);
        assert_eq!(archive.size_gb, 0.0);
        assert_eq!(archive.latest_size_gb, None);
        assert!(!archive.has_connections);
    }

    #[test]
    fn test_classify_all_is_deterministic() {
        let t0 = last();
        let samples: Vec<_> = (0..30)
            .map(|i| TimelineSample::new(t0 + Duration::hours(i), "orders", i % 4, 0.1 * i as f64))
            .collect();
        let roster = vec![DatabaseRecord::new("orders")];
        let now = t0 + Duration::days(3);

        let a = classify_all(&roster, &samples, &Criteria::default(), now);
        let b = classify_all(&roster, &samples, &Criteria::default(), now);
        assert_eq!(a, b);
        assert_eq!(
            a[0].average_connections.to_bits(),
            b[0].average_connections.to_bits()
        );
    }

    #[test]
    fn test_empty_roster() {
        let samples = vec![TimelineSample::new(last(), "orders", 1, 1.0)];
        assert!(classify_all(&[], &samples, &Criteria::default(), last()).is_empty());
    }
}
