//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Source of roster and timeline history for a monitored server.
pub trait TimelineStore {
    /// Databases known on the server, in roster order.
    fn roster(&self, server_id: i64) -> Result<Vec<DatabaseRecord>, DbError>;

    /// Samples with `start <= timestamp < end`, oldest first.
    fn timeline(
        &self,
        server_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimelineSample>, DbError>;
}

/// Flat key-value persistence for operator settings.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, DbError>;
    fn set(&self, key: &str, value: &str) -> Result<(), DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Roster ---

    /// Insert a roster entry or update the existing one with the same name.
    pub fn upsert_database(&self, server_id: i64, record: &DatabaseRecord) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO databases (server_id, name, exists_flag, creation_time) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(server_id, name) DO UPDATE SET
             exists_flag=excluded.exists_flag, creation_time=excluded.creation_time",
            params![
                server_id,
                record.name,
                record.exists,
                record.creation_time.map(format_db_time),
            ],
        )?;
        Ok(())
    }

    /// Get the roster of a server in insertion order.
    pub fn get_roster(&self, server_id: i64) -> Result<Vec<DatabaseRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, exists_flag, creation_time FROM databases WHERE server_id = ?1 ORDER BY rowid ASC",
        )?;

        let roster = stmt
            .query_map(params![server_id], |row| {
                let creation: Option<String> = row.get(2)?;
                Ok(DatabaseRecord {
                    name: row.get(0)?,
                    exists: row.get(1)?,
                    creation_time: creation.as_deref().and_then(parse_db_time),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(roster)
    }

    // --- Timeline ---

    /// Add timeline samples in batch.
    pub fn add_samples(&self, server_id: i64, samples: &[TimelineSample]) -> Result<(), DbError> {
        if samples.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO timeline (time, server_id, database_name, connections, size_gb) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for s in samples {
                stmt.execute(params![
                    format_db_time(s.timestamp),
                    server_id,
                    s.database_name,
                    s.connections,
                    s.size_gb,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get timeline samples for a server within a time range.
    pub fn get_timeline(
        &self,
        server_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimelineSample>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT time, database_name, connections, size_gb FROM timeline
             WHERE server_id = ?1 AND time >= ?2 AND time < ?3 ORDER BY time ASC, id ASC",
        )?;

        let samples = stmt
            .query_map(
                params![server_id, format_db_time(start), format_db_time(end)],
                |row| {
                    let time_str: String = row.get(0)?;
                    let timestamp = parse_db_time(&time_str).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                    Ok(TimelineSample {
                        timestamp,
                        database_name: row.get(1)?,
                        connections: row.get(2)?,
                        size_gb: row.get(3)?,
                    })
                },
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    /// Row counts and time span of the stored history for a server.
    pub fn get_timeline_stats(&self, server_id: i64) -> Result<TimelineStats, DbError> {
        let conn = self.conn()?;
        let databases: i64 = conn.query_row(
            "SELECT COUNT(*) FROM databases WHERE server_id = ?1",
            params![server_id],
            |r| r.get(0),
        )?;
        let (samples, first, last): (i64, Option<String>, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MIN(time), MAX(time) FROM timeline WHERE server_id = ?1",
            params![server_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        Ok(TimelineStats {
            server_id,
            databases,
            samples,
            first_sample: first.as_deref().and_then(parse_db_time),
            last_sample: last.as_deref().and_then(parse_db_time),
        })
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl TimelineStore for Store {
    fn roster(&self, server_id: i64) -> Result<Vec<DatabaseRecord>, DbError> {
        self.get_roster(server_id)
    }

    fn timeline(
        &self,
        server_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimelineSample>, DbError> {
        self.get_timeline(server_id, start, end)
    }
}

impl SettingsStore for Store {
    fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        self.get_setting(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.set_setting(key, value)
    }
}

fn format_db_time(dt: DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::NamedTempFile;

    fn open() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_roster_upsert_keeps_order() {
        let (_tmp, store) = open();
        let created = Utc.with_ymd_and_hms(2023, 5, 1, 8, 0, 0).unwrap();

        store.upsert_database(1, &DatabaseRecord::new("orders")).unwrap();
        store
            .upsert_database(
                1,
                &DatabaseRecord {
                    name: "analytics".to_string(),
                    exists: true,
                    creation_time: Some(created),
                },
            )
            .unwrap();
        store.upsert_database(2, &DatabaseRecord::new("other")).unwrap();

        // Re-upserting marks it dropped without moving it in the roster
        let mut dropped = DatabaseRecord::new("orders");
        dropped.exists = false;
        store.upsert_database(1, &dropped).unwrap();

        let roster = store.roster(1).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].name, "orders");
        assert!(!roster[0].exists);
        assert_eq!(roster[1].name, "analytics");
        assert_eq!(roster[1].creation_time, Some(created));
    }

    #[test]
    fn test_timeline_range_is_half_open() {
        let (_tmp, store) = open();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let samples: Vec<_> = (0..5)
            .map(|i| TimelineSample::new(t0 + Duration::hours(i), "orders", i, 1.5))
            .collect();
        store.add_samples(1, &samples).unwrap();
        store
            .add_samples(2, &[TimelineSample::new(t0, "orders", 99, 1.0)])
            .unwrap();

        let fetched = store.timeline(1, t0 + Duration::hours(1), t0 + Duration::hours(4)).unwrap();
        let connections: Vec<i64> = fetched.iter().map(|s| s.connections).collect();
        assert_eq!(connections, vec![1, 2, 3]);
        assert_eq!(fetched[0].timestamp, t0 + Duration::hours(1));

        let stats = store.get_timeline_stats(1).unwrap();
        assert_eq!(stats.samples, 5);
        assert_eq!(stats.first_sample, Some(t0));
        assert_eq!(stats.last_sample, Some(t0 + Duration::hours(4)));
    }

    #[test]
    fn test_settings_roundtrip() {
        let (_tmp, store) = open();
        assert_eq!(store.get("criteria").unwrap(), None);

        store.set("criteria", r#"{"dead_days":45}"#).unwrap();
        store.set("criteria", r#"{"dead_days":60}"#).unwrap();
        assert_eq!(store.get("criteria").unwrap().as_deref(), Some(r#"{"dead_days":60}"#));
    }

    #[test]
    fn test_parse_db_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_db_time("2024-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_db_time("2024-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_db_time("2024-01-02 03:04:05.000000000"), Some(expected));
        assert_eq!(parse_db_time("not a time"), None);
    }
}
