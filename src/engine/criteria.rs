//! Classification thresholds and their persistence.

use crate::db::{DbError, SettingsStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

/// Settings key holding the whole criteria set as one JSON object.
pub const CRITERIA_KEY: &str = "criteria";

/// Accepted range for both day thresholds on save.
pub const DAYS_RANGE: RangeInclusive<i64> = 1..=365;
/// Accepted range for the low-activity threshold on save.
pub const THRESHOLD_RANGE: RangeInclusive<f64> = 1.0..=20.0;

/// Thresholds driving activity classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Days without samples after which a database is dead.
    pub dead_days: i64,
    /// Days a constant connection count must persist to be static.
    pub static_connections_days: i64,
    /// Average connections below which a database is low-activity.
    pub low_activity_threshold: f64,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            dead_days: 30,
            static_connections_days: 30,
            low_activity_threshold: 2.0,
        }
    }
}

impl Criteria {
    /// Check every field against its documented bound.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if !DAYS_RANGE.contains(&self.dead_days) {
            return Err(CriteriaError::invalid("dead_days", days_message(self.dead_days)));
        }
        if !DAYS_RANGE.contains(&self.static_connections_days) {
            return Err(CriteriaError::invalid(
                "static_connections_days",
                days_message(self.static_connections_days),
            ));
        }
        if !THRESHOLD_RANGE.contains(&self.low_activity_threshold) {
            return Err(CriteriaError::invalid(
                "low_activity_threshold",
                format!(
                    "{} is outside {}..={}",
                    self.low_activity_threshold,
                    THRESHOLD_RANGE.start(),
                    THRESHOLD_RANGE.end()
                ),
            ));
        }
        Ok(())
    }
}

fn days_message(value: i64) -> String {
    format!("{} is outside {}..={} days", value, DAYS_RANGE.start(), DAYS_RANGE.end())
}

/// Role of the caller, as reported by the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

impl Role {
    pub fn can_edit_criteria(self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operator" => Ok(Role::Operator),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

/// Criteria error types.
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("role {0} may not change criteria")]
    Forbidden(Role),
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
    #[error(transparent)]
    Store(#[from] DbError),
}

impl CriteriaError {
    fn invalid(field: &'static str, message: String) -> Self {
        Self::Invalid { field, message }
    }
}

/// Load/save/reset of [`Criteria`] over a key-value store.
///
/// Writes are last-write-wins; concurrent editors are not detected.
pub struct CriteriaConfig<'a, S: SettingsStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: SettingsStore + ?Sized> CriteriaConfig<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Persisted values merged over the defaults.
    pub fn load(&self) -> Result<Criteria, DbError> {
        let mut criteria = Criteria::default();
        let Some(raw) = self.store.get(CRITERIA_KEY)? else {
            return Ok(criteria);
        };

        let stored: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("CriteriaConfig: ignoring unparseable {}: {}", CRITERIA_KEY, e);
                return Ok(criteria);
            }
        };

        if let Some(v) = field(&stored, "dead_days", Value::as_i64) {
            criteria.dead_days = v;
        }
        if let Some(v) = field(&stored, "static_connections_days", Value::as_i64) {
            criteria.static_connections_days = v;
        }
        if let Some(v) = field(&stored, "low_activity_threshold", Value::as_f64) {
            criteria.low_activity_threshold = v;
        }
        Ok(criteria)
    }

    /// Validate and persist. Nothing is written when validation fails.
    pub fn save(&self, criteria: &Criteria, role: Role) -> Result<(), CriteriaError> {
        if !role.can_edit_criteria() {
            return Err(CriteriaError::Forbidden(role));
        }
        criteria.validate()?;
        self.write(criteria)?;
        tracing::info!(
            "CriteriaConfig: saved by {} (dead={}d, static={}d, low<{})",
            role,
            criteria.dead_days,
            criteria.static_connections_days,
            criteria.low_activity_threshold
        );
        Ok(())
    }

    /// Persist and return the defaults.
    pub fn reset(&self, role: Role) -> Result<Criteria, CriteriaError> {
        if !role.can_edit_criteria() {
            return Err(CriteriaError::Forbidden(role));
        }
        let defaults = Criteria::default();
        self.write(&defaults)?;
        tracing::info!("CriteriaConfig: reset to defaults by {}", role);
        Ok(defaults)
    }

    /// One `set` per save, so a failed write leaves the previous set intact.
    fn write(&self, criteria: &Criteria) -> Result<(), DbError> {
        let value = serde_json::json!({
            "dead_days": criteria.dead_days,
            "static_connections_days": criteria.static_connections_days,
            "low_activity_threshold": criteria.low_activity_threshold,
        });
        self.store.set(CRITERIA_KEY, &value.to_string())
    }
}

fn field<T>(stored: &Value, name: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
    let raw = stored.get(name)?;
    let value = convert(raw);
    if value.is_none() {
        tracing::warn!("CriteriaConfig: ignoring unparseable {}={}", name, raw);
    }
    value
}
