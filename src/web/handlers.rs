//! HTTP request handlers.

use super::AppState;
use crate::db::{DatabaseRecord, DbError, TimelineSample, TimelineStore};
use crate::engine::{
    aggregate_server_trend, classify_all, export_report, project, ClassifiedDatabase, Criteria,
    CriteriaConfig, CriteriaError, NameFilter, NameMatch, PageRequest, Reason, ReportSelector,
    Role, SortDirection, SortKey, SortOrder, ViewFilter,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the caller's role, set by the authenticating proxy.
pub const ROLE_HEADER: &str = "x-pgtrail-role";

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_mode: Option<NameMatch>,
    #[serde(default)]
    pub hide_deleted: bool,
    #[serde(default)]
    pub only_no_connections: bool,
    #[serde(default)]
    pub only_unchanged: bool,
    #[serde(default)]
    pub sort: Option<SortKey>,
    #[serde(default)]
    pub dir: Option<SortDirection>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub selector: Option<ReportSelector>,
}

impl ViewQuery {
    fn range(&self) -> RangeQuery {
        RangeQuery {
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }

    fn filter(&self) -> ViewFilter {
        ViewFilter {
            name: self
                .name
                .as_deref()
                .map(|pattern| NameFilter::new(self.name_mode.unwrap_or_default(), pattern)),
            hide_deleted: self.hide_deleted,
            only_no_connections: self.only_no_connections,
            only_unchanged_connections: self.only_unchanged,
        }
    }

    fn sort(&self) -> SortOrder {
        SortOrder::new(self.sort.unwrap_or_default(), self.dir.unwrap_or_default())
    }
}

/// Resolve a request's window. The end of the window is also the instant
/// databases are classified at.
fn resolve_range(query: &RangeQuery, default_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = query
        .end
        .as_ref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let start = query
        .start
        .as_ref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| end - ChronoDuration::days(default_days));

    (start, end)
}

struct Snapshot {
    roster: Vec<DatabaseRecord>,
    samples: Vec<TimelineSample>,
    criteria: Criteria,
    now: DateTime<Utc>,
}

impl Snapshot {
    fn load(state: &AppState, server_id: i64, range: &RangeQuery) -> Result<Self, DbError> {
        let (start, end) = resolve_range(range, state.config.default_range_days);
        let roster = state.store.roster(server_id)?;
        let samples = state.store.timeline(server_id, start, end)?;
        let criteria = CriteriaConfig::new(state.store.as_ref()).load()?;

        tracing::debug!(
            "Loaded server {}: {} databases, {} samples in [{}, {})",
            server_id,
            roster.len(),
            samples.len(),
            start,
            end
        );

        Ok(Self {
            roster,
            samples,
            criteria,
            now: end,
        })
    }

    fn classify(&self) -> Vec<ClassifiedDatabase> {
        classify_all(&self.roster, &self.samples, &self.criteria, self.now)
    }
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    tracing::error!("Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}

// ============================================================================
// API: Databases
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiDatabase {
    pub name: String,
    pub exists: bool,
    pub creation_time: Option<DateTime<Utc>>,
    pub status: String,
    pub reason: String,
    pub reason_detail: Reason,
    /// `None` when the database was never seen in the window.
    pub days_since_activity: Option<i64>,
    pub average_connections: f64,
    pub size_gb: f64,
    pub latest_size_gb: Option<f64>,
    pub latest_connections: Option<i64>,
    pub has_unchanged_connections: bool,
    pub last_activity_time: Option<DateTime<Utc>>,
}

impl From<ClassifiedDatabase> for ApiDatabase {
    fn from(db: ClassifiedDatabase) -> Self {
        Self {
            status: db.status.to_string(),
            reason: db.reason.to_string(),
            reason_detail: db.reason,
            days_since_activity: db.days_since_activity.days(),
            average_connections: db.average_connections,
            size_gb: db.size_gb,
            latest_size_gb: db.latest_size_gb,
            latest_connections: db.latest_connections,
            has_unchanged_connections: db.has_unchanged_connections,
            last_activity_time: db.last_activity_time,
            name: db.record.name,
            exists: db.record.exists,
            creation_time: db.record.creation_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatabasesResponse {
    pub items: Vec<ApiDatabase>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    pub criteria: Criteria,
}

pub async fn handle_get_databases(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
    Query(query): Query<ViewQuery>,
) -> impl IntoResponse {
    let snapshot = match Snapshot::load(&state, server_id, &query.range()) {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };

    let page = PageRequest::new(query.page.unwrap_or(1), state.config.page_size);
    let projection = project(&snapshot.classify(), &query.filter(), &query.sort(), page);

    Json(DatabasesResponse {
        items: projection.items.into_iter().map(ApiDatabase::from).collect(),
        total_count: projection.total_count,
        total_pages: projection.total_pages,
        page: page.number,
        page_size: page.size,
        criteria: snapshot.criteria,
    })
    .into_response()
}

// ============================================================================
// API: Trend
// ============================================================================

pub async fn handle_get_trend(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> impl IntoResponse {
    let (start, end) = resolve_range(&query, state.config.default_range_days);

    match state.store.timeline(server_id, start, end) {
        Ok(samples) => Json(aggregate_server_trend(&samples)).into_response(),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// API: Report
// ============================================================================

pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
    Query(query): Query<ViewQuery>,
) -> impl IntoResponse {
    let snapshot = match Snapshot::load(&state, server_id, &query.range()) {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };

    // The report covers every page of the current view
    let classified = snapshot.classify();
    let page = PageRequest::new(1, classified.len());
    let view = project(&classified, &query.filter(), &query.sort(), page);

    let selector = query.selector.unwrap_or_default();
    match export_report(&view.items, selector) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"server-{}-databases.csv\"", server_id),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// API: Status
// ============================================================================

pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(server_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_timeline_stats(server_id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e),
    }
}

// ============================================================================
// API: Criteria
// ============================================================================

fn caller_role(headers: &HeaderMap) -> Role {
    headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Role::Viewer)
}

#[derive(Debug, Serialize)]
struct ValidationBody {
    field: &'static str,
    message: String,
}

fn criteria_error(e: CriteriaError) -> Response {
    let text = e.to_string();
    match e {
        CriteriaError::Forbidden(role) => {
            tracing::warn!("Rejected criteria change from role {}", role);
            (StatusCode::FORBIDDEN, text).into_response()
        }
        CriteriaError::Invalid { field, message } => (
            StatusCode::BAD_REQUEST,
            Json(ValidationBody { field, message }),
        )
            .into_response(),
        CriteriaError::Store(e) => internal_error(e),
    }
}

pub async fn handle_get_criteria(State(state): State<AppState>) -> impl IntoResponse {
    match CriteriaConfig::new(state.store.as_ref()).load() {
        Ok(criteria) => Json(criteria).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn handle_update_criteria(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(criteria): Json<Criteria>,
) -> impl IntoResponse {
    let role = caller_role(&headers);

    match CriteriaConfig::new(state.store.as_ref()).save(&criteria, role) {
        Ok(()) => Json(criteria).into_response(),
        Err(e) => criteria_error(e),
    }
}

pub async fn handle_reset_criteria(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let role = caller_role(&headers);

    match CriteriaConfig::new(state.store.as_ref()).reset(role) {
        Ok(criteria) => Json(criteria).into_response(),
        Err(e) => criteria_error(e),
    }
}
