//! Filtering, sorting and pagination of classified databases.

use super::classify::ClassifiedDatabase;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How a name pattern is matched. All modes ignore case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    #[default]
    Contains,
    StartsWith,
    EndsWith,
    NotContains,
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameFilter {
    pub mode: NameMatch,
    pub pattern: String,
}

impl NameFilter {
    pub fn new(mode: NameMatch, pattern: &str) -> Self {
        Self {
            mode,
            pattern: pattern.to_string(),
        }
    }

    /// Compile into a predicate. An empty pattern yields `None`, which
    /// filters nothing.
    fn compile(&self) -> Option<NamePredicate> {
        if self.pattern.is_empty() {
            return None;
        }

        let literal = regex::escape(&self.pattern);
        let (source, negate) = match self.mode {
            NameMatch::Contains => (literal, false),
            NameMatch::NotContains => (literal, true),
            NameMatch::StartsWith => (format!("^{}", literal), false),
            NameMatch::EndsWith => (format!("{}$", literal), false),
            NameMatch::Exact => (format!("^{}$", literal), false),
        };

        match RegexBuilder::new(&source).case_insensitive(true).build() {
            Ok(regex) => Some(NamePredicate {
                regex: Some(regex),
                negate,
            }),
            Err(e) => {
                tracing::warn!("ViewProjector: name pattern {:?} rejected: {}", self.pattern, e);
                Some(NamePredicate { regex: None, negate })
            }
        }
    }
}

/// A compiled name filter. A pattern that failed to compile matches no name,
/// whatever the mode.
struct NamePredicate {
    regex: Option<Regex>,
    negate: bool,
}

impl NamePredicate {
    fn matches(&self, name: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|r| r.is_match(name) != self.negate)
    }
}

/// Independent predicates, combined with AND.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFilter {
    pub name: Option<NameFilter>,
    pub hide_deleted: bool,
    pub only_no_connections: bool,
    pub only_unchanged_connections: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Status,
    CreationTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    fn compare(&self, a: &ClassifiedDatabase, b: &ClassifiedDatabase) -> Ordering {
        let ord = match self.key {
            SortKey::Name => a.record.name.cmp(&b.record.name),
            SortKey::Size => a
                .latest_size_gb
                .unwrap_or(0.0)
                .total_cmp(&b.latest_size_gb.unwrap_or(0.0)),
            // Existing databases first
            SortKey::Status => b.record.exists.cmp(&a.record.exists),
            SortKey::CreationTime => creation_millis(a).cmp(&creation_millis(b)),
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

fn creation_millis(db: &ClassifiedDatabase) -> i64 {
    db.record
        .creation_time
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}

/// A 1-based page of fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: usize,
    pub size: usize,
}

impl PageRequest {
    /// Page numbers below 1 select the first page; sizes below 1 become 1.
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub items: Vec<ClassifiedDatabase>,
    /// Number of databases left after filtering.
    pub total_count: usize,
    pub total_pages: usize,
}

/// Filter, sort and slice one page out of the classified set.
///
/// The sort is stable, so equal keys keep their input order. A page past the
/// end is empty.
pub fn project(
    classified: &[ClassifiedDatabase],
    filter: &ViewFilter,
    sort: &SortOrder,
    page: PageRequest,
) -> Projection {
    let page = PageRequest::new(page.number, page.size);
    let name = filter.name.as_ref().and_then(NameFilter::compile);

    let mut selected: Vec<&ClassifiedDatabase> = classified
        .iter()
        .filter(|db| name.as_ref().map_or(true, |p| p.matches(&db.record.name)))
        .filter(|db| !filter.hide_deleted || db.record.exists)
        .filter(|db| !filter.only_no_connections || !db.has_connections)
        .filter(|db| !filter.only_unchanged_connections || db.has_unchanged_connections)
        .collect();

    selected.sort_by(|a, b| sort.compare(a, b));

    let total_count = selected.len();
    let total_pages = total_count.div_ceil(page.size);
    let offset = (page.number - 1).saturating_mul(page.size);

    let items = selected
        .into_iter()
        .skip(offset)
        .take(page.size)
        .cloned()
        .collect();

    tracing::debug!(
        "ViewProjector: {} of {} databases, page {}/{}",
        total_count,
        classified.len(),
        page.number,
        total_pages
    );

    Projection {
        items,
        total_count,
        total_pages,
    }
}
