use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ReportStatus, RowId};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const PAGE_KEY: &str = "pageNum";
const PAGE_SIZE_KEY: &str = "pageSize";
const ORDER_BY_KEY: &str = "orderByColumn";
const ORDER_KEY: &str = "isAsc";
const RESERVED_KEYS: [&str; 4] = [PAGE_KEY, PAGE_SIZE_KEY, ORDER_BY_KEY, ORDER_KEY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSortError(String);

impl fmt::Display for ParseSortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sort `{}`: expected field[:asc|desc]", self.0)
    }
}

impl std::error::Error for ParseSortError {}

/// Parses `field`, `field:asc` or `field:desc`.
impl FromStr for Sort {
    type Err = ParseSortError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (field, order) = match raw.split_once(':') {
            Some((field, order)) => (field.trim(), order.trim()),
            None => (raw.trim(), "asc"),
        };
        if field.is_empty() {
            return Err(ParseSortError(raw.to_string()));
        }
        let order = match order.to_ascii_lowercase().as_str() {
            "asc" | "ascend" | "ascending" => SortOrder::Ascending,
            "desc" | "descend" | "descending" => SortOrder::Descending,
            _ => return Err(ParseSortError(raw.to_string())),
        };
        Ok(Self {
            field: field.to_string(),
            order,
        })
    }
}

/// Paging, filtering and sorting state of one list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorter: Option<Sort>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            filter: BTreeMap::new(),
            sorter: None,
        }
    }
}

impl QueryParams {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn with_sorter(mut self, sorter: Sort) -> Self {
        self.sorter = Some(sorter);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.page == 0 {
            return Err("page must be at least 1".to_string());
        }
        if self.page_size == 0 {
            return Err("pageSize must be at least 1".to_string());
        }
        Ok(())
    }

    /// Query pairs in the form the backend paging helper reads. Filter fields
    /// that collide with paging keys are dropped.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (PAGE_KEY.to_string(), self.page.to_string()),
            (PAGE_SIZE_KEY.to_string(), self.page_size.to_string()),
        ];
        pairs.extend(
            self.filter
                .iter()
                .filter(|(field, value)| {
                    !value.is_empty() && !RESERVED_KEYS.contains(&field.as_str())
                })
                .map(|(field, value)| (field.clone(), value.clone())),
        );
        if let Some(sorter) = &self.sorter {
            pairs.push((ORDER_BY_KEY.to_string(), sorter.field.clone()));
            pairs.push((ORDER_KEY.to_string(), sorter.order.as_str().to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<R> {
    pub data: Vec<R>,
    pub total: u64,
}

impl<R> Default for ListResult<R> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
        }
    }
}

/// Which of the tolerated list payload shapes a response had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A bare JSON array of rows.
    Sequence,
    /// `{ rows: [...], total }`.
    Paged,
    /// Anything else, including `{ total }` without rows.
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedList {
    pub rows: Vec<Value>,
    pub total: u64,
    pub shape: ResponseShape,
}

impl NormalizedList {
    fn empty() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            shape: ResponseShape::Malformed,
        }
    }
}

/// Collapses the list payload variants into rows plus total.
///
/// A bare array counts its own length. An object with a `rows` array uses its
/// `total` when that is a JSON number and the row count otherwise. Fractional
/// totals are truncated; negative or non-finite ones count as absent.
/// Every other payload is an empty page.
pub fn normalize_list_response(raw: Value) -> NormalizedList {
    match raw {
        Value::Array(rows) => NormalizedList {
            total: rows.len() as u64,
            rows,
            shape: ResponseShape::Sequence,
        },
        Value::Object(mut object) => match object.remove("rows") {
            Some(Value::Array(rows)) => {
                let total = object
                    .get("total")
                    .and_then(numeric_total)
                    .unwrap_or(rows.len() as u64);
                NormalizedList {
                    rows,
                    total,
                    shape: ResponseShape::Paged,
                }
            }
            _ => NormalizedList::empty(),
        },
        _ => NormalizedList::empty(),
    }
}

fn numeric_total(total: &Value) -> Option<u64> {
    total.as_u64().or_else(|| {
        total
            .as_f64()
            .filter(|total| total.is_finite() && *total >= 0.0)
            .map(|total| total as u64)
    })
}

/// Partial update the report audit screen sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAuditRequest {
    pub id: RowId,
    pub status: ReportStatus,
    pub audit_by: String,
    #[serde(default)]
    pub reject_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    pub message_id: i64,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
