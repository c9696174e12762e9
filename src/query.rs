// 🔎 Query Engine - allow-list aware, filtered, bounded reads
//
// Order of application: allow-list exclusion, country, time window, limit.
// Results are in ascending id (insertion) order, so pagination is stable.

use anyhow::Result;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::store::{AddressRecord, AddressStore, AllowStore, RecordFilter};

// ============================================================================
// FILTER
// ============================================================================

/// Raw query-string parameters as they arrive from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub country: Option<String>,
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub count: Option<String>,
}

/// Validated query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub country: Option<String>,
    /// Exclusive lower bound on ingestion time
    pub start_time: Option<DateTime<Utc>>,
    /// Exclusive upper bound on ingestion time
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Empty parameters count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lower bound at stored resolution. Truncating only widens an exclusive `>`.
fn parse_start_bound(raw: &str) -> Option<DateTime<Utc>> {
    parse_rfc3339(raw).map(|dt| dt.trunc_subsecs(6))
}

/// Upper bound at stored resolution, rounded up so a sub-microsecond
/// bound never drops a record stored just below it.
fn parse_end_bound(raw: &str) -> Option<DateTime<Utc>> {
    parse_rfc3339(raw).map(|dt| {
        let truncated = dt.trunc_subsecs(6);
        if truncated == dt {
            truncated
        } else {
            truncated + Duration::microseconds(1)
        }
    })
}

impl TryFrom<&QueryParams> for QueryFilter {
    type Error = ValidationError;

    fn try_from(params: &QueryParams) -> Result<Self, Self::Error> {
        let start_time = present(&params.starttime)
            .map(|raw| {
                parse_start_bound(raw).ok_or_else(|| ValidationError::StartTime(raw.to_string()))
            })
            .transpose()?;

        let end_time = present(&params.endtime)
            .map(|raw| {
                parse_end_bound(raw).ok_or_else(|| ValidationError::EndTime(raw.to_string()))
            })
            .transpose()?;

        // Integers only; a negative count is rejected rather than clamped
        let limit = present(&params.count)
            .map(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| ValidationError::Count(raw.to_string()))
            })
            .transpose()?;

        Ok(QueryFilter {
            country: present(&params.country).map(str::to_string),
            start_time,
            end_time,
            limit,
        })
    }
}

impl QueryFilter {
    fn record_filter(&self) -> RecordFilter {
        RecordFilter {
            country: self.country.clone(),
            ingested_after: self.start_time,
            ingested_before: self.end_time,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Clone)]
pub struct QueryEngine {
    records: Arc<dyn AddressStore>,
    allowlist: Arc<dyn AllowStore>,
}

impl QueryEngine {
    pub fn new(records: Arc<dyn AddressStore>, allowlist: Arc<dyn AllowStore>) -> Self {
        Self { records, allowlist }
    }

    pub fn query(&self, filter: &QueryFilter) -> Result<Vec<AddressRecord>> {
        // Read fresh on every call so allow-list changes apply immediately
        let excluded: HashSet<String> = self.allowlist.allowed_addresses()?.into_iter().collect();

        let visible = self
            .records
            .find_addresses(&filter.record_filter())?
            .into_iter()
            .filter(|record| !excluded.contains(&record.address));

        Ok(match filter.limit {
            Some(limit) => visible.take(limit).collect(),
            None => visible.collect(),
        })
    }
}
