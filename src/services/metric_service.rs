//! Metric service - wellness metric recording, listing and analytics

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::analytics::{self, CategorySummary};
use crate::db::metrics::{self, MetricQuery, MetricRow};
use crate::db::Database;
use crate::error::WelltickError;
use crate::models::MetricCategory;

use super::auth_service::AuthUser;

/// Default analytics window in days
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Longest analytics window accepted
pub const MAX_PERIOD_DAYS: u32 = 3650;

/// Body of a record-metric request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMetricInput {
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    /// Number or numeric string
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Query string of a metric listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricListQuery {
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Per-category summaries over a trailing window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub period: u32,
    pub total_records: usize,
    pub categories: BTreeMap<MetricCategory, CategorySummary>,
}

/// Coerce an inbound metric value to a finite `f64`
fn coerce_value(value: &Value) -> Result<f64, WelltickError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|v| v.is_finite())
        .ok_or_else(|| WelltickError::InvalidInput("Value must be a finite number".into()))
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (start of day, UTC)
fn parse_date(field: &str, text: &str) -> Result<DateTime<Utc>, WelltickError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| WelltickError::InvalidInput(format!("Invalid {}: {}", field, text)))
}

/// Stored timestamps must fit four-digit years to sort and parse as text
fn check_recorded_at(time: DateTime<Utc>) -> Result<DateTime<Utc>, WelltickError> {
    if (0..=9999).contains(&time.year()) {
        Ok(time)
    } else {
        Err(WelltickError::InvalidInput(
            "recordedAt must fall between years 0000 and 9999".into(),
        ))
    }
}

/// Metric service
pub struct MetricService {
    db: Arc<Database>,
    trend_tolerance: f64,
}

impl MetricService {
    pub fn new(db: Arc<Database>, trend_tolerance: f64) -> Self {
        Self { db, trend_tolerance }
    }

    /// Record one observation; `recordedAt` defaults to now
    pub fn record(&self, owner: &AuthUser, input: CreateMetricInput) -> Result<MetricRow, WelltickError> {
        let (Some(category), Some(value)) = (input.category.as_deref(), input.value.as_ref()) else {
            return Err(WelltickError::InvalidInput("Category and value are required".into()));
        };
        let category: MetricCategory = category.parse()?;
        let value = coerce_value(value)?;
        let recorded_at = input
            .recorded_at
            .map(check_recorded_at)
            .transpose()?
            .unwrap_or_else(Utc::now);

        let row = self.db.with_conn(|conn| {
            metrics::insert_metric(
                conn,
                metrics::NewMetric {
                    owner_id: owner.id.clone(),
                    category,
                    value,
                    notes: input.notes,
                    recorded_at,
                },
            )
        })?;

        debug!(id = %row.id, category = %row.category, "Recorded wellness metric");
        Ok(row)
    }

    /// List observations, most recent first
    pub fn list(&self, owner: &AuthUser, query: &MetricListQuery) -> Result<Vec<MetricRow>, WelltickError> {
        let query = MetricQuery {
            category: query
                .category
                .as_deref()
                .map(str::parse::<MetricCategory>)
                .transpose()?,
            start: query
                .start_date
                .as_deref()
                .map(|s| parse_date("startDate", s))
                .transpose()?,
            end: query
                .end_date
                .as_deref()
                .map(|s| parse_date("endDate", s))
                .transpose()?,
            limit: query.limit.unwrap_or(100),
        };

        self.db.with_conn(|conn| metrics::list_metrics(conn, &owner.id, &query))
    }

    /// Averages and trends over the last `period` days
    pub fn analytics(&self, owner: &AuthUser, period: Option<u32>) -> Result<AnalyticsReport, WelltickError> {
        let period = period.unwrap_or(DEFAULT_PERIOD_DAYS);
        if period == 0 || period > MAX_PERIOD_DAYS {
            return Err(WelltickError::InvalidInput(format!(
                "Period must be between 1 and {} days",
                MAX_PERIOD_DAYS
            )));
        }

        let since = Utc::now() - Duration::days(i64::from(period));
        let rows = self
            .db
            .with_conn(|conn| metrics::metrics_since(conn, &owner.id, &since))?;

        Ok(AnalyticsReport {
            period,
            total_records: rows.len(),
            categories: analytics::summarize(&rows, self.trend_tolerance),
        })
    }
}
