//! Wellness metric summaries
//!
//! Pure functions over already-fetched metric rows. The trend compares the
//! mean of the later half of a time-ordered series against the earlier half.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::metrics::MetricRow;
use crate::models::MetricCategory;

/// Default difference below which two half-means count as unchanged
pub const DEFAULT_TREND_TOLERANCE: f64 = 0.1;

/// Direction of a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Arithmetic mean, `0.0` for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Trend of time-ordered `values`
pub fn trend(values: &[f64], tolerance: f64) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let (first, second) = values.split_at(values.len() / 2);
    let diff = mean(second) - mean(first);

    if diff.abs() < tolerance {
        Trend::Stable
    } else if diff > 0.0 {
        Trend::Up
    } else {
        Trend::Down
    }
}

/// One point of a summarised series
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Summary of one metric category
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub average: f64,
    pub trend: Trend,
    pub series: Vec<SeriesPoint>,
    pub count: usize,
}

/// Group rows by category and summarise each group.
///
/// Rows are sorted by `recorded_at` here, so callers may pass them in any order.
pub fn summarize(
    rows: &[MetricRow],
    tolerance: f64,
) -> BTreeMap<MetricCategory, CategorySummary> {
    let mut grouped: BTreeMap<MetricCategory, Vec<SeriesPoint>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.category).or_default().push(SeriesPoint {
            value: row.value,
            recorded_at: row.recorded_at,
        });
    }

    grouped
        .into_iter()
        .map(|(category, mut series)| {
            series.sort_by_key(|p| p.recorded_at);
            let values: Vec<f64> = series.iter().map(|p| p.value).collect();
            let summary = CategorySummary {
                average: mean(&values),
                trend: trend(&values, tolerance),
                count: series.len(),
                series,
            };
            (category, summary)
        })
        .collect()
}
