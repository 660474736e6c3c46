//! Wellness metric series

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{from_db_time, parse_column, to_db_time};
use crate::error::WelltickError;
use crate::models::MetricCategory;

/// Largest page a metric list may ask for
pub const MAX_METRIC_LIMIT: u32 = 1000;

/// Metric row from database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRow {
    pub id: String,
    #[serde(skip)]
    pub owner_id: String,
    pub category: MetricCategory,
    pub value: f64,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MetricRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            category: parse_column(row, "category")?,
            value: row.get("value")?,
            notes: row.get("notes")?,
            recorded_at: from_db_time(row, "recorded_at")?,
            created_at: from_db_time(row, "created_at")?,
        })
    }
}

/// Input for recording a metric
#[derive(Debug, Clone)]
pub struct NewMetric {
    pub owner_id: String,
    pub category: MetricCategory,
    pub value: f64,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Listing filters
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub category: Option<MetricCategory>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self {
            category: None,
            start: None,
            end: None,
            limit: 100,
        }
    }
}

/// Record a metric observation
pub fn insert_metric(conn: &Connection, input: NewMetric) -> Result<MetricRow, WelltickError> {
    let row = MetricRow {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: input.owner_id,
        category: input.category,
        value: input.value,
        notes: input.notes,
        recorded_at: input.recorded_at,
        created_at: Utc::now(),
    };

    conn.execute(
        r#"
        INSERT INTO wellness_metrics (id, owner_id, category, value, notes, recorded_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            row.id,
            row.owner_id,
            row.category.as_str(),
            row.value,
            row.notes,
            to_db_time(&row.recorded_at),
            to_db_time(&row.created_at),
        ],
    )?;

    Ok(row)
}

/// List an owner's metrics, most recently recorded first
pub fn list_metrics(
    conn: &Connection,
    owner_id: &str,
    query: &MetricQuery,
) -> Result<Vec<MetricRow>, WelltickError> {
    let mut sql = String::from("SELECT * FROM wellness_metrics WHERE owner_id = ?");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];

    if let Some(category) = query.category {
        sql.push_str(" AND category = ?");
        params.push(Box::new(category.as_str()));
    }
    if let Some(start) = query.start {
        sql.push_str(" AND recorded_at >= ?");
        params.push(Box::new(to_db_time(&start)));
    }
    if let Some(end) = query.end {
        sql.push_str(" AND recorded_at <= ?");
        params.push(Box::new(to_db_time(&end)));
    }

    sql.push_str(" ORDER BY recorded_at DESC, rowid DESC LIMIT ?");
    params.push(Box::new(query.limit.min(MAX_METRIC_LIMIT) as i64));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), MetricRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Every metric recorded at or after `since`, oldest first
pub fn metrics_since(
    conn: &Connection,
    owner_id: &str,
    since: &DateTime<Utc>,
) -> Result<Vec<MetricRow>, WelltickError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM wellness_metrics
        WHERE owner_id = ?1 AND recorded_at >= ?2
        ORDER BY recorded_at ASC, rowid ASC
        "#,
    )?;

    let rows = stmt
        .query_map(params![owner_id, to_db_time(since)], MetricRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{users, Database};
    use chrono::Duration;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user = db.with_conn(|c| users::create_user(c, "m@example.com", "h")).unwrap();
        (db, user.id)
    }

    fn record(db: &Database, owner: &str, category: MetricCategory, value: f64, days_ago: i64) {
        db.with_conn(|c| {
            insert_metric(
                c,
                NewMetric {
                    owner_id: owner.to_string(),
                    category,
                    value,
                    notes: None,
                    recorded_at: Utc::now() - Duration::days(days_ago),
                },
            )
        })
        .unwrap();
    }

    #[test]
    fn test_list_newest_first_with_filters() {
        let (db, owner) = setup();
        record(&db, &owner, MetricCategory::Mood, 3.0, 5);
        record(&db, &owner, MetricCategory::Mood, 4.0, 1);
        record(&db, &owner, MetricCategory::Pain, 2.0, 2);

        let all = db
            .with_conn(|c| list_metrics(c, &owner, &MetricQuery::default()))
            .unwrap();
        let values: Vec<f64> = all.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![4.0, 2.0, 3.0]);

        let mood = db
            .with_conn(|c| {
                list_metrics(
                    c,
                    &owner,
                    &MetricQuery {
                        category: Some(MetricCategory::Mood),
                        start: Some(Utc::now() - Duration::days(3)),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(mood.len(), 1);
        assert_eq!(mood[0].value, 4.0);
    }

    #[test]
    fn test_metrics_since_is_oldest_first() {
        let (db, owner) = setup();
        record(&db, &owner, MetricCategory::Sleep, 6.0, 40);
        record(&db, &owner, MetricCategory::Sleep, 7.0, 10);
        record(&db, &owner, MetricCategory::Sleep, 8.0, 2);

        let since = Utc::now() - Duration::days(30);
        let rows = db.with_conn(|c| metrics_since(c, &owner, &since)).unwrap();
        let values: Vec<f64> = rows.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![7.0, 8.0]);
    }

    #[test]
    fn test_serialized_row_hides_owner() {
        let (db, owner) = setup();
        record(&db, &owner, MetricCategory::HeartRate, 61.0, 0);
        let rows = db
            .with_conn(|c| list_metrics(c, &owner, &MetricQuery::default()))
            .unwrap();

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json.get("ownerId").is_none());
        assert_eq!(json["category"], "heart_rate");
        assert!(json.get("recordedAt").is_some());
    }
}
