//! Health record metadata CRUD

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::debug;

use super::{from_db_time, parse_column, to_db_time};
use crate::error::WelltickError;
use crate::models::{RecordCategory, Visibility};

/// Largest page a list call may ask for
pub const MAX_LIST_LIMIT: u32 = 500;

/// Where a record's payload lives
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadStorage {
    /// No payload
    Empty,
    /// Payload held in the row itself
    Inline(Value),
    /// Payload sealed in the content store
    Sealed { content_id: String, key_hex: String },
}

impl PayloadStorage {
    /// Column values `(payload_json, content_id, encryption_key)`
    fn columns(&self) -> Result<(Option<String>, Option<&str>, Option<&str>), WelltickError> {
        Ok(match self {
            Self::Empty => (None, None, None),
            Self::Inline(value) => (Some(serde_json::to_string(value)?), None, None),
            Self::Sealed { content_id, key_hex } => {
                (None, Some(content_id.as_str()), Some(key_hex.as_str()))
            }
        })
    }

    fn from_columns(
        payload_json: Option<String>,
        content_id: Option<String>,
        key_hex: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        match (payload_json, content_id, key_hex) {
            (_, Some(content_id), Some(key_hex)) => Ok(Self::Sealed { content_id, key_hex }),
            (Some(json), _, _) => Ok(Self::Inline(serde_json::from_str(&json)?)),
            _ => Ok(Self::Empty),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed { .. })
    }
}

/// Health record row from database
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: String,
    pub owner_id: String,
    pub category: RecordCategory,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub storage: PayloadStorage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let storage = PayloadStorage::from_columns(
            row.get("payload_json")?,
            row.get("content_id")?,
            row.get("encryption_key")?,
        )
        .map_err(|e| {
            let idx = row.as_ref().column_index("payload_json").unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            category: parse_column(row, "category")?,
            title: row.get("title")?,
            description: row.get("description")?,
            visibility: parse_column(row, "visibility")?,
            storage,
            created_at: from_db_time(row, "created_at")?,
            updated_at: from_db_time(row, "updated_at")?,
        })
    }
}

/// Input for inserting a record
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub owner_id: String,
    pub category: RecordCategory,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub storage: PayloadStorage,
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub title: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub visibility: Option<Visibility>,
    pub storage: Option<PayloadStorage>,
}

/// Listing filters
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub category: Option<RecordCategory>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Insert a record
pub fn insert_record(conn: &Connection, input: NewRecord) -> Result<RecordRow, WelltickError> {
    let now = Utc::now();
    let id = uuid::Uuid::new_v4().to_string();
    let (payload_json, content_id, key_hex) = input.storage.columns()?;

    conn.execute(
        r#"
        INSERT INTO health_records (
            id, owner_id, category, title, description,
            payload_json, visibility, content_id, encryption_key,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
        params![
            id,
            input.owner_id,
            input.category.as_str(),
            input.title,
            input.description,
            payload_json,
            input.visibility.as_str(),
            content_id,
            key_hex,
            to_db_time(&now),
        ],
    )?;

    debug!(id = %id, category = %input.category, "Inserted health record");

    Ok(RecordRow {
        id,
        owner_id: input.owner_id,
        category: input.category,
        title: input.title,
        description: input.description,
        visibility: input.visibility,
        storage: input.storage,
        created_at: now,
        updated_at: now,
    })
}

/// Get a record owned by `owner_id`
pub fn get_record(
    conn: &Connection,
    owner_id: &str,
    id: &str,
) -> Result<Option<RecordRow>, WelltickError> {
    Ok(conn
        .query_row(
            "SELECT * FROM health_records WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
            RecordRow::from_row,
        )
        .optional()?)
}

/// List an owner's records, newest first
pub fn list_records(
    conn: &Connection,
    owner_id: &str,
    query: &RecordQuery,
) -> Result<Vec<RecordRow>, WelltickError> {
    let mut sql = String::from("SELECT * FROM health_records WHERE owner_id = ?");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];

    if let Some(category) = query.category {
        sql.push_str(" AND category = ?");
        params.push(Box::new(category.as_str()));
    }

    sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit.min(MAX_LIST_LIMIT) as i64));
    params.push(Box::new(query.offset as i64));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Apply a partial update. Returns `None` when the owner has no such record.
pub fn update_record(
    conn: &Connection,
    owner_id: &str,
    id: &str,
    changes: &RecordChanges,
) -> Result<Option<RecordRow>, WelltickError> {
    let mut sets: Vec<&str> = vec!["updated_at = ?"];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(to_db_time(&Utc::now()))];

    if let Some(ref title) = changes.title {
        sets.push("title = ?");
        params.push(Box::new(title.clone()));
    }
    if let Some(ref description) = changes.description {
        sets.push("description = ?");
        params.push(Box::new(description.clone()));
    }
    if let Some(visibility) = changes.visibility {
        sets.push("visibility = ?");
        params.push(Box::new(visibility.as_str()));
    }
    if let Some(ref storage) = changes.storage {
        let (payload_json, content_id, key_hex) = storage.columns()?;
        sets.push("payload_json = ?");
        sets.push("content_id = ?");
        sets.push("encryption_key = ?");
        params.push(Box::new(payload_json));
        params.push(Box::new(content_id.map(str::to_string)));
        params.push(Box::new(key_hex.map(str::to_string)));
    }

    let sql = format!(
        "UPDATE health_records SET {} WHERE id = ? AND owner_id = ?",
        sets.join(", ")
    );
    params.push(Box::new(id.to_string()));
    params.push(Box::new(owner_id.to_string()));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let updated = conn.execute(&sql, param_refs.as_slice())?;

    if updated == 0 {
        return Ok(None);
    }

    get_record(conn, owner_id, id)
}

/// Delete a record. Returns whether a row owned by `owner_id` was removed.
pub fn delete_record(conn: &Connection, owner_id: &str, id: &str) -> Result<bool, WelltickError> {
    let deleted = conn.execute(
        "DELETE FROM health_records WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;
    Ok(deleted > 0)
}
