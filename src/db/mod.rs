//! SQLite metadata repository
//!
//! Holds everything that is not a sealed payload: users, record metadata,
//! wellness metrics and emergency contacts. Sealed payload bytes live in the
//! content store and are referenced from `health_records.content_id`.
//!
//! ## Tables
//!
//! - `users` - account email and argon2 password hash
//! - `health_records` - record metadata, inline public payloads, content ids
//! - `wellness_metrics` - append-only metric series
//! - `emergency_contacts` - per-user contacts, at most one primary
//!
//! Every owned-row query filters on `owner_id` as well as `id`, so a row that
//! belongs to someone else is indistinguishable from a missing one.

pub mod schema;
pub mod users;
pub mod records;
pub mod metrics;
pub mod contacts;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::WelltickError;

/// SQLite database for welltick metadata
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, WelltickError> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)?;

        // WAL for concurrent readers while a write is in flight
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, WelltickError> {
        debug!("Opening in-memory SQLite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, WelltickError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.with_conn(schema::init_schema)?;

        Ok(db)
    }

    /// Run a read with the shared connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, WelltickError>
    where
        F: FnOnce(&Connection) -> Result<T, WelltickError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| WelltickError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (needed for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, WelltickError>
    where
        F: FnOnce(&mut Connection) -> Result<T, WelltickError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| WelltickError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, WelltickError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, WelltickError> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                user_count: count("users")?,
                record_count: count("health_records")?,
                metric_count: count("wellness_metrics")?,
                contact_count: count("emergency_contacts")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub record_count: u64,
    pub metric_count: u64,
    pub contact_count: u64,
}

/// Timestamps are stored as fixed-width RFC 3339 text so that string order is time order.
/// Callers keep years within 0000..=9999; wider years change the width.
pub(crate) fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn from_db_time(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            let idx = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

/// Map a stored enum column back through its `FromStr`
pub(crate) fn parse_column<T>(row: &rusqlite::Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = WelltickError>,
{
    let text: String = row.get(column)?;
    text.parse().map_err(|e: WelltickError| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// Turn a UNIQUE violation into a conflict, pass everything else through
pub(crate) fn map_unique_violation(err: rusqlite::Error, message: &str) -> WelltickError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            WelltickError::Conflict(message.to_string())
        }
        _ => WelltickError::Database(err),
    }
}
