//! User accounts

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{from_db_time, map_unique_violation, to_db_time};
use crate::error::WelltickError;

/// User row from database. Never serialized: it carries the password hash.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            created_at: from_db_time(row, "created_at")?,
        })
    }
}

/// Insert a user; an email that is already registered is a conflict
pub fn create_user(
    conn: &Connection,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, WelltickError> {
    let user = UserRow {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.email, user.password_hash, to_db_time(&user.created_at)],
    )
    .map_err(|e| map_unique_violation(e, "An account with this email already exists"))?;

    Ok(user)
}

/// Get user by ID
pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, WelltickError> {
    Ok(conn
        .query_row("SELECT * FROM users WHERE id = ?", params![id], UserRow::from_row)
        .optional()?)
}

/// Get user by (already normalised) email
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, WelltickError> {
    Ok(conn
        .query_row("SELECT * FROM users WHERE email = ?", params![email], UserRow::from_row)
        .optional()?)
}
