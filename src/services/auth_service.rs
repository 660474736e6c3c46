//! Account registration, login and the bearer-token gate

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::password::{self, MIN_PASSWORD_LEN};
use crate::auth::{extract_token_from_header, JwtValidator};
use crate::db::{users, Database};
use crate::error::WelltickError;

/// Identity resolved from a request's bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<users::UserRow> for UserView {
    fn from(row: users::UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// Token plus account returned by register and login
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub success: bool,
    pub token: String,
    pub user: UserView,
}

/// Auth service
pub struct AuthService {
    db: Arc<Database>,
    jwt: JwtValidator,
}

fn normalize_email(email: &str) -> Result<String, WelltickError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    };
    if !valid {
        return Err(WelltickError::InvalidInput("A valid email is required".into()));
    }
    Ok(email)
}

fn invalid_credentials() -> WelltickError {
    WelltickError::Unauthorized("Invalid email or password".into())
}

impl AuthService {
    pub fn new(db: Arc<Database>, jwt: JwtValidator) -> Self {
        Self { db, jwt }
    }

    /// Create an account and issue its first token
    pub fn register(&self, email: &str, password: &str) -> Result<AuthSession, WelltickError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(WelltickError::InvalidInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let hash = password::hash_password(password)?;
        let user = self.db.with_conn(|conn| users::create_user(conn, &email, &hash))?;
        info!(user_id = %user.id, "Registered account");

        self.session(user)
    }

    /// Check credentials and issue a token
    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession, WelltickError> {
        let email = normalize_email(email).map_err(|_| invalid_credentials())?;

        let user = self
            .db
            .with_conn(|conn| users::get_user_by_email(conn, &email))?
            .ok_or_else(invalid_credentials)?;

        if !password::verify_password(password, &user.password_hash)? {
            debug!(user_id = %user.id, "Rejected login");
            return Err(invalid_credentials());
        }

        self.session(user)
    }

    /// Resolve an Authorization header to a stored user
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthUser, WelltickError> {
        let token = extract_token_from_header(header)
            .ok_or_else(|| WelltickError::Unauthorized("Access token required".into()))?;

        let claims = self.jwt.verify_token(token)?;

        let user = self
            .db
            .with_conn(|conn| users::get_user(conn, &claims.sub))?
            .ok_or_else(|| WelltickError::Unauthorized("Unknown user".into()))?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
        })
    }

    /// Account details for an authenticated user
    pub fn me(&self, user: &AuthUser) -> Result<UserView, WelltickError> {
        self.db
            .with_conn(|conn| users::get_user(conn, &user.id))?
            .map(UserView::from)
            .ok_or_else(|| WelltickError::NotFound("User not found".into()))
    }

    fn session(&self, user: users::UserRow) -> Result<AuthSession, WelltickError> {
        let token = self.jwt.generate_token(&user.id, &user.email)?;
        Ok(AuthSession {
            success: true,
            token,
            user: user.into(),
        })
    }
}
