//! Service layer for welltick
//!
//! Services sit between the HTTP handlers and the repository. They validate
//! input, scope every operation to the authenticated owner and, for records,
//! orchestrate the crypto and content-store steps around the row write.
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (validation, orchestration)
//!     ↓
//! Repository Layer (db/*.rs)      Content store (content_store/*.rs)
//!     ↓                                ↓
//! SQLite Database                 blobs dir / IPFS
//! ```

pub mod response;
pub mod auth_service;
pub mod record_service;
pub mod metric_service;
pub mod contact_service;

pub use response::*;
pub use auth_service::{AuthService, AuthUser};
pub use record_service::{PayloadStatus, RecordService, RecordView};
pub use metric_service::MetricService;
pub use contact_service::ContactService;

use std::sync::Arc;

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::content_store::ContentStore;
use crate::db::Database;
use crate::error::WelltickError;

/// Service container handed to the HTTP server
pub struct Services {
    pub db: Arc<Database>,
    pub store: Arc<dyn ContentStore>,
    pub auth: Arc<AuthService>,
    pub records: Arc<RecordService>,
    pub metrics: Arc<MetricService>,
    pub contacts: Arc<ContactService>,
}

impl Services {
    /// Wire all services over one database and content store
    pub fn new(
        config: &Config,
        db: Arc<Database>,
        store: Arc<dyn ContentStore>,
    ) -> Result<Self, WelltickError> {
        let jwt = match config.jwt_secret.clone() {
            Some(secret) => JwtValidator::new(secret, config.jwt_expiry_secs)?,
            None if config.dev_mode => JwtValidator::new_dev(config.jwt_expiry_secs),
            None => {
                return Err(WelltickError::Config(
                    "JWT_SECRET is required unless dev_mode is enabled".into(),
                ))
            }
        };

        Ok(Self {
            auth: Arc::new(AuthService::new(db.clone(), jwt)),
            records: Arc::new(RecordService::new(
                db.clone(),
                store.clone(),
                config.content_store.on_failure,
            )),
            metrics: Arc::new(MetricService::new(db.clone(), config.trend_tolerance)),
            contacts: Arc::new(ContactService::new(db.clone())),
            db,
            store,
        })
    }
}
