//! Welltick - personal health records and wellness metrics
//!
//! Records carry an optional JSON payload. A private payload is sealed with
//! ChaCha20-Poly1305 under a fresh per-record key and kept in a
//! content-addressed store; the SQLite row only references it by CID. A public
//! payload is stored inline in the row.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/welltick/
//! ├── blobs/              # Sealed payloads (local content store)
//! │   └── 1a2b/bafkrei... # First 4 hex digits of the digest as subdirs
//! ├── welltick.db         # Users, record metadata, metrics, contacts
//! └── config.toml         # Configuration
//! ```
//!
//! ## Modules
//!
//! - [`crypto`] - per-record keys and AEAD sealing
//! - [`content_store`] - local and IPFS payload storage behind one trait
//! - [`db`] - SQLite repository, every query owner-scoped
//! - [`services`] - validation and the record pipeline
//! - [`http`] - hyper server and routing

pub mod analytics;
pub mod auth;
pub mod config;
pub mod content_store;
pub mod crypto;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod services;

pub use config::{Config, ContentBackend, StoreFailurePolicy};
pub use content_store::{ContentStore, IpfsContentStore, LocalContentStore};
pub use db::Database;
pub use error::{Result, WelltickError};
pub use http::HttpServer;
pub use services::Services;
