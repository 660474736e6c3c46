//! HTTP API for welltick
//!
//! ## Public
//! - `GET /health` - liveness and repository stats
//! - `POST /api/auth/register`, `POST /api/auth/login`
//!
//! ## Bearer token required
//! - `GET /api/auth/me`
//! - `GET|POST /api/health/records`, `GET|PUT|DELETE /api/health/records/{id}`
//! - `GET|POST /api/health/metrics`, `GET /api/health/analytics?period=30`
//! - `GET|POST /api/emergency/contacts`, `PUT|DELETE /api/emergency/contacts/{id}`
//!
//! ## Example Usage
//!
//! ```bash
//! TOKEN=$(curl -s -X POST localhost:5000/api/auth/register \
//!      -d '{"email":"sam@example.com","password":"correct-horse"}' | jq -r .token)
//!
//! curl -X POST -H "Authorization: Bearer $TOKEN" localhost:5000/api/health/records \
//!      -d '{"category":"medication","title":"Lisinopril","payload":{"dose":"10mg"}}'
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::WelltickError;
use crate::services::contact_service::{CreateContactInput, UpdateContactInput};
use crate::services::metric_service::{CreateMetricInput, MetricListQuery};
use crate::services::record_service::{CreateRecordInput, RecordListQuery, UpdateRecordInput};
use crate::services::{self, AuthUser, HandlerResult, HttpResponse, Services};

/// Register / login body
#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsQuery {
    #[serde(default)]
    period: Option<u32>,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    content_store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    blobs: Option<crate::content_store::StorageStats>,
    database: crate::db::DbStats,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    max_body_bytes: usize,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr, max_body_bytes: usize) -> Self {
        Self {
            services,
            bind_addr,
            max_body_bytes,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), WelltickError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle_request(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route one request and emit its access-log line
    pub async fn handle_request<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = if method == Method::OPTIONS {
            services::preflight()
        } else {
            services::from_result(self.route(req).await)
        };

        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if status >= 400 {
            warn!(method = %method, path = %path, status, elapsed_ms, "Request");
        } else {
            info!(method = %method, path = %path, status, elapsed_ms, "Request");
        }

        response
    }

    async fn route<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health().await,

            (Method::POST, "/api/auth/register") => {
                let body: Credentials = self.read_json(req).await?;
                let session = self.services.auth.register(&body.email, &body.password)?;
                Ok(services::created(&session))
            }
            (Method::POST, "/api/auth/login") => {
                let body: Credentials = self.read_json(req).await?;
                let session = self.services.auth.login(&body.email, &body.password)?;
                Ok(services::ok(&session))
            }

            (_, p) if p.starts_with("/api/") => {
                let user = self.services.auth.authenticate(
                    req.headers()
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok()),
                )?;
                debug!(user_id = %user.id, path = %p, "Authenticated request");
                self.route_authenticated(req, &path, &user).await
            }

            _ => Ok(services::not_found("Not found")),
        }
    }

    async fn route_authenticated<B>(
        &self,
        req: Request<B>,
        path: &str,
        user: &AuthUser,
    ) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let query = req.uri().query().unwrap_or("").to_string();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::GET, ["api", "auth", "me"]) => {
                let view = self.services.auth.me(user)?;
                Ok(services::ok(&json!({ "success": true, "user": view })))
            }

            // Health records
            (Method::GET, ["api", "health", "records"]) => {
                let query: RecordListQuery = parse_query(&query)?;
                let records = self.services.records.list(user, &query)?;
                Ok(services::ok(&json!({ "success": true, "records": records })))
            }
            (Method::POST, ["api", "health", "records"]) => {
                let input: CreateRecordInput = self.read_json(req).await?;
                let record = self.services.records.create(user, input).await?;
                Ok(services::created(&json!({ "success": true, "record": record })))
            }
            (Method::GET, ["api", "health", "records", id]) => {
                let record = self.services.records.get(user, id).await?;
                Ok(services::ok(&json!({ "success": true, "record": record })))
            }
            (Method::PUT, ["api", "health", "records", id]) => {
                let input: UpdateRecordInput = self.read_json(req).await?;
                let record = self.services.records.update(user, id, input).await?;
                Ok(services::ok(&json!({
                    "success": true,
                    "message": "Health record updated successfully",
                    "record": record,
                })))
            }
            (Method::DELETE, ["api", "health", "records", id]) => {
                self.services.records.delete(user, id)?;
                Ok(services::ok(&json!({
                    "success": true,
                    "message": "Health record deleted successfully",
                })))
            }

            // Wellness metrics
            (Method::GET, ["api", "health", "metrics"]) => {
                let query: MetricListQuery = parse_query(&query)?;
                let metrics = self.services.metrics.list(user, &query)?;
                Ok(services::ok(&json!({ "success": true, "metrics": metrics })))
            }
            (Method::POST, ["api", "health", "metrics"]) => {
                let input: CreateMetricInput = self.read_json(req).await?;
                let metric = self.services.metrics.record(user, input)?;
                Ok(services::created(&json!({ "success": true, "metric": metric })))
            }
            (Method::GET, ["api", "health", "analytics"]) => {
                let query: AnalyticsQuery = parse_query(&query)?;
                let analytics = self.services.metrics.analytics(user, query.period)?;
                Ok(services::ok(&json!({ "success": true, "analytics": analytics })))
            }

            // Emergency contacts
            (Method::GET, ["api", "emergency", "contacts"]) => {
                let contacts = self.services.contacts.list(user)?;
                Ok(services::ok(&json!({ "success": true, "contacts": contacts })))
            }
            (Method::POST, ["api", "emergency", "contacts"]) => {
                let input: CreateContactInput = self.read_json(req).await?;
                let contact = self.services.contacts.create(user, input)?;
                Ok(services::created(&json!({ "success": true, "contact": contact })))
            }
            (Method::PUT, ["api", "emergency", "contacts", id]) => {
                let input: UpdateContactInput = self.read_json(req).await?;
                let contact = self.services.contacts.update(user, id, input)?;
                Ok(services::ok(&json!({ "success": true, "contact": contact })))
            }
            (Method::DELETE, ["api", "emergency", "contacts", id]) => {
                self.services.contacts.delete(user, id)?;
                Ok(services::ok(&json!({
                    "success": true,
                    "message": "Emergency contact deleted successfully",
                })))
            }

            (_, ["api", "auth", "me"])
            | (_, ["api", "health", "records" | "metrics" | "analytics"])
            | (_, ["api", "health", "records", _])
            | (_, ["api", "emergency", "contacts"])
            | (_, ["api", "emergency", "contacts", _]) => Ok(services::method_not_allowed()),

            _ => Ok(services::not_found("Not found")),
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> HandlerResult {
        let body = HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            content_store: self.services.store.backend_name(),
            blobs: self.services.store.stats().await?,
            database: self.services.db.stats()?,
        };
        Ok(services::ok(&body))
    }

    /// Read a JSON body, enforcing `max_body_bytes`. An empty body reads as `{}`.
    async fn read_json<T, B>(&self, req: Request<B>) -> Result<T, WelltickError>
    where
        T: DeserializeOwned,
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(req.into_body(), self.max_body_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    WelltickError::PayloadTooLarge(self.max_body_bytes)
                } else {
                    WelltickError::InvalidInput(format!("Failed to read body: {}", e))
                }
            })?;

        let bytes = collected.to_bytes();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, WelltickError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| WelltickError::InvalidInput(format!("Invalid query string: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query: RecordListQuery = parse_query("category=allergy&limit=5").unwrap();
        assert_eq!(query.category.as_deref(), Some("allergy"));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, None);

        let analytics: AnalyticsQuery = parse_query("").unwrap();
        assert_eq!(analytics.period, None);

        assert!(parse_query::<AnalyticsQuery>("period=soon").is_err());
    }

    #[test]
    fn test_metric_query_uses_camel_case() {
        let query: MetricListQuery =
            parse_query("type=mood&startDate=2026-01-01&endDate=2026-02-01").unwrap();
        assert_eq!(query.category.as_deref(), Some("mood"));
        assert_eq!(query.start_date.as_deref(), Some("2026-01-01"));
        assert_eq!(query.end_date.as_deref(), Some("2026-02-01"));
    }
}
