//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;

use welltick::config::ContentStoreConfig;
use welltick::services::AuthUser;
use welltick::{
    Config, ContentStore, Database, HttpServer, LocalContentStore, Services, StoreFailurePolicy,
    WelltickError,
};

/// Local content store that can be switched off or made to return damaged bytes
pub struct FlakyStore {
    inner: LocalContentStore,
    down: AtomicBool,
    tamper: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_tamper(&self, tamper: bool) {
        self.tamper.store(tamper, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn put(&self, data: &[u8]) -> welltick::Result<String> {
        if self.down.load(Ordering::SeqCst) {
            return Err(WelltickError::ContentStore("connection refused".into()));
        }
        self.inner.put(data).await
    }

    async fn get(&self, id: &str) -> welltick::Result<Vec<u8>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(WelltickError::ContentStore("connection refused".into()));
        }
        let mut data = self.inner.get(id).await?;
        if self.tamper.load(Ordering::SeqCst) {
            if let Some(last) = data.last_mut() {
                *last ^= 0x01;
            }
        }
        Ok(data)
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

pub struct TestApp {
    pub server: HttpServer,
    pub services: Arc<Services>,
    pub store: Arc<FlakyStore>,
    _dir: TempDir,
}

pub async fn spawn_app(on_failure: StoreFailurePolicy) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = Config {
        storage_dir: dir.path().to_path_buf(),
        dev_mode: true,
        content_store: ContentStoreConfig {
            on_failure,
            ..Default::default()
        },
        ..Default::default()
    };

    let store = Arc::new(FlakyStore {
        inner: LocalContentStore::new(config.blobs_dir()).await.unwrap(),
        down: AtomicBool::new(false),
        tamper: AtomicBool::new(false),
    });
    let db = Arc::new(Database::open(&config.db_path()).unwrap());
    let services = Arc::new(Services::new(&config, db, store.clone()).unwrap());
    let server = HttpServer::new(
        services.clone(),
        "127.0.0.1:0".parse().unwrap(),
        config.max_body_bytes,
    );

    TestApp {
        server,
        services,
        store,
        _dir: dir,
    }
}

impl TestApp {
    /// Send a request through the router and decode the JSON body (`null` when empty)
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let req = builder.body(Full::new(Bytes::from(body))).unwrap();

        let response = self.server.handle_request(req).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Register an account and return its token
    pub async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({ "email": email, "password": "correct-horse-battery" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Register an account and resolve it to the identity services expect
    pub async fn user(&self, email: &str) -> AuthUser {
        let token = self.register(email).await;
        self.services
            .auth
            .authenticate(Some(&format!("Bearer {}", token)))
            .unwrap()
    }
}
