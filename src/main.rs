//! Welltick daemon
//!
//! ## Usage
//!
//! ```bash
//! # Local development (no JWT secret, local content store)
//! welltick --dev-mode
//!
//! # Production
//! JWT_SECRET=... welltick --storage-dir /var/lib/welltick --http-port 5000
//!
//! # IPFS-backed payloads
//! welltick --content-backend ipfs --ipfs-api-url http://127.0.0.1:5001
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use welltick::{content_store, Config, ContentBackend, Database, HttpServer, Services, StoreFailurePolicy};

#[derive(Parser, Debug)]
#[command(name = "welltick")]
#[command(about = "Encrypted health records and wellness metrics API")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "WELLTICK_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "PORT")]
    http_port: Option<u16>,

    /// HS256 secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Allow running without a JWT secret
    #[arg(long, env = "DEV_MODE")]
    dev_mode: bool,

    /// Content store backend for private payloads
    #[arg(long, value_enum)]
    content_backend: Option<ContentBackend>,

    /// What to do when the content store rejects a private payload
    #[arg(long, value_enum)]
    on_store_failure: Option<StoreFailurePolicy>,

    /// IPFS RPC API base URL
    #[arg(long, env = "IPFS_API_URL")]
    ipfs_api_url: Option<String>,

    /// Hosted IPFS project id
    #[arg(long, env = "INFURA_IPFS_PROJECT_ID")]
    ipfs_project_id: Option<String>,

    /// Hosted IPFS project secret
    #[arg(long, env = "INFURA_IPFS_SECRET", hide_env_values = true)]
    ipfs_project_secret: Option<String>,
}

impl Args {
    /// CLI and environment values win over the config file
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if self.jwt_secret.is_some() {
            config.jwt_secret = self.jwt_secret;
        }
        if self.dev_mode {
            config.dev_mode = true;
        }
        if let Some(backend) = self.content_backend {
            config.content_store.backend = backend;
        }
        if let Some(policy) = self.on_store_failure {
            config.content_store.on_failure = policy;
        }
        if let Some(url) = self.ipfs_api_url {
            config.content_store.ipfs_api_url = url;
        }
        if self.ipfs_project_id.is_some() {
            config.content_store.ipfs_project_id = self.ipfs_project_id;
        }
        if self.ipfs_project_secret.is_some() {
            config.content_store.ipfs_project_secret = self.ipfs_project_secret;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("welltick=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    let explicit_config = args.config.is_some();
    args.apply(&mut config);
    config.validate()?;

    if config.dev_mode {
        warn!("Dev mode enabled: tokens are signed with a public secret");
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        backend = ?config.content_store.backend,
        on_store_failure = ?config.content_store.on_failure,
        "Starting welltick"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !explicit_config && !config_path.exists() {
        // Secrets stay in the environment
        let mut on_disk = config.clone();
        on_disk.jwt_secret = None;
        on_disk.content_store.ipfs_project_secret = None;
        on_disk.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(Database::open(&config.db_path())?);
    let store = content_store::from_config(&config).await?;
    let services = Arc::new(Services::new(&config, db, store)?);

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let server = Arc::new(HttpServer::new(services, http_addr, config.max_body_bytes));

    info!("HTTP API available at http://{}", http_addr);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server stopped");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
