//! IPFS RPC API client
//!
//! Talks to a Kubo-compatible `/api/v0` endpoint (a local node or a hosted
//! pinning service such as Infura). Every command is a POST.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{parse_cid, ContentStore};
use crate::config::ContentStoreConfig;
use crate::error::{Result, WelltickError};

/// Response body of `/api/v0/add`
#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: Option<String>,
}

/// Content store backed by an IPFS node
pub struct IpfsContentStore {
    api_base: Url,
    client: Client,
    project_id: Option<String>,
    project_secret: Option<String>,
}

impl IpfsContentStore {
    /// Create a client from the content store config
    pub fn new(config: &ContentStoreConfig) -> Result<Self> {
        let mut api_base = Url::parse(&config.ipfs_api_url)
            .map_err(|e| WelltickError::Config(format!("Invalid ipfs_api_url: {}", e)))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WelltickError::Config(format!("Failed to build IPFS client: {}", e)))?;

        info!(api = %api_base, "Using IPFS content store");

        Ok(Self {
            api_base,
            client,
            project_id: config.ipfs_project_id.clone(),
            project_secret: config.ipfs_project_secret.clone(),
        })
    }

    /// URL for an `/api/v0/<command>` call
    fn endpoint(&self, command: &str) -> Result<Url> {
        self.api_base
            .join(&format!("api/v0/{}", command))
            .map_err(|e| WelltickError::Config(format!("Invalid IPFS endpoint: {}", e)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.project_id {
            Some(id) => request.basic_auth(id, self.project_secret.as_ref()),
            None => request,
        }
    }

    async fn send(&self, command: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| WelltickError::ContentStore(format!("IPFS {} failed: {}", command, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WelltickError::ContentStore(format!(
                "IPFS {} returned {}: {}",
                command, status, body
            )));
        }

        Ok(response)
    }
}

/// Extract and validate the CID from an `add` response body
fn parse_add_response(body: &str) -> Result<String> {
    // Streaming add may emit one JSON object per line; the last one is the root
    let line = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .last()
        .ok_or_else(|| WelltickError::ContentStore("Empty IPFS add response".into()))?;

    let added: AddResponse = serde_json::from_str(line)
        .map_err(|e| WelltickError::ContentStore(format!("Unexpected IPFS add response: {}", e)))?;

    let cid = parse_cid(&added.hash)
        .map_err(|_| WelltickError::ContentStore(format!("IPFS returned invalid CID {}", added.hash)))?;

    debug!(cid = %cid, size = ?added.size, "IPFS add complete");
    Ok(cid.to_string())
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn put(&self, data: &[u8]) -> Result<String> {
        let mut url = self.endpoint("add")?;
        url.query_pairs_mut()
            .append_pair("cid-version", "1")
            .append_pair("pin", "true");

        let form = Form::new().part("file", Part::bytes(data.to_vec()).file_name("payload"));
        let response = self.send("add", self.client.post(url).multipart(form)).await?;

        let body = response
            .text()
            .await
            .map_err(|e| WelltickError::ContentStore(format!("IPFS add body: {}", e)))?;

        let cid = parse_add_response(&body)?;
        info!(cid = %cid, size = data.len(), "Stored blob in IPFS");
        Ok(cid)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let cid = parse_cid(id)?;

        let mut url = self.endpoint("cat")?;
        url.query_pairs_mut().append_pair("arg", &cid.to_string());

        let response = self.send("cat", self.client.post(url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WelltickError::ContentStore(format!("IPFS cat body: {}", e)))?;

        Ok(bytes.to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "ipfs"
    }
}
