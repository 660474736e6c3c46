//! Content-addressed storage for sealed record payloads
//!
//! Payloads are addressed by CIDv1 (raw codec, sha2-256), the same identifiers
//! an IPFS node hands back from `add`, so records written against the local
//! store and records written against IPFS share one identifier format.
//!
//! ## Backends
//!
//! - [`LocalContentStore`] - files under `storage_dir/blobs`
//! - [`IpfsContentStore`] - IPFS RPC API (`/api/v0/add`, `/api/v0/cat`)

pub mod ipfs;
pub mod local;

use async_trait::async_trait;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use std::sync::Arc;

use crate::config::{Config, ContentBackend};
use crate::error::{Result, WelltickError};

pub use ipfs::IpfsContentStore;
pub use local::{LocalContentStore, StorageStats};

/// Multicodec for raw binary content
pub const RAW_CODEC: u64 = 0x55;

/// Multihash code for sha2-256
pub const SHA2_256_CODE: u64 = 0x12;

/// Storage backend for sealed payloads.
///
/// Implementations report every failure as an error and never retry; callers
/// decide whether a failure is fatal.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes, returning their content identifier
    async fn put(&self, data: &[u8]) -> Result<String>;

    /// Retrieve bytes by content identifier
    async fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Short backend name for logs and `/health`
    fn backend_name(&self) -> &'static str;

    /// Blob counts, for backends that can report them cheaply
    async fn stats(&self) -> Result<Option<StorageStats>> {
        Ok(None)
    }
}

/// Compute the CIDv1 (raw, sha2-256) for data
pub fn compute_cid(data: &[u8]) -> String {
    let hash = Code::Sha2_256.digest(data);
    Cid::new_v1(RAW_CODEC, hash).to_string()
}

/// Parse a content identifier, rejecting anything that is not a CID
pub fn parse_cid(id: &str) -> Result<Cid> {
    Cid::try_from(id)
        .map_err(|e| WelltickError::InvalidInput(format!("Invalid content identifier {}: {}", id, e)))
}

/// Build the content store selected by config
pub async fn from_config(config: &Config) -> Result<Arc<dyn ContentStore>> {
    match config.content_store.backend {
        ContentBackend::Local => {
            let store = LocalContentStore::new(config.blobs_dir()).await?;
            Ok(Arc::new(store))
        }
        ContentBackend::Ipfs => {
            let store = IpfsContentStore::new(&config.content_store)?;
            Ok(Arc::new(store))
        }
    }
}
