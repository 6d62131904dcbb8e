//! Object storage for document bytes
//!
//! Only the interface matters to the core; [`LocalObjectStorage`] keeps
//! bytes on the filesystem and signs download URLs with HMAC-SHA256.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;

use crate::error::{VaultError, VaultResult};

type HmacSha256 = Hmac<Sha256>;

/// Binary object store. Called only after authorization succeeded.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> VaultResult<()>;

    async fn get(&self, key: &str) -> VaultResult<Vec<u8>>;

    /// Deleting a missing object is not an error
    async fn delete(&self, key: &str) -> VaultResult<()>;

    /// Time-limited URL for fetching `key` directly
    async fn presign(&self, key: &str, expires_in: Duration) -> VaultResult<String>;
}

/// Filesystem-backed storage rooted at a directory
pub struct LocalObjectStorage {
    root: PathBuf,
    base_url: String,
    signing_key: Vec<u8>,
}

impl LocalObjectStorage {
    pub fn new(root: impl AsRef<Path>, base_url: &str, signing_key: impl AsRef<[u8]>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.as_ref().to_vec(),
        }
    }

    fn object_path(&self, key: &str) -> VaultResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(VaultError::Validation(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn signature(&self, key: &str, expires: i64) -> VaultResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        mac.update(format!("{}:{}", key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a presigned URL's parameters
    pub fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> bool {
        if Utc::now().timestamp() > expires {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.signing_key) else {
            return false;
        };
        mac.update(format!("{}:{}", key, expires).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

fn upstream(op: &str, key: &str, err: std::io::Error) -> VaultError {
    VaultError::UpstreamUnavailable(format!("storage {} failed for {}: {}", op, key, err))
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> VaultResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| upstream("put", key, e))?;
        }

        // Write then rename so readers never see a partial object
        let tmp = path.with_extension("partial");
        fs::write(&tmp, data)
            .await
            .map_err(|e| upstream("put", key, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(upstream("put", key, e));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> VaultResult<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path).await.map_err(|e| upstream("get", key, e))
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(upstream("delete", key, e)),
        }
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> VaultResult<String> {
        self.object_path(key)?;
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = self.signature(key, expires)?;
        Ok(format!(
            "{}/objects/{}?expires={}&signature={}",
            self.base_url, key, expires, signature
        ))
    }
}
