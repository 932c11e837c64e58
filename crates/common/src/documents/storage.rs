//! Document file storage
//!
//! Files always land on local disk first. When remote blob storage is
//! configured the file is pushed there and the local copy dropped; any
//! remote failure keeps the local copy instead of failing the upload.

use crate::config::{DocumentsConfig, RemoteStorageConfig};
use crate::db::models::Document;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Make a user-supplied filename safe to use as a path component
pub fn secure_filename(name: &str) -> String {
    // keep only the last path component from any platform
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mapped: String = base
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let trimmed = mapped.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Unique stored name: `{account_id}_{uuid-hex}_{sanitized original}`
pub fn stored_filename(account_id: Uuid, original: &str) -> String {
    format!(
        "{}_{}_{}",
        account_id,
        Uuid::new_v4().simple(),
        secure_filename(original)
    )
}

/// Files under the configured upload directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Durable reference returned by a blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub public_id: String,
    pub url: String,
}

/// Remote object storage for uploaded files
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<RemoteObject>;

    async fn delete(&self, public_id: &str) -> Result<()>;
}

/// Cloudinary-compatible signed upload API.
///
/// Signatures use SHA-256, so the account must be set to accept them.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: RemoteStorageConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

impl CloudinaryStore {
    pub fn new(config: RemoteStorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/raw/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            action
        )
    }

    /// Hex SHA-256 of the sorted `k=v` params joined by `&`, plus the secret
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|(k, _)| *k);
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<RemoteObject> {
        let timestamp = Utc::now().timestamp().to_string();
        let public_id = filename.to_string();
        let signature = self.sign(&[
            ("folder", self.config.folder.as_str()),
            ("public_id", public_id.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.config.folder.clone())
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Remote upload failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                message: format!("Remote upload rejected {}: {}", status, body),
            });
        }

        let uploaded: UploadResponse = response.json().await.map_err(|e| AppError::Storage {
            message: format!("Failed to parse upload response: {}", e),
        })?;

        Ok(RemoteObject {
            public_id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let form = [
            ("api_key", self.config.api_key.as_str()),
            ("public_id", public_id),
            ("timestamp", timestamp.as_str()),
            ("signature_algorithm", "sha256"),
            ("signature", signature.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Remote delete failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: format!("Remote delete rejected: {}", response.status()),
            });
        }
        Ok(())
    }
}

/// Where an upload ended up
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub local_path: Option<String>,
    pub remote: Option<RemoteObject>,
}

impl StoredFile {
    pub fn backend(&self) -> &'static str {
        if self.remote.is_some() {
            "remote"
        } else {
            "local"
        }
    }
}

/// Local storage plus optional remote storage
#[derive(Clone)]
pub struct DocumentStorage {
    local: LocalStore,
    remote: Option<Arc<dyn BlobStore>>,
}

impl DocumentStorage {
    pub fn new(local: LocalStore, remote: Option<Arc<dyn BlobStore>>) -> Self {
        Self { local, remote }
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self> {
        let remote = match &config.remote {
            Some(remote) => Some(Arc::new(CloudinaryStore::new(remote.clone())?) as Arc<dyn BlobStore>),
            None => None,
        };
        Ok(Self::new(LocalStore::new(&config.upload_dir), remote))
    }

    /// Persist an upload; only a local disk failure is an error
    pub async fn store(&self, filename: &str, bytes: Vec<u8>) -> Result<StoredFile> {
        let path = self.local.save(filename, &bytes).await?;

        if let Some(remote) = &self.remote {
            match remote.upload(filename, bytes).await {
                Ok(object) => {
                    if let Err(e) = self.local.delete(&path).await {
                        warn!(path = %path.display(), error = %e, "Failed to drop local copy after remote upload");
                    }
                    info!(filename, public_id = %object.public_id, "Document stored remotely");
                    return Ok(StoredFile {
                        filename: filename.to_string(),
                        local_path: None,
                        remote: Some(object),
                    });
                }
                Err(e) => {
                    warn!(filename, error = %e, "Remote storage failed, keeping local copy");
                }
            }
        }

        Ok(StoredFile {
            filename: filename.to_string(),
            local_path: Some(path.to_string_lossy().into_owned()),
            remote: None,
        })
    }

    /// Undo a [`store`](Self::store) whose document record was never written
    pub async fn discard(&self, stored: &StoredFile) {
        if let (Some(object), Some(remote)) = (&stored.remote, &self.remote) {
            if let Err(e) = remote.delete(&object.public_id).await {
                warn!(filename = %stored.filename, error = %e, "Failed to discard remote file");
            }
        }
        if let Some(path) = &stored.local_path {
            if let Err(e) = self.local.delete(Path::new(path)).await {
                warn!(filename = %stored.filename, error = %e, "Failed to discard local file");
            }
        }
    }

    /// Remove a document's stored file wherever it lives; failures are logged
    pub async fn remove(&self, document: &Document) {
        if let (Some(public_id), Some(remote)) = (&document.remote_public_id, &self.remote) {
            if let Err(e) = remote.delete(public_id).await {
                warn!(document_id = %document.id, error = %e, "Failed to delete remote file");
            }
        }
        if let Some(path) = &document.local_path {
            if let Err(e) = self.local.delete(Path::new(path)).await {
                warn!(document_id = %document.id, error = %e, "Failed to delete local file");
            }
        }
    }
}
