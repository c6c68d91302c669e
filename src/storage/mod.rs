//! Blob storage for modeling images.
//!
//! Images are stored under generated names and referenced by the URL that
//! `put` returns. Two backends exist: a local directory served by the HTTP
//! server, and any S3-compatible bucket (MinIO included).

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{S3Config, StorageBackend, StorageConfig};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid object reference: {0}")]
    InvalidReference(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object storage error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object and return the URL it is served from
    async fn put(
        &self,
        data: Bytes,
        file_name: Option<&str>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Delete the object behind a URL returned by `put`. Missing objects are not an error.
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Build the configured store
pub fn from_config(config: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(
            config.local_dir.clone(),
            config.public_prefix.clone(),
        )),
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend = \"s3\" requires a [storage.s3] section")
            })?;
            Arc::new(S3BlobStore::new(s3))
        }
    };
    Ok(store)
}

/// Generated object name, keeping the upload's extension when it has a usable one
pub fn object_name(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    let extension = from_name.or_else(|| {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    });

    let id = uuid::Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) => format!("{}.{}", id, ext),
        None => id,
    }
}

/// Last path segment of a URL, rejected if it could escape the store
fn object_key(url: &str) -> Result<&str, StorageError> {
    let key = url.rsplit('/').next().unwrap_or_default();
    if key.is_empty() || key == "." || key == ".." || key.contains('\\') {
        return Err(StorageError::InvalidReference(url.to_string()));
    }
    Ok(key)
}

/// Images kept in a directory and served under `public_prefix`
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_prefix: String) -> Self {
        Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        data: Bytes,
        file_name: Option<&str>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let name = object_name(file_name, content_type);
        tokio::fs::write(self.root.join(&name), &data).await?;

        debug!(name = %name, size = data.len(), "Stored image");
        Ok(format!("{}/{}", self.public_prefix, name))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = object_key(url)?;
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(url = %url, "Image to delete was already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Images kept in an S3-compatible bucket
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl S3BlobStore {
    pub fn new(config: &S3Config) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "nettest-config",
        );

        // Path-style addressing so MinIO and other self-hosted endpoints work
        let sdk_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let public_base = config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", config.endpoint.trim_end_matches('/'), config.bucket));

        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        data: Bytes,
        file_name: Option<&str>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = object_name(file_name, content_type);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;

        debug!(key = %key, size, bucket = %self.bucket, "Stored image");
        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = object_key(url)?;

        // S3 reports success for keys that do not exist
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}
