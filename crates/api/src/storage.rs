//! Attachment blob storage.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use axum::body::Bytes;

use crate::config::AttachmentConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Stores uploaded bytes and returns the public URL they are served from.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str)
        -> Result<String, StorageError>;
}

/// S3-backed blob store.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, config: &AttachmentConfig) -> Self {
        let public_base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", config.bucket));
        Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url,
        }
    }

    /// Build a client from the standard AWS environment (credentials, region).
    pub async fn from_env(config: &AttachmentConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config), config)
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                StorageError::Upload(aws_sdk_s3::error::DisplayErrorContext(&e).to_string())
            })?;

        tracing::info!(bucket = %self.bucket, key, "Attachment uploaded");
        Ok(self.object_url(key))
    }
}
