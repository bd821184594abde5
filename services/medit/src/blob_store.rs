use crate::config::S3Config;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, instrument};

/// Content type of stored medit documents
const DOCUMENT_CONTENT_TYPE: &str = "application/json";

/// Whole medit documents keyed by id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a serialized document under `id`
    async fn write_blob(&self, id: &str, document: Vec<u8>) -> Result<()>;

    /// Fetch the document stored under `id`, or `None` if there is none
    async fn read_blob(&self, id: &str) -> Result<Option<Vec<u8>>>;
}

/// Blob store backed by an S3 bucket
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    base_path: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            base_path = %config.base_path,
            region = %config.region,
            "S3 blob store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            base_path: config.base_path.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self, document), fields(bucket = %self.bucket))]
    async fn write_blob(&self, id: &str, document: Vec<u8>) -> Result<()> {
        let s3_key = blob_key(&self.base_path, id);
        let size_bytes = document.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .body(ByteStream::from(document))
            .content_type(DOCUMENT_CONTENT_TYPE)
            .metadata("medit-id", id)
            .send()
            .await
            .context("Failed to upload medit to S3")?;

        debug!(s3_key = %s3_key, size_bytes, "Medit uploaded");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn read_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let s3_key = blob_key(&self.base_path, id);

        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&s3_key)
            .send()
            .await
        {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .context("Failed to read medit body from S3")?
                    .into_bytes();
                debug!(s3_key = %s3_key, size_bytes = bytes.len(), "Medit downloaded");
                Ok(Some(bytes.to_vec()))
            }
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(e).context("Failed to download medit from S3")
                }
            }
        }
    }
}

/// Object key for a medit: `{base_path}/{id}`
pub fn blob_key(base_path: &str, id: &str) -> String {
    let base_path = base_path.trim_end_matches('/');
    if base_path.is_empty() {
        sanitize_path_component(id)
    } else {
        format!("{}/{}", base_path, sanitize_path_component(id))
    }
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Process-local blob store
///
/// Ids are sanitized the way S3 keys are, so both backends resolve the same
/// id to the same document.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn write_blob(&self, id: &str, document: Vec<u8>) -> Result<()> {
        self.blobs
            .write()
            .map_err(|e| anyhow!("blob lock poisoned: {e}"))?
            .insert(sanitize_path_component(id), document);
        Ok(())
    }

    async fn read_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| anyhow!("blob lock poisoned: {e}"))?
            .get(&sanitize_path_component(id))
            .cloned())
    }
}
