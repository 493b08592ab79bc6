use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::{config::BehaviorVersion, config::Credentials, config::Region, Client};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::ObjectStorage;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
}

impl StorageService {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 ({})", endpoint);

        Self { client }
    }

    /// Ensure a bucket exists, create it if not
    pub async fn ensure_bucket_exists(&self, bucket_name: &str) -> Result<()> {
        let exists = self.client.head_bucket().bucket(bucket_name).send().await;

        match exists {
            Ok(_) => Ok(()),
            Err(_) => {
                info!("🪣 Creating bucket '{}'...", bucket_name);
                self.client
                    .create_bucket()
                    .bucket(bucket_name)
                    .send()
                    .await
                    .map_err(|e| anyhow!("Failed to create bucket '{}': {}", bucket_name, e))?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ObjectStorage for StorageService {
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let mut result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 GetObject error for '{}': {}", key, e))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| anyhow!("Failed to create file {}: {}", dest.display(), e))?;

        while let Some(chunk) = result
            .body
            .try_next()
            .await
            .map_err(|e| anyhow!("S3 stream error: {}", e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| anyhow!("Write error: {}", e))?;
        }

        file.flush().await?;
        Ok(())
    }

    async fn upload_public(&self, bucket: &str, key: &str, src: &Path) -> Result<()> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", src.display(), e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("S3 PutObject error for '{}': {}", key, e))?;

        Ok(())
    }
}
