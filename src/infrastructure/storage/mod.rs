use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub mod s3;

/// The narrow storage surface the encoding pipeline needs: read a source
/// object into a local file, and publish a produced artifact as a
/// world-readable object. Production uses [`s3::StorageService`]; tests
/// substitute an in-memory implementation.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;

    async fn upload_public(&self, bucket: &str, key: &str, src: &Path) -> Result<()>;
}
