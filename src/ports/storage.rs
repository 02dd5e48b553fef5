use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Copy the stored object `key` to `local_path`
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Store the file at `local_path` under `key`
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;
}
