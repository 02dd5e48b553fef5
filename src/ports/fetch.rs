use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch `url` over the network into `dest`, returning the bytes written
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}
