use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FsResult;
use crate::types::FileInfo;

/// A read-only storage backend addressed by absolute `/`-separated paths.
#[async_trait]
pub trait FsProvider: Send + Sync {
    async fn stat(&self, path: &str) -> FsResult<FileInfo>;

    async fn readdir(&self, path: &str) -> FsResult<Vec<FileInfo>>;

    async fn read(&self, path: &str) -> FsResult<Bytes>;
}
