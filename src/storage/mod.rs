mod app_fs;

pub use app_fs::*;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub trait StorageFile: AsyncWriteExt + Unpin + Send {}

/// Where configuration documents are saved to and loaded from. Paths are `/` separated
/// and relative to the storage root.
#[async_trait]
pub trait Storage: Sync + Send + Clone {
    type File: StorageFile;

    async fn exists(&self, path: &str) -> std::io::Result<bool>;
    async fn read(&self, path: &str) -> std::io::Result<Option<Vec<u8>>>;
    async fn write(&self, path: &str, content: impl AsRef<[u8]> + Send) -> std::io::Result<()>;
    async fn create(&self, path: &str) -> std::io::Result<Self::File>;
    async fn list(&self, path: &str) -> std::io::Result<Vec<String>>;
    async fn mv(&self, from: &str, to: &str) -> std::io::Result<()>;
    fn path_buf(&self, path: &str) -> PathBuf;
}
