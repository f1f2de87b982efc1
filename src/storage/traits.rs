use crate::{error::Result, models::HistoryEntry};
use async_trait::async_trait;

/// Where generated images and their history live. The protocol clients never
/// touch this; `Session` drives it after a generation completes.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the image bytes and returns a handle for later lookup or removal.
    async fn save_image(&self, bytes: &[u8]) -> Result<String>;

    async fn load_image(&self, handle: &str) -> Result<Option<Vec<u8>>>;

    async fn delete_image(&self, handle: &str) -> Result<()>;

    /// Replaces the stored history list, newest first.
    async fn save_history(&self, entries: &[HistoryEntry]) -> Result<()>;

    async fn load_history(&self) -> Result<Vec<HistoryEntry>>;
}
