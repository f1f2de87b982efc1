use crate::{
    error::{Result, ZImageError},
    models::HistoryEntry,
    storage::traits::ImageStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, Vec<u8>>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().map(|images| images.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> ZImageError {
    ZImageError::StorageError("store lock poisoned".into())
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save_image(&self, bytes: &[u8]) -> Result<String> {
        let handle = format!("img_{}", Uuid::new_v4().simple());
        self.images
            .lock()
            .map_err(poisoned)?
            .insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    async fn load_image(&self, handle: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.images.lock().map_err(poisoned)?.get(handle).cloned())
    }

    async fn delete_image(&self, handle: &str) -> Result<()> {
        self.images.lock().map_err(poisoned)?.remove(handle);
        Ok(())
    }

    async fn save_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        *self.history.lock().map_err(poisoned)? = entries.to_vec();
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.history.lock().map_err(poisoned)?.clone())
    }
}
