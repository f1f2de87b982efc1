use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GenerationRequest;

/// Metadata for one generated image, as kept by the caller's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub prompt: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub size: String,
    /// Handle returned by the store when the image bytes were saved.
    pub image_handle: String,
}

impl HistoryEntry {
    pub fn new(request: &GenerationRequest, image_handle: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: request.prompt.trim().to_string(),
            model: request.model.clone(),
            timestamp: Utc::now(),
            size: request.size.to_string(),
            image_handle: image_handle.into(),
        }
    }
}
