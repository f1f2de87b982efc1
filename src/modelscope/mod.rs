pub mod chat_client;
pub mod image_client;
pub mod stream;

use crate::{
    config::ModelScopeConfig,
    transport::{HttpTransport, ReqwestTransport},
};
use std::sync::Arc;

pub use chat_client::ChatClient;
pub use image_client::ImageClient;

/// Both protocol clients over one shared transport.
#[derive(Clone)]
pub struct ModelScopeClient {
    image_client: ImageClient,
    chat_client: ChatClient,
}

impl ModelScopeClient {
    pub fn new(config: ModelScopeConfig) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()), config)
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: ModelScopeConfig) -> Self {
        log::debug!("Creating ModelScope client for {}", config.base_url);
        Self {
            image_client: ImageClient::new(transport.clone(), config.clone()),
            chat_client: ChatClient::new(transport, config),
        }
    }

    pub fn image(&self) -> &ImageClient {
        &self.image_client
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat_client
    }
}
