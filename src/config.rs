use crate::error::{Result, ZImageError};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.modelscope.cn";
pub const DEFAULT_IMAGE_MODEL: &str = "Tongyi-MAI/Z-Image-Turbo";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-ai/DeepSeek-V3.2";
pub const DEFAULT_MAX_CHAT_TOKENS: u32 = 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Keep answers short and get straight to the point. You are JARVIS, Iron Man's assistant.";

#[derive(Debug, Clone)]
pub struct ModelScopeConfig {
    /// Upstream host or a same-origin proxy prefix that forwards to it.
    pub base_url: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub chat_model: String,
    pub system_prompt: String,
    pub max_chat_tokens: u32,
    pub poll_interval: Duration,
}

impl Default for ModelScopeConfig {
    fn default() -> Self {
        ModelScopeConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_chat_tokens: DEFAULT_MAX_CHAT_TOKENS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ModelScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = env::var("MODELSCOPE_BASE_URL").unwrap_or(defaults.base_url);
        let api_key = env::var("MODELSCOPE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let image_model = env::var("ZIMAGE_IMAGE_MODEL").unwrap_or(defaults.image_model);
        let chat_model = env::var("ZIMAGE_CHAT_MODEL").unwrap_or(defaults.chat_model);
        let max_chat_tokens = env::var("ZIMAGE_MAX_CHAT_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_chat_tokens);
        let poll_interval = env::var("ZIMAGE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        ModelScopeConfig {
            base_url,
            api_key,
            image_model,
            chat_model,
            system_prompt: defaults.system_prompt,
            max_chat_tokens,
            poll_interval,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_chat_tokens(mut self, max_tokens: u32) -> Self {
        self.max_chat_tokens = max_tokens;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ZImageError::ConfigError("API key is required".into()))
    }

    /// Joins `path` onto the base URL without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Turns a host-relative reference such as `/api/proxy/files/a.png` into an
    /// absolute URL on the configured host. Absolute URLs pass through.
    pub fn resolve_url(&self, url: &str) -> String {
        if !url.starts_with('/') {
            return url.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let origin = match base.find("://") {
            Some(scheme_end) => {
                let host_start = scheme_end + 3;
                match base[host_start..].find('/') {
                    Some(path_start) => &base[..host_start + path_start],
                    None => base,
                }
            }
            None => base,
        };
        format!("{}{}", origin, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelScopeConfig::new();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_chat_tokens, 1024);
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_endpoint_joins_proxy_prefix() {
        let config = ModelScopeConfig::new().with_base_url("http://localhost:3000/api/proxy/");
        assert_eq!(
            config.endpoint("/v1/tasks/t1"),
            "http://localhost:3000/api/proxy/v1/tasks/t1"
        );
    }

    #[test]
    fn test_resolve_relative_reference() {
        let config = ModelScopeConfig::new().with_base_url("http://localhost:3000/api/proxy");
        assert_eq!(
            config.resolve_url("/api/proxy/files/a.png"),
            "http://localhost:3000/api/proxy/files/a.png"
        );
        assert_eq!(config.resolve_url("https://cdn/a.png"), "https://cdn/a.png");
        assert_eq!(
            ModelScopeConfig::new()
                .with_base_url("http://localhost:3000")
                .resolve_url("/a.png"),
            "http://localhost:3000/a.png"
        );
    }

    #[test]
    fn test_builder() {
        let config = ModelScopeConfig::new()
            .with_api_key("ms-key")
            .with_chat_model("Qwen/Qwen3-235B-A22B-Instruct-2507")
            .with_poll_interval(Duration::from_millis(10));
        assert_eq!(config.api_key().unwrap(), "ms-key");
        assert_eq!(config.chat_model, "Qwen/Qwen3-235B-A22B-Instruct-2507");
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }
}
