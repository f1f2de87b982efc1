use crate::error::{Result, ZImageError};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Ask the transport to hand back the body as a byte stream.
    pub streaming: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            streaming: false,
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(serde_json::to_vec(body)?),
            streaming: false,
        })
    }

    pub fn bearer(self, api_key: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", api_key))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

pub enum ResponseBody {
    Complete(Vec<u8>),
    Stream(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Complete(bytes) => write!(f, "Complete({} bytes)", bytes.len()),
            ResponseBody::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Reads the whole body, draining the stream if there is one.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        match self.body {
            ResponseBody::Complete(bytes) => Ok(bytes),
            ResponseBody::Stream(stream) => {
                stream
                    .try_fold(Vec::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
            }
        }
    }
}

/// Anything that can carry a request to the inference host and return its response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            log::error!("HTTP request to {} failed: {}", request.url, e);
            ZImageError::from(e)
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // A JSON document means the server answered without event framing.
        let is_json = headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case("content-type") && value.starts_with("application/json")
        });

        let body = if request.streaming && !is_json && (200..300).contains(&status) {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ZImageError::from));
            ResponseBody::Stream(Box::pin(stream))
        } else {
            ResponseBody::Complete(response.bytes().await?.to_vec())
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::post_json("http://x/v1", &serde_json::json!({"a": 1}))
            .unwrap()
            .bearer("k")
            .header("X-ModelScope-Async-Mode", "true");
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
        assert!(request
            .headers
            .contains(&("Authorization".to_string(), "Bearer k".to_string())));
        assert!(!request.streaming);
    }

    #[tokio::test]
    async fn test_into_bytes_drains_stream() {
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(b"ab".to_vec()), Ok(b"cd".to_vec())];
        let response = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/event-stream".into())],
            body: ResponseBody::Stream(Box::pin(stream::iter(chunks))),
        };
        assert!(response.is_success());
        assert_eq!(response.header("content-type"), Some("text/event-stream"));
        assert_eq!(response.into_bytes().await.unwrap(), b"abcd".to_vec());
    }
}
