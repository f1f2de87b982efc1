use crate::error::{Result, ZImageError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(1024, 1024)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = ZImageError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ZImageError::InvalidRequest(format!("size must be WIDTHxHEIGHT, got {:?}", s));
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self::new(width, height))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub count: u32,
    pub size: ImageSize,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            count: 1,
            size: ImageSize::default(),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(ZImageError::InvalidRequest("prompt must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ZImageError::InvalidRequest("model must not be empty".into()));
        }
        if self.count == 0 {
            return Err(ZImageError::InvalidRequest("count must be positive".into()));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": self.prompt.trim(),
            "n": self.count,
            "size": self.size.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "RUNNING" | "PROCESSING" => TaskStatus::Running,
            "SUCCEED" | "SUCCEEDED" => TaskStatus::Succeeded,
            "FAILED" => TaskStatus::Failed,
            _ => TaskStatus::Other(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Where a finished image lives: remote URL or base64 carried in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Url(String),
    Inline(String),
}

impl ImageReference {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('/') || has_http_scheme(raw) {
            return ImageReference::Url(raw.to_string());
        }
        // data:image/png;base64,<payload>
        if let Some(rest) = raw.strip_prefix("data:") {
            if let Some((_, payload)) = rest.split_once(',') {
                return ImageReference::Inline(payload.to_string());
            }
        }
        ImageReference::Inline(raw.to_string())
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            ImageReference::Url(url) => Some(url),
            ImageReference::Inline(_) => None,
        }
    }

    pub fn decode_inline(&self) -> Result<Vec<u8>> {
        match self {
            ImageReference::Inline(data) => {
                let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map_err(|e| ZImageError::DecodeError(format!("invalid inline image data: {}", e)))
            }
            ImageReference::Url(url) => Err(ZImageError::DecodeError(format!(
                "{} is a URL, not inline data",
                url
            ))),
        }
    }
}

fn has_http_scheme(raw: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        raw.get(..scheme.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(scheme))
    })
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageReference::Url(url) => write!(f, "{}", url),
            ImageReference::Inline(data) => write!(f, "<inline image, {} base64 chars>", data.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub id: String,
    pub status: TaskStatus,
    pub outputs: Vec<ImageReference>,
    pub failure_message: Option<String>,
}

impl GenerationTask {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            outputs: Vec::new(),
            failure_message: None,
        }
    }

    /// Folds a poll response into the task.
    pub fn apply(&mut self, response: TaskStatusResponse) {
        self.status = match &response.task_status {
            Some(serde_json::Value::String(raw)) => TaskStatus::parse(raw),
            Some(serde_json::Value::Null) | None => TaskStatus::Other(String::new()),
            Some(other) => TaskStatus::Other(other.to_string()),
        };
        self.outputs = response
            .output_images
            .unwrap_or_default()
            .into_iter()
            .filter_map(OutputImage::into_reference)
            .collect();
        self.failure_message = response
            .message
            .filter(|m| !m.is_empty())
            .or_else(|| response.errors.and_then(|e| e.message));
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub task_id: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusResponse {
    /// Kept loose: a null or non-string status still means "not done yet".
    #[serde(default)]
    pub task_status: Option<serde_json::Value>,
    pub output_images: Option<Vec<OutputImage>>,
    pub message: Option<String>,
    pub errors: Option<TaskErrors>,
}

#[derive(Debug, Deserialize)]
pub struct TaskErrors {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OutputImage {
    Raw(String),
    Object {
        url: Option<String>,
        b64_json: Option<String>,
    },
}

impl OutputImage {
    fn into_reference(self) -> Option<ImageReference> {
        match self {
            OutputImage::Raw(raw) if !raw.trim().is_empty() => Some(ImageReference::parse(&raw)),
            OutputImage::Raw(_) => None,
            OutputImage::Object { url: Some(url), .. } if !url.is_empty() => {
                Some(ImageReference::Url(url))
            }
            OutputImage::Object {
                b64_json: Some(data),
                ..
            } => Some(ImageReference::Inline(data)),
            OutputImage::Object { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolutionPreset {
    pub ratio: &'static str,
    pub size: ImageSize,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolutionGroup {
    pub name: &'static str,
    pub presets: &'static [ResolutionPreset],
}

const fn preset(ratio: &'static str, width: u32, height: u32) -> ResolutionPreset {
    ResolutionPreset {
        ratio,
        size: ImageSize::new(width, height),
    }
}

pub const RESOLUTION_GROUPS: &[ResolutionGroup] = &[
    ResolutionGroup {
        name: "Standard (SD)",
        presets: &[
            preset("1:1", 512, 512),
            preset("3:4", 768, 1024),
            preset("4:3", 640, 480),
            preset("16:9", 640, 360),
            preset("9:16", 360, 640),
            preset("3:2", 720, 480),
            preset("2:3", 480, 720),
            preset("21:9", 840, 360),
        ],
    },
    ResolutionGroup {
        name: "High Definition (HD)",
        presets: &[
            preset("1:1", 1024, 1024),
            preset("3:4", 1152, 1536),
            preset("4:3", 1280, 960),
            preset("16:9", 1600, 900),
            preset("9:16", 900, 1600),
            preset("3:2", 1536, 1024),
            preset("2:3", 1024, 1536),
            preset("21:9", 1680, 720),
        ],
    },
    ResolutionGroup {
        name: "Ultra HD (2K/4K)",
        presets: &[
            preset("1:1", 2048, 2048),
            preset("3:4", 1536, 2048),
            preset("4:3", 2048, 1536),
            preset("16:9", 2048, 1152),
            preset("9:16", 1152, 2048),
            preset("3:2", 2048, 1365),
            preset("2:3", 1365, 2048),
            preset("21:9", 2048, 876),
        ],
    },
];
