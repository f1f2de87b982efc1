use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Image,
    Chat,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub category: ModelCategory,
}

pub const IMAGE_MODELS: &[ModelInfo] = &[
    image_model("Tongyi-MAI/Z-Image-Turbo", "Z-Image-Turbo (Fast)"),
    image_model("Qwen/Qwen-Image", "Qwen-Image"),
    image_model("KookYan/Kook_Qwen_zshx_v2", "Realistic Fantasy V2"),
    image_model("MAILAND/majicflus_v1", "MajicFlus"),
    image_model("merjic/majicbeauty-qwen1", "MajicBeauty Qwen"),
    image_model("MusePublic/majicMIX_realistic", "MajicMIX Realistic"),
    image_model("WANGMOON/MAJICFLUS-photo", "MajicFlus Photo"),
    image_model(
        "yiwanji/FLUX_xiao_hong_shu_ji_zhi_zhen_shi_V2",
        "FLUX Ultra Realistic V2",
    ),
    image_model("MusePublic/46_ckpt_SD_XL", "Asian Portrait SDXL"),
];

pub const CHAT_MODELS: &[ModelInfo] = &[
    chat_model("deepseek-ai/DeepSeek-V3.2", "DeepSeek-V3.2"),
    chat_model(
        "Qwen/Qwen3-235B-A22B-Instruct-2507",
        "Qwen3-235B-A22B-Instruct-2507",
    ),
];

const fn image_model(id: &'static str, label: &'static str) -> ModelInfo {
    ModelInfo {
        id,
        label,
        category: ModelCategory::Image,
    }
}

const fn chat_model(id: &'static str, label: &'static str) -> ModelInfo {
    ModelInfo {
        id,
        label,
        category: ModelCategory::Chat,
    }
}

/// Details pulled out of a failed HTTP response.
///
/// `Display` renders the single composed message callers should show; the
/// individual fields are there for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiErrorInfo {
    pub http_status: u16,
    pub provider_code: Option<String>,
    pub provider_type: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
}

impl ApiErrorInfo {
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let json = serde_json::from_slice::<Value>(body)
            .ok()
            .filter(Value::is_object);

        let Some(json) = json else {
            let text = String::from_utf8_lossy(body).trim().to_string();
            return Self {
                http_status: status,
                provider_code: None,
                provider_type: None,
                message: if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text
                },
                request_id: None,
            };
        };

        let nested = &json["error"];
        Self {
            http_status: status,
            provider_code: string_field(&nested["code"]).or_else(|| string_field(&json["code"])),
            provider_type: string_field(&nested["type"]).or_else(|| string_field(&json["type"])),
            message: provider_message(&json).unwrap_or_else(|| "Unknown error".to_string()),
            request_id: string_field(&json["request_id"])
                .or_else(|| string_field(&json["requestId"])),
        }
    }
}

impl fmt::Display for ApiErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chat error {}", self.http_status)?;
        if let Some(code) = &self.provider_code {
            write!(f, " [{}]", code)?;
        }
        if let Some(kind) = &self.provider_type {
            write!(f, " ({})", kind)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " | req: {}", request_id)?;
        }
        Ok(())
    }
}

/// Provider error text from `error.message`, `errors.message` or `message`.
pub fn provider_message(json: &Value) -> Option<String> {
    string_field(&json["error"]["message"])
        .or_else(|| string_field(&json["errors"]["message"]))
        .or_else(|| string_field(&json["message"]))
}

/// Non-empty string or number, as providers send codes either way.
fn string_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
