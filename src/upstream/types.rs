//! 上游（OpenAI 兼容）请求/响应类型

use serde::{Deserialize, Serialize};

use crate::common::truncate_with_ellipsis;

/// 上游消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

/// 上游请求体
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// 上游成功响应（只解析网关需要的字段）
#[derive(Debug, Deserialize)]
pub struct UpstreamResponseBody {
    #[serde(default)]
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamChoice {
    pub message: Option<UpstreamMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// 上游错误响应 `{error: {message, code|type}}`
#[derive(Debug, Deserialize)]
pub struct UpstreamErrorBody {
    pub error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// 结构校验通过的上游结果
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamCompletion {
    pub content: String,
    pub finish_reason: String,
    /// 上游未返回 usage 时为 None，由网关估算
    pub usage: Option<(u64, u64)>,
}

impl UpstreamResponseBody {
    /// 校验响应结构，取第一个 choice
    pub fn into_completion(self) -> Result<UpstreamCompletion, UpstreamError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::InvalidResponse("response has no choices".to_string()))?;
        let message = choice.message.ok_or_else(|| {
            UpstreamError::InvalidResponse("first choice has no message".to_string())
        })?;

        Ok(UpstreamCompletion {
            content: message.content,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: self
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens)),
        })
    }
}

/// 上游调用失败
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// 上游返回非 2xx
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// 连接失败或超时
    Transport { message: String, timed_out: bool },
    /// 2xx 但响应结构无效
    InvalidResponse(String),
}

impl UpstreamError {
    /// 从上游错误响应构造，错误体不是 JSON 时保留截断后的原文
    pub fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<UpstreamErrorBody>(body) {
            Ok(parsed) => {
                let code = parsed
                    .error
                    .code
                    .map(|c| match c {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .or(parsed.error.error_type);
                UpstreamError::Http {
                    status,
                    code,
                    message: parsed
                        .error
                        .message
                        .unwrap_or_else(|| format!("HTTP {}", status)),
                }
            }
            Err(_) => UpstreamError::Http {
                status,
                code: None,
                message: if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    truncate_with_ellipsis(body.trim(), 512)
                },
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            UpstreamError::Http { code, .. } => code.as_deref(),
            UpstreamError::Transport { timed_out: true, .. } => Some("timeout"),
            UpstreamError::Transport { .. } => Some("connection_error"),
            UpstreamError::InvalidResponse(_) => Some("invalid_response"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UpstreamError::Http { message, .. } => message,
            UpstreamError::Transport { message, .. } => message,
            UpstreamError::InvalidResponse(message) => message,
        }
    }

    /// 是否值得换凭据重试
    ///
    /// 429/401/403/5xx、连接或超时错误，以及消息中包含 rate/limit/quota 的错误
    pub fn is_rotate_worthy(&self) -> bool {
        let by_kind = match self {
            UpstreamError::Http { status, .. } => {
                matches!(status, 401 | 403 | 429) || (500..=599).contains(status)
            }
            UpstreamError::Transport { .. } => true,
            UpstreamError::InvalidResponse(_) => false,
        };
        if by_kind {
            return true;
        }

        let message = self.message().to_lowercase();
        ["rate", "limit", "quota"]
            .iter()
            .any(|keyword| message.contains(keyword))
    }

    /// 轮换原因（用于日志）
    pub fn reason(&self) -> String {
        match self {
            UpstreamError::Http { status, .. } => format!("http_{}", status),
            UpstreamError::Transport { timed_out: true, .. } => "timeout".to_string(),
            UpstreamError::Transport { .. } => "connection_error".to_string(),
            UpstreamError::InvalidResponse(_) => "invalid_response".to_string(),
        }
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Http {
                status, message, ..
            } => write!(f, "upstream returned HTTP {}: {}", status, message),
            UpstreamError::Transport { message, .. } => {
                write!(f, "upstream transport error: {}", message)
            }
            UpstreamError::InvalidResponse(message) => {
                write!(f, "invalid upstream response: {}", message)
            }
        }
    }
}

impl std::error::Error for UpstreamError {}
