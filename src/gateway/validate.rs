//! 请求校验

use std::collections::BTreeMap;

use super::error::GatewayError;
use super::types::{ChatMessage, RawChatRequest, Role};
use crate::model::config::ModelConfig;

pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const MAX_OUTPUT_TOKENS: i64 = 8192;

/// 校验通过的请求，之后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// 校验原始请求
///
/// `path_model` 为按模型路由时路径中的模型名，请求体中的模型必须与之相同
pub fn validate_request(
    raw: RawChatRequest,
    path_model: Option<&str>,
    models: &BTreeMap<String, ModelConfig>,
) -> Result<ValidatedRequest, GatewayError> {
    let model = match (raw.model, path_model) {
        (Some(model), Some(path)) if model != path => {
            return Err(GatewayError::Validation(format!(
                "Model '{}' in body does not match endpoint model '{}'",
                model, path
            )));
        }
        (Some(model), _) => model,
        (None, _) => return Err(GatewayError::Validation("Missing required field: model".into())),
    };
    if !models.contains_key(&model) {
        return Err(GatewayError::Validation(format!("Unknown model '{}'", model)));
    }

    if raw.stream == Some(true) {
        return Err(GatewayError::Validation(
            "Streaming responses are not supported".into(),
        ));
    }

    let raw_messages = raw.messages.unwrap_or_default();
    if raw_messages.is_empty() {
        return Err(GatewayError::Validation(
            "messages must contain at least one message".into(),
        ));
    }

    let mut messages = Vec::with_capacity(raw_messages.len());
    for (i, message) in raw_messages.into_iter().enumerate() {
        let role = message.role.as_deref().unwrap_or_default();
        let role = Role::parse(role).ok_or_else(|| {
            GatewayError::Validation(format!(
                "messages[{}].role must be one of system, user, assistant",
                i
            ))
        })?;
        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GatewayError::Validation(format!(
                "messages[{}].content must not be empty",
                i
            )));
        }
        messages.push(ChatMessage { role, content });
    }

    let temperature = raw.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(GatewayError::Validation(
            "temperature must be between 0 and 2".into(),
        ));
    }

    let max_tokens = match raw.max_tokens {
        None => DEFAULT_MAX_TOKENS,
        Some(n) if (1..=MAX_OUTPUT_TOKENS).contains(&n) => n as u32,
        Some(_) => {
            return Err(GatewayError::Validation(format!(
                "max_tokens must be between 1 and {}",
                MAX_OUTPUT_TOKENS
            )));
        }
    };

    Ok(ValidatedRequest {
        model,
        messages,
        temperature,
        max_tokens,
    })
}
