//! Chat Completions 端点处理器
//!
//! 校验 → 配额 → 分发 → 上报用量 → 响应

use std::time::Instant;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use uuid::Uuid;

use super::error::{GatewayError, REQUEST_ID_HEADER};
use super::middleware::AppState;
use super::types::{
    ChatCompletionResponse, Choice, RawChatRequest, ResponseMessage, Usage,
};
use super::validate::{ValidatedRequest, validate_request};
use crate::account::types::UsageRecord;
use crate::common::auth;
use crate::model::config::{Config, ModelConfig};
use crate::upstream::DispatchOutcome;
use crate::upstream::types::{UpstreamMessage, UpstreamRequest};

/// POST /v1/chat/completions
pub async fn post_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_chat(state, None, headers, body).await
}

/// POST /v1/{model}/chat/completions
pub async fn post_model_chat_completions(
    State(state): State<AppState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_chat(state, Some(model), headers, body).await
}

/// 单个请求的上下文，用于用量上报
struct RequestContext {
    request_id: String,
    endpoint: String,
    token: String,
    account_id: String,
    model: String,
    started: Instant,
}

impl RequestContext {
    fn usage_record(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        status_code: u16,
        error_message: Option<String>,
    ) -> UsageRecord {
        UsageRecord {
            request_id: self.request_id.clone(),
            account_id: self.account_id.clone(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms: self.started.elapsed().as_millis() as u64,
            status_code,
            error_message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// 上报失败请求并构建错误响应
    fn fail(&self, state: &AppState, error: GatewayError) -> Response {
        let record = self.usage_record(
            0,
            0,
            0.0,
            error.status_code().as_u16(),
            Some(error.to_string()),
        );
        state.usage.record(&self.token, record);
        error.into_response_with(&self.request_id)
    }
}

async fn handle_chat(
    state: AppState,
    path_model: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", Uuid::new_v4().simple());
    let endpoint = match &path_model {
        Some(model) => format!("/v1/{}/chat/completions", model),
        None => "/v1/chat/completions".to_string(),
    };

    let Some(token) = auth::extract_bearer(&headers) else {
        return GatewayError::Authentication("Missing bearer credential".into())
            .into_response_with(&request_id);
    };

    let raw: RawChatRequest = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            return GatewayError::Validation(format!("Invalid JSON body: {}", e))
                .into_response_with(&request_id);
        }
    };

    let request = match validate_request(raw, path_model.as_deref(), &state.config.models) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(request_id = %request_id, "请求校验失败: {}", e);
            return e.into_response_with(&request_id);
        }
    };

    #[cfg(feature = "sensitive-logs")]
    tracing::debug!(
        request_id = %request_id,
        body = %String::from_utf8_lossy(&body),
        "收到请求"
    );

    let account = match state.quota.authenticate(&token).await {
        Ok(account) => account,
        Err(e) => return e.into_response_with(&request_id),
    };

    let ctx = RequestContext {
        request_id,
        endpoint,
        token,
        account_id: account.account_id.clone(),
        model: request.model.clone(),
        started,
    };

    let model_config = state
        .config
        .models
        .get(&request.model)
        .cloned()
        .unwrap_or_default();

    let admission = match state
        .quota
        .enforce(&account, &request, &model_config.preamble)
        .await
    {
        Ok(admission) => admission,
        Err(e) => return ctx.fail(&state, e),
    };

    tracing::info!(
        request_id = %ctx.request_id,
        account_id = %admission.account_id,
        plan = %admission.plan,
        model = %request.model,
        messages = request.messages.len(),
        estimated_input_tokens = admission.estimated_input_tokens,
        "请求通过配额检查"
    );

    let upstream_request = build_upstream_request(&state.config, &request, &model_config);
    let success = match state.dispatcher.dispatch(&request.model, &upstream_request).await {
        Ok(DispatchOutcome::Success(success)) => success,
        Ok(DispatchOutcome::Exhausted(report)) => {
            return ctx.fail(&state, GatewayError::UpstreamExhausted(report));
        }
        Err(e) => {
            tracing::error!(model = %request.model, "模型配置错误: {}", e);
            return ctx.fail(&state, GatewayError::Configuration(e.to_string()));
        }
    };

    let completion = success.completion;
    let (prompt_tokens, completion_tokens) = completion.usage.unwrap_or_else(|| {
        (
            admission.estimated_input_tokens,
            state.quota.estimator().estimate(&completion.content),
        )
    });
    let usage = Usage::new(prompt_tokens, completion_tokens);
    let cost_usd = compute_cost(&model_config, prompt_tokens, completion_tokens);

    tracing::info!(
        request_id = %ctx.request_id,
        account_id = %ctx.account_id,
        model = %request.model,
        attempts = success.attempts,
        credential_index = success.credential_index,
        prompt_tokens,
        completion_tokens,
        latency_ms = ctx.started.elapsed().as_millis() as u64,
        "请求完成"
    );

    state.usage.record(
        &ctx.token,
        ctx.usage_record(prompt_tokens, completion_tokens, cost_usd, 200, None),
    );

    let body = ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: request.model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: completion.content,
            },
            finish_reason: completion.finish_reason,
        }],
        usage,
    };

    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// 构建上游请求，前置指令作为第一条 system 消息
fn build_upstream_request(
    config: &Config,
    request: &ValidatedRequest,
    model_config: &ModelConfig,
) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !model_config.preamble.trim().is_empty() {
        messages.push(UpstreamMessage {
            role: "system".to_string(),
            content: model_config.preamble.clone(),
        });
    }
    messages.extend(request.messages.iter().map(|m| UpstreamMessage {
        role: m.role.as_str().to_string(),
        content: m.content.clone(),
    }));

    UpstreamRequest {
        model: config.upstream_model_for(&request.model).to_string(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: false,
    }
}

/// 按每百万 token 价格计算费用（美元）
fn compute_cost(model_config: &ModelConfig, input_tokens: u64, output_tokens: u64) -> f64 {
    (input_tokens as f64 * model_config.input_cost_per_million
        + output_tokens as f64 * model_config.output_cost_per_million)
        / 1_000_000.0
}
