//! 网关错误类型
//!
//! 每种错误对应一个 HTTP 状态码和一个稳定的错误码

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::types::ErrorResponse;
use crate::ratelimit::types::{Dimension, Limit};
use crate::upstream::ExhaustionReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// 请求体校验失败
    Validation(String),
    /// 缺少或无效的调用方凭据
    Authentication(String),
    /// 超出配额
    QuotaExceeded {
        dimension: Dimension,
        limit: Limit,
        count: u64,
        /// 窗口重置时间（Unix 毫秒）
        reset_at: i64,
        /// 计数器存储故障（故障关闭策略下的拒绝）
        store_error: Option<String>,
    },
    /// 上游重试耗尽
    UpstreamExhausted(ExhaustionReport),
    /// 网关配置错误（如模型未配置凭据）
    Configuration(String),
    /// 其他内部错误
    Unclassified(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamExhausted(_) | GatewayError::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Unclassified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::QuotaExceeded { .. } => "quota_exceeded",
            GatewayError::UpstreamExhausted(_) => "upstream_exhausted",
            GatewayError::Configuration(_) => "configuration_error",
            GatewayError::Unclassified(_) => "internal_error",
        }
    }

    /// 附加诊断信息
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::QuotaExceeded {
                dimension,
                limit,
                count,
                reset_at,
                store_error,
            } => {
                let mut details = json!({
                    "dimension": dimension.as_str(),
                    "limit": i64::from(*limit),
                    "count": count,
                    "reset_at": reset_at,
                });
                if let Some(error) = store_error {
                    details["store_error"] = json!(error);
                }
                Some(details)
            }
            GatewayError::UpstreamExhausted(report) => serde_json::to_value(report).ok(),
            _ => None,
        }
    }

    /// `Retry-After` 秒数（向上取整，至少 1 秒）
    pub fn retry_after_secs(&self, now_ms: i64) -> Option<u64> {
        match self {
            GatewayError::QuotaExceeded { reset_at, .. } => {
                let remaining_ms = (reset_at - now_ms).max(0) as u64;
                Some(remaining_ms.div_ceil(1000).max(1))
            }
            _ => None,
        }
    }

    /// 构建带请求 ID 的错误响应
    pub fn into_response_with(self, request_id: &str) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs(crate::common::now_millis());
        let body = ErrorResponse::new(self.code(), self.to_string(), request_id, self.details());

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Some(secs) = retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Validation(msg) => write!(f, "{}", msg),
            GatewayError::Authentication(msg) => write!(f, "{}", msg),
            GatewayError::QuotaExceeded {
                dimension,
                limit,
                store_error: None,
                ..
            } => write!(f, "Quota exceeded for {} (limit {})", dimension, limit),
            GatewayError::QuotaExceeded {
                dimension,
                store_error: Some(_),
                ..
            } => write!(
                f,
                "Quota check for {} is temporarily unavailable",
                dimension
            ),
            GatewayError::UpstreamExhausted(report) if report.fatal => {
                write!(f, "Upstream request failed: {}", report.last_error_message)
            }
            GatewayError::UpstreamExhausted(report) => write!(
                f,
                "Upstream unavailable after {} attempts: {}",
                report.attempts, report.last_error_message
            ),
            GatewayError::Configuration(msg) => write!(f, "{}", msg),
            GatewayError::Unclassified(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}
