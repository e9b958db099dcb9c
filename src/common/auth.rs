//! 请求认证工具

use axum::{body::Body, http::Request};
use http::HeaderMap;
use subtle::ConstantTimeEq;

/// 从 `Authorization: Bearer <token>` 中提取调用方凭据（认证方案不区分大小写）
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim_start();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|v| !v.is_empty())
}

/// 提取 API Key
///
/// 优先读取 `x-api-key`，其次读取 `Authorization: Bearer`
pub fn extract_api_key(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .or_else(|| extract_bearer(request.headers()))
}

/// 常量时间字符串比较，防止时序攻击
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
