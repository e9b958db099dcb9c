//! 网关路由配置

use axum::{Router, routing::post};

use super::handlers::{post_chat_completions, post_model_chat_completions};
use super::middleware::AppState;

/// 创建网关路由
///
/// # 端点
/// - `POST /v1/chat/completions` - 模型由请求体指定
/// - `POST /v1/{model}/chat/completions` - 按模型路由，请求体中的模型必须一致
///
/// # 认证
/// `Authorization: Bearer <调用方凭据>`，由账户存储校验
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(post_chat_completions))
        .route(
            "/v1/{model}/chat/completions",
            post(post_model_chat_completions),
        )
        .with_state(state)
}
