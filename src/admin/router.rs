//! Admin API 路由配置

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::{
    handlers::{get_account_stats, get_all_pools, reset_pool},
    middleware::{AdminState, admin_auth_middleware},
};

/// 创建 Admin API 路由
///
/// # 端点
/// - `GET /pools` - 获取所有模型的凭据池状态
/// - `POST /pools/{model}/reset` - 重置失败计数
/// - `GET /accounts/{account_id}/stats` - 获取账户用量
///
/// # 认证
/// 需要 Admin API Key 认证，支持：
/// - `x-api-key` header
/// - `Authorization: Bearer <token>` header
pub fn create_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/pools", get(get_all_pools))
        .route("/pools/{model}/reset", post(reset_pool))
        .route("/accounts/{account_id}/stats", get(get_account_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
