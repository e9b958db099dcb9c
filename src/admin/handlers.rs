//! Admin API HTTP 处理器

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use super::{middleware::AdminState, types::SuccessResponse};

/// GET /api/admin/pools
/// 获取所有模型的凭据池状态
pub async fn get_all_pools(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.service.get_all_pools())
}

/// POST /api/admin/pools/{model}/reset
/// 重置模型凭据池的失败计数
pub async fn reset_pool(
    State(state): State<AdminState>,
    Path(model): Path<String>,
) -> impl IntoResponse {
    match state.service.reset_pool(&model) {
        Ok(_) => Json(SuccessResponse::new(format!(
            "模型 {} 的失败计数已重置",
            model
        )))
        .into_response(),
        Err(e) => (e.status_code(), Json(e.into_response())).into_response(),
    }
}

/// GET /api/admin/accounts/{account_id}/stats
/// 获取账户用量快照
pub async fn get_account_stats(
    State(state): State<AdminState>,
    Path(account_id): Path<String>,
) -> impl IntoResponse {
    match state.service.get_account_stats(&account_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (e.status_code(), Json(e.into_response())).into_response(),
    }
}
