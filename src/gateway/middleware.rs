//! 网关共享状态和中间件层

use std::sync::Arc;

use super::quota::QuotaGate;
use super::usage::UsageRecorder;
use crate::model::config::Config;
use crate::upstream::RetryDispatcher;

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 启动时加载的配置（模型集合、前置指令、价格）
    pub config: Arc<Config>,
    /// 配额闸门
    pub quota: Arc<QuotaGate>,
    /// 上游重试分发器（持有凭据池）
    pub dispatcher: Arc<RetryDispatcher>,
    /// 用量上报器
    pub usage: UsageRecorder,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        quota: QuotaGate,
        dispatcher: Arc<RetryDispatcher>,
        usage: UsageRecorder,
    ) -> Self {
        Self {
            config,
            quota: Arc::new(quota),
            dispatcher,
            usage,
        }
    }
}

/// CORS 中间件层
///
/// 允许所有来源，部署在内网之外时按需收紧
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            axum::http::HeaderName::from_static(super::error::REQUEST_ID_HEADER),
            axum::http::header::RETRY_AFTER,
        ])
}
