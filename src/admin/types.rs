//! Admin API 类型定义

use serde::{Deserialize, Serialize};

use crate::upstream::pool::PoolStatus;

// ============ 凭据池状态 ============

/// 所有模型凭据池状态响应
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsStatusResponse {
    /// 模型数量
    pub total: usize,
    /// 凭据已全部失败的模型数量
    pub exhausted: usize,
    pub pools: Vec<PoolStatusItem>,
}

/// 单个模型的凭据池状态
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatusItem {
    pub model: String,
    /// 凭据数量
    pub size: usize,
    pub current_index: usize,
    /// 连续失败次数
    pub failure_count: u32,
    pub exhausted: bool,
    /// 凭据 SHA-256 指纹（不暴露明文）
    pub fingerprints: Vec<String>,
}

impl From<PoolStatus> for PoolStatusItem {
    fn from(status: PoolStatus) -> Self {
        Self {
            model: status.model,
            size: status.size,
            current_index: status.current_index,
            failure_count: status.failure_count,
            exhausted: status.exhausted,
            fingerprints: status.fingerprints,
        }
    }
}

// ============ 通用响应 ============

/// 操作成功响应
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminErrorResponse {
    pub error: AdminError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl AdminErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: AdminError {
                error_type: error_type.into(),
                message: message.into(),
            },
        }
    }

    pub fn authentication_error() -> Self {
        Self::new("authentication_error", "Invalid or missing admin API key")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new("api_error", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}
