//! Admin 服务错误类型

use std::fmt;

use axum::http::StatusCode;

use super::types::AdminErrorResponse;
use crate::account::AccountStoreError;

/// Admin 服务错误
#[derive(Debug)]
pub enum AdminServiceError {
    /// 模型未配置
    ModelNotFound { model: String },

    /// 账户不存在
    AccountNotFound { account_id: String },

    /// 账户服务错误（网络错误、响应异常）
    UpstreamError(String),

    /// 内部状态错误
    InternalError(String),
}

impl fmt::Display for AdminServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminServiceError::ModelNotFound { model } => {
                write!(f, "模型不存在: {}", model)
            }
            AdminServiceError::AccountNotFound { account_id } => {
                write!(f, "账户不存在: {}", account_id)
            }
            AdminServiceError::UpstreamError(msg) => write!(f, "账户服务错误: {}", msg),
            AdminServiceError::InternalError(msg) => write!(f, "内部错误: {}", msg),
        }
    }
}

impl std::error::Error for AdminServiceError {}

impl AdminServiceError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminServiceError::ModelNotFound { .. }
            | AdminServiceError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
            AdminServiceError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            AdminServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 转换为 API 错误响应
    pub fn into_response(self) -> AdminErrorResponse {
        match &self {
            AdminServiceError::ModelNotFound { .. }
            | AdminServiceError::AccountNotFound { .. } => {
                AdminErrorResponse::not_found(self.to_string())
            }
            AdminServiceError::UpstreamError(_) => AdminErrorResponse::api_error(self.to_string()),
            AdminServiceError::InternalError(_) => {
                AdminErrorResponse::internal_error(self.to_string())
            }
        }
    }

    /// 从账户存储错误转换
    pub fn from_account_error(e: AccountStoreError, account_id: &str) -> Self {
        match e {
            AccountStoreError::NotFound(_) => AdminServiceError::AccountNotFound {
                account_id: account_id.to_string(),
            },
            AccountStoreError::Unavailable(msg) | AccountStoreError::InvalidResponse(msg) => {
                AdminServiceError::UpstreamError(msg)
            }
        }
    }
}
