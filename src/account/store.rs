//! 外部账户存储接口

use async_trait::async_trait;

use super::types::{AccountValidation, UsageRecord, UsageSnapshot};

/// 账户存储错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStoreError {
    /// 账户不存在
    NotFound(String),
    /// 账户服务不可达或返回服务端错误
    Unavailable(String),
    /// 响应无法解析
    InvalidResponse(String),
}

impl std::fmt::Display for AccountStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStoreError::NotFound(id) => write!(f, "account '{}' not found", id),
            AccountStoreError::Unavailable(msg) => write!(f, "account store unavailable: {}", msg),
            AccountStoreError::InvalidResponse(msg) => {
                write!(f, "invalid account store response: {}", msg)
            }
        }
    }
}

impl std::error::Error for AccountStoreError {}

/// 账户存储
///
/// 调用方身份、配额声明和用量的权威来源。网关只通过这三个操作访问它。
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// 校验调用方凭据，凭据无效时返回 `valid: false` 而不是错误
    async fn validate_credential(&self, token: &str) -> Result<AccountValidation, AccountStoreError>;

    /// 上报单次请求用量
    async fn record_usage(&self, token: &str, record: &UsageRecord) -> Result<(), AccountStoreError>;

    /// 获取账户用量快照（报表接口使用，不在分发路径上）
    async fn fetch_account_stats(&self, account_id: &str) -> Result<UsageSnapshot, AccountStoreError>;
}
