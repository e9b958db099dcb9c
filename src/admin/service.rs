//! Admin API 业务逻辑服务

use std::sync::Arc;

use super::error::AdminServiceError;
use super::types::{PoolStatusItem, PoolsStatusResponse};
use crate::account::AccountStore;
use crate::account::types::UsageSnapshot;
use crate::upstream::CredentialPool;

/// Admin 服务
///
/// 凭据池状态查询和账户用量报表
pub struct AdminService {
    pool: Arc<CredentialPool>,
    accounts: Arc<dyn AccountStore>,
}

impl AdminService {
    pub fn new(pool: Arc<CredentialPool>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { pool, accounts }
    }

    /// 获取所有模型的凭据池状态
    pub fn get_all_pools(&self) -> PoolsStatusResponse {
        let pools: Vec<PoolStatusItem> = self
            .pool
            .snapshot()
            .into_iter()
            .map(PoolStatusItem::from)
            .collect();

        PoolsStatusResponse {
            total: pools.len(),
            exhausted: pools.iter().filter(|p| p.exhausted).count(),
            pools,
        }
    }

    /// 重置模型的连续失败计数
    pub fn reset_pool(&self, model: &str) -> Result<(), AdminServiceError> {
        if !self.pool.contains(model) {
            return Err(AdminServiceError::ModelNotFound {
                model: model.to_string(),
            });
        }
        self.pool.reset_failures(model);
        tracing::info!(model = %model, "已通过 Admin API 重置凭据池失败计数");
        Ok(())
    }

    /// 获取账户用量快照
    pub async fn get_account_stats(
        &self,
        account_id: &str,
    ) -> Result<UsageSnapshot, AdminServiceError> {
        self.accounts
            .fetch_account_stats(account_id)
            .await
            .map_err(|e| AdminServiceError::from_account_error(e, account_id))
    }
}
