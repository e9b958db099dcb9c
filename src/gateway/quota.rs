//! 配额闸门
//!
//! 凭据校验 → 输入 token 估算 → 多维度限流 → 账户当日用量复核。
//! 任一步拒绝都会在调用上游之前返回。

use std::sync::Arc;

use chrono::{DateTime, Days, Utc};

use super::error::GatewayError;
use super::token::TokenEstimator;
use super::validate::ValidatedRequest;
use crate::account::AccountStore;
use crate::account::types::AccountValidation;
use crate::common::now_millis;
use crate::ratelimit::RateLimiter;
use crate::ratelimit::types::{Dimension, DimensionCheck};

/// 通过配额检查的请求
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub account_id: String,
    pub plan: String,
    /// 估算的输入 token 数
    pub estimated_input_tokens: u64,
}

pub struct QuotaGate {
    accounts: Arc<dyn AccountStore>,
    limiter: Arc<RateLimiter>,
    estimator: Arc<dyn TokenEstimator>,
}

impl QuotaGate {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        limiter: Arc<RateLimiter>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            accounts,
            limiter,
            estimator,
        }
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// 校验调用方凭据
    pub async fn authenticate(&self, token: &str) -> Result<AccountValidation, GatewayError> {
        let validation = self.accounts.validate_credential(token).await.map_err(|e| {
            tracing::error!("账户服务校验凭据失败: {}", e);
            GatewayError::Unclassified("Failed to validate credentials".into())
        })?;

        if !validation.valid {
            return Err(GatewayError::Authentication("Invalid API key".into()));
        }
        Ok(validation)
    }

    /// 对已认证的账户执行配额检查
    pub async fn enforce(
        &self,
        account: &AccountValidation,
        request: &ValidatedRequest,
        preamble: &str,
    ) -> Result<Admission, GatewayError> {
        self.enforce_at(account, request, preamble, now_millis())
            .await
    }

    pub async fn enforce_at(
        &self,
        account: &AccountValidation,
        request: &ValidatedRequest,
        preamble: &str,
        now_ms: i64,
    ) -> Result<Admission, GatewayError> {
        let estimated = self.estimator.estimate_request(&request.messages, preamble);
        let limits = &account.limits;

        let checks = [
            DimensionCheck {
                dimension: Dimension::RequestsPerSecond,
                limit: limits.requests_per_second,
                increment: 1,
            },
            DimensionCheck {
                dimension: Dimension::RequestsPerDay,
                limit: limits.daily_requests,
                increment: 1,
            },
            DimensionCheck {
                dimension: Dimension::TokensPerMinute,
                limit: limits.tokens_per_minute,
                increment: estimated,
            },
        ];

        let result = self
            .limiter
            .check_dimensions_at(&account.account_id, &checks, now_ms)
            .await;
        for (dimension, error) in &result.errors {
            tracing::warn!(
                account_id = %account.account_id,
                dimension = %dimension,
                "限流检查存储故障: {}",
                error
            );
        }

        if let Some(denial) = result.denied {
            tracing::info!(
                account_id = %account.account_id,
                dimension = %denial.dimension,
                limit = %denial.limit,
                count = denial.outcome.count,
                "请求被限流"
            );
            return Err(GatewayError::QuotaExceeded {
                dimension: denial.dimension,
                limit: denial.limit,
                count: denial.outcome.count,
                reset_at: denial.outcome.reset_at.unwrap_or(now_ms),
                store_error: denial.outcome.error,
            });
        }

        // 账户服务记录的当日用量可能来自其他网关实例
        if limits.daily_requests.is_reached_by(account.usage.requests_today) {
            tracing::info!(
                account_id = %account.account_id,
                limit = %limits.daily_requests,
                requests_today = account.usage.requests_today,
                "账户当日请求数已达上限"
            );
            return Err(GatewayError::QuotaExceeded {
                dimension: Dimension::RequestsPerDay,
                limit: limits.daily_requests,
                count: account.usage.requests_today,
                reset_at: next_utc_midnight_ms(now_ms),
                store_error: None,
            });
        }

        Ok(Admission {
            account_id: account.account_id.clone(),
            plan: account.plan.clone(),
            estimated_input_tokens: estimated,
        })
    }
}

/// 下一个 UTC 零点（Unix 毫秒）
fn next_utc_midnight_ms(now_ms: i64) -> i64 {
    DateTime::<Utc>::from_timestamp_millis(now_ms)
        .and_then(|now| now.date_naive().checked_add_days(Days::new(1)))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or(now_ms + Dimension::RequestsPerDay.window_ms())
}
