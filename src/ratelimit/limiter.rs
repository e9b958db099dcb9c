//! 固定窗口限流器
//!
//! 窗口序号 = floor(now / window)，存储键 = `key:窗口序号`，
//! 重置时间 = (窗口序号 + 1) × window。过期的键不会被再次读到，
//! 清理只是为了控制表大小。

use std::sync::Arc;

use futures::future::join_all;

use super::store::CounterStore;
use super::types::{
    DimensionCheck, DimensionDenial, FailPolicy, Limit, MultiCheckResult, RateLimitOutcome,
};
use crate::common::now_millis;

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: FailPolicy,
    gc_batch_size: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: FailPolicy, gc_batch_size: u32) -> Self {
        Self {
            store,
            policy,
            gc_batch_size,
        }
    }

    /// 对 `key` 累加 `increment` 并判断是否超出 `limit`
    pub async fn check(
        &self,
        key: &str,
        limit: Limit,
        window_ms: i64,
        increment: u64,
    ) -> RateLimitOutcome {
        self.check_at(key, limit, window_ms, increment, now_millis())
            .await
    }

    /// 以指定时间点执行检查
    pub async fn check_at(
        &self,
        key: &str,
        limit: Limit,
        window_ms: i64,
        increment: u64,
        now_ms: i64,
    ) -> RateLimitOutcome {
        let Limit::Limit(max) = limit else {
            return RateLimitOutcome::unlimited();
        };

        let window_ms = window_ms.max(1);
        let window_index = now_ms.div_euclid(window_ms);
        let reset_at = (window_index + 1) * window_ms;
        let storage_key = format!("{}:{}", key, window_index);

        let store = self.store.clone();
        let gc_batch_size = self.gc_batch_size;
        let result = tokio::task::spawn_blocking(move || {
            if gc_batch_size > 0 {
                match store.purge_expired(now_ms, gc_batch_size) {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "已清理过期限流计数器"),
                    Err(e) => tracing::debug!("清理过期限流计数器失败: {}", e),
                }
            }
            store.increment(&storage_key, increment, reset_at)
        })
        .await;

        match result {
            Ok(Ok(count)) => RateLimitOutcome {
                allowed: count <= max,
                count,
                remaining: Some(max.saturating_sub(count)),
                reset_at: Some(reset_at),
                error: None,
            },
            Ok(Err(e)) => self.on_store_error(key, max, reset_at, e.to_string()),
            Err(e) => self.on_store_error(key, max, reset_at, format!("限流任务异常: {}", e)),
        }
    }

    fn on_store_error(&self, key: &str, max: u64, reset_at: i64, error: String) -> RateLimitOutcome {
        let allowed = self.policy == FailPolicy::Open;
        tracing::warn!(
            key = %key,
            policy = ?self.policy,
            allowed,
            "限流计数器存储故障: {}",
            error
        );
        RateLimitOutcome {
            allowed,
            count: 0,
            remaining: Some(max),
            reset_at: Some(reset_at),
            error: Some(error),
        }
    }

    /// 并发检查多个维度，键为 `subject:维度名`
    ///
    /// 任一维度拒绝则整体拒绝，附带第一个拒绝维度的详情；
    /// 单个维度存储故障按故障策略处理，不会让整体检查失败。
    pub async fn check_dimensions(
        &self,
        subject: &str,
        checks: &[DimensionCheck],
    ) -> MultiCheckResult {
        self.check_dimensions_at(subject, checks, now_millis())
            .await
    }

    pub async fn check_dimensions_at(
        &self,
        subject: &str,
        checks: &[DimensionCheck],
        now_ms: i64,
    ) -> MultiCheckResult {
        let outcomes = join_all(checks.iter().copied().map(|check| async move {
            let key = format!("{}:{}", subject, check.dimension.as_str());
            let outcome = self
                .check_at(
                    &key,
                    check.limit,
                    check.dimension.window_ms(),
                    check.increment,
                    now_ms,
                )
                .await;
            (check, outcome)
        }))
        .await;

        let mut result = MultiCheckResult::default();
        for (check, outcome) in outcomes {
            if let Some(error) = &outcome.error {
                result.errors.push((check.dimension, error.clone()));
            }
            if !outcome.allowed && result.denied.is_none() {
                result.denied = Some(DimensionDenial {
                    dimension: check.dimension,
                    limit: check.limit,
                    outcome,
                });
            }
        }
        result
    }
}
