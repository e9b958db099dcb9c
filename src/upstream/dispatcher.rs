//! 重试分发器
//!
//! 每个请求的状态机：尝试 → 成功 / 可轮换失败（轮换凭据、线性退避后重试）/ 致命失败。
//! 终态只有 Success 和 Exhausted。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::client::UpstreamClient;
use super::pool::{CredentialPool, PoolError};
use super::types::{UpstreamCompletion, UpstreamRequest};
use crate::model::config::RetryConfig;

/// 成功结果
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSuccess {
    pub completion: UpstreamCompletion,
    /// 本次成功使用的凭据索引
    pub credential_index: usize,
    pub attempts: u32,
}

/// 重试耗尽后的诊断汇总（只保留最后一次尝试的错误）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustionReport {
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_code: Option<String>,
    pub last_error_message: String,
    /// 自上次成功以来是否每个凭据都已失败
    pub all_credentials_exhausted: bool,
    /// 是否因不可重试的错误提前终止
    pub fatal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success(DispatchSuccess),
    Exhausted(ExhaustionReport),
}

pub struct RetryDispatcher {
    pool: Arc<CredentialPool>,
    upstream: Arc<dyn UpstreamClient>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryDispatcher {
    pub fn new(
        pool: Arc<CredentialPool>,
        upstream: Arc<dyn UpstreamClient>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            pool,
            upstream,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn from_config(
        pool: Arc<CredentialPool>,
        upstream: Arc<dyn UpstreamClient>,
        retry: &RetryConfig,
    ) -> Self {
        Self::new(
            pool,
            upstream,
            retry.max_retries,
            Duration::from_millis(retry.retry_delay_ms),
        )
    }

    /// 分发请求到上游
    ///
    /// 模型没有可用凭据时返回 `PoolError`，其余失败都归入 `Exhausted`
    pub async fn dispatch(
        &self,
        model: &str,
        request: &UpstreamRequest,
    ) -> Result<DispatchOutcome, PoolError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let credential = self.pool.current(model)?;

            let error = match self.upstream.complete(&credential, request).await {
                Ok(completion) => {
                    self.pool.reset_failures(model);
                    if attempt > 1 {
                        tracing::info!(
                            model = %model,
                            attempt,
                            credential_index = credential.index,
                            "上游调用在重试后成功"
                        );
                    }
                    return Ok(DispatchOutcome::Success(DispatchSuccess {
                        completion,
                        credential_index: credential.index,
                        attempts: attempt,
                    }));
                }
                Err(error) => error,
            };

            let rotate = error.is_rotate_worthy();
            tracing::warn!(
                model = %model,
                attempt,
                max_retries = self.max_retries,
                credential_index = credential.index,
                status = ?error.status(),
                code = ?error.code(),
                rotate,
                "上游调用失败: {}",
                error
            );

            if rotate && attempt < self.max_retries {
                self.pool.rotate(model, &error.reason());
                tokio::time::sleep(self.retry_delay * attempt).await;
                continue;
            }

            let report = ExhaustionReport {
                attempts: attempt,
                last_status: error.status(),
                last_error_code: error.code().map(|c| c.to_string()),
                last_error_message: error.message().to_string(),
                all_credentials_exhausted: self.pool.all_exhausted(model),
                fatal: !rotate,
            };
            tracing::error!(
                model = %model,
                attempts = report.attempts,
                last_status = ?report.last_status,
                all_credentials_exhausted = report.all_credentials_exhausted,
                fatal = report.fatal,
                "上游请求失败，停止重试"
            );
            return Ok(DispatchOutcome::Exhausted(report));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upstream::pool::CredentialHandle;
    use crate::upstream::types::UpstreamError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// 按脚本依次返回结果的上游，并记录每次使用的凭据索引
    pub(crate) struct ScriptedUpstream {
        script: Mutex<VecDeque<Result<UpstreamCompletion, UpstreamError>>>,
        pub(crate) used_indices: Mutex<Vec<usize>>,
    }

    impl ScriptedUpstream {
        pub(crate) fn new(script: Vec<Result<UpstreamCompletion, UpstreamError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                used_indices: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.used_indices.lock().len()
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn complete(
            &self,
            credential: &CredentialHandle,
            _request: &UpstreamRequest,
        ) -> Result<UpstreamCompletion, UpstreamError> {
            self.used_indices.lock().push(credential.index);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::InvalidResponse("script exhausted".into())))
        }
    }

    pub(crate) fn ok(content: &str) -> Result<UpstreamCompletion, UpstreamError> {
        Ok(UpstreamCompletion {
            content: content.to_string(),
            finish_reason: "stop".to_string(),
            usage: Some((10, 3)),
        })
    }

    pub(crate) fn http_err(status: u16, message: &str) -> Result<UpstreamCompletion, UpstreamError> {
        Err(UpstreamError::Http {
            status,
            code: None,
            message: message.to_string(),
        })
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: 16,
            stream: false,
        }
    }

    fn dispatcher(
        credentials: usize,
        script: Vec<Result<UpstreamCompletion, UpstreamError>>,
    ) -> (RetryDispatcher, Arc<CredentialPool>, Arc<ScriptedUpstream>) {
        let pool = Arc::new(CredentialPool::new([(
            "m".to_string(),
            (0..credentials).map(|i| format!("sk-{}", i)).collect(),
        )]));
        let upstream = Arc::new(ScriptedUpstream::new(script));
        let dispatcher =
            RetryDispatcher::new(pool.clone(), upstream.clone(), 3, Duration::from_millis(1));
        (dispatcher, pool, upstream)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (dispatcher, pool, upstream) = dispatcher(2, vec![ok("hi")]);
        let outcome = dispatcher.dispatch("m", &request()).await.unwrap();

        match outcome {
            DispatchOutcome::Success(success) => {
                assert_eq!(success.attempts, 1);
                assert_eq!(success.credential_index, 0);
                assert_eq!(success.completion.content, "hi");
            }
            other => panic!("应该成功: {:?}", other),
        }
        assert_eq!(upstream.calls(), 1);
        assert_eq!(pool.failure_count("m"), Some(0));
    }

    #[tokio::test]
    async fn test_three_429s_exhaust_retries() {
        let (dispatcher, pool, upstream) = dispatcher(
            3,
            vec![
                http_err(429, "slow down"),
                http_err(429, "slow down"),
                http_err(429, "slow down"),
            ],
        );

        let outcome = dispatcher.dispatch("m", &request()).await.unwrap();
        let DispatchOutcome::Exhausted(report) = outcome else {
            panic!("应该耗尽重试");
        };
        assert_eq!(report.attempts, 3);
        assert_eq!(report.last_status, Some(429));
        assert_eq!(report.last_error_message, "slow down");
        assert!(!report.fatal);
        assert_eq!(*upstream.used_indices.lock(), vec![0, 1, 2]);
        // 最后一次失败后不再轮换
        assert_eq!(pool.failure_count("m"), Some(2));
        assert!(!report.all_credentials_exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_without_trailing_sleep() {
        let pool = Arc::new(CredentialPool::new([(
            "m".to_string(),
            vec!["sk-0".to_string(), "sk-1".to_string(), "sk-2".to_string()],
        )]));
        let upstream = Arc::new(ScriptedUpstream::new(vec![
            http_err(429, "slow down"),
            http_err(429, "slow down"),
            http_err(429, "slow down"),
        ]));
        let dispatcher = RetryDispatcher::new(pool, upstream, 3, Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.dispatch("m", &request()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Exhausted(_)));

        // 100ms + 200ms，最后一次失败后不再等待
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let (dispatcher, pool, upstream) =
            dispatcher(3, vec![http_err(400, "messages: invalid role"), ok("never")]);

        let outcome = dispatcher.dispatch("m", &request()).await.unwrap();
        let DispatchOutcome::Exhausted(report) = outcome else {
            panic!("应该立即终止");
        };
        assert_eq!(report.attempts, 1);
        assert_eq!(report.last_status, Some(400));
        assert!(report.fatal);
        assert_eq!(upstream.calls(), 1);
        assert_eq!(pool.failure_count("m"), Some(0));
        assert_eq!(pool.current("m").unwrap().index, 0);
    }

    #[tokio::test]
    async fn test_success_after_rotation_resets_failures() {
        let (dispatcher, pool, upstream) =
            dispatcher(3, vec![http_err(503, "overloaded"), ok("recovered")]);

        let outcome = dispatcher.dispatch("m", &request()).await.unwrap();
        let DispatchOutcome::Success(success) = outcome else {
            panic!("第二次应该成功");
        };
        assert_eq!(success.attempts, 2);
        assert_eq!(success.credential_index, 1);
        assert_eq!(*upstream.used_indices.lock(), vec![0, 1]);
        assert_eq!(pool.failure_count("m"), Some(0));
        assert_eq!(pool.current("m").unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_single_credential_reports_exhausted_pool() {
        let (dispatcher, _pool, _upstream) = dispatcher(
            1,
            vec![
                Err(UpstreamError::Transport {
                    message: "connection refused".to_string(),
                    timed_out: false,
                }),
                http_err(401, "invalid api key"),
                http_err(401, "invalid api key"),
            ],
        );

        let DispatchOutcome::Exhausted(report) = dispatcher.dispatch("m", &request()).await.unwrap()
        else {
            panic!("应该耗尽重试");
        };
        assert_eq!(report.attempts, 3);
        assert_eq!(report.last_status, Some(401));
        assert!(report.all_credentials_exhausted);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_configuration_error() {
        let (dispatcher, _pool, upstream) = dispatcher(0, vec![ok("never")]);
        let err = dispatcher.dispatch("m", &request()).await.unwrap_err();
        assert!(matches!(err, PoolError::NoCredentials { .. }));
        assert_eq!(upstream.calls(), 0);
    }
}
