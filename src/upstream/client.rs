//! 上游 API 客户端

use async_trait::async_trait;
use reqwest::Client;

use super::pool::CredentialHandle;
use super::types::{UpstreamCompletion, UpstreamError, UpstreamRequest, UpstreamResponseBody};
use crate::http_client::{ProxyConfig, build_client};
use crate::model::config::Config;

/// 上游调用接口
///
/// 实现只负责单次调用，重试和凭据轮换由 `RetryDispatcher` 负责
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn complete(
        &self,
        credential: &CredentialHandle,
        request: &UpstreamRequest,
    ) -> Result<UpstreamCompletion, UpstreamError>;
}

/// OpenAI 兼容的 HTTP 上游
pub struct HttpUpstreamClient {
    client: Client,
    base_url: String,
}

impl HttpUpstreamClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let proxy = ProxyConfig::from_config(config);
        let client = build_client(
            proxy.as_ref(),
            config.upstream_timeout_secs,
            config.tls_backend,
        )?;
        Ok(Self::new(client, config.upstream_base_url.clone()))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        message: e.to_string(),
        timed_out: e.is_timeout(),
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn complete(
        &self,
        credential: &CredentialHandle,
        request: &UpstreamRequest,
    ) -> Result<UpstreamCompletion, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential.secret())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(UpstreamError::from_status(status.as_u16(), &body));
        }

        let parsed: UpstreamResponseBody = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::InvalidResponse(format!("failed to parse upstream response: {}", e))
        })?;
        parsed.into_completion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::TlsBackend;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = build_client(None, 5, TlsBackend::Rustls).unwrap();
        let upstream = HttpUpstreamClient::new(client, "https://api.example.com/v1/");
        assert_eq!(
            upstream.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_config_uses_base_url() {
        let mut config = Config::default();
        config.upstream_base_url = "http://127.0.0.1:9999/v1".to_string();
        let upstream = HttpUpstreamClient::from_config(&config).unwrap();
        assert_eq!(upstream.endpoint(), "http://127.0.0.1:9999/v1/chat/completions");
    }

    async fn spawn_upstream() -> String {
        use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
        use serde_json::{Value, json};

        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                match auth.as_str() {
                    "Bearer sk-good" => (
                        StatusCode::OK,
                        Json(json!({
                            "id": "chatcmpl-1",
                            "choices": [{"index": 0, "message": {"role": "assistant", "content": format!("echo {}", body["model"].as_str().unwrap_or_default())}, "finish_reason": "stop"}],
                            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
                        })),
                    ),
                    "Bearer sk-empty" => (StatusCode::OK, Json(json!({"choices": []}))),
                    _ => (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({"error": {"message": "Rate limit reached", "code": "rate_limit_exceeded"}})),
                    ),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            model: "provider-m".to_string(),
            messages: vec![crate::upstream::types::UpstreamMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: 0.7,
            max_tokens: 16,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_complete_against_live_server() {
        use crate::upstream::CredentialPool;

        let base = spawn_upstream().await;
        let upstream = HttpUpstreamClient::new(build_client(None, 5, TlsBackend::Rustls).unwrap(), base);
        let pool = CredentialPool::new([(
            "m".to_string(),
            vec![
                "sk-good".to_string(),
                "sk-empty".to_string(),
                "sk-bad".to_string(),
            ],
        )]);

        let completion = upstream
            .complete(&pool.current("m").unwrap(), &request())
            .await
            .unwrap();
        assert_eq!(completion.content, "echo provider-m");
        assert_eq!(completion.usage, Some((9, 2)));

        pool.rotate("m", "test");
        let err = upstream
            .complete(&pool.current("m").unwrap(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse(_)));
        assert!(!err.is_rotate_worthy());

        pool.rotate("m", "test");
        let err = upstream
            .complete(&pool.current("m").unwrap(), &request())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.code(), Some("rate_limit_exceeded"));
        assert!(err.is_rotate_worthy());
    }
}
