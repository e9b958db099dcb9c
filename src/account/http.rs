//! 外部账户服务（REST）
//!
//! - `POST {base}/credentials/validate`  body: `{"token": "..."}`
//! - `POST {base}/usage`                 body: `UsageRecord`，调用方凭据放在 `X-Caller-Token` 头
//! - `GET  {base}/accounts/{id}/stats`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::store::{AccountStore, AccountStoreError};
use super::types::{AccountValidation, UsageRecord, UsageSnapshot};
use crate::common::truncate_str_safe;
use crate::http_client::{ProxyConfig, build_client};
use crate::model::config::TlsBackend;

const CALLER_TOKEN_HEADER: &str = "X-Caller-Token";

#[derive(Serialize)]
struct ValidateBody<'a> {
    token: &'a str,
}

pub struct HttpAccountStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAccountStore {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_settings(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
        proxy: Option<&ProxyConfig>,
        tls_backend: TlsBackend,
    ) -> anyhow::Result<Self> {
        let client = build_client(proxy, timeout_secs, tls_backend)?;
        Ok(Self::new(client, base_url, api_key))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn error_from_response(response: reqwest::Response) -> AccountStoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        AccountStoreError::Unavailable(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_str_safe(&body, 200)
        ))
    }
}

fn transport_error(e: reqwest::Error) -> AccountStoreError {
    AccountStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl AccountStore for HttpAccountStore {
    async fn validate_credential(&self, token: &str) -> Result<AccountValidation, AccountStoreError> {
        let url = format!("{}/credentials/validate", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&ValidateBody { token })
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
                return Ok(AccountValidation::invalid());
            }
            status if !status.is_success() => {
                return Err(Self::error_from_response(response).await);
            }
            _ => {}
        }

        response
            .json::<AccountValidation>()
            .await
            .map_err(|e| AccountStoreError::InvalidResponse(e.to_string()))
    }

    async fn record_usage(&self, token: &str, record: &UsageRecord) -> Result<(), AccountStoreError> {
        let url = format!("{}/usage", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .header(CALLER_TOKEN_HEADER, token)
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn fetch_account_stats(&self, account_id: &str) -> Result<UsageSnapshot, AccountStoreError> {
        let url = format!(
            "{}/accounts/{}/stats",
            self.base_url,
            urlencoding::encode(account_id)
        );
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AccountStoreError::NotFound(account_id.to_string())),
            status if !status.is_success() => Err(Self::error_from_response(response).await),
            _ => response
                .json::<UsageSnapshot>()
                .await
                .map_err(|e| AccountStoreError::InvalidResponse(e.to_string())),
        }
    }
}
