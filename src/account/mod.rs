//! 账户存储模块
//!
//! 调用方凭据校验、配额声明和用量上报

pub mod http;
pub mod local;
pub mod store;
pub mod types;

use std::sync::Arc;

pub use http::HttpAccountStore;
pub use local::LocalAccountStore;
pub use store::{AccountStore, AccountStoreError};

use crate::http_client::ProxyConfig;
use crate::model::config::{AccountStoreConfig, Config};

/// 按配置创建账户存储
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn AccountStore>> {
    match &config.account_store {
        AccountStoreConfig::Http {
            base_url,
            api_key,
            timeout_secs,
        } => {
            let proxy = ProxyConfig::from_config(config);
            let store = HttpAccountStore::from_settings(
                base_url,
                api_key.clone(),
                *timeout_secs,
                proxy.as_ref(),
                config.tls_backend,
            )?;
            tracing::info!("账户存储: 外部账户服务 {}", base_url);
            Ok(Arc::new(store))
        }
        AccountStoreConfig::Local { accounts } => {
            if accounts.is_empty() {
                tracing::warn!("账户存储: 本地账户列表为空，所有请求都会被拒绝");
            } else {
                tracing::info!("账户存储: 本地账户 {} 个", accounts.len());
            }
            Ok(Arc::new(LocalAccountStore::new(accounts.clone())))
        }
    }
}
