use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::account::types::LocalAccount;
use crate::ratelimit::types::FailPolicy;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TlsBackend {
    #[default]
    Rustls,
    NativeTls,
}

/// 单个逻辑模型的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// 转发到上游时使用的模型名，未配置时使用逻辑模型名
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_model: Option<String>,

    /// 上游凭据列表（按顺序轮换）
    #[serde(default)]
    pub credentials: Vec<String>,

    /// 固定前置指令，转发时作为 system 消息插入到最前面
    #[serde(default)]
    pub preamble: String,

    /// 每百万输入 token 的价格（美元）
    #[serde(default)]
    pub input_cost_per_million: f64,

    /// 每百万输出 token 的价格（美元）
    #[serde(default)]
    pub output_cost_per_million: f64,
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// 单个请求的最大尝试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 线性退避的基础间隔（毫秒），第 n 次失败后等待 n × retryDelayMs
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// 计数器 SQLite 数据库路径（":memory:" 表示内存库）
    #[serde(default = "default_rate_limit_db_path")]
    pub db_path: String,

    /// 计数器存储故障时的策略
    #[serde(default)]
    pub fail_policy: FailPolicy,

    /// 每次检查前清理过期计数器的最大行数
    #[serde(default = "default_gc_batch_size")]
    pub gc_batch_size: u32,
}

fn default_rate_limit_db_path() -> String {
    "rate_limits.db".to_string()
}

fn default_gc_batch_size() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            db_path: default_rate_limit_db_path(),
            fail_policy: FailPolicy::default(),
            gc_batch_size: default_gc_batch_size(),
        }
    }
}

/// 账户存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AccountStoreConfig {
    /// 外部账户服务（REST）
    #[serde(rename_all = "camelCase")]
    Http {
        base_url: String,
        #[serde(default)]
        #[serde(skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default = "default_account_timeout_secs")]
        timeout_secs: u64,
    },
    /// 本地内存账户（开发和测试用）
    Local {
        #[serde(default)]
        accounts: Vec<LocalAccount>,
    },
}

fn default_account_timeout_secs() -> u64 {
    10
}

impl Default for AccountStoreConfig {
    fn default() -> Self {
        Self::Local {
            accounts: Vec::new(),
        }
    }
}

/// 网关应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 上游 OpenAI 兼容 API 基础地址
    #[serde(default = "default_upstream_base_url")]
    pub upstream_base_url: String,

    /// 单次上游调用超时（秒）
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[serde(default)]
    pub tls_backend: TlsBackend,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// 代理认证用户名（可选）
    #[serde(default)]
    pub proxy_username: Option<String>,

    /// 代理认证密码（可选）
    #[serde(default)]
    pub proxy_password: Option<String>,

    /// 模型名 -> 模型配置，键集合即允许的模型集合
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub account_store: AccountStoreConfig,

    /// Admin API 密钥（可选，启用 Admin API 功能）
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upstream_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_base_url: default_upstream_base_url(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            tls_backend: TlsBackend::default(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            models: BTreeMap::new(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            account_store: AccountStoreConfig::default(),
            admin_api_key: None,
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// 获取模型转发到上游时使用的名称
    pub fn upstream_model_for<'a>(&'a self, model: &'a str) -> &'a str {
        self.models
            .get(model)
            .and_then(|m| m.upstream_model.as_deref())
            .unwrap_or(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::types::Limit;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert_eq!(config.rate_limit.fail_policy, FailPolicy::Open);
        assert!(matches!(config.account_store, AccountStoreConfig::Local { .. }));
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "port": 9000,
            "models": {
                "m": {
                    "upstreamModel": "gpt-4o-mini",
                    "credentials": ["sk-a", "sk-b"],
                    "preamble": "You are helpful."
                }
            },
            "retry": {"maxRetries": 5},
            "rateLimit": {"dbPath": ":memory:", "failPolicy": "closed"},
            "accountStore": {
                "type": "local",
                "accounts": [{
                    "token": "caller-1",
                    "accountId": "acct-1",
                    "plan": "free",
                    "limits": {"dailyRequests": 100, "requestsPerSecond": -1, "tokensPerMinute": 5000}
                }]
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.upstream_model_for("m"), "gpt-4o-mini");
        assert_eq!(config.upstream_model_for("other"), "other");
        assert_eq!(config.models["m"].credentials.len(), 2);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert_eq!(config.rate_limit.fail_policy, FailPolicy::Closed);

        match config.account_store {
            AccountStoreConfig::Local { accounts } => {
                assert_eq!(accounts[0].account_id, "acct-1");
                assert_eq!(accounts[0].limits.daily_requests, Limit::Limit(100));
                assert_eq!(accounts[0].limits.requests_per_second, Limit::Unlimited);
            }
            _ => panic!("应该是 local 账户存储"),
        }
    }

    #[test]
    fn test_parse_http_account_store() {
        let json = r#"{"accountStore": {"type": "http", "baseUrl": "http://accounts:9000"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        match config.account_store {
            AccountStoreConfig::Http {
                base_url,
                api_key,
                timeout_secs,
            } => {
                assert_eq!(base_url, "http://accounts:9000");
                assert!(api_key.is_none());
                assert_eq!(timeout_secs, 10);
            }
            _ => panic!("应该是 http 账户存储"),
        }
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = Config::load("/nonexistent/quota-gateway/config.json").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.config_path().is_some());
    }
}
