//! 账户存储类型定义

use serde::{Deserialize, Serialize};

use crate::ratelimit::types::Limit;

/// 账户声明的配额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLimits {
    #[serde(default = "unlimited")]
    pub daily_requests: Limit,
    #[serde(default = "unlimited")]
    pub requests_per_second: Limit,
    #[serde(default = "unlimited")]
    pub tokens_per_minute: Limit,
}

fn unlimited() -> Limit {
    Limit::Unlimited
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            daily_requests: Limit::Unlimited,
            requests_per_second: Limit::Unlimited,
            tokens_per_minute: Limit::Unlimited,
        }
    }
}

/// 账户当日已记录的用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUsage {
    #[serde(default)]
    pub requests_today: u64,
    #[serde(default)]
    pub tokens_today: u64,
}

/// 凭据校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountValidation {
    pub valid: bool,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub limits: AccountLimits,
    #[serde(default)]
    pub usage: AccountUsage,
}

impl AccountValidation {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            account_id: String::new(),
            plan: String::new(),
            limits: AccountLimits::default(),
            usage: AccountUsage::default(),
        }
    }
}

/// 单次请求的用量记录（只写，网关不回读）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub request_id: String,
    pub account_id: String,
    pub endpoint: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// RFC3339
    pub timestamp: String,
}

/// 账户用量快照（报表接口使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub account_id: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub requests_today: u64,
    #[serde(default)]
    pub tokens_today: u64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
}

/// 本地账户（配置文件中声明）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAccount {
    /// 调用方凭据
    pub token: String,
    pub account_id: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    #[serde(default)]
    pub limits: AccountLimits,
}

fn default_plan() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_with_sentinel_limits() {
        let json = r#"{
            "valid": true,
            "accountId": "acct-1",
            "plan": "pro",
            "limits": {"dailyRequests": 100, "requestsPerSecond": -1, "tokensPerMinute": 20000},
            "usage": {"requestsToday": 42, "tokensToday": 1000}
        }"#;

        let validation: AccountValidation = serde_json::from_str(json).unwrap();
        assert!(validation.valid);
        assert_eq!(validation.limits.daily_requests, Limit::Limit(100));
        assert_eq!(validation.limits.requests_per_second, Limit::Unlimited);
        assert_eq!(validation.limits.tokens_per_minute, Limit::Limit(20000));
        assert_eq!(validation.usage.requests_today, 42);
    }

    #[test]
    fn test_invalid_validation_needs_only_flag() {
        let validation: AccountValidation = serde_json::from_str(r#"{"valid": false}"#).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.limits, AccountLimits::default());
    }

    #[test]
    fn test_usage_record_omits_missing_error() {
        let record = UsageRecord {
            request_id: "req-1".to_string(),
            account_id: "acct-1".to_string(),
            endpoint: "/v1/m/chat/completions".to_string(),
            model: "m".to_string(),
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.0,
            latency_ms: 120,
            status_code: 200,
            error_message: None,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["inputTokens"], 10);
        assert!(json.get("errorMessage").is_none());
    }
}
