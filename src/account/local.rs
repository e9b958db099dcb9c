//! 本地内存账户存储
//!
//! 账户来自配置文件，用量保存在进程内存中并按 UTC 日期滚动。
//! 适合开发环境和单机部署，重启后用量清零。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;

use super::store::{AccountStore, AccountStoreError};
use super::types::{
    AccountUsage, AccountValidation, LocalAccount, UsageRecord, UsageSnapshot,
};

#[derive(Debug, Clone)]
struct LocalUsage {
    day: NaiveDate,
    requests_today: u64,
    tokens_today: u64,
    total_requests: u64,
    total_tokens: u64,
    total_cost_usd: f64,
}

impl LocalUsage {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            requests_today: 0,
            tokens_today: 0,
            total_requests: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
        }
    }

    /// 跨日时清零当日计数
    fn roll_over(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.requests_today = 0;
            self.tokens_today = 0;
        }
    }
}

pub struct LocalAccountStore {
    /// token -> 账户
    accounts: HashMap<String, LocalAccount>,
    /// account_id -> 用量
    usage: RwLock<HashMap<String, LocalUsage>>,
}

impl LocalAccountStore {
    pub fn new(accounts: Vec<LocalAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.token.clone(), account))
            .collect();
        Self {
            accounts,
            usage: RwLock::new(HashMap::new()),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn usage_for(&self, account_id: &str) -> AccountUsage {
        let today = Self::today();
        self.usage
            .read()
            .get(account_id)
            .filter(|usage| usage.day == today)
            .map(|usage| AccountUsage {
                requests_today: usage.requests_today,
                tokens_today: usage.tokens_today,
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for LocalAccountStore {
    async fn validate_credential(&self, token: &str) -> Result<AccountValidation, AccountStoreError> {
        let Some(account) = self.accounts.get(token) else {
            return Ok(AccountValidation::invalid());
        };

        Ok(AccountValidation {
            valid: true,
            account_id: account.account_id.clone(),
            plan: account.plan.clone(),
            limits: account.limits,
            usage: self.usage_for(&account.account_id),
        })
    }

    /// 只有成功的请求计入当日请求数
    async fn record_usage(&self, token: &str, record: &UsageRecord) -> Result<(), AccountStoreError> {
        let account = self
            .accounts
            .get(token)
            .ok_or_else(|| AccountStoreError::NotFound(record.account_id.clone()))?;

        let today = Self::today();
        let mut usage = self.usage.write();
        let entry = usage
            .entry(account.account_id.clone())
            .or_insert_with(|| LocalUsage::new(today));
        entry.roll_over(today);

        if record.status_code == 200 {
            let tokens = record.input_tokens + record.output_tokens;
            entry.requests_today += 1;
            entry.tokens_today += tokens;
            entry.total_requests += 1;
            entry.total_tokens += tokens;
            entry.total_cost_usd += record.cost_usd;
        }
        Ok(())
    }

    async fn fetch_account_stats(&self, account_id: &str) -> Result<UsageSnapshot, AccountStoreError> {
        let account = self
            .accounts
            .values()
            .find(|account| account.account_id == account_id)
            .ok_or_else(|| AccountStoreError::NotFound(account_id.to_string()))?;

        let today = Self::today();
        let usage = self.usage.read();
        let snapshot = match usage.get(account_id) {
            Some(usage) => {
                let is_today = usage.day == today;
                UsageSnapshot {
                    account_id: account_id.to_string(),
                    plan: account.plan.clone(),
                    requests_today: if is_today { usage.requests_today } else { 0 },
                    tokens_today: if is_today { usage.tokens_today } else { 0 },
                    total_requests: usage.total_requests,
                    total_tokens: usage.total_tokens,
                    total_cost_usd: usage.total_cost_usd,
                }
            }
            None => UsageSnapshot {
                account_id: account_id.to_string(),
                plan: account.plan.clone(),
                requests_today: 0,
                tokens_today: 0,
                total_requests: 0,
                total_tokens: 0,
                total_cost_usd: 0.0,
            },
        };
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::AccountLimits;
    use crate::ratelimit::types::Limit;

    fn store() -> LocalAccountStore {
        LocalAccountStore::new(vec![LocalAccount {
            token: "caller-1".to_string(),
            account_id: "acct-1".to_string(),
            plan: "free".to_string(),
            limits: AccountLimits {
                daily_requests: Limit::Limit(100),
                requests_per_second: Limit::Unlimited,
                tokens_per_minute: Limit::Limit(1000),
            },
        }])
    }

    fn record(status_code: u16) -> UsageRecord {
        UsageRecord {
            request_id: "req".to_string(),
            account_id: "acct-1".to_string(),
            endpoint: "/v1/chat/completions".to_string(),
            model: "m".to_string(),
            input_tokens: 7,
            output_tokens: 3,
            cost_usd: 0.5,
            latency_ms: 10,
            status_code,
            error_message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_validate_known_and_unknown_tokens() {
        let store = store();
        let validation = store.validate_credential("caller-1").await.unwrap();
        assert!(validation.valid);
        assert_eq!(validation.account_id, "acct-1");
        assert_eq!(validation.limits.daily_requests, Limit::Limit(100));

        let validation = store.validate_credential("nobody").await.unwrap();
        assert!(!validation.valid);
    }

    #[tokio::test]
    async fn test_record_usage_counts_successful_requests() {
        let store = store();
        store.record_usage("caller-1", &record(200)).await.unwrap();
        store.record_usage("caller-1", &record(200)).await.unwrap();
        store.record_usage("caller-1", &record(503)).await.unwrap();

        let validation = store.validate_credential("caller-1").await.unwrap();
        assert_eq!(validation.usage.requests_today, 2);
        assert_eq!(validation.usage.tokens_today, 20);

        let stats = store.fetch_account_stats("acct-1").await.unwrap();
        assert_eq!(stats.total_requests, 2);
        assert!((stats.total_cost_usd - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_record_usage_for_unknown_token_fails() {
        let store = store();
        let err = store.record_usage("nobody", &record(200)).await.unwrap_err();
        assert!(matches!(err, AccountStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_for_unknown_account() {
        let store = store();
        assert!(matches!(
            store.fetch_account_stats("acct-x").await,
            Err(AccountStoreError::NotFound(_))
        ));
        let stats = store.fetch_account_stats("acct-1").await.unwrap();
        assert_eq!(stats.requests_today, 0);
        assert_eq!(stats.plan, "free");
    }

    #[test]
    fn test_roll_over_resets_daily_counters() {
        let yesterday = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let mut usage = LocalUsage::new(yesterday);
        usage.requests_today = 5;
        usage.total_requests = 5;

        usage.roll_over(today);
        assert_eq!(usage.requests_today, 0);
        assert_eq!(usage.total_requests, 5);
    }
}
