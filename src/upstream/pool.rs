//! 上游凭据池
//!
//! 每个逻辑模型一组按顺序轮换的凭据。当前索引和连续失败计数
//! 由每个模型独立的互斥锁保护，轮换的读-改-写是原子的。

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::config::Config;

/// 凭据指纹（SHA-256 前 12 位十六进制），用于日志和状态展示
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..6])
}

/// 凭据池错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// 模型未配置任何凭据
    NoCredentials { model: String },
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::NoCredentials { model } => {
                write!(f, "No upstream credentials configured for model '{}'", model)
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// 当前凭据
#[derive(Clone)]
pub struct CredentialHandle {
    pub index: usize,
    pub pool_size: usize,
    secret: String,
}

impl CredentialHandle {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("index", &self.index)
            .field("pool_size", &self.pool_size)
            .field("fingerprint", &fingerprint(&self.secret))
            .finish()
    }
}

/// 单个模型的凭据池状态（Admin API 展示用）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub model: String,
    pub size: usize,
    pub current_index: usize,
    pub failure_count: u32,
    pub exhausted: bool,
    pub fingerprints: Vec<String>,
}

struct PoolEntry {
    credentials: Vec<String>,
    current_index: usize,
    failure_count: u32,
}

impl PoolEntry {
    fn is_exhausted(&self) -> bool {
        self.failure_count as usize >= self.credentials.len()
    }
}

/// 凭据池
///
/// 启动时从配置初始化，进程生命周期内不销毁条目
pub struct CredentialPool {
    entries: HashMap<String, Mutex<PoolEntry>>,
}

impl CredentialPool {
    pub fn new<I>(models: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let entries = models
            .into_iter()
            .map(|(model, credentials)| {
                let credentials: Vec<String> = credentials
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                (
                    model,
                    Mutex::new(PoolEntry {
                        credentials,
                        current_index: 0,
                        failure_count: 0,
                    }),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn from_config(config: &Config) -> Self {
        let pool = Self::new(
            config
                .models
                .iter()
                .map(|(name, model)| (name.clone(), model.credentials.clone())),
        );
        for status in pool.snapshot() {
            if status.size == 0 {
                tracing::warn!(model = %status.model, "模型未配置上游凭据，请求将返回 503");
            } else {
                tracing::info!(model = %status.model, pool_size = status.size, "凭据池已加载");
            }
        }
        pool
    }

    /// 指定起始索引（超出范围时取模）
    #[cfg(test)]
    pub fn with_start_index(self, model: &str, index: usize) -> Self {
        if let Some(slot) = self.entries.get(model) {
            let mut entry = slot.lock();
            if !entry.credentials.is_empty() {
                entry.current_index = index % entry.credentials.len();
            }
        }
        self
    }

    /// 获取模型当前凭据
    pub fn current(&self, model: &str) -> Result<CredentialHandle, PoolError> {
        let no_credentials = || PoolError::NoCredentials {
            model: model.to_string(),
        };
        let entry = self.entries.get(model).ok_or_else(no_credentials)?.lock();
        let secret = entry
            .credentials
            .get(entry.current_index)
            .ok_or_else(no_credentials)?;

        Ok(CredentialHandle {
            index: entry.current_index,
            pool_size: entry.credentials.len(),
            secret: secret.clone(),
        })
    }

    /// 切换到下一个凭据并累加失败计数
    pub fn rotate(&self, model: &str, reason: &str) {
        let Some(slot) = self.entries.get(model) else {
            tracing::warn!(model = %model, "尝试轮换未知模型的凭据");
            return;
        };
        let mut entry = slot.lock();
        let pool_size = entry.credentials.len();
        if pool_size == 0 {
            return;
        }

        let previous_index = entry.current_index;
        entry.current_index = (previous_index + 1) % pool_size;
        entry.failure_count = entry.failure_count.saturating_add(1);

        tracing::warn!(
            model = %model,
            reason = %reason,
            previous_index,
            new_index = entry.current_index,
            pool_size,
            failure_count = entry.failure_count,
            "上游凭据轮换"
        );

        if entry.current_index == 0 && entry.is_exhausted() {
            tracing::error!(
                model = %model,
                pool_size,
                failure_count = entry.failure_count,
                "凭据池已完整轮换一圈，所有凭据自上次成功以来均已失败"
            );
        }
    }

    /// 上游调用成功后清零失败计数
    pub fn reset_failures(&self, model: &str) {
        if let Some(slot) = self.entries.get(model) {
            let mut entry = slot.lock();
            if entry.failure_count > 0 {
                tracing::debug!(
                    model = %model,
                    failure_count = entry.failure_count,
                    "上游调用成功，清零失败计数"
                );
            }
            entry.failure_count = 0;
        }
    }

    /// 自上次重置以来每个凭据是否都至少失败过一次
    pub fn all_exhausted(&self, model: &str) -> bool {
        self.entries
            .get(model)
            .map(|slot| slot.lock().is_exhausted())
            .unwrap_or(true)
    }

    #[cfg(test)]
    pub fn failure_count(&self, model: &str) -> Option<u32> {
        self.entries.get(model).map(|slot| slot.lock().failure_count)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    /// 所有模型的凭据池状态（按模型名排序）
    pub fn snapshot(&self) -> Vec<PoolStatus> {
        let mut statuses: Vec<PoolStatus> = self
            .entries
            .iter()
            .map(|(model, slot)| {
                let entry = slot.lock();
                PoolStatus {
                    model: model.clone(),
                    size: entry.credentials.len(),
                    current_index: entry.current_index,
                    failure_count: entry.failure_count,
                    exhausted: entry.is_exhausted(),
                    fingerprints: entry.credentials.iter().map(|c| fingerprint(c)).collect(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.model.cmp(&b.model));
        statuses
    }
}
